use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Protocare";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Clinic zone used when `PROTOCARE_TIMEZONE` is unset.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Los_Angeles;

const ENV_PREFIX: &str = "PROTOCARE_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("{key} must be greater than zero")]
    MustBePositive { key: String },
}

/// Default tracing filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> String {
    "protocare_lib=info,protocare=info,tower_http=warn".to_string()
}

/// Get the application data directory.
/// Falls back to the working directory when the platform has no data dir.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default location of the SQLite store.
pub fn default_database_path() -> PathBuf {
    app_data_dir().join("protocare.db")
}

/// Sequencer tuning.
#[derive(Debug, Clone)]
pub struct DripConfig {
    /// Protocols created within this many days are candidates for auto-start.
    pub lookback_days: i64,
    /// Upper bound on a single dispatch to the communication sender.
    pub dispatch_timeout: Duration,
    /// Protocols processed concurrently within one tick.
    pub tick_concurrency: usize,
}

impl Default for DripConfig {
    fn default() -> Self {
        Self {
            lookback_days: 5,
            dispatch_timeout: Duration::from_secs(15),
            tick_concurrency: 4,
        }
    }
}

/// Outbound email provider settings (Resend-compatible JSON API).
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub from: String,
    pub reply_to: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.resend.com/emails".to_string(),
            api_key: None,
            from: "Clinic <noreply@example.com>".to_string(),
            reply_to: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub timezone: Tz,
    pub api_addr: SocketAddr,
    pub tick_interval: Duration,
    pub cron_secret: Option<String>,
    pub drip: DripConfig,
    pub email: EmailConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            timezone: DEFAULT_TIMEZONE,
            api_addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            tick_interval: Duration::from_secs(24 * 60 * 60),
            cron_secret: None,
            drip: DripConfig::default(),
            email: EmailConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `PROTOCARE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    /// Keys are the full variable names, e.g. `PROTOCARE_TIMEZONE`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let database_path = get("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path);

        let timezone = match get("TIMEZONE") {
            Some(raw) => raw.parse::<Tz>().map_err(|_| ConfigError::InvalidValue {
                key: format!("{ENV_PREFIX}TIMEZONE"),
                value: raw,
            })?,
            None => defaults.timezone,
        };

        let api_addr = parse_or(get("API_ADDR"), "API_ADDR", defaults.api_addr)?;

        let tick_secs: u64 = parse_or(
            get("TICK_INTERVAL_SECS"),
            "TICK_INTERVAL_SECS",
            defaults.tick_interval.as_secs(),
        )?;
        ensure_positive(tick_secs, "TICK_INTERVAL_SECS")?;

        let lookback_days: i64 = parse_or(
            get("DRIP_LOOKBACK_DAYS"),
            "DRIP_LOOKBACK_DAYS",
            defaults.drip.lookback_days,
        )?;
        ensure_positive(u64::try_from(lookback_days).unwrap_or(0), "DRIP_LOOKBACK_DAYS")?;

        let timeout_secs: u64 = parse_or(
            get("DISPATCH_TIMEOUT_SECS"),
            "DISPATCH_TIMEOUT_SECS",
            defaults.drip.dispatch_timeout.as_secs(),
        )?;
        ensure_positive(timeout_secs, "DISPATCH_TIMEOUT_SECS")?;

        let tick_concurrency: usize = parse_or(
            get("TICK_CONCURRENCY"),
            "TICK_CONCURRENCY",
            defaults.drip.tick_concurrency,
        )?;
        ensure_positive(tick_concurrency as u64, "TICK_CONCURRENCY")?;

        let email = EmailConfig {
            api_url: get("EMAIL_API_URL").unwrap_or(defaults.email.api_url),
            api_key: get("EMAIL_API_KEY"),
            from: get("EMAIL_FROM").unwrap_or(defaults.email.from),
            reply_to: get("EMAIL_REPLY_TO"),
        };

        Ok(Self {
            database_path,
            timezone,
            api_addr,
            tick_interval: Duration::from_secs(tick_secs),
            cron_secret: get("CRON_SECRET"),
            drip: DripConfig {
                lookback_days,
                dispatch_timeout: Duration::from_secs(timeout_secs),
                tick_concurrency,
            },
            email,
        })
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, name: &str, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value.parse::<T>().map_err(|_| ConfigError::InvalidValue {
            key: format!("{ENV_PREFIX}{name}"),
            value,
        }),
        None => Ok(default),
    }
}

fn ensure_positive(value: u64, name: &str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::MustBePositive {
            key: format!("{ENV_PREFIX}{name}"),
        });
    }
    Ok(())
}
