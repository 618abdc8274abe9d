//! Shared state and request types for the API layer.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::clock::{is_supported_date, Clock, FixedClock};
use crate::db::SqliteStore;
use crate::drip::DripSequencer;

/// Shared context for all API routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub store: Arc<SqliteStore>,
    pub sequencer: Arc<DripSequencer>,
    pub clock: Arc<dyn Clock>,
    pub cron_secret: Option<Arc<str>>,
}

impl ApiContext {
    pub fn new(
        store: Arc<SqliteStore>,
        sequencer: Arc<DripSequencer>,
        clock: Arc<dyn Clock>,
        cron_secret: Option<String>,
    ) -> Self {
        Self {
            store,
            sequencer,
            clock,
            cron_secret: cron_secret.map(Arc::from),
        }
    }

    /// The service clock, or one frozen on `as_of` in the same zone.
    pub fn clock_as_of(&self, as_of: Option<NaiveDate>) -> Result<Arc<dyn Clock>, ApiError> {
        Ok(match checked_as_of(as_of)? {
            Some(date) => Arc::new(FixedClock::on_date(date, self.clock.timezone())),
            None => self.clock.clone(),
        })
    }
}

/// Reject `as_of` dates the calendar arithmetic cannot serve.
pub fn checked_as_of(as_of: Option<NaiveDate>) -> Result<Option<NaiveDate>, ApiError> {
    match as_of {
        Some(date) if !is_supported_date(date) => {
            Err(ApiError::BadRequest(format!("as_of {date} is outside the supported range")))
        }
        other => Ok(other),
    }
}

/// `?as_of=YYYY-MM-DD` on read endpoints and the tick trigger.
#[derive(Debug, Default, Deserialize)]
pub struct AsOfQuery {
    pub as_of: Option<NaiveDate>,
}

pub fn parse_protocol_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|e| ApiError::BadRequest(format!("Invalid protocol ID: {e}")))
}
