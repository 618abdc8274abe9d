//! Dosing/visit frequency vocabulary.
//!
//! Staff pick frequencies from a fixed list, but stored descriptors vary in
//! spelling ("2x_weekly", "2x per week", "Twice a week"). Descriptors are
//! normalised and matched against anchored patterns; anything else is kept
//! verbatim as `Unrecognized` and priced with the conservative default rate.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Rate applied to descriptors outside the vocabulary.
pub const DEFAULT_INJECTIONS_PER_WEEK: f64 = 7.0;

/// Visit interval applied when nothing more specific is known.
pub const DEFAULT_INTERVAL_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Frequency {
    TwiceDaily,
    Daily,
    EveryOtherDay,
    EveryFiveDays,
    TwiceWeekly,
    ThreeTimesWeekly,
    Weekly,
    EveryTenDays,
    EveryTwoWeeks,
    Monthly,
    AsNeeded,
    Unrecognized(String),
}

static PATTERNS: LazyLock<Vec<(Regex, Frequency)>> = LazyLock::new(|| {
    let table: [(&str, Frequency); 11] = [
        (r"^(2x|twice)( a| per)? ?(day|daily)$", Frequency::TwiceDaily),
        (r"^(daily|once (a |per )?day|once daily|1x (a |per )?day|every day)$", Frequency::Daily),
        (r"^every (other|2nd|2) days?$", Frequency::EveryOtherDay),
        (r"^every (5|five) days$", Frequency::EveryFiveDays),
        (r"^(2x|twice)( a| per)? ?(week|weekly)$", Frequency::TwiceWeekly),
        (r"^(3x|three times)( a| per)? ?(week|weekly)$", Frequency::ThreeTimesWeekly),
        (r"^(weekly|once (a |per )?week|1x (a |per )?week|every 7 days|every week)$", Frequency::Weekly),
        (r"^every (10|ten) days$", Frequency::EveryTenDays),
        (r"^(biweekly|every (2|two) weeks|every other week)$", Frequency::EveryTwoWeeks),
        (r"^(monthly|once (a |per )?month|every month)$", Frequency::Monthly),
        (r"^(as needed|prn)$", Frequency::AsNeeded),
    ];
    table
        .into_iter()
        .filter_map(|(pattern, freq)| match Regex::new(pattern) {
            Ok(re) => Some((re, freq)),
            Err(e) => {
                tracing::error!(pattern, error = %e, "Invalid frequency pattern");
                None
            }
        })
        .collect()
});

static SEPARATORS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[\s_\-]+").ok());

fn normalize(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    match SEPARATORS.as_ref() {
        Some(re) => re.replace_all(&lower, " ").trim().to_string(),
        None => lower,
    }
}

impl Frequency {
    /// Classify a stored descriptor.
    pub fn parse(raw: &str) -> Self {
        let normalized = normalize(raw);
        PATTERNS
            .iter()
            .find(|(re, _)| re.is_match(&normalized))
            .map(|(_, freq)| freq.clone())
            .unwrap_or_else(|| Self::Unrecognized(raw.trim().to_string()))
    }

    /// Canonical descriptor written back to storage.
    pub fn as_str(&self) -> &str {
        match self {
            Self::TwiceDaily => "2x daily",
            Self::Daily => "daily",
            Self::EveryOtherDay => "every other day",
            Self::EveryFiveDays => "every 5 days",
            Self::TwiceWeekly => "2x weekly",
            Self::ThreeTimesWeekly => "3x weekly",
            Self::Weekly => "weekly",
            Self::EveryTenDays => "every 10 days",
            Self::EveryTwoWeeks => "every 2 weeks",
            Self::Monthly => "monthly",
            Self::AsNeeded => "as needed",
            Self::Unrecognized(raw) => raw,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }

    /// Injections per week used for take-home supply estimates.
    ///
    /// Three-times-weekly is priced at 2/week, matching how clinic supply has
    /// always been dispensed for that schedule.
    pub fn injections_per_week(&self) -> f64 {
        match self {
            Self::TwiceDaily => 14.0,
            Self::Daily => 7.0,
            Self::EveryOtherDay => 3.5,
            Self::EveryFiveDays => 1.4,
            Self::TwiceWeekly => 2.0,
            Self::ThreeTimesWeekly => 2.0,
            Self::Weekly => 1.0,
            Self::EveryTenDays => 0.7,
            Self::EveryTwoWeeks => 0.5,
            Self::Monthly => 7.0 / 30.0,
            Self::AsNeeded | Self::Unrecognized(_) => DEFAULT_INJECTIONS_PER_WEEK,
        }
    }

    /// Days until the next visit after a missed one.
    pub fn missed_visit_interval_days(&self) -> i64 {
        match self {
            Self::EveryTenDays => 10,
            Self::EveryTwoWeeks => 14,
            Self::EveryOtherDay => 2,
            _ => DEFAULT_INTERVAL_DAYS,
        }
    }
}

impl Default for Frequency {
    fn default() -> Self {
        Self::Unrecognized(String::new())
    }
}

impl From<String> for Frequency {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&str> for Frequency {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<Frequency> for String {
    fn from(freq: Frequency) -> Self {
        freq.as_str().to_string()
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
