use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{DeliveryMethod, ProgramCategory, ProtocolStatus};
use super::frequency::Frequency;
use super::patient::Patient;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub category: ProgramCategory,
    pub medication: String,
    pub selected_dose: Option<String>,
    pub frequency: Frequency,
    pub delivery: DeliveryMethod,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub total_sessions: Option<u32>,
    pub sessions_used: u32,
    #[serde(with = "weekday_names")]
    pub scheduled_days: Vec<Weekday>,
    pub status: ProtocolStatus,
    pub last_visit_date: Option<NaiveDate>,
    pub next_expected_date: Option<NaiveDate>,
    /// Manual-start override for the drip anchor. Set at most once.
    pub drip_start_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Protocol {
    pub fn sessions_left(&self) -> Option<u32> {
        self.total_sessions
            .map(|total| total.saturating_sub(self.sessions_used))
    }

    pub fn is_scheduled_on(&self, day: Weekday) -> bool {
        self.scheduled_days.contains(&day)
    }
}

/// Field changes applied by staff actions and the sequencer.
/// `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtocolUpdate {
    pub status: Option<ProtocolStatus>,
    pub end_date: Option<NaiveDate>,
    pub total_sessions: Option<u32>,
    pub sessions_used: Option<u32>,
    pub last_visit_date: Option<NaiveDate>,
    pub next_expected_date: Option<NaiveDate>,
    /// Only written when the stored value is still NULL.
    pub drip_start_date: Option<NaiveDate>,
}

impl ProtocolUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A protocol selected for a scheduled tick, with the patient it belongs to.
#[derive(Debug, Clone)]
pub struct DripCandidate {
    pub protocol: Protocol,
    pub patient: Patient,
}

/// Serde adapter storing weekdays as lowercase English names.
pub mod weekday_names {
    use chrono::Weekday;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::clock::{parse_weekday, weekday_name};

    pub fn serialize<S: Serializer>(days: &[Weekday], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(days.iter().map(|d| weekday_name(*d)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Weekday>, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        names
            .iter()
            .map(|n| parse_weekday(n).ok_or_else(|| D::Error::custom(format!("unknown weekday: {n}"))))
            .collect()
    }
}
