use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::LogKind;

/// Number of steps in the weight-loss onboarding sequence.
pub const DRIP_SEQUENCE_LEN: u8 = 4;

/// What happened, with the data specific to each kind of event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogPayload {
    Visit,
    Injection {
        weight: Option<f64>,
        dose: Option<String>,
    },
    /// `step_number` is the 0-based catalog index.
    DripEmail { step_number: u8, subject: String },
    Missed { reason: Option<String> },
    Note,
}

impl LogPayload {
    pub fn kind(&self) -> LogKind {
        match self {
            Self::Visit => LogKind::Visit,
            Self::Injection { .. } => LogKind::Injection,
            Self::DripEmail { .. } => LogKind::DripEmail,
            Self::Missed { .. } => LogKind::Missed,
            Self::Note => LogKind::Note,
        }
    }
}

/// One dated event in a protocol's append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolLogEntry {
    pub id: Uuid,
    pub protocol_id: Uuid,
    pub patient_id: Uuid,
    pub log_date: NaiveDate,
    #[serde(flatten)]
    pub payload: LogPayload,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ProtocolLogEntry {
    pub fn new(protocol_id: Uuid, patient_id: Uuid, log_date: NaiveDate, payload: LogPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            protocol_id,
            patient_id,
            log_date,
            payload,
            note: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note.filter(|n| !n.trim().is_empty());
        self
    }

    pub fn kind(&self) -> LogKind {
        self.payload.kind()
    }
}
