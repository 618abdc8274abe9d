use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

/// Why a manual start was refused. Expected, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartRejection {
    NotWeightLoss,
    NoEmail,
    AlreadyStarted,
    AlreadyReceivedElsewhere,
}

impl StartRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotWeightLoss => "not_weight_loss",
            Self::NoEmail => "no_email",
            Self::AlreadyStarted => "already_started",
            Self::AlreadyReceivedElsewhere => "already_received_elsewhere",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::NotWeightLoss => "Email sequence is only available for weight loss protocols",
            Self::NoEmail => "Patient has no email address on file",
            Self::AlreadyStarted => "Email sequence has already been started for this protocol",
            Self::AlreadyReceivedElsewhere => "Patient has already received the email sequence on another protocol",
        }
    }
}

/// What a tick did for one protocol.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Sent { step_number: u8, subject: String },
    NotYetDue { step_number: u8, due_on: NaiveDate },
    Complete,
    /// Another task in this process is already working on the protocol.
    InFlight,
    /// Nothing was logged; the step is retried next tick.
    SendFailed { step_number: u8, error: String },
    /// Sent but not logged. The step may be sent again on a later tick.
    RecordFailed { step_number: u8, error: String },
    /// Sent, but another worker logged the same step first.
    AlreadyRecorded { step_number: u8 },
    Error { error: String },
}

impl StepOutcome {
    /// True when an email left the building on this tick.
    pub fn dispatched(&self) -> bool {
        matches!(
            self,
            Self::Sent { .. } | Self::RecordFailed { .. } | Self::AlreadyRecorded { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolTickResult {
    pub protocol_id: Uuid,
    pub patient_id: Uuid,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub date: NaiveDate,
    pub protocols_checked: usize,
    pub emails_sent: usize,
    /// Sends whose log append failed (at-least-once exposure).
    pub unrecorded_sends: usize,
    pub results: Vec<ProtocolTickResult>,
}

impl TickReport {
    pub fn new(date: NaiveDate, results: Vec<ProtocolTickResult>) -> Self {
        let emails_sent = results.iter().filter(|r| r.outcome.dispatched()).count();
        let unrecorded_sends = results
            .iter()
            .filter(|r| matches!(r.outcome, StepOutcome::RecordFailed { .. }))
            .count();
        Self {
            date,
            protocols_checked: results.len(),
            emails_sent,
            unrecorded_sends,
            results,
        }
    }
}

/// Result of a successful manual start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartedSequence {
    pub protocol_id: Uuid,
    pub step_number: u8,
    pub subject: String,
    pub drip_start_date: NaiveDate,
}
