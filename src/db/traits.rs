//! Collaborator interfaces consumed by the tracking and drip services.
//!
//! Three traits define the storage boundary:
//! - LogStore: append-only per-protocol event history
//! - ProtocolStore: protocol/patient snapshots and field updates
//! - EligibilityQuery: candidate selection for a scheduled drip tick

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::DatabaseError;
use crate::models::enums::LogKind;
use crate::models::{DripCandidate, Patient, Protocol, ProtocolLogEntry, ProtocolUpdate};

pub trait LogStore: Send + Sync {
    /// Append one entry. `drip_email` entries are unique per
    /// `(protocol_id, step_number)`; a repeat fails with `DuplicateStep`.
    fn append_log(&self, entry: &ProtocolLogEntry) -> Result<(), DatabaseError>;

    fn query_logs(
        &self,
        protocol_id: &Uuid,
        kind: Option<LogKind>,
    ) -> Result<Vec<ProtocolLogEntry>, DatabaseError>;

    fn count_logs(&self, protocol_id: &Uuid, kind: LogKind) -> Result<u32, DatabaseError>;

    /// Count across all of a patient's protocols.
    fn count_patient_logs(&self, patient_id: &Uuid, kind: LogKind) -> Result<u32, DatabaseError>;

    /// Count entries dated within `[from, to]`.
    fn count_logs_between(
        &self,
        protocol_id: &Uuid,
        kind: LogKind,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<u32, DatabaseError>;

    fn latest_log_date(&self, protocol_id: &Uuid, kind: LogKind) -> Result<Option<NaiveDate>, DatabaseError>;
}

pub trait ProtocolStore: Send + Sync {
    /// Fails with `NotFound` for an unknown id.
    fn get_protocol(&self, id: &Uuid) -> Result<Protocol, DatabaseError>;

    fn get_patient(&self, id: &Uuid) -> Result<Patient, DatabaseError>;

    /// Apply `update` and return the stored result.
    fn update_protocol(&self, id: &Uuid, update: &ProtocolUpdate) -> Result<Protocol, DatabaseError>;

    /// Append `entry` and apply `update` atomically.
    fn log_and_update(
        &self,
        entry: &ProtocolLogEntry,
        update: &ProtocolUpdate,
    ) -> Result<Protocol, DatabaseError>;
}

pub trait EligibilityQuery: Send + Sync {
    /// Active weight-loss protocols whose patient has an email, created at or
    /// after `created_since` or holding a partially sent sequence.
    fn drip_candidates(&self, created_since: DateTime<Utc>) -> Result<Vec<DripCandidate>, DatabaseError>;
}
