//! Repository layer: entity-scoped database operations as free functions
//! over a borrowed connection.

mod patient;
mod protocol;
mod protocol_log;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use uuid::Uuid;

use super::DatabaseError;

pub use patient::*;
pub use protocol::*;
pub use protocol_log::*;

pub(crate) fn date_to_sql(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn timestamp_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|_| DatabaseError::corrupt(field, raw))
}

pub(crate) fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| DatabaseError::corrupt(field, raw))
}

pub(crate) fn parse_opt_date(field: &str, raw: Option<String>) -> Result<Option<NaiveDate>, DatabaseError> {
    raw.filter(|s| !s.is_empty())
        .map(|s| parse_date(field, &s))
        .transpose()
}

pub(crate) fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DatabaseError::corrupt(field, raw))
}

/// True when the error is a UNIQUE constraint hit.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// True when the error is a CHECK constraint hit.
pub(crate) fn is_check_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_CHECK
    )
}
