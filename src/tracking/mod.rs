//! Protocol adherence tracking: status classification, countdowns, weekly
//! quota and the staff actions that move a protocol's schedule.

pub mod countdown;
pub mod schedule;
pub mod status;
pub mod visits;
pub mod weekly;

pub use countdown::{Countdown, RefillCountdown, RefillUrgency};
pub use status::{status, NextVisit, StatusResult, VisitState};
pub use visits::{extend_protocol, log_missed, log_visit, ExtendRequest, MissedVisitRequest, VisitRequest};
pub use weekly::{weekly_progress, Progress};

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::clock::{week_end, week_start, Clock};
use crate::db::{DatabaseError, LogStore, ProtocolStore};
use crate::models::enums::LogKind;

#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Protocol {protocol_id} has used all {total_sessions} sessions")]
    SessionsExhausted { protocol_id: Uuid, total_sessions: u32 },

    #[error("Extension must be between 1 and {max} days (got {days})", max = visits::MAX_EXTENSION_DAYS)]
    InvalidExtension { days: i64 },

    #[error("Adding {additional_sessions} sessions to {total_sessions} exceeds the session budget limit")]
    SessionBudgetOverflow { total_sessions: u32, additional_sessions: u32 },

    #[error("Date {date} is outside the supported calendar range")]
    DateOutOfRange { date: NaiveDate },

    #[error("A reason is required for a missed visit")]
    MissingReason,
}

/// Read service behind `GET status`: loads the protocol and its visit
/// history up to the clock's today and classifies it as of that day.
pub fn protocol_status<S>(store: &S, protocol_id: &Uuid, clock: &dyn Clock) -> Result<StatusResult, TrackingError>
where
    S: ProtocolStore + LogStore + ?Sized,
{
    let protocol = store.get_protocol(protocol_id)?;
    let today = clock.today();
    let mut visits = Vec::new();
    for kind in LogKind::ATTENDANCE {
        visits.extend(
            store
                .query_logs(protocol_id, Some(kind))?
                .into_iter()
                .filter(|log| log.log_date <= today),
        );
    }
    Ok(status(&protocol, &visits, today))
}

/// Read service behind `GET weeklyProgress`: counts attended visits in the
/// Sunday to Saturday week containing today.
pub fn weekly_progress_for<S>(
    store: &S,
    protocol_id: &Uuid,
    clock: &dyn Clock,
) -> Result<Option<Progress>, TrackingError>
where
    S: ProtocolStore + LogStore + ?Sized,
{
    let protocol = store.get_protocol(protocol_id)?;
    let today = clock.today();
    let (Some(from), Some(to)) = (week_start(today), week_end(today)) else {
        return Err(TrackingError::DateOutOfRange { date: today });
    };
    let mut visits = 0;
    for kind in LogKind::ATTENDANCE {
        visits += store.count_logs_between(protocol_id, kind, from, to)?;
    }
    Ok(weekly_progress(&protocol, visits))
}
