//! Staff actions: log a visit, log a missed visit, extend a protocol.

use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use super::schedule::{next_expected_after_miss, next_expected_after_visit};
use super::TrackingError;
use crate::clock::{add_days, is_supported_date, Clock};
use crate::db::{DatabaseError, ProtocolStore};
use crate::models::enums::ProtocolStatus;
use crate::models::{LogPayload, Protocol, ProtocolLogEntry, ProtocolUpdate};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisitRequest {
    /// Defaults to today.
    pub visit_date: Option<NaiveDate>,
    pub weight: Option<f64>,
    pub dose: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MissedVisitRequest {
    pub missed_date: Option<NaiveDate>,
    pub reason: String,
    pub note: Option<String>,
}

/// Longest single extension accepted (ten years).
pub const MAX_EXTENSION_DAYS: i64 = 3_650;

#[derive(Debug, Clone, Deserialize)]
pub struct ExtendRequest {
    pub days: i64,
    /// Extension anchor; defaults to the current end date, else today.
    pub from_date: Option<NaiveDate>,
    /// Sessions added to the budget for session-based protocols.
    #[serde(default)]
    pub additional_sessions: u32,
}

/// Record an attended visit: appends the log, consumes a session and moves
/// the next expected date forward.
pub fn log_visit(
    store: &dyn ProtocolStore,
    protocol_id: &Uuid,
    request: &VisitRequest,
    clock: &dyn Clock,
) -> Result<Protocol, TrackingError> {
    let visit_date = checked_request_date(request.visit_date, clock)?;
    let protocol = store.get_protocol(protocol_id)?;

    let sessions_used = protocol.sessions_used.saturating_add(1);
    if let Some(total) = protocol.total_sessions.filter(|total| sessions_used > *total) {
        return Err(TrackingError::SessionsExhausted {
            protocol_id: protocol.id,
            total_sessions: total,
        });
    }

    let payload = if request.weight.is_some() || request.dose.is_some() {
        LogPayload::Injection {
            weight: request.weight,
            dose: request.dose.clone(),
        }
    } else {
        LogPayload::Visit
    };
    let entry = ProtocolLogEntry::new(protocol.id, protocol.patient_id, visit_date, payload)
        .with_note(request.note.clone());

    // A back-dated visit never rewinds the last visit date.
    let last_visit_date = protocol
        .last_visit_date
        .map_or(visit_date, |last| last.max(visit_date));
    let next_expected_date =
        next_expected_after_visit(&protocol.frequency, &protocol.scheduled_days, last_visit_date)
            .ok_or(TrackingError::DateOutOfRange { date: last_visit_date })?;
    let update = ProtocolUpdate {
        sessions_used: Some(sessions_used),
        last_visit_date: Some(last_visit_date),
        next_expected_date: Some(next_expected_date),
        ..Default::default()
    };

    let updated = store.log_and_update(&entry, &update).map_err(|e| match e {
        DatabaseError::ConstraintViolation(_) => TrackingError::SessionsExhausted {
            protocol_id: protocol.id,
            total_sessions: protocol.total_sessions.unwrap_or_default(),
        },
        other => other.into(),
    })?;

    tracing::info!(
        protocol_id = %protocol.id,
        visit_date = %visit_date,
        sessions_used,
        "Visit logged"
    );
    Ok(updated)
}

/// Record a missed visit and push the next expected date out by the
/// frequency's interval.
pub fn log_missed(
    store: &dyn ProtocolStore,
    protocol_id: &Uuid,
    request: &MissedVisitRequest,
    clock: &dyn Clock,
) -> Result<Protocol, TrackingError> {
    let reason = request.reason.trim();
    if reason.is_empty() {
        return Err(TrackingError::MissingReason);
    }

    let missed_date = checked_request_date(request.missed_date, clock)?;
    let protocol = store.get_protocol(protocol_id)?;
    let next_expected_date = next_expected_after_miss(&protocol.frequency, missed_date)
        .ok_or(TrackingError::DateOutOfRange { date: missed_date })?;

    let entry = ProtocolLogEntry::new(
        protocol.id,
        protocol.patient_id,
        missed_date,
        LogPayload::Missed {
            reason: Some(reason.to_string()),
        },
    )
    .with_note(request.note.clone());
    let update = ProtocolUpdate {
        next_expected_date: Some(next_expected_date),
        ..Default::default()
    };

    let updated = store.log_and_update(&entry, &update)?;
    tracing::info!(protocol_id = %protocol.id, missed_date = %missed_date, "Missed visit logged");
    Ok(updated)
}

/// Push the end date out by `days` and reactivate the protocol.
pub fn extend_protocol(
    store: &dyn ProtocolStore,
    protocol_id: &Uuid,
    request: &ExtendRequest,
    clock: &dyn Clock,
) -> Result<Protocol, TrackingError> {
    if !(1..=MAX_EXTENSION_DAYS).contains(&request.days) {
        return Err(TrackingError::InvalidExtension { days: request.days });
    }
    if let Some(from) = request.from_date.filter(|d| !is_supported_date(*d)) {
        return Err(TrackingError::DateOutOfRange { date: from });
    }

    let protocol = store.get_protocol(protocol_id)?;
    let anchor = request
        .from_date
        .or(protocol.end_date)
        .unwrap_or_else(|| clock.today());
    let end_date = add_days(anchor, request.days)
        .filter(|d| is_supported_date(*d))
        .ok_or(TrackingError::DateOutOfRange { date: anchor })?;

    let total_sessions = match (protocol.total_sessions, request.additional_sessions) {
        (_, 0) => None,
        (current, extra) => {
            let current = current.unwrap_or_default();
            let total = current
                .checked_add(extra)
                .ok_or(TrackingError::SessionBudgetOverflow {
                    total_sessions: current,
                    additional_sessions: extra,
                })?;
            Some(total)
        }
    };

    let update = ProtocolUpdate {
        status: Some(ProtocolStatus::Active),
        end_date: Some(end_date),
        total_sessions,
        ..Default::default()
    };
    let updated = store.update_protocol(&protocol.id, &update)?;

    tracing::info!(
        protocol_id = %protocol.id,
        days = request.days,
        end_date = %end_date,
        "Protocol extended"
    );
    Ok(updated)
}

/// The date a staff action applies to: the requested one, else today.
fn checked_request_date(requested: Option<NaiveDate>, clock: &dyn Clock) -> Result<NaiveDate, TrackingError> {
    match requested {
        Some(date) if !is_supported_date(date) => Err(TrackingError::DateOutOfRange { date }),
        Some(date) => Ok(date),
        None => Ok(clock.today()),
    }
}
