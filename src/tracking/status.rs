//! Visit/adherence classification.
//!
//! Rules are evaluated in order, first match wins:
//! 1. last visit is today                      -> completed_today
//! 2. next expected date is before today       -> overdue
//! 3. today is a scheduled weekday             -> expected_today
//! 4. otherwise                                -> upcoming

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use uuid::Uuid;

use super::countdown::Countdown;
use crate::clock::{days_between, next_weekday_after};
use crate::models::enums::ProtocolStatus;
use crate::models::{Protocol, ProtocolLogEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "date", rename_all = "snake_case")]
pub enum NextVisit {
    Date(NaiveDate),
    NoFixedSchedule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum VisitState {
    CompletedToday,
    Overdue {
        days_overdue: i64,
        next_expected_date: NaiveDate,
    },
    ExpectedToday,
    Upcoming { next: NextVisit },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusResult {
    pub protocol_id: Uuid,
    pub as_of: NaiveDate,
    pub protocol_status: ProtocolStatus,
    pub last_visit_date: Option<NaiveDate>,
    pub visit: VisitState,
    pub countdown: Countdown,
    /// Fields whose absence limited the classification.
    pub missing_fields: Vec<&'static str>,
}

/// Latest visit on or before `today` known from either the protocol
/// snapshot or its visit logs.
pub fn last_visit(protocol: &Protocol, logs: &[ProtocolLogEntry], today: NaiveDate) -> Option<NaiveDate> {
    logs.iter()
        .filter(|l| l.protocol_id == protocol.id && l.kind().is_attendance())
        .map(|l| l.log_date)
        .chain(protocol.last_visit_date)
        .filter(|d| *d <= today)
        .max()
}

pub fn classify_visit(protocol: &Protocol, last_visit: Option<NaiveDate>, today: NaiveDate) -> VisitState {
    if last_visit == Some(today) {
        return VisitState::CompletedToday;
    }

    if let Some(next) = protocol.next_expected_date.filter(|next| *next < today) {
        return VisitState::Overdue {
            days_overdue: days_between(next, today),
            next_expected_date: next,
        };
    }

    if protocol.is_scheduled_on(today.weekday()) {
        return VisitState::ExpectedToday;
    }

    let next = protocol
        .next_expected_date
        .or_else(|| next_weekday_after(today, &protocol.scheduled_days))
        .map_or(NextVisit::NoFixedSchedule, NextVisit::Date);
    VisitState::Upcoming { next }
}

/// Classify a protocol as of `today`. Pure; never fails.
pub fn status(protocol: &Protocol, logs: &[ProtocolLogEntry], today: NaiveDate) -> StatusResult {
    let last_visit_date = last_visit(protocol, logs, today);
    let countdown = Countdown::for_protocol(protocol, today);

    let mut missing_fields: Vec<&'static str> = countdown.missing_fields().to_vec();
    if protocol.start_date.is_none() && !missing_fields.contains(&"start_date") {
        missing_fields.push("start_date");
    }

    StatusResult {
        protocol_id: protocol.id,
        as_of: today,
        protocol_status: protocol.status,
        last_visit_date,
        visit: classify_visit(protocol, last_visit_date, today),
        countdown,
        missing_fields,
    }
}
