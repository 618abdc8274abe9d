//! Session, refill and date-range countdowns.

use chrono::NaiveDate;
use serde::Serialize;

use crate::clock::{add_days, days_between};
use crate::models::enums::DeliveryMethod;
use crate::models::Protocol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefillUrgency {
    Overdue,
    Critical,
    Warning,
    Normal,
}

impl RefillUrgency {
    /// `<= 0` overdue, `1..=7` critical, `8..=14` warning, else normal.
    pub fn from_days(days_until_refill: i64) -> Self {
        match days_until_refill {
            d if d <= 0 => Self::Overdue,
            1..=7 => Self::Critical,
            8..=14 => Self::Warning,
            _ => Self::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefillCountdown {
    pub injections_per_week: f64,
    pub weeks_of_supply: f64,
    pub supply_days: i64,
    pub refill_date: NaiveDate,
    /// Negative once the refill date has passed.
    pub days_until_refill: i64,
    pub urgency: RefillUrgency,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Countdown {
    Refill(RefillCountdown),
    Sessions {
        total_sessions: u32,
        sessions_used: u32,
        sessions_left: u32,
    },
    DateRange {
        start_date: NaiveDate,
        end_date: NaiveDate,
        days_elapsed: i64,
        days_left: i64,
    },
    /// The delivery model needs a countdown but a field it depends on is absent.
    InsufficientData { missing: Vec<&'static str> },
    /// Neither a session budget nor a date range applies.
    NotTracked,
}

impl Countdown {
    pub fn for_protocol(protocol: &Protocol, today: NaiveDate) -> Self {
        match (protocol.delivery, protocol.total_sessions) {
            (DeliveryMethod::TakeHome, Some(total)) => match protocol.start_date {
                Some(start) => match refill_countdown(protocol, total, start, today) {
                    Some(refill) => Self::Refill(refill),
                    // The supply runs past the end of the calendar.
                    None => Self::InsufficientData {
                        missing: vec!["total_sessions"],
                    },
                },
                None => Self::InsufficientData {
                    missing: vec!["start_date"],
                },
            },
            (DeliveryMethod::InClinic, Some(total)) => Self::Sessions {
                total_sessions: total,
                sessions_used: protocol.sessions_used,
                sessions_left: total.saturating_sub(protocol.sessions_used),
            },
            (_, None) => match (protocol.start_date, protocol.end_date) {
                (Some(start), Some(end)) => date_range(start, end, today),
                (None, Some(_)) => Self::InsufficientData {
                    missing: vec!["start_date"],
                },
                _ => Self::NotTracked,
            },
        }
    }

    pub fn missing_fields(&self) -> &[&'static str] {
        match self {
            Self::InsufficientData { missing } => missing,
            _ => &[],
        }
    }
}

fn refill_countdown(
    protocol: &Protocol,
    total: u32,
    start: NaiveDate,
    today: NaiveDate,
) -> Option<RefillCountdown> {
    let injections_per_week = protocol.frequency.injections_per_week();
    let weeks_of_supply = f64::from(total) / injections_per_week;
    let supply_days = (weeks_of_supply * 7.0).round() as i64;
    let refill_date = add_days(start, supply_days)?;
    let days_until_refill = days_between(today, refill_date);
    Some(RefillCountdown {
        injections_per_week,
        weeks_of_supply,
        supply_days,
        refill_date,
        days_until_refill,
        urgency: RefillUrgency::from_days(days_until_refill),
    })
}

fn date_range(start: NaiveDate, end: NaiveDate, today: NaiveDate) -> Countdown {
    let span = days_between(start, end);
    let days_elapsed = days_between(start, today).min(span).max(0);
    let days_left = days_between(today, end).max(0);
    Countdown::DateRange {
        start_date: start,
        end_date: end,
        days_elapsed,
        days_left,
    }
}
