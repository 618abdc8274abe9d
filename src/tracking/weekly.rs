//! Weekly visit quota for twice-weekly protocols.

use chrono::Weekday;
use serde::Serialize;

use crate::models::protocol::weekday_names;
use crate::models::{Frequency, Protocol};

/// Visits required per calendar week on a twice-weekly schedule.
pub const TWICE_WEEKLY_REQUIRED: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: u32,
    pub required: u32,
    #[serde(with = "weekday_names")]
    pub scheduled_days: Vec<Weekday>,
}

impl Progress {
    pub fn is_met(&self) -> bool {
        self.completed >= self.required
    }
}

/// Progress toward this week's quota, or `None` when the protocol's
/// frequency carries no weekly quota.
///
/// `visits_this_week` must already be restricted to Sunday..=Saturday of the
/// week in question.
pub fn weekly_progress(protocol: &Protocol, visits_this_week: u32) -> Option<Progress> {
    match protocol.frequency {
        Frequency::TwiceWeekly => Some(Progress {
            completed: visits_this_week,
            required: TWICE_WEEKLY_REQUIRED,
            scheduled_days: protocol.scheduled_days.clone(),
        }),
        _ => None,
    }
}
