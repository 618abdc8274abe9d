//! Next-expected-visit arithmetic used by the staff actions.

use chrono::{Datelike, Months, NaiveDate, Weekday};

use crate::clock::{add_days, next_weekday_after};
use crate::models::frequency::DEFAULT_INTERVAL_DAYS;
use crate::models::Frequency;

/// Window searched for the next scheduled weekday on twice-weekly schedules.
const SCHEDULE_SCAN_DAYS: i64 = 14;

/// When the patient is next expected after a visit on `visit_date`, or
/// `None` when that falls past the end of the calendar.
pub fn next_expected_after_visit(
    frequency: &Frequency,
    scheduled_days: &[Weekday],
    visit_date: NaiveDate,
) -> Option<NaiveDate> {
    let default = add_days(visit_date, DEFAULT_INTERVAL_DAYS)?;
    if scheduled_days.is_empty() {
        return Some(default);
    }

    match frequency {
        Frequency::TwiceWeekly => Some(
            (1..=SCHEDULE_SCAN_DAYS)
                .filter_map(|i| add_days(visit_date, i))
                .find(|d| scheduled_days.contains(&d.weekday()))
                .unwrap_or(default),
        ),
        Frequency::Weekly => {
            // Earliest day of the week (Sunday first) among the scheduled ones.
            let target = scheduled_days
                .iter()
                .min_by_key(|d| d.num_days_from_sunday())
                .copied();
            match target {
                Some(day) if default.weekday() != day => next_weekday_after(default, &[day]),
                _ => Some(default),
            }
        }
        Frequency::EveryTenDays => add_days(visit_date, 10),
        Frequency::EveryTwoWeeks => add_days(visit_date, 14),
        Frequency::Monthly => visit_date.checked_add_months(Months::new(1)),
        _ => Some(default),
    }
}

/// When the patient is next expected after missing a visit on `missed_date`.
pub fn next_expected_after_miss(frequency: &Frequency, missed_date: NaiveDate) -> Option<NaiveDate> {
    add_days(missed_date, frequency.missed_visit_interval_days())
}
