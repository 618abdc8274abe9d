//! Clock/calendar adapter.
//!
//! Every date the core reasons about is a calendar date in the practice's
//! reference zone. Components never read the wall clock directly; they take
//! a `Clock` so tests can pin "today".

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

/// Source of "now" plus the zone used to turn instants into calendar dates.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn timezone(&self) -> Tz;

    /// Today's date in the practice-local zone.
    fn today(&self) -> NaiveDate {
        self.local_date(self.now())
    }

    /// Calendar date of an instant in the practice-local zone.
    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.timezone()).date_naive()
    }

    /// First instant (UTC) of the given practice-local date.
    fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        local_midnight(self.timezone(), date)
    }
}

/// Wall-clock time in a fixed practice zone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn timezone(&self) -> Tz {
        self.tz
    }
}

/// A clock frozen at one instant. Used for `as_of` reads and in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Utc>,
    tz: Tz,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>, tz: Tz) -> Self {
        Self { now, tz }
    }

    /// Noon on `date` in `tz`.
    pub fn on_date(date: NaiveDate, tz: Tz) -> Self {
        let noon = date.and_hms_opt(12, 0, 0).unwrap_or_default();
        let now = tz
            .from_local_datetime(&noon)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&noon));
        Self { now, tz }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn timezone(&self) -> Tz {
        self.tz
    }
}

fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    // DST gaps never fall on midnight in the zones we serve, but fall back to
    // treating the wall time as UTC rather than panicking.
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

/// Whole days from `from` to `to` (negative when `to` is earlier).
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// `date` shifted by `days`, or `None` past the calendar's range.
pub fn add_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    date.checked_add_signed(Duration::try_days(days)?)
}

const SUPPORTED_YEARS: std::ops::RangeInclusive<i32> = 1900..=9999;

/// Whether `date` falls in the years the service reasons about. Dates from
/// requests outside this window are rejected before any arithmetic, and
/// stored timestamps stay representable as RFC 3339.
pub fn is_supported_date(date: NaiveDate) -> bool {
    SUPPORTED_YEARS.contains(&date.year())
}

/// First day of the supported window.
pub fn earliest_supported_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(*SUPPORTED_YEARS.start(), 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Sunday that opens the calendar week containing `date`.
pub fn week_start(date: NaiveDate) -> Option<NaiveDate> {
    let offset = date.weekday().num_days_from_sunday() as i64;
    add_days(date, -offset)
}

/// Saturday that closes the calendar week containing `date`.
pub fn week_end(date: NaiveDate) -> Option<NaiveDate> {
    add_days(week_start(date)?, 6)
}

/// Lowercase English weekday name, as stored in schedules.
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Sun => "sunday",
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
    }
}

/// Parse a weekday name ("monday", "Mon", "THU").
pub fn parse_weekday(raw: &str) -> Option<Weekday> {
    raw.trim().parse::<Weekday>().ok()
}

/// First date strictly after `after` that falls on one of `days`.
pub fn next_weekday_after(after: NaiveDate, days: &[Weekday]) -> Option<NaiveDate> {
    if days.is_empty() {
        return None;
    }
    (1..=7)
        .filter_map(|i| add_days(after, i))
        .find(|d| days.contains(&d.weekday()))
}
