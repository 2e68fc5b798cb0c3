//! Calendar-day classification
//!
//! Answers "was this today?" and "was this yesterday?" by comparing calendar
//! dates, never elapsed time. A habit done at 23:59 and checked at 00:01 was
//! done yesterday, not "within the last day".
//!
//! Every function takes `now` explicitly. The timestamp under test is moved
//! into `now`'s time zone before its date is read, so the zone of `now`
//! decides where midnight falls.

use chrono::{DateTime, Days, Duration, NaiveDate, TimeZone};

/// The calendar date of `t` as seen from the zone of `reference`.
fn local_date<A: TimeZone, B: TimeZone>(t: &DateTime<A>, reference: &DateTime<B>) -> NaiveDate {
    t.with_timezone(&reference.timezone()).date_naive()
}

/// True when `a` and `b` fall on the same (year, month, day) in `b`'s zone.
pub fn is_same_calendar_day<A: TimeZone, B: TimeZone>(a: &DateTime<A>, b: &DateTime<B>) -> bool {
    local_date(a, b) == b.date_naive()
}

pub fn is_today<A: TimeZone, B: TimeZone>(t: &DateTime<A>, now: &DateTime<B>) -> bool {
    is_same_calendar_day(t, now)
}

pub fn is_yesterday<A: TimeZone, B: TimeZone>(t: &DateTime<A>, now: &DateTime<B>) -> bool {
    match now.date_naive().pred_opt() {
        Some(yesterday) => local_date(t, now) == yesterday,
        None => false,
    }
}

/// Same wall-clock time one calendar day earlier.
///
/// Falls back to subtracting 24 hours when that wall-clock time doesn't exist
/// (a DST gap). At the very start of the representable range there is no
/// earlier instant, so `now` itself is returned.
pub fn one_day_before<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    now.clone()
        .checked_sub_days(Days::new(1))
        .or_else(|| now.clone().checked_sub_signed(Duration::days(1)))
        .unwrap_or_else(|| now.clone())
}
