use chrono::{Datelike, NaiveDate, Weekday};

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The date `days` business days after `start`. The start date itself is not
/// counted; weekends are skipped.
pub fn add_business_days(start: NaiveDate, days: u32) -> NaiveDate {
    let mut date = start;
    let mut remaining = days;
    while remaining > 0 {
        date = match date.succ_opt() {
            Some(next) => next,
            None => return date,
        };
        if is_business_day(date) {
            remaining -= 1;
        }
    }
    date
}

/// Signed business-day distance from `from` to `to`: positive counts the business
/// days in `(from, to]`, negative when `to` is in the past.
pub fn business_days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    if from == to {
        return 0;
    }
    let (start, end, sign) = if from < to { (from, to, 1) } else { (to, from, -1) };

    let mut count = 0i64;
    let mut date = start;
    while date < end {
        date = match date.succ_opt() {
            Some(next) => next,
            None => break,
        };
        if is_business_day(date) {
            count += 1;
        }
    }
    count * sign
}
