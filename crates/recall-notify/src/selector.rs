use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Utc};

/// Calendar days roll over at midnight India Standard Time.
pub const REFERENCE_TIMEZONE: &str = "Asia/Kolkata";
/// IST is UTC+05:30 all year; there is no daylight saving to track.
pub const REFERENCE_UTC_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

pub fn reference_offset() -> FixedOffset {
    FixedOffset::east_opt(REFERENCE_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

pub fn reference_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&reference_offset())
}

/// Calendar date of `instant` in the reference timezone.
pub fn reference_date(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&reference_offset()).date_naive()
}

pub fn reference_today() -> NaiveDate {
    reference_date(Utc::now())
}

/// 1 for January 1st, up to 366 on December 31st of a leap year.
pub fn day_of_year(date: NaiveDate) -> u32 {
    date.ordinal()
}

pub fn rotation_index(day_of_year: u32, count: usize) -> Option<usize> {
    if count == 0 {
        return None;
    }
    Some(day_of_year as usize % count)
}

/// Today's item from a list ordered oldest first.
///
/// Pure in (list, date): every caller on the same day gets the same item,
/// and no "last sent" state exists. Adding or removing items changes the
/// list length and so may shift the pick; that is accepted.
pub fn select_for_day<T>(items: &[T], date: NaiveDate) -> Option<&T> {
    rotation_index(day_of_year(date), items.len()).and_then(|index| items.get(index))
}
