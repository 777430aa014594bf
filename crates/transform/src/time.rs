//! Local wall-clock time handling for per-line sources.
//!
//! Per-line files only carry a time of day; the calendar date is encoded in
//! the storage key (`.../Ichtegem_011024/...` is 1 October 2024).

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

/// Time zone of per-line station clocks.
pub const DEFAULT_SOURCE_TIMEZONE: Tz = chrono_tz::Europe::Paris;

/// Tried in order.
const TIME_FORMATS: [&str; 3] = ["%I:%M %p", "%H:%M %p", "%H:%M"];

static KEY_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/(Ichtegem|La_Madeleine)_([0-9]{6})/").expect("key date pattern")
});

/// Calendar date (`DDMMYY`) embedded in a per-line source key.
pub fn extract_key_date(source_key: &str) -> Option<NaiveDate> {
    let caps = KEY_DATE_RE.captures(source_key)?;
    NaiveDate::parse_from_str(caps.get(2)?.as_str(), "%d%m%y").ok()
}

/// Combine a free-text local time with a calendar date in `tz` and convert
/// to UTC.
///
/// Ambiguous times (autumn fall-back) resolve to the earlier instant. Times
/// inside a spring-forward gap use the offset in effect just before it.
pub fn local_time_to_utc(
    time_local: Option<&str>,
    base_date: Option<NaiveDate>,
    tz: Tz,
) -> Option<DateTime<Utc>> {
    let text = time_local?.trim();
    let date = base_date?;
    if text.is_empty() {
        return None;
    }

    let time = TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(text, fmt).ok())?;
    let naive = date.and_time(time);

    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => {
            let before = tz
                .from_local_datetime(&(naive - Duration::hours(1)))
                .earliest()?;
            let offset = before.offset().fix().local_minus_utc();
            let utc = naive - Duration::seconds(i64::from(offset));
            Some(Utc.from_utc_datetime(&utc))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn test_extract_key_date() {
        assert_eq!(
            extract_key_date("raw/Ichtegem_011024/data.jsonl"),
            date(2024, 10, 1)
        );
        assert_eq!(
            extract_key_date("raw/La_Madeleine_051024/part-0.jsonl"),
            date(2024, 10, 5)
        );
    }

    #[test]
    fn test_extract_key_date_rejects_bad_keys() {
        assert_eq!(extract_key_date("raw/Ichtegem/data.jsonl"), None);
        assert_eq!(extract_key_date("raw/Ichtegem_321324/data.jsonl"), None);
        assert_eq!(extract_key_date("raw/InfoClimat_011024/data.jsonl"), None);
    }

    #[test]
    fn test_twelve_hour_summer_time() {
        // CEST is UTC+2
        let utc = local_time_to_utc(Some("12:00 PM"), date(2024, 7, 1), DEFAULT_SOURCE_TIMEZONE)
            .unwrap();
        assert_eq!(utc.to_rfc3339(), "2024-07-01T10:00:00+00:00");

        let utc = local_time_to_utc(Some("12:04 AM"), date(2024, 7, 1), DEFAULT_SOURCE_TIMEZONE)
            .unwrap();
        assert_eq!(utc.to_rfc3339(), "2024-06-30T22:04:00+00:00");
    }

    #[test]
    fn test_twenty_four_hour_winter_time() {
        // CET is UTC+1
        let utc = local_time_to_utc(Some("23:30"), date(2024, 12, 1), DEFAULT_SOURCE_TIMEZONE)
            .unwrap();
        assert_eq!(utc.to_rfc3339(), "2024-12-01T22:30:00+00:00");
    }

    #[test]
    fn test_dst_edges() {
        // 02:30 does not exist on 31 March 2024
        let gap = local_time_to_utc(Some("2:30 AM"), date(2024, 3, 31), DEFAULT_SOURCE_TIMEZONE)
            .unwrap();
        assert_eq!(gap.hour(), 1);
        assert_eq!(gap.minute(), 30);

        // 02:30 happens twice on 27 October 2024; take the first
        let ambiguous =
            local_time_to_utc(Some("2:30 AM"), date(2024, 10, 27), DEFAULT_SOURCE_TIMEZONE)
                .unwrap();
        assert_eq!(ambiguous.to_rfc3339(), "2024-10-27T00:30:00+00:00");
    }

    #[test]
    fn test_missing_or_unparseable_inputs() {
        let tz = DEFAULT_SOURCE_TIMEZONE;
        assert_eq!(local_time_to_utc(None, date(2024, 7, 1), tz), None);
        assert_eq!(local_time_to_utc(Some("12:00 PM"), None, tz), None);
        assert_eq!(local_time_to_utc(Some(""), date(2024, 7, 1), tz), None);
        assert_eq!(local_time_to_utc(Some("noon"), date(2024, 7, 1), tz), None);
    }
}
