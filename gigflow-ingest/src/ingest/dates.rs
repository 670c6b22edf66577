//! Date and time phrase resolution
//!
//! Every resolver takes the reference date ("today") as a parameter so the
//! same text always resolves to the same date.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;

use super::types::Precision;

const MONTHS: &str = r"january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec";
const WEEKDAYS: &str = r"monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tues|tue|wed|thurs|thu|fri|sat|sun";

static RE_ISO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap()
});

// "Friday 05 Sep 2025", "5th of September", "05 Sept, 2025"
static RE_DAY_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:(?:{WEEKDAYS}),?\s+)?(\d{{1,2}})(?:st|nd|rd|th)?(?:\s+of)?\s+({MONTHS})\b\.?,?(?:\s+(\d{{4}}))?"
    ))
    .unwrap()
});

// "August 15th", "September 5, 2025", "Sat, Sep 6 2025"
static RE_MONTH_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b({MONTHS})\b\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s+(\d{{4}}))?"
    ))
    .unwrap()
});

// "20/09/2025", "20.09.25"
static RE_NUMERIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})[/.](\d{1,2})[/.](\d{4}|\d{2})\b").unwrap()
});

static RE_RELATIVE_WEEKDAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b(next|this|coming|on)\s+({WEEKDAYS})\b")).unwrap()
});

static RE_TOMORROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\btomorrow\b").unwrap());

// "next February", "in March" (no day)
static RE_RELATIVE_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b(next|this|in|coming)\s+({MONTHS})\b(\s*\d)?")).unwrap()
});

// "7:00pm–10:00pm", "7pm - 11pm", "19:00-23:00", "from 7pm to 11pm"
static RE_TIME_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,2}(?::\d{2})?\s*(?:am|pm)?)\s*(?:-|–|—|to|until|till)\s*(\d{1,2}(?::\d{2})?\s*(?:am|pm)?)(?:\b|$)",
    )
    .unwrap()
});

static RE_TIME_12H: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::([0-5]\d))?\s*(am|pm)\b").unwrap()
});

// Colon only: "20.09" is a dotted date and "15.00" an amount
static RE_TIME_24H: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b").unwrap()
});

/// A resolved date with the precision of the phrase that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateMatch {
    pub date: NaiveDate,
    pub precision: Precision,
    /// Byte offset of the phrase in the scanned text
    pub position: usize,
}

pub fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    let month = match lower.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

pub fn weekday_from_name(name: &str) -> Option<Weekday> {
    let lower = name.to_ascii_lowercase();
    let weekday = match lower.get(..3)? {
        "mon" => Weekday::Mon,
        "tue" => Weekday::Tue,
        "wed" => Weekday::Wed,
        "thu" => Weekday::Thu,
        "fri" => Weekday::Fri,
        "sat" => Weekday::Sat,
        "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(weekday)
}

/// Resolve a day and month without a year against `today`
///
/// A date already behind `today` in the reference year rolls to the
/// following year.
pub fn resolve_without_year(month: u32, day: u32, today: NaiveDate) -> Option<NaiveDate> {
    let candidate = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if candidate < today {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    } else {
        Some(candidate)
    }
}

/// Next `weekday` strictly after `today` (or on `today` when `allow_today`)
pub fn next_weekday(weekday: Weekday, today: NaiveDate, allow_today: bool) -> NaiveDate {
    let current = today.weekday().num_days_from_monday() as i64;
    let target = weekday.num_days_from_monday() as i64;
    let mut ahead = (target - current).rem_euclid(7);
    if ahead == 0 && !allow_today {
        ahead = 7;
    }
    today + Duration::days(ahead)
}

/// First day of the named month's next occurrence
///
/// `next <month>` skips the current month; other qualifiers accept it.
pub fn resolve_month_only(month: u32, qualifier: &str, today: NaiveDate) -> Option<NaiveDate> {
    let skip_current = qualifier.eq_ignore_ascii_case("next");
    let year = if month > today.month() || (month == today.month() && !skip_current) {
        today.year()
    } else {
        today.year() + 1
    };
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn expand_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    Some(if raw.len() == 2 { 2000 + year } else { year })
}

/// All explicit and relative date phrases in `text`, in pattern priority order
pub fn find_dates(text: &str, today: NaiveDate) -> Vec<DateMatch> {
    let mut found = Vec::new();

    for caps in RE_ISO.captures_iter(text) {
        let parsed = (|| {
            let y = caps[1].parse().ok()?;
            let m = caps[2].parse().ok()?;
            let d = caps[3].parse().ok()?;
            NaiveDate::from_ymd_opt(y, m, d)
        })();
        if let (Some(date), Some(whole)) = (parsed, caps.get(0)) {
            found.push(DateMatch { date, precision: Precision::High, position: whole.start() });
        }
    }

    for caps in RE_DAY_MONTH.captures_iter(text) {
        let parsed = (|| {
            let day: u32 = caps[1].parse().ok()?;
            let month = month_from_name(&caps[2])?;
            match caps.get(3) {
                Some(year) => NaiveDate::from_ymd_opt(year.as_str().parse().ok()?, month, day),
                None => resolve_without_year(month, day, today),
            }
        })();
        if let (Some(date), Some(whole)) = (parsed, caps.get(0)) {
            found.push(DateMatch { date, precision: Precision::High, position: whole.start() });
        }
    }

    for caps in RE_MONTH_DAY.captures_iter(text) {
        let parsed = (|| {
            let month = month_from_name(&caps[1])?;
            let day: u32 = caps[2].parse().ok()?;
            match caps.get(3) {
                Some(year) => NaiveDate::from_ymd_opt(year.as_str().parse().ok()?, month, day),
                None => resolve_without_year(month, day, today),
            }
        })();
        if let (Some(date), Some(whole)) = (parsed, caps.get(0)) {
            found.push(DateMatch { date, precision: Precision::High, position: whole.start() });
        }
    }

    for caps in RE_NUMERIC.captures_iter(text) {
        let parsed = (|| {
            let first: u32 = caps[1].parse().ok()?;
            let second: u32 = caps[2].parse().ok()?;
            let year = expand_year(&caps[3])?;
            // Day-first unless only month-first yields a valid date
            NaiveDate::from_ymd_opt(year, second, first)
                .or_else(|| NaiveDate::from_ymd_opt(year, first, second))
        })();
        if let (Some(date), Some(whole)) = (parsed, caps.get(0)) {
            found.push(DateMatch { date, precision: Precision::High, position: whole.start() });
        }
    }

    for caps in RE_RELATIVE_WEEKDAY.captures_iter(text) {
        if let (Some(weekday), Some(whole)) = (weekday_from_name(&caps[2]), caps.get(0)) {
            let allow_today = caps[1].eq_ignore_ascii_case("this");
            found.push(DateMatch {
                date: next_weekday(weekday, today, allow_today),
                precision: Precision::High,
                position: whole.start(),
            });
        }
    }

    if let Some(whole) = RE_TOMORROW.find(text) {
        found.push(DateMatch {
            date: today + Duration::days(1),
            precision: Precision::High,
            position: whole.start(),
        });
    }

    for caps in RE_RELATIVE_MONTH.captures_iter(text) {
        // "in March 5" is a day-month phrase handled above
        if caps.get(3).is_some() {
            continue;
        }
        // "this may be short notice": lowercase "may" is the verb unless "next" leads
        if &caps[2] == "may" && !caps[1].eq_ignore_ascii_case("next") {
            continue;
        }
        let resolved = month_from_name(&caps[2]).and_then(|m| resolve_month_only(m, &caps[1], today));
        if let (Some(date), Some(whole)) = (resolved, caps.get(0)) {
            found.push(DateMatch { date, precision: Precision::Fallback, position: whole.start() });
        }
    }

    found
}

/// Pick the event date from `text`
///
/// Prefers high-precision phrases, then dates on or after `today`, then the
/// earliest phrase in the text.
pub fn find_event_date(text: &str, today: NaiveDate) -> Option<DateMatch> {
    let mut candidates = find_dates(text, today);
    candidates.sort_by_key(|m| {
        (
            m.precision != Precision::High,
            m.date < today,
            m.position,
        )
    });
    candidates.into_iter().next()
}

/// Parse a single clock time such as `7pm`, `7:30 pm`, `19:00` or `noon`
pub fn parse_clock_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    match raw.to_ascii_lowercase().as_str() {
        "noon" | "midday" => return NaiveTime::from_hms_opt(12, 0, 0),
        "midnight" => return NaiveTime::from_hms_opt(0, 0, 0),
        _ => {}
    }

    if let Some(caps) = RE_TIME_12H.captures(raw) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
        if !(1..=12).contains(&hour) {
            return None;
        }
        let is_pm = caps[3].eq_ignore_ascii_case("pm");
        let hour24 = match (hour, is_pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
        return NaiveTime::from_hms_opt(hour24, minute, 0);
    }

    if let Some(caps) = RE_TIME_24H.captures(raw) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }

    None
}

/// Find a start–end time range, e.g. `7:00pm–10:00pm`
///
/// A bare start inherits the end's meridiem (`7-11pm` → 19:00–23:00).
pub fn find_time_range(text: &str) -> Option<(NaiveTime, NaiveTime)> {
    for caps in RE_TIME_RANGE.captures_iter(text) {
        let start_raw = caps[1].trim().to_string();
        let end_raw = caps[2].trim().to_string();
        let has_meridiem = |s: &str| {
            let lower = s.to_ascii_lowercase();
            lower.ends_with("am") || lower.ends_with("pm")
        };
        let has_colon = |s: &str| s.contains(':');

        // Plain numbers like "2-3" are not times
        if !has_meridiem(&start_raw) && !has_meridiem(&end_raw) && !(has_colon(&start_raw) && has_colon(&end_raw)) {
            continue;
        }

        let start_text = if !has_meridiem(&start_raw) && has_meridiem(&end_raw) && !has_colon(&start_raw) {
            let suffix = &end_raw[end_raw.len() - 2..];
            format!("{}{}", start_raw, suffix)
        } else {
            start_raw
        };

        if let (Some(start), Some(end)) = (parse_clock_time(&start_text), parse_clock_time(&end_raw)) {
            return Some((start, end));
        }
    }
    None
}

/// Find the first single clock time in free text
pub fn find_time(text: &str) -> Option<NaiveTime> {
    if let Some(m) = RE_TIME_12H.find(text) {
        return parse_clock_time(m.as_str());
    }
    RE_TIME_24H
        .find(text)
        .and_then(|m| parse_clock_time(m.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    const TODAY: (i32, u32, u32) = (2025, 7, 16);

    fn today() -> NaiveDate {
        d(TODAY.0, TODAY.1, TODAY.2)
    }

    #[test]
    fn test_next_saturday_from_wednesday() {
        let m = find_event_date("Are you free next Saturday?", today()).unwrap();
        assert_eq!(m.date, d(2025, 7, 19));
    }

    #[test]
    fn test_next_february_rolls_to_following_year() {
        let m = find_event_date("We're thinking next February sometime", today()).unwrap();
        assert_eq!(m.date.year(), 2026);
        assert_eq!(m.precision, Precision::Fallback);
    }

    #[test]
    fn test_month_only_later_this_year() {
        let m = find_event_date("a party in October", today()).unwrap();
        assert_eq!(m.date, d(2025, 10, 1));
    }

    #[test]
    fn test_modal_may_is_not_a_month() {
        assert!(find_event_date("Hi, this may be short notice but are you available?", today()).is_none());
        assert!(find_event_date("in may or may not suit", today()).is_none());
        assert_eq!(find_event_date("a party in May", today()).unwrap().date, d(2026, 5, 1));
        assert_eq!(find_event_date("sometime next may", today()).unwrap().date, d(2026, 5, 1));
    }

    #[test]
    fn test_bare_month_day_already_passed_rolls() {
        let m = find_event_date("Our party is on March 3rd", today()).unwrap();
        assert_eq!(m.date, d(2026, 3, 3));
        let m = find_event_date("August 15th works for us", today()).unwrap();
        assert_eq!(m.date, d(2025, 8, 15));
    }

    #[test]
    fn test_digest_style_date_with_weekday() {
        let m = find_event_date("Friday 05 Sep 2025\n7:00pm–10:00pm", today()).unwrap();
        assert_eq!(m.date, d(2025, 9, 5));
    }

    #[test]
    fn test_iso_and_numeric_dates() {
        assert_eq!(find_event_date("on 2025-09-20 at", today()).unwrap().date, d(2025, 9, 20));
        assert_eq!(find_event_date("date: 20/09/2025", today()).unwrap().date, d(2025, 9, 20));
        // Month-first only when day-first is impossible
        assert_eq!(find_event_date("09/20/2025", today()).unwrap().date, d(2025, 9, 20));
    }

    #[test]
    fn test_invalid_dates_yield_nothing() {
        assert!(find_event_date("on 2025-02-30", today()).is_none());
        assert!(find_event_date("31st February 2026", today()).is_none());
    }

    #[test]
    fn test_future_dates_preferred_over_past() {
        let text = "We got engaged on 2024-12-24 and the wedding is 2025-09-20";
        assert_eq!(find_event_date(text, today()).unwrap().date, d(2025, 9, 20));
    }

    #[test]
    fn test_tomorrow() {
        assert_eq!(find_event_date("can you do tomorrow?", today()).unwrap().date, d(2025, 7, 17));
    }

    #[test]
    fn test_this_weekday_allows_today() {
        assert_eq!(next_weekday(Weekday::Wed, today(), true), today());
        assert_eq!(next_weekday(Weekday::Wed, today(), false), d(2025, 7, 23));
    }

    #[test]
    fn test_clock_times() {
        assert_eq!(parse_clock_time("7pm"), Some(t(19, 0)));
        assert_eq!(parse_clock_time("7:30 PM"), Some(t(19, 30)));
        assert_eq!(parse_clock_time("12am"), Some(t(0, 0)));
        assert_eq!(parse_clock_time("19:15"), Some(t(19, 15)));
        assert_eq!(parse_clock_time("noon"), Some(t(12, 0)));
        assert_eq!(parse_clock_time("13pm"), None);
    }

    #[test]
    fn test_time_ranges() {
        assert_eq!(find_time_range("7:00pm–10:00pm"), Some((t(19, 0), t(22, 0))));
        assert_eq!(find_time_range("from 7 - 11pm"), Some((t(19, 0), t(23, 0))));
        assert_eq!(find_time_range("19:00-23:30"), Some((t(19, 0), t(23, 30))));
        assert_eq!(find_time_range("for 2-3 hours"), None);
    }

    #[test]
    fn test_single_time_in_text() {
        assert_eq!(find_time("Wedding at The Grand Hotel, 7pm"), Some(t(19, 0)));
        assert_eq!(find_time("Doors at 19:30"), Some(t(19, 30)));
        assert_eq!(find_time("no time here"), None);
    }

    #[test]
    fn test_dotted_dates_and_amounts_are_not_times() {
        assert_eq!(find_time("Wedding on 20.09.2025 at The Grand Hotel"), None);
        assert_eq!(find_time("Party on 2025-09-20, budget £15.00 per head"), None);
        assert_eq!(parse_clock_time("19.15"), None);
    }
}
