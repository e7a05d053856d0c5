//! Deterministic regex extraction of event details.
//!
//! Fills whatever the model missed. Relative dates resolve against a fixed
//! reference date so the same text always yields the same details.

use std::sync::OnceLock;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use regex::Regex;

use super::details::ExtractedDetails;

const WEEKDAYS: [(&str, Weekday); 7] = [
    ("monday", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("sunday", Weekday::Sun),
];

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Words dropped from a title candidate.
const TITLE_NOISE: &[&str] = &[
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
    "mondays", "tuesdays", "wednesdays", "thursdays", "fridays", "saturdays", "sundays",
    "morning", "afternoon", "evening", "next", "this", "today", "tomorrow", "new",
];

macro_rules! regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).unwrap_or_else(|e| panic!("bad pattern: {e}")))
        }
    };
}

regex!(weekday_re, r"(?i)\b(monday|tuesday|wednesday|thursday|friday|saturday|sunday)s?\b");
regex!(relative_day_re, r"(?i)\b(today|tomorrow)\b");
regex!(iso_date_re, r"\b(\d{4}-\d{2}-\d{2})\b");
regex!(
    month_day_re,
    r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)\.?\s+(\d{1,2})(?:st|nd|rd|th)?\b"
);
regex!(
    time_range_re,
    r"(?i)\b(\d{1,2}(?::\d{2})?\s*(?:am|pm))\s*(?:-|–|to|until)\s*(\d{1,2}(?::\d{2})?\s*(?:am|pm))"
);
regex!(clock_re, r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b");
regex!(part_of_day_re, r"(?i)\b(morning|afternoon|evening)\b");
regex!(age_range_re, r"(?i)\bages?\s+(\d{1,2})\s*(?:-|–|to)\s*(\d{1,2})\b");
regex!(age_plus_re, r"(?i)\bages?\s+(\d{1,2})\s*\+");
regex!(price_re, r"\$\s*(\d+(?:\.\d{1,2})?)");
regex!(free_re, r"(?i)\bfree\b");
regex!(
    capacity_re,
    r"(?i)\b(?:max(?:imum)?|up to|limit(?:ed)?(?: to)?|capacity(?: of)?)\s+(-?\d+)"
);
regex!(spots_re, r"(?i)(-?\d+)\s+(?:spots|seats|places)\b");
regex!(
    location_re,
    r"\b(?:at|in)\s+(?:the\s+)?([A-Z][\w'&-]*(?:\s+[A-Z][\w'&-]*)*)"
);
regex!(
    title_re,
    r"(?i)\b(?:create|plan|organi[sz]e|schedule|host|set up)\s+(?:an?\s+|the\s+|my\s+)?(.+?)(?:\s+(?:for|on|at|in|with|from|starting)\b|[,.;!]|$)"
);

/// Extract whatever details the text states outright.
pub fn extract(text: &str, reference_date: NaiveDate) -> ExtractedDetails {
    let (start_time, end_time) = times(text);
    let (age_min, age_max) = ages(text);
    ExtractedDetails {
        title: title(text),
        description: None,
        start_date: date(text, reference_date),
        start_time,
        end_time,
        location: location(text),
        age_min,
        age_max,
        capacity: capacity(text),
        price: price(text),
        ticket_types: Vec::new(),
    }
}

/// Next occurrence of `weekday` strictly after `reference`.
pub fn next_weekday(reference: NaiveDate, weekday: Weekday) -> NaiveDate {
    let ahead = (weekday.num_days_from_monday() as i64
        - reference.weekday().num_days_from_monday() as i64)
        .rem_euclid(7);
    let ahead = if ahead == 0 { 7 } else { ahead };
    reference + Duration::days(ahead)
}

fn date(text: &str, reference: NaiveDate) -> Option<NaiveDate> {
    if let Some(caps) = iso_date_re().captures(text) {
        if let Ok(date) = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d") {
            return Some(date);
        }
    }
    if let Some(caps) = month_day_re().captures(text) {
        let month_name = caps[1].to_lowercase();
        let month = MONTHS.iter().position(|m| month_name.starts_with(m))? as u32 + 1;
        let day: u32 = caps[2].parse().ok()?;
        let this_year = NaiveDate::from_ymd_opt(reference.year(), month, day)?;
        return if this_year < reference {
            NaiveDate::from_ymd_opt(reference.year() + 1, month, day)
        } else {
            Some(this_year)
        };
    }
    if let Some(caps) = relative_day_re().captures(text) {
        return Some(match caps[1].to_lowercase().as_str() {
            "today" => reference,
            _ => reference + Duration::days(1),
        });
    }
    let caps = weekday_re().captures(text)?;
    let name = caps[1].to_lowercase();
    let (_, weekday) = WEEKDAYS.iter().find(|(n, _)| *n == name)?;
    Some(next_weekday(reference, *weekday))
}

fn times(text: &str) -> (Option<NaiveTime>, Option<NaiveTime>) {
    if let Some(caps) = time_range_re().captures(text) {
        return (clock(&caps[1]), clock(&caps[2]));
    }
    if let Some(caps) = clock_re().captures(text) {
        return (clock(&caps[0]), None);
    }
    let Some(caps) = part_of_day_re().captures(text) else {
        return (None, None);
    };
    let (start, end) = match caps[1].to_lowercase().as_str() {
        "morning" => (9, 12),
        "afternoon" => (13, 16),
        _ => (18, 20),
    };
    (
        NaiveTime::from_hms_opt(start, 0, 0),
        NaiveTime::from_hms_opt(end, 0, 0),
    )
}

/// `9am`, `10:30 pm`.
fn clock(raw: &str) -> Option<NaiveTime> {
    let caps = clock_re().captures(raw)?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
    if hour == 0 || hour > 12 {
        return None;
    }
    let hour = match (caps[3].to_lowercase().as_str(), hour) {
        ("am", 12) => 0,
        ("am", h) => h,
        ("pm", 12) => 12,
        (_, h) => h + 12,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn ages(text: &str) -> (Option<i64>, Option<i64>) {
    if let Some(caps) = age_range_re().captures(text) {
        return (caps[1].parse().ok(), caps[2].parse().ok());
    }
    if let Some(caps) = age_plus_re().captures(text) {
        return (caps[1].parse().ok(), None);
    }
    (None, None)
}

fn price(text: &str) -> Option<f64> {
    if let Some(caps) = price_re().captures(text) {
        return caps[1].parse().ok();
    }
    free_re().is_match(text).then_some(0.0)
}

fn capacity(text: &str) -> Option<i64> {
    capacity_re()
        .captures(text)
        .or_else(|| spots_re().captures(text))
        .and_then(|caps| caps[1].parse().ok())
}

fn location(text: &str) -> Option<String> {
    location_re().captures_iter(text).find_map(|caps| {
        let place = caps[1].trim().to_string();
        let lower = place.to_lowercase();
        let is_calendar_word = WEEKDAYS.iter().any(|(d, _)| lower.starts_with(d))
            || MONTHS.iter().any(|m| lower.starts_with(m));
        (!is_calendar_word).then_some(place)
    })
}

fn title(text: &str) -> Option<String> {
    let caps = title_re().captures(text)?;
    let words: Vec<String> = caps[1]
        .split_whitespace()
        .filter(|w| !TITLE_NOISE.contains(&w.to_lowercase().as_str()))
        .map(capitalize)
        .collect();
    (!words.is_empty()).then(|| words.join(" "))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn pottery_request_is_fully_extracted() {
        let details = extract(
            "Create a Saturday morning pottery workshop for ages 5-8, $20, max 15 spots",
            monday(),
        );
        assert_eq!(details.title.as_deref(), Some("Pottery Workshop"));
        assert_eq!(details.start_date, NaiveDate::from_ymd_opt(2026, 10, 24));
        assert_eq!(details.start_time, NaiveTime::from_hms_opt(9, 0, 0));
        assert_eq!(details.end_time, NaiveTime::from_hms_opt(12, 0, 0));
        assert_eq!((details.age_min, details.age_max), (Some(5), Some(8)));
        assert_eq!(details.price, Some(20.0));
        assert_eq!(details.capacity, Some(15));
        assert_eq!(details.location, None);
    }

    #[test]
    fn weekday_resolves_strictly_after_reference() {
        let saturday = NaiveDate::from_ymd_opt(2026, 10, 24).unwrap();
        assert_eq!(
            next_weekday(saturday, Weekday::Sat),
            NaiveDate::from_ymd_opt(2026, 10, 31).unwrap()
        );
        assert_eq!(
            next_weekday(monday(), Weekday::Tue),
            NaiveDate::from_ymd_opt(2026, 10, 20).unwrap()
        );
    }

    #[test]
    fn explicit_times_and_locations() {
        let details = extract(
            "Plan a science fair on Nov 3rd from 10am to 1:30pm at the Maple Grove Library",
            monday(),
        );
        assert_eq!(details.title.as_deref(), Some("Science Fair"));
        assert_eq!(details.start_date, NaiveDate::from_ymd_opt(2026, 11, 3));
        assert_eq!(details.start_time, NaiveTime::from_hms_opt(10, 0, 0));
        assert_eq!(details.end_time, NaiveTime::from_hms_opt(13, 30, 0));
        assert_eq!(details.location.as_deref(), Some("Maple Grove Library"));
    }

    #[test]
    fn past_month_day_rolls_into_next_year() {
        let details = extract("host a picnic on March 2", monday());
        assert_eq!(details.start_date, NaiveDate::from_ymd_opt(2027, 3, 2));
    }

    #[test]
    fn negative_capacity_is_kept_for_validation() {
        let details = extract("make it max -5 spots", monday());
        assert_eq!(details.capacity, Some(-5));
    }

    #[test]
    fn free_events_have_zero_price() {
        assert_eq!(extract("a free nature walk", monday()).price, Some(0.0));
    }

    #[test]
    fn unrelated_text_extracts_nothing() {
        assert!(extract("what can you do?", monday()).is_empty());
    }
}
