use chrono::{DateTime, FixedOffset, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

const ISO_LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const HARNESS_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

// `EEE MMM dd HH:mm:ss zzz yyyy`, as written by the test harness.
static HARNESS_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<head>[A-Za-z]{3}\s+[A-Za-z]{3}\s+\d{1,2}\s+\d{1,2}:\d{2}:\d{2})\s+(?P<zone>\S+)\s+(?P<year>\d{4})$",
    )
    .expect("harness date pattern is valid")
});

static NUMERIC_ZONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:GMT|UTC)?(?P<sign>[+-])(?P<hours>\d{1,2}):?(?P<minutes>\d{2})?$")
        .expect("numeric zone pattern is valid")
});

const ZONE_ABBREVIATIONS: &[(&str, i32)] = &[
    ("UTC", 0),
    ("GMT", 0),
    ("Z", 0),
    ("WET", 0),
    ("BST", 3600),
    ("CET", 3600),
    ("CEST", 2 * 3600),
    ("EET", 2 * 3600),
    ("EEST", 3 * 3600),
    ("MSK", 3 * 3600),
    ("IST", 5 * 3600 + 1800),
    ("CST", -6 * 3600),
    ("CDT", -5 * 3600),
    ("EST", -5 * 3600),
    ("EDT", -4 * 3600),
    ("MST", -7 * 3600),
    ("MDT", -6 * 3600),
    ("PST", -8 * 3600),
    ("PDT", -7 * 3600),
    ("AKST", -9 * 3600),
    ("HST", -10 * 3600),
    ("JST", 9 * 3600),
    ("KST", 9 * 3600),
    ("AEST", 10 * 3600),
    ("AEDT", 11 * 3600),
];

/// Parse a test result timestamp.
///
/// Accepts RFC 3339, ISO local date-times (taken as UTC) and the harness
/// format `Tue Mar 04 10:20:30 PST 2008`. Returns `None` when nothing matches.
pub fn parse_result_time(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed);
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, ISO_LOCAL_FORMAT) {
        return naive.and_local_timezone(utc_offset()).single();
    }

    let caps = HARNESS_DATE.captures(raw)?;
    let head = caps["head"].split_whitespace().collect::<Vec<_>>().join(" ");
    let naive =
        NaiveDateTime::parse_from_str(&format!("{} {}", head, &caps["year"]), HARNESS_FORMAT)
            .ok()?;
    let offset = zone_offset(&caps["zone"]).unwrap_or_else(|| {
        tracing::debug!(zone = &caps["zone"], "unknown time zone, assuming UTC");
        utc_offset()
    });
    naive.and_local_timezone(offset).single()
}

fn zone_offset(zone: &str) -> Option<FixedOffset> {
    let upper = zone.to_ascii_uppercase();
    if let Some((_, secs)) = ZONE_ABBREVIATIONS.iter().find(|(name, _)| *name == upper) {
        return FixedOffset::east_opt(*secs);
    }
    let caps = NUMERIC_ZONE.captures(&upper)?;
    let hours: i32 = caps["hours"].parse().ok()?;
    let minutes: i32 = caps
        .name("minutes")
        .map(|m| m.as_str().parse().unwrap_or(0))
        .unwrap_or(0);
    let secs = hours * 3600 + minutes * 60;
    let secs = if &caps["sign"] == "-" { -secs } else { secs };
    FixedOffset::east_opt(secs)
}

fn utc_offset() -> FixedOffset {
    FixedOffset::east_opt(0).expect("zero offset is valid")
}
