use anyhow::{Context, Result, bail};
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use std::cmp::Ordering;

/// Macau and Hong Kong draws are published in UTC+8 wall-clock time.
const FEED_UTC_OFFSET_SECS: i32 = 8 * 3600;

/// Splits `2025-123`, `2025_123` or `2025123` style labels into numeric parts.
pub fn parse_period(label: &str) -> Option<(u64, Option<u64>)> {
    let label = label.trim();
    match label.split_once(['-', '_']) {
        Some((head, tail)) => Some((parse_digits(head)?, Some(parse_digits(tail)?))),
        None => Some((parse_digits(label)?, None)),
    }
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Chronological order for period labels: `2025-9` before `2025-10`.
/// Labels that do not parse go last, compared as plain strings.
pub fn compare_periods(a: &str, b: &str) -> Ordering {
    match (parse_period(a), parse_period(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Label following `latest`. Falls back to the first period of
/// `current_year` when there is nothing to follow or the label is unreadable.
pub fn next_period(latest: Option<&str>, current_year: i32) -> String {
    let fallback = format!("{}-001", current_year);
    let Some(latest) = latest.map(str::trim) else {
        return fallback;
    };

    match latest.split_once(['-', '_']) {
        Some((head, tail)) => match (parse_digits(head), parse_digits(tail)) {
            (Some(_), Some(tail)) => match tail.checked_add(1) {
                Some(next) => format!("{}-{:03}", head, next),
                None => fallback,
            },
            _ => fallback,
        },
        None => match parse_digits(latest) {
            Some(head) => head.checked_add(1).map_or(fallback, |next| next.to_string()),
            None => fallback,
        },
    }
}

/// Parses a feed open code such as `37,30,49,16,09,12,45`: six regular
/// numbers followed by the special number.
pub fn parse_open_code(open_code: &str) -> Result<([u8; 6], u8)> {
    let parts = open_code
        .split(',')
        .map(|s| {
            s.trim()
                .parse::<u8>()
                .with_context(|| format!("invalid number {:?} in open code {:?}", s, open_code))
        })
        .collect::<Result<Vec<u8>>>()?;

    if parts.len() != 7 {
        bail!("open code {:?} has {} numbers, expected 7", open_code, parts.len());
    }

    let mut numbers = [0u8; 6];
    numbers.copy_from_slice(&parts[..6]);
    Ok((numbers, parts[6]))
}

/// Parses `2025-05-03 21:32:32` (UTC+8) or an RFC 3339 timestamp.
pub fn parse_open_time(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(&value.replace('/', "-"), "%Y-%m-%d %H:%M:%S")
        .with_context(|| format!("invalid open time {:?}", value))?;
    let offset = FixedOffset::east_opt(FEED_UTC_OFFSET_SECS).context("invalid feed offset")?;
    let local = naive
        .and_local_timezone(offset)
        .single()
        .with_context(|| format!("ambiguous open time {:?}", value))?;
    Ok(local.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_period_forms() {
        assert_eq!(parse_period("2025-123"), Some((2025, Some(123))));
        assert_eq!(parse_period("2025_7"), Some((2025, Some(7))));
        assert_eq!(parse_period("2025123"), Some((2025123, None)));
        assert_eq!(parse_period("2025-abc"), None);
        assert_eq!(parse_period(""), None);
    }

    #[test]
    fn test_compare_periods_is_chronological() {
        assert_eq!(compare_periods("2025-9", "2025-10"), Ordering::Less);
        assert_eq!(compare_periods("2024-150", "2025-001"), Ordering::Less);
        assert_eq!(compare_periods("2025-001", "2025-001"), Ordering::Equal);
        assert_eq!(compare_periods("special", "2025-001"), Ordering::Greater);
        // plain string order would put "2025-9" after "2025-10"
        assert_eq!("2025-9".cmp("2025-10"), Ordering::Greater);
    }

    #[test]
    fn test_next_period() {
        assert_eq!(next_period(Some("2025-123"), 2025), "2025-124");
        assert_eq!(next_period(Some("2025-009"), 2025), "2025-010");
        assert_eq!(next_period(Some("2025_5"), 2025), "2025-006");
        assert_eq!(next_period(Some("2025123"), 2025), "2025124");
        assert_eq!(next_period(Some("weird"), 2026), "2026-001");
        assert_eq!(next_period(None, 2026), "2026-001");
    }

    #[test]
    fn test_next_period_at_numeric_limit_falls_back() {
        let tail_max = format!("2025-{}", u64::MAX);
        assert_eq!(next_period(Some(&tail_max), 2025), "2025-001");
        assert_eq!(next_period(Some(&u64::MAX.to_string()), 2026), "2026-001");
    }

    #[test]
    fn test_parse_open_code() {
        let (numbers, special) = parse_open_code("37,30,49,16,09,12,45").unwrap();
        assert_eq!(numbers, [37, 30, 49, 16, 9, 12]);
        assert_eq!(special, 45);

        assert!(parse_open_code("1,2,3").is_err());
        assert!(parse_open_code("1,2,3,4,5,6,x").is_err());
    }

    #[test]
    fn test_parse_open_time_assumes_utc_plus_eight() {
        let ts = parse_open_time("2025-05-03 21:32:32").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 5, 3, 13, 32, 32).unwrap());

        let ts = parse_open_time("2025-05-03T13:32:32Z").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 5, 3, 13, 32, 32).unwrap());

        assert!(parse_open_time("yesterday").is_err());
    }
}
