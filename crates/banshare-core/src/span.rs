//! Compact time spans as used in configuration: `30s`, `3m`, `48h`, `2d`, `5w`.

use std::time::Duration;

use crate::{Result, ShareError};

const UNITS: [(char, u64); 5] = [
    ('w', 7 * 24 * 60 * 60),
    ('d', 24 * 60 * 60),
    ('h', 60 * 60),
    ('m', 60),
    ('s', 1),
];

/// Parse a span made of a non-negative integer and a unit suffix.
pub fn parse_span(raw: &str) -> Result<Duration> {
    let span = raw.trim().to_ascii_lowercase();
    let Some(unit) = span.chars().last() else {
        return Err(ShareError::InvalidSpan(raw.to_string()));
    };

    let seconds_per_unit = UNITS
        .iter()
        .find(|(suffix, _)| *suffix == unit)
        .map(|(_, secs)| *secs)
        .ok_or_else(|| ShareError::InvalidSpan(format!("{raw}: unknown unit `{unit}`")))?;

    let amount: u64 = span[..span.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| ShareError::InvalidSpan(format!("{raw}: expected a whole number")))?;

    amount
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| ShareError::InvalidSpan(format!("{raw}: too large")))
}

/// Render a duration using the largest unit that divides it exactly.
#[must_use]
pub fn format_span(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }
    UNITS
        .iter()
        .find(|(_, per)| secs % per == 0)
        .map_or_else(|| format!("{secs}s"), |(unit, per)| format!("{}{unit}", secs / per))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_span("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_span("3m").unwrap(), Duration::from_secs(180));
        assert_eq!(parse_span("48h").unwrap(), Duration::from_secs(48 * 3600));
        assert_eq!(parse_span("2d").unwrap(), Duration::from_secs(2 * 86400));
        assert_eq!(parse_span(" 5W ").unwrap(), Duration::from_secs(5 * 604_800));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_span("").is_err());
        assert!(parse_span("m").is_err());
        assert!(parse_span("10").is_err());
        assert!(parse_span("3y").is_err());
        assert!(parse_span("-3m").is_err());
        assert!(parse_span("1.5h").is_err());
    }

    #[test]
    fn test_format_span() {
        assert_eq!(format_span(Duration::from_secs(180)), "3m");
        assert_eq!(format_span(Duration::from_secs(72 * 60)), "72m");
        assert_eq!(format_span(Duration::from_secs(48 * 3600)), "2d");
        assert_eq!(format_span(Duration::from_secs(5 * 604_800)), "5w");
        assert_eq!(format_span(Duration::from_secs(61)), "61s");
        assert_eq!(format_span(Duration::ZERO), "0s");
    }
}
