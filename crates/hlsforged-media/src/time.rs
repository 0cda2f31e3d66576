//! Exact timescale arithmetic.
//!
//! Track timelines stay in their native timescale. Conversions to another
//! time base use rational scaling with round-half-up, so the same input
//! always lands on the same tick.

use std::time::Duration;

/// The MPEG-TS system clock for PTS/DTS.
pub const CLOCK_90KHZ: u32 = 90_000;

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Rescale `value` from timescale `from` to timescale `to`, rounding half up.
///
/// A zero `from` timescale yields zero.
pub fn rescale(value: u64, from: u32, to: u32) -> u64 {
    if from == 0 {
        return 0;
    }
    let from = from as u128;
    let scaled = (value as u128 * to as u128 + from / 2) / from;
    scaled.min(u64::MAX as u128) as u64
}

/// Convert a tick count into a [`Duration`], rounding to the nearest nanosecond.
pub fn ticks_to_duration(ticks: u64, timescale: u32) -> Duration {
    let nanos = rescale(ticks, timescale, NANOS_PER_SEC);
    Duration::new(
        nanos / NANOS_PER_SEC as u64,
        (nanos % NANOS_PER_SEC as u64) as u32,
    )
}

/// Convert a [`Duration`] into ticks of `timescale`, rounding to the nearest tick.
pub fn duration_to_ticks(duration: Duration, timescale: u32) -> u64 {
    let nanos = duration.as_nanos();
    let scaled = (nanos * timescale as u128 + NANOS_PER_SEC as u128 / 2) / NANOS_PER_SEC as u128;
    scaled.min(u64::MAX as u128) as u64
}

/// Ticks expressed as fractional seconds, for display only.
pub fn ticks_to_secs(ticks: u64, timescale: u32) -> f64 {
    if timescale == 0 {
        0.0
    } else {
        ticks as f64 / timescale as f64
    }
}

/// Parse a non-negative decimal number of seconds without going through
/// floating point. Accepts up to nine fractional digits; extra digits are
/// truncated.
pub fn parse_secs(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let (whole, frac) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };

    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let secs: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };

    let mut nanos = 0u32;
    for (i, digit) in frac.bytes().take(9).enumerate() {
        nanos += (digit - b'0') as u32 * 10u32.pow(8 - i as u32);
    }

    Some(Duration::new(secs, nanos))
}

/// Format a [`Duration`] as decimal seconds with trailing zeros trimmed.
///
/// The output round-trips exactly through [`parse_secs`].
pub fn format_secs(duration: Duration) -> String {
    let nanos = duration.subsec_nanos();
    if nanos == 0 {
        return duration.as_secs().to_string();
    }
    let frac = format!("{:09}", nanos);
    format!("{}.{}", duration.as_secs(), frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rescale_round_half_up() {
        assert_eq!(rescale(1, 3, 2), 1); // 0.666 -> 1
        assert_eq!(rescale(1, 4, 2), 1); // 0.5 -> 1
        assert_eq!(rescale(1, 5, 2), 0); // 0.4 -> 0
        assert_eq!(rescale(48_000, 48_000, CLOCK_90KHZ), 90_000);
        assert_eq!(rescale(1024, 44_100, CLOCK_90KHZ), 2090); // 2089.79
        assert_eq!(rescale(10, 0, 90_000), 0);
    }

    #[test]
    fn test_parse_secs() {
        assert_eq!(parse_secs("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_secs("2.5"), Some(Duration::from_millis(2500)));
        assert_eq!(parse_secs(".25"), Some(Duration::from_millis(250)));
        assert_eq!(parse_secs("1.0000000019"), Some(Duration::new(1, 1)));
        assert_eq!(parse_secs(""), None);
        assert_eq!(parse_secs("."), None);
        assert_eq!(parse_secs("-1"), None);
        assert_eq!(parse_secs("abc"), None);
        assert_eq!(parse_secs("1e3"), None);
    }

    #[test]
    fn test_format_secs() {
        assert_eq!(format_secs(Duration::from_secs(8)), "8");
        assert_eq!(format_secs(Duration::from_millis(8500)), "8.5");
        assert_eq!(format_secs(Duration::new(1, 1)), "1.000000001");
    }

    #[test]
    fn test_ticks_round_trip_through_text() {
        for &timescale in &[1000u32, 24_000, 30_000, 44_100, 48_000, 90_000, 600_000] {
            for ticks in [0u64, 1, 1001, 123_457, 9_999_999] {
                let text = format_secs(ticks_to_duration(ticks, timescale));
                let back = duration_to_ticks(parse_secs(&text).unwrap(), timescale);
                assert_eq!(back, ticks, "timescale {timescale}, ticks {ticks}");
            }
        }
    }
}
