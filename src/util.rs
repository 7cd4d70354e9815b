//! Utility functions shared across modules.

use std::time::Duration;

/// Formats a duration in microseconds into a human-readable string (µs, ms, or s).
#[inline]
pub fn format_us(us: i64) -> String {
    let us = us.max(0) as u64;
    if us < 1000 {
        format!("{us} µs")
    } else if us < 1_000_000 {
        format!("{:.1} ms", us as f64 / 1000.0)
    } else {
        format!("{:.3} s", us as f64 / 1_000_000.0)
    }
}

/// Formats a `std::time::Duration` into a human-readable string using `humantime`.
#[inline]
pub fn format_duration(duration: Duration) -> String {
    humantime::format_duration(duration).to_string()
}

/// Formats a byte count as a bits-per-second rate over the given interval.
#[inline]
pub fn format_bitrate(bytes: i64, interval_us: i64) -> String {
    if interval_us <= 0 {
        return "0 bps".to_string();
    }
    let bits_per_sec = (bytes.max(0) as f64 * 8.0) / (interval_us as f64 / 1_000_000.0);
    if bits_per_sec < 1_000.0 {
        format!("{bits_per_sec:.0} bps")
    } else if bits_per_sec < 1_000_000.0 {
        format!("{:.2} Kbps", bits_per_sec / 1_000.0)
    } else if bits_per_sec < 1_000_000_000.0 {
        format!("{:.2} Mbps", bits_per_sec / 1_000_000.0)
    } else {
        format!("{:.2} Gbps", bits_per_sec / 1_000_000_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_us_picks_the_right_unit() {
        assert_eq!(format_us(500), "500 µs");
        assert_eq!(format_us(1_500), "1.5 ms");
        assert_eq!(format_us(2_500_000), "2.500 s");
    }

    #[test]
    fn format_bitrate_scales_with_interval() {
        assert_eq!(format_bitrate(125_000, 1_000_000), "1.00 Mbps");
        assert_eq!(format_bitrate(0, 0), "0 bps");
    }
}
