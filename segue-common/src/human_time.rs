//! Human-readable time formatting
//!
//! Used by log lines and the CLI event printer to show playback positions.

/// Milliseconds below which the short `X.XXs` format is used
const SHORT_FORMAT_MAX_MS: u64 = 100_000;

/// Milliseconds below which the `M:SS.S` format is used (100 minutes)
const MEDIUM_FORMAT_MAX_MS: u64 = 6_000_000;

/// Format a millisecond value for display
///
/// # Examples
///
/// ```
/// use segue_common::human_time::format_millis;
///
/// assert_eq!(format_millis(4_250), "4.25s");
/// assert_eq!(format_millis(330_000), "5:30.0");
/// assert_eq!(format_millis(7_200_000), "2:00:00");
/// ```
pub fn format_millis(millis: u64) -> String {
    if millis < SHORT_FORMAT_MAX_MS {
        format!("{:.2}s", millis as f64 / 1000.0)
    } else if millis < MEDIUM_FORMAT_MAX_MS {
        let minutes = millis / 60_000;
        let secs = (millis % 60_000) as f64 / 1000.0;
        format!("{}:{:04.1}", minutes, secs)
    } else {
        let total_secs = millis / 1000;
        let hours = total_secs / 3600;
        let mins = (total_secs % 3600) / 60;
        let secs = total_secs % 60;
        format!("{}:{:02}:{:02}", hours, mins, secs)
    }
}

/// Format a played/total pair as `played / total`
pub fn format_progress(played_ms: u64, total_ms: u64) -> String {
    format!("{} / {}", format_millis(played_ms), format_millis(total_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_format() {
        assert_eq!(format_millis(0), "0.00s");
        assert_eq!(format_millis(99_990), "99.99s");
    }

    #[test]
    fn test_medium_format() {
        assert_eq!(format_millis(100_000), "1:40.0");
        assert_eq!(format_millis(61_500), "61.50s");
        assert_eq!(format_millis(605_500), "10:05.5");
    }

    #[test]
    fn test_long_format() {
        assert_eq!(format_millis(3_661_000 * 2), "2:02:02");
    }

    #[test]
    fn test_progress() {
        assert_eq!(format_progress(1_000, 4_000), "1.00s / 4.00s");
    }
}
