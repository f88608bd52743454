// Fixed-point time unit shared by the session and the pipeline

/// Playback time in 100-nanosecond ticks.
pub type Ticks = u64;

/// Number of ticks in one second (100 ns resolution).
pub const TICKS_PER_SECOND: Ticks = 10_000_000;

/// Convert whole seconds to ticks.
pub fn secs_to_ticks(secs: u64) -> Ticks {
    secs * TICKS_PER_SECOND
}

/// Convert milliseconds to ticks.
pub fn millis_to_ticks(millis: u64) -> Ticks {
    millis * (TICKS_PER_SECOND / 1000)
}

/// Format a tick count as `MM:SS` for display.
///
/// Durations of an hour or more keep counting minutes past 59.
pub fn format_mm_ss(ticks: Ticks) -> String {
    let total_secs = ticks / TICKS_PER_SECOND;
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(secs_to_ticks(1), TICKS_PER_SECOND);
        assert_eq!(millis_to_ticks(1500), 15_000_000);
    }

    #[test]
    fn test_format_mm_ss() {
        assert_eq!(format_mm_ss(0), "00:00");
        assert_eq!(format_mm_ss(secs_to_ticks(59)), "00:59");
        assert_eq!(format_mm_ss(secs_to_ticks(61)), "01:01");
        // Sub-second remainder is truncated, not rounded
        assert_eq!(format_mm_ss(secs_to_ticks(20) + 9_999_999), "00:20");
        assert_eq!(format_mm_ss(secs_to_ticks(3600)), "60:00");
    }
}
