//! Human duration strings used in `campus.toml` ("30s", "500ms", "5m").

use std::time::Duration;

/// Parse a duration string like "5s", "500ms", "1m".
///
/// A plain number is read as seconds. Returns `None` for anything else.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.trim().parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.trim().parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        let mins = mins.trim().parse::<u64>().ok()?;
        mins.checked_mul(60).map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        let hours = hours.trim().parse::<u64>().ok()?;
        hours.checked_mul(3600).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// Parse `s`, falling back to `default` when it is malformed.
pub fn parse_duration_or(s: &str, default: Duration) -> Duration {
    parse_duration(s).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
    }

    #[test]
    fn milliseconds() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
    }

    #[test]
    fn minutes_and_hours() {
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn overflowing_units_are_rejected() {
        let huge = format!("{}m", u64::MAX / 2);
        assert_eq!(parse_duration(&huge), None);
        assert_eq!(parse_duration(&format!("{}h", u64::MAX)), None);
        assert_eq!(
            parse_duration_or(&huge, Duration::from_secs(5)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn plain_number_is_seconds() {
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
    }

    #[test]
    fn garbage_falls_back() {
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(
            parse_duration_or("soon", Duration::from_secs(2)),
            Duration::from_secs(2)
        );
    }
}
