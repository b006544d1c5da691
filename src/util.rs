use chrono::{DateTime, SecondsFormat, Utc};

/// Convert epoch milliseconds into a UTC datetime.
///
/// Returns `None` for values outside chrono's representable range.
pub(crate) fn datetime_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// Truncate a datetime to millisecond precision.
///
/// Row keys only carry milliseconds, so anything finer would not survive an
/// encode/decode round trip.
pub(crate) fn truncate_to_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis())
        .expect("millisecond truncation stays in range")
}

/// Format a datetime as RFC 3339 with millisecond precision.
pub(crate) fn format_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_round_trip() {
        let dt = datetime_from_millis(1_420_000_000_123).unwrap();
        assert_eq!(dt.timestamp_millis(), 1_420_000_000_123);
        assert_eq!(truncate_to_millis(dt), dt);
    }

    #[test]
    fn format_is_rfc3339_with_millis() {
        let dt = datetime_from_millis(1_420_000_000_123).unwrap();
        assert_eq!(format_millis(dt), "2014-12-31T04:26:40.123Z");
    }
}
