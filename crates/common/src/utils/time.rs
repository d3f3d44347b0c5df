use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::constants::TIME_BUCKET_FORMAT;
use crate::error::{Result, VeilError};

/// Parse an IANA timezone name such as `Australia/Sydney`
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| VeilError::TimeFormat(format!("unknown timezone: {}", name)))
}

/// Hour bucket identifier (`YYYY-MM-DDThh`) of `now` as seen in `timezone`
pub fn time_bucket_key(now: DateTime<Utc>, timezone: Tz) -> String {
    now.with_timezone(&timezone)
        .format(TIME_BUCKET_FORMAT)
        .to_string()
}

/// Seconds left until the bucket containing `now` rolls over in `timezone`
pub fn seconds_until_rollover(now: DateTime<Utc>, timezone: Tz) -> i64 {
    let current = time_bucket_key(now, timezone);
    let secs = now.timestamp();

    // Local hours change on a UTC quarter-hour mark in every zone in use;
    // eight marks also cover the repeated hour of a DST fall-back.
    (1..=8)
        .map(|q| (secs.div_euclid(900) + q) * 900)
        .find(|&mark| {
            DateTime::from_timestamp(mark, 0)
                .is_some_and(|t| time_bucket_key(t, timezone) != current)
        })
        .map(|mark| mark - secs)
        .unwrap_or(3600)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone("Australia/Sydney").unwrap(), Tz::Australia__Sydney);
        assert_eq!(parse_timezone(" UTC ").unwrap(), Tz::UTC);
        assert!(matches!(
            parse_timezone("Mars/Olympus_Mons"),
            Err(VeilError::TimeFormat(_))
        ));
    }

    #[test]
    fn test_bucket_key_in_daylight_saving() {
        // January is AEDT (UTC+11)
        let key = time_bucket_key(utc(2024, 1, 15, 0, 30, 0), Tz::Australia__Sydney);
        assert_eq!(key, "2024-01-15T11");
    }

    #[test]
    fn test_bucket_key_in_standard_time() {
        // July is AEST (UTC+10)
        let key = time_bucket_key(utc(2024, 7, 15, 0, 30, 0), Tz::Australia__Sydney);
        assert_eq!(key, "2024-07-15T10");
    }

    #[test]
    fn test_bucket_key_uses_24_hour_clock() {
        let key = time_bucket_key(utc(2024, 7, 14, 14, 5, 0), Tz::Australia__Sydney);
        assert_eq!(key, "2024-07-15T00");

        let key = time_bucket_key(utc(2024, 7, 15, 13, 5, 0), Tz::Australia__Sydney);
        assert_eq!(key, "2024-07-15T23");
    }

    #[test]
    fn test_bucket_boundaries() {
        let tz = Tz::Australia__Sydney;
        let last_second = time_bucket_key(utc(2024, 1, 15, 0, 59, 59), tz);
        let first_second = time_bucket_key(utc(2024, 1, 15, 1, 0, 0), tz);

        assert_eq!(last_second, "2024-01-15T11");
        assert_eq!(first_second, "2024-01-15T12");
    }

    #[test]
    fn test_bucket_key_independent_of_server_zone() {
        let now = utc(2024, 1, 15, 0, 30, 0);
        assert_eq!(time_bucket_key(now, Tz::UTC), "2024-01-15T00");
        assert_ne!(
            time_bucket_key(now, Tz::UTC),
            time_bucket_key(now, Tz::Australia__Sydney)
        );
    }

    #[test]
    fn test_seconds_until_rollover() {
        let tz = Tz::Australia__Sydney;
        assert_eq!(seconds_until_rollover(utc(2024, 1, 15, 0, 59, 59), tz), 1);
        assert_eq!(seconds_until_rollover(utc(2024, 1, 15, 1, 0, 0), tz), 3600);
        assert_eq!(seconds_until_rollover(utc(2024, 1, 15, 0, 30, 0), tz), 1800);

        // Half-hour offset zone (UTC+5:30) rolls over on the half hour
        assert_eq!(
            seconds_until_rollover(utc(2024, 1, 15, 0, 10, 0), Tz::Asia__Kolkata),
            1200
        );
    }
}
