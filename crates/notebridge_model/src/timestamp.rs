//! Modification timestamps as reported by either store.
//!
//! The two stores report "last modified" in different shapes: the remote
//! store uses RFC3339 strings, the local store uses integer epochs whose
//! unit varies between deployments. A [`Timestamp`] keeps the raw value so
//! change detection can compare exactly what the store reported, and
//! offers [`Timestamp::instant`] for the cases where two values from
//! different stores must be ordered.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Epoch values below this are read as seconds.
const SECONDS_CEILING: i64 = 100_000_000_000;
/// Epoch values below this are read as milliseconds.
const MILLIS_CEILING: i64 = 100_000_000_000_000;
/// Epoch values below this are read as microseconds; anything larger is nanoseconds.
const MICROS_CEILING: i64 = 100_000_000_000_000_000;

/// A store-reported modification timestamp.
///
/// Equality is raw string equality. Two timestamps that denote the same
/// instant in different notations are *not* equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    /// Wraps a raw store value.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// A timestamp that never matches a real store value.
    pub fn unknown() -> Self {
        Self(String::new())
    }

    /// Builds a timestamp from an instant, in RFC3339 with millisecond precision.
    pub fn from_instant(instant: DateTime<Utc>) -> Self {
        Self(instant.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
    }

    /// Returns the raw value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the placeholder produced by [`Timestamp::unknown`].
    pub fn is_unknown(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Normalizes to a UTC instant.
    ///
    /// Accepts RFC3339, naive ISO-8601 (read as UTC), integer epochs with
    /// the unit inferred from magnitude, and fractional epochs read the same way.
    /// Returns `None` for anything else.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        let raw = self.0.trim();
        if raw.is_empty() {
            return None;
        }

        if let Ok(value) = raw.parse::<i64>() {
            return from_epoch(value);
        }

        if let Ok(value) = raw.parse::<f64>() {
            return from_fractional_epoch(value);
        }

        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }

        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .map(|naive| naive.and_utc())
    }
}

fn units_per_second(magnitude: u64) -> i64 {
    if magnitude < SECONDS_CEILING as u64 {
        1
    } else if magnitude < MILLIS_CEILING as u64 {
        1_000
    } else if magnitude < MICROS_CEILING as u64 {
        1_000_000
    } else {
        1_000_000_000
    }
}

fn from_epoch(value: i64) -> Option<DateTime<Utc>> {
    let units_per_second = units_per_second(value.unsigned_abs());
    let seconds = value.div_euclid(units_per_second);
    let fraction = value.rem_euclid(units_per_second);
    let nanos = fraction * (1_000_000_000 / units_per_second);
    DateTime::from_timestamp(seconds, u32::try_from(nanos).ok()?)
}

/// Fractional epochs get the same unit inference as integers, applied to
/// the whole part.
fn from_fractional_epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value.abs() >= i64::MAX as f64 {
        return None;
    }
    let units = units_per_second(value.trunc().abs() as u64) as f64;
    let seconds = value / units;
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            write!(f, "<unknown>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<&str> for Timestamp {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Timestamp {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<i64> for Timestamp {
    fn from(epoch: i64) -> Self {
        Self(epoch.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn raw_equality() {
        assert_eq!(Timestamp::new("2024-01-01T10:00:00Z"), "2024-01-01T10:00:00Z".into());
        assert_ne!(
            Timestamp::new("2024-01-01T10:00:00Z"),
            Timestamp::new("2024-01-01T10:00:00.000Z")
        );
    }

    #[test]
    fn rfc3339() {
        let ts = Timestamp::new("2024-01-01T10:00:00+02:00");
        assert_eq!(ts.instant(), Some(at(1_704_096_000)));
    }

    #[test]
    fn naive_iso_is_utc() {
        let ts = Timestamp::new("2024-01-01T08:00:00.250");
        let instant = ts.instant().unwrap();
        assert_eq!(instant.timestamp(), 1_704_096_000);
        assert_eq!(instant.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn epoch_units_by_magnitude() {
        let expected = at(1_704_096_000);
        assert_eq!(Timestamp::from(1_704_096_000).instant(), Some(expected));
        assert_eq!(Timestamp::from(1_704_096_000_000).instant(), Some(expected));
        assert_eq!(Timestamp::from(1_704_096_000_000_000).instant(), Some(expected));
        assert_eq!(
            Timestamp::from(1_704_096_000_000_000_000).instant(),
            Some(expected)
        );
    }

    #[test]
    fn fractional_seconds() {
        let instant = Timestamp::new("1704096000.5").instant().unwrap();
        assert_eq!(instant.timestamp(), 1_704_096_000);
        assert_eq!(instant.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn fractional_epochs_use_magnitude_units() {
        let millis = Timestamp::new("1704110400123.5").instant().unwrap();
        assert_eq!(millis.timestamp(), 1_704_110_400);
        assert_eq!(millis.timestamp_subsec_millis(), 123);

        let micros = Timestamp::new("1704110400123456.0").instant().unwrap();
        assert_eq!(micros.timestamp(), 1_704_110_400);

        let remote = Timestamp::new("2024-01-01T12:00:01Z");
        assert!(millis < remote.instant().unwrap());
    }

    #[test]
    fn unparsable_is_none() {
        assert_eq!(Timestamp::new("yesterday").instant(), None);
        assert_eq!(Timestamp::unknown().instant(), None);
        assert_eq!(Timestamp::new("NaN").instant(), None);
    }

    #[test]
    fn from_instant_roundtrips_through_instant() {
        let instant = at(1_704_096_000);
        assert_eq!(Timestamp::from_instant(instant).instant(), Some(instant));
    }

    #[test]
    fn serde_is_transparent() {
        let ts = Timestamp::new("1700000000");
        assert_eq!(serde_json::to_string(&ts).unwrap(), "\"1700000000\"");
    }
}
