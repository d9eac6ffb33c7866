//! # Timestamps
//!
//! UTC-only, whole-second timestamps. Policy dates and transition time
//! windows are carried as [`Timestamp`] so that canonical bytes never
//! depend on sub-second jitter or the local offset of the node that built
//! the transition. The wire form is always `YYYY-MM-DDTHH:MM:SSZ`.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

/// A UTC timestamp truncated to seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current UTC time, truncated.
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// Parse an RFC 3339 string. Only the `Z` suffix is accepted; explicit
    /// offsets (including `+00:00`) are rejected.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if !s.ends_with('Z') {
            return Err(CoreError::InvalidTimestamp(format!(
                "must use Z suffix (UTC only), got {s:?}"
            )));
        }
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|e| CoreError::InvalidTimestamp(format!("{s:?}: {e}")))?;
        Ok(Self(truncate_to_seconds(dt.with_timezone(&Utc))))
    }

    pub fn from_epoch_secs(secs: i64) -> Result<Self, CoreError> {
        DateTime::from_timestamp(secs, 0)
            .map(Self)
            .ok_or_else(|| CoreError::InvalidTimestamp(format!("epoch seconds out of range: {secs}")))
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// This instant shifted by `secs` seconds. Saturates at the chrono range.
    pub fn plus_secs(&self, secs: i64) -> Self {
        self.0
            .checked_add_signed(Duration::seconds(secs))
            .map(Self)
            .unwrap_or(*self)
    }

    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_iso8601())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_now_has_no_subseconds() {
        assert_eq!(Timestamp::now().as_datetime().nanosecond(), 0);
    }

    #[test]
    fn test_from_utc_truncates() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
            + Duration::milliseconds(750);
        let ts = Timestamp::from_utc(dt);
        assert_eq!(ts.to_iso8601(), "2026-01-15T12:00:00Z");
    }

    #[test]
    fn test_parse_accepts_z_only() {
        assert!(Timestamp::parse("2026-01-15T12:00:00Z").is_ok());
        assert!(Timestamp::parse("2026-01-15T12:00:00+00:00").is_err());
        assert!(Timestamp::parse("2026-01-15T12:00:00-04:00").is_err());
        assert!(Timestamp::parse("yesterday").is_err());
    }

    #[test]
    fn test_parse_truncates_fraction() {
        let ts = Timestamp::parse("2026-01-15T12:00:00.999Z").unwrap();
        assert_eq!(ts.to_string(), "2026-01-15T12:00:00Z");
    }

    #[test]
    fn test_plus_secs() {
        let ts = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        assert_eq!(ts.plus_secs(30).to_string(), "2026-01-15T12:00:30Z");
        assert_eq!(ts.plus_secs(-60).to_string(), "2026-01-15T11:59:00Z");
    }

    #[test]
    fn test_epoch_roundtrip() {
        let ts = Timestamp::from_epoch_secs(1_700_000_000).unwrap();
        assert_eq!(ts.epoch_secs(), 1_700_000_000);
    }

    #[test]
    fn test_serde_uses_iso_string() {
        let ts = Timestamp::parse("2026-03-01T08:30:00Z").unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2026-03-01T08:30:00Z\"");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
        assert!(serde_json::from_str::<Timestamp>("\"2026-03-01T08:30:00+01:00\"").is_err());
    }
}
