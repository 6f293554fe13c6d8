// crates/flockmesh-core/src/core/time.rs
// ============================================================================
// Module: Flockmesh Time Model
// Description: RFC-3339 UTC timestamps for runs, ledgers, and exports.
// Purpose: Provide deterministic, replayable time values across control-plane records.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! All persisted timestamps are RFC-3339 UTC. Engine operations take explicit
//! timestamps supplied by the host so replays stay deterministic; the boundary
//! stamps wall-clock time once per request via [`Timestamp::now_utc`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical RFC-3339 UTC timestamp.
///
/// # Invariants
/// - Always normalized to UTC.
/// - Serializes as an RFC-3339 string on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(#[serde(with = "time::serde::rfc3339")] OffsetDateTime);

/// Errors raised when parsing timestamps.
#[derive(Debug, Error)]
pub enum TimestampError {
    /// Value is not a valid RFC-3339 timestamp.
    #[error("invalid rfc3339 timestamp: {0}")]
    Parse(String),
}

impl Timestamp {
    /// Returns the current wall-clock time in UTC.
    #[must_use]
    pub fn now_utc() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Parses an RFC-3339 timestamp and normalizes it to UTC.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::Parse`] when the value is malformed.
    pub fn parse(value: &str) -> Result<Self, TimestampError> {
        OffsetDateTime::parse(value, &Rfc3339)
            .map(|parsed| Self(parsed.to_offset(time::UtcOffset::UTC)))
            .map_err(|err| TimestampError::Parse(err.to_string()))
    }

    /// Formats the timestamp as an RFC-3339 string.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.format(&Rfc3339).unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
    }

    /// Returns the timestamp as unix milliseconds.
    #[must_use]
    pub fn unix_millis(&self) -> i128 {
        self.0.unix_timestamp_nanos() / 1_000_000
    }

    /// Returns a timestamp offset by the given number of milliseconds.
    #[must_use]
    pub fn plus_millis(&self, millis: i64) -> Self {
        Self(self.0.saturating_add(Duration::milliseconds(millis)))
    }

    /// Returns the whole milliseconds elapsed since `earlier` (zero when negative).
    #[must_use]
    pub fn millis_since(&self, earlier: Self) -> u64 {
        let delta = self.unix_millis() - earlier.unix_millis();
        u64::try_from(delta.max(0)).unwrap_or(u64::MAX)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl From<OffsetDateTime> for Timestamp {
    fn from(value: OffsetDateTime) -> Self {
        Self(value.to_offset(time::UtcOffset::UTC))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use super::*;

    /// Tests parse/format round-trips and UTC normalization.
    #[test]
    fn test_parse_normalizes_to_utc() {
        let parsed = Timestamp::parse("2026-03-01T12:30:00+08:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-03-01T04:30:00Z");
        assert!(Timestamp::parse("yesterday").is_err());
    }

    /// Tests millisecond arithmetic helpers.
    #[test]
    fn test_millis_helpers() {
        let base = Timestamp::parse("2026-03-01T00:00:00Z").unwrap();
        let later = base.plus_millis(1_500);
        assert_eq!(later.millis_since(base), 1_500);
        assert_eq!(base.millis_since(later), 0);
    }
}
