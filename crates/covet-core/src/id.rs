//! Strongly-typed identifiers for Covet entities.
//!
//! Reservation ids are ULID-backed: lexicographically sortable by creation
//! time, globally unique without coordination, and monotonic within a
//! process. The rendered form carries a `res_` prefix so ids remain
//! self-describing in key layouts and log lines.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

use crate::error::{Error, Result};

const RESERVATION_ID_PREFIX: &str = "res_";

/// A unique identifier for a scheduled reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReservationId(Ulid);

impl ReservationId {
    /// Generates a new unique reservation ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Creates a reservation ID from a raw ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }

    /// Returns the creation timestamp encoded in the ID.
    #[must_use]
    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        let ms = self.0.timestamp_ms();
        chrono::DateTime::from_timestamp_millis(i64::try_from(ms).unwrap_or(0))
            .unwrap_or_else(chrono::Utc::now)
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{RESERVATION_ID_PREFIX}{}", self.0)
    }
}

impl FromStr for ReservationId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s
            .strip_prefix(RESERVATION_ID_PREFIX)
            .ok_or_else(|| Error::InvalidId {
                message: format!("reservation ID '{s}' is missing the '{RESERVATION_ID_PREFIX}' prefix"),
            })?;
        Ulid::from_string(raw)
            .map(Self)
            .map_err(|e| Error::InvalidId {
                message: format!("invalid reservation ID '{s}': {e}"),
            })
    }
}

impl Serialize for ReservationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ReservationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_prefix() {
        let id = ReservationId::generate();
        assert!(id.to_string().starts_with("res_"));
    }

    #[test]
    fn roundtrips_through_string() {
        let id = ReservationId::generate();
        let parsed: ReservationId = id.to_string().parse().expect("parse rendered id");
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_missing_prefix() {
        let err = Ulid::new().to_string().parse::<ReservationId>().unwrap_err();
        assert!(matches!(err, Error::InvalidId { .. }));
    }

    #[test]
    fn rejects_garbage() {
        let err = "res_not-a-ulid".parse::<ReservationId>().unwrap_err();
        assert!(matches!(err, Error::InvalidId { .. }));
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = ReservationId::generate();
        let b = ReservationId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn serde_uses_rendered_form() {
        let id = ReservationId::generate();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{id}\""));
        let back: ReservationId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, back);
    }
}
