//! The scheduled-reservation record.

use chrono::{DateTime, Utc};
use covet_core::ReservationId;
use serde::{Deserialize, Serialize};

/// Accounting category reported for a fired reservation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageType {
    /// A user-timed attempt.
    #[default]
    Immediate,
    /// An auto-scheduled attempt timed by the booking window.
    Concierge,
}

impl UsageType {
    /// Returns the wire name of the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Concierge => "concierge",
        }
    }
}

/// A pending booking attempt.
///
/// Records are immutable once enqueued: credentials for owner-linked rows
/// are re-resolved at execution time, and the scheduler destroys the row
/// after its single attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledReservation {
    /// Unique, immutable identifier.
    pub id: ReservationId,
    /// Upstream venue identifier.
    pub venue_id: i64,
    /// Desired seat instant, UTC.
    pub reservation_time: DateTime<Utc>,
    /// Party size.
    pub party_size: u32,
    /// Ordered lowercase substrings matched against slot config types.
    #[serde(default)]
    pub table_preferences: Vec<String>,
    /// Inlined auth token; superseded by the vault when `owner_id` is set.
    #[serde(default)]
    pub auth_token: String,
    /// Inlined payment method id; superseded by the vault when `owner_id`
    /// is set.
    #[serde(default)]
    pub payment_method_id: i64,
    /// Opaque external user id; empty for legacy rows.
    #[serde(default)]
    pub owner_id: String,
    /// Accounting category.
    #[serde(default)]
    pub usage_type: UsageType,
    /// Instant at which execution must be attempted, UTC.
    pub run_time: DateTime<Utc>,
    /// Enqueue instant, UTC.
    pub created_at: DateTime<Utc>,
}

impl ScheduledReservation {
    /// Returns true when credentials must be re-resolved through the vault.
    #[must_use]
    pub fn is_owner_linked(&self) -> bool {
        !self.owner_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_type_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&UsageType::Concierge).unwrap(),
            "\"concierge\""
        );
        assert_eq!(UsageType::Immediate.as_str(), "immediate");
    }

    #[test]
    fn legacy_rows_deserialize_without_owner_fields() {
        let raw = serde_json::json!({
            "id": ReservationId::generate().to_string(),
            "venue_id": 89607,
            "reservation_time": "2025-06-01T23:00:00Z",
            "party_size": 2,
            "auth_token": "inline-token",
            "payment_method_id": 5,
            "run_time": "2025-05-01T13:00:00Z",
            "created_at": "2025-04-30T20:00:00Z"
        });
        let record: ScheduledReservation = serde_json::from_value(raw).expect("parse");
        assert!(!record.is_owner_linked());
        assert_eq!(record.usage_type, UsageType::Immediate);
        assert!(record.table_preferences.is_empty());
    }
}
