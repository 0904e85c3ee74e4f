//! Wire types for the upstream protocol.
//!
//! Response shapes are encoded as structs with every field optioned:
//! unknown fields are tolerated, and a missing required field is surfaced as
//! a clear invalid-response error at the call site rather than a panic deep
//! in a traversal.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

// ============================================================================
// Parameters
// ============================================================================

/// Parameters for a booking attempt.
#[derive(Debug, Clone)]
pub struct ReserveParams {
    /// Upstream venue identifier.
    pub venue_id: i64,
    /// Desired seat instant, UTC.
    pub reservation_time: DateTime<Utc>,
    /// Party size.
    pub party_size: u32,
    /// Ordered lowercase substrings matched against slot config types;
    /// empty means any table.
    pub table_preferences: Vec<String>,
    /// Per-user auth token for the authenticated calls.
    pub auth_token: String,
    /// Payment method id committed at BOOK time.
    pub payment_method_id: i64,
    /// The venue's timezone; slot times are parsed and compared in it.
    pub timezone: Tz,
}

/// Outcome of a successful booking attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReserveOutcome {
    /// The booked slot's instant, UTC.
    pub reservation_time: DateTime<Utc>,
}

/// Profile returned by a successful login.
#[derive(Debug, Clone)]
pub struct LoginProfile {
    /// Upstream account id.
    pub id: i64,
    /// First name on the account.
    pub first_name: String,
    /// Last name on the account.
    pub last_name: String,
    /// Mobile number on the account.
    pub mobile: String,
    /// Email address on the account.
    pub email: String,
    /// Payment method id on file.
    pub payment_method_id: i64,
    /// The per-user auth token subsequent calls carry.
    pub auth_token: String,
}

/// A venue search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// Upstream venue identifier.
    pub venue_id: i64,
    /// Venue display name.
    pub name: String,
    /// Region, e.g. "NY".
    pub region: String,
    /// Locality, e.g. "New York".
    pub locality: String,
    /// Neighborhood, e.g. "SoHo".
    pub neighborhood: String,
}

// ============================================================================
// Response shapes
// ============================================================================

/// Top level of a FIND response.
#[derive(Debug, Deserialize)]
pub struct FindResponse {
    /// Result container.
    pub results: Option<FindResults>,
}

/// The `results` object of a FIND response.
#[derive(Debug, Deserialize)]
pub struct FindResults {
    /// Venues with their offered slots; absence is a malformed response.
    pub venues: Option<Vec<FindVenue>>,
}

/// One venue entry in a FIND response.
#[derive(Debug, Deserialize)]
pub struct FindVenue {
    /// Venue identity block.
    pub venue: Option<VenueInfo>,
    /// Offered slots; absence is a malformed response.
    pub slots: Option<Vec<Slot>>,
}

impl FindVenue {
    /// Returns the upstream venue id when the identity block carries one.
    #[must_use]
    pub fn resy_id(&self) -> Option<i64> {
        self.venue.as_ref()?.id.as_ref()?.resy
    }
}

/// Venue identity block.
#[derive(Debug, Deserialize)]
pub struct VenueInfo {
    /// Nested id object.
    pub id: Option<VenueIdentity>,
    /// Display name.
    pub name: Option<String>,
}

/// Nested venue id object.
#[derive(Debug, Deserialize)]
pub struct VenueIdentity {
    /// The Resy venue id.
    pub resy: Option<i64>,
}

/// An offered reservation slot.
#[derive(Debug, Deserialize)]
pub struct Slot {
    /// Slot start (venue-local naive time).
    pub date: Option<SlotDate>,
    /// Table configuration.
    pub config: Option<SlotConfig>,
}

/// Slot timing block.
#[derive(Debug, Deserialize)]
pub struct SlotDate {
    /// `YYYY-MM-DD HH:MM:SS`, venue-local.
    pub start: Option<String>,
}

/// Slot table configuration.
#[derive(Debug, Deserialize)]
pub struct SlotConfig {
    /// Table type, e.g. "Dining Room".
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Opaque config token consumed by DETAIL.
    pub token: Option<String>,
}

/// Top level of a DETAIL response.
#[derive(Debug, Deserialize)]
pub struct DetailResponse {
    /// Book token container.
    pub book_token: Option<BookToken>,
}

/// The book token object of a DETAIL response.
#[derive(Debug, Deserialize)]
pub struct BookToken {
    /// The opaque token BOOK consumes.
    pub value: Option<String>,
}

/// Top level of a BOOK response. Success is the presence of
/// `reservation_id`, whatever its type.
#[derive(Debug, Deserialize)]
pub struct BookResponse {
    /// The upstream reservation id, present on success.
    pub reservation_id: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponseBody {
    pub id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub mobile_number: Option<String>,
    pub em_address: Option<String>,
    pub payment_method_id: Option<i64>,
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponseBody {
    pub search: Option<SearchHits>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchHits {
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchHit {
    #[serde(rename = "objectID")]
    pub object_id: Option<String>,
    pub name: Option<String>,
    pub region: Option<String>,
    pub locality: Option<String>,
    pub neighborhood: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_response_tolerates_unknown_fields() {
        let body = serde_json::json!({
            "results": {
                "venues": [{
                    "venue": {"id": {"resy": 89607}, "name": "Il Posto", "rating": 4.9},
                    "slots": [{
                        "date": {"start": "2025-06-01 19:00:00", "end": "2025-06-01 21:00:00"},
                        "config": {"type": "Dining Room", "token": "cfg-1", "badge": "popular"}
                    }],
                    "notices": []
                }],
                "meta": {"page": 1}
            },
            "query": {}
        });
        let parsed: FindResponse = serde_json::from_value(body).expect("parse");
        let venues = parsed.results.expect("results").venues.expect("venues");
        assert_eq!(venues.len(), 1);
        assert_eq!(venues[0].resy_id(), Some(89607));
        assert_eq!(venues[0].slots.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn missing_identity_yields_no_resy_id() {
        let venue: FindVenue = serde_json::from_value(serde_json::json!({"slots": []})).unwrap();
        assert_eq!(venue.resy_id(), None);
        assert!(venue.slots.is_some());
    }

    #[test]
    fn book_success_is_reservation_id_presence() {
        let ok: BookResponse = serde_json::from_str(r#"{"reservation_id": "RID-7"}"#).unwrap();
        assert!(ok.reservation_id.is_some());

        let numeric: BookResponse = serde_json::from_str(r#"{"reservation_id": 991}"#).unwrap();
        assert!(numeric.reservation_id.is_some());

        let missing: BookResponse = serde_json::from_str(r#"{"specs": {}}"#).unwrap();
        assert!(missing.reservation_id.is_none());
    }
}
