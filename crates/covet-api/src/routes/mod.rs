//! Route handlers, one module per surface.

pub mod account;
pub mod admin;
pub mod logs;
pub mod reservations;
pub mod reserve;
pub mod search;
pub mod window;

use axum::http::HeaderMap;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{ApiError, ApiResult};
use crate::server::owner_id_from_headers;

/// Returns the caller's owner id or a 401.
pub(crate) fn require_owner(headers: &HeaderMap) -> ApiResult<String> {
    owner_id_from_headers(headers)
        .ok_or_else(|| ApiError::unauthorized("Missing owner identifier"))
}

/// Parses a `YYYY-MM-DDTHH:MM` body field as wall time in the service
/// zone, yielding the UTC instant.
pub(crate) fn parse_local_minute(raw: &str, tz: Tz) -> ApiResult<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%dT%H:%M")
        .map_err(|_| ApiError::bad_request("Invalid time format. Use YYYY-MM-DDTHH:MM"))?;
    let local = tz
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| ApiError::bad_request("Time does not exist in the configured zone"))?;
    Ok(local.with_timezone(&Utc))
}

/// Renders an instant as wall time in the service zone for responses.
pub(crate) fn format_local(instant: DateTime<Utc>, tz: Tz) -> String {
    instant
        .with_timezone(&tz)
        .format("%Y-%m-%d %I:%M %p %Z")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tz() -> Tz {
        "America/New_York".parse().unwrap()
    }

    #[test]
    fn local_minute_parses_to_utc() {
        let parsed = parse_local_minute("2025-06-01T19:00", tz()).unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-06-01T23:00:00+00:00");
    }

    #[test]
    fn malformed_time_is_invalid_input() {
        assert!(parse_local_minute("June 1st, 7pm", tz()).is_err());
        assert!(parse_local_minute("2025-06-01 19:00", tz()).is_err());
    }

    #[test]
    fn format_renders_in_the_service_zone() {
        let instant: DateTime<Utc> = "2025-06-01T23:00:00Z".parse().unwrap();
        let rendered = format_local(instant, tz());
        assert!(rendered.starts_with("2025-06-01 07:00 PM"));
    }
}
