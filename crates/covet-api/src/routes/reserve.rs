//! The reservation submission endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use covet_core::ReservationId;
use covet_engine::{ScheduledReservation, UsageType};
use covet_resy::types::ReserveParams;
use covet_resy::WafJar;

use crate::error::{ApiError, ApiResult};
use crate::routes::{format_local, parse_local_minute, require_owner};
use crate::server::AppState;

/// Reservation submission body.
#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    /// Upstream venue identifier.
    pub venue_id: i64,
    /// Desired seat wall time, `YYYY-MM-DDTHH:MM` in the service zone.
    pub reservation_time: String,
    /// Party size.
    pub party_size: u32,
    /// Table preferences, matched as lowercase substrings.
    #[serde(default)]
    pub table_preferences: Vec<String>,
    /// Attempt the booking right now instead of scheduling.
    #[serde(default)]
    pub is_immediate: bool,
    /// Compute the run time from the venue's booking window.
    #[serde(default)]
    pub auto_schedule: bool,
    /// Explicit run wall time, used when neither of the flags is set.
    #[serde(default)]
    pub request_time: String,
}

/// Reservation submission response.
#[derive(Debug, Default, Serialize)]
pub struct ReserveResponse {
    /// Booked wall time, on an immediate success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_time: Option<String>,
    /// Queue id, on a scheduled submission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<String>,
    /// When the sniper will fire, on a scheduled submission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<String>,
}

/// POST `/api/reserve`.
pub async fn reserve(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ReserveRequest>,
) -> ApiResult<Json<ReserveResponse>> {
    let owner_id = require_owner(&headers)?;
    if request.venue_id == 0 {
        return Err(ApiError::bad_request("venue_id is required"));
    }
    if request.party_size == 0 {
        return Err(ApiError::bad_request("party_size must be positive"));
    }

    let credentials = state.vault.get(&owner_id).await.map_err(|e| {
        if e.is_not_found() {
            ApiError::unauthorized("Upstream account not linked. Link it via /api/resy/link first")
        } else {
            e.into()
        }
    })?;

    let tz = state.config.timezone;
    let reservation_time = parse_local_minute(&request.reservation_time, tz)?;
    let table_preferences: Vec<String> = request
        .table_preferences
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect();

    if request.is_immediate {
        let mut jar = match state.sessions.load(request.venue_id).await {
            Ok(Some(session)) => WafJar::from_session(session.cookies, session.user_agent),
            _ => WafJar::new(),
        };
        let params = ReserveParams {
            venue_id: request.venue_id,
            reservation_time,
            party_size: request.party_size,
            table_preferences,
            auth_token: credentials.auth_token,
            payment_method_id: credentials.payment_method_id,
            timezone: tz,
        };

        tracing::info!(
            venue_id = request.venue_id,
            party_size = request.party_size,
            owner_id = %owner_id,
            "attempting immediate reservation"
        );
        let outcome = state.resy.reserve(&mut jar, &params).await?;
        tracing::info!(venue_id = request.venue_id, "immediate reservation booked");

        return Ok(Json(ReserveResponse {
            reservation_time: Some(format_local(outcome.reservation_time, tz)),
            ..ReserveResponse::default()
        }));
    }

    let (run_time, usage_type) = if request.auto_schedule {
        let window = state.resolver.resolve(request.venue_id).await?;
        let run_time = window.run_time_for(reservation_time)?;
        tracing::info!(
            venue_id = request.venue_id,
            days_in_advance = window.days_in_advance,
            release_time = %window.release_time(),
            "auto-scheduled from the venue's booking window"
        );
        (run_time, UsageType::Concierge)
    } else {
        if request.request_time.trim().is_empty() {
            return Err(ApiError::bad_request(
                "request_time is required unless is_immediate or auto_schedule is set",
            ));
        }
        (parse_local_minute(&request.request_time, tz)?, UsageType::Immediate)
    };

    if run_time > reservation_time {
        return Err(ApiError::bad_request(
            "run time must not be after the reservation time",
        ));
    }

    let record = ScheduledReservation {
        id: ReservationId::generate(),
        venue_id: request.venue_id,
        reservation_time,
        party_size: request.party_size,
        table_preferences,
        auth_token: credentials.auth_token,
        payment_method_id: credentials.payment_method_id,
        owner_id,
        usage_type,
        run_time,
        created_at: Utc::now(),
    };
    state.queue.enqueue(&record).await?;

    tracing::info!(
        reservation_id = %record.id,
        venue_id = record.venue_id,
        run_time = %record.run_time,
        "scheduled reservation enqueued"
    );
    Ok(Json(ReserveResponse {
        reservation_id: Some(record.id.to_string()),
        scheduled_for: Some(format_local(run_time, tz)),
        ..ReserveResponse::default()
    }))
}
