//! Listing and cancelling pending reservations.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use covet_core::ReservationId;

use crate::error::{ApiError, ApiResult};
use crate::routes::format_local;
use crate::server::{owner_id_from_headers, AppState};

/// One pending reservation in a listing.
#[derive(Debug, Serialize)]
pub struct ReservationSummary {
    /// Queue id.
    pub id: String,
    /// Upstream venue identifier.
    pub venue_id: i64,
    /// Venue display name.
    pub venue_name: String,
    /// Desired seat wall time in the service zone.
    pub reservation_time: String,
    /// Party size.
    pub party_size: u32,
    /// When the sniper fires, in the service zone.
    pub run_time: String,
    /// Enqueue wall time in the service zone.
    pub created_at: String,
    /// Table preferences.
    pub table_preferences: Vec<String>,
}

/// Listing response.
#[derive(Debug, Serialize)]
pub struct ReservationListResponse {
    /// Pending reservations, run time ascending.
    pub reservations: Vec<ReservationSummary>,
}

/// Cancellation response.
#[derive(Debug, Serialize)]
pub struct CancelReservationResponse {
    /// Human-readable confirmation.
    pub message: String,
}

/// GET `/api/reservations`.
///
/// With `X-Owner-Id` the listing is scoped to the caller; without it the
/// whole queue is returned (admin use).
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<ReservationListResponse>> {
    let records = match owner_id_from_headers(&headers) {
        Some(owner_id) => state.queue.list_by_owner(&owner_id).await?,
        None => state.queue.list_all().await?,
    };

    let tz = state.config.timezone;
    let reservations = records
        .into_iter()
        .map(|record| ReservationSummary {
            id: record.id.to_string(),
            venue_id: record.venue_id,
            venue_name: state.venues.name_of(record.venue_id),
            reservation_time: format_local(record.reservation_time, tz),
            party_size: record.party_size,
            run_time: format_local(record.run_time, tz),
            created_at: format_local(record.created_at, tz),
            table_preferences: record.table_preferences,
        })
        .collect();

    Ok(Json(ReservationListResponse { reservations }))
}

/// DELETE `/api/reservations/:id`.
///
/// Ownership-checked when the owner header is present; a scoped cancel of
/// an unknown id answers success so cancellation is idempotent from the
/// caller's side.
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<CancelReservationResponse>> {
    let owner_id = owner_id_from_headers(&headers);
    let cancelled = Json(CancelReservationResponse {
        message: "Reservation cancelled".to_string(),
    });

    let Ok(id) = raw_id.parse::<ReservationId>() else {
        return if owner_id.is_some() {
            Ok(cancelled)
        } else {
            Err(ApiError::not_found("Reservation not found"))
        };
    };

    match state.queue.get(&id).await? {
        None => {
            if owner_id.is_some() {
                Ok(cancelled)
            } else {
                Err(ApiError::not_found("Reservation not found"))
            }
        }
        Some(record) => {
            if let Some(owner_id) = &owner_id {
                if &record.owner_id != owner_id {
                    // Do not reveal foreign reservations.
                    return Err(ApiError::not_found("Reservation not found"));
                }
            }
            state.queue.delete(&id).await?;
            tracing::info!(reservation_id = %id, "reservation cancelled");
            Ok(cancelled)
        }
    }
}
