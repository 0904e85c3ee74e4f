//! Booking-window lookup.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::error::ApiResult;
use crate::server::AppState;

/// Booking-window response body.
#[derive(Debug, Serialize)]
pub struct BookingWindowResponse {
    /// Upstream venue identifier.
    pub venue_id: i64,
    /// How many days ahead the venue releases dates.
    pub days_in_advance: u32,
    /// Release wall-clock time, `HH:MM`.
    pub release_time: String,
    /// IANA zone of the release time.
    pub timezone: String,
}

/// GET `/api/booking-window/:venue_id`.
pub async fn booking_window(
    State(state): State<Arc<AppState>>,
    Path(venue_id): Path<i64>,
) -> ApiResult<Json<BookingWindowResponse>> {
    let window = state.resolver.resolve(venue_id).await?;
    Ok(Json(BookingWindowResponse {
        venue_id: window.venue_id,
        days_in_advance: window.days_in_advance,
        release_time: window.release_time(),
        timezone: window.timezone,
    }))
}
