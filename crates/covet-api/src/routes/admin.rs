//! Admin cookie management and status.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use covet_resy::WafCookie;

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

const DEFAULT_IMPORT_TTL_HOURS: u64 = 24;

/// One cookie in an import request.
#[derive(Debug, Deserialize)]
pub struct CookieData {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Cookie domain; defaults to the upstream's.
    #[serde(default)]
    pub domain: String,
    /// Cookie path; defaults to `/`.
    #[serde(default)]
    pub path: String,
}

/// Cookie import request body.
#[derive(Debug, Deserialize)]
pub struct CookieImportRequest {
    /// Target venue.
    pub venue_id: i64,
    /// Cookies captured from a browser session.
    #[serde(default)]
    pub cookies: Vec<CookieData>,
    /// User agent the cookies were captured under.
    #[serde(default)]
    pub user_agent: String,
    /// Session TTL in hours; defaults to 24.
    #[serde(default)]
    pub ttl_hours: u64,
}

/// Generic admin confirmation body.
#[derive(Debug, Serialize)]
pub struct AdminMessage {
    /// Human-readable confirmation.
    pub message: String,
}

/// Per-venue cookie status body.
#[derive(Debug, Serialize)]
pub struct CookieStatusResponse {
    /// Venue id.
    pub venue_id: i64,
    /// Whether a session is stored.
    pub exists: bool,
    /// Session expiry, when stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Remaining TTL in seconds, when stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
}

/// One venue row in the admin status listing.
#[derive(Debug, Serialize)]
pub struct VenueStatus {
    /// Venue id.
    pub venue_id: i64,
    /// `valid` or `missing`.
    pub cookie_status: String,
    /// Remaining TTL in seconds, when valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
}

/// Admin status body.
#[derive(Debug, Serialize)]
pub struct AdminStatusResponse {
    /// Per-venue cookie freshness.
    pub venues: Vec<VenueStatus>,
    /// Pending queue depth.
    pub pending_reservations: u64,
}

/// POST `/admin/cookies/import`.
pub async fn import_cookies(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CookieImportRequest>,
) -> ApiResult<Json<AdminMessage>> {
    if request.venue_id == 0 {
        return Err(ApiError::bad_request("venue_id is required"));
    }

    let cookies: Vec<WafCookie> = request
        .cookies
        .into_iter()
        .map(|data| {
            let mut cookie = WafCookie::new(data.name, data.value);
            if !data.domain.is_empty() {
                cookie.domain = data.domain;
            }
            if !data.path.is_empty() {
                cookie.path = data.path;
            }
            cookie
        })
        .collect();

    let ttl_hours = if request.ttl_hours > 0 {
        request.ttl_hours
    } else {
        DEFAULT_IMPORT_TTL_HOURS
    };
    let imported = cookies.len();

    state
        .sessions
        .save(
            request.venue_id,
            cookies,
            request.user_agent,
            Duration::from_secs(ttl_hours * 3600),
        )
        .await?;

    tracing::info!(
        venue_id = request.venue_id,
        cookies = imported,
        ttl_hours,
        "imported WAF cookies"
    );
    Ok(Json(AdminMessage {
        message: "Cookies imported successfully".to_string(),
    }))
}

/// GET `/admin/cookies/:venue_id`.
pub async fn cookie_status(
    State(state): State<Arc<AppState>>,
    Path(venue_id): Path<i64>,
) -> ApiResult<Json<CookieStatusResponse>> {
    let session = state.sessions.load(venue_id).await?;
    let ttl = state.sessions.ttl(venue_id).await?;
    Ok(Json(CookieStatusResponse {
        venue_id,
        exists: session.is_some(),
        expires_at: session.map(|s| s.expires_at),
        ttl_seconds: ttl.map(|d| d.as_secs()),
    }))
}

/// DELETE `/admin/cookies/:venue_id`.
pub async fn delete_cookies(
    State(state): State<Arc<AppState>>,
    Path(venue_id): Path<i64>,
) -> ApiResult<Json<AdminMessage>> {
    state.sessions.delete(venue_id).await?;
    tracing::info!(venue_id, "deleted WAF cookies");
    Ok(Json(AdminMessage {
        message: "Cookies deleted".to_string(),
    }))
}

/// GET `/admin/status`.
pub async fn status(State(state): State<Arc<AppState>>) -> ApiResult<Json<AdminStatusResponse>> {
    let pending_reservations = state.queue.count_pending().await?;

    let mut venues = Vec::with_capacity(state.venues.all().len());
    for venue in state.venues.all() {
        let ttl = state.sessions.ttl(venue.id).await.unwrap_or(None);
        let exists = state.sessions.exists(venue.id).await.unwrap_or(false);
        venues.push(VenueStatus {
            venue_id: venue.id,
            cookie_status: if exists { "valid" } else { "missing" }.to_string(),
            ttl_seconds: ttl.map(|d| d.as_secs()),
        });
    }

    Ok(Json(AdminStatusResponse {
        venues,
        pending_reservations,
    }))
}
