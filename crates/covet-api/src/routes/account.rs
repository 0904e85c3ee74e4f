//! Linking upstream accounts to owners.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use covet_engine::UserCredentials;
use covet_resy::WafJar;

use crate::error::ApiResult;
use crate::routes::require_owner;
use crate::server::AppState;

/// Link request body.
#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    /// Upstream account email.
    pub email: String,
    /// Upstream account password; used once, never stored.
    pub password: String,
}

/// Confirmation body for link/unlink.
#[derive(Debug, Serialize)]
pub struct LinkResponse {
    /// Human-readable confirmation.
    pub message: String,
}

/// Link status body.
#[derive(Debug, Serialize)]
pub struct LinkStatusResponse {
    /// Whether the caller has linked credentials.
    pub linked: bool,
}

/// POST `/api/resy/link`: authenticate upstream, then vault the
/// credentials.
pub async fn link(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<LinkRequest>,
) -> ApiResult<Json<LinkResponse>> {
    let owner_id = require_owner(&headers)?;

    let mut jar = WafJar::new();
    let profile = state
        .resy
        .login(&mut jar, &request.email, &request.password)
        .await?;

    state
        .vault
        .link(&UserCredentials {
            owner_id: owner_id.clone(),
            auth_token: profile.auth_token,
            payment_method_id: profile.payment_method_id,
        })
        .await?;

    tracing::info!(owner_id = %owner_id, "linked upstream account");
    Ok(Json(LinkResponse {
        message: "Account linked successfully".to_string(),
    }))
}

/// GET `/api/resy/status`.
pub async fn status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<LinkStatusResponse>> {
    let owner_id = require_owner(&headers)?;
    let linked = state.vault.is_linked(&owner_id).await?;
    Ok(Json(LinkStatusResponse { linked }))
}

/// POST `/api/resy/unlink`.
pub async fn unlink(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<LinkResponse>> {
    let owner_id = require_owner(&headers)?;
    state.vault.unlink(&owner_id).await?;
    tracing::info!(owner_id = %owner_id, "unlinked upstream account");
    Ok(Json(LinkResponse {
        message: "Account unlinked successfully".to_string(),
    }))
}
