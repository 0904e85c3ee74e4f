//! Venue search passthrough.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use covet_resy::types::SearchResult;
use covet_resy::WafJar;

use crate::error::ApiResult;
use crate::server::AppState;

/// Search request body.
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    /// Venue name query.
    pub name: String,
    /// Optional result cap; zero or absent means no cap.
    #[serde(default)]
    pub limit: usize,
}

/// Search response body.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    /// Matching venues.
    pub results: Vec<SearchResult>,
}

/// POST `/api/search`.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Json<SearchResponse>> {
    let mut jar = WafJar::new();
    let limit = (request.limit > 0).then_some(request.limit);
    let results = state.resy.search(&mut jar, &request.name, limit).await?;
    Ok(Json(SearchResponse { results }))
}
