//! The in-memory log snapshot.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::server::AppState;

/// GET `/api/logs`: the retained log lines, oldest first.
pub async fn logs(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.logs.snapshot())
}
