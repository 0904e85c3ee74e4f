//! Application state, router assembly, and request guards.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use covet_core::kvs::Kvs;
use covet_core::observability::LogBuffer;
use covet_engine::{
    CredentialVault, ReservationQueue, UsageReporter, VenueDirectory, VenueScraper,
    WafSessionStore, WindowResolver,
};
use covet_resy::ResyClient;

use crate::config::Config;
use crate::error::ApiError;
use crate::routes;

/// Shared application state for all request handlers and background tasks.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// The key-value store.
    pub kvs: Arc<dyn Kvs>,
    /// The reservation queue.
    pub queue: ReservationQueue,
    /// The credential vault.
    pub vault: CredentialVault,
    /// The per-venue WAF session store.
    pub sessions: WafSessionStore,
    /// The booking-window resolver.
    pub resolver: WindowResolver,
    /// The upstream protocol client.
    pub resy: Arc<ResyClient>,
    /// The usage reporter.
    pub usage: UsageReporter,
    /// The browser-driver collaborator.
    pub scraper: Arc<dyn VenueScraper>,
    /// The static venue directory.
    pub venues: Arc<VenueDirectory>,
    /// The in-memory log ring served by `/api/logs`.
    pub logs: Arc<LogBuffer>,
}

impl AppState {
    /// Wires up the state from its collaborators.
    #[must_use]
    pub fn new(
        config: Config,
        kvs: Arc<dyn Kvs>,
        scraper: Arc<dyn VenueScraper>,
        venues: Arc<VenueDirectory>,
        logs: Arc<LogBuffer>,
    ) -> Self {
        let queue = ReservationQueue::new(Arc::clone(&kvs));
        let vault = CredentialVault::new(Arc::clone(&kvs), config.vault_key);
        let sessions = WafSessionStore::new(Arc::clone(&kvs));
        let resolver = WindowResolver::new(
            Arc::clone(&kvs),
            Arc::clone(&scraper),
            Arc::clone(&venues),
        );
        let resy = Arc::new(ResyClient::with_base_url(
            config.resy_base_url.clone(),
            config.resy_api_key.clone(),
        ));
        let usage = UsageReporter::new(
            Arc::clone(&kvs),
            config.usage_url.clone(),
            config.internal_token.clone(),
        );
        Self {
            config,
            kvs,
            queue,
            vault,
            sessions,
            resolver,
            resy,
            usage,
            scraper,
            venues,
            logs,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// KVS connectivity.
    pub kvs: String,
}

/// Health check endpoint handler.
///
/// Public by design: load balancers probe it without tokens. The KVS check
/// is a live ping, so "disconnected" is an actionable signal.
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let kvs = match state.kvs.ping().await {
        Ok(()) => "connected",
        Err(_) => "disconnected",
    };
    Json(HealthResponse {
        status: "ok".to_string(),
        kvs: kvs.to_string(),
    })
}

/// Requires the shared `X-Internal-Token` secret on every non-public
/// endpoint. A deployment without the token configured refuses the whole
/// surface rather than running open.
async fn require_internal_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.internal_token.as_deref() else {
        return ApiError::internal("internal token is not configured").into_response();
    };
    let presented = request
        .headers()
        .get("x-internal-token")
        .and_then(|v| v.to_str().ok());
    if presented != Some(expected) {
        return ApiError::unauthorized("Unauthorized").into_response();
    }
    next.run(request).await
}

/// Requires the admin bearer token on `/admin/*`. A `?token=` query
/// parameter is accepted for browser use.
async fn require_admin_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.admin_token.as_deref() else {
        return ApiError::unauthorized("Unauthorized").into_response();
    };

    let bearer = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let query_token = request
        .uri()
        .query()
        .and_then(|q| q.split('&').find_map(|pair| pair.strip_prefix("token=")));

    let authorized = match (bearer, query_token) {
        (Some(token), _) => token == expected,
        (None, Some(token)) => token == expected,
        (None, None) => false,
    };
    if !authorized {
        return ApiError::unauthorized("Unauthorized").into_response();
    }
    next.run(request).await
}

/// Assembles the full router over the given state.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    let internal_guard =
        middleware::from_fn_with_state(Arc::clone(&state), require_internal_token);
    let admin_guard = middleware::from_fn_with_state(Arc::clone(&state), require_admin_token);

    let api = Router::new()
        .route("/reserve", post(routes::reserve::reserve))
        .route("/reservations", get(routes::reservations::list))
        .route(
            "/reservations/:id",
            axum::routing::delete(routes::reservations::cancel),
        )
        .route("/search", post(routes::search::search))
        .route("/resy/link", post(routes::account::link))
        .route("/resy/status", get(routes::account::status))
        .route("/resy/unlink", post(routes::account::unlink))
        .route(
            "/booking-window/:venue_id",
            get(routes::window::booking_window),
        )
        .route("/logs", get(routes::logs::logs))
        .route_layer(internal_guard.clone());

    let admin = Router::new()
        .route("/cookies/import", post(routes::admin::import_cookies))
        .route(
            "/cookies/:venue_id",
            get(routes::admin::cookie_status).delete(routes::admin::delete_cookies),
        )
        .route("/status", get(routes::admin::status))
        .route_layer(admin_guard)
        .route_layer(internal_guard);

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .nest("/admin", admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Reads the caller's owner id from `X-Owner-Id`.
#[must_use]
pub fn owner_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-owner-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
