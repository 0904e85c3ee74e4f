//! `covet-api` binary entrypoint.
//!
//! Loads configuration from environment variables, connects the KVS, and
//! runs the HTTP server alongside the scheduler and cookie-refresher loops
//! under one shutdown token.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use covet_api::config::Config;
use covet_api::server::{self, AppState};
use covet_core::kvs::{Kvs, MemoryKvs, RedisKvs};
use covet_core::observability::{init_logging_with_buffer, LogBuffer, LogFormat};
use covet_engine::{
    CookieRefresher, RemoteVenueScraper, Scheduler, VenueDirectory, VenueScraper,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

fn choose_log_format(config: &Config) -> LogFormat {
    if config.debug {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    let logs = Arc::new(LogBuffer::default());
    init_logging_with_buffer(choose_log_format(&config), Arc::clone(&logs));

    let kvs: Arc<dyn Kvs> = if let Some(url) = config.redis_url.as_deref() {
        tracing::info!(url, "connecting to redis");
        Arc::new(RedisKvs::connect(url, config.redis_password.as_deref()).await?)
    } else {
        if !config.debug {
            anyhow::bail!("COVET_REDIS_URL is required when COVET_DEBUG=false");
        }
        tracing::warn!("COVET_REDIS_URL not set; using in-memory storage (debug only)");
        Arc::new(MemoryKvs::new())
    };

    let venues = Arc::new(VenueDirectory::load(&config.venues_file));
    let scraper: Arc<dyn VenueScraper> =
        Arc::new(RemoteVenueScraper::new(config.browser_driver_url.clone()));
    if config.browser_driver_url.is_none() {
        tracing::warn!(
            "COVET_BROWSER_DRIVER_URL not set; booking-window scrapes and cookie refreshes will fail"
        );
    }

    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&kvs),
        scraper,
        venues,
        logs,
    ));

    let cancel = CancellationToken::new();

    let scheduler = Scheduler::new(
        state.queue.clone(),
        state.vault.clone(),
        state.sessions.clone(),
        Arc::clone(&state.resy),
        state.usage.clone(),
        config.timezone,
        cancel.clone(),
    );
    let scheduler_handle = tokio::spawn(scheduler.run());

    let refresher_handle = if config.cookie_refresh_enabled {
        let refresher = CookieRefresher::new(
            state.sessions.clone(),
            Arc::clone(&state.scraper),
            Arc::clone(&state.venues),
            config.cookie_refresh_interval,
            cancel.clone(),
        );
        Some(tokio::spawn(refresher.run()))
    } else {
        tracing::info!("cookie refresher disabled by configuration");
        None
    };

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received");
        signal_cancel.cancel();
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(port = config.http_port, "server listening");

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await?;

    // The loops observe the token at every sleep point; give them the
    // grace window to let an in-flight attempt finish.
    let drain = async {
        let _ = scheduler_handle.await;
        if let Some(handle) = refresher_handle {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        tracing::warn!("background loops did not stop within the grace window");
    }

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        _ = terminate => {},
    }
}
