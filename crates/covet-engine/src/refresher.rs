//! The background cookie-refresh loop.
//!
//! Keeps WAF sessions warm for every venue in the directory: one pass at
//! startup, then one per interval. Sessions with comfortable TTLs are left
//! alone; everything else gets fresh cookies from the browser driver.
//! Errors never stop the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::cookies::{WafSessionStore, DEFAULT_SESSION_TTL};
use crate::scrape::VenueScraper;
use crate::venues::VenueDirectory;

/// Sessions with more remaining TTL than this are not refreshed.
pub const REFRESH_SKIP_THRESHOLD: Duration = Duration::from_secs(2 * 60 * 60);

/// The cookie-refresher task.
pub struct CookieRefresher {
    sessions: WafSessionStore,
    scraper: Arc<dyn VenueScraper>,
    venues: Arc<VenueDirectory>,
    interval: Duration,
    cancel: CancellationToken,
}

impl CookieRefresher {
    /// Creates a refresher.
    #[must_use]
    pub fn new(
        sessions: WafSessionStore,
        scraper: Arc<dyn VenueScraper>,
        venues: Arc<VenueDirectory>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            sessions,
            scraper,
            venues,
            interval,
            cancel,
        }
    }

    /// Runs until the cancellation token fires.
    pub async fn run(self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "cookie refresher started");

        self.refresh_all().await;
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => self.refresh_all().await,
            }
        }
        tracing::info!("cookie refresher stopped");
    }

    /// One refresh pass over every configured venue.
    pub async fn refresh_all(&self) {
        let venues = self.venues.all();
        tracing::info!(venues = venues.len(), "starting cookie refresh pass");

        for venue in venues {
            if self.cancel.is_cancelled() {
                return;
            }
            self.refresh_if_needed(venue.id, venue.slug_opt()).await;
        }

        tracing::info!("cookie refresh pass completed");
    }

    async fn refresh_if_needed(&self, venue_id: i64, slug: Option<&str>) {
        match self.sessions.ttl(venue_id).await {
            Ok(Some(remaining)) if remaining > REFRESH_SKIP_THRESHOLD => {
                tracing::debug!(
                    venue_id,
                    remaining_secs = remaining.as_secs(),
                    "WAF session still fresh, skipping"
                );
                return;
            }
            Ok(Some(remaining)) => {
                tracing::info!(
                    venue_id,
                    remaining_secs = remaining.as_secs(),
                    "WAF session expiring soon, refreshing"
                );
            }
            Ok(None) => {
                tracing::info!(venue_id, "no WAF session on file, fetching");
            }
            Err(e) => {
                tracing::warn!(venue_id, "failed to check WAF session TTL: {e}");
                return;
            }
        }

        let harvest = match self.scraper.harvest_cookies(venue_id, slug).await {
            Ok(harvest) => harvest,
            Err(e) => {
                tracing::warn!(venue_id, "cookie harvest failed: {e}");
                return;
            }
        };

        match self
            .sessions
            .save(
                venue_id,
                harvest.cookies.clone(),
                harvest.user_agent,
                DEFAULT_SESSION_TTL,
            )
            .await
        {
            Ok(()) => tracing::info!(
                venue_id,
                cookies = harvest.cookies.len(),
                "refreshed WAF session"
            ),
            Err(e) => tracing::warn!(venue_id, "failed to store refreshed session: {e}"),
        }
    }
}
