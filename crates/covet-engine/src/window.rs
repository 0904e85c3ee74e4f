//! Booking windows and the run-time arithmetic built on them.
//!
//! A venue's booking window says how many days ahead it releases dates and
//! at what local wall-clock time. The resolver caches inferred windows in
//! the KVS for a day and falls back to scraping the venue page through the
//! browser collaborator on a miss.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, TimeZone, Utc};
use chrono_tz::Tz;
use covet_core::kvs::Kvs;
use covet_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::scrape::{parse_snapshot, VenueScraper};
use crate::venues::VenueDirectory;

/// Key prefix for cached windows.
pub const WINDOW_KEY_PREFIX: &str = "booking_window:";

/// Cache lifetime for inferred windows.
pub const WINDOW_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const SCRAPE_ATTEMPTS: u32 = 3;

/// When a venue releases reservations for the date `days_in_advance` days
/// ahead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingWindow {
    /// Upstream venue identifier.
    pub venue_id: i64,
    /// How many days ahead the venue releases dates (1..=365).
    pub days_in_advance: u32,
    /// Release hour in the venue's zone (0-23).
    pub release_hour: u32,
    /// Release minute (0-59).
    pub release_minute: u32,
    /// IANA zone name the release time is expressed in.
    pub timezone: String,
    /// When this window was inferred.
    pub scraped_at: DateTime<Utc>,
}

impl BookingWindow {
    /// Renders the release time as `HH:MM`.
    #[must_use]
    pub fn release_time(&self) -> String {
        format!("{:02}:{:02}", self.release_hour, self.release_minute)
    }

    /// Parses the window's timezone.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unrecognized zone name.
    pub fn zone(&self) -> Result<Tz> {
        self.timezone.parse().map_err(|_| {
            Error::configuration(format!("unrecognized timezone '{}'", self.timezone))
        })
    }

    /// Computes the instant to fire a booking attempt for the given
    /// reservation instant: the release wall-clock time, `days_in_advance`
    /// calendar days before the reservation's venue-local date.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unrecognized timezone and an
    /// invalid-input error when the computed local time does not exist.
    pub fn run_time_for(&self, reservation_time: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let tz = self.zone()?;
        let local = reservation_time.with_timezone(&tz);
        let release_date = local
            .date_naive()
            .checked_sub_days(Days::new(u64::from(self.days_in_advance)))
            .ok_or_else(|| Error::InvalidInput("reservation date out of range".to_string()))?;
        let naive = release_date
            .and_hms_opt(self.release_hour, self.release_minute, 0)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "invalid release time {:02}:{:02}",
                    self.release_hour, self.release_minute
                ))
            })?;
        let run_local = tz.from_local_datetime(&naive).earliest().ok_or_else(|| {
            Error::InvalidInput(format!("release time {naive} does not exist in {tz}"))
        })?;
        Ok(run_local.with_timezone(&Utc))
    }
}

/// Resolves booking windows: cache first, scrape on miss.
#[derive(Clone)]
pub struct WindowResolver {
    kvs: Arc<dyn Kvs>,
    scraper: Arc<dyn VenueScraper>,
    venues: Arc<VenueDirectory>,
}

impl WindowResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new(kvs: Arc<dyn Kvs>, scraper: Arc<dyn VenueScraper>, venues: Arc<VenueDirectory>) -> Self {
        Self {
            kvs,
            scraper,
            venues,
        }
    }

    fn window_key(venue_id: i64) -> String {
        format!("{WINDOW_KEY_PREFIX}{venue_id}")
    }

    /// Returns the venue's booking window, cached or freshly inferred.
    ///
    /// # Errors
    ///
    /// Returns the final scrape error when every attempt fails and storage
    /// errors from the cache lookup.
    pub async fn resolve(&self, venue_id: i64) -> Result<BookingWindow> {
        if let Some(cached) = self.cached(venue_id).await? {
            tracing::debug!(venue_id, "using cached booking window");
            return Ok(cached);
        }

        tracing::info!(venue_id, "inferring booking window from venue page");
        let window = self.scrape_with_retry(venue_id).await?;

        if let Err(e) = self.cache(&window).await {
            tracing::warn!(venue_id, "failed to cache booking window: {e}");
        }
        Ok(window)
    }

    async fn cached(&self, venue_id: i64) -> Result<Option<BookingWindow>> {
        let Some(payload) = self.kvs.get(&Self::window_key(venue_id)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&payload) {
            Ok(window) => Ok(Some(window)),
            Err(e) => {
                tracing::warn!(venue_id, "discarding undecodable cached window: {e}");
                Ok(None)
            }
        }
    }

    async fn cache(&self, window: &BookingWindow) -> Result<()> {
        let payload = serde_json::to_string(window)
            .map_err(|e| Error::serialization(format!("failed to encode booking window: {e}")))?;
        self.kvs
            .set_with_ttl(&Self::window_key(window.venue_id), &payload, WINDOW_CACHE_TTL)
            .await
    }

    /// Up to three attempts with 2s, 4s linear back-off between them.
    async fn scrape_with_retry(&self, venue_id: i64) -> Result<BookingWindow> {
        let slug = self.venues.slug_of(venue_id).map(str::to_string);
        let mut last_error = Error::internal("booking window scrape never ran");

        for attempt in 0..SCRAPE_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(u64::from(attempt) * 2)).await;
                tracing::info!(
                    venue_id,
                    attempt = attempt + 1,
                    "retrying booking window scrape"
                );
            }

            let result = match self.scraper.venue_page(venue_id, slug.as_deref()).await {
                Ok(snapshot) => parse_snapshot(venue_id, &snapshot),
                Err(e) => Err(e),
            };
            match result {
                Ok(window) => return Ok(window),
                Err(e) => {
                    tracing::warn!(venue_id, attempt = attempt + 1, "scrape attempt failed: {e}");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}
