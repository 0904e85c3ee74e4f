//! The headless-browser collaborator interface and page parsing.
//!
//! Covet does not drive a browser itself: the [`VenueScraper`] trait is the
//! contract with an external driver service that renders venue pages from a
//! real browser profile. What comes back is parsed here, preferring the
//! structured `__NEXT_DATA__` blob the page embeds and falling back to
//! regex over the rendered HTML.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use covet_core::{Error, Result};
use covet_resy::WafCookie;
use regex::Regex;
use serde::Deserialize;

use crate::window::BookingWindow;

/// Default timezone assumed when the page does not reveal one.
pub const DEFAULT_VENUE_TIMEZONE: &str = "America/New_York";

const MAX_DAYS_IN_ADVANCE: u32 = 365;
const DEFAULT_RELEASE_HOUR: u32 = 9;
const DRIVER_TIMEOUT: Duration = Duration::from_secs(60);

/// A rendered venue page.
#[derive(Debug, Clone, Deserialize)]
pub struct PageSnapshot {
    /// The embedded `__NEXT_DATA__` JSON, when the page carried one.
    pub next_data: Option<String>,
    /// The rendered body HTML.
    pub html: String,
}

/// Freshly harvested WAF session artifacts.
#[derive(Debug, Clone, Deserialize)]
pub struct CookieHarvest {
    /// The WAF cookies the browser ended up with.
    pub cookies: Vec<WafCookie>,
    /// The user agent the browser presented.
    pub user_agent: String,
}

/// The browser-driver collaborator.
///
/// Implementations render venue pages and harvest WAF cookies from a real
/// browser; tests substitute fixtures.
#[async_trait]
pub trait VenueScraper: Send + Sync {
    /// Renders a venue's page.
    async fn venue_page(&self, venue_id: i64, slug: Option<&str>) -> Result<PageSnapshot>;

    /// Harvests fresh WAF cookies for a venue.
    async fn harvest_cookies(&self, venue_id: i64, slug: Option<&str>) -> Result<CookieHarvest>;
}

/// [`VenueScraper`] backed by a remote browser-driver service.
///
/// The driver exposes two POST endpoints, `/v1/page` and `/v1/cookies`,
/// each taking `{venue_id, slug}` and answering with the shapes above.
#[derive(Clone)]
pub struct RemoteVenueScraper {
    base_url: Option<String>,
    http: reqwest::Client,
}

impl RemoteVenueScraper {
    /// Creates a driver client; `None` leaves scraping unconfigured and
    /// every call fails with a configuration error.
    #[must_use]
    pub fn new(base_url: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(DRIVER_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.map(|url| url.trim_end_matches('/').to_string()),
            http,
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        venue_id: i64,
        slug: Option<&str>,
    ) -> Result<T> {
        let base = self.base_url.as_deref().ok_or_else(|| {
            Error::configuration("browser driver URL is not configured")
        })?;
        let response = self
            .http
            .post(format!("{base}{path}"))
            .json(&serde_json::json!({ "venue_id": venue_id, "slug": slug }))
            .send()
            .await
            .map_err(|e| Error::storage(format!("browser driver request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::storage(format!(
                "browser driver answered {status} for {path}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| Error::serialization(format!("invalid browser driver response: {e}")))
    }
}

#[async_trait]
impl VenueScraper for RemoteVenueScraper {
    async fn venue_page(&self, venue_id: i64, slug: Option<&str>) -> Result<PageSnapshot> {
        self.call("/v1/page", venue_id, slug).await
    }

    async fn harvest_cookies(&self, venue_id: i64, slug: Option<&str>) -> Result<CookieHarvest> {
        self.call("/v1/cookies", venue_id, slug).await
    }
}

/// Extracts a booking window from a rendered page.
///
/// # Errors
///
/// Returns an internal error when neither the structured blob nor the HTML
/// reveals how many days in advance the venue releases dates.
pub fn parse_snapshot(venue_id: i64, snapshot: &PageSnapshot) -> Result<BookingWindow> {
    if let Some(next_data) = snapshot.next_data.as_deref() {
        if !next_data.is_empty() {
            match parse_next_data(venue_id, next_data) {
                Ok(window) => return Ok(window),
                Err(e) => {
                    tracing::debug!(venue_id, "structured blob unusable, trying HTML: {e}");
                }
            }
        }
    }
    parse_html(venue_id, &snapshot.html)
}

/// Parses the `__NEXT_DATA__` blob by recursively scanning for the booking
/// window fields under `props.pageProps`.
fn parse_next_data(venue_id: i64, raw: &str) -> Result<BookingWindow> {
    let data: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| Error::serialization(format!("invalid __NEXT_DATA__ JSON: {e}")))?;
    let page_props = data
        .get("props")
        .and_then(|props| props.get("pageProps"))
        .ok_or_else(|| Error::serialization("pageProps not found in __NEXT_DATA__"))?;

    let mut window = BookingWindow {
        venue_id,
        days_in_advance: 0,
        release_hour: DEFAULT_RELEASE_HOUR,
        release_minute: 0,
        timezone: DEFAULT_VENUE_TIMEZONE.to_string(),
        scraped_at: Utc::now(),
    };
    scan_value(page_props, &mut window);

    if window.days_in_advance == 0 {
        return Err(Error::internal(format!(
            "could not determine booking window for venue {venue_id}: days_in_advance not present"
        )));
    }
    Ok(window)
}

const DAYS_FIELDS: [&str; 5] = [
    "days_in_advance",
    "daysinadvance",
    "advance_days",
    "booking_window",
    "bookingwindow",
];
const TIME_FIELDS: [&str; 5] = [
    "release_time",
    "releasetime",
    "open_time",
    "opentime",
    "notify_time",
];

fn scan_value(value: &serde_json::Value, window: &mut BookingWindow) {
    let Some(object) = value.as_object() else {
        return;
    };
    for (key, nested) in object {
        let key_lower = key.to_lowercase();

        if DAYS_FIELDS.iter().any(|field| key_lower.contains(field)) {
            if let Some(days) = nested.as_u64() {
                if let Ok(days) = u32::try_from(days) {
                    if days > 0 && days <= MAX_DAYS_IN_ADVANCE {
                        window.days_in_advance = days;
                    }
                }
            }
        }

        if TIME_FIELDS.iter().any(|field| key_lower.contains(field)) {
            if let Some(raw) = nested.as_str() {
                if let Some((hour, minute)) = parse_release_time(raw) {
                    window.release_hour = hour;
                    window.release_minute = minute;
                }
            }
        }

        scan_value(nested, window);
    }
}

fn release_time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d{1,2}):?(\d{2})?\s*(am|pm)?").expect("valid release time pattern")
    })
}

/// Parses strings like `9:00 AM`, `09:00`, `9pm` into (hour, minute).
#[must_use]
pub fn parse_release_time(raw: &str) -> Option<(u32, u32)> {
    let captures = release_time_regex().captures(raw.trim())?;
    let hour: u32 = captures.get(1)?.as_str().parse().ok()?;
    let minute: u32 = captures
        .get(2)
        .map_or(Some(0), |m| m.as_str().parse().ok())?;
    if hour > 23 || minute > 59 {
        return None;
    }

    let meridiem = captures.get(3).map(|m| m.as_str().to_lowercase());
    let hour = match meridiem.as_deref() {
        Some("pm") if hour != 12 => hour + 12,
        Some("am") if hour == 12 => 0,
        _ => hour,
    };
    if hour > 23 {
        return None;
    }
    Some((hour, minute))
}

fn days_patterns() -> &'static [Regex; 4] {
    static RES: OnceLock<[Regex; 4]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            Regex::new(r"(\d+)\s*days?\s*in\s*advance").expect("valid pattern"),
            Regex::new(r"book\s*(?:up\s*to\s*)?(\d+)\s*days?").expect("valid pattern"),
            Regex::new(r"(\d+)\s*day\s*booking\s*window").expect("valid pattern"),
            Regex::new(r"reservations?\s*(?:open|available)\s*(\d+)\s*days?").expect("valid pattern"),
        ]
    })
}

fn time_patterns() -> &'static [Regex; 2] {
    static RES: OnceLock<[Regex; 2]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            Regex::new(r"(?:open|released?|available)\s*(?:at|@)\s*(\d{1,2}):?(\d{2})?\s*(am|pm)?")
                .expect("valid pattern"),
            Regex::new(r"(\d{1,2}):?(\d{2})?\s*(am|pm)\s*(?:daily|every\s*day)")
                .expect("valid pattern"),
        ]
    })
}

/// Fallback: regex over the rendered HTML.
fn parse_html(venue_id: i64, html: &str) -> Result<BookingWindow> {
    let html_lower = html.to_lowercase();

    let mut window = BookingWindow {
        venue_id,
        days_in_advance: 0,
        release_hour: DEFAULT_RELEASE_HOUR,
        release_minute: 0,
        timezone: DEFAULT_VENUE_TIMEZONE.to_string(),
        scraped_at: Utc::now(),
    };

    for pattern in days_patterns() {
        if let Some(captures) = pattern.captures(&html_lower) {
            if let Ok(days) = captures[1].parse::<u32>() {
                if days > 0 && days <= MAX_DAYS_IN_ADVANCE {
                    window.days_in_advance = days;
                    break;
                }
            }
        }
    }

    for pattern in time_patterns() {
        if let Some(captures) = pattern.captures(&html_lower) {
            let Ok(hour) = captures[1].parse::<u32>() else {
                continue;
            };
            let minute = captures
                .get(2)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .unwrap_or(0);
            if hour > 23 || minute > 59 {
                continue;
            }
            let is_pm = captures.get(3).is_some_and(|m| m.as_str() == "pm");
            let is_am = captures.get(3).is_some_and(|m| m.as_str() == "am");
            window.release_hour = match (is_pm, is_am, hour) {
                (true, _, h) if h != 12 => h + 12,
                (_, true, 12) => 0,
                _ => hour,
            };
            window.release_minute = minute;
            break;
        }
    }

    if window.days_in_advance == 0 {
        return Err(Error::internal(format!(
            "could not determine booking window for venue {venue_id}: no day count in page content"
        )));
    }

    tracing::debug!(
        venue_id,
        days_in_advance = window.days_in_advance,
        release_time = %window.release_time(),
        "extracted booking window from HTML"
    );
    Ok(window)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_data_blob_is_preferred() {
        let snapshot = PageSnapshot {
            next_data: Some(
                serde_json::json!({
                    "props": {"pageProps": {"venue": {
                        "config": {"days_in_advance": 21, "release_time": "10:30 AM"}
                    }}}
                })
                .to_string(),
            ),
            html: "Book up to 60 days in advance".to_string(),
        };
        let window = parse_snapshot(89607, &snapshot).unwrap();
        assert_eq!(window.days_in_advance, 21);
        assert_eq!(window.release_hour, 10);
        assert_eq!(window.release_minute, 30);
        assert_eq!(window.timezone, "America/New_York");
    }

    #[test]
    fn unusable_blob_falls_back_to_html() {
        let snapshot = PageSnapshot {
            next_data: Some(r#"{"props": {"pageProps": {"nothing": true}}}"#.to_string()),
            html: "Reservations open 14 days ahead. Released at 10:00 am".to_string(),
        };
        let window = parse_snapshot(89607, &snapshot).unwrap();
        assert_eq!(window.days_in_advance, 14);
        assert_eq!(window.release_hour, 10);
    }

    #[test]
    fn html_day_phrases_parse() {
        for (html, days) in [
            ("you can book 30 days in advance", 30),
            ("book up to 21 days ahead", 21),
            ("a 45 day booking window", 45),
            ("reservations open 60 days out", 60),
        ] {
            let window = parse_html(1, html).unwrap();
            assert_eq!(window.days_in_advance, days, "{html}");
        }
    }

    #[test]
    fn html_without_day_count_fails() {
        let err = parse_html(1, "a lovely restaurant").unwrap_err();
        assert!(err.to_string().contains("could not determine booking window"));
    }

    #[test]
    fn implausible_day_counts_are_rejected() {
        let err = parse_html(1, "book 800 days in advance").unwrap_err();
        assert!(err.to_string().contains("booking window"));
    }

    #[test]
    fn html_release_time_defaults_to_nine() {
        let window = parse_html(1, "book 30 days in advance").unwrap();
        assert_eq!(window.release_hour, 9);
        assert_eq!(window.release_minute, 0);
    }

    #[test]
    fn html_pm_release_time_is_normalized() {
        let window = parse_html(1, "book 30 days in advance, open at 5:30 pm").unwrap();
        assert_eq!(window.release_hour, 17);
        assert_eq!(window.release_minute, 30);
    }

    #[test]
    fn release_time_strings_parse() {
        assert_eq!(parse_release_time("9:00 AM"), Some((9, 0)));
        assert_eq!(parse_release_time("09:00"), Some((9, 0)));
        assert_eq!(parse_release_time("12:15 pm"), Some((12, 15)));
        assert_eq!(parse_release_time("12am"), Some((0, 0)));
        assert_eq!(parse_release_time("5pm"), Some((17, 0)));
    }

    #[test]
    fn malformed_release_times_are_none() {
        assert_eq!(parse_release_time("whenever"), None);
        assert_eq!(parse_release_time("25:00"), None);
    }
}
