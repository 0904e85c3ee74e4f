//! The Resy protocol client.
//!
//! One client instance is constructed per deployment and shared; each
//! booking attempt brings its own [`WafJar`].

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use reqwest::header::{AUTHORIZATION, COOKIE, ORIGIN, REFERER, USER_AGENT};

use crate::error::{Result, Step, UpstreamError};
use crate::session::{is_waf_challenge, WafJar};
use crate::types::{
    DetailResponse, FindResponse, FindVenue, LoginProfile, LoginResponseBody, ReserveOutcome,
    ReserveParams, SearchResponseBody, SearchResult, Slot,
};

/// Production API origin.
pub const DEFAULT_BASE_URL: &str = "https://api.resy.com";

/// The one API key known to work; deployments may override it.
pub const DEFAULT_API_KEY: &str = "VbWk7s3L4KiK5fzlO7JD3Q5EYolJI7n5";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(12);
const WAF_MAX_REPLAYS: usize = 2;
const WAF_REPLAY_PAUSE: Duration = Duration::from_secs(1);
const SLOT_MATCH_WINDOW_MINUTES: i64 = 30;
const LOG_BODY_LIMIT: usize = 200;
const BOOK_SOURCE_ID: &str = "resy.com-venue-details";

/// HTTP client for the upstream booking platform.
#[derive(Debug, Clone)]
pub struct ResyClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl ResyClient {
    /// Creates a client against the production origin.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    /// Creates a client against an explicit origin (tests, staging).
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http,
        }
    }

    fn auth_header(&self) -> String {
        format!("ResyAPI api_key=\"{}\"", self.api_key)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn with_session(builder: reqwest::RequestBuilder, jar: &WafJar) -> reqwest::RequestBuilder {
        let mut builder = builder.header(USER_AGENT, jar.user_agent());
        if let Some(cookies) = jar.cookie_header() {
            builder = builder.header(COOKIE, cookies);
        }
        builder
    }

    /// Sends a request, replaying it through WAF challenges within the
    /// retry budget. The builder closure runs once per attempt so replays
    /// pick up cookies the challenge set.
    async fn send_with_retry<F>(
        &self,
        jar: &mut WafJar,
        step: Step,
        build: F,
    ) -> Result<reqwest::Response>
    where
        F: Fn(&WafJar) -> reqwest::RequestBuilder,
    {
        for attempt in 0..=WAF_MAX_REPLAYS {
            if attempt > 0 {
                tokio::time::sleep(WAF_REPLAY_PAUSE).await;
                tracing::info!(step = %step, attempt = attempt + 1, "replaying request with refreshed WAF cookies");
            }

            let response = build(&*jar)
                .send()
                .await
                .map_err(|e| UpstreamError::network(step, 0, e.to_string()))?;

            if is_waf_challenge(response.status(), response.headers()) {
                let merged = jar.absorb_challenge(response.headers());
                tracing::warn!(
                    step = %step,
                    status = response.status().as_u16(),
                    merged,
                    "WAF challenge detected"
                );
                if attempt < WAF_MAX_REPLAYS {
                    continue;
                }
                return Err(UpstreamError::WafBlocked);
            }

            return Ok(response);
        }
        Err(UpstreamError::WafBlocked)
    }

    /// Authenticates a user by email and password.
    ///
    /// # Errors
    ///
    /// `LoginWrong` on HTTP 419, `NoPaymentInfo` when the account has no
    /// payment method on file, `Network`/`WafBlocked` otherwise.
    pub async fn login(&self, jar: &mut WafJar, email: &str, password: &str) -> Result<LoginProfile> {
        let url = self.url("/3/auth/password");
        let form = [("email", email), ("password", password)];

        let response = self
            .send_with_retry(jar, Step::Login, |jar| {
                Self::with_session(
                    self.http
                        .post(&url)
                        .header(AUTHORIZATION, self.auth_header())
                        .form(&form),
                    jar,
                )
            })
            .await?;

        let status = response.status();
        // 419 is the upstream's signal for bad auth parameters.
        if status.as_u16() == 419 {
            return Err(UpstreamError::LoginWrong);
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::network(Step::Login, 0, e.to_string()))?;
        if !status.is_success() {
            return Err(UpstreamError::network(
                Step::Login,
                status.as_u16(),
                extract_message(&body),
            ));
        }

        let parsed: LoginResponseBody = serde_json::from_slice(&body)
            .map_err(|e| UpstreamError::invalid_response(Step::Login, e.to_string()))?;
        let Some(payment_method_id) = parsed.payment_method_id else {
            return Err(UpstreamError::NoPaymentInfo);
        };
        let auth_token = parsed
            .token
            .ok_or_else(|| UpstreamError::invalid_response(Step::Login, "'token' key not found"))?;

        Ok(LoginProfile {
            id: parsed.id.unwrap_or_default(),
            first_name: parsed.first_name.unwrap_or_default(),
            last_name: parsed.last_name.unwrap_or_default(),
            mobile: parsed.mobile_number.unwrap_or_default(),
            email: parsed.em_address.unwrap_or_default(),
            payment_method_id,
            auth_token,
        })
    }

    /// Searches venues by name, honoring a positive result limit.
    ///
    /// # Errors
    ///
    /// `Network` on non-2xx or malformed responses, `WafBlocked` on an
    /// unresolved challenge.
    pub async fn search(
        &self,
        jar: &mut WafJar,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SearchResult>> {
        let url = self.url("/3/venuesearch/search");
        let body = serde_json::json!({ "query": query });

        let response = self
            .send_with_retry(jar, Step::Search, |jar| {
                Self::with_session(
                    self.http
                        .post(&url)
                        .header(AUTHORIZATION, self.auth_header())
                        .header(ORIGIN, "https://resy.com")
                        .header(REFERER, "https://resy.com/")
                        .json(&body),
                    jar,
                )
            })
            .await?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::network(Step::Search, 0, e.to_string()))?;
        if !status.is_success() {
            return Err(UpstreamError::network(
                Step::Search,
                status.as_u16(),
                truncate_for_log(&body, LOG_BODY_LIMIT),
            ));
        }

        let parsed: SearchResponseBody = serde_json::from_slice(&body)
            .map_err(|e| UpstreamError::invalid_response(Step::Search, e.to_string()))?;
        let hits = parsed
            .search
            .ok_or_else(|| UpstreamError::invalid_response(Step::Search, "'search' key not found"))?
            .hits;

        let take = match limit {
            Some(limit) if limit > 0 => limit.min(hits.len()),
            _ => hits.len(),
        };

        let mut results = Vec::with_capacity(take);
        for hit in hits.into_iter().take(take) {
            let Some(venue_id) = hit.object_id.as_deref().and_then(|id| id.parse().ok()) else {
                continue;
            };
            results.push(SearchResult {
                venue_id,
                name: hit.name.unwrap_or_default(),
                region: hit.region.unwrap_or_default(),
                locality: hit.locality.unwrap_or_default(),
                neighborhood: hit.neighborhood.unwrap_or_default(),
            });
        }
        Ok(results)
    }

    /// Attempts to book a table: FIND the day's slots, pick candidates,
    /// then DETAIL + BOOK each candidate until one confirms.
    ///
    /// # Errors
    ///
    /// `NoOffer` when FIND lists no venues, `NoTable` when every candidate
    /// is exhausted, `WafBlocked` on an unresolved challenge, `Network`
    /// otherwise.
    #[allow(clippy::too_many_lines)]
    pub async fn reserve(&self, jar: &mut WafJar, params: &ReserveParams) -> Result<ReserveOutcome> {
        let tz = params.timezone;
        let requested_local = params.reservation_time.with_timezone(&tz);
        // The upstream keys everything on the venue-local calendar date.
        let day = requested_local.format("%Y-%m-%d").to_string();

        let find_url = self.url("/4/find");
        let find_body = serde_json::json!({
            "day": day,
            "venue_id": params.venue_id,
            "party_size": params.party_size,
            "lat": 0,
            "long": 0,
        });

        let response = self
            .send_with_retry(jar, Step::Find, |jar| {
                Self::with_session(
                    self.http
                        .post(&find_url)
                        .header(AUTHORIZATION, self.auth_header())
                        .header("X-Resy-Auth-Token", &params.auth_token)
                        .header("X-Resy-Universal-Auth-Token", &params.auth_token)
                        .header(ORIGIN, "https://resy.com")
                        .header(REFERER, "https://resy.com/")
                        .json(&find_body),
                    jar,
                )
            })
            .await?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::network(Step::Find, 0, e.to_string()))?;
        if !status.is_success() {
            return Err(UpstreamError::network(
                Step::Find,
                status.as_u16(),
                extract_message(&body),
            ));
        }

        let parsed: FindResponse = serde_json::from_slice(&body)
            .map_err(|e| UpstreamError::invalid_response(Step::Find, e.to_string()))?;
        let venues = parsed
            .results
            .ok_or_else(|| UpstreamError::invalid_response(Step::Find, "'results' key not found"))?
            .venues
            .ok_or_else(|| UpstreamError::invalid_response(Step::Find, "'venues' key not found"))?;
        if venues.is_empty() {
            return Err(UpstreamError::NoOffer);
        }

        let venue = Self::pick_venue(&venues, params.venue_id);
        let slots = venue.slots.as_ref().ok_or_else(|| {
            UpstreamError::invalid_response(Step::Find, "'slots' key not found in venue")
        })?;

        // Empty preferences mean a single unconstrained pass.
        let preferences: Vec<Option<&str>> = if params.table_preferences.is_empty() {
            vec![None]
        } else {
            params
                .table_preferences
                .iter()
                .map(|p| Some(p.as_str()))
                .collect()
        };

        let payment_method = format!("{{\"id\":{}}}", params.payment_method_id);
        let detail_url = self.url("/3/details");
        let book_url = self.url("/3/book");

        for preference in preferences {
            let Some(selected) = select_slot(slots, requested_local, preference, tz) else {
                continue;
            };

            let detail_body = serde_json::json!({
                "commit": "1",
                "config_id": selected.token,
                "day": day,
                "party_size": params.party_size.to_string(),
            });
            let response = self
                .send_with_retry(jar, Step::Detail, |jar| {
                    Self::with_session(
                        self.http
                            .post(&detail_url)
                            .header(AUTHORIZATION, self.auth_header())
                            .json(&detail_body),
                        jar,
                    )
                })
                .await?;
            let status = response.status();
            let body = response
                .bytes()
                .await
                .map_err(|e| UpstreamError::network(Step::Detail, 0, e.to_string()))?;
            if !status.is_success() {
                return Err(UpstreamError::network(
                    Step::Detail,
                    status.as_u16(),
                    truncate_for_log(&body, LOG_BODY_LIMIT),
                ));
            }
            let detail: DetailResponse = serde_json::from_slice(&body)
                .map_err(|e| UpstreamError::invalid_response(Step::Detail, e.to_string()))?;
            let Some(book_token) = detail.book_token.and_then(|t| t.value) else {
                // The slot evaporated between FIND and DETAIL.
                continue;
            };

            let book_form = [
                ("book_token", book_token.as_str()),
                ("struct_payment_method", payment_method.as_str()),
                ("source_id", BOOK_SOURCE_ID),
            ];
            let response = self
                .send_with_retry(jar, Step::Book, |jar| {
                    Self::with_session(
                        self.http
                            .post(&book_url)
                            .header(AUTHORIZATION, self.auth_header())
                            .header("X-Resy-Auth-Token", &params.auth_token)
                            .header("X-Resy-Universal-Auth", &params.auth_token)
                            .header(REFERER, "https://resy.com/")
                            .form(&book_form),
                        jar,
                    )
                })
                .await?;
            let status = response.status();
            let body = response
                .bytes()
                .await
                .map_err(|e| UpstreamError::network(Step::Book, 0, e.to_string()))?;
            if !status.is_success() {
                tracing::debug!(
                    status = status.as_u16(),
                    "book rejected, trying next candidate"
                );
                continue;
            }
            let Ok(book) = serde_json::from_slice::<crate::types::BookResponse>(&body) else {
                continue;
            };
            if book.reservation_id.is_some() {
                return Ok(ReserveOutcome {
                    reservation_time: selected.local_time.with_timezone(&Utc),
                });
            }
        }

        Err(UpstreamError::NoTable)
    }

    fn pick_venue(venues: &[FindVenue], venue_id: i64) -> &FindVenue {
        match venues.iter().find(|v| v.resy_id() == Some(venue_id)) {
            Some(venue) => venue,
            None => {
                // Preserved upstream quirk: a multi-venue response without
                // the requested id falls back to the first venue.
                tracing::warn!(
                    venue_id,
                    "requested venue not in FIND response; falling back to the first venue"
                );
                &venues[0]
            }
        }
    }
}

#[derive(Debug, Clone)]
struct SelectedSlot {
    token: String,
    local_time: DateTime<Tz>,
}

/// Picks the candidate slot for one (preference, time) pair: exact
/// (hour, minute) match wins immediately, otherwise the slot closest to the
/// requested time within ±30 minutes.
fn select_slot(
    slots: &[Slot],
    requested_local: DateTime<Tz>,
    preference: Option<&str>,
    tz: Tz,
) -> Option<SelectedSlot> {
    let window = chrono::Duration::minutes(SLOT_MATCH_WINDOW_MINUTES);
    let mut best: Option<(SelectedSlot, chrono::Duration)> = None;

    for slot in slots {
        let Some(start) = slot.date.as_ref().and_then(|d| d.start.as_deref()) else {
            continue;
        };
        let Some(slot_local) = parse_slot_start(start, tz) else {
            continue;
        };
        if slot_local.date_naive() != requested_local.date_naive() {
            continue;
        }

        let Some(config) = slot.config.as_ref() else {
            continue;
        };
        if let Some(preference) = preference {
            let Some(kind) = config.kind.as_deref() else {
                continue;
            };
            if !kind.to_lowercase().contains(preference) {
                continue;
            }
        }
        let Some(token) = config.token.as_deref() else {
            continue;
        };

        if slot_local.hour() == requested_local.hour()
            && slot_local.minute() == requested_local.minute()
        {
            return Some(SelectedSlot {
                token: token.to_string(),
                local_time: slot_local,
            });
        }

        let diff = (slot_local - requested_local).abs();
        if diff <= window && best.as_ref().is_none_or(|(_, d)| diff < *d) {
            best = Some((
                SelectedSlot {
                    token: token.to_string(),
                    local_time: slot_local,
                },
                diff,
            ));
        }
    }

    best.map(|(slot, _)| slot)
}

/// Parses a slot's `YYYY-MM-DD HH:MM:SS` start as venue-local time with
/// seconds zeroed.
fn parse_slot_start(raw: &str, tz: Tz) -> Option<DateTime<Tz>> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok()?;
    let naive = naive.with_second(0)?;
    tz.from_local_datetime(&naive).earliest()
}

/// Pulls a `message` field out of an error body, else truncates the body.
fn extract_message(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
            return message.to_string();
        }
    }
    truncate_for_log(body, LOG_BODY_LIMIT)
}

fn truncate_for_log(body: &[u8], max: usize) -> String {
    let text = String::from_utf8_lossy(body);
    if text.chars().count() <= max {
        return text.into_owned();
    }
    let mut truncated: String = text.chars().take(max).collect();
    truncated.push_str("...");
    truncated
}
