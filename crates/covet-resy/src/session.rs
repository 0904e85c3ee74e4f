//! WAF session artifacts: cookie jar, challenge detection, cookie parsing.
//!
//! Imperva identifies clients by a small family of cookies. A challenged
//! response sets fresh ones; absorbing them into the jar and replaying the
//! request is what resolves the interstitial.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, SET_COOKIE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Cookie name prefixes recognized as WAF session cookies. Exhaustive.
pub const WAF_COOKIE_PREFIXES: [&str; 5] =
    ["_incap_", "incap_ses_", "_visid_", "visid_incap_", "nlbi_"];

/// User agent presented when the session carries none of its own.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const DEFAULT_COOKIE_DOMAIN: &str = ".resy.com";

/// Returns true when the cookie name matches the recognized WAF prefix set.
#[must_use]
pub fn is_waf_cookie_name(name: &str) -> bool {
    WAF_COOKIE_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Returns true when the response is a WAF challenge interstitial.
///
/// Imperva answers with 403, 500, or 503 and identifies itself via the
/// `X-Cdn` header; a fronting nginx sometimes masks it as a bare 500.
#[must_use]
pub fn is_waf_challenge(status: StatusCode, headers: &HeaderMap) -> bool {
    let code = status.as_u16();
    if code != 403 && code != 500 && code != 503 {
        return false;
    }
    if headers
        .get("x-cdn")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Imperva")
    {
        return true;
    }
    code == 500
        && headers
            .get("server")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "nginx")
}

/// A single WAF session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WafCookie {
    /// Cookie name; always matches the recognized prefix set.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Cookie domain.
    pub domain: String,
    /// Cookie path.
    pub path: String,
    /// Whether the cookie was marked Secure.
    #[serde(default)]
    pub secure: bool,
    /// Whether the cookie was marked HttpOnly.
    #[serde(default)]
    pub http_only: bool,
    /// Expiry, when the server sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
}

impl WafCookie {
    /// Creates a cookie with the default domain and path.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: DEFAULT_COOKIE_DOMAIN.to_string(),
            path: "/".to_string(),
            secure: false,
            http_only: false,
            expires: None,
        }
    }
}

/// Parses a `Set-Cookie` header value into a WAF cookie.
///
/// Returns `None` for malformed values and for cookies whose names fall
/// outside the recognized prefix set.
#[must_use]
pub fn parse_set_cookie(raw: &str) -> Option<WafCookie> {
    let mut parts = raw.split(';');
    let name_value = parts.next()?;
    let (name, value) = name_value.split_once('=')?;
    let name = name.trim();
    if !is_waf_cookie_name(name) {
        return None;
    }

    let mut cookie = WafCookie::new(name, value);
    for part in parts {
        let part = part.trim();
        let lower = part.to_ascii_lowercase();
        if lower.starts_with("domain=") {
            cookie.domain = part[7..].to_string();
        } else if lower.starts_with("path=") {
            cookie.path = part[5..].to_string();
        } else if lower == "secure" {
            cookie.secure = true;
        } else if lower == "httponly" {
            cookie.http_only = true;
        } else if lower.starts_with("expires=") {
            if let Ok(parsed) = DateTime::parse_from_rfc2822(&part[8..]) {
                cookie.expires = Some(parsed.with_timezone(&Utc));
            }
        }
    }
    Some(cookie)
}

/// The cookie jar a single booking attempt carries through its calls.
///
/// No cross-attempt sharing: callers load persisted session artifacts into a
/// fresh jar at the start of each attempt.
#[derive(Debug, Clone, Default)]
pub struct WafJar {
    cookies: Vec<WafCookie>,
    user_agent: Option<String>,
}

impl WafJar {
    /// Creates an empty jar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a jar pre-loaded with persisted session artifacts.
    #[must_use]
    pub fn from_session(cookies: Vec<WafCookie>, user_agent: impl Into<String>) -> Self {
        let user_agent = user_agent.into();
        Self {
            cookies,
            user_agent: (!user_agent.is_empty()).then_some(user_agent),
        }
    }

    /// Returns the cookies currently held.
    #[must_use]
    pub fn cookies(&self) -> &[WafCookie] {
        &self.cookies
    }

    /// Returns true when the jar holds no cookies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Returns the user agent the attempt should present.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }

    /// Renders the jar as a `Cookie` header value, or `None` when empty.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Inserts a cookie, replacing any existing cookie of the same name.
    pub fn merge(&mut self, cookie: WafCookie) {
        if let Some(existing) = self.cookies.iter_mut().find(|c| c.name == cookie.name) {
            *existing = cookie;
        } else {
            self.cookies.push(cookie);
        }
    }

    /// Absorbs the WAF cookies a challenged response set, returning how
    /// many were merged.
    pub fn absorb_challenge(&mut self, headers: &HeaderMap) -> usize {
        let mut merged = 0;
        for value in headers.get_all(SET_COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            if let Some(cookie) = parse_set_cookie(raw) {
                self.merge(cookie);
                merged += 1;
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn prefix_set_is_recognized() {
        assert!(is_waf_cookie_name("_incap_ses_abc"));
        assert!(is_waf_cookie_name("incap_ses_123"));
        assert!(is_waf_cookie_name("_visid_xyz"));
        assert!(is_waf_cookie_name("visid_incap_42"));
        assert!(is_waf_cookie_name("nlbi_999"));
        assert!(!is_waf_cookie_name("session"));
        assert!(!is_waf_cookie_name("csrftoken"));
    }

    #[test]
    fn challenge_requires_status_and_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-cdn", HeaderValue::from_static("Imperva"));

        assert!(is_waf_challenge(StatusCode::FORBIDDEN, &headers));
        assert!(is_waf_challenge(StatusCode::INTERNAL_SERVER_ERROR, &headers));
        assert!(is_waf_challenge(StatusCode::SERVICE_UNAVAILABLE, &headers));
        assert!(!is_waf_challenge(StatusCode::OK, &headers));
        assert!(!is_waf_challenge(StatusCode::BAD_GATEWAY, &headers));

        let plain = HeaderMap::new();
        assert!(!is_waf_challenge(StatusCode::SERVICE_UNAVAILABLE, &plain));
    }

    #[test]
    fn nginx_masked_challenge_is_only_a_500() {
        let mut headers = HeaderMap::new();
        headers.insert("server", HeaderValue::from_static("nginx"));

        assert!(is_waf_challenge(StatusCode::INTERNAL_SERVER_ERROR, &headers));
        assert!(!is_waf_challenge(StatusCode::SERVICE_UNAVAILABLE, &headers));
        assert!(!is_waf_challenge(StatusCode::FORBIDDEN, &headers));
    }

    #[test]
    fn parse_set_cookie_extracts_attributes() {
        let cookie = parse_set_cookie(
            "incap_ses_123=abc; Domain=.resy.com; Path=/; Secure; HttpOnly",
        )
        .expect("recognized cookie");
        assert_eq!(cookie.name, "incap_ses_123");
        assert_eq!(cookie.value, "abc");
        assert_eq!(cookie.domain, ".resy.com");
        assert_eq!(cookie.path, "/");
        assert!(cookie.secure);
        assert!(cookie.http_only);
    }

    #[test]
    fn parse_set_cookie_defaults_domain_and_path() {
        let cookie = parse_set_cookie("nlbi_42=v").expect("recognized cookie");
        assert_eq!(cookie.domain, ".resy.com");
        assert_eq!(cookie.path, "/");
    }

    #[test]
    fn parse_set_cookie_ignores_foreign_cookies() {
        assert!(parse_set_cookie("sessionid=deadbeef; Path=/").is_none());
        assert!(parse_set_cookie("malformed").is_none());
    }

    #[test]
    fn parse_set_cookie_reads_expires() {
        let cookie = parse_set_cookie(
            "_visid_1=v; Expires=Wed, 21 Oct 2026 07:28:00 GMT",
        )
        .expect("recognized cookie");
        let expires = cookie.expires.expect("expiry parsed");
        assert_eq!(expires.to_rfc3339(), "2026-10-21T07:28:00+00:00");
    }

    #[test]
    fn merge_replaces_same_name() {
        let mut jar = WafJar::new();
        jar.merge(WafCookie::new("nlbi_1", "old"));
        jar.merge(WafCookie::new("nlbi_1", "new"));
        jar.merge(WafCookie::new("_incap_a", "x"));

        assert_eq!(jar.cookies().len(), 2);
        assert_eq!(jar.cookies()[0].value, "new");
        assert_eq!(jar.cookie_header().unwrap(), "nlbi_1=new; _incap_a=x");
    }

    #[test]
    fn absorb_challenge_merges_only_waf_cookies() {
        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("_incap_ses_123=abc; Path=/"),
        );
        headers.append(SET_COOKIE, HeaderValue::from_static("tracking=no; Path=/"));

        let mut jar = WafJar::new();
        assert_eq!(jar.absorb_challenge(&headers), 1);
        assert_eq!(jar.cookies().len(), 1);
        assert_eq!(jar.cookies()[0].name, "_incap_ses_123");
    }

    #[test]
    fn empty_jar_presents_default_user_agent() {
        let jar = WafJar::new();
        assert_eq!(jar.user_agent(), DEFAULT_USER_AGENT);
        assert!(jar.cookie_header().is_none());
    }

    #[test]
    fn loaded_jar_keeps_its_user_agent() {
        let jar = WafJar::from_session(vec![WafCookie::new("nlbi_1", "v")], "AgentSmith/1.0");
        assert_eq!(jar.user_agent(), "AgentSmith/1.0");
        assert_eq!(jar.cookie_header().unwrap(), "nlbi_1=v");
    }
}
