//! Server configuration.
//!
//! Loaded entirely from environment variables; every parse failure is a
//! startup error rather than a silent default.

use std::time::Duration;

use chrono_tz::Tz;
use covet_core::{Error, Result};

const DEFAULT_HTTP_PORT: u16 = 8090;
const DEFAULT_COOKIE_REFRESH_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);
const DEFAULT_VENUES_FILE: &str = "venues.json";
const DEFAULT_TIMEZONE: &str = "America/New_York";

/// Configuration for the Covet API server.
#[derive(Clone)]
pub struct Config {
    /// HTTP server port.
    pub http_port: u16,

    /// Redis URL (`host:port` or a full `redis://` URL). Unset falls back
    /// to the in-memory store, which is debug-only.
    pub redis_url: Option<String>,

    /// Redis password, applied on top of the URL.
    pub redis_password: Option<String>,

    /// Upstream API key.
    pub resy_api_key: String,

    /// Upstream base URL override (tests, staging).
    pub resy_base_url: String,

    /// 32-byte AEAD key for the credential vault, hex-encoded in the
    /// environment. Unset disables the vault surface.
    pub vault_key: Option<[u8; 32]>,

    /// Bearer token protecting `/admin/*`.
    pub admin_token: Option<String>,

    /// Shared secret required on every non-public endpoint.
    pub internal_token: Option<String>,

    /// Whether the cookie-refresh loop runs.
    pub cookie_refresh_enabled: bool,

    /// Interval between refresh passes.
    pub cookie_refresh_interval: Duration,

    /// Path of the venues file.
    pub venues_file: String,

    /// Browser-driver base URL for scraping and cookie harvesting.
    pub browser_driver_url: Option<String>,

    /// Accounting callback base URL.
    pub usage_url: Option<String>,

    /// Timezone request bodies are parsed in and the default venue zone.
    pub timezone: Tz,

    /// Debug mode: pretty logs, in-memory store allowed.
    pub debug: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("http_port", &self.http_port)
            .field("redis_url", &self.redis_url)
            .field("redis_password", &self.redis_password.as_ref().map(|_| "[REDACTED]"))
            .field("resy_api_key", &"[REDACTED]")
            .field("resy_base_url", &self.resy_base_url)
            .field("vault_key", &self.vault_key.map(|_| "[REDACTED]"))
            .field("admin_token", &self.admin_token.as_ref().map(|_| "[REDACTED]"))
            .field("internal_token", &self.internal_token.as_ref().map(|_| "[REDACTED]"))
            .field("cookie_refresh_enabled", &self.cookie_refresh_enabled)
            .field("cookie_refresh_interval", &self.cookie_refresh_interval)
            .field("venues_file", &self.venues_file)
            .field("browser_driver_url", &self.browser_driver_url)
            .field("usage_url", &self.usage_url)
            .field("timezone", &self.timezone)
            .field("debug", &self.debug)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            redis_url: None,
            redis_password: None,
            resy_api_key: covet_resy::client::DEFAULT_API_KEY.to_string(),
            resy_base_url: covet_resy::client::DEFAULT_BASE_URL.to_string(),
            vault_key: None,
            admin_token: None,
            internal_token: None,
            cookie_refresh_enabled: true,
            cookie_refresh_interval: DEFAULT_COOKIE_REFRESH_INTERVAL,
            venues_file: DEFAULT_VENUES_FILE.to_string(),
            browser_driver_url: None,
            usage_url: None,
            timezone: default_timezone(),
            debug: false,
        }
    }
}

fn default_timezone() -> Tz {
    DEFAULT_TIMEZONE.parse().expect("default timezone is valid")
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Supported env vars:
    /// - `COVET_HTTP_PORT`
    /// - `COVET_REDIS_URL`, `COVET_REDIS_PASSWORD`
    /// - `COVET_RESY_API_KEY`, `COVET_RESY_BASE_URL`
    /// - `COVET_VAULT_KEY` (32-byte hex)
    /// - `COVET_ADMIN_TOKEN`, `COVET_INTERNAL_TOKEN`
    /// - `COVET_COOKIE_REFRESH_ENABLED`
    /// - `COVET_COOKIE_REFRESH_INTERVAL` ("6h", "30m", or bare hours)
    /// - `COVET_VENUES_FILE`
    /// - `COVET_BROWSER_DRIVER_URL`
    /// - `COVET_USAGE_URL`
    /// - `COVET_TIMEZONE` (IANA zone name)
    /// - `COVET_DEBUG`
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(port) = env_u16("COVET_HTTP_PORT")? {
            config.http_port = port;
        }
        config.redis_url = env_string("COVET_REDIS_URL");
        config.redis_password = env_string("COVET_REDIS_PASSWORD");
        if let Some(key) = env_string("COVET_RESY_API_KEY") {
            config.resy_api_key = key;
        }
        if let Some(url) = env_string("COVET_RESY_BASE_URL") {
            config.resy_base_url = url;
        }
        config.vault_key = env_hex_key("COVET_VAULT_KEY")?;
        config.admin_token = env_string("COVET_ADMIN_TOKEN");
        config.internal_token = env_string("COVET_INTERNAL_TOKEN");
        if let Some(enabled) = env_bool("COVET_COOKIE_REFRESH_ENABLED")? {
            config.cookie_refresh_enabled = enabled;
        }
        if let Some(interval) = env_duration("COVET_COOKIE_REFRESH_INTERVAL")? {
            config.cookie_refresh_interval = interval;
        }
        if let Some(path) = env_string("COVET_VENUES_FILE") {
            config.venues_file = path;
        }
        config.browser_driver_url = env_string("COVET_BROWSER_DRIVER_URL");
        config.usage_url = env_string("COVET_USAGE_URL");
        if let Some(zone) = env_string("COVET_TIMEZONE") {
            config.timezone = zone.parse().map_err(|_| {
                Error::InvalidInput(format!("COVET_TIMEZONE is not a known zone: {zone}"))
            })?;
        }
        if let Some(debug) = env_bool("COVET_DEBUG")? {
            config.debug = debug;
        }

        Ok(config)
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_u16(name: &str) -> Result<Option<u16>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<u16>()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{name} must be a u16: {e}")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => Err(Error::InvalidInput(format!(
            "{name} must be a boolean (true/false/1/0)"
        ))),
    }
}

fn env_bool(name: &str) -> Result<Option<bool>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    parse_bool(name, &v).map(Some)
}

/// Durations accept `6h`/`30m`/`90s` forms or a bare hour count.
fn parse_duration(name: &str, value: &str) -> Result<Duration> {
    let value = value.trim();
    if let Ok(hours) = value.parse::<u64>() {
        return Ok(Duration::from_secs(hours * 3600));
    }

    let (digits, unit) = value.split_at(value.len().saturating_sub(1));
    let amount: u64 = digits.parse().map_err(|_| {
        Error::InvalidInput(format!(
            "{name} must be a duration like '6h', '30m', '90s', or bare hours"
        ))
    })?;
    let seconds = match unit {
        "h" => amount * 3600,
        "m" => amount * 60,
        "s" => amount,
        _ => {
            return Err(Error::InvalidInput(format!(
                "{name} has an unknown duration unit '{unit}'"
            )));
        }
    };
    Ok(Duration::from_secs(seconds))
}

fn env_duration(name: &str) -> Result<Option<Duration>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    parse_duration(name, &v).map(Some)
}

fn parse_hex_key(name: &str, value: &str) -> Result<[u8; 32]> {
    let raw = hex::decode(value.trim())
        .map_err(|e| Error::InvalidInput(format!("{name} must be hex: {e}")))?;
    raw.try_into()
        .map_err(|_| Error::InvalidInput(format!("{name} must decode to exactly 32 bytes")))
}

fn env_hex_key(name: &str) -> Result<Option<[u8; 32]>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    parse_hex_key(name, &v).map(Some)
}
