//! Per-venue WAF session artifacts.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use covet_core::kvs::Kvs;
use covet_core::{Error, Result};
use covet_resy::WafCookie;
use serde::{Deserialize, Serialize};

/// Key prefix for per-venue session rows.
pub const COOKIE_KEY_PREFIX: &str = "cookies:";

/// Default session lifetime.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A venue's stored WAF session: the cookies a booking attempt presents and
/// the user agent they were harvested under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WafSession {
    /// The session cookies.
    pub cookies: Vec<WafCookie>,
    /// User agent matching the cookies.
    pub user_agent: String,
    /// When the row's TTL elapses.
    pub expires_at: DateTime<Utc>,
}

/// The per-venue session store.
#[derive(Clone)]
pub struct WafSessionStore {
    kvs: Arc<dyn Kvs>,
}

impl WafSessionStore {
    /// Creates a store over the given KVS.
    #[must_use]
    pub fn new(kvs: Arc<dyn Kvs>) -> Self {
        Self { kvs }
    }

    fn session_key(venue_id: i64) -> String {
        format!("{COOKIE_KEY_PREFIX}{venue_id}")
    }

    /// Stores a session with the given TTL.
    ///
    /// # Errors
    ///
    /// Returns serialization and storage errors.
    pub async fn save(
        &self,
        venue_id: i64,
        cookies: Vec<WafCookie>,
        user_agent: impl Into<String>,
        ttl: Duration,
    ) -> Result<()> {
        let session = WafSession {
            cookies,
            user_agent: user_agent.into(),
            expires_at: Utc::now()
                + chrono::Duration::from_std(ttl)
                    .map_err(|e| Error::InvalidInput(format!("unrepresentable TTL: {e}")))?,
        };
        let payload = serde_json::to_string(&session)
            .map_err(|e| Error::serialization(format!("failed to encode WAF session: {e}")))?;
        self.kvs
            .set_with_ttl(&Self::session_key(venue_id), &payload, ttl)
            .await
    }

    /// Loads a venue's session, `None` when absent or expired.
    ///
    /// # Errors
    ///
    /// Returns storage errors and a serialization error for an undecodable
    /// row.
    pub async fn load(&self, venue_id: i64) -> Result<Option<WafSession>> {
        let Some(payload) = self.kvs.get(&Self::session_key(venue_id)).await? else {
            return Ok(None);
        };
        let session = serde_json::from_str(&payload).map_err(|e| {
            Error::serialization(format!("failed to decode WAF session for {venue_id}: {e}"))
        })?;
        Ok(Some(session))
    }

    /// Returns true when a session exists for the venue.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the underlying store.
    pub async fn exists(&self, venue_id: i64) -> Result<bool> {
        self.kvs.exists(&Self::session_key(venue_id)).await
    }

    /// Returns the remaining TTL of a venue's session.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the underlying store.
    pub async fn ttl(&self, venue_id: i64) -> Result<Option<Duration>> {
        self.kvs.ttl(&Self::session_key(venue_id)).await
    }

    /// Removes a venue's session. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the underlying store.
    pub async fn delete(&self, venue_id: i64) -> Result<()> {
        self.kvs.delete(&Self::session_key(venue_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covet_core::kvs::MemoryKvs;

    fn store() -> WafSessionStore {
        WafSessionStore::new(Arc::new(MemoryKvs::new()))
    }

    #[tokio::test]
    async fn save_load_roundtrips() {
        let store = store();
        store
            .save(
                89607,
                vec![WafCookie::new("incap_ses_1", "abc")],
                "Agent/1.0",
                DEFAULT_SESSION_TTL,
            )
            .await
            .unwrap();

        let session = store.load(89607).await.unwrap().expect("present");
        assert_eq!(session.cookies.len(), 1);
        assert_eq!(session.user_agent, "Agent/1.0");
        assert!(session.expires_at > Utc::now());
        assert!(store.exists(89607).await.unwrap());
        assert!(store.ttl(89607).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_venue_loads_none() {
        let store = store();
        assert!(store.load(1).await.unwrap().is_none());
        assert!(!store.exists(1).await.unwrap());
        assert!(store.ttl(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = store();
        store
            .save(7, vec![], "ua", DEFAULT_SESSION_TTL)
            .await
            .unwrap();
        store.delete(7).await.unwrap();
        store.delete(7).await.unwrap();
        assert!(!store.exists(7).await.unwrap());
    }

    #[tokio::test]
    async fn short_ttl_expires_the_session() {
        let store = store();
        store
            .save(9, vec![], "ua", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(store.load(9).await.unwrap().is_none());
    }
}
