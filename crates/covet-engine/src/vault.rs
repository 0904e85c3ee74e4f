//! Sealed per-user upstream credentials.
//!
//! Values at rest carry the `v1:` seal tag. A read observing an unsealed
//! value is a legitimate legacy row: the read completes with the plaintext,
//! then the row is rewritten sealed. The rewrite is allowed to fail (logged,
//! read still succeeds), so migration is at-least-once and never blocks the
//! caller.

use std::sync::Arc;

use covet_core::kvs::Kvs;
use covet_core::{crypto, Error, Result};
use serde::Serialize;

/// Key prefix for per-owner credential rows.
pub const CREDENTIALS_KEY_PREFIX: &str = "user_credentials:";

/// A user's linked upstream credentials, in the clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCredentials {
    /// Opaque external user id.
    pub owner_id: String,
    /// Upstream auth token.
    pub auth_token: String,
    /// Upstream payment method id.
    pub payment_method_id: i64,
}

#[derive(Serialize)]
struct CredentialsRecord<'a> {
    owner_id: &'a str,
    auth_token: &'a str,
    payment_method_id: &'a str,
}

/// The sealed credential store.
#[derive(Clone)]
pub struct CredentialVault {
    kvs: Arc<dyn Kvs>,
    key: Option<[u8; 32]>,
}

impl CredentialVault {
    /// Creates a vault. A missing key turns every operation into a
    /// configuration error at call time.
    #[must_use]
    pub fn new(kvs: Arc<dyn Kvs>, key: Option<[u8; 32]>) -> Self {
        Self { kvs, key }
    }

    fn key(&self) -> Result<&[u8; 32]> {
        self.key
            .as_ref()
            .ok_or_else(|| Error::configuration("credential vault key is not configured"))
    }

    fn record_key(owner_id: &str) -> String {
        format!("{CREDENTIALS_KEY_PREFIX}{owner_id}")
    }

    /// Stores credentials for an owner, sealed.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no key is configured, and crypto,
    /// serialization, or storage errors otherwise.
    pub async fn link(&self, credentials: &UserCredentials) -> Result<()> {
        let key = self.key()?;
        let sealed_token = crypto::seal(&credentials.auth_token, key)?;
        let sealed_payment = crypto::seal(&credentials.payment_method_id.to_string(), key)?;

        let record = CredentialsRecord {
            owner_id: &credentials.owner_id,
            auth_token: &sealed_token,
            payment_method_id: &sealed_payment,
        };
        let payload = serde_json::to_string(&record)
            .map_err(|e| Error::serialization(format!("failed to encode credentials: {e}")))?;
        self.kvs
            .set(&Self::record_key(&credentials.owner_id), &payload)
            .await
    }

    /// Fetches credentials for an owner, repairing unsealed legacy rows in
    /// passing.
    ///
    /// # Errors
    ///
    /// Returns not-found when the owner has no row, a configuration error
    /// when a sealed value is read without a configured key, and a crypto
    /// error when a sealed value fails to open. Unsealed legacy values are
    /// readable even without a key; only their repair rewrite (logged,
    /// swallowed) needs one.
    pub async fn get(&self, owner_id: &str) -> Result<UserCredentials> {
        let payload = self
            .kvs
            .get(&Self::record_key(owner_id))
            .await?
            .ok_or_else(|| Error::resource_not_found("credentials", owner_id))?;

        let raw: serde_json::Value = serde_json::from_str(&payload)
            .map_err(|e| Error::serialization(format!("failed to decode credentials: {e}")))?;

        let token_raw = raw
            .get("auth_token")
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::serialization("credentials row is missing auth_token"))?;
        let payment_raw = coerce_payment_method(raw.get("payment_method_id"))?;

        let mut needs_reseal = false;

        let auth_token = if crypto::is_sealed(token_raw) {
            crypto::open(token_raw, self.key()?)?
        } else {
            needs_reseal = true;
            token_raw.to_string()
        };

        let payment_plain = if crypto::is_sealed(&payment_raw) {
            crypto::open(&payment_raw, self.key()?)?
        } else {
            needs_reseal = true;
            payment_raw
        };
        let payment_method_id = payment_plain.parse().map_err(|_| {
            Error::serialization(format!("invalid payment_method_id '{payment_plain}'"))
        })?;

        let owner_id = raw
            .get("owner_id")
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .unwrap_or(owner_id)
            .to_string();

        let credentials = UserCredentials {
            owner_id,
            auth_token,
            payment_method_id,
        };

        if needs_reseal {
            if let Err(e) = self.link(&credentials).await {
                tracing::warn!(
                    owner_id = %credentials.owner_id,
                    "failed to reseal legacy credentials: {e}"
                );
            }
        }

        Ok(credentials)
    }

    /// Removes an owner's credentials. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the underlying store.
    pub async fn unlink(&self, owner_id: &str) -> Result<()> {
        self.kvs.delete(&Self::record_key(owner_id)).await
    }

    /// Returns true when the owner has linked credentials.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the underlying store.
    pub async fn is_linked(&self, owner_id: &str) -> Result<bool> {
        self.kvs.exists(&Self::record_key(owner_id)).await
    }
}

/// Legacy rows stored the payment method id as a bare number; current rows
/// store a (sealed) string.
fn coerce_payment_method(value: Option<&serde_json::Value>) -> Result<String> {
    match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .map(|v| v.to_string())
            .ok_or_else(|| Error::serialization("payment_method_id is not an integer")),
        _ => Err(Error::serialization(
            "credentials row is missing payment_method_id",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covet_core::kvs::MemoryKvs;

    const KEY: [u8; 32] = [3u8; 32];

    fn vault(kvs: Arc<MemoryKvs>) -> CredentialVault {
        CredentialVault::new(kvs, Some(KEY))
    }

    fn creds() -> UserCredentials {
        UserCredentials {
            owner_id: "user-1".to_string(),
            auth_token: "tok-secret".to_string(),
            payment_method_id: 42,
        }
    }

    #[tokio::test]
    async fn link_get_roundtrips() {
        let kvs = Arc::new(MemoryKvs::new());
        let vault = vault(Arc::clone(&kvs));

        vault.link(&creds()).await.unwrap();
        let fetched = vault.get("user-1").await.unwrap();
        assert_eq!(fetched, creds());
        assert!(vault.is_linked("user-1").await.unwrap());
    }

    #[tokio::test]
    async fn values_at_rest_are_sealed() {
        let kvs = Arc::new(MemoryKvs::new());
        let vault = vault(Arc::clone(&kvs));

        vault.link(&creds()).await.unwrap();
        let payload = kvs.get("user_credentials:user-1").await.unwrap().unwrap();
        let raw: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert!(raw["auth_token"].as_str().unwrap().starts_with("v1:"));
        assert!(raw["payment_method_id"].as_str().unwrap().starts_with("v1:"));
        assert!(!payload.contains("tok-secret"));
    }

    #[tokio::test]
    async fn legacy_plaintext_row_is_read_and_resealed() {
        let kvs = Arc::new(MemoryKvs::new());
        let vault = vault(Arc::clone(&kvs));

        kvs.set(
            "user_credentials:user-1",
            r#"{"owner_id":"user-1","auth_token":"plaintext","payment_method_id":"42"}"#,
        )
        .await
        .unwrap();

        let fetched = vault.get("user-1").await.unwrap();
        assert_eq!(fetched.auth_token, "plaintext");
        assert_eq!(fetched.payment_method_id, 42);

        // The row observed on the next fetch is sealed.
        let payload = kvs.get("user_credentials:user-1").await.unwrap().unwrap();
        let raw: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert!(raw["auth_token"].as_str().unwrap().starts_with("v1:"));
        assert_eq!(vault.get("user-1").await.unwrap().auth_token, "plaintext");
    }

    #[tokio::test]
    async fn legacy_numeric_payment_id_is_tolerated() {
        let kvs = Arc::new(MemoryKvs::new());
        let vault = vault(Arc::clone(&kvs));

        kvs.set(
            "user_credentials:user-1",
            r#"{"owner_id":"user-1","auth_token":"plain","payment_method_id":42}"#,
        )
        .await
        .unwrap();

        let fetched = vault.get("user-1").await.unwrap();
        assert_eq!(fetched.payment_method_id, 42);
    }

    #[tokio::test]
    async fn missing_owner_is_not_found() {
        let kvs = Arc::new(MemoryKvs::new());
        let vault = vault(kvs);
        let err = vault.get("nobody").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn corrupt_sealed_value_surfaces_a_crypto_error() {
        let kvs = Arc::new(MemoryKvs::new());
        let vault = vault(Arc::clone(&kvs));

        kvs.set(
            "user_credentials:user-1",
            r#"{"owner_id":"user-1","auth_token":"v1:%%%%","payment_method_id":"42"}"#,
        )
        .await
        .unwrap();

        let err = vault.get("user-1").await.unwrap_err();
        assert!(matches!(err, Error::Crypto { .. }));
    }

    #[tokio::test]
    async fn missing_key_hard_fails_writes_and_sealed_reads() {
        let kvs = Arc::new(MemoryKvs::new());
        let keyed = vault(Arc::clone(&kvs));
        keyed.link(&creds()).await.unwrap();

        let keyless = CredentialVault::new(Arc::clone(&kvs) as Arc<dyn Kvs>, None);
        let err = keyless.link(&creds()).await.unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        let err = keyless.get("user-1").await.unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[tokio::test]
    async fn missing_key_still_reads_legacy_plaintext() {
        let kvs = Arc::new(MemoryKvs::new());
        let keyless = CredentialVault::new(Arc::clone(&kvs) as Arc<dyn Kvs>, None);

        kvs.set(
            "user_credentials:user-1",
            r#"{"owner_id":"user-1","auth_token":"plain","payment_method_id":"42"}"#,
        )
        .await
        .unwrap();

        // The read succeeds; only the repair rewrite is skipped.
        let fetched = keyless.get("user-1").await.unwrap();
        assert_eq!(fetched.auth_token, "plain");

        let payload = kvs.get("user_credentials:user-1").await.unwrap().unwrap();
        assert!(payload.contains("plain"), "row stays unsealed without a key");
    }

    #[tokio::test]
    async fn unlink_is_idempotent() {
        let kvs = Arc::new(MemoryKvs::new());
        let vault = vault(Arc::clone(&kvs));

        vault.link(&creds()).await.unwrap();
        vault.unlink("user-1").await.unwrap();
        vault.unlink("user-1").await.unwrap();
        assert!(!vault.is_linked("user-1").await.unwrap());
    }
}
