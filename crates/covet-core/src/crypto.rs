//! Versioned AEAD sealing for credentials at rest.
//!
//! Sealed values are `v1:` + base64(nonce || ciphertext), AES-256-GCM with a
//! random 96-bit nonce. The version tag is what lets readers distinguish
//! sealed values from legacy plaintext and drive the read-repair migration.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;

use crate::error::{Error, Result};

/// Version tag prepended to every sealed value.
pub const SEAL_PREFIX: &str = "v1:";

const NONCE_LEN: usize = 12;

/// Returns true when the value carries the seal version tag.
#[must_use]
pub fn is_sealed(value: &str) -> bool {
    value.starts_with(SEAL_PREFIX)
}

/// Seals a plaintext under the given 256-bit key.
///
/// # Errors
///
/// Returns [`Error::Crypto`] when encryption fails.
pub fn seal(plaintext: &str, key: &[u8; 32]) -> Result<String> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::crypto(format!("invalid sealing key: {e}")))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| Error::crypto(format!("encryption failed: {e}")))?;

    let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    payload.extend_from_slice(&nonce_bytes);
    payload.extend_from_slice(&ciphertext);
    Ok(format!("{SEAL_PREFIX}{}", BASE64.encode(payload)))
}

/// Opens a sealed value under the given key.
///
/// # Errors
///
/// Returns [`Error::Crypto`] when the version tag is missing, the payload is
/// malformed, or authentication fails.
pub fn open(value: &str, key: &[u8; 32]) -> Result<String> {
    let encoded = value
        .strip_prefix(SEAL_PREFIX)
        .ok_or_else(|| Error::crypto("sealed value is missing the version tag"))?;

    let raw = BASE64
        .decode(encoded)
        .map_err(|e| Error::crypto(format!("sealed value is not valid base64: {e}")))?;
    if raw.len() < NONCE_LEN {
        return Err(Error::crypto("sealed value is too short"));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::crypto(format!("invalid sealing key: {e}")))?;
    let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| Error::crypto("decryption failed"))?;
    String::from_utf8(plaintext).map_err(|e| Error::crypto(format!("plaintext is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [7u8; 32];

    #[test]
    fn seal_open_roundtrip() {
        let sealed = seal("tok_abcdef", &KEY).unwrap();
        assert!(is_sealed(&sealed));
        assert_eq!(open(&sealed, &KEY).unwrap(), "tok_abcdef");
    }

    #[test]
    fn sealing_is_randomized_but_opens_identically() {
        let a = seal("same", &KEY).unwrap();
        let b = seal("same", &KEY).unwrap();
        assert_ne!(a, b);
        assert_eq!(open(&a, &KEY).unwrap(), "same");
        assert_eq!(open(&b, &KEY).unwrap(), "same");
    }

    #[test]
    fn open_rejects_unprefixed_value() {
        let err = open("plaintext", &KEY).unwrap_err();
        assert!(matches!(err, Error::Crypto { .. }));
    }

    #[test]
    fn open_rejects_tampered_payload() {
        let sealed = seal("secret", &KEY).unwrap();
        let mut raw = BASE64.decode(sealed.strip_prefix(SEAL_PREFIX).unwrap()).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = format!("{SEAL_PREFIX}{}", BASE64.encode(raw));
        assert!(open(&tampered, &KEY).is_err());
    }

    #[test]
    fn open_rejects_short_payload() {
        let short = format!("{SEAL_PREFIX}{}", BASE64.encode([0u8; 4]));
        assert!(open(&short, &KEY).is_err());
    }

    #[test]
    fn open_rejects_wrong_key() {
        let sealed = seal("secret", &KEY).unwrap();
        let other = [9u8; 32];
        assert!(open(&sealed, &other).is_err());
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let sealed = seal("", &KEY).unwrap();
        assert_eq!(open(&sealed, &KEY).unwrap(), "");
    }

    #[test]
    fn is_sealed_matches_only_the_tag() {
        assert!(is_sealed("v1:abc"));
        assert!(!is_sealed("v2:abc"));
        assert!(!is_sealed("plain"));
    }
}
