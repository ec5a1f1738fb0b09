//! Sealed redirect state
//!
//! The authorization round trip carries a state blob through a third party,
//! so it is sealed with AES-256-GCM: the provider and the user agent see an
//! opaque base64url string, and any tampering fails authentication on the
//! way back. The blob is minted when the login URL is requested and consumed
//! exactly once on redirect; nothing is persisted server-side.

use aes_gcm::{
    aead::{Aead, AeadCore, OsRng},
    Aes256Gcm, KeyInit, Nonce,
};
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size of the AES-256 key in bytes.
const KEY_SIZE: usize = 32;

/// Size of the GCM nonce in bytes.
const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag.
const TAG_SIZE: usize = 16;

/// Plaintext carried through the authorization round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialState {
    /// Callback URL that receives the long-lived token once redeemed.
    pub state_url: String,
    /// Opaque caller payload echoed back untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state key must decode to {KEY_SIZE} bytes")]
    InvalidKey,
    #[error("sealed state is malformed: {0}")]
    Malformed(String),
    #[error("sealed state failed authentication")]
    Unauthenticated,
}

/// Seals and opens [`CredentialState`] blobs with a deployment-wide key.
pub struct StateCipher {
    cipher: Aes256Gcm,
}

impl StateCipher {
    /// Build a cipher from a standard-base64 encoded 32-byte key.
    pub fn from_base64_key(key: &str) -> Result<Self, StateError> {
        let bytes = STANDARD.decode(key).map_err(|_| StateError::InvalidKey)?;
        if bytes.len() != KEY_SIZE {
            return Err(StateError::InvalidKey);
        }
        let cipher = Aes256Gcm::new_from_slice(&bytes).map_err(|_| StateError::InvalidKey)?;
        Ok(Self { cipher })
    }

    /// Seal a state into an opaque base64url blob: nonce || ciphertext || tag.
    pub fn seal(&self, state: &CredentialState) -> Result<String, StateError> {
        let plaintext =
            serde_json::to_vec(state).map_err(|e| StateError::Malformed(e.to_string()))?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|e| StateError::Malformed(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Open a blob produced by [`seal`](Self::seal).
    pub fn open(&self, blob: &str) -> Result<CredentialState, StateError> {
        let sealed = URL_SAFE_NO_PAD
            .decode(blob)
            .map_err(|e| StateError::Malformed(e.to_string()))?;

        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(StateError::Malformed("sealed state too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| StateError::Unauthenticated)?;

        serde_json::from_slice(&plaintext).map_err(|e| StateError::Malformed(e.to_string()))
    }
}

impl std::fmt::Debug for StateCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEV_STATE_KEY;

    fn cipher() -> StateCipher {
        StateCipher::from_base64_key(DEV_STATE_KEY).unwrap()
    }

    fn state() -> CredentialState {
        CredentialState {
            state_url: "https://looker.example.com/action_hub_state/abc123".to_string(),
            payload: None,
        }
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let sealed = cipher().seal(&state()).unwrap();
        let opened = cipher().open(&sealed).unwrap();
        assert_eq!(opened, state());
    }

    #[test]
    fn test_sealed_blob_is_url_safe() {
        let sealed = cipher().seal(&state()).unwrap();
        assert!(!sealed.contains('+'));
        assert!(!sealed.contains('/'));
        assert!(!sealed.contains('='));
    }

    #[test]
    fn test_same_state_seals_differently() {
        // Fresh nonce per blob.
        let a = cipher().seal(&state()).unwrap();
        let b = cipher().seal(&state()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampered_blob_rejected() {
        let sealed = cipher().seal(&state()).unwrap();
        let mut bytes = URL_SAFE_NO_PAD.decode(&sealed).unwrap();
        *bytes.last_mut().unwrap() ^= 0xFF;
        let tampered = URL_SAFE_NO_PAD.encode(&bytes);

        assert!(matches!(
            cipher().open(&tampered),
            Err(StateError::Unauthenticated)
        ));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let sealed = cipher().seal(&state()).unwrap();
        let other =
            StateCipher::from_base64_key("MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=").unwrap();

        assert!(matches!(other.open(&sealed), Err(StateError::Unauthenticated)));
    }

    #[test]
    fn test_garbage_blob_is_malformed() {
        assert!(matches!(
            cipher().open("not base64url!!"),
            Err(StateError::Malformed(_))
        ));
        assert!(matches!(cipher().open("QUJD"), Err(StateError::Malformed(_))));
    }

    #[test]
    fn test_short_key_rejected() {
        assert!(matches!(
            StateCipher::from_base64_key("QUJD"),
            Err(StateError::InvalidKey)
        ));
    }

    #[test]
    fn test_payload_survives_roundtrip() {
        let with_payload = CredentialState {
            state_url: "https://looker.example.com/action_hub_state/abc123".to_string(),
            payload: Some(serde_json::json!({"app": "audiences"})),
        };
        let sealed = cipher().seal(&with_payload).unwrap();
        assert_eq!(cipher().open(&sealed).unwrap(), with_payload);
    }
}
