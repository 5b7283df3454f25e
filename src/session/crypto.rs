//! Session envelope encryption.
//!
//! The serialized session is sealed with ChaCha20-Poly1305 under a symmetric
//! key generated once per storage location. Payload layout:
//! base64url-nopad( nonce_12 || ciphertext ). A fresh random nonce is drawn
//! for every seal, so re-encrypting the same session never reuses a nonce.

use super::types::SessionData;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand_core::{OsRng, RngCore};

/// Length of the symmetric key in bytes.
pub const KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;

/// Seals and opens session records.
pub struct SessionCipher {
    cipher: ChaCha20Poly1305,
}

impl SessionCipher {
    /// Build a cipher from a persisted key.
    pub fn from_key(key: &[u8]) -> Result<Self, String> {
        if key.len() != KEY_LEN {
            return Err(format!(
                "session key must be {} bytes, got {}",
                KEY_LEN,
                key.len()
            ));
        }

        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        })
    }

    /// Generate a fresh random key.
    pub fn generate_key() -> Vec<u8> {
        let mut key = vec![0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        key
    }

    /// Encrypt a session record into an envelope payload.
    pub fn seal(&self, session: &SessionData) -> Result<String, String> {
        let plaintext = serde_json::to_vec(session)
            .map_err(|e| format!("failed to serialize session: {}", e))?;

        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| "AEAD encrypt failed".to_string())?;

        let mut payload = nonce.to_vec();
        payload.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(payload))
    }

    /// Decrypt an envelope payload back into a session record.
    pub fn open(&self, payload: &str) -> Result<SessionData, String> {
        let data = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| "invalid envelope encoding".to_string())?;

        if data.len() < NONCE_LEN {
            return Err("envelope payload too short".to_string());
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| "AEAD decrypt failed".to_string())?;

        serde_json::from_slice(&plaintext)
            .map_err(|e| format!("failed to deserialize session: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserData;

    fn cipher() -> SessionCipher {
        SessionCipher::from_key(&SessionCipher::generate_key()).unwrap()
    }

    #[test]
    fn test_seal_open_round_trip() {
        let cipher = cipher();
        let mut session = SessionData::new(UserData::named("octocat"));
        session
            .data
            .insert("theme".to_string(), serde_json::json!("dark"));

        let payload = cipher.seal(&session).unwrap();
        let opened = cipher.open(&payload).unwrap();

        assert_eq!(session, opened);
    }

    #[test]
    fn test_seals_are_nondeterministic() {
        let cipher = cipher();
        let session = SessionData::new(UserData::named("octocat"));

        let a = cipher.seal(&session).unwrap();
        let b = cipher.seal(&session).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let session = SessionData::new(UserData::named("octocat"));
        let payload = cipher().seal(&session).unwrap();

        assert!(cipher().open(&payload).is_err());
    }

    #[test]
    fn test_tampered_payload_fails() {
        let cipher = cipher();
        let session = SessionData::new(UserData::named("octocat"));

        let payload = cipher.seal(&session).unwrap();
        let mut bytes = URL_SAFE_NO_PAD.decode(&payload).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = URL_SAFE_NO_PAD.encode(bytes);

        assert!(cipher.open(&tampered).is_err());
    }

    #[test]
    fn test_garbage_payload_fails() {
        assert!(cipher().open("not base64 at all!!").is_err());
        assert!(cipher().open("c2hvcnQ").is_err());
    }

    #[test]
    fn test_rejects_wrong_key_length() {
        assert!(SessionCipher::from_key(&[0u8; 16]).is_err());
    }
}
