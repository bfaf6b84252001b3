//! Symmetric encryption for bot credentials at rest (§5: "bot credentials
//! are stored symmetrically encrypted at rest; the key is loaded from
//! configuration and held in memory only").
//!
//! AES-256-GCM with a random 12-byte nonce prepended to the ciphertext,
//! both stored together as a single hex string in `bot_token_encrypted`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("credential_encryption_key must decode as 64 hex chars (32 bytes)")]
    BadKeyLength,
    #[error("stored ciphertext is corrupt or truncated")]
    Corrupt,
    #[error("decryption failed: wrong key or tampered ciphertext")]
    DecryptFailed,
}

/// Holds the AES-256 key loaded once at startup from configuration.
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    /// `key_hex` must be 64 hex characters (32 raw bytes).
    pub fn from_hex(key_hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(key_hex).map_err(|_| CryptoError::BadKeyLength)?;
        if bytes.len() != 32 {
            return Err(CryptoError::BadKeyLength);
        }
        let key = Key::<Aes256Gcm>::from_slice(&bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Generate a fresh random key, hex-encoded — used when no key is
    /// configured so the gateway still starts (credentials from that run
    /// won't decrypt after a restart, which is intentional: the operator is
    /// expected to set a persistent key for production use).
    pub fn generate_key_hex() -> String {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut nonce_bytes = [0u8; 12];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .expect("AES-GCM encryption with a valid key never fails");
        let mut out = nonce_bytes.to_vec();
        out.extend_from_slice(&ciphertext);
        hex::encode(out)
    }

    pub fn decrypt(&self, stored_hex: &str) -> Result<String, CryptoError> {
        let bytes = hex::decode(stored_hex).map_err(|_| CryptoError::Corrupt)?;
        if bytes.len() < 12 {
            return Err(CryptoError::Corrupt);
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptFailed)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Corrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_token() {
        let cipher = CredentialCipher::from_hex(&CredentialCipher::generate_key_hex()).unwrap();
        let stored = cipher.encrypt("123456:ABC-DEF-telegram-token");
        assert_eq!(cipher.decrypt(&stored).unwrap(), "123456:ABC-DEF-telegram-token");
    }

    #[test]
    fn rejects_short_keys() {
        assert!(matches!(
            CredentialCipher::from_hex("abcd"),
            Err(CryptoError::BadKeyLength)
        ));
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let cipher = CredentialCipher::from_hex(&CredentialCipher::generate_key_hex()).unwrap();
        let mut stored = cipher.encrypt("secret");
        stored.replace_range(0..2, "ff");
        assert!(cipher.decrypt(&stored).is_err());
    }
}
