//! At-rest encryption for stored API keys
//!
//! AES-256-GCM with a key derived from the platform's shared secret by
//! a single SHA-256 pass. The secret already exists elsewhere in the
//! system (it signs access tokens), so no separate key material needs
//! provisioning. Stored form: base64(nonce ‖ ciphertext), URL-safe.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

use crate::error::CatalogError;

/// GCM standard nonce length in bytes
const NONCE_LEN: usize = 12;

/// Symmetric cipher for API keys at rest
pub struct KeyCipher {
    cipher: Aes256Gcm,
}

impl KeyCipher {
    /// Derive the cipher from the shared secret
    #[must_use]
    pub fn from_shared_secret(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&digest).expect("sha256 digest is a valid aes-256 key");

        Self { cipher }
    }

    /// Encrypt an API key for storage
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Encrypt` if encryption fails
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CatalogError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CatalogError::Encrypt)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(combined))
    }

    /// Decrypt a stored API key
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Decrypt` on malformed input, a wrong key,
    /// or tampered ciphertext
    pub fn decrypt(&self, encoded: &str) -> Result<String, CatalogError> {
        let combined = URL_SAFE_NO_PAD.decode(encoded).map_err(|_| CatalogError::Decrypt)?;
        if combined.len() <= NONCE_LEN {
            return Err(CatalogError::Decrypt);
        }

        let (nonce, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CatalogError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| CatalogError::Decrypt)
    }
}

/// Build the non-reversible display hint for an API key
///
/// Keys of 8 characters or fewer are fully masked.
#[must_use]
pub fn generate_hint(api_key: &str) -> String {
    let chars: Vec<char> = api_key.chars().collect();
    if chars.len() <= 8 {
        return "***".to_owned();
    }

    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let cipher = KeyCipher::from_shared_secret("token-signing-secret");
        let encrypted = cipher.encrypt("sk-abcdef123456").unwrap();

        assert_ne!(encrypted, "sk-abcdef123456");
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "sk-abcdef123456");
    }

    #[test]
    fn nonces_differ_between_encryptions() {
        let cipher = KeyCipher::from_shared_secret("secret");
        let a = cipher.encrypt("same-key").unwrap();
        let b = cipher.encrypt("same-key").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_secret_fails_decryption() {
        let cipher = KeyCipher::from_shared_secret("secret-a");
        let other = KeyCipher::from_shared_secret("secret-b");

        let encrypted = cipher.encrypt("sk-abcdef123456").unwrap();
        assert!(matches!(other.decrypt(&encrypted), Err(CatalogError::Decrypt)));
    }

    #[test]
    fn tampered_ciphertext_fails_decryption() {
        let cipher = KeyCipher::from_shared_secret("secret");
        let encrypted = cipher.encrypt("sk-abcdef123456").unwrap();

        let mut bytes = URL_SAFE_NO_PAD.decode(&encrypted).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = URL_SAFE_NO_PAD.encode(bytes);

        assert!(matches!(cipher.decrypt(&tampered), Err(CatalogError::Decrypt)));
    }

    #[test]
    fn short_keys_are_fully_masked() {
        assert_eq!(generate_hint("sk-12345"), "***");
        assert_eq!(generate_hint(""), "***");
    }

    #[test]
    fn long_keys_show_first_and_last_three() {
        assert_eq!(generate_hint("sk-abcdef-xyz"), "sk-...xyz");
    }
}
