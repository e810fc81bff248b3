//! Secret envelopes.
//!
//! Secrets are AES-256-GCM encrypted and written as
//! `estafette.secret(<nonce>.<ciphertext>)`, both parts base64url encoded.
//! Envelopes can appear anywhere in configuration text and are decrypted
//! in place before the text is parsed.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use regex::{Captures, Regex};
use std::sync::LazyLock;
use tracing::warn;

use crate::SecretError;

const NONCE_LENGTH: usize = 12;
const ENVELOPE_PREFIX: &str = "estafette.secret(";
const ENVELOPE_SUFFIX: &str = ")";

// A whole string that is exactly one envelope.
static ENVELOPE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^estafette\.secret\(([a-zA-Z0-9._=-]+)\)$").unwrap());

// Envelopes anywhere inside a larger text.
static EMBEDDED_ENVELOPE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"estafette\.secret\(([a-zA-Z0-9._=-]+)\)").unwrap());

/// Encrypts and decrypts secrets with a single symmetric key.
#[derive(Clone)]
pub struct SecretHelper {
    key: Vec<u8>,
}

impl std::fmt::Debug for SecretHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretHelper").finish_non_exhaustive()
    }
}

impl SecretHelper {
    /// The key must be 32 bytes; other lengths fail on first use.
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    fn cipher(&self) -> Result<Aes256Gcm, SecretError> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|_| {
            SecretError::Crypto(format!(
                "key is {} bytes, AES-256 needs 32",
                self.key.len()
            ))
        })
    }

    /// Encrypt `plaintext` into `nonce.ciphertext` with a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, SecretError> {
        let cipher = self.cipher()?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| SecretError::Crypto(e.to_string()))?;

        Ok(format!(
            "{}.{}",
            URL_SAFE.encode(nonce),
            URL_SAFE.encode(ciphertext)
        ))
    }

    /// Decrypt a `nonce.ciphertext` pair produced by [`SecretHelper::encrypt`].
    pub fn decrypt(&self, encrypted: &str) -> Result<String, SecretError> {
        let parts: Vec<&str> = encrypted.split('.').collect();
        let [nonce, ciphertext] = parts.as_slice() else {
            return Err(SecretError::Format(
                "expected exactly one '.' between nonce and ciphertext".to_string(),
            ));
        };

        let nonce = URL_SAFE
            .decode(nonce)
            .map_err(|e| SecretError::Format(format!("nonce: {}", e)))?;
        if nonce.len() != NONCE_LENGTH {
            return Err(SecretError::Format(format!(
                "nonce is {} bytes, expected {}",
                nonce.len(),
                NONCE_LENGTH
            )));
        }
        let ciphertext = URL_SAFE
            .decode(ciphertext)
            .map_err(|e| SecretError::Format(format!("ciphertext: {}", e)))?;

        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| SecretError::Crypto("authentication failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| SecretError::Format(format!("plaintext is not UTF-8: {}", e)))
    }

    pub fn encrypt_envelope(&self, plaintext: &str) -> Result<String, SecretError> {
        Ok(format!(
            "{}{}{}",
            ENVELOPE_PREFIX,
            self.encrypt(plaintext)?,
            ENVELOPE_SUFFIX
        ))
    }

    /// Decrypt `text` if it is exactly one envelope, otherwise return it as is.
    pub fn decrypt_envelope(&self, text: &str) -> Result<String, SecretError> {
        match ENVELOPE_REGEX.captures(text) {
            Some(caps) => self.decrypt(&caps[1]),
            None => Ok(text.to_string()),
        }
    }

    /// Replace every envelope inside `text` with its plaintext.
    ///
    /// An envelope that fails to decrypt is replaced with an empty string;
    /// the rest of the document is still decrypted.
    pub fn decrypt_all_envelopes(&self, text: &str) -> String {
        EMBEDDED_ENVELOPE_REGEX
            .replace_all(text, |caps: &Captures| match self.decrypt(&caps[1]) {
                Ok(plaintext) => plaintext,
                Err(e) => {
                    warn!(error = %e, "Failed decrypting secret envelope, using an empty value");
                    String::new()
                }
            })
            .into_owned()
    }
}

/// Whether `text` is exactly one secret envelope.
pub fn is_envelope(text: &str) -> bool {
    ENVELOPE_REGEX.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "SazbwMf3NZxVVbBqQHebPcXCqrVn3DDp";

    fn helper() -> SecretHelper {
        SecretHelper::new(KEY)
    }

    #[test]
    fn test_is_envelope() {
        let envelope = helper().encrypt_envelope("value").unwrap();
        assert!(is_envelope(&envelope));
        assert!(!is_envelope(&format!("password: {}", envelope)));
        assert!(!is_envelope("plain"));
    }

    #[test]
    fn test_encrypt_decrypt() {
        let encrypted = helper().encrypt("this is my secret").unwrap();
        assert_eq!(helper().decrypt(&encrypted).unwrap(), "this is my secret");
    }

    #[test]
    fn test_encrypt_uses_fresh_nonce() {
        let a = helper().encrypt("same").unwrap();
        let b = helper().encrypt("same").unwrap();
        assert_ne!(a, b);
        assert_ne!(a.split('.').next(), b.split('.').next());
    }

    #[test]
    fn test_encrypt_empty_string() {
        let encrypted = helper().encrypt("").unwrap();
        assert_eq!(helper().decrypt(&encrypted).unwrap(), "");
    }

    #[test]
    fn test_invalid_key_length() {
        let short = SecretHelper::new("too-short");
        assert!(matches!(
            short.encrypt("x").unwrap_err(),
            SecretError::Crypto(_)
        ));
    }

    #[test]
    fn test_decrypt_without_separator() {
        assert!(matches!(
            helper().decrypt("bm9zZXBhcmF0b3I=").unwrap_err(),
            SecretError::Format(_)
        ));
    }

    #[test]
    fn test_decrypt_with_too_many_parts() {
        assert!(matches!(
            helper().decrypt("a.b.c").unwrap_err(),
            SecretError::Format(_)
        ));
    }

    #[test]
    fn test_decrypt_with_wrong_key() {
        let encrypted = helper().encrypt("secret").unwrap();
        let other = SecretHelper::new("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA");
        assert!(matches!(
            other.decrypt(&encrypted).unwrap_err(),
            SecretError::Crypto(_)
        ));
    }

    #[test]
    fn test_decrypt_tampered_ciphertext() {
        let encrypted = helper().encrypt("secret").unwrap();
        let (nonce, ciphertext) = encrypted.split_once('.').unwrap();
        let mut bytes = URL_SAFE.decode(ciphertext).unwrap();
        bytes[0] ^= 0xff;
        let tampered = format!("{}.{}", nonce, URL_SAFE.encode(bytes));
        assert!(matches!(
            helper().decrypt(&tampered).unwrap_err(),
            SecretError::Crypto(_)
        ));
    }

    #[test]
    fn test_decrypt_with_swapped_nonce() {
        let first = helper().encrypt("secret").unwrap();
        let second = helper().encrypt("secret").unwrap();
        let nonce = second.split('.').next().unwrap();
        let ciphertext = first.split('.').nth(1).unwrap();
        assert!(
            helper()
                .decrypt(&format!("{}.{}", nonce, ciphertext))
                .is_err()
        );
    }

    #[test]
    fn test_envelope_round_trip() {
        let envelope = helper().encrypt_envelope("hunter2").unwrap();
        assert!(envelope.starts_with("estafette.secret("));
        assert!(envelope.ends_with(')'));
        assert_eq!(helper().decrypt_envelope(&envelope).unwrap(), "hunter2");
    }

    #[test]
    fn test_decrypt_envelope_passes_plain_text_through() {
        assert_eq!(
            helper().decrypt_envelope("not a secret").unwrap(),
            "not a secret"
        );
    }

    #[test]
    fn test_decrypt_envelope_requires_full_match() {
        let envelope = helper().encrypt_envelope("hunter2").unwrap();
        let padded = format!(" {}", envelope);
        assert_eq!(helper().decrypt_envelope(&padded).unwrap(), padded);
    }

    #[test]
    fn test_decrypt_all_envelopes() {
        let a = helper().encrypt_envelope("alpha").unwrap();
        let b = helper().encrypt_envelope("bravo").unwrap();
        let text = format!("password: {}\ntoken: '{}'\nplain: value\n", a, b);

        let decrypted = helper().decrypt_all_envelopes(&text);
        assert_eq!(
            decrypted,
            "password: alpha\ntoken: 'bravo'\nplain: value\n"
        );
        assert!(!decrypted.contains("estafette.secret("));
    }

    #[test]
    fn test_decrypt_all_envelopes_blanks_failures() {
        let good = helper().encrypt_envelope("alpha").unwrap();
        let text = format!("a: {}\nb: estafette.secret(deadbeef)\nc: plain", good);

        let decrypted = helper().decrypt_all_envelopes(&text);
        assert_eq!(decrypted, "a: alpha\nb: \nc: plain");
    }

    #[test]
    fn test_decrypt_all_envelopes_without_envelopes() {
        let text = "nothing: to see here";
        assert_eq!(helper().decrypt_all_envelopes(text), text);
    }
}
