//! `hoist secret` commands.

use anyhow::Result;
use hoist_config::SecretHelper;
use hoist_config::secret::is_envelope;

pub fn encrypt(key: &str, value: &str) -> Result<String> {
    Ok(SecretHelper::new(key).encrypt_envelope(value)?)
}

/// Accepts a full envelope or a bare `nonce.ciphertext` pair.
pub fn decrypt(key: &str, envelope: &str) -> Result<String> {
    let helper = SecretHelper::new(key);
    let envelope = envelope.trim();
    if is_envelope(envelope) {
        Ok(helper.decrypt_envelope(envelope)?)
    } else {
        Ok(helper.decrypt(envelope)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "SazbwMf3NZxVVbBqQHebPcXCqrVn3DDp";

    #[test]
    fn test_encrypt_then_decrypt() {
        let envelope = encrypt(KEY, "hunter2").unwrap();
        assert!(envelope.starts_with("estafette.secret("));
        assert_eq!(decrypt(KEY, &envelope).unwrap(), "hunter2");
    }

    #[test]
    fn test_decrypt_bare_pair() {
        let envelope = encrypt(KEY, "hunter2").unwrap();
        let bare = envelope
            .trim_start_matches("estafette.secret(")
            .trim_end_matches(')');
        assert_eq!(decrypt(KEY, bare).unwrap(), "hunter2");
    }

    #[test]
    fn test_wrong_key() {
        let envelope = encrypt(KEY, "hunter2").unwrap();
        assert!(decrypt("0123456789abcdef0123456789abcdef", &envelope).is_err());
    }

    #[test]
    fn test_short_key() {
        assert!(encrypt("short", "hunter2").is_err());
    }
}
