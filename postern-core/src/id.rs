//! Prefixed ID generation
//!
//! Identifiers carry a short type prefix (`mbr`, `req`, `aud`) followed by
//! URL-safe base64 random data, so a value is self-describing in logs and
//! audit records.

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use rand::{TryRngCore, rngs::OsRng};

/// Generate a prefixed ID with 96 bits of entropy.
///
/// The format is `{prefix}_{random}`, where the random part is base64
/// URL-safe without padding.
pub fn generate_prefixed_id(prefix: &str) -> String {
    let mut bytes = [0u8; 12];
    OsRng.try_fill_bytes(&mut bytes).unwrap();

    let encoded = BASE64_URL_SAFE_NO_PAD.encode(bytes);

    format!("{prefix}_{encoded}")
}

/// Validate that an ID carries the expected prefix and decodes to at least
/// 96 bits of random data.
pub fn validate_prefixed_id(id: &str, expected_prefix: &str) -> bool {
    let Some(rest) = id.strip_prefix(expected_prefix) else {
        return false;
    };
    let Some(random_part) = rest.strip_prefix('_') else {
        return false;
    };

    match BASE64_URL_SAFE_NO_PAD.decode(random_part) {
        Ok(decoded) => decoded.len() >= 12,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_prefixed_id() {
        let id = generate_prefixed_id("mbr");
        assert!(id.starts_with("mbr_"));

        // Two draws never collide
        let id2 = generate_prefixed_id("mbr");
        assert_ne!(id, id2);
    }

    #[test]
    fn test_validate_prefixed_id() {
        let id = generate_prefixed_id("req");
        assert!(validate_prefixed_id(&id, "req"));
        assert!(!validate_prefixed_id(&id, "aud"));

        assert!(!validate_prefixed_id("req", "req"));
        assert!(!validate_prefixed_id("req_", "req"));
        assert!(!validate_prefixed_id("req_!!", "req"));
        assert!(!validate_prefixed_id("req_c2hvcnQ", "req")); // too short
    }

    #[test]
    fn test_id_is_url_safe() {
        let id = generate_prefixed_id("aud");
        assert!(
            id.chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        );
    }
}
