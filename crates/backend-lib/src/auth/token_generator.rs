// ============================
// crates/backend-lib/src/auth/token_generator.rs
// ============================
/** Secure key generation and text encoding
Session ids, authorization codes, access and refresh tokens are all random
byte strings from the OS entropy source. They leave the process only in the
URL-safe, unpadded base64 form produced by [`encode_key`]. */
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};

use crate::error::AuthError;

/// Key size for sessions (64 bytes = 512 bits of entropy)
pub const SESSION_KEY_BYTES: usize = 64;

/// Key size for authorization codes and OAuth tokens
pub const TOKEN_KEY_BYTES: usize = 32;

/** Generate `length` cryptographically secure random bytes
# Errors
`AuthError::Entropy` when the OS source cannot be read. There is no fallback
to a weaker generator. */
pub fn generate_key(length: usize) -> Result<Vec<u8>, AuthError> {
    let mut buffer = vec![0u8; length];
    OsRng.try_fill_bytes(&mut buffer).map_err(|e| {
        tracing::error!(error = %e, "OS entropy source unavailable");
        AuthError::Entropy(e.to_string())
    })?;
    Ok(buffer)
}

/// Encode a key for the wire
pub fn encode_key(key: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(key)
}

/** Decode a key received from the wire
Rejects padding, non-URL-safe characters, non-canonical trailing bits and the
empty string, so every accepted input re-encodes to itself. */
pub fn decode_key(encoded: &str) -> Result<Vec<u8>, AuthError> {
    if encoded.is_empty() {
        return Err(AuthError::MalformedKey);
    }
    URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| AuthError::MalformedKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        // Generate two keys and verify they're different
        let key1 = generate_key(SESSION_KEY_BYTES).unwrap();
        let key2 = generate_key(SESSION_KEY_BYTES).unwrap();

        assert_ne!(key1, key2);
        assert_eq!(key1.len(), 64);
        assert_eq!(generate_key(TOKEN_KEY_BYTES).unwrap().len(), 32);
        assert!(generate_key(0).unwrap().is_empty());
    }

    #[test]
    fn test_encoding_is_url_safe() {
        // 64 bytes of entropy encoded without padding is 86 chars
        let encoded = encode_key(&generate_key(SESSION_KEY_BYTES).unwrap());
        assert_eq!(encoded.len(), 86);
        assert!(encoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_decode_inverts_encode() {
        for len in [1usize, 2, 3, 31, 32, 64] {
            let key = generate_key(len).unwrap();
            assert_eq!(decode_key(&encode_key(&key)).unwrap(), key);
        }
        let all_bytes: Vec<u8> = (0..=255).collect();
        assert_eq!(decode_key(&encode_key(&all_bytes)).unwrap(), all_bytes);
    }

    #[test]
    fn test_encode_inverts_decode() {
        for s in ["AA", "_-8", "aGVsbG8", "3q2-7w"] {
            assert_eq!(encode_key(&decode_key(s).unwrap()), s);
        }
    }

    #[test]
    fn test_malformed_keys_rejected() {
        assert!(matches!(decode_key(""), Err(AuthError::MalformedKey)));
        // padding is not part of the encoding
        assert!(matches!(decode_key("aGVsbG8="), Err(AuthError::MalformedKey)));
        // standard-alphabet characters
        assert!(matches!(decode_key("ab+/"), Err(AuthError::MalformedKey)));
        // non-canonical trailing bits would decode to the same bytes as "AA"
        assert!(matches!(decode_key("AB"), Err(AuthError::MalformedKey)));
        // impossible length
        assert!(matches!(decode_key("A"), Err(AuthError::MalformedKey)));
    }
}
