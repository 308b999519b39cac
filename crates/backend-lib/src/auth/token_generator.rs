// ============================
// crates/backend-lib/src/auth/token_generator.rs
// ============================
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
/** Identity token generation.
Tokens are opaque bearer secrets, so they come from OS entropy
rather than from the user id. */
use rand::{rngs::OsRng, RngCore};

/// Token size in bytes (256 bits of entropy)
const TOKEN_BYTES: usize = 32;

/** Generate a fresh bearer token
# Returns
A base64 URL-safe encoded string without padding, safe to put in a query string */
pub fn generate_token() -> String {
    let mut buffer = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut buffer);
    URL_SAFE_NO_PAD.encode(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique_and_url_safe() {
        let first = generate_token();
        let second = generate_token();

        assert_ne!(first, second);
        // 32 bytes encode to 43 characters without padding
        assert_eq!(first.len(), 43);
        assert!(first
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
