//! One-time code and opaque token generation.
//!
//! Raw secrets are handed to the notifier exactly once; only SHA-256 digests
//! are ever persisted.

use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Generate a fixed-length numeric one-time code.
pub fn generate_numeric_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| rng.gen_range(0..10).to_string())
        .collect()
}

/// Generate an opaque high-entropy token (256 bits, hex-encoded).
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Hash a secret for storage.
pub fn sha256_hex(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare a candidate secret against a stored digest in constant time.
pub fn digest_matches(candidate: &str, stored_digest: &str) -> bool {
    let candidate_digest = sha256_hex(candidate);
    candidate_digest
        .as_bytes()
        .ct_eq(stored_digest.as_bytes())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_code_length_and_charset() {
        let code = generate_numeric_code(6);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_generated_tokens_are_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_digest_roundtrip() {
        let token = generate_token();
        let digest = sha256_hex(&token);
        assert!(digest_matches(&token, &digest));
        assert!(!digest_matches("something-else", &digest));
    }
}
