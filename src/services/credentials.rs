//! Password hashing and verification.
//!
//! Argon2id with per-password random salts. Verification against unknown
//! users runs through [`CredentialStore::dummy_verify`] so the caller's
//! timing is identical whether the account exists or not.

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::CoreError;
use crate::store::IdentityStore;
use uuid::Uuid;

#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn IdentityStore>,
    /// Hash of an unguessable throwaway value, verified against when the
    /// account does not exist so both failure paths cost one verification.
    dummy_hash: String,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn IdentityStore>) -> Result<Self, CoreError> {
        let dummy_hash = hash_with_argon2(&uuid::Uuid::new_v4().to_string())?;
        Ok(Self { store, dummy_hash })
    }

    /// Hash a plaintext password for storage.
    pub fn hash(&self, plaintext: &str) -> Result<String, CoreError> {
        hash_with_argon2(plaintext)
    }

    /// Verify a plaintext password against a stored hash.
    ///
    /// `Ok(false)` on mismatch; `Err` only when the stored hash itself is
    /// malformed, which is an infrastructure failure.
    pub fn verify(&self, plaintext: &str, password_hash: &str) -> Result<bool, CoreError> {
        let parsed = PasswordHash::new(password_hash)
            .map_err(|e| CoreError::Internal(anyhow::anyhow!("invalid password hash: {e}")))?;
        Ok(Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok())
    }

    /// Burn one verification against the dummy hash and fail.
    ///
    /// Called on the user-not-found path so it is indistinguishable in
    /// timing from a wrong-password failure.
    pub fn dummy_verify(&self, plaintext: &str) -> CoreError {
        if let Ok(parsed) = PasswordHash::new(&self.dummy_hash) {
            let _ = Argon2::default().verify_password(plaintext.as_bytes(), &parsed);
        }
        CoreError::InvalidCredentials
    }

    /// Replace a user's stored hash. Does not itself authenticate: callers
    /// must already hold a live session, a validated OTP, or a validated
    /// recovery token.
    pub async fn set_password(&self, user_id: Uuid, plaintext: &str) -> Result<(), CoreError> {
        let password_hash = self.hash(plaintext)?;
        self.store.set_password_hash(user_id, &password_hash).await
    }
}

fn hash_with_argon2(plaintext: &str) -> Result<String, CoreError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| CoreError::Internal(anyhow::anyhow!("password hashing failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn credentials() -> CredentialStore {
        CredentialStore::new(Arc::new(MemoryStore::new())).expect("credential store")
    }

    #[test]
    fn test_hash_and_verify_roundtrip() {
        let creds = credentials();
        let hash = creds.hash("correct horse battery staple").expect("hash");
        assert!(hash.starts_with("$argon2"));
        assert!(creds.verify("correct horse battery staple", &hash).unwrap());
        assert!(!creds.verify("wrong password", &hash).unwrap());
    }

    #[test]
    fn test_same_password_hashes_differently() {
        let creds = credentials();
        let a = creds.hash("password123").expect("hash");
        let b = creds.hash("password123").expect("hash");
        assert_ne!(a, b);
        assert!(creds.verify("password123", &a).unwrap());
        assert!(creds.verify("password123", &b).unwrap());
    }

    #[test]
    fn test_dummy_verify_returns_invalid_credentials() {
        let creds = credentials();
        assert!(matches!(
            creds.dummy_verify("anything"),
            CoreError::InvalidCredentials
        ));
    }
}
