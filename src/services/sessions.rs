//! Session token manager.
//!
//! Tokens are opaque random values; only their SHA-256 digest is persisted
//! and every validation re-reads the store, so revocation is visible to the
//! next `validate` call immediately.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::CoreError;
use crate::models::AccessSession;
use crate::services::credentials::CredentialStore;
use crate::store::IdentityStore;
use crate::utils::{generate_token, normalize_email, sha256_hex};

#[derive(Clone)]
pub struct SessionTokenManager {
    store: Arc<dyn IdentityStore>,
    credentials: CredentialStore,
    ttl_hours: i64,
}

impl SessionTokenManager {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        credentials: CredentialStore,
        ttl_hours: i64,
    ) -> Self {
        Self {
            store,
            credentials,
            ttl_hours,
        }
    }

    /// Verify credentials and issue a session.
    ///
    /// Unknown email and wrong password both cost one hash verification and
    /// surface the same `InvalidCredentials`.
    #[tracing::instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(String, AccessSession), CoreError> {
        let email = normalize_email(email);
        let Some(user) = self.store.find_user_by_email(&email).await? else {
            return Err(self.credentials.dummy_verify(password));
        };
        if !self.credentials.verify(password, &user.password_hash)? {
            return Err(CoreError::InvalidCredentials);
        }

        let issued = self.issue(user.user_id).await?;
        tracing::info!(user_id = %user.user_id, "User authenticated");
        Ok(issued)
    }

    /// Issue a fresh session for a user, returning the raw token exactly
    /// once alongside the persisted record.
    pub async fn issue(&self, user_id: Uuid) -> Result<(String, AccessSession), CoreError> {
        let token = generate_token();
        let session = AccessSession::new(user_id, sha256_hex(&token), self.ttl_hours);
        self.store.insert_session(&session).await?;
        Ok((token, session))
    }

    /// Validate a token against persisted state.
    pub async fn validate(&self, token: &str) -> Result<AccessSession, CoreError> {
        let session = self
            .store
            .find_session_by_token_hash(&sha256_hex(token))
            .await?
            .ok_or(CoreError::InvalidCredentials)?;
        if session.revoked {
            return Err(CoreError::InvalidCredentials);
        }
        if session.is_expired() {
            return Err(CoreError::Expired("session"));
        }
        Ok(session)
    }

    /// Revoke a session. Idempotent: revoking an unknown or already-revoked
    /// token is not an error, so logout never fails.
    pub async fn revoke(&self, token: &str) -> Result<(), CoreError> {
        self.store.revoke_session(&sha256_hex(token)).await?;
        Ok(())
    }

    /// Revoke every session of a user, optionally sparing the current one.
    pub async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        keep_session: Option<Uuid>,
    ) -> Result<u64, CoreError> {
        self.store
            .revoke_sessions_for_user(user_id, keep_session)
            .await
    }
}
