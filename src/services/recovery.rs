//! Recovery token engine for the forgot-password flow.
//!
//! A different proof mechanism from the OTP engine: the user reaches their
//! inbox and clicks a link, so the token is long and random (256 bits)
//! instead of short and attempt-limited. Issuing supersedes any live token
//! for the email; consuming is a one-shot compare-and-mark that installs the
//! new password and revokes every outstanding session.

use std::sync::Arc;

use crate::error::CoreError;
use crate::models::RecoveryToken;
use crate::services::credentials::CredentialStore;
use crate::services::notify::Notifier;
use crate::services::otp::MIN_PASSWORD_LENGTH;
use crate::store::IdentityStore;
use crate::utils::{generate_token, normalize_email, sha256_hex};

const TOKEN_TTL_MINUTES: i64 = 60;

#[derive(Clone)]
pub struct RecoveryTokenEngine {
    store: Arc<dyn IdentityStore>,
    notifier: Arc<dyn Notifier>,
    credentials: CredentialStore,
}

impl RecoveryTokenEngine {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        notifier: Arc<dyn Notifier>,
        credentials: CredentialStore,
    ) -> Self {
        Self {
            store,
            notifier,
            credentials,
        }
    }

    /// Issue a recovery token and email it as a link.
    ///
    /// Always succeeds from the caller's point of view: an unknown email is
    /// silently ignored so the flow cannot be used to enumerate accounts.
    #[tracing::instrument(skip(self))]
    pub async fn issue(&self, email: &str) -> Result<(), CoreError> {
        let email = normalize_email(email);
        if self.store.find_user_by_email(&email).await?.is_none() {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(());
        }

        let token = generate_token();
        let record = RecoveryToken::new(email.clone(), sha256_hex(&token), TOKEN_TTL_MINUTES);
        self.store.put_recovery_token(&record).await?;
        self.notifier.send_recovery_link(&email, &token).await?;

        tracing::info!(token_id = %record.token_id, "Recovery token issued");
        Ok(())
    }

    /// Consume a recovery token: set the new password and revoke every
    /// outstanding session of the user.
    #[tracing::instrument(skip_all)]
    pub async fn consume(&self, token: &str, new_password: &str) -> Result<(), CoreError> {
        if new_password.len() < MIN_PASSWORD_LENGTH {
            return Err(CoreError::BadRequest(format!(
                "password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }

        let record = self
            .store
            .find_recovery_token_by_hash(&sha256_hex(token))
            .await?
            .ok_or(CoreError::NotFound("recovery token"))?;
        if record.consumed {
            return Err(CoreError::AlreadyConsumed);
        }
        if record.is_expired() {
            self.store
                .discard_recovery_token(&record.email, record.token_id)
                .await?;
            return Err(CoreError::Expired("recovery token"));
        }

        let user = self
            .store
            .find_user_by_email(&record.email)
            .await?
            .ok_or(CoreError::NotFound("user"))?;

        if !self
            .store
            .consume_recovery_token(&record.email, record.token_id)
            .await?
        {
            return Err(CoreError::AlreadyConsumed);
        }

        self.credentials.set_password(user.user_id, new_password).await?;
        self.store
            .revoke_sessions_for_user(user.user_id, None)
            .await?;

        tracing::info!(user_id = %user.user_id, "Password reset completed");
        Ok(())
    }
}
