//! OTP challenge engine.
//!
//! Issues and validates short numeric one-time codes for a declared purpose.
//! Issuing supersedes any live challenge for the same (email, purpose);
//! validation is attempt-limited and consume-once. A successful verify is a
//! one-time capability: the gated action (marking the email verified or
//! installing the new password) happens in the same call, and a replay of
//! the same code fails with `AlreadyConsumed`.

use std::sync::Arc;

use crate::error::CoreError;
use crate::models::{OtpChallenge, OtpPurpose, User};
use crate::services::credentials::CredentialStore;
use crate::services::notify::Notifier;
use crate::store::IdentityStore;
use crate::utils::{digest_matches, generate_numeric_code, normalize_email, sha256_hex};

const CODE_LENGTH: usize = 6;
const CHALLENGE_TTL_MINUTES: i64 = 10;
const MAX_ATTEMPTS: i32 = 5;

/// Minimum accepted password length, shared with the other password flows.
pub(crate) const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Clone)]
pub struct OtpChallengeEngine {
    store: Arc<dyn IdentityStore>,
    notifier: Arc<dyn Notifier>,
    credentials: CredentialStore,
}

impl OtpChallengeEngine {
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

    /// Issue a fresh challenge, invalidating any live one for the same
    /// (email, purpose), and hand the plaintext code to the notifier.
    ///
    /// Succeeds whether or not the email belongs to a registered user; the
    /// account check happens at verification time, so this call leaks
    /// nothing about account existence.
    #[tracing::instrument(skip(self), fields(purpose = purpose.as_str()))]
    pub async fn request(&self, email: &str, purpose: OtpPurpose) -> Result<(), CoreError> {
        let email = normalize_email(email);
        let code = generate_numeric_code(CODE_LENGTH);
        let challenge = OtpChallenge::new(
            email.clone(),
            purpose,
            sha256_hex(&code),
            CHALLENGE_TTL_MINUTES,
            MAX_ATTEMPTS,
        );
        self.store.put_challenge(&challenge).await?;
        self.notifier.send_otp_code(&email, &code, purpose).await?;

        tracing::info!(challenge_id = %challenge.challenge_id, "OTP challenge issued");
        Ok(())
    }

    /// Verify a code and perform the purpose-gated action.
    ///
    /// `new_password` is required for `PasswordChange` and ignored otherwise.
    #[tracing::instrument(skip(self, code, new_password), fields(purpose = purpose.as_str()))]
    pub async fn verify(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code: &str,
        new_password: Option<&str>,
    ) -> Result<(), CoreError> {
        let email = normalize_email(email);

        let challenge = self
            .store
            .find_challenge(&email, purpose)
            .await?
            .ok_or(CoreError::NotFound("challenge"))?;
        if challenge.consumed {
            return Err(CoreError::AlreadyConsumed);
        }
        if challenge.is_expired() {
            self.store
                .discard_challenge(&email, purpose, challenge.challenge_id)
                .await?;
            return Err(CoreError::Expired("challenge"));
        }
        if challenge.attempts_remaining <= 0 {
            return Err(CoreError::Exhausted);
        }

        // Resolve everything the gated action needs before burning an
        // attempt or the challenge itself.
        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(CoreError::NotFound("user"))?;
        let replacement = match purpose {
            OtpPurpose::PasswordChange => {
                let plaintext = new_password
                    .ok_or_else(|| CoreError::BadRequest("new password is required".into()))?;
                if plaintext.len() < MIN_PASSWORD_LENGTH {
                    return Err(CoreError::BadRequest(format!(
                        "password must be at least {MIN_PASSWORD_LENGTH} characters"
                    )));
                }
                Some(plaintext)
            }
            OtpPurpose::EmailVerify => None,
        };

        let spent = self
            .store
            .spend_challenge_attempt(&email, purpose, challenge.challenge_id)
            .await?;
        let Some(spent) = spent else {
            // Lost a race since the read above: the challenge was consumed,
            // superseded, or exhausted in the meantime. Re-read to classify.
            return Err(self.classify_gone(&email, purpose, challenge.challenge_id).await?);
        };

        if !digest_matches(code, &spent.code_hash) {
            tracing::info!(
                challenge_id = %spent.challenge_id,
                attempts_remaining = spent.attempts_remaining,
                "OTP code mismatch"
            );
            return Err(CoreError::Invalid);
        }

        if !self
            .store
            .consume_challenge(&email, purpose, spent.challenge_id)
            .await?
        {
            return Err(CoreError::AlreadyConsumed);
        }

        match purpose {
            OtpPurpose::EmailVerify => {
                self.store.set_email_verified(user.user_id).await?;
                tracing::info!(user_id = %user.user_id, "Email verified");
            }
            OtpPurpose::PasswordChange => {
                self.apply_password_change(&user, replacement).await?;
            }
        }
        Ok(())
    }

    async fn apply_password_change(
        &self,
        user: &User,
        replacement: Option<&str>,
    ) -> Result<(), CoreError> {
        let plaintext = replacement
            .ok_or_else(|| CoreError::Internal(anyhow::anyhow!("missing replacement password")))?;
        self.credentials.set_password(user.user_id, plaintext).await?;
        // Changing the password invalidates every outstanding session.
        self.store
            .revoke_sessions_for_user(user.user_id, None)
            .await?;
        tracing::info!(user_id = %user.user_id, "Password changed via OTP");
        Ok(())
    }

    async fn classify_gone(
        &self,
        email: &str,
        purpose: OtpPurpose,
        challenge_id: uuid::Uuid,
    ) -> Result<CoreError, CoreError> {
        Ok(match self.store.find_challenge(email, purpose).await? {
            Some(current) if current.challenge_id == challenge_id => {
                if current.consumed {
                    CoreError::AlreadyConsumed
                } else {
                    CoreError::Exhausted
                }
            }
            _ => CoreError::NotFound("challenge"),
        })
    }
}
