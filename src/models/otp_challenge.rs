//! OTP challenge model - short numeric one-time codes typed by the user.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declared reason for a one-time code. A code issued for one purpose can
/// never be replayed for another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    EmailVerify,
    PasswordChange,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::EmailVerify => "email_verify",
            OtpPurpose::PasswordChange => "password_change",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email_verify" => Some(OtpPurpose::EmailVerify),
            "password_change" => Some(OtpPurpose::PasswordChange),
            _ => None,
        }
    }
}

/// OTP challenge entity. At most one unconsumed, unexpired challenge exists
/// per (email, purpose); issuing a new one supersedes the prior one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpChallenge {
    pub challenge_id: Uuid,
    /// Stored lowercase.
    pub email: String,
    pub purpose: OtpPurpose,
    pub code_hash: String,
    pub attempts_remaining: i32,
    pub consumed: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OtpChallenge {
    pub fn new(
        email: String,
        purpose: OtpPurpose,
        code_hash: String,
        ttl_minutes: i64,
        max_attempts: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            challenge_id: Uuid::new_v4(),
            email,
            purpose,
            code_hash,
            attempts_remaining: max_attempts,
            consumed: false,
            created_at: now,
            expires_at: now + Duration::minutes(ttl_minutes),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}
