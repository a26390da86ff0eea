//! Recovery token model - long random single-use tokens delivered via
//! emailed links for the forgot-password flow.
//!
//! Unlike OTP challenges there is no attempt counter; 256 bits of entropy
//! substitute for brute-force throttling since the token arrives out-of-band
//! inside a link rather than being typed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Recovery token entity. At most one unconsumed token exists per email;
/// issuing a new one supersedes the prior one.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecoveryToken {
    pub token_id: Uuid,
    /// Stored lowercase.
    pub email: String,
    /// The raw token is shown only once, inside the emailed link.
    pub token_hash: String,
    pub consumed: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RecoveryToken {
    pub fn new(email: String, token_hash: String, ttl_minutes: i64) -> Self {
        let now = Utc::now();
        Self {
            token_id: Uuid::new_v4(),
            email,
            token_hash,
            consumed: false,
            created_at: now,
            expires_at: now + Duration::minutes(ttl_minutes),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}
