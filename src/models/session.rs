//! Access session model.
//!
//! Session tokens are opaque to callers; validity is always re-checked
//! against this persisted record, never trusted from token contents, so
//! revocation takes effect immediately.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccessSession {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl AccessSession {
    pub fn new(user_id: Uuid, token_hash: String, ttl_hours: i64) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            user_id,
            token_hash,
            issued_at: now,
            expires_at: now + Duration::hours(ttl_hours),
            revoked: false,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        !self.revoked && !self.is_expired()
    }
}
