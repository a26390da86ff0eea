//! User model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::GlobalRole;

/// User entity. Users are never deleted by this core, only deactivated by
/// the surrounding application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: Uuid,
    /// Stored lowercase; unique case-insensitively.
    pub email: String,
    pub password_hash: String,
    pub email_verified: bool,
    pub global_role: GlobalRole,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: String, password_hash: String, display_name: Option<String>) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            email,
            password_hash,
            email_verified: false,
            global_role: GlobalRole::None,
            display_name,
            created_at: Utc::now(),
        }
    }
}

/// User shape safe to return to callers; never carries the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub user_id: Uuid,
    pub email: String,
    pub email_verified: bool,
    pub global_role: GlobalRole,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            user_id: u.user_id,
            email: u.email,
            email_verified: u.email_verified,
            global_role: u.global_role,
            display_name: u.display_name,
            created_at: u.created_at,
        }
    }
}
