//! Membership model - user→scope role assignments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Role, ScopeRef};

/// A user's role at a single scope. A user holds at most one role per scope;
/// (user_id, scope) is the composite key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: Uuid,
    pub scope: ScopeRef,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(user_id: Uuid, scope: ScopeRef, role: Role) -> Self {
        Self {
            user_id,
            scope,
            role,
            joined_at: Utc::now(),
        }
    }
}
