//! Invite model - pending memberships awaiting acceptance.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Role, ScopeRef};

/// Invite state. `pending` transitions to exactly one of the others, all of
/// which are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Revoked,
    Expired,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending => "pending",
            InviteStatus::Accepted => "accepted",
            InviteStatus::Revoked => "revoked",
            InviteStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InviteStatus::Pending),
            "accepted" => Some(InviteStatus::Accepted),
            "revoked" => Some(InviteStatus::Revoked),
            "expired" => Some(InviteStatus::Expired),
            _ => None,
        }
    }
}

/// Invite entity. At most one pending invite exists per (scope, email).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invite {
    pub invite_id: Uuid,
    pub scope: ScopeRef,
    /// Invitee email, stored lowercase.
    pub email: String,
    pub role: Role,
    pub token_hash: String,
    pub status: InviteStatus,
    pub invited_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Invite {
    pub fn new(
        scope: ScopeRef,
        email: String,
        role: Role,
        token_hash: String,
        invited_by: Uuid,
        ttl_hours: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            invite_id: Uuid::new_v4(),
            scope,
            email,
            role,
            token_hash,
            status: InviteStatus::Pending,
            invited_by,
            created_at: now,
            expires_at: now + Duration::hours(ttl_hours),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == InviteStatus::Pending
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}
