//! Organization and workspace scope records.
//!
//! The core stores these only so memberships and invites have something to
//! anchor to; projects, tasks, and settings live with the surrounding
//! application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Organization {
    pub org_id: Uuid,
    pub name: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(name: String, created_by: Uuid) -> Self {
        Self {
            org_id: Uuid::new_v4(),
            name,
            created_by,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Workspace {
    pub workspace_id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Workspace {
    pub fn new(org_id: Uuid, name: String, created_by: Uuid) -> Self {
        Self {
            workspace_id: Uuid::new_v4(),
            org_id,
            name,
            created_by,
            created_at: Utc::now(),
        }
    }
}
