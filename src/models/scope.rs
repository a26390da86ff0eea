//! Scope references - the unit at which role membership is granted.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeType {
    Organization,
    Workspace,
}

impl ScopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeType::Organization => "organization",
            ScopeType::Workspace => "workspace",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "organization" => Some(ScopeType::Organization),
            "workspace" => Some(ScopeType::Workspace),
            _ => None,
        }
    }

    /// Roles that may be held at this scope type.
    pub fn allowed_roles(&self) -> &'static [crate::models::Role] {
        use crate::models::Role;
        match self {
            ScopeType::Organization => &[Role::Owner, Role::Admin, Role::Member],
            ScopeType::Workspace => &[Role::Owner, Role::Admin, Role::Member],
        }
    }
}

/// A concrete scope: an organization or a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeRef {
    pub scope_type: ScopeType,
    pub scope_id: Uuid,
}

impl ScopeRef {
    pub fn organization(scope_id: Uuid) -> Self {
        Self {
            scope_type: ScopeType::Organization,
            scope_id,
        }
    }

    pub fn workspace(scope_id: Uuid) -> Self {
        Self {
            scope_type: ScopeType::Workspace,
            scope_id,
        }
    }
}
