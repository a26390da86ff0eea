//! Roles and the closed permission enumeration.
//!
//! Permissions are a fixed enum rather than free-form strings so a typo can
//! never silently grant nothing; the role→permission mapping is static.

use serde::{Deserialize, Serialize};

/// Role held at a single scope (organization or workspace).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(Role::Owner),
            "admin" => Some(Role::Admin),
            "member" => Some(Role::Member),
            _ => None,
        }
    }

    /// Permissions granted by this role at its scope.
    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            Role::Owner => &[
                Permission::ViewScope,
                Permission::ManageTasks,
                Permission::CreateWorkspaces,
                Permission::InviteMembers,
                Permission::RemoveMembers,
                Permission::ManageRoles,
                Permission::DeleteScope,
            ],
            Role::Admin => &[
                Permission::ViewScope,
                Permission::ManageTasks,
                Permission::CreateWorkspaces,
                Permission::InviteMembers,
                Permission::RemoveMembers,
            ],
            Role::Member => &[Permission::ViewScope, Permission::ManageTasks],
        }
    }

    pub fn grants(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}

/// Application-wide role, independent of any scope membership.
///
/// `Admin` resolves to the full permission set at every scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlobalRole {
    None,
    Admin,
}

impl GlobalRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlobalRole::None => "none",
            GlobalRole::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(GlobalRole::None),
            "admin" => Some(GlobalRole::Admin),
            _ => None,
        }
    }
}

impl Default for GlobalRole {
    fn default() -> Self {
        GlobalRole::None
    }
}

/// Capabilities checked by the authorization gate before mutating calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewScope,
    ManageTasks,
    CreateWorkspaces,
    InviteMembers,
    RemoveMembers,
    ManageRoles,
    DeleteScope,
}

/// Every permission, in the order roles list them.
pub const ALL_PERMISSIONS: &[Permission] = &[
    Permission::ViewScope,
    Permission::ManageTasks,
    Permission::CreateWorkspaces,
    Permission::InviteMembers,
    Permission::RemoveMembers,
    Permission::ManageRoles,
    Permission::DeleteScope,
];
