//! Authorization gate.
//!
//! The single guard surrounding code calls before any mutating operation:
//! resolve the caller's effective permissions at the scope and refuse with
//! `Forbidden` when the required permission is missing.

use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{Permission, ScopeRef};
use crate::services::membership::MembershipGraph;

#[derive(Clone)]
pub struct AuthorizationGate {
    graph: MembershipGraph,
}

impl AuthorizationGate {
    pub fn new(graph: MembershipGraph) -> Self {
        Self { graph }
    }

    pub async fn require(
        &self,
        user_id: Uuid,
        scope: ScopeRef,
        permission: Permission,
    ) -> Result<(), CoreError> {
        if self.graph.has_permission(user_id, scope, permission).await? {
            Ok(())
        } else {
            tracing::debug!(
                user_id = %user_id,
                scope_id = %scope.scope_id,
                permission = ?permission,
                "Permission denied"
            );
            Err(CoreError::Forbidden)
        }
    }
}
