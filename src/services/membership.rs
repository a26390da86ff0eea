//! Membership graph.
//!
//! Stores user↔scope role assignments and resolves effective permissions.
//! Workspace membership is independent of organization membership: holding a
//! role in an organization grants nothing at its workspaces unless an
//! org-owner action materializes a workspace membership (as workspace
//! creation does for org owners).

use std::sync::Arc;

use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{
    GlobalRole, Membership, Organization, Permission, Role, ScopeRef, ScopeType, Workspace,
    role::ALL_PERMISSIONS,
};
use crate::store::IdentityStore;

#[derive(Clone)]
pub struct MembershipGraph {
    store: Arc<dyn IdentityStore>,
}

impl MembershipGraph {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// The role a user holds at a scope, if any.
    pub async fn role_at(
        &self,
        user_id: Uuid,
        scope: ScopeRef,
    ) -> Result<Option<Role>, CoreError> {
        Ok(self
            .store
            .find_membership(user_id, scope)
            .await?
            .map(|m| m.role))
    }

    /// The resolved permission set of a user at a scope.
    ///
    /// Global admins hold every permission everywhere; otherwise the static
    /// role→permission mapping applies and non-members resolve to nothing.
    pub async fn effective_permissions(
        &self,
        user_id: Uuid,
        scope: ScopeRef,
    ) -> Result<&'static [Permission], CoreError> {
        if let Some(user) = self.store.find_user_by_id(user_id).await? {
            if user.global_role == GlobalRole::Admin {
                return Ok(ALL_PERMISSIONS);
            }
        }
        Ok(match self.role_at(user_id, scope).await? {
            Some(role) => role.permissions(),
            None => &[],
        })
    }

    pub async fn has_permission(
        &self,
        user_id: Uuid,
        scope: ScopeRef,
        permission: Permission,
    ) -> Result<bool, CoreError> {
        Ok(self
            .effective_permissions(user_id, scope)
            .await?
            .contains(&permission))
    }

    /// Change a member's role.
    ///
    /// Requires `ManageRoles` at the scope; the store refuses atomically if
    /// the change would leave the scope without an owner.
    #[tracing::instrument(skip(self))]
    pub async fn change_role(
        &self,
        acting_user_id: Uuid,
        target_user_id: Uuid,
        scope: ScopeRef,
        new_role: Role,
    ) -> Result<Membership, CoreError> {
        if !self
            .has_permission(acting_user_id, scope, Permission::ManageRoles)
            .await?
        {
            return Err(CoreError::Forbidden);
        }
        if !scope.scope_type.allowed_roles().contains(&new_role) {
            return Err(CoreError::InvalidRole);
        }

        let updated = self
            .store
            .update_role_guarded(scope, target_user_id, new_role)
            .await?;
        tracing::info!(
            target_user_id = %target_user_id,
            new_role = new_role.as_str(),
            "Role changed"
        );
        Ok(updated)
    }

    /// Remove a member from a scope.
    ///
    /// Requires `RemoveMembers`, except that users may always remove
    /// themselves. Either way the last owner cannot leave.
    #[tracing::instrument(skip(self))]
    pub async fn remove_member(
        &self,
        acting_user_id: Uuid,
        target_user_id: Uuid,
        scope: ScopeRef,
    ) -> Result<(), CoreError> {
        let self_removal = acting_user_id == target_user_id;
        if !self_removal
            && !self
                .has_permission(acting_user_id, scope, Permission::RemoveMembers)
                .await?
        {
            return Err(CoreError::Forbidden);
        }

        self.store
            .remove_membership_guarded(scope, target_user_id)
            .await?;
        tracing::info!(target_user_id = %target_user_id, "Member removed");
        Ok(())
    }

    /// Create an organization; the creator becomes its owner.
    #[tracing::instrument(skip(self, name))]
    pub async fn create_organization(
        &self,
        creator_user_id: Uuid,
        name: String,
    ) -> Result<Organization, CoreError> {
        let org = Organization::new(name, creator_user_id);
        let owner = Membership::new(
            creator_user_id,
            ScopeRef::organization(org.org_id),
            Role::Owner,
        );
        self.store.insert_organization(&org, &owner).await?;
        tracing::info!(org_id = %org.org_id, "Organization created");
        Ok(org)
    }

    /// Create a workspace under an organization.
    ///
    /// Requires `CreateWorkspaces` at the organization. The creator and
    /// every current org owner are materialized as workspace owners; no
    /// other workspace membership is inherited.
    #[tracing::instrument(skip(self, name))]
    pub async fn create_workspace(
        &self,
        acting_user_id: Uuid,
        org_id: Uuid,
        name: String,
    ) -> Result<Workspace, CoreError> {
        let org_scope = ScopeRef::organization(org_id);
        self.store
            .find_organization(org_id)
            .await?
            .ok_or(CoreError::NotFound("organization"))?;
        if !self
            .has_permission(acting_user_id, org_scope, Permission::CreateWorkspaces)
            .await?
        {
            return Err(CoreError::Forbidden);
        }

        let workspace = Workspace::new(org_id, name, acting_user_id);
        let ws_scope = ScopeRef::workspace(workspace.workspace_id);

        let mut owners = vec![Membership::new(acting_user_id, ws_scope, Role::Owner)];
        for member in self.store.list_members_of_scope(org_scope).await? {
            if member.role == Role::Owner && member.user_id != acting_user_id {
                owners.push(Membership::new(member.user_id, ws_scope, Role::Owner));
            }
        }

        self.store.insert_workspace(&workspace, &owners).await?;
        tracing::info!(workspace_id = %workspace.workspace_id, org_id = %org_id, "Workspace created");
        Ok(workspace)
    }

    /// Organizations the user belongs to, for the reporting/UI surface.
    pub async fn organizations_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Organization>, CoreError> {
        let org_ids: Vec<Uuid> = self
            .store
            .list_memberships_for_user(user_id)
            .await?
            .into_iter()
            .filter(|m| m.scope.scope_type == ScopeType::Organization)
            .map(|m| m.scope.scope_id)
            .collect();
        self.store.list_organizations(&org_ids).await
    }

    /// All memberships of a user across scopes.
    pub async fn memberships_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Membership>, CoreError> {
        self.store.list_memberships_for_user(user_id).await
    }
}
