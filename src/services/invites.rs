//! Invite lifecycle manager.
//!
//! State machine: `pending -> accepted | revoked | expired`, all terminal.
//! Expiry is applied lazily on read; no background sweep is required for
//! correctness.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{Invite, InviteStatus, Membership, Permission, Role, ScopeRef, ScopeType};
use crate::services::authz::AuthorizationGate;
use crate::services::notify::Notifier;
use crate::store::IdentityStore;
use crate::utils::{generate_token, normalize_email, sha256_hex};

const INVITE_TTL_HOURS: i64 = 168; // 7 days

#[derive(Clone)]
pub struct InviteLifecycleManager {
    store: Arc<dyn IdentityStore>,
    gate: AuthorizationGate,
    notifier: Arc<dyn Notifier>,
}

impl InviteLifecycleManager {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        gate: AuthorizationGate,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            gate,
            notifier,
        }
    }

    /// Create an invite and email its single-use token to the invitee.
    #[tracing::instrument(skip(self), fields(scope_id = %scope.scope_id))]
    pub async fn create(
        &self,
        acting_user_id: Uuid,
        scope: ScopeRef,
        invitee_email: &str,
        role: Role,
    ) -> Result<(Invite, String), CoreError> {
        self.gate
            .require(acting_user_id, scope, Permission::InviteMembers)
            .await?;
        self.ensure_scope_exists(scope).await?;
        if !scope.scope_type.allowed_roles().contains(&role) {
            return Err(CoreError::InvalidRole);
        }

        let email = normalize_email(invitee_email);
        let token = generate_token();
        let invite = Invite::new(
            scope,
            email.clone(),
            role,
            sha256_hex(&token),
            acting_user_id,
            INVITE_TTL_HOURS,
        );
        self.store.insert_invite(&invite).await?;
        self.notifier
            .send_invite(&email, &token, scope.scope_type, role)
            .await?;

        tracing::info!(invite_id = %invite.invite_id, "Invite created");
        Ok((invite, token))
    }

    /// Accept an invite by token, materializing the membership.
    ///
    /// The close-out is idempotent: if the accepting user already holds a
    /// role at the scope, `AlreadyMember` is surfaced but the invite still
    /// transitions to `accepted`.
    #[tracing::instrument(skip(self, token))]
    pub async fn accept(
        &self,
        token: &str,
        accepting_user_id: Uuid,
    ) -> Result<Membership, CoreError> {
        let invite = self
            .store
            .find_invite_by_token_hash(&sha256_hex(token))
            .await?
            .ok_or(CoreError::NotFound("invite"))?;
        let invite = self.apply_lazy_expiry(invite).await?;

        if invite.status == InviteStatus::Expired {
            return Err(CoreError::Expired("invite"));
        }
        if invite.status != InviteStatus::Pending {
            return Err(CoreError::AlreadyResolved);
        }
        if !self
            .store
            .resolve_invite(invite.invite_id, InviteStatus::Accepted)
            .await?
        {
            return Err(CoreError::AlreadyResolved);
        }

        let membership = Membership::new(accepting_user_id, invite.scope, invite.role);
        self.store.insert_membership(&membership).await?;

        tracing::info!(
            invite_id = %invite.invite_id,
            user_id = %accepting_user_id,
            "Invite accepted"
        );
        Ok(membership)
    }

    /// Revoke a pending invite. Requires the same permission as creating one.
    #[tracing::instrument(skip(self))]
    pub async fn revoke(&self, acting_user_id: Uuid, invite_id: Uuid) -> Result<(), CoreError> {
        let invite = self
            .store
            .find_invite(invite_id)
            .await?
            .ok_or(CoreError::NotFound("invite"))?;
        self.gate
            .require(acting_user_id, invite.scope, Permission::InviteMembers)
            .await?;

        let invite = self.apply_lazy_expiry(invite).await?;
        if invite.status == InviteStatus::Expired {
            return Err(CoreError::Expired("invite"));
        }
        if invite.status != InviteStatus::Pending {
            return Err(CoreError::AlreadyResolved);
        }
        if !self
            .store
            .resolve_invite(invite_id, InviteStatus::Revoked)
            .await?
        {
            return Err(CoreError::AlreadyResolved);
        }

        tracing::info!(invite_id = %invite_id, "Invite revoked");
        Ok(())
    }

    /// List a scope's invites, surfacing lazy expiry.
    pub async fn list_for_scope(
        &self,
        acting_user_id: Uuid,
        scope: ScopeRef,
    ) -> Result<Vec<Invite>, CoreError> {
        self.gate
            .require(acting_user_id, scope, Permission::InviteMembers)
            .await?;
        let mut invites = Vec::new();
        for invite in self.store.list_invites_for_scope(scope).await? {
            invites.push(self.apply_lazy_expiry(invite).await?);
        }
        Ok(invites)
    }

    /// Surface an overdue pending invite as expired, persisting the
    /// transition on this read.
    async fn apply_lazy_expiry(&self, mut invite: Invite) -> Result<Invite, CoreError> {
        if invite.is_pending() && invite.is_expired() {
            self.store
                .resolve_invite(invite.invite_id, InviteStatus::Expired)
                .await?;
            invite.status = InviteStatus::Expired;
        }
        Ok(invite)
    }

    async fn ensure_scope_exists(&self, scope: ScopeRef) -> Result<(), CoreError> {
        match scope.scope_type {
            ScopeType::Organization => self
                .store
                .find_organization(scope.scope_id)
                .await?
                .map(|_| ())
                .ok_or(CoreError::NotFound("organization")),
            ScopeType::Workspace => self
                .store
                .find_workspace(scope.scope_id)
                .await?
                .map(|_| ())
                .ok_or(CoreError::NotFound("workspace")),
        }
    }
}
