//! In-memory store backed by dashmap.
//!
//! Used by the test suite and by local development without a database. Every
//! compare-and-mark operation runs inside a single dashmap entry guard, so
//! concurrent callers serialize per key and exactly one of them observes the
//! conditional update succeeding.
//!
//! Lock discipline: no method holds two entry guards at once, except
//! `insert_user`/`insert_membership`-style paths where the secondary map is
//! only ever locked while holding the primary guard (one fixed order, no
//! inversion anywhere).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{
    AccessSession, GlobalRole, Invite, InviteStatus, Membership, Organization, OtpChallenge,
    OtpPurpose, RecoveryToken, Role, ScopeRef, User, Workspace,
};
use crate::store::IdentityStore;

#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<Uuid, User>,
    users_by_email: DashMap<String, Uuid>,
    organizations: DashMap<Uuid, Organization>,
    workspaces: DashMap<Uuid, Workspace>,
    memberships: DashMap<ScopeRef, HashMap<Uuid, Membership>>,
    challenges: DashMap<(String, OtpPurpose), OtpChallenge>,
    recovery_tokens: DashMap<String, RecoveryToken>,
    invites: DashMap<Uuid, Invite>,
    invites_by_hash: DashMap<String, Uuid>,
    /// (scope, email) -> (invite_id, expires_at) for the pending invite.
    pending_invites: DashMap<(ScopeRef, String), (Uuid, DateTime<Utc>)>,
    sessions: DashMap<String, AccessSession>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn owner_count(members: &HashMap<Uuid, Membership>) -> usize {
        members.values().filter(|m| m.role == Role::Owner).count()
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn health_check(&self) -> Result<(), CoreError> {
        Ok(())
    }

    // ==================== Users ====================

    async fn insert_user(&self, user: &User) -> Result<(), CoreError> {
        match self.users_by_email.entry(user.email.clone()) {
            Entry::Occupied(_) => Err(CoreError::EmailTaken),
            Entry::Vacant(slot) => {
                slot.insert(user.user_id);
                self.users.insert(user.user_id, user.clone());
                Ok(())
            }
        }
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, CoreError> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, CoreError> {
        let Some(user_id) = self.users_by_email.get(email).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn set_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), CoreError> {
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or(CoreError::NotFound("user"))?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn set_email_verified(&self, user_id: Uuid) -> Result<(), CoreError> {
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or(CoreError::NotFound("user"))?;
        user.email_verified = true;
        Ok(())
    }

    async fn set_global_role(&self, user_id: Uuid, role: GlobalRole) -> Result<(), CoreError> {
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or(CoreError::NotFound("user"))?;
        user.global_role = role;
        Ok(())
    }

    // ==================== Scopes ====================

    async fn insert_organization(
        &self,
        org: &Organization,
        owner: &Membership,
    ) -> Result<(), CoreError> {
        self.organizations.insert(org.org_id, org.clone());
        self.memberships
            .entry(owner.scope)
            .or_default()
            .insert(owner.user_id, owner.clone());
        Ok(())
    }

    async fn find_organization(&self, org_id: Uuid) -> Result<Option<Organization>, CoreError> {
        Ok(self.organizations.get(&org_id).map(|o| o.clone()))
    }

    async fn list_organizations(&self, org_ids: &[Uuid]) -> Result<Vec<Organization>, CoreError> {
        let mut orgs: Vec<Organization> = org_ids
            .iter()
            .filter_map(|id| self.organizations.get(id).map(|o| o.clone()))
            .collect();
        orgs.sort_by_key(|o| o.created_at);
        Ok(orgs)
    }

    async fn insert_workspace(
        &self,
        workspace: &Workspace,
        owners: &[Membership],
    ) -> Result<(), CoreError> {
        self.workspaces.insert(workspace.workspace_id, workspace.clone());
        if let Some(first) = owners.first() {
            let mut members = self.memberships.entry(first.scope).or_default();
            for owner in owners {
                members.entry(owner.user_id).or_insert_with(|| owner.clone());
            }
        }
        Ok(())
    }

    async fn find_workspace(&self, workspace_id: Uuid) -> Result<Option<Workspace>, CoreError> {
        Ok(self.workspaces.get(&workspace_id).map(|w| w.clone()))
    }

    // ==================== Memberships ====================

    async fn insert_membership(&self, membership: &Membership) -> Result<(), CoreError> {
        let mut members = self.memberships.entry(membership.scope).or_default();
        if members.contains_key(&membership.user_id) {
            return Err(CoreError::AlreadyMember);
        }
        members.insert(membership.user_id, membership.clone());
        Ok(())
    }

    async fn find_membership(
        &self,
        user_id: Uuid,
        scope: ScopeRef,
    ) -> Result<Option<Membership>, CoreError> {
        Ok(self
            .memberships
            .get(&scope)
            .and_then(|members| members.get(&user_id).cloned()))
    }

    async fn list_memberships_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Membership>, CoreError> {
        let mut found = Vec::new();
        for entry in self.memberships.iter() {
            if let Some(m) = entry.value().get(&user_id) {
                found.push(m.clone());
            }
        }
        found.sort_by_key(|m| m.joined_at);
        Ok(found)
    }

    async fn list_members_of_scope(&self, scope: ScopeRef) -> Result<Vec<Membership>, CoreError> {
        let mut members: Vec<Membership> = self
            .memberships
            .get(&scope)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        members.sort_by_key(|m| m.joined_at);
        Ok(members)
    }

    async fn update_role_guarded(
        &self,
        scope: ScopeRef,
        target_user_id: Uuid,
        new_role: Role,
    ) -> Result<Membership, CoreError> {
        let mut members = self
            .memberships
            .get_mut(&scope)
            .ok_or(CoreError::NotFound("membership"))?;
        let owners = Self::owner_count(&members);
        let membership = members
            .get_mut(&target_user_id)
            .ok_or(CoreError::NotFound("membership"))?;
        if membership.role == Role::Owner && new_role != Role::Owner && owners <= 1 {
            return Err(CoreError::SelfDemotionBlocked);
        }
        membership.role = new_role;
        Ok(membership.clone())
    }

    async fn remove_membership_guarded(
        &self,
        scope: ScopeRef,
        target_user_id: Uuid,
    ) -> Result<(), CoreError> {
        let mut members = self
            .memberships
            .get_mut(&scope)
            .ok_or(CoreError::NotFound("membership"))?;
        let membership = members
            .get(&target_user_id)
            .ok_or(CoreError::NotFound("membership"))?;
        if membership.role == Role::Owner && Self::owner_count(&members) <= 1 {
            return Err(CoreError::SelfDemotionBlocked);
        }
        members.remove(&target_user_id);
        Ok(())
    }

    // ==================== OTP challenges ====================

    async fn put_challenge(&self, challenge: &OtpChallenge) -> Result<(), CoreError> {
        self.challenges.insert(
            (challenge.email.clone(), challenge.purpose),
            challenge.clone(),
        );
        Ok(())
    }

    async fn find_challenge(
        &self,
        email: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<OtpChallenge>, CoreError> {
        Ok(self
            .challenges
            .get(&(email.to_string(), purpose))
            .map(|c| c.clone()))
    }

    async fn spend_challenge_attempt(
        &self,
        email: &str,
        purpose: OtpPurpose,
        challenge_id: Uuid,
    ) -> Result<Option<OtpChallenge>, CoreError> {
        let Some(mut challenge) = self.challenges.get_mut(&(email.to_string(), purpose)) else {
            return Ok(None);
        };
        if challenge.challenge_id != challenge_id
            || challenge.consumed
            || challenge.attempts_remaining <= 0
        {
            return Ok(None);
        }
        challenge.attempts_remaining -= 1;
        Ok(Some(challenge.clone()))
    }

    async fn consume_challenge(
        &self,
        email: &str,
        purpose: OtpPurpose,
        challenge_id: Uuid,
    ) -> Result<bool, CoreError> {
        let Some(mut challenge) = self.challenges.get_mut(&(email.to_string(), purpose)) else {
            return Ok(false);
        };
        if challenge.challenge_id != challenge_id || challenge.consumed {
            return Ok(false);
        }
        challenge.consumed = true;
        Ok(true)
    }

    async fn discard_challenge(
        &self,
        email: &str,
        purpose: OtpPurpose,
        challenge_id: Uuid,
    ) -> Result<(), CoreError> {
        self.challenges
            .remove_if(&(email.to_string(), purpose), |_, c| {
                c.challenge_id == challenge_id
            });
        Ok(())
    }

    // ==================== Recovery tokens ====================

    async fn put_recovery_token(&self, token: &RecoveryToken) -> Result<(), CoreError> {
        self.recovery_tokens
            .insert(token.email.clone(), token.clone());
        Ok(())
    }

    async fn find_recovery_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RecoveryToken>, CoreError> {
        // Token hashes are high-entropy and few tokens are live at once; a
        // scan is fine here. The hash comparison also filters out records
        // that superseded the one the link was minted for.
        Ok(self
            .recovery_tokens
            .iter()
            .find(|entry| entry.value().token_hash == token_hash)
            .map(|entry| entry.value().clone()))
    }

    async fn consume_recovery_token(
        &self,
        email: &str,
        token_id: Uuid,
    ) -> Result<bool, CoreError> {
        let Some(mut token) = self.recovery_tokens.get_mut(email) else {
            return Ok(false);
        };
        if token.token_id != token_id || token.consumed {
            return Ok(false);
        }
        token.consumed = true;
        Ok(true)
    }

    async fn discard_recovery_token(
        &self,
        email: &str,
        token_id: Uuid,
    ) -> Result<(), CoreError> {
        self.recovery_tokens
            .remove_if(email, |_, t| t.token_id == token_id);
        Ok(())
    }

    // ==================== Invites ====================

    async fn insert_invite(&self, invite: &Invite) -> Result<(), CoreError> {
        let key = (invite.scope, invite.email.clone());
        let now = Utc::now();
        let superseded = match self.pending_invites.entry(key) {
            Entry::Occupied(mut slot) => {
                let (existing_id, expires_at) = *slot.get();
                if expires_at > now {
                    return Err(CoreError::DuplicatePending);
                }
                slot.insert((invite.invite_id, invite.expires_at));
                Some(existing_id)
            }
            Entry::Vacant(slot) => {
                slot.insert((invite.invite_id, invite.expires_at));
                None
            }
        };
        // The pending-index guard is released; the stale invite is no longer
        // reachable as pending, so flipping its status races with nothing.
        if let Some(stale_id) = superseded {
            if let Some(mut stale) = self.invites.get_mut(&stale_id) {
                if stale.status == InviteStatus::Pending {
                    stale.status = InviteStatus::Expired;
                }
            }
        }
        self.invites.insert(invite.invite_id, invite.clone());
        self.invites_by_hash
            .insert(invite.token_hash.clone(), invite.invite_id);
        Ok(())
    }

    async fn find_invite(&self, invite_id: Uuid) -> Result<Option<Invite>, CoreError> {
        Ok(self.invites.get(&invite_id).map(|i| i.clone()))
    }

    async fn find_invite_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Invite>, CoreError> {
        let Some(invite_id) = self.invites_by_hash.get(token_hash).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.invites.get(&invite_id).map(|i| i.clone()))
    }

    async fn resolve_invite(
        &self,
        invite_id: Uuid,
        to: InviteStatus,
    ) -> Result<bool, CoreError> {
        let resolved = {
            let Some(mut invite) = self.invites.get_mut(&invite_id) else {
                return Ok(false);
            };
            if invite.status != InviteStatus::Pending {
                return Ok(false);
            }
            invite.status = to;
            (invite.scope, invite.email.clone())
        };
        let (scope, email) = resolved;
        self.pending_invites
            .remove_if(&(scope, email), |_, (id, _)| *id == invite_id);
        Ok(true)
    }

    async fn list_invites_for_scope(&self, scope: ScopeRef) -> Result<Vec<Invite>, CoreError> {
        let mut invites: Vec<Invite> = self
            .invites
            .iter()
            .filter(|entry| entry.value().scope == scope)
            .map(|entry| entry.value().clone())
            .collect();
        invites.sort_by_key(|i| i.created_at);
        Ok(invites)
    }

    // ==================== Sessions ====================

    async fn insert_session(&self, session: &AccessSession) -> Result<(), CoreError> {
        self.sessions
            .insert(session.token_hash.clone(), session.clone());
        Ok(())
    }

    async fn find_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<AccessSession>, CoreError> {
        Ok(self.sessions.get(token_hash).map(|s| s.clone()))
    }

    async fn revoke_session(&self, token_hash: &str) -> Result<bool, CoreError> {
        let Some(mut session) = self.sessions.get_mut(token_hash) else {
            return Ok(false);
        };
        if session.revoked {
            return Ok(false);
        }
        session.revoked = true;
        Ok(true)
    }

    async fn revoke_sessions_for_user(
        &self,
        user_id: Uuid,
        keep_session: Option<Uuid>,
    ) -> Result<u64, CoreError> {
        let mut revoked = 0;
        for mut entry in self.sessions.iter_mut() {
            let session = entry.value_mut();
            if session.user_id == user_id
                && !session.revoked
                && keep_session != Some(session.session_id)
            {
                session.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}
