//! Persistence layer.
//!
//! All engines talk to [`IdentityStore`]; the production implementation is
//! [`postgres::PgStore`] and tests run against [`memory::MemoryStore`].
//!
//! Contract notes for implementors:
//!
//! - `put_*` operations supersede any prior unconsumed record for the same
//!   key in a single atomic step.
//! - `spend_*`, `consume_*`, and `resolve_*` operations are conditional
//!   compare-and-mark updates: under concurrent calls, exactly one caller
//!   observes success.
//! - `update_role_guarded` and `remove_membership_guarded` enforce the
//!   at-least-one-owner invariant atomically against concurrent role changes
//!   on the same scope.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{
    AccessSession, GlobalRole, Invite, InviteStatus, Membership, Organization, OtpChallenge,
    OtpPurpose, RecoveryToken, Role, ScopeRef, User, Workspace,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Ping the backing store.
    async fn health_check(&self) -> Result<(), CoreError>;

    // ==================== Users ====================

    /// Insert a new user. Fails with `EmailTaken` when the email is already
    /// registered (case-insensitive).
    async fn insert_user(&self, user: &User) -> Result<(), CoreError>;

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, CoreError>;

    /// Lookup by normalized (lowercase) email.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, CoreError>;

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str)
        -> Result<(), CoreError>;

    async fn set_email_verified(&self, user_id: Uuid) -> Result<(), CoreError>;

    /// Grant or clear the application-wide role. Reserved for operator
    /// tooling; no request handler exposes it.
    async fn set_global_role(&self, user_id: Uuid, role: GlobalRole) -> Result<(), CoreError>;

    // ==================== Scopes ====================

    /// Insert an organization together with its initial owner membership.
    async fn insert_organization(
        &self,
        org: &Organization,
        owner: &Membership,
    ) -> Result<(), CoreError>;

    async fn find_organization(&self, org_id: Uuid) -> Result<Option<Organization>, CoreError>;

    async fn list_organizations(&self, org_ids: &[Uuid]) -> Result<Vec<Organization>, CoreError>;

    /// Insert a workspace together with its initial owner memberships.
    async fn insert_workspace(
        &self,
        workspace: &Workspace,
        owners: &[Membership],
    ) -> Result<(), CoreError>;

    async fn find_workspace(&self, workspace_id: Uuid) -> Result<Option<Workspace>, CoreError>;

    // ==================== Memberships ====================

    /// Insert a membership. Fails with `AlreadyMember` when the user already
    /// holds a role at the scope.
    async fn insert_membership(&self, membership: &Membership) -> Result<(), CoreError>;

    async fn find_membership(
        &self,
        user_id: Uuid,
        scope: ScopeRef,
    ) -> Result<Option<Membership>, CoreError>;

    async fn list_memberships_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Membership>, CoreError>;

    async fn list_members_of_scope(&self, scope: ScopeRef) -> Result<Vec<Membership>, CoreError>;

    /// Change a member's role, refusing with `SelfDemotionBlocked` when the
    /// change would leave the scope without an owner.
    async fn update_role_guarded(
        &self,
        scope: ScopeRef,
        target_user_id: Uuid,
        new_role: Role,
    ) -> Result<Membership, CoreError>;

    /// Remove a member, refusing with `SelfDemotionBlocked` when the removal
    /// would leave the scope without an owner.
    async fn remove_membership_guarded(
        &self,
        scope: ScopeRef,
        target_user_id: Uuid,
    ) -> Result<(), CoreError>;

    // ==================== OTP challenges ====================

    /// Store a challenge, superseding any prior one for (email, purpose).
    async fn put_challenge(&self, challenge: &OtpChallenge) -> Result<(), CoreError>;

    async fn find_challenge(
        &self,
        email: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<OtpChallenge>, CoreError>;

    /// Atomically decrement `attempts_remaining` for an unconsumed challenge
    /// with attempts left, returning the updated record. Returns `None` when
    /// the challenge was consumed, superseded, or exhausted in the meantime.
    async fn spend_challenge_attempt(
        &self,
        email: &str,
        purpose: OtpPurpose,
        challenge_id: Uuid,
    ) -> Result<Option<OtpChallenge>, CoreError>;

    /// Compare-and-mark consumed. `Ok(true)` for exactly one caller.
    async fn consume_challenge(
        &self,
        email: &str,
        purpose: OtpPurpose,
        challenge_id: Uuid,
    ) -> Result<bool, CoreError>;

    /// Drop an expired challenge.
    async fn discard_challenge(
        &self,
        email: &str,
        purpose: OtpPurpose,
        challenge_id: Uuid,
    ) -> Result<(), CoreError>;

    // ==================== Recovery tokens ====================

    /// Store a recovery token, superseding any prior one for the email.
    async fn put_recovery_token(&self, token: &RecoveryToken) -> Result<(), CoreError>;

    async fn find_recovery_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RecoveryToken>, CoreError>;

    /// Compare-and-mark consumed. `Ok(true)` for exactly one caller.
    async fn consume_recovery_token(
        &self,
        email: &str,
        token_id: Uuid,
    ) -> Result<bool, CoreError>;

    /// Drop an expired recovery token.
    async fn discard_recovery_token(&self, email: &str, token_id: Uuid)
        -> Result<(), CoreError>;

    // ==================== Invites ====================

    /// Insert an invite. Fails with `DuplicatePending` when an unexpired
    /// pending invite already exists for (scope, email); a stale pending
    /// invite is expired and replaced in the same step.
    async fn insert_invite(&self, invite: &Invite) -> Result<(), CoreError>;

    async fn find_invite(&self, invite_id: Uuid) -> Result<Option<Invite>, CoreError>;

    async fn find_invite_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Invite>, CoreError>;

    /// Compare-and-mark: transition a pending invite to a terminal status.
    /// `Ok(true)` for exactly one caller; `Ok(false)` when no longer pending.
    async fn resolve_invite(&self, invite_id: Uuid, to: InviteStatus) -> Result<bool, CoreError>;

    async fn list_invites_for_scope(&self, scope: ScopeRef) -> Result<Vec<Invite>, CoreError>;

    // ==================== Sessions ====================

    async fn insert_session(&self, session: &AccessSession) -> Result<(), CoreError>;

    async fn find_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<AccessSession>, CoreError>;

    /// Mark a session revoked. Returns whether a live session was revoked.
    async fn revoke_session(&self, token_hash: &str) -> Result<bool, CoreError>;

    /// Revoke every session of a user, optionally sparing one (the caller's
    /// current session during a password change).
    async fn revoke_sessions_for_user(
        &self,
        user_id: Uuid,
        keep_session: Option<Uuid>,
    ) -> Result<u64, CoreError>;
}
