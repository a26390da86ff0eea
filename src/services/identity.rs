//! The identity facade.
//!
//! Composes the engines into the operations the surrounding request
//! handlers call. Authentication runs through the session token manager,
//! authorization through the gate; credential-recovery flows work without a
//! session. No ambient "current user" exists anywhere - the session token is
//! explicit on every authenticated call.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{
    AccessSession, Invite, Membership, Organization, OtpPurpose, Role, ScopeRef, User, Workspace,
};
use crate::services::authz::AuthorizationGate;
use crate::services::credentials::CredentialStore;
use crate::services::invites::InviteLifecycleManager;
use crate::services::membership::MembershipGraph;
use crate::services::notify::Notifier;
use crate::services::otp::{OtpChallengeEngine, MIN_PASSWORD_LENGTH};
use crate::services::recovery::RecoveryTokenEngine;
use crate::services::sessions::SessionTokenManager;
use crate::store::IdentityStore;
use crate::utils::normalize_email;

#[derive(Clone)]
pub struct IdentityService {
    store: Arc<dyn IdentityStore>,
    credentials: CredentialStore,
    otp: OtpChallengeEngine,
    recovery: RecoveryTokenEngine,
    sessions: SessionTokenManager,
    graph: MembershipGraph,
    gate: AuthorizationGate,
    invites: InviteLifecycleManager,
}

impl IdentityService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        notifier: Arc<dyn Notifier>,
        session_ttl_hours: i64,
    ) -> Result<Self, CoreError> {
        let credentials = CredentialStore::new(store.clone())?;
        let otp = OtpChallengeEngine::new(store.clone(), notifier.clone(), credentials.clone());
        let recovery =
            RecoveryTokenEngine::new(store.clone(), notifier.clone(), credentials.clone());
        let sessions =
            SessionTokenManager::new(store.clone(), credentials.clone(), session_ttl_hours);
        let graph = MembershipGraph::new(store.clone());
        let gate = AuthorizationGate::new(graph.clone());
        let invites = InviteLifecycleManager::new(store.clone(), gate.clone(), notifier);

        Ok(Self {
            store,
            credentials,
            otp,
            recovery,
            sessions,
            graph,
            gate,
            invites,
        })
    }

    pub fn gate(&self) -> &AuthorizationGate {
        &self.gate
    }

    pub fn graph(&self) -> &MembershipGraph {
        &self.graph
    }

    // ==================== Registration & sessions ====================

    /// Register a new user and issue an email-verification code.
    #[tracing::instrument(skip(self, password, display_name))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<String>,
    ) -> Result<User, CoreError> {
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(CoreError::BadRequest(format!(
                "password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
        let email = normalize_email(email);
        let password_hash = self.credentials.hash(password)?;
        let user = User::new(email.clone(), password_hash, display_name);
        self.store.insert_user(&user).await?;

        tracing::info!(user_id = %user.user_id, "User registered");

        self.otp.request(&email, OtpPurpose::EmailVerify).await?;
        Ok(user)
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(String, AccessSession), CoreError> {
        self.sessions.authenticate(email, password).await
    }

    pub async fn logout(&self, session_token: &str) -> Result<(), CoreError> {
        self.sessions.revoke(session_token).await
    }

    /// The authenticated user behind a session token.
    pub async fn current_user(&self, session_token: &str) -> Result<User, CoreError> {
        let session = self.sessions.validate(session_token).await?;
        self.store
            .find_user_by_id(session.user_id)
            .await?
            .ok_or(CoreError::NotFound("user"))
    }

    /// Change the password of a logged-in user who knows the current one.
    ///
    /// Every other session of the user is revoked; the current one stays
    /// live.
    #[tracing::instrument(skip_all)]
    pub async fn change_password(
        &self,
        session_token: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), CoreError> {
        let session = self.sessions.validate(session_token).await?;
        let user = self
            .store
            .find_user_by_id(session.user_id)
            .await?
            .ok_or(CoreError::NotFound("user"))?;
        if !self
            .credentials
            .verify(current_password, &user.password_hash)?
        {
            return Err(CoreError::InvalidCredentials);
        }
        if new_password.len() < MIN_PASSWORD_LENGTH {
            return Err(CoreError::BadRequest(format!(
                "password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }

        self.credentials
            .set_password(user.user_id, new_password)
            .await?;
        self.sessions
            .revoke_all_for_user(user.user_id, Some(session.session_id))
            .await?;

        tracing::info!(user_id = %user.user_id, "Password changed");
        Ok(())
    }

    // ==================== Credential recovery ====================

    /// Always reports success, even for unknown emails.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), CoreError> {
        self.recovery.issue(email).await
    }

    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), CoreError> {
        self.recovery.consume(token, new_password).await
    }

    pub async fn request_otp(&self, email: &str, purpose: OtpPurpose) -> Result<(), CoreError> {
        self.otp.request(email, purpose).await
    }

    /// Verify an OTP code. `new_password` is required for the
    /// `password_change` purpose and ignored otherwise.
    pub async fn verify_otp(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code: &str,
        new_password: Option<&str>,
    ) -> Result<(), CoreError> {
        self.otp.verify(email, purpose, code, new_password).await
    }

    // ==================== Scopes & roles ====================

    pub async fn create_organization(
        &self,
        session_token: &str,
        name: String,
    ) -> Result<Organization, CoreError> {
        let session = self.sessions.validate(session_token).await?;
        self.graph.create_organization(session.user_id, name).await
    }

    pub async fn create_workspace(
        &self,
        session_token: &str,
        org_id: Uuid,
        name: String,
    ) -> Result<Workspace, CoreError> {
        let session = self.sessions.validate(session_token).await?;
        self.graph
            .create_workspace(session.user_id, org_id, name)
            .await
    }

    pub async fn change_role(
        &self,
        session_token: &str,
        target_user_id: Uuid,
        scope: ScopeRef,
        new_role: Role,
    ) -> Result<Membership, CoreError> {
        let session = self.sessions.validate(session_token).await?;
        self.graph
            .change_role(session.user_id, target_user_id, scope, new_role)
            .await
    }

    pub async fn remove_member(
        &self,
        session_token: &str,
        target_user_id: Uuid,
        scope: ScopeRef,
    ) -> Result<(), CoreError> {
        let session = self.sessions.validate(session_token).await?;
        self.graph
            .remove_member(session.user_id, target_user_id, scope)
            .await
    }

    pub async fn list_organizations(
        &self,
        session_token: &str,
    ) -> Result<Vec<Organization>, CoreError> {
        let session = self.sessions.validate(session_token).await?;
        self.graph.organizations_for_user(session.user_id).await
    }

    pub async fn list_memberships(
        &self,
        session_token: &str,
    ) -> Result<Vec<Membership>, CoreError> {
        let session = self.sessions.validate(session_token).await?;
        self.graph.memberships_for_user(session.user_id).await
    }

    // ==================== Invites ====================

    pub async fn create_invite(
        &self,
        session_token: &str,
        scope: ScopeRef,
        invitee_email: &str,
        role: Role,
    ) -> Result<(Invite, String), CoreError> {
        let session = self.sessions.validate(session_token).await?;
        self.invites
            .create(session.user_id, scope, invitee_email, role)
            .await
    }

    pub async fn accept_invite(
        &self,
        invite_token: &str,
        session_token: &str,
    ) -> Result<Membership, CoreError> {
        let session = self.sessions.validate(session_token).await?;
        self.invites.accept(invite_token, session.user_id).await
    }

    pub async fn revoke_invite(
        &self,
        session_token: &str,
        invite_id: Uuid,
    ) -> Result<(), CoreError> {
        let session = self.sessions.validate(session_token).await?;
        self.invites.revoke(session.user_id, invite_id).await
    }

    pub async fn list_invites(
        &self,
        session_token: &str,
        scope: ScopeRef,
    ) -> Result<Vec<Invite>, CoreError> {
        let session = self.sessions.validate(session_token).await?;
        self.invites.list_for_scope(session.user_id, scope).await
    }
}
