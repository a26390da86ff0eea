//! PostgreSQL store backed by sqlx.
//!
//! Compare-and-mark operations are expressed as conditional `UPDATE ...
//! WHERE` statements and decided by `rows_affected`; the last-owner
//! invariant runs inside a transaction that locks the scope's membership
//! rows first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{
    AccessSession, GlobalRole, Invite, InviteStatus, Membership, Organization, OtpChallenge,
    OtpPurpose, RecoveryToken, Role, ScopeRef, ScopeType, User, Workspace,
};
use crate::store::IdentityStore;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id UUID PRIMARY KEY,
    email TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    email_verified BOOLEAN NOT NULL DEFAULT FALSE,
    global_role TEXT NOT NULL DEFAULT 'none',
    display_name TEXT,
    created_at TIMESTAMPTZ NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS users_email_key ON users (LOWER(email));

CREATE TABLE IF NOT EXISTS organizations (
    org_id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    created_by UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS workspaces (
    workspace_id UUID PRIMARY KEY,
    org_id UUID NOT NULL REFERENCES organizations (org_id),
    name TEXT NOT NULL,
    created_by UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS memberships (
    user_id UUID NOT NULL,
    scope_type TEXT NOT NULL,
    scope_id UUID NOT NULL,
    role TEXT NOT NULL,
    joined_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (user_id, scope_type, scope_id)
);
CREATE INDEX IF NOT EXISTS memberships_scope_idx ON memberships (scope_type, scope_id);

CREATE TABLE IF NOT EXISTS otp_challenges (
    challenge_id UUID PRIMARY KEY,
    email TEXT NOT NULL,
    purpose TEXT NOT NULL,
    code_hash TEXT NOT NULL,
    attempts_remaining INT NOT NULL,
    consumed BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL,
    UNIQUE (email, purpose)
);

CREATE TABLE IF NOT EXISTS recovery_tokens (
    token_id UUID PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    token_hash TEXT NOT NULL,
    consumed BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS recovery_tokens_hash_idx ON recovery_tokens (token_hash);

CREATE TABLE IF NOT EXISTS invites (
    invite_id UUID PRIMARY KEY,
    scope_type TEXT NOT NULL,
    scope_id UUID NOT NULL,
    email TEXT NOT NULL,
    role TEXT NOT NULL,
    token_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    invited_by UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS invites_pending_key
    ON invites (scope_type, scope_id, LOWER(email)) WHERE status = 'pending';
CREATE INDEX IF NOT EXISTS invites_hash_idx ON invites (token_hash);

CREATE TABLE IF NOT EXISTS sessions (
    session_id UUID PRIMARY KEY,
    user_id UUID NOT NULL,
    token_hash TEXT NOT NULL UNIQUE,
    issued_at TIMESTAMPTZ NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL,
    revoked BOOLEAN NOT NULL DEFAULT FALSE
);
CREATE INDEX IF NOT EXISTS sessions_user_idx ON sessions (user_id);
"#;

/// PostgreSQL store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and ensure the schema exists.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, CoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), CoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Row types mirror the tables with string-coded enums; conversion into the
// typed models fails loudly on codes no release ever wrote.

#[derive(FromRow)]
struct UserRow {
    user_id: Uuid,
    email: String,
    password_hash: String,
    email_verified: bool,
    global_role: String,
    display_name: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = CoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let global_role = GlobalRole::parse(&row.global_role)
            .ok_or_else(|| internal(format!("unknown global role '{}'", row.global_role)))?;
        Ok(User {
            user_id: row.user_id,
            email: row.email,
            password_hash: row.password_hash,
            email_verified: row.email_verified,
            global_role,
            display_name: row.display_name,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct MembershipRow {
    user_id: Uuid,
    scope_type: String,
    scope_id: Uuid,
    role: String,
    joined_at: DateTime<Utc>,
}

impl TryFrom<MembershipRow> for Membership {
    type Error = CoreError;

    fn try_from(row: MembershipRow) -> Result<Self, Self::Error> {
        Ok(Membership {
            user_id: row.user_id,
            scope: ScopeRef {
                scope_type: parse_scope_type(&row.scope_type)?,
                scope_id: row.scope_id,
            },
            role: parse_role(&row.role)?,
            joined_at: row.joined_at,
        })
    }
}

#[derive(FromRow)]
struct ChallengeRow {
    challenge_id: Uuid,
    email: String,
    purpose: String,
    code_hash: String,
    attempts_remaining: i32,
    consumed: bool,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<ChallengeRow> for OtpChallenge {
    type Error = CoreError;

    fn try_from(row: ChallengeRow) -> Result<Self, Self::Error> {
        let purpose = OtpPurpose::parse(&row.purpose)
            .ok_or_else(|| internal(format!("unknown otp purpose '{}'", row.purpose)))?;
        Ok(OtpChallenge {
            challenge_id: row.challenge_id,
            email: row.email,
            purpose,
            code_hash: row.code_hash,
            attempts_remaining: row.attempts_remaining,
            consumed: row.consumed,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

#[derive(FromRow)]
struct InviteRow {
    invite_id: Uuid,
    scope_type: String,
    scope_id: Uuid,
    email: String,
    role: String,
    token_hash: String,
    status: String,
    invited_by: Uuid,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<InviteRow> for Invite {
    type Error = CoreError;

    fn try_from(row: InviteRow) -> Result<Self, Self::Error> {
        let status = InviteStatus::parse(&row.status)
            .ok_or_else(|| internal(format!("unknown invite status '{}'", row.status)))?;
        Ok(Invite {
            invite_id: row.invite_id,
            scope: ScopeRef {
                scope_type: parse_scope_type(&row.scope_type)?,
                scope_id: row.scope_id,
            },
            email: row.email,
            role: parse_role(&row.role)?,
            token_hash: row.token_hash,
            status,
            invited_by: row.invited_by,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

fn parse_role(code: &str) -> Result<Role, CoreError> {
    Role::parse(code).ok_or_else(|| internal(format!("unknown role '{code}'")))
}

fn parse_scope_type(code: &str) -> Result<ScopeType, CoreError> {
    ScopeType::parse(code).ok_or_else(|| internal(format!("unknown scope type '{code}'")))
}

fn internal(msg: String) -> CoreError {
    CoreError::Internal(anyhow::anyhow!(msg))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn health_check(&self) -> Result<(), CoreError> {
        PgStore::health_check(self).await
    }

    // ==================== Users ====================

    async fn insert_user(&self, user: &User) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (user_id, email, password_hash, email_verified, global_role, display_name, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.email_verified)
        .bind(user.global_role.as_str())
        .bind(&user.display_name)
        .bind(user.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(CoreError::EmailTaken),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, CoreError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, CoreError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn set_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), CoreError> {
        let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE user_id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound("user"));
        }
        Ok(())
    }

    async fn set_email_verified(&self, user_id: Uuid) -> Result<(), CoreError> {
        let result = sqlx::query("UPDATE users SET email_verified = TRUE WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound("user"));
        }
        Ok(())
    }

    async fn set_global_role(&self, user_id: Uuid, role: GlobalRole) -> Result<(), CoreError> {
        let result = sqlx::query("UPDATE users SET global_role = $1 WHERE user_id = $2")
            .bind(role.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound("user"));
        }
        Ok(())
    }

    // ==================== Scopes ====================

    async fn insert_organization(
        &self,
        org: &Organization,
        owner: &Membership,
    ) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO organizations (org_id, name, created_by, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(org.org_id)
        .bind(&org.name)
        .bind(org.created_by)
        .bind(org.created_at)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO memberships (user_id, scope_type, scope_id, role, joined_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(owner.user_id)
        .bind(owner.scope.scope_type.as_str())
        .bind(owner.scope.scope_id)
        .bind(owner.role.as_str())
        .bind(owner.joined_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_organization(&self, org_id: Uuid) -> Result<Option<Organization>, CoreError> {
        Ok(sqlx::query_as::<_, Organization>(
            "SELECT org_id, name, created_by, created_at FROM organizations WHERE org_id = $1",
        )
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_organizations(&self, org_ids: &[Uuid]) -> Result<Vec<Organization>, CoreError> {
        Ok(sqlx::query_as::<_, Organization>(
            "SELECT org_id, name, created_by, created_at FROM organizations WHERE org_id = ANY($1) ORDER BY created_at",
        )
        .bind(org_ids)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_workspace(
        &self,
        workspace: &Workspace,
        owners: &[Membership],
    ) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO workspaces (workspace_id, org_id, name, created_by, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(workspace.workspace_id)
        .bind(workspace.org_id)
        .bind(&workspace.name)
        .bind(workspace.created_by)
        .bind(workspace.created_at)
        .execute(&mut *tx)
        .await?;
        for owner in owners {
            sqlx::query(
                r#"
                INSERT INTO memberships (user_id, scope_type, scope_id, role, joined_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (user_id, scope_type, scope_id) DO NOTHING
                "#,
            )
            .bind(owner.user_id)
            .bind(owner.scope.scope_type.as_str())
            .bind(owner.scope.scope_id)
            .bind(owner.role.as_str())
            .bind(owner.joined_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_workspace(&self, workspace_id: Uuid) -> Result<Option<Workspace>, CoreError> {
        Ok(sqlx::query_as::<_, Workspace>(
            "SELECT workspace_id, org_id, name, created_by, created_at FROM workspaces WHERE workspace_id = $1",
        )
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    // ==================== Memberships ====================

    async fn insert_membership(&self, membership: &Membership) -> Result<(), CoreError> {
        let result = sqlx::query(
            "INSERT INTO memberships (user_id, scope_type, scope_id, role, joined_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(membership.user_id)
        .bind(membership.scope.scope_type.as_str())
        .bind(membership.scope.scope_id)
        .bind(membership.role.as_str())
        .bind(membership.joined_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(CoreError::AlreadyMember),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_membership(
        &self,
        user_id: Uuid,
        scope: ScopeRef,
    ) -> Result<Option<Membership>, CoreError> {
        sqlx::query_as::<_, MembershipRow>(
            "SELECT * FROM memberships WHERE user_id = $1 AND scope_type = $2 AND scope_id = $3",
        )
        .bind(user_id)
        .bind(scope.scope_type.as_str())
        .bind(scope.scope_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Membership::try_from)
        .transpose()
    }

    async fn list_memberships_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Membership>, CoreError> {
        sqlx::query_as::<_, MembershipRow>(
            "SELECT * FROM memberships WHERE user_id = $1 ORDER BY joined_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Membership::try_from)
        .collect()
    }

    async fn list_members_of_scope(&self, scope: ScopeRef) -> Result<Vec<Membership>, CoreError> {
        sqlx::query_as::<_, MembershipRow>(
            "SELECT * FROM memberships WHERE scope_type = $1 AND scope_id = $2 ORDER BY joined_at",
        )
        .bind(scope.scope_type.as_str())
        .bind(scope.scope_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Membership::try_from)
        .collect()
    }

    async fn update_role_guarded(
        &self,
        scope: ScopeRef,
        target_user_id: Uuid,
        new_role: Role,
    ) -> Result<Membership, CoreError> {
        let mut tx = self.pool.begin().await?;
        let rows: Vec<MembershipRow> = sqlx::query_as(
            "SELECT * FROM memberships WHERE scope_type = $1 AND scope_id = $2 FOR UPDATE",
        )
        .bind(scope.scope_type.as_str())
        .bind(scope.scope_id)
        .fetch_all(&mut *tx)
        .await?;

        let owners = rows.iter().filter(|r| r.role == Role::Owner.as_str()).count();
        let target = rows
            .iter()
            .find(|r| r.user_id == target_user_id)
            .ok_or(CoreError::NotFound("membership"))?;
        if target.role == Role::Owner.as_str() && new_role != Role::Owner && owners <= 1 {
            return Err(CoreError::SelfDemotionBlocked);
        }

        sqlx::query(
            "UPDATE memberships SET role = $1 WHERE user_id = $2 AND scope_type = $3 AND scope_id = $4",
        )
        .bind(new_role.as_str())
        .bind(target_user_id)
        .bind(scope.scope_type.as_str())
        .bind(scope.scope_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Membership {
            user_id: target_user_id,
            scope,
            role: new_role,
            joined_at: target.joined_at,
        })
    }

    async fn remove_membership_guarded(
        &self,
        scope: ScopeRef,
        target_user_id: Uuid,
    ) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await?;
        let rows: Vec<MembershipRow> = sqlx::query_as(
            "SELECT * FROM memberships WHERE scope_type = $1 AND scope_id = $2 FOR UPDATE",
        )
        .bind(scope.scope_type.as_str())
        .bind(scope.scope_id)
        .fetch_all(&mut *tx)
        .await?;

        let owners = rows.iter().filter(|r| r.role == Role::Owner.as_str()).count();
        let target = rows
            .iter()
            .find(|r| r.user_id == target_user_id)
            .ok_or(CoreError::NotFound("membership"))?;
        if target.role == Role::Owner.as_str() && owners <= 1 {
            return Err(CoreError::SelfDemotionBlocked);
        }

        sqlx::query(
            "DELETE FROM memberships WHERE user_id = $1 AND scope_type = $2 AND scope_id = $3",
        )
        .bind(target_user_id)
        .bind(scope.scope_type.as_str())
        .bind(scope.scope_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    // ==================== OTP challenges ====================

    async fn put_challenge(&self, challenge: &OtpChallenge) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO otp_challenges
                (challenge_id, email, purpose, code_hash, attempts_remaining, consumed, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (email, purpose) DO UPDATE SET
                challenge_id = EXCLUDED.challenge_id,
                code_hash = EXCLUDED.code_hash,
                attempts_remaining = EXCLUDED.attempts_remaining,
                consumed = EXCLUDED.consumed,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(challenge.challenge_id)
        .bind(&challenge.email)
        .bind(challenge.purpose.as_str())
        .bind(&challenge.code_hash)
        .bind(challenge.attempts_remaining)
        .bind(challenge.consumed)
        .bind(challenge.created_at)
        .bind(challenge.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_challenge(
        &self,
        email: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<OtpChallenge>, CoreError> {
        sqlx::query_as::<_, ChallengeRow>(
            "SELECT * FROM otp_challenges WHERE email = $1 AND purpose = $2",
        )
        .bind(email)
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(OtpChallenge::try_from)
        .transpose()
    }

    async fn spend_challenge_attempt(
        &self,
        _email: &str,
        _purpose: OtpPurpose,
        challenge_id: Uuid,
    ) -> Result<Option<OtpChallenge>, CoreError> {
        sqlx::query_as::<_, ChallengeRow>(
            r#"
            UPDATE otp_challenges
            SET attempts_remaining = attempts_remaining - 1
            WHERE challenge_id = $1 AND consumed = FALSE AND attempts_remaining > 0
            RETURNING *
            "#,
        )
        .bind(challenge_id)
        .fetch_optional(&self.pool)
        .await?
        .map(OtpChallenge::try_from)
        .transpose()
    }

    async fn consume_challenge(
        &self,
        _email: &str,
        _purpose: OtpPurpose,
        challenge_id: Uuid,
    ) -> Result<bool, CoreError> {
        let result = sqlx::query(
            "UPDATE otp_challenges SET consumed = TRUE WHERE challenge_id = $1 AND consumed = FALSE",
        )
        .bind(challenge_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn discard_challenge(
        &self,
        _email: &str,
        _purpose: OtpPurpose,
        challenge_id: Uuid,
    ) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM otp_challenges WHERE challenge_id = $1")
            .bind(challenge_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ==================== Recovery tokens ====================

    async fn put_recovery_token(&self, token: &RecoveryToken) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO recovery_tokens (token_id, email, token_hash, consumed, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (email) DO UPDATE SET
                token_id = EXCLUDED.token_id,
                token_hash = EXCLUDED.token_hash,
                consumed = EXCLUDED.consumed,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(token.token_id)
        .bind(&token.email)
        .bind(&token.token_hash)
        .bind(token.consumed)
        .bind(token.created_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_recovery_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RecoveryToken>, CoreError> {
        Ok(sqlx::query_as::<_, RecoveryToken>(
            "SELECT token_id, email, token_hash, consumed, created_at, expires_at FROM recovery_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn consume_recovery_token(
        &self,
        _email: &str,
        token_id: Uuid,
    ) -> Result<bool, CoreError> {
        let result = sqlx::query(
            "UPDATE recovery_tokens SET consumed = TRUE WHERE token_id = $1 AND consumed = FALSE",
        )
        .bind(token_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn discard_recovery_token(
        &self,
        _email: &str,
        token_id: Uuid,
    ) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM recovery_tokens WHERE token_id = $1")
            .bind(token_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ==================== Invites ====================

    async fn insert_invite(&self, invite: &Invite) -> Result<(), CoreError> {
        // Lazily expire a stale pending invite for the same key, then rely on
        // the partial unique index to decide races between concurrent creates.
        sqlx::query(
            r#"
            UPDATE invites SET status = 'expired'
            WHERE scope_type = $1 AND scope_id = $2 AND LOWER(email) = LOWER($3)
              AND status = 'pending' AND expires_at <= NOW()
            "#,
        )
        .bind(invite.scope.scope_type.as_str())
        .bind(invite.scope.scope_id)
        .bind(&invite.email)
        .execute(&self.pool)
        .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO invites
                (invite_id, scope_type, scope_id, email, role, token_hash, status, invited_by, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(invite.invite_id)
        .bind(invite.scope.scope_type.as_str())
        .bind(invite.scope.scope_id)
        .bind(&invite.email)
        .bind(invite.role.as_str())
        .bind(&invite.token_hash)
        .bind(invite.status.as_str())
        .bind(invite.invited_by)
        .bind(invite.created_at)
        .bind(invite.expires_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(CoreError::DuplicatePending),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_invite(&self, invite_id: Uuid) -> Result<Option<Invite>, CoreError> {
        sqlx::query_as::<_, InviteRow>("SELECT * FROM invites WHERE invite_id = $1")
            .bind(invite_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Invite::try_from)
            .transpose()
    }

    async fn find_invite_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Invite>, CoreError> {
        sqlx::query_as::<_, InviteRow>("SELECT * FROM invites WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?
            .map(Invite::try_from)
            .transpose()
    }

    async fn resolve_invite(
        &self,
        invite_id: Uuid,
        to: InviteStatus,
    ) -> Result<bool, CoreError> {
        let result = sqlx::query(
            "UPDATE invites SET status = $1 WHERE invite_id = $2 AND status = 'pending'",
        )
        .bind(to.as_str())
        .bind(invite_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_invites_for_scope(&self, scope: ScopeRef) -> Result<Vec<Invite>, CoreError> {
        sqlx::query_as::<_, InviteRow>(
            "SELECT * FROM invites WHERE scope_type = $1 AND scope_id = $2 ORDER BY created_at",
        )
        .bind(scope.scope_type.as_str())
        .bind(scope.scope_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Invite::try_from)
        .collect()
    }

    // ==================== Sessions ====================

    async fn insert_session(&self, session: &AccessSession) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, user_id, token_hash, issued_at, expires_at, revoked)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(session.session_id)
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(session.issued_at)
        .bind(session.expires_at)
        .bind(session.revoked)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<AccessSession>, CoreError> {
        Ok(sqlx::query_as::<_, AccessSession>(
            "SELECT session_id, user_id, token_hash, issued_at, expires_at, revoked FROM sessions WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn revoke_session(&self, token_hash: &str) -> Result<bool, CoreError> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked = TRUE WHERE token_hash = $1 AND revoked = FALSE",
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_sessions_for_user(
        &self,
        user_id: Uuid,
        keep_session: Option<Uuid>,
    ) -> Result<u64, CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions SET revoked = TRUE
            WHERE user_id = $1 AND revoked = FALSE AND ($2::uuid IS NULL OR session_id <> $2)
            "#,
        )
        .bind(user_id)
        .bind(keep_session)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
