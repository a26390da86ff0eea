//! Invite handlers.

use axum::{
    extract::{Json, Path, State},
    http::{HeaderMap, StatusCode},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::CoreError;
use crate::handlers::{bearer_token, parse_scope};
use crate::models::{InviteStatus, Membership, Role};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInviteRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct CreateInviteResponse {
    pub invite_id: Uuid,
    /// Shown once; only its hash is persisted.
    pub invite_token: String,
    pub status: InviteStatus,
    pub expires_at: DateTime<Utc>,
}

/// POST /scopes/:scope_type/:scope_id/invites
pub async fn create_invite(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((scope_type, scope_id)): Path<(String, Uuid)>,
    Json(req): Json<CreateInviteRequest>,
) -> Result<(StatusCode, Json<CreateInviteResponse>), CoreError> {
    req.validate()?;
    let token = bearer_token(&headers)?;
    let scope = parse_scope(&scope_type, scope_id)?;
    let role = Role::parse(&req.role).ok_or(CoreError::InvalidRole)?;
    let (invite, invite_token) = state
        .identity
        .create_invite(token, scope, &req.email, role)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateInviteResponse {
            invite_id: invite.invite_id,
            invite_token,
            status: invite.status,
            expires_at: invite.expires_at,
        }),
    ))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AcceptInviteRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
}

/// POST /invites/accept
pub async fn accept_invite(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AcceptInviteRequest>,
) -> Result<(StatusCode, Json<Membership>), CoreError> {
    req.validate()?;
    let session_token = bearer_token(&headers)?;
    let membership = state
        .identity
        .accept_invite(&req.token, session_token)
        .await?;
    Ok((StatusCode::CREATED, Json(membership)))
}

/// DELETE /invites/:invite_id
pub async fn revoke_invite(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(invite_id): Path<Uuid>,
) -> Result<StatusCode, CoreError> {
    let token = bearer_token(&headers)?;
    state.identity.revoke_invite(token, invite_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
