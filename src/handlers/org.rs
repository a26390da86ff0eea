//! Organization, workspace, and membership handlers.

use axum::{
    extract::{Json, Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::CoreError;
use crate::handlers::{bearer_token, parse_scope};
use crate::models::{Membership, Organization, Role, Workspace};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrganizationRequest {
    #[validate(length(min = 1, max = 120, message = "Name must be 1-120 characters"))]
    pub name: String,
}

/// POST /orgs
pub async fn create_organization(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateOrganizationRequest>,
) -> Result<(StatusCode, Json<Organization>), CoreError> {
    req.validate()?;
    let token = bearer_token(&headers)?;
    let org = state.identity.create_organization(token, req.name).await?;
    Ok((StatusCode::CREATED, Json(org)))
}

/// GET /orgs
pub async fn list_organizations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Organization>>, CoreError> {
    let token = bearer_token(&headers)?;
    Ok(Json(state.identity.list_organizations(token).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateWorkspaceRequest {
    #[validate(length(min = 1, max = 120, message = "Name must be 1-120 characters"))]
    pub name: String,
}

/// POST /orgs/:org_id/workspaces
pub async fn create_workspace(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(org_id): Path<Uuid>,
    Json(req): Json<CreateWorkspaceRequest>,
) -> Result<(StatusCode, Json<Workspace>), CoreError> {
    req.validate()?;
    let token = bearer_token(&headers)?;
    let workspace = state
        .identity
        .create_workspace(token, org_id, req.name)
        .await?;
    Ok((StatusCode::CREATED, Json(workspace)))
}

/// GET /users/me/memberships
pub async fn list_memberships(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Membership>>, CoreError> {
    let token = bearer_token(&headers)?;
    Ok(Json(state.identity.list_memberships(token).await?))
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct ChangeRoleResponse {
    pub user_id: Uuid,
    pub role: Role,
}

/// POST /scopes/:scope_type/:scope_id/members/:user_id/role
pub async fn change_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((scope_type, scope_id, user_id)): Path<(String, Uuid, Uuid)>,
    Json(req): Json<ChangeRoleRequest>,
) -> Result<Json<ChangeRoleResponse>, CoreError> {
    let token = bearer_token(&headers)?;
    let scope = parse_scope(&scope_type, scope_id)?;
    let new_role = Role::parse(&req.role).ok_or(CoreError::InvalidRole)?;
    let membership = state
        .identity
        .change_role(token, user_id, scope, new_role)
        .await?;
    Ok(Json(ChangeRoleResponse {
        user_id: membership.user_id,
        role: membership.role,
    }))
}

/// DELETE /scopes/:scope_type/:scope_id/members/:user_id
pub async fn remove_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((scope_type, scope_id, user_id)): Path<(String, Uuid, Uuid)>,
) -> Result<StatusCode, CoreError> {
    let token = bearer_token(&headers)?;
    let scope = parse_scope(&scope_type, scope_id)?;
    state.identity.remove_member(token, user_id, scope).await?;
    Ok(StatusCode::NO_CONTENT)
}
