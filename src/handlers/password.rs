//! Password-reset handlers (the emailed-link flow).

use axum::{
    extract::{Json, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct PasswordResetResponse {
    pub message: String,
}

/// POST /auth/password-reset/request
///
/// Always answers 200 so the flow cannot be used to probe which emails are
/// registered.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetRequest>,
) -> Result<Json<PasswordResetResponse>, CoreError> {
    req.validate()?;
    state.identity.request_password_reset(&req.email).await?;
    Ok(Json(PasswordResetResponse {
        message: "If that email is registered, a reset link is on its way.".to_string(),
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetConfirm {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

/// POST /auth/password-reset/confirm
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetConfirm>,
) -> Result<StatusCode, CoreError> {
    req.validate()?;
    state
        .identity
        .reset_password(&req.token, &req.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
