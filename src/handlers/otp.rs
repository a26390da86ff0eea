//! OTP request/verify handlers.

use axum::{
    extract::{Json, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::models::OtpPurpose;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RequestOtpRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub purpose: OtpPurpose,
}

#[derive(Debug, Serialize)]
pub struct RequestOtpResponse {
    pub message: String,
}

/// POST /auth/otp/request
pub async fn request_otp(
    State(state): State<AppState>,
    Json(req): Json<RequestOtpRequest>,
) -> Result<Json<RequestOtpResponse>, CoreError> {
    req.validate()?;
    state.identity.request_otp(&req.email, req.purpose).await?;
    Ok(Json(RequestOtpResponse {
        message: "A verification code is on its way.".to_string(),
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub purpose: OtpPurpose,
    #[validate(length(min = 1, message = "Code is required"))]
    pub code: String,
    /// Required for the `password_change` purpose.
    pub new_password: Option<String>,
}

/// POST /auth/otp/verify
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<StatusCode, CoreError> {
    req.validate()?;
    state
        .identity
        .verify_otp(&req.email, req.purpose, &req.code, req.new_password.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
