//! Error taxonomy for the identity core.
//!
//! Every variant except the infrastructure ones is recoverable and surfaced
//! verbatim to the caller; the HTTP layer maps them to status codes and the
//! surrounding application maps them to user-facing messages.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email is already registered")]
    EmailTaken,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} has expired")]
    Expired(&'static str),

    #[error("Verification attempts exhausted")]
    Exhausted,

    #[error("Invalid code")]
    Invalid,

    #[error("Already consumed")]
    AlreadyConsumed,

    #[error("Invite has already been resolved")]
    AlreadyResolved,

    #[error("Forbidden")]
    Forbidden,

    #[error("A pending invite already exists for this recipient")]
    DuplicatePending,

    #[error("User is already a member of this scope")]
    AlreadyMember,

    #[error("A scope must retain at least one owner")]
    SelfDemotionBlocked,

    #[error("Role is not allowed at this scope")]
    InvalidRole,

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Notification error: {0}")]
    Email(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::Database(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Internal(anyhow::Error::new(err))
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
        }

        let (status, error, details) = match &self {
            CoreError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, self.to_string(), None)
            }
            CoreError::Forbidden => (StatusCode::FORBIDDEN, self.to_string(), None),
            CoreError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string(), None),
            CoreError::Expired(_) => (StatusCode::GONE, self.to_string(), None),
            CoreError::Exhausted => (StatusCode::TOO_MANY_REQUESTS, self.to_string(), None),
            CoreError::EmailTaken
            | CoreError::AlreadyConsumed
            | CoreError::AlreadyResolved
            | CoreError::DuplicatePending
            | CoreError::AlreadyMember
            | CoreError::SelfDemotionBlocked => (StatusCode::CONFLICT, self.to_string(), None),
            CoreError::Invalid | CoreError::InvalidRole | CoreError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, self.to_string(), None)
            }
            CoreError::Validation(errs) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Validation error".to_string(),
                Some(errs.to_string()),
            ),
            CoreError::Database(err) => {
                tracing::error!(error = %err, "Database failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            CoreError::Email(msg) => {
                tracing::error!(error = %msg, "Notification dispatch failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            CoreError::Config(msg) => {
                tracing::error!(error = %msg, "Configuration failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            CoreError::Internal(err) => {
                tracing::error!(error = %err, "Internal failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        (status, Json(ErrorResponse { error, details })).into_response()
    }
}
