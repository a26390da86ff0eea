//! HTTP handlers.
//!
//! Thin axum wrappers over [`crate::services::IdentityService`]; no handler
//! carries logic of its own beyond request validation and shaping.

pub mod auth;
pub mod invite;
pub mod org;
pub mod otp;
pub mod password;

use axum::http::{header, HeaderMap};

use crate::error::CoreError;
use crate::models::{ScopeRef, ScopeType};

/// Extract the bearer session token from the Authorization header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Result<&str, CoreError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(CoreError::InvalidCredentials)
}

/// Parse a scope from path segments.
pub(crate) fn parse_scope(scope_type: &str, scope_id: uuid::Uuid) -> Result<ScopeRef, CoreError> {
    let scope_type = ScopeType::parse(scope_type)
        .ok_or_else(|| CoreError::BadRequest(format!("unknown scope type '{scope_type}'")))?;
    Ok(ScopeRef {
        scope_type,
        scope_id,
    })
}
