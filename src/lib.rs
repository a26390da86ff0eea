pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{delete, get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::error::CoreError;
use crate::services::IdentityService;
use crate::store::IdentityStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn IdentityStore>,
    pub identity: IdentityService,
}

pub fn build_router(state: AppState) -> Router {
    let allowed_origin = state
        .config
        .base_url
        .parse::<HeaderValue>()
        .unwrap_or_else(|_| HeaderValue::from_static("*"));

    Router::new()
        .route("/health", get(health_check))
        // Registration and sessions
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))
        // Credential recovery
        .route(
            "/auth/password-reset/request",
            post(handlers::password::request_password_reset),
        )
        .route(
            "/auth/password-reset/confirm",
            post(handlers::password::confirm_password_reset),
        )
        .route("/auth/otp/request", post(handlers::otp::request_otp))
        .route("/auth/otp/verify", post(handlers::otp::verify_otp))
        // Current user
        .route("/users/me", get(handlers::auth::me))
        .route("/users/me/password", post(handlers::auth::change_password))
        .route("/users/me/memberships", get(handlers::org::list_memberships))
        // Scopes and roles
        .route(
            "/orgs",
            get(handlers::org::list_organizations).post(handlers::org::create_organization),
        )
        .route(
            "/orgs/:org_id/workspaces",
            post(handlers::org::create_workspace),
        )
        .route(
            "/scopes/:scope_type/:scope_id/members/:user_id/role",
            post(handlers::org::change_role),
        )
        .route(
            "/scopes/:scope_type/:scope_id/members/:user_id",
            delete(handlers::org::remove_member),
        )
        // Invites
        .route(
            "/scopes/:scope_type/:scope_id/invites",
            post(handlers::invite::create_invite),
        )
        .route("/invites/accept", post(handlers::invite::accept_invite))
        .route("/invites/:invite_id", delete(handlers::invite::revoke_invite))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origin)
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        )
}

/// GET /health
async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<serde_json::Value>, CoreError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        e
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
    })))
}
