//! API route handlers.

pub mod auth;

use crate::auth::middleware::AppState;
use crate::error::AppError;
use axum::{extract::FromRequest, routing::get, routing::post, Router};

/// JSON request body whose rejections use the API error format.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Build the API router with all endpoints.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/start-session", post(auth::start_session))
        .route("/api/auth/authenticate", post(auth::authenticate))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/refresh-tokens", post(auth::refresh_tokens))
        .route("/api/auth/me", get(auth::me))
}
