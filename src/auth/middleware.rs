//! Axum extractors for authentication.

use crate::auth::service::AuthService;
use crate::error::AppError;
use crate::models::UserView;
use axum::{extract::FromRequestParts, http::request::Parts};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
}

/// Authenticated session extractor.
///
/// Extracts the access token from `Authorization: Bearer {token}` and
/// resolves it to the user it was issued for.
/// Returns 401 Unauthorized if missing or invalid.
pub struct AuthSession {
    pub user: UserView,
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Please authenticate".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Please authenticate".to_string()))?;

        let user = state.auth.current_user(token).await?;

        Ok(AuthSession { user })
    }
}
