//! Auth API endpoints.

use crate::auth::middleware::{AppState, AuthSession};
use crate::error::AppError;
use crate::routes::ApiJson;
use crate::models::{
    AuthenticateRequest, AuthenticateResponse, LoginRequest, LoginResponse, RefreshTokenRequest,
    StartSessionRequest, StartSessionResponse, UserView,
};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

/// POST /api/auth/start-session — Request a challenge nonce
pub async fn start_session(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<StartSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let nonce = state
        .auth
        .start_session(&req.login_session_token, &req.claimed_address)
        .await?;

    Ok(Json(StartSessionResponse { nonce }))
}

/// POST /api/auth/authenticate — Submit the signed nonce
pub async fn authenticate(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AuthenticateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let authenticated = state
        .auth
        .authenticate(&req.login_session_token, &req.signature)
        .await?;

    Ok(Json(AuthenticateResponse { authenticated }))
}

/// POST /api/auth/login — Redeem an authenticated challenge for a session
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.auth.login(&req.login_session_token).await?;

    Ok(Json(LoginResponse {
        user: UserView::from(&outcome.user),
        access_credential: outcome.tokens.access_credential,
        refresh_credential: outcome.tokens.refresh_credential,
    }))
}

/// POST /api/auth/logout — Revoke a refresh token
pub async fn logout(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.logout(&req.refresh_token).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/auth/refresh-tokens — Rotate a refresh token
pub async fn refresh_tokens(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tokens = state.auth.rotate(&req.refresh_token).await?;

    Ok(Json(tokens))
}

/// GET /api/auth/me — Current user for a bearer access token
pub async fn me(session: AuthSession) -> Result<impl IntoResponse, AppError> {
    Ok(Json(session.user))
}
