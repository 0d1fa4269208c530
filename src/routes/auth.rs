//! Authentication routes
//!
//! Access tokens travel in the JSON body; the refresh token is set as an
//! HttpOnly cookie scoped to `/auth/refresh`.

use axum::{extract::State, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;

use crate::api::{Created, MessageResponse};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::{LoginRequest, RefreshRequest, RegisterRequest, TokenResponse, UserResponse};
use crate::error::{ApiError, ApiResult};

const REFRESH_COOKIE: &str = "refresh_token";
const REFRESH_PATH: &str = "/auth/refresh";

fn refresh_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, token))
        .http_only(true)
        .secure(!state.settings.env.is_dev())
        .same_site(SameSite::Lax)
        .path(REFRESH_PATH)
        .build()
}

/// POST /auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Created<UserResponse>> {
    let user = state.accounts.register(req).await?;
    Ok(Created(user.into()))
}

/// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> ApiResult<(CookieJar, Json<TokenResponse>)> {
    let (user, tokens) = state.accounts.login(req).await?;
    tracing::info!(user_id = %user.id, "User logged in");

    let jar = jar.add(refresh_cookie(&state, tokens.refresh_token));
    Ok((jar, Json(TokenResponse::bearer(tokens.access_token))))
}

/// POST /auth/refresh
///
/// Reads the refresh token from the cookie, or from the body when no cookie
/// was sent.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> ApiResult<Json<TokenResponse>> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| body.and_then(|Json(b)| b.refresh_token))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Missing refresh token".to_string()))?;

    let access_token = state.accounts.refresh(&token).await?;
    Ok(Json(TokenResponse::bearer(access_token)))
}

/// POST /auth/logout
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<MessageResponse>) {
    let jar = jar.remove(Cookie::build(REFRESH_COOKIE).path(REFRESH_PATH));
    (jar, Json(MessageResponse::new("Logged out")))
}

/// GET /auth/me
pub async fn me(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<UserResponse>> {
    let user = state.accounts.current_user(auth.user_id).await?;
    Ok(Json(user.into()))
}
