//! Session endpoints.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum_extra::extract::cookie::CookieJar;

use crate::AppState;
use crate::error::{AppResult, GatewayError};
use crate::services::auth::{self, LoginRequest, LoginResponse, TokenResponse};
use crate::services::cookies::{REFRESH_COOKIE, clear_refresh_cookie, refresh_cookie};

/// Refresh token from the request cookie, if present and non-empty.
fn refresh_token_from(jar: &CookieJar) -> AppResult<String> {
    jar.get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(GatewayError::MissingRefreshCookie)
}

/// `POST /api/login` — email + password for an access token and a refresh
/// cookie.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> AppResult<(CookieJar, Json<LoginResponse>)> {
    let request: LoginRequest =
        serde_json::from_slice(&body).map_err(|e| GatewayError::BadRequest(e.to_string()))?;
    let outcome = auth::login(&state, request).await?;
    let cookie = refresh_cookie(
        &outcome.refresh_token,
        !state.config.is_dev(),
        state.config.refresh_token_ttl,
    );
    Ok((jar.add(cookie), Json(outcome.response)))
}

/// `POST /api/refresh` — new access token for the refresh cookie.
pub async fn refresh_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<Json<TokenResponse>> {
    let token = refresh_token_from(&jar)?;
    Ok(Json(auth::refresh(&state, &token).await?))
}

/// `POST /api/revoke` — end the session and clear the cookie.
pub async fn revoke_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<(CookieJar, StatusCode)> {
    let token = refresh_token_from(&jar)?;
    auth::revoke(&state, &token).await?;
    let jar = jar.add(clear_refresh_cookie(!state.config.is_dev()));
    Ok((jar, StatusCode::NO_CONTENT))
}
