//! Refresh token cookie.
//!
//! `HttpOnly`, `SameSite=Strict`, scoped to `/api`. `Secure` everywhere but
//! the dev platform.

use std::time::Duration;

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::OffsetDateTime;

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Path the cookie is scoped to.
pub const REFRESH_COOKIE_PATH: &str = "/api";

/// Build the refresh token cookie, living as long as the token.
pub fn refresh_cookie(token: &str, secure: bool, ttl: Duration) -> Cookie<'static> {
    let max_age = time::Duration::try_from(ttl).unwrap_or(time::Duration::MAX);
    Cookie::build((REFRESH_COOKIE.to_string(), token.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path(REFRESH_COOKIE_PATH)
        .max_age(max_age)
        .build()
}

/// Build an expired, empty refresh cookie.
pub fn clear_refresh_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE.to_string(), String::new()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path(REFRESH_COOKIE_PATH)
        .max_age(time::Duration::ZERO)
        .expires(OffsetDateTime::UNIX_EPOCH)
        .build()
}
