//! The `login` cookie and the session it carries.
//!
//! A session is nothing more than a valid login token presented as a
//! cookie. Binding never fails the request for token problems: an invalid
//! or expired cookie yields an anonymous session plus a flag telling the
//! handler to clear the cookie.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, InvalidHeaderValue},
};
use chrono::{DateTime, Utc};

use super::error::AuthError;
use super::user::{User, Users};

pub const LOGIN_COOKIE: &str = "login";

/// What a request's cookie resolved to.
#[derive(Debug, Default)]
pub struct Session {
    /// The authenticated user, when the cookie held a valid login token.
    pub user: Option<User>,
    /// The raw token the client presented, valid or not. Logout uses this
    /// to revoke the row even when binding failed.
    pub raw_token: Option<String>,
    /// True when the cookie was presented but did not resolve; the
    /// response should carry the deletion cookie.
    pub clear_cookie: bool,
}

/// Resolve the request's `login` cookie.
///
/// # Errors
/// Only infrastructure errors propagate (database, malformed stored
/// verifier). Token problems are session-clearing conditions, not errors.
pub async fn bind(headers: &HeaderMap, users: &Users) -> Result<Session, AuthError> {
    let Some(raw) = cookie_value(headers, LOGIN_COOKIE) else {
        return Ok(Session::default());
    };

    match users.user_for_login_token(&raw).await {
        Ok(user) => Ok(Session {
            user: Some(user),
            raw_token: Some(raw),
            clear_cookie: false,
        }),
        Err(err) if err.clears_session() => Ok(Session {
            user: None,
            raw_token: Some(raw),
            clear_cookie: true,
        }),
        Err(err) => Err(err),
    }
}

/// Build the `Set-Cookie` value for a fresh login.
///
/// Without `remember` the cookie has no date and dies with the browser
/// session; with it, `Expires` pins the cookie to the token's own expiry.
///
/// # Errors
/// Returns an error when the value is not a valid header (never for the
/// URL-safe tokens this crate issues).
pub fn login_cookie(
    raw: &str,
    expires: DateTime<Utc>,
    remember: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{LOGIN_COOKIE}={raw}; Path=/; HttpOnly; Secure; SameSite=Strict");
    if remember {
        let stamp = expires.format("%a, %d %b %Y %H:%M:%S GMT");
        cookie.push_str(&format!("; Expires={stamp}"));
    }
    HeaderValue::from_str(&cookie)
}

/// The deletion cookie: empty value, `Max-Age=0`.
#[must_use]
pub fn clear_cookie() -> HeaderValue {
    HeaderValue::from_static("login=; Path=/; HttpOnly; Secure; SameSite=Strict; Max-Age=0")
}

/// Extract one cookie's value from the `Cookie` header. Empty values count
/// as absent.
#[must_use]
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let Some((key, val)) = pair.trim().split_once('=') else {
            continue;
        };
        if key.trim() == name && !val.trim().is_empty() {
            return Some(val.trim().to_string());
        }
    }
    None
}
