//! Form handlers. Every route registers with `routing::any`; the handler
//! runs the method gate first and then branches on the method, so the
//! `Allow` header is always accurate.

pub mod account;
pub mod confirm;
pub mod health;
pub mod home;
pub mod login;
pub mod register;
pub mod reset;

use axum::{
    http::{
        HeaderMap, HeaderValue, Method, StatusCode,
        header::{ALLOW, LOCATION, SET_COOKIE},
    },
    response::{Html, IntoResponse, Response},
};
use regex::Regex;
use tracing::error;
use url::Url;

use crate::auth::{Session, hash, session};

use super::state::App;

pub(crate) const CSRF_COOKIE: &str = "csrf";
const CSRF_TOKEN_SIZE: usize = 32;

/// Gate a handler to the given methods. `OPTIONS` gets 204, any other
/// method outside the list gets 405; both carry `Allow`.
pub(crate) fn enforce_methods(allowed: &[Method], method: &Method) -> Option<Response> {
    if allowed.contains(method) {
        return None;
    }
    let mut allow = allowed
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    allow.push_str(", OPTIONS");
    let status = if method == Method::OPTIONS {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::METHOD_NOT_ALLOWED
    };
    Some((status, [(ALLOW, allow)]).into_response())
}

pub(crate) fn see_other(location: &str) -> Response {
    (StatusCode::SEE_OTHER, [(LOCATION, location.to_string())]).into_response()
}

/// Only same-site absolute paths survive as post-login redirect targets.
/// Anything with a scheme or host, protocol-relative (`//`) included,
/// falls back to `/`.
pub(crate) fn safe_redirect_target(target: &str) -> &str {
    if target.starts_with('/') && !target.starts_with("//") && Url::parse(target).is_err() {
        target
    } else {
        "/"
    }
}

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

pub(crate) fn html_page(status: StatusCode, body: String) -> Response {
    (status, Html(body)).into_response()
}

pub(crate) fn server_error(app: &App, err: &dyn std::fmt::Display) -> Response {
    error!("unhandled error: {err}");
    html_page(
        StatusCode::INTERNAL_SERVER_ERROR,
        app.pages().internal_error(),
    )
}

pub(crate) fn forbidden(app: &App) -> Response {
    html_page(StatusCode::FORBIDDEN, app.pages().forbidden())
}

/// Greeting name for outgoing email: the full name when the account
/// still resolves, the username otherwise.
pub(crate) async fn display_name(app: &App, username: &str) -> String {
    match app.users().by_username(username).await {
        Ok(Some(record)) => record.full_name,
        Ok(None) => username.to_string(),
        Err(err) => {
            error!("could not load user {username}: {err}");
            username.to_string()
        }
    }
}

/// Resolve the session or produce the 500 page.
pub(crate) async fn bind_session(app: &App, headers: &HeaderMap) -> Result<Session, Response> {
    session::bind(headers, &app.users())
        .await
        .map_err(|err| server_error(app, &err))
}

/// Attach the deletion cookie when binding asked for it.
pub(crate) fn with_session_cookies(mut response: Response, session: &Session) -> Response {
    if session.clear_cookie {
        response
            .headers_mut()
            .append(SET_COOKIE, session::clear_cookie());
    }
    response
}

/// What a form page needs to participate in double-submit CSRF: the
/// token to embed, plus the cookie to set if the client has none yet.
pub(crate) struct CsrfPage {
    pub token: Option<String>,
    pub set_cookie: Option<HeaderValue>,
}

pub(crate) fn issue_csrf(app: &App, headers: &HeaderMap) -> CsrfPage {
    if !app.settings().csrf_protect() {
        return CsrfPage {
            token: None,
            set_cookie: None,
        };
    }
    if let Some(existing) = session::cookie_value(headers, CSRF_COOKIE) {
        return CsrfPage {
            token: Some(existing),
            set_cookie: None,
        };
    }
    match hash::random_url_safe(CSRF_TOKEN_SIZE) {
        Ok(token) => {
            let cookie =
                format!("{CSRF_COOKIE}={token}; Path=/; HttpOnly; Secure; SameSite=Strict");
            let set_cookie = HeaderValue::from_str(&cookie).ok();
            CsrfPage {
                token: Some(token),
                set_cookie,
            }
        }
        Err(err) => {
            error!("could not issue csrf token: {err}");
            CsrfPage {
                token: None,
                set_cookie: None,
            }
        }
    }
}

/// Double-submit check for state-changing POSTs. Always passes when the
/// feature is off.
pub(crate) fn verify_csrf(app: &App, headers: &HeaderMap, form_token: Option<&str>) -> bool {
    if !app.settings().csrf_protect() {
        return true;
    }
    let Some(cookie) = session::cookie_value(headers, CSRF_COOKIE) else {
        return false;
    };
    form_token.is_some_and(|token| !token.is_empty() && token == cookie)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_gate_passes_allowed_methods() {
        assert!(enforce_methods(&[Method::GET, Method::POST], &Method::GET).is_none());
        assert!(enforce_methods(&[Method::GET, Method::POST], &Method::POST).is_none());
    }

    #[test]
    fn method_gate_answers_options_with_204_and_allow() {
        let response =
            enforce_methods(&[Method::GET, Method::POST], &Method::OPTIONS).expect("gated");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers().get(ALLOW).and_then(|v| v.to_str().ok()),
            Some("GET, POST, OPTIONS")
        );
    }

    #[test]
    fn method_gate_rejects_disallowed_methods_with_405() {
        let response = enforce_methods(&[Method::GET], &Method::DELETE).expect("gated");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            response.headers().get(ALLOW).and_then(|v| v.to_str().ok()),
            Some("GET, OPTIONS")
        );
    }

    #[test]
    fn see_other_carries_location() {
        let response = see_other("/login");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok()),
            Some("/login")
        );
    }

    #[test]
    fn local_paths_survive_redirect_check() {
        assert_eq!(safe_redirect_target("/home"), "/home");
        assert_eq!(safe_redirect_target("/user?tab=events"), "/user?tab=events");
    }

    #[test]
    fn external_targets_fall_back_to_root() {
        assert_eq!(safe_redirect_target("https://evil.example"), "/");
        assert_eq!(safe_redirect_target("//evil.example"), "/");
        assert_eq!(safe_redirect_target("javascript:alert(1)"), "/");
        assert_eq!(safe_redirect_target("relative/path"), "/");
        assert_eq!(safe_redirect_target(""), "/");
    }

    #[test]
    fn email_validation_accepts_plausible_addresses() {
        assert!(valid_email("user@example.com"));
        assert!(valid_email("first.last@sub.example.org"));
        assert!(!valid_email("user@example"));
        assert!(!valid_email("user example.com"));
        assert!(!valid_email("@example.com"));
        assert!(!valid_email(""));
    }

    #[test]
    fn emails_normalize_to_lowercase() {
        assert_eq!(normalize_email("  User@Example.COM "), "user@example.com");
    }
}
