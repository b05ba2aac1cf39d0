//! Account confirmation: requesting a fresh token and redeeming one.

use std::sync::Arc;

use axum::{
    Extension, Form,
    extract::Query,
    http::{HeaderMap, Method, StatusCode, header::SET_COOKIE},
    response::Response,
};
use serde::Deserialize;
use tracing::error;

use crate::api::state::App;
use crate::auth::{
    AuthError, EventName, TokenKind,
    token::{CONFIRM_TOKEN_SIZE, confirm_ttl},
};
use crate::mail;

use super::{
    display_name, enforce_methods, forbidden, html_page, issue_csrf, normalize_email, see_other,
    server_error, valid_email, verify_csrf,
};

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmQuery {
    ctoken: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmForm {
    ctoken: Option<String>,
    csrf: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EmailForm {
    email: Option<String>,
    csrf: Option<String>,
}

pub async fn confirm(
    method: Method,
    headers: HeaderMap,
    Extension(app): Extension<Arc<App>>,
    query: Option<Query<ConfirmQuery>>,
    form: Option<Form<ConfirmForm>>,
) -> Response {
    if let Some(response) = enforce_methods(&[Method::GET, Method::POST], &method) {
        return response;
    }

    if method == Method::POST {
        let form = form.map_or_else(ConfirmForm::default, |Form(form)| form);
        return post(&app, &headers, form).await;
    }

    let prefill = query
        .map_or_else(ConfirmQuery::default, |Query(query)| query)
        .ctoken
        .unwrap_or_default();
    render(&app, &headers, None, &prefill)
}

fn render(app: &App, headers: &HeaderMap, message: Option<&str>, ctoken: &str) -> Response {
    let csrf = issue_csrf(app, headers);
    let body = app.pages().confirm(message, ctoken, csrf.token.as_deref());
    let mut response = html_page(StatusCode::OK, body);
    if let Some(cookie) = csrf.set_cookie {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

async fn post(app: &App, headers: &HeaderMap, form: ConfirmForm) -> Response {
    if !verify_csrf(app, headers, form.csrf.as_deref()) {
        return forbidden(app);
    }

    let raw = form.ctoken.as_deref().unwrap_or("").trim().to_string();

    let username = match app.tokens().username_for(TokenKind::Confirm, &raw).await {
        Ok(username) => username,
        Err(AuthError::TokenMissing) => {
            return render(app, headers, Some("Please provide a token."), &raw);
        }
        Err(AuthError::TokenNotFound) => {
            return render(app, headers, Some("Token is invalid."), &raw);
        }
        Err(AuthError::TokenExpired) => {
            return render(app, headers, Some("Token is expired."), &raw);
        }
        Err(err) => return server_error(app, &err),
    };

    match app.users().confirm(&username, &raw).await {
        Ok(()) => {}
        // Somebody else redeemed the token between lookup and claim.
        Err(AuthError::TokenNotFound) => {
            return render(app, headers, Some("Token is invalid."), &raw);
        }
        Err(err) => return server_error(app, &err),
    }

    app.events()
        .record(EventName::Confirmed, true, &username, "email confirmed")
        .await;

    see_other("/confirmed")
}

pub async fn confirm_request(
    method: Method,
    headers: HeaderMap,
    Extension(app): Extension<Arc<App>>,
    form: Option<Form<EmailForm>>,
) -> Response {
    if let Some(response) = enforce_methods(&[Method::GET, Method::POST], &method) {
        return response;
    }

    if method == Method::POST {
        let form = form.map_or_else(EmailForm::default, |Form(form)| form);
        return request_post(&app, &headers, form).await;
    }
    render_request(&app, &headers, None, "")
}

fn render_request(app: &App, headers: &HeaderMap, message: Option<&str>, email: &str) -> Response {
    let csrf = issue_csrf(app, headers);
    let body = app
        .pages()
        .confirm_request(message, email, csrf.token.as_deref());
    let mut response = html_page(StatusCode::OK, body);
    if let Some(cookie) = csrf.set_cookie {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

async fn request_post(app: &App, headers: &HeaderMap, form: EmailForm) -> Response {
    if !verify_csrf(app, headers, form.csrf.as_deref()) {
        return forbidden(app);
    }

    let email = normalize_email(form.email.as_deref().unwrap_or(""));
    if email.is_empty() {
        return render_request(app, headers, Some("Email is required."), &email);
    }
    if !valid_email(&email) {
        return render_request(app, headers, Some("Email is invalid."), &email);
    }

    // Unknown addresses get a notice instead of an error page, so the
    // response never reveals whether an address is registered.
    match app.users().username_for_email(&email).await {
        Ok(Some(username)) => {
            match app
                .tokens()
                .create(TokenKind::Confirm, &username, CONFIRM_TOKEN_SIZE, confirm_ttl())
                .await
            {
                Ok(issued) => {
                    app.events()
                        .record(EventName::SaveToken, true, &username, "confirm token issued")
                        .await;
                    let name = display_name(app, &username).await;
                    let message =
                        mail::confirm_email(app.settings(), &email, &name, &issued.raw, confirm_ttl());
                    if let Err(err) = app.mailer().send(&message) {
                        error!("could not send confirmation email: {err}");
                    }
                }
                Err(err) => {
                    error!("could not issue confirm token: {err}");
                    app.events()
                        .record(
                            EventName::SaveToken,
                            false,
                            &username,
                            "confirm token not issued",
                        )
                        .await;
                }
            }
        }
        Ok(None) => {
            let message = mail::not_registered_email(app.settings(), &email);
            if let Err(err) = app.mailer().send(&message) {
                error!("could not send notice email: {err}");
            }
        }
        Err(err) => return server_error(app, &err),
    }

    see_other("/confirm_request_sent")
}

pub async fn confirm_request_sent(method: Method, Extension(app): Extension<Arc<App>>) -> Response {
    if let Some(response) = enforce_methods(&[Method::GET], &method) {
        return response;
    }
    html_page(StatusCode::OK, app.pages().confirm_request_sent())
}

pub async fn confirmed(method: Method, Extension(app): Extension<Arc<App>>) -> Response {
    if let Some(response) = enforce_methods(&[Method::GET], &method) {
        return response;
    }
    html_page(StatusCode::OK, app.pages().confirmed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::mail::LogMailer;
    use crate::store::Store;
    use sqlx::postgres::PgPoolOptions;

    fn app() -> Arc<App> {
        let settings = serde_json::from_str::<Config>(
            r#"{
                "App": { "Name": "entrata" },
                "Auth": { "BaseURL": "https://accounts.example.com", "LoginExpires": "24h" },
                "SQL": { "DriverName": "postgres", "DataSourceName": "postgres://localhost/entrata" },
                "SMTP": { "Host": "smtp.example.com", "Port": 587, "User": "no-reply@example.com", "Password": "secret" }
            }"#,
        )
        .expect("valid config JSON")
        .validate()
        .expect("valid settings");
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/entrata")
            .expect("lazy pool");
        Arc::new(
            App::builder()
                .settings(settings)
                .store(Store::from_pool(pool))
                .mailer(Arc::new(LogMailer))
                .build()
                .expect("app state"),
        )
    }

    async fn body_of(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8 body")
    }

    #[tokio::test]
    async fn get_prefills_the_token_from_the_query() {
        let query = ConfirmQuery {
            ctoken: Some("TOKEN123".to_string()),
        };
        let response = confirm(
            Method::GET,
            HeaderMap::new(),
            Extension(app()),
            Some(Query(query)),
            None,
        )
        .await;
        let body = body_of(response).await;
        assert!(body.contains("name=\"ctoken\" value=\"TOKEN123\""));
    }

    #[tokio::test]
    async fn blank_token_asks_for_one() {
        let form = ConfirmForm {
            ctoken: Some("   ".to_string()),
            csrf: None,
        };
        let response = confirm(
            Method::POST,
            HeaderMap::new(),
            Extension(app()),
            None,
            Some(Form(form)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_of(response).await;
        assert!(body.contains("Please provide a token."));
    }

    #[tokio::test]
    async fn confirm_request_validates_the_email() {
        let missing = EmailForm {
            email: None,
            csrf: None,
        };
        let response = confirm_request(
            Method::POST,
            HeaderMap::new(),
            Extension(app()),
            Some(Form(missing)),
        )
        .await;
        assert!(body_of(response).await.contains("Email is required."));

        let malformed = EmailForm {
            email: Some("not-an-email".to_string()),
            csrf: None,
        };
        let response = confirm_request(
            Method::POST,
            HeaderMap::new(),
            Extension(app()),
            Some(Form(malformed)),
        )
        .await;
        assert!(body_of(response).await.contains("Email is invalid."));
    }

    #[tokio::test]
    async fn static_pages_render() {
        let sent = confirm_request_sent(Method::GET, Extension(app())).await;
        assert_eq!(sent.status(), StatusCode::OK);
        assert!(body_of(sent).await.contains("confirmation link"));

        let done = confirmed(Method::GET, Extension(app())).await;
        assert_eq!(done.status(), StatusCode::OK);
        assert!(body_of(done).await.contains("confirmed"));
    }

    #[tokio::test]
    async fn options_preflight_is_answered() {
        let response = confirm(
            Method::OPTIONS,
            HeaderMap::new(),
            Extension(app()),
            None,
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
