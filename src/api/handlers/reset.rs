//! Password recovery: the forgot form and the reset-token redeem.

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
use crate::auth::{AuthError, EventName, TokenKind, token::RESET_TOKEN_SIZE};
use crate::mail;

use super::{
    display_name, enforce_methods, forbidden, html_page, issue_csrf, normalize_email, see_other,
    server_error, valid_email, verify_csrf,
};

#[derive(Debug, Default, Deserialize)]
pub struct ForgotForm {
    email: Option<String>,
    action: Option<String>,
    csrf: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetQuery {
    rtoken: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetForm {
    rtoken: Option<String>,
    password1: Option<String>,
    password2: Option<String>,
    csrf: Option<String>,
}

pub async fn forgot(
    method: Method,
    headers: HeaderMap,
    Extension(app): Extension<Arc<App>>,
    form: Option<Form<ForgotForm>>,
) -> Response {
    if let Some(response) = enforce_methods(&[Method::GET, Method::POST], &method) {
        return response;
    }

    if method == Method::POST {
        let form = form.map_or_else(ForgotForm::default, |Form(form)| form);
        return forgot_post(&app, &headers, form).await;
    }
    render_forgot(&app, &headers, None, "")
}

fn render_forgot(app: &App, headers: &HeaderMap, message: Option<&str>, email: &str) -> Response {
    let csrf = issue_csrf(app, headers);
    let body = app.pages().forgot(message, email, csrf.token.as_deref());
    let mut response = html_page(StatusCode::OK, body);
    if let Some(cookie) = csrf.set_cookie {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

async fn forgot_post(app: &App, headers: &HeaderMap, form: ForgotForm) -> Response {
    if !verify_csrf(app, headers, form.csrf.as_deref()) {
        return forbidden(app);
    }

    let email = normalize_email(form.email.as_deref().unwrap_or(""));
    let action = form.action.as_deref().unwrap_or("");

    if email.is_empty() {
        return render_forgot(app, headers, Some("Email is required."), &email);
    }
    if !valid_email(&email) {
        return render_forgot(app, headers, Some("Email is invalid."), &email);
    }
    if action != "user" && action != "password" {
        return render_forgot(app, headers, Some("Choose what to recover."), &email);
    }

    // Unknown addresses fall through to the sent page with no email at
    // all, so the response never reveals whether an address is registered.
    let username = match app.users().username_for_email(&email).await {
        Ok(Some(username)) => Some(username),
        Ok(None) => None,
        Err(err) => return server_error(app, &err),
    };

    if let Some(username) = username {
        if action == "user" {
            let message = mail::username_email(app.settings(), &email, &username);
            if let Err(err) = app.mailer().send(&message) {
                error!("could not send username email: {err}");
            }
        } else {
            let ttl = app.settings().reset_expires();
            match app
                .tokens()
                .create(TokenKind::Reset, &username, RESET_TOKEN_SIZE, ttl)
                .await
            {
                Ok(issued) => {
                    app.events()
                        .record(EventName::SaveToken, true, &username, "reset token issued")
                        .await;
                    let name = display_name(app, &username).await;
                    let message =
                        mail::reset_email(app.settings(), &email, &name, &issued.raw, ttl);
                    if let Err(err) = app.mailer().send(&message) {
                        error!("could not send reset email: {err}");
                    }
                }
                Err(err) => {
                    error!("could not issue reset token: {err}");
                    app.events()
                        .record(EventName::SaveToken, false, &username, "reset token not issued")
                        .await;
                }
            }
        }
    }

    see_other("/forgot_sent")
}

pub async fn forgot_sent(method: Method, Extension(app): Extension<Arc<App>>) -> Response {
    if let Some(response) = enforce_methods(&[Method::GET], &method) {
        return response;
    }
    html_page(StatusCode::OK, app.pages().forgot_sent())
}

pub async fn reset(
    method: Method,
    headers: HeaderMap,
    Extension(app): Extension<Arc<App>>,
    query: Option<Query<ResetQuery>>,
    form: Option<Form<ResetForm>>,
) -> Response {
    if let Some(response) = enforce_methods(&[Method::GET, Method::POST], &method) {
        return response;
    }

    if method == Method::POST {
        let form = form.map_or_else(ResetForm::default, |Form(form)| form);
        return reset_post(&app, &headers, form).await;
    }

    let prefill = query
        .map_or_else(ResetQuery::default, |Query(query)| query)
        .rtoken
        .unwrap_or_default();
    render_reset(&app, &headers, None, &prefill)
}

fn render_reset(app: &App, headers: &HeaderMap, message: Option<&str>, rtoken: &str) -> Response {
    let csrf = issue_csrf(app, headers);
    let body = app.pages().reset(message, rtoken, csrf.token.as_deref());
    let mut response = html_page(StatusCode::OK, body);
    if let Some(cookie) = csrf.set_cookie {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

async fn reset_post(app: &App, headers: &HeaderMap, form: ResetForm) -> Response {
    if !verify_csrf(app, headers, form.csrf.as_deref()) {
        return forbidden(app);
    }

    let raw = form.rtoken.as_deref().unwrap_or("").trim().to_string();
    let password1 = form.password1.as_deref().unwrap_or("");
    let password2 = form.password2.as_deref().unwrap_or("");

    if password1.is_empty() || password2.is_empty() {
        return render_reset(app, headers, Some("All fields are required."), &raw);
    }
    if password1 != password2 {
        return render_reset(app, headers, Some("Passwords do not match."), &raw);
    }

    let username = match app.tokens().username_for(TokenKind::Reset, &raw).await {
        Ok(username) => username,
        Err(AuthError::TokenMissing | AuthError::TokenNotFound) => {
            return render_reset(
                app,
                headers,
                Some("Please provide a valid reset token."),
                &raw,
            );
        }
        Err(AuthError::TokenExpired) => {
            return render_reset(app, headers, Some("Password reset request expired."), &raw);
        }
        Err(err) => return server_error(app, &err),
    };

    match app.users().reset_password(&username, password1, &raw).await {
        Ok(()) => {}
        // Somebody else redeemed the token between lookup and claim.
        Err(AuthError::TokenNotFound) => {
            return render_reset(
                app,
                headers,
                Some("Please provide a valid reset token."),
                &raw,
            );
        }
        Err(err) => return server_error(app, &err),
    }

    app.events()
        .record(EventName::ResetPass, true, &username, "password reset")
        .await;

    see_other("/login")
}
