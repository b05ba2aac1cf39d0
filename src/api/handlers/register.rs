//! `/register`.

use std::sync::Arc;

use axum::{
    Extension, Form,
    http::{HeaderMap, Method, StatusCode, header::SET_COOKIE},
    response::Response,
};
use serde::Deserialize;
use tracing::error;

use crate::api::state::App;
use crate::auth::{
    AuthError, EventName, NewUser, TokenKind,
    token::{CONFIRM_TOKEN_SIZE, confirm_ttl},
};
use crate::mail;

use super::{
    enforce_methods, forbidden, html_page, issue_csrf, normalize_email, see_other, server_error,
    valid_email, verify_csrf,
};

const MAX_USERNAME_LEN: usize = 30;

#[derive(Debug, Default, Deserialize)]
pub struct RegisterForm {
    username: Option<String>,
    #[serde(rename = "fullName")]
    full_name: Option<String>,
    email: Option<String>,
    password1: Option<String>,
    password2: Option<String>,
    csrf: Option<String>,
}

pub async fn register(
    method: Method,
    headers: HeaderMap,
    Extension(app): Extension<Arc<App>>,
    form: Option<Form<RegisterForm>>,
) -> Response {
    if let Some(response) = enforce_methods(&[Method::GET, Method::POST], &method) {
        return response;
    }

    if method == Method::POST {
        let form = form.map_or_else(RegisterForm::default, |Form(form)| form);
        return post(&app, &headers, form).await;
    }
    render(&app, &headers, None, "", "", "")
}

fn render(
    app: &App,
    headers: &HeaderMap,
    message: Option<&str>,
    username: &str,
    full_name: &str,
    email: &str,
) -> Response {
    let csrf = issue_csrf(app, headers);
    let body = app
        .pages()
        .register(message, username, full_name, email, csrf.token.as_deref());
    let mut response = html_page(StatusCode::OK, body);
    if let Some(cookie) = csrf.set_cookie {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

async fn post(app: &App, headers: &HeaderMap, form: RegisterForm) -> Response {
    if !verify_csrf(app, headers, form.csrf.as_deref()) {
        return forbidden(app);
    }

    let username = form.username.as_deref().unwrap_or("").trim().to_string();
    let full_name = form.full_name.as_deref().unwrap_or("").trim().to_string();
    let email = normalize_email(form.email.as_deref().unwrap_or(""));
    let password1 = form.password1.as_deref().unwrap_or("");
    let password2 = form.password2.as_deref().unwrap_or("");

    let reject = |app: &App, headers: &HeaderMap, message, reason| {
        let response = render(app, headers, Some(message), &username, &full_name, &email);
        (response, reason)
    };

    let failure = if username.is_empty()
        || full_name.is_empty()
        || email.is_empty()
        || password1.is_empty()
        || password2.is_empty()
    {
        Some(reject(app, headers, "All fields are required.", "missing fields"))
    } else if username.chars().count() > MAX_USERNAME_LEN {
        Some(reject(
            app,
            headers,
            "Username must be 30 characters or fewer.",
            "username too long",
        ))
    } else if !valid_email(&email) {
        Some(reject(app, headers, "Email is invalid.", "invalid email"))
    } else if password1 != password2 {
        Some(reject(
            app,
            headers,
            "Passwords do not match.",
            "password mismatch",
        ))
    } else {
        None
    };
    if let Some((response, reason)) = failure {
        app.events()
            .record(EventName::Register, false, &username, reason)
            .await;
        return response;
    }

    match app.users().user_exists(&username).await {
        Ok(true) => {
            app.events()
                .record(EventName::Register, false, &username, "username taken")
                .await;
            return render(
                app,
                headers,
                Some("Username is already taken."),
                &username,
                &full_name,
                &email,
            );
        }
        Ok(false) => {}
        Err(err) => return server_error(app, &err),
    }
    match app.users().email_exists(&email).await {
        Ok(true) => {
            app.events()
                .record(EventName::Register, false, &username, "email taken")
                .await;
            return render(
                app,
                headers,
                Some("Email is already registered."),
                &username,
                &full_name,
                &email,
            );
        }
        Ok(false) => {}
        Err(err) => return server_error(app, &err),
    }

    let new_user = NewUser {
        username: &username,
        full_name: &full_name,
        email: &email,
        password: password1,
    };
    if let Err(err) = app.users().register(new_user).await {
        // Unique violations can still fire here when two registrations race.
        let message = match err {
            AuthError::Duplicate("username") => "Username is already taken.",
            AuthError::Duplicate(_) => "Email is already registered.",
            err => return server_error(app, &err),
        };
        app.events()
            .record(EventName::Register, false, &username, "duplicate account")
            .await;
        return render(app, headers, Some(message), &username, &full_name, &email);
    }

    app.events()
        .record(EventName::Register, true, &username, "account created")
        .await;

    match app
        .tokens()
        .create(TokenKind::Confirm, &username, CONFIRM_TOKEN_SIZE, confirm_ttl())
        .await
    {
        Ok(issued) => {
            app.events()
                .record(EventName::SaveToken, true, &username, "confirm token issued")
                .await;
            let message = mail::confirm_email(
                app.settings(),
                &email,
                &full_name,
                &issued.raw,
                confirm_ttl(),
            );
            if let Err(err) = app.mailer().send(&message) {
                error!("could not send confirmation email: {err}");
            }
        }
        Err(err) => {
            error!("could not issue confirm token: {err}");
            app.events()
                .record(EventName::SaveToken, false, &username, "confirm token not issued")
                .await;
        }
    }

    see_other("/login")
}
