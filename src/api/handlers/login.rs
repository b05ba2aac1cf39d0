//! `/login` and `/logout`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Extension, Form,
    extract::{ConnectInfo, Query},
    http::{HeaderMap, Method, StatusCode, header::SET_COOKIE},
    response::Response,
};
use serde::Deserialize;
use tracing::error;

use crate::api::middleware;
use crate::api::state::App;
use crate::auth::{AuthError, EventName, TokenKind, session, token::LOGIN_TOKEN_SIZE};

use super::{
    enforce_methods, forbidden, html_page, issue_csrf, safe_redirect_target, see_other,
    server_error, verify_csrf,
};

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    username: Option<String>,
    password: Option<String>,
    remember: Option<String>,
    r: Option<String>,
    csrf: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RedirectQuery {
    r: Option<String>,
}

pub async fn login(
    method: Method,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(app): Extension<Arc<App>>,
    query: Option<Query<RedirectQuery>>,
    form: Option<Form<LoginForm>>,
) -> Response {
    if let Some(response) = enforce_methods(&[Method::GET, Method::POST], &method) {
        return response;
    }

    let query = query.map_or_else(RedirectQuery::default, |Query(query)| query);

    if method == Method::POST {
        let form = form.map_or_else(LoginForm::default, |Form(form)| form);
        return post(&app, &headers, addr, &query, form).await;
    }

    let redirect = query.r.as_deref().map_or("", safe_redirect_target);
    render(&app, &headers, None, "", redirect)
}

fn render(
    app: &App,
    headers: &HeaderMap,
    message: Option<&str>,
    username: &str,
    redirect: &str,
) -> Response {
    let csrf = issue_csrf(app, headers);
    let body = app
        .pages()
        .login(message, username, redirect, csrf.token.as_deref());
    let mut response = html_page(StatusCode::OK, body);
    if let Some(cookie) = csrf.set_cookie {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

async fn post(
    app: &App,
    headers: &HeaderMap,
    addr: SocketAddr,
    query: &RedirectQuery,
    form: LoginForm,
) -> Response {
    if !verify_csrf(app, headers, form.csrf.as_deref()) {
        return forbidden(app);
    }

    let username = form.username.as_deref().unwrap_or("").trim().to_string();
    let password = form.password.as_deref().unwrap_or("");
    let redirect = form
        .r
        .as_deref()
        .or(query.r.as_deref())
        .map_or("", safe_redirect_target);

    let message = match (username.is_empty(), password.is_empty()) {
        (true, true) => Some("Username and password are required."),
        (true, false) => Some("Username is required."),
        (false, true) => Some("Password is required."),
        (false, false) => None,
    };
    if let Some(message) = message {
        return render(app, headers, Some(message), &username, redirect);
    }

    match app.users().authenticate(&username, password).await {
        Ok(()) => {}
        Err(AuthError::UserNotFound | AuthError::InvalidPassword) => {
            app.events()
                .record(EventName::Login, false, &username, "invalid credentials")
                .await;
            return render(app, headers, Some("Login failed."), &username, redirect);
        }
        Err(err) => return server_error(app, &err),
    }

    let issued = match app
        .tokens()
        .create(
            TokenKind::Login,
            &username,
            LOGIN_TOKEN_SIZE,
            app.settings().login_expires(),
        )
        .await
    {
        Ok(issued) => issued,
        Err(err) => return server_error(app, &err),
    };

    let client_ip = middleware::client_ip(headers, addr);
    app.events()
        .record(
            EventName::Login,
            true,
            &username,
            &format!("login from {client_ip}"),
        )
        .await;

    let remember = form.remember.as_deref() == Some("on");
    let cookie = match session::login_cookie(&issued.raw, issued.expires, remember) {
        Ok(cookie) => cookie,
        Err(err) => return server_error(app, &err),
    };

    let target = if redirect.is_empty() { "/" } else { redirect };
    let mut response = see_other(target);
    response.headers_mut().append(SET_COOKIE, cookie);
    response
}

pub async fn logout(
    method: Method,
    headers: HeaderMap,
    Extension(app): Extension<Arc<App>>,
) -> Response {
    if let Some(response) = enforce_methods(&[Method::GET], &method) {
        return response;
    }

    let session = match session::bind(&headers, &app.users()).await {
        Ok(session) => session,
        Err(err) => return server_error(&app, &err),
    };

    if let Some(raw) = session.raw_token.as_deref() {
        if let Err(err) = app.tokens().remove(TokenKind::Login, raw).await {
            error!("could not remove login token on logout: {err}");
        }
    }

    if let Some(user) = session.user.as_ref() {
        app.events()
            .record(EventName::Logout, true, &user.username, "session closed")
            .await;
    }

    let mut response = html_page(StatusCode::OK, app.pages().logout());
    response
        .headers_mut()
        .append(SET_COOKIE, session::clear_cookie());
    response
}
