//! Signed-in pages: the own-account view and the admin lists.

use std::sync::Arc;

use axum::{
    Extension,
    http::{HeaderMap, Method, StatusCode},
    response::Response,
};

use crate::api::state::App;
use crate::auth::User;

use super::{
    bind_session, enforce_methods, forbidden, html_page, see_other, server_error,
    with_session_cookies,
};

pub async fn user(
    method: Method,
    headers: HeaderMap,
    Extension(app): Extension<Arc<App>>,
) -> Response {
    if let Some(response) = enforce_methods(&[Method::GET], &method) {
        return response;
    }

    let session = match bind_session(&app, &headers).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    let Some(user) = session.user.as_ref() else {
        return with_session_cookies(see_other("/login"), &session);
    };

    with_session_cookies(html_page(StatusCode::OK, app.pages().user(user)), &session)
}

pub async fn users(
    method: Method,
    headers: HeaderMap,
    Extension(app): Extension<Arc<App>>,
) -> Response {
    if let Some(response) = enforce_methods(&[Method::GET], &method) {
        return response;
    }

    let session = match bind_session(&app, &headers).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    let Some(user) = session.user.as_ref() else {
        return with_session_cookies(see_other("/login"), &session);
    };
    if !user.admin {
        return forbidden(&app);
    }

    let records = match app.users().list().await {
        Ok(records) => records,
        Err(err) => return server_error(&app, &err),
    };
    let listed: Vec<User> = records.into_iter().map(User::from).collect();

    html_page(StatusCode::OK, app.pages().users(&listed))
}

pub async fn events(
    method: Method,
    headers: HeaderMap,
    Extension(app): Extension<Arc<App>>,
) -> Response {
    if let Some(response) = enforce_methods(&[Method::GET], &method) {
        return response;
    }

    let session = match bind_session(&app, &headers).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    let Some(user) = session.user.as_ref() else {
        return with_session_cookies(see_other("/login"), &session);
    };
    if !user.admin {
        return forbidden(&app);
    }

    let records = match app.events().list().await {
        Ok(records) => records,
        Err(err) => return server_error(&app, &err),
    };

    html_page(StatusCode::OK, app.pages().events(&records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::mail::LogMailer;
    use crate::store::Store;
    use axum::http::header::{ALLOW, LOCATION};
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

    #[tokio::test]
    async fn anonymous_account_page_redirects_to_login() {
        let response = user(Method::GET, HeaderMap::new(), Extension(app())).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[LOCATION], "/login");
    }

    #[tokio::test]
    async fn anonymous_admin_pages_redirect_to_login() {
        let response = users(Method::GET, HeaderMap::new(), Extension(app())).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[LOCATION], "/login");

        let response = events(Method::GET, HeaderMap::new(), Extension(app())).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[LOCATION], "/login");
    }

    #[tokio::test]
    async fn account_pages_are_get_only() {
        let response = user(Method::POST, HeaderMap::new(), Extension(app())).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, OPTIONS");

        let response = events(Method::OPTIONS, HeaderMap::new(), Extension(app())).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[ALLOW], "GET, OPTIONS");
    }
}
