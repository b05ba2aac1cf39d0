use std::sync::Arc;

use axum::{
    Extension,
    http::{HeaderMap, Method, StatusCode},
    response::Response,
};

use crate::api::state::App;

use super::{bind_session, enforce_methods, html_page, with_session_cookies};

/// Landing page. Renders for everyone; a bound session only changes
/// the links on offer.
pub async fn home(
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

    with_session_cookies(
        html_page(StatusCode::OK, app.pages().home(session.user.as_ref())),
        &session,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::mail::LogMailer;
    use crate::store::Store;
    use axum::http::header::ALLOW;
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
    async fn home_renders_for_anonymous_visitors() {
        let response = home(Method::GET, HeaderMap::new(), Extension(app())).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn home_is_get_only() {
        let response = home(Method::POST, HeaderMap::new(), Extension(app())).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, OPTIONS");
    }
}
