//! HTTP surface: route table, middleware stack, server loop.

use anyhow::Result;
use axum::{Extension, Router, http::HeaderValue, http::header, routing::any};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

pub mod handlers;
pub mod middleware;
pub mod pages;
pub mod state;

pub use state::App;

use middleware::PrefixedRequestId;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

/// Assemble the route table and the middleware stack around it.
///
/// Routes register with `any` so the per-handler method gate sees every
/// verb and can answer `OPTIONS`/405 with an accurate `Allow` header.
#[must_use]
pub fn router(app: Arc<App>, request_id: PrefixedRequestId) -> Router {
    Router::new()
        .route("/", any(handlers::home::home))
        .route("/health", any(handlers::health::health))
        .route("/login", any(handlers::login::login))
        .route("/logout", any(handlers::login::logout))
        .route("/register", any(handlers::register::register))
        .route("/confirm", any(handlers::confirm::confirm))
        .route("/confirm_request", any(handlers::confirm::confirm_request))
        .route(
            "/confirm_request_sent",
            any(handlers::confirm::confirm_request_sent),
        )
        .route("/confirmed", any(handlers::confirm::confirmed))
        .route("/forgot", any(handlers::reset::forgot))
        .route("/forgot_sent", any(handlers::reset::forgot_sent))
        .route("/reset", any(handlers::reset::reset))
        .route("/user", any(handlers::account::user))
        .route("/users", any(handlers::account::users))
        .route("/events", any(handlers::account::events))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(request_id))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(middleware::make_span)
                        .on_response(middleware::on_response),
                )
                .layer(SetResponseHeaderLayer::overriding(
                    header::CONTENT_SECURITY_POLICY,
                    HeaderValue::from_static(middleware::CONTENT_SECURITY_POLICY),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static(middleware::X_CONTENT_TYPE_OPTIONS),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static(middleware::X_FRAME_OPTIONS),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_XSS_PROTECTION,
                    HeaderValue::from_static(middleware::X_XSS_PROTECTION),
                ))
                .layer(Extension(app)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn serve(port: u16, app: Arc<App>) -> Result<()> {
    let router = router(app, PrefixedRequestId::new());

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to install interrupt handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!("Failed to install terminate handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}
