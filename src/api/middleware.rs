//! Process-scoped request plumbing: request ids, the per-request trace
//! span and the security response headers.

use std::net::SocketAddr;
use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, MatchedPath},
    http::{HeaderMap, HeaderValue, Request, Response},
};
use rand::Rng;
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::{Span, info, info_span};

pub const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; style-src 'self' 'unsafe-inline'";
pub const X_CONTENT_TYPE_OPTIONS: &str = "nosniff";
pub const X_FRAME_OPTIONS: &str = "DENY";
pub const X_XSS_PROTECTION: &str = "1; mode=block";

/// Request id generator: a 4-lowercase-letter prefix chosen once at
/// startup plus a shared atomic counter, rendered as
/// `{prefix}{counter:08x}`. Clones share the counter, so ids stay unique
/// across the whole process. Wrap-around is fine, the id is for log
/// correlation only.
#[derive(Clone, Debug)]
pub struct PrefixedRequestId {
    prefix: String,
    counter: Arc<AtomicU32>,
}

impl PrefixedRequestId {
    #[must_use]
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let prefix = (0..4)
            .map(|_| char::from(b'a' + rng.gen_range(0..26u8)))
            .collect();
        Self {
            prefix,
            counter: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl Default for PrefixedRequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl MakeRequestId for PrefixedRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        HeaderValue::from_str(&format!("{}{count:08x}", self.prefix))
            .ok()
            .map(RequestId::new)
    }
}

pub fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);
    let client_ip = forwarded_ip(request.headers())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string());

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        client_ip = %client_ip,
        request_id
    )
}

pub fn on_response(response: &Response<Body>, latency: Duration, _span: &Span) {
    info!(
        status = response.status().as_u16(),
        latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
        "request completed"
    );
}

/// Best-effort client address: first proxy header entry, then the socket.
#[must_use]
pub fn client_ip(headers: &HeaderMap, addr: SocketAddr) -> String {
    forwarded_ip(headers).unwrap_or_else(|| addr.ip().to_string())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    for header in ["x-forwarded-for", "x-real-ip"] {
        if let Some(value) = headers.get(header).and_then(|val| val.to_str().ok()) {
            let ip = value.split(',').next().map(str::trim).unwrap_or("");
            if !ip.is_empty() {
                return Some(ip.to_string());
            }
        }
    }
    None
}
