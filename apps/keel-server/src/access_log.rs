use std::time::Instant;

use axum::extract::{MatchedPath, State};
use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::Response;
use sha2::Digest as _;

use crate::{request_ctx, security};

#[derive(Clone, Copy, Debug)]
pub(crate) struct AccessLog {
    pub enabled: bool,
}

/// One `http.access` event per request when `KEEL_ACCESS_LOG=1`.
pub(crate) async fn access_log_mw(
    State(cfg): State<AccessLog>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if !cfg.enabled {
        return next.run(req).await;
    }
    let started = Instant::now();
    let method = req.method().clone();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let request_id = request_ctx::request_id(&req);
    let ua_hash = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(|ua| hex::encode(sha2::Sha256::digest(ua.as_bytes())));
    let remote = security::client_addr();

    let res = next.run(req).await;
    let dur_ms = started.elapsed().as_millis() as u64;
    tracing::info!(
        target: keel_otel::ACCESS_TARGET,
        method = method.as_str(),
        path = %path,
        status = res.status().as_u16(),
        dur_ms,
        remote = remote.as_deref().unwrap_or("-"),
        request_id = request_id.as_ref().map(|r| r.as_str()).unwrap_or("-"),
        request_id_generated = request_id.as_ref().is_some_and(|r| r.generated()),
        ua_hash = ua_hash.as_deref().unwrap_or("-"),
        "request"
    );
    res
}
