use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use keel_protocol::codes;
use keel_rpc::RpcError;
use parking_lot::Mutex;

use crate::config::ThrottleConfig;
use crate::security;

const PRUNE_AT: usize = 4096;
const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    hits: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

impl Decision {
    fn apply_headers(&self, headers: &mut HeaderMap) {
        let reset = ceil_secs(self.reset_after);
        headers.insert("x-ratelimit-limit", HeaderValue::from(self.limit));
        headers.insert("x-ratelimit-remaining", HeaderValue::from(self.remaining));
        headers.insert("x-ratelimit-reset", HeaderValue::from(reset));
        if !self.allowed {
            headers.insert("retry-after", HeaderValue::from(reset));
        }
    }
}

/// Fixed-window request quota per client address.
#[derive(Debug)]
pub(crate) struct Throttle {
    limit: u32,
    ttl: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl Throttle {
    pub fn new(cfg: ThrottleConfig) -> Self {
        Self {
            limit: cfg.limit,
            ttl: cfg.ttl,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn hit(&self, key: &str, now: Instant) -> Decision {
        let mut windows = self.windows.lock();
        if windows.len() >= PRUNE_AT {
            let ttl = self.ttl;
            windows.retain(|_, w| now.saturating_duration_since(w.started) < ttl);
        }
        let window = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            hits: 0,
        });
        if now.saturating_duration_since(window.started) >= self.ttl {
            *window = Window {
                started: now,
                hits: 0,
            };
        }
        let allowed = window.hits < self.limit;
        if allowed {
            window.hits += 1;
        }
        let elapsed = now.saturating_duration_since(window.started);
        Decision {
            allowed,
            limit: self.limit,
            remaining: self.limit.saturating_sub(window.hits),
            reset_after: self.ttl.saturating_sub(elapsed),
        }
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

pub(crate) async fn throttle_mw(
    State(throttle): State<Arc<Throttle>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let key = security::client_addr().unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
    let decision = throttle.hit(&key, Instant::now());
    let mut res = if decision.allowed {
        next.run(req).await
    } else {
        tracing::warn!(client = %key, path = %req.uri().path(), "request throttled");
        RpcError::new(
            StatusCode::TOO_MANY_REQUESTS,
            codes::TOO_MANY_REQUESTS,
            "Too Many Requests",
        )
        .into_response()
    };
    decision.apply_headers(res.headers_mut());
    res
}
