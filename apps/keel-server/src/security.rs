use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;

tokio::task_local! {
    static CLIENT_ADDR: Option<String>;
}

const CSP: &str = "default-src 'self';base-uri 'self';font-src 'self' https: data:;\
form-action 'self';frame-ancestors 'self';img-src 'self' data:;object-src 'none';\
script-src 'self';script-src-attr 'none';style-src 'self' https: 'unsafe-inline';\
upgrade-insecure-requests";

const HSTS: &str = "max-age=31536000; includeSubDomains";

/// Headers applied to every response unless the handler already set them.
const DEFAULT_HEADERS: &[(&str, &str)] = &[
    ("content-security-policy", CSP),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("origin-agent-cluster", "?1"),
    ("referrer-policy", "no-referrer"),
    ("x-content-type-options", "nosniff"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-permitted-cross-domain-policies", "none"),
    ("x-xss-protection", "0"),
];

#[derive(Clone, Copy, Debug)]
pub(crate) struct SecurityHeaders {
    pub hsts: bool,
}

pub(crate) async fn headers_mw(
    State(cfg): State<SecurityHeaders>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let mut res = next.run(req).await;
    let h = res.headers_mut();
    for &(name, value) in DEFAULT_HEADERS {
        add_header(h, name, value);
    }
    if cfg.hsts {
        add_header(h, "strict-transport-security", HSTS);
    }
    h.remove("x-powered-by");
    res
}

fn add_header(h: &mut HeaderMap, name: &'static str, value: &'static str) {
    let name = HeaderName::from_static(name);
    if !h.contains_key(&name) {
        h.insert(name, HeaderValue::from_static(value));
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct ClientAddrPolicy {
    pub trust_forward: bool,
}

/// Make the caller's address available to inner layers through [`client_addr`].
pub(crate) async fn client_addr_mw(
    State(policy): State<ClientAddrPolicy>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let ip = extract_client_addr(&req, policy.trust_forward);
    CLIENT_ADDR
        .scope(ip, async move { next.run(req).await })
        .await
}

pub(crate) fn client_addr() -> Option<String> {
    CLIENT_ADDR.try_with(|opt| opt.clone()).unwrap_or(None)
}

fn extract_client_addr<B>(req: &Request<B>, trust_forward: bool) -> Option<String> {
    if trust_forward {
        let forwarded = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .find(|part| !part.is_empty())
                    .map(str::to_string)
            });
        if forwarded.is_some() {
            return forwarded;
        }
        if let Some(real) = req
            .headers()
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
        {
            return Some(real);
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}
