use std::sync::Arc;

use anyhow::Context as _;
use axum::http::HeaderValue;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use keel_auth::routes::{router as auth_router, AuthState};
use keel_auth::{CookieSessionResolver, MemoryAuthProvider, TrustedOrigins};
use keel_rpc::{Access, RpcRouter};
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::access_log::{access_log_mw, AccessLog};
use crate::api::{self, SpecDocument};
use crate::config::ServerConfig;
use crate::request_ctx::correlation_mw;
use crate::security::{client_addr_mw, headers_mw, ClientAddrPolicy, SecurityHeaders};
use crate::throttle::{throttle_mw, Throttle};

pub(crate) fn build(cfg: &ServerConfig) -> anyhow::Result<Router> {
    if let Some(url) = &cfg.database_url {
        info!(host = url.host_str().unwrap_or("-"), "database configured");
    }

    let provider = Arc::new(MemoryAuthProvider::new(chrono::Duration::seconds(
        cfg.session_ttl_secs,
    )));
    if let Some(path) = &cfg.auth_users {
        let seed = keel_auth::load_seed(path)
            .with_context(|| format!("loading auth users from {}", path.display()))?;
        let created = provider.seed(&seed).context("seeding auth users")?;
        info!(path = %path.display(), created, "seeded auth users");
    }

    let api = keel_api::api()?;
    let contract = keel_api::contract()?;
    let spec = Arc::new(SpecDocument::render(&contract)?);

    let rpc = RpcRouter::new(contract)
        .session_resolver(Arc::new(CookieSessionResolver::new(provider.clone())))
        .on_error(|event| {
            if !event.error.is_internal() {
                warn!(
                    target: "keel::rpc",
                    operation = event.operation,
                    status = event.error.status().as_u16(),
                    request_id = event.request_id.unwrap_or("-"),
                    "{}",
                    event.error
                );
            }
        })
        .implement_with(&api.hello.get, Access::Anonymous, api::hello_get)?
        .into_router()?;

    let auth = auth_router(AuthState::new(
        provider,
        TrustedOrigins::for_web_origin(&cfg.cors_origin),
    ));

    let router = Router::new()
        .route("/healthz", get(api::healthz))
        .route("/spec/openapi.json", get(api::spec_openapi).with_state(spec))
        .merge(rpc)
        .merge(auth);

    attach_layers(router, cfg)
}

fn cors_layer(origin: &str) -> anyhow::Result<CorsLayer> {
    let origin = HeaderValue::from_str(origin.trim_end_matches('/'))
        .with_context(|| format!("CORS_ORIGIN {origin:?} is not a valid header value"))?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

/// Outermost first: correlation id, client address, access log, security headers, CORS,
/// throttle, tracing.
fn attach_layers(router: Router, cfg: &ServerConfig) -> anyhow::Result<Router> {
    let throttle = Arc::new(Throttle::new(cfg.throttle));
    Ok(router
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn_with_state(throttle, throttle_mw))
        .layer(cors_layer(&cfg.cors_origin)?)
        .layer(middleware::from_fn_with_state(
            SecurityHeaders { hsts: cfg.hsts },
            headers_mw,
        ))
        .layer(middleware::from_fn_with_state(
            AccessLog {
                enabled: cfg.access_log,
            },
            access_log_mw,
        ))
        .layer(middleware::from_fn_with_state(
            ClientAddrPolicy {
                trust_forward: cfg.trust_forward,
            },
            client_addr_mw,
        ))
        .layer(middleware::from_fn(correlation_mw)))
}
