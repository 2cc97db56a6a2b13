use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use keel_protocol::SessionView;
use keel_rpc::SessionResolver;

use crate::{session_token, AuthProvider};

/// Resolves RPC sessions from the auth cookie (or bearer token) through an [`AuthProvider`].
#[derive(Clone)]
pub struct CookieSessionResolver {
    provider: Arc<dyn AuthProvider>,
}

impl CookieSessionResolver {
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl SessionResolver for CookieSessionResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Option<SessionView> {
        let token = session_token(headers)?;
        match self.provider.session(&token).await {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!("session lookup failed: {err}");
                None
            }
        }
    }
}
