use async_trait::async_trait;
use axum::http::HeaderMap;
use keel_protocol::{Role, SessionView};

/// Who may call an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    Anonymous,
    #[default]
    Authenticated,
    Role(Role),
}

impl Access {
    pub(crate) fn check(&self, session: Option<&SessionView>) -> Result<(), crate::ServerError> {
        match (self, session) {
            (Access::Anonymous, _) => Ok(()),
            (_, None) => Err(crate::ServerError::Unauthorized),
            (Access::Authenticated, Some(_)) => Ok(()),
            (Access::Role(role), Some(session)) if session.role() == *role => Ok(()),
            (Access::Role(_), Some(_)) => Err(crate::ServerError::Forbidden),
        }
    }
}

/// Looks up the caller's session from request headers.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> Option<SessionView>;
}

/// Resolver for deployments without authentication: nobody is signed in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSessions;

#[async_trait]
impl SessionResolver for NoSessions {
    async fn resolve(&self, _headers: &HeaderMap) -> Option<SessionView> {
        None
    }
}

/// Per-request context handed to every handler.
#[derive(Debug, Clone)]
pub struct RpcContext {
    operation: String,
    session: Option<SessionView>,
    headers: HeaderMap,
    request_id: Option<String>,
}

impl RpcContext {
    pub(crate) fn new(operation: &str, session: Option<SessionView>, headers: HeaderMap) -> Self {
        let request_id = headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Self {
            operation: operation.to_string(),
            session,
            headers,
            request_id,
        }
    }

    /// Contract name of the operation being served.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn session(&self) -> Option<&SessionView> {
        self.session.as_ref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }
}
