//! Email/password authentication for keel services.
//!
//! [`AuthProvider`] is the storage seam; [`MemoryAuthProvider`] keeps users and sessions in
//! process. [`routes::router`] serves the `/api/auth/*` endpoints and [`CookieSessionResolver`]
//! lets the RPC binding guard operations on the same session cookie.

mod cookie;
mod provider;
mod resolver;
pub mod routes;
mod seed;

pub use cookie::{expired_session_cookie, session_cookie, session_token, TrustedOrigins};
pub use keel_protocol::SESSION_COOKIE;
pub use provider::{AuthProvider, MemoryAuthProvider, DEFAULT_SESSION_TTL_SECS};
pub use resolver::CookieSessionResolver;
pub use seed::{load_seed, SeedFile, SeedUser};

use axum::http::StatusCode;
use keel_protocol::codes;
use keel_rpc::RpcError;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("Password must be between {MIN_PASSWORD_LEN} and {MAX_PASSWORD_LEN} characters")]
    InvalidPassword,
    #[error("User already exists")]
    UserExists,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("Origin {0} is not trusted")]
    UntrustedOrigin(String),
    #[error("invalid seed file {path}: {reason}")]
    Seed { path: String, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<AuthError> for RpcError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::InvalidCredentials | AuthError::Unauthorized => {
                RpcError::new(StatusCode::UNAUTHORIZED, codes::UNAUTHORIZED, message)
            }
            AuthError::InvalidEmail | AuthError::InvalidPassword => RpcError::bad_request(message),
            AuthError::UserExists => RpcError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "USER_ALREADY_EXISTS",
                message,
            ),
            AuthError::Forbidden | AuthError::UntrustedOrigin(_) => {
                RpcError::new(StatusCode::FORBIDDEN, codes::FORBIDDEN, message)
            }
            AuthError::Seed { .. } | AuthError::Io(_) => RpcError::internal("Internal Server Error"),
        }
    }
}
