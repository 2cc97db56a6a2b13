//! reqwest binding for keel contracts.
//!
//! A [`Link`] owns the transport (base URL, HTTP client, session credentials, error
//! interceptors). [`ContractClient`] turns contract operations into requests and checks every
//! response against the operation's output schema; [`AuthClient`] talks to `/api/auth`.

mod auth;
mod client;
mod link;
pub mod signin;

pub use auth::AuthClient;
pub use client::ContractClient;
pub use link::{ClientInterceptor, Credentials, Link, API_URL_ENV, DEFAULT_API_URL};

use keel_protocol::{FieldIssue, ProblemDetails};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("operation {0:?} is not part of the contract")]
    UnknownOperation(String),
    #[error("{method} {path} is not part of the contract")]
    NotInContract { method: String, path: String },
    #[error("input for {operation} is invalid: {}", join_issues(.issues))]
    InvalidInput {
        operation: String,
        issues: Vec<FieldIssue>,
    },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("server answered {status}: {}", .problem.message())]
    Remote { status: u16, problem: ProblemDetails },
    #[error("response from {operation} does not match its contract: {}", join_issues(.issues))]
    ResponseValidation {
        operation: String,
        issues: Vec<FieldIssue>,
    },
    #[error("could not decode response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Remote { status, .. } => Some(*status),
            ClientError::Transport(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn problem(&self) -> Option<&ProblemDetails> {
        match self {
            ClientError::Remote { problem, .. } => Some(problem),
            _ => None,
        }
    }
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
