//! Operation contracts shared by the keel server and client bindings.
//!
//! A contract is plain data: every operation declares its method, path template, input schema
//! and output schema exactly once, and both bindings read the same `Arc`'d descriptor. Schemas are
//! derived from Rust types with `schemars` and compiled with `jsonschema`, so the shapes the server
//! accepts and the shapes the client expects cannot drift apart.

mod contract;
pub mod openapi;
mod path;
mod procedure;
mod schema;

pub use contract::{Contract, ContractBuilder, ContractEntry};
pub use path::{PathTemplate, Segment};
pub use procedure::{route, Method, OperationDescriptor, Procedure, RouteSpec};
pub use schema::{Schema, ScalarKind};

pub use keel_protocol::FieldIssue;

/// Errors raised while declaring operations or assembling a contract.
#[derive(thiserror::Error, Debug)]
pub enum ContractError {
    #[error("invalid path template {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("invalid operation name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },
    #[error("operation {0:?} is declared more than once")]
    DuplicateName(String),
    #[error("{method} {path} is declared by both {first:?} and {second:?}")]
    RouteCollision {
        method: Method,
        path: String,
        first: String,
        second: String,
    },
    #[error("{second:?} at {path} and {first:?} at {other} match the same URLs with different parameter names")]
    ConflictingParams {
        path: String,
        other: String,
        first: String,
        second: String,
    },
    #[error("path parameter {param:?} of {path} is not a property of the input schema")]
    UndeclaredPathParam { path: String, param: String },
    #[error("invalid schema for {name}: {reason}")]
    InvalidSchema { name: String, reason: String },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
