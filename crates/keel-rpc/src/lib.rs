//! axum binding for keel contracts.
//!
//! Every request to a bound operation runs the same pipeline: session guard, input assembly and
//! validation against the contract's input schema, the handler, output validation against the
//! output schema, then JSON serialization. Failures are logged, passed to the registered error
//! interceptors and answered with RFC 7807 problem details.

mod context;
mod error;
mod input;
mod router;

pub use context::{Access, NoSessions, RpcContext, SessionResolver};
pub use error::{BindingError, RpcError, ServerError};
pub use router::{ErrorEvent, ErrorInterceptor, RpcRouter};
