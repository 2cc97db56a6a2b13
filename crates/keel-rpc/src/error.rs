use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use keel_contract::Method;
use keel_protocol::{codes, FieldIssue, ProblemDetails};

/// Client-safe failure returned by a handler. Everything in it is sent to the caller.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{status} {code}: {message}")]
pub struct RpcError {
    status: StatusCode,
    code: String,
    message: String,
    detail: Option<String>,
}

impl RpcError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            detail: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, codes::UNAUTHORIZED, "Unauthorized")
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, codes::FORBIDDEN, "Forbidden")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, codes::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL_SERVER_ERROR,
            message,
        )
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn problem(&self) -> ProblemDetails {
        let mut problem =
            ProblemDetails::new(self.status.as_u16(), self.message.clone()).with_code(&self.code);
        if let Some(detail) = &self.detail {
            problem = problem.with_detail(detail.clone());
        }
        problem
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        problem_response(self.problem())
    }
}

/// Every way a bound request can fail, before it is reduced to problem details.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("input failed validation ({} issue(s))", .0.len())]
    Validation(Vec<FieldIssue>),
    #[error("no active session")]
    Unauthorized,
    #[error("session role does not grant access")]
    Forbidden,
    #[error(transparent)]
    Handler(#[from] RpcError),
    #[error("output violates the contract ({} issue(s))", .0.len())]
    ContractViolation(Vec<FieldIssue>),
    #[error("failed to serialize output: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Validation(_) => StatusCode::BAD_REQUEST,
            ServerError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServerError::Forbidden => StatusCode::FORBIDDEN,
            ServerError::Handler(err) => err.status(),
            ServerError::ContractViolation(_) | ServerError::Serialize(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether this failure is the server's fault rather than the caller's.
    pub fn is_internal(&self) -> bool {
        self.status().is_server_error()
    }

    /// Client-facing body. Internal failures carry no detail beyond a generic title.
    pub fn problem(&self) -> ProblemDetails {
        match self {
            ServerError::Validation(issues) => ProblemDetails::new(400, "Input validation failed")
                .with_code(codes::BAD_REQUEST)
                .with_issues(issues.clone()),
            ServerError::Unauthorized => RpcError::unauthorized().problem(),
            ServerError::Forbidden => RpcError::forbidden().problem(),
            ServerError::Handler(err) => err.problem(),
            ServerError::ContractViolation(_) | ServerError::Serialize(_) => {
                ProblemDetails::new(500, "Internal Server Error")
                    .with_code(codes::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

/// Errors raised while binding handlers to a contract.
#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    #[error("{method} {path} is not part of the contract")]
    NotInContract { method: Method, path: String },
    #[error("operation {0:?} is implemented more than once")]
    AlreadyImplemented(String),
    #[error("operations without a handler: {}", .0.join(", "))]
    Unimplemented(Vec<String>),
}

pub(crate) fn problem_response(problem: ProblemDetails) -> Response {
    let status =
        StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, axum::Json(problem)).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/problem+json"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_problems_hide_issues() {
        let err = ServerError::ContractViolation(vec![FieldIssue::new("/message", "bad")]);
        let problem = err.problem();
        assert_eq!(problem.status, 500);
        assert_eq!(problem.code.as_deref(), Some(codes::INTERNAL_SERVER_ERROR));
        assert!(problem.issues.is_empty());
        assert!(problem.detail.is_none());
        assert!(err.is_internal());
    }

    #[test]
    fn validation_problems_carry_issues() {
        let err = ServerError::Validation(vec![FieldIssue::new("/email", "not an email")]);
        let problem = err.problem();
        assert_eq!(problem.status, 400);
        assert_eq!(problem.code.as_deref(), Some(codes::BAD_REQUEST));
        assert_eq!(problem.issues[0].path, "/email");
    }

    #[test]
    fn handler_errors_pass_through() {
        let err: ServerError = RpcError::conflict("email already registered")
            .with_detail("try signing in")
            .into();
        let problem = err.problem();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(problem.title, "email already registered");
        assert_eq!(problem.detail.as_deref(), Some("try signing in"));
    }

    #[test]
    fn problem_response_sets_content_type() {
        let response = RpcError::forbidden().into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/problem+json"
        );
    }
}
