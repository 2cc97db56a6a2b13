use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use axum::Router;
use futures_util::future::BoxFuture;
use keel_contract::{Contract, FieldIssue, Method, OperationDescriptor, Procedure};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::problem_response;
use crate::input::build_input;
use crate::{Access, BindingError, NoSessions, RpcContext, RpcError, ServerError, SessionResolver};

const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

type ErasedHandler =
    Arc<dyn Fn(RpcContext, Value) -> BoxFuture<'static, Result<Value, ServerError>> + Send + Sync>;

/// Callback invoked for every failed request, after the built-in log line.
pub type ErrorInterceptor = Arc<dyn Fn(&ErrorEvent<'_>) + Send + Sync>;

/// What an error interceptor sees about a failed request.
#[derive(Debug)]
pub struct ErrorEvent<'a> {
    pub operation: &'a str,
    pub method: Method,
    pub path: &'a str,
    pub request_id: Option<&'a str>,
    pub error: &'a ServerError,
}

struct Registered {
    access: Access,
    handler: ErasedHandler,
}

struct Shared {
    resolver: Arc<dyn SessionResolver>,
    interceptors: Vec<ErrorInterceptor>,
    body_limit: usize,
}

/// Binds handlers to the operations of a [`Contract`] and turns them into an axum [`Router`].
///
/// ```
/// # use std::sync::Arc;
/// # use keel_contract::{route, Contract, Method};
/// # use keel_rpc::{Access, RpcRouter};
/// # #[derive(serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
/// # struct Hello { message: String }
/// let hello = route(Method::Get, "/").output::<Hello>().unwrap();
/// let contract = Arc::new(Contract::builder().procedure("hello.get", &hello).build().unwrap());
/// let router = RpcRouter::new(contract)
///     .implement_with(&hello, Access::Anonymous, |_ctx, ()| async {
///         Ok(Hello { message: "Hello World!".into() })
///     })
///     .unwrap()
///     .into_router()
///     .unwrap();
/// # let _: axum::Router = router;
/// ```
pub struct RpcRouter {
    contract: Arc<Contract>,
    handlers: HashMap<String, Registered>,
    resolver: Arc<dyn SessionResolver>,
    interceptors: Vec<ErrorInterceptor>,
    body_limit: usize,
}

impl RpcRouter {
    pub fn new(contract: Arc<Contract>) -> Self {
        Self {
            contract,
            handlers: HashMap::new(),
            resolver: Arc::new(NoSessions),
            interceptors: Vec::new(),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn contract(&self) -> &Arc<Contract> {
        &self.contract
    }

    pub fn session_resolver(mut self, resolver: Arc<dyn SessionResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn on_error<F>(mut self, interceptor: F) -> Self
    where
        F: Fn(&ErrorEvent<'_>) + Send + Sync + 'static,
    {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Largest accepted request body in bytes.
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// Implement `procedure` for signed-in callers.
    pub fn implement<I, O, F, Fut>(
        self,
        procedure: &Procedure<I, O>,
        handler: F,
    ) -> Result<Self, BindingError>
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(RpcContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, RpcError>> + Send + 'static,
    {
        self.implement_with(procedure, Access::default(), handler)
    }

    pub fn implement_with<I, O, F, Fut>(
        mut self,
        procedure: &Procedure<I, O>,
        access: Access,
        handler: F,
    ) -> Result<Self, BindingError>
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(RpcContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, RpcError>> + Send + 'static,
    {
        let descriptor = procedure.descriptor();
        let Some(entry) = self.contract.entry_for(descriptor) else {
            return Err(BindingError::NotInContract {
                method: descriptor.method(),
                path: descriptor.path().as_str().to_string(),
            });
        };
        let name = entry.name().to_string();
        if self.handlers.contains_key(&name) {
            return Err(BindingError::AlreadyImplemented(name));
        }

        let handler = Arc::new(handler);
        let erased: ErasedHandler = Arc::new(move |ctx, value| {
            let handler = handler.clone();
            Box::pin(async move {
                let input: I = serde_json::from_value(value).map_err(|err| {
                    ServerError::Validation(vec![FieldIssue::new("", err.to_string())])
                })?;
                let output = handler(ctx, input).await?;
                serde_json::to_value(output).map_err(ServerError::Serialize)
            })
        });
        self.handlers.insert(
            name,
            Registered {
                access,
                handler: erased,
            },
        );
        Ok(self)
    }

    /// Build the axum router. Fails if any contract operation is still unimplemented.
    pub fn into_router(mut self) -> Result<Router, BindingError> {
        let missing: Vec<String> = self
            .contract
            .entries()
            .filter(|entry| !self.handlers.contains_key(entry.name()))
            .map(|entry| entry.name().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(BindingError::Unimplemented(missing));
        }

        let shared = Arc::new(Shared {
            resolver: self.resolver.clone(),
            interceptors: std::mem::take(&mut self.interceptors),
            body_limit: self.body_limit,
        });

        // Same-shape paths share parameter names, so one axum route per template string.
        let mut by_path: BTreeMap<String, MethodRouter> = BTreeMap::new();
        for entry in self.contract.entries() {
            let Some(registered) = self.handlers.remove(entry.name()) else {
                continue;
            };
            let bound = Arc::new(BoundOperation {
                name: entry.name().to_string(),
                descriptor: entry.descriptor().clone(),
                access: registered.access,
                handler: registered.handler,
                shared: shared.clone(),
            });
            let filter = method_filter(entry.descriptor().method());
            let handler = move |req: Request<Body>| {
                let bound = bound.clone();
                async move { bound.serve(req).await }
            };
            let path = entry.descriptor().path().as_str().to_string();
            let method_router = match by_path.remove(&path) {
                Some(existing) => existing.on(filter, handler),
                None => axum::routing::on(filter, handler),
            };
            by_path.insert(path, method_router);
        }

        let mut router = Router::new();
        for (path, method_router) in by_path {
            router = router.route(&path, method_router);
        }
        Ok(router)
    }
}

fn method_filter(method: Method) -> MethodFilter {
    match method {
        Method::Get => MethodFilter::GET,
        Method::Post => MethodFilter::POST,
        Method::Put => MethodFilter::PUT,
        Method::Patch => MethodFilter::PATCH,
        Method::Delete => MethodFilter::DELETE,
    }
}

struct BoundOperation {
    name: String,
    descriptor: Arc<OperationDescriptor>,
    access: Access,
    handler: ErasedHandler,
    shared: Arc<Shared>,
}

impl BoundOperation {
    async fn serve(&self, req: Request<Body>) -> Response {
        let path = req.uri().path().to_string();
        let request_id = req
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match self.run(req, &path).await {
            Ok(value) => (StatusCode::OK, axum::Json(value)).into_response(),
            Err(error) => {
                let event = ErrorEvent {
                    operation: &self.name,
                    method: self.descriptor.method(),
                    path: &path,
                    request_id: request_id.as_deref(),
                    error: &error,
                };
                log_error(&event);
                for interceptor in &self.shared.interceptors {
                    interceptor(&event);
                }
                let mut problem = error.problem().with_instance(path.clone());
                if let Some(id) = request_id {
                    problem = problem.with_trace_id(id);
                }
                problem_response(problem)
            }
        }
    }

    async fn run(&self, req: Request<Body>, path: &str) -> Result<Value, ServerError> {
        let (parts, body) = req.into_parts();

        let session = self.shared.resolver.resolve(&parts.headers).await;
        self.access.check(session.as_ref())?;

        let params = self.descriptor.path().match_path(path).unwrap_or_default();
        let bytes = axum::body::to_bytes(body, self.shared.body_limit)
            .await
            .map_err(|err| {
                ServerError::Validation(vec![FieldIssue::new(
                    "",
                    format!("failed to read request body: {err}"),
                )])
            })?;
        let input = build_input(&self.descriptor, params, parts.uri.query(), &bytes)?;
        if let Some(schema) = self.descriptor.input() {
            schema.validate(&input).map_err(ServerError::Validation)?;
        }

        let ctx = RpcContext::new(&self.name, session, parts.headers);
        let output = (self.handler)(ctx, input).await?;
        self.descriptor
            .output()
            .validate(&output)
            .map_err(ServerError::ContractViolation)?;
        Ok(output)
    }
}

fn log_error(event: &ErrorEvent<'_>) {
    let request_id = event.request_id.unwrap_or("-");
    match event.error {
        ServerError::ContractViolation(issues) => {
            let issues: Vec<String> = issues.iter().map(ToString::to_string).collect();
            tracing::error!(
                operation = event.operation,
                method = %event.method,
                path = event.path,
                request_id,
                issues = ?issues,
                "handler output violates the contract"
            );
        }
        err if err.is_internal() => {
            tracing::error!(
                operation = event.operation,
                method = %event.method,
                path = event.path,
                request_id,
                error = %err,
                "rpc request failed"
            );
        }
        err => {
            tracing::debug!(
                operation = event.operation,
                method = %event.method,
                path = event.path,
                request_id,
                status = err.status().as_u16(),
                error = %err,
                "rpc request rejected"
            );
        }
    }
}
