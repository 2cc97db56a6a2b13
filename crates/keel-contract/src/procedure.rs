use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

use schemars::JsonSchema;

use crate::{ContractError, PathTemplate, Schema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// Whether input travels in the request body (as opposed to the query string).
    pub fn carries_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            other => Err(format!("unsupported method {other}")),
        }
    }
}

/// Immutable description of one operation. Shared by reference between the contract, the server
/// binding and the client binding.
#[derive(Debug)]
pub struct OperationDescriptor {
    method: Method,
    path: PathTemplate,
    input: Option<Schema>,
    output: Schema,
    summary: Option<String>,
    tags: Vec<String>,
}

impl OperationDescriptor {
    pub fn new(
        method: Method,
        path: PathTemplate,
        input: Option<Schema>,
        output: Schema,
    ) -> Result<Self, ContractError> {
        for param in path.params() {
            let declared = input.as_ref().is_some_and(|s| s.has_property(param));
            if !declared {
                return Err(ContractError::UndeclaredPathParam {
                    path: path.as_str().to_string(),
                    param: param.to_string(),
                });
            }
        }
        Ok(Self {
            method,
            path,
            input,
            output,
            summary: None,
            tags: Vec::new(),
        })
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &PathTemplate {
        &self.path
    }

    pub fn input(&self) -> Option<&Schema> {
        self.input.as_ref()
    }

    pub fn output(&self) -> &Schema {
        &self.output
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

type SchemaFn = fn() -> Result<Schema, ContractError>;

/// Start declaring an operation served at `method path`.
///
/// ```
/// use keel_contract::{route, Method};
/// # #[derive(serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
/// # struct Hello { message: String }
/// let hello = route(Method::Get, "/").output::<Hello>().unwrap();
/// assert_eq!(hello.descriptor().path().as_str(), "/");
/// ```
pub fn route(method: Method, path: &str) -> RouteSpec<()> {
    RouteSpec {
        method,
        path: path.to_string(),
        summary: None,
        tags: Vec::new(),
        input: None,
        _input: PhantomData,
    }
}

/// Operation under construction; finished by [`RouteSpec::output`].
pub struct RouteSpec<I> {
    method: Method,
    path: String,
    summary: Option<String>,
    tags: Vec<String>,
    input: Option<SchemaFn>,
    _input: PhantomData<fn() -> I>,
}

impl<I> RouteSpec<I> {
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn input<J: JsonSchema>(self) -> RouteSpec<J> {
        RouteSpec {
            method: self.method,
            path: self.path,
            summary: self.summary,
            tags: self.tags,
            input: Some(Schema::of::<J> as SchemaFn),
            _input: PhantomData,
        }
    }

    pub fn output<O: JsonSchema>(self) -> Result<Procedure<I, O>, ContractError> {
        let path = PathTemplate::parse(&self.path)?;
        let input = self.input.map(|make| make()).transpose()?;
        let output = Schema::of::<O>()?;
        let mut descriptor = OperationDescriptor::new(self.method, path, input, output)?;
        descriptor.summary = self.summary;
        descriptor.tags = self.tags;
        Ok(Procedure {
            descriptor: Arc::new(descriptor),
            _types: PhantomData,
        })
    }
}

/// Typed handle over an operation: `I` is what callers send, `O` what handlers return.
/// Operations declared without `.input()` take `()`.
pub struct Procedure<I, O> {
    descriptor: Arc<OperationDescriptor>,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O> Procedure<I, O> {
    pub fn descriptor(&self) -> &Arc<OperationDescriptor> {
        &self.descriptor
    }
}

impl<I, O> Clone for Procedure<I, O> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            _types: PhantomData,
        }
    }
}

impl<I, O> fmt::Debug for Procedure<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("method", &self.descriptor.method)
            .field("path", &self.descriptor.path.as_str())
            .finish()
    }
}
