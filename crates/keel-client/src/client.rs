use std::sync::Arc;

use keel_contract::{Contract, Method, OperationDescriptor, Procedure};
use keel_protocol::FieldIssue;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{ClientError, Link};

/// Calls contract operations over a [`Link`].
#[derive(Debug, Clone)]
pub struct ContractClient {
    link: Link,
    contract: Arc<Contract>,
}

impl ContractClient {
    pub fn new(link: Link, contract: Arc<Contract>) -> Self {
        Self { link, contract }
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    pub fn contract(&self) -> &Arc<Contract> {
        &self.contract
    }

    /// Call a typed procedure; the decoded output has already passed the output schema.
    pub async fn call<I, O>(&self, procedure: &Procedure<I, O>, input: I) -> Result<O, ClientError>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        let descriptor = procedure.descriptor();
        let Some(entry) = self.contract.entry_for(descriptor) else {
            return Err(self.link.intercept(ClientError::NotInContract {
                method: descriptor.method().to_string(),
                path: descriptor.path().to_string(),
            }));
        };
        let name = entry.name().to_string();
        let input = serde_json::to_value(input).map_err(|err| {
            self.link.intercept(ClientError::InvalidInput {
                operation: name.clone(),
                issues: vec![FieldIssue::new("", err.to_string())],
            })
        })?;
        let output = self.invoke(&name, descriptor, input).await?;
        serde_json::from_value(output)
            .map_err(|err| self.link.intercept(ClientError::Decode(err.to_string())))
    }

    /// Call an operation by contract name with an untyped input.
    pub async fn call_named(&self, name: &str, input: Value) -> Result<Value, ClientError> {
        let Some(entry) = self.contract.get(name) else {
            return Err(self
                .link
                .intercept(ClientError::UnknownOperation(name.to_string())));
        };
        let descriptor = entry.descriptor().clone();
        self.invoke(name, &descriptor, input).await
    }

    async fn invoke(
        &self,
        name: &str,
        descriptor: &OperationDescriptor,
        input: Value,
    ) -> Result<Value, ClientError> {
        let result = self.invoke_inner(name, descriptor, input).await;
        result.map_err(|err| self.link.intercept(err))
    }

    async fn invoke_inner(
        &self,
        name: &str,
        descriptor: &OperationDescriptor,
        input: Value,
    ) -> Result<Value, ClientError> {
        let request = RequestParts::build(name, descriptor, input)?;
        let method = reqwest_method(descriptor.method());
        let output = match request.payload {
            Payload::None => {
                self.link
                    .send::<(), ()>(method, &request.path, None, None)
                    .await?
            }
            Payload::Query(pairs) => {
                self.link
                    .send::<_, ()>(method, &request.path, Some(&pairs), None)
                    .await?
            }
            Payload::Body(body) => {
                self.link
                    .send::<(), _>(method, &request.path, None, Some(&body))
                    .await?
            }
        };
        descriptor
            .output()
            .validate(&output)
            .map_err(|issues| ClientError::ResponseValidation {
                operation: name.to_string(),
                issues,
            })?;
        Ok(output)
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[derive(Debug, PartialEq)]
enum Payload {
    None,
    Query(Vec<(String, String)>),
    Body(Value),
}

#[derive(Debug)]
struct RequestParts {
    path: String,
    payload: Payload,
}

impl RequestParts {
    /// Split `input` into a rendered path plus query pairs or a JSON body.
    fn build(name: &str, descriptor: &OperationDescriptor, input: Value) -> Result<Self, ClientError> {
        let invalid = |issues: Vec<FieldIssue>| ClientError::InvalidInput {
            operation: name.to_string(),
            issues,
        };
        let params = descriptor.path().params();

        let mut fields = match input {
            Value::Object(map) => map,
            Value::Null if descriptor.input().is_none() => Map::new(),
            other if params.is_empty() && descriptor.method().carries_body() => {
                let path = descriptor.path().as_str().to_string();
                return Ok(Self {
                    path,
                    payload: Payload::Body(other),
                });
            }
            _ => {
                return Err(invalid(vec![FieldIssue::new(
                    "",
                    "input must be a JSON object",
                )]))
            }
        };

        let path = descriptor
            .path()
            .render(|param| match fields.remove(param) {
                Some(Value::Null) | None => None,
                Some(value) => Some(scalar_text(&value)),
            })
            .map_err(|param| {
                invalid(vec![FieldIssue::new(
                    format!("/{param}"),
                    "path parameter is required",
                )])
            })?;

        if descriptor.input().is_none() {
            return Ok(Self {
                path,
                payload: Payload::None,
            });
        }

        let payload = if descriptor.method().carries_body() {
            Payload::Body(Value::Object(fields))
        } else {
            let mut pairs = Vec::new();
            for (key, value) in fields {
                match value {
                    Value::Null => {}
                    Value::Array(items) => {
                        for item in items {
                            pairs.push((key.clone(), scalar_text(&item)));
                        }
                    }
                    other => pairs.push((key, scalar_text(&other))),
                }
            }
            if pairs.is_empty() {
                Payload::None
            } else {
                Payload::Query(pairs)
            }
        };
        Ok(Self { path, payload })
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
