//! The keel application contract, shared by `keel-server` and every client.

use std::sync::Arc;

use keel_contract::{route, Contract, ContractError, Method, Procedure};
use keel_protocol::{is_valid_email, FieldIssue};
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const TITLE: &str = "keel";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct HelloResponse {
    pub message: String,
}

/// Typed handles for every operation, mirroring the `{ hello: { get } }` router.
#[derive(Debug, Clone)]
pub struct Api {
    pub hello: HelloApi,
}

#[derive(Debug, Clone)]
pub struct HelloApi {
    pub get: Procedure<(), HelloResponse>,
}

impl Api {
    pub fn declare() -> Result<Self, ContractError> {
        let get = route(Method::Get, "/")
            .summary("Greeting used as the API connectivity check")
            .tag("hello")
            .output::<HelloResponse>()?;
        Ok(Self {
            hello: HelloApi { get },
        })
    }

    pub fn contract(&self) -> Result<Contract, ContractError> {
        Contract::builder()
            .procedure("hello.get", &self.hello.get)
            .build()
    }
}

static API: Lazy<Result<(Api, Arc<Contract>), String>> = Lazy::new(|| {
    let api = Api::declare().map_err(|e| e.to_string())?;
    let contract = api.contract().map_err(|e| e.to_string())?;
    Ok((api, Arc::new(contract)))
});

/// Process-wide declaration; every caller shares the same descriptors.
pub fn api() -> Result<&'static Api, ContractError> {
    shared().map(|(api, _)| api)
}

pub fn contract() -> Result<Arc<Contract>, ContractError> {
    shared().map(|(_, contract)| contract.clone())
}

fn shared() -> Result<&'static (Api, Arc<Contract>), ContractError> {
    API.as_ref().map_err(|reason| ContractError::InvalidSchema {
        name: TITLE.to_string(),
        reason: reason.clone(),
    })
}

/// Local validation for forms, run before anything is sent.
pub trait Validate {
    fn validate(&self) -> Result<(), Vec<FieldIssue>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SignInForm {
    pub email: String,
    pub password: String,
}

impl Validate for SignInForm {
    fn validate(&self) -> Result<(), Vec<FieldIssue>> {
        let mut issues = Vec::new();
        if !is_valid_email(self.email.trim()) {
            issues.push(FieldIssue::new("/email", "Invalid email address"));
        }
        if self.password.chars().count() < 8 {
            issues.push(FieldIssue::new(
                "/password",
                "Password must be at least 8 characters",
            ));
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_contract_shape() {
        let contract = contract().unwrap();
        assert_eq!(contract.len(), 1);
        let entry = contract.get("hello.get").unwrap();
        assert_eq!(entry.descriptor().method(), Method::Get);
        assert_eq!(entry.descriptor().path().as_str(), "/");
        assert!(entry.descriptor().input().is_none());
        assert!(std::sync::Arc::ptr_eq(
            entry.descriptor(),
            api().unwrap().hello.get.descriptor()
        ));

        let output = entry.descriptor().output();
        assert!(output.is_valid(&serde_json::json!({"message": "Hello World!"})));
        assert!(!output.is_valid(&serde_json::json!({"message": 1})));
        assert!(!output.is_valid(&serde_json::json!({})));
    }

    #[test]
    fn sign_in_form_messages() {
        let form = SignInForm {
            email: "nope".into(),
            password: "short".into(),
        };
        let issues = form.validate().unwrap_err();
        let messages: Vec<&str> = issues.iter().map(|i| i.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Invalid email address",
                "Password must be at least 8 characters"
            ]
        );

        let ok = SignInForm {
            email: "ada@example.com".into(),
            password: "12345678".into(),
        };
        assert!(ok.validate().is_ok());
    }
}
