use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::{ContractError, Method, OperationDescriptor, Procedure};

#[derive(Debug, Clone)]
pub struct ContractEntry {
    name: String,
    descriptor: Arc<OperationDescriptor>,
}

impl ContractEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &Arc<OperationDescriptor> {
        &self.descriptor
    }
}

/// Ordered, validated set of named operations.
#[derive(Debug, Clone, Default)]
pub struct Contract {
    entries: Vec<ContractEntry>,
    by_name: HashMap<String, usize>,
}

impl Contract {
    pub fn builder() -> ContractBuilder {
        ContractBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&ContractEntry> {
        self.by_name.get(name).map(|idx| &self.entries[*idx])
    }

    pub fn entries(&self) -> impl Iterator<Item = &ContractEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the entry holding exactly this descriptor.
    pub fn entry_for(&self, descriptor: &Arc<OperationDescriptor>) -> Option<&ContractEntry> {
        self.entries
            .iter()
            .find(|entry| Arc::ptr_eq(&entry.descriptor, descriptor))
    }

    /// Name-keyed JSON summary of every operation, schemas included.
    pub fn manifest(&self) -> Value {
        let operations: Vec<Value> = self
            .entries
            .iter()
            .map(|entry| {
                let d = &entry.descriptor;
                json!({
                    "name": entry.name,
                    "method": d.method().as_str(),
                    "path": d.path().as_str(),
                    "summary": d.summary(),
                    "tags": d.tags(),
                    "input": d.input().map(|s| s.document().clone()),
                    "output": d.output().document().clone(),
                })
            })
            .collect();
        json!({ "operations": operations })
    }
}

#[derive(Default)]
pub struct ContractBuilder {
    entries: Vec<ContractEntry>,
}

impl ContractBuilder {
    pub fn procedure<I, O>(self, name: impl Into<String>, procedure: &Procedure<I, O>) -> Self {
        self.operation(name, procedure.descriptor().clone())
    }

    pub fn operation(mut self, name: impl Into<String>, descriptor: Arc<OperationDescriptor>) -> Self {
        self.entries.push(ContractEntry {
            name: name.into(),
            descriptor,
        });
        self
    }

    /// Validate names and routes and freeze the contract.
    pub fn build(self) -> Result<Contract, ContractError> {
        let mut by_name: HashMap<String, usize> = HashMap::new();
        let mut routes: HashMap<(Method, String), usize> = HashMap::new();
        let mut shapes: HashMap<String, usize> = HashMap::new();

        for (idx, entry) in self.entries.iter().enumerate() {
            validate_name(&entry.name)?;
            if by_name.insert(entry.name.clone(), idx).is_some() {
                return Err(ContractError::DuplicateName(entry.name.clone()));
            }

            let descriptor = &entry.descriptor;
            let shape = descriptor.path().shape();

            if let Some(&other) = shapes.get(&shape) {
                let other_path = self.entries[other].descriptor.path();
                if other_path.params() != descriptor.path().params() {
                    return Err(ContractError::ConflictingParams {
                        path: descriptor.path().as_str().to_string(),
                        other: other_path.as_str().to_string(),
                        first: self.entries[other].name.clone(),
                        second: entry.name.clone(),
                    });
                }
            } else {
                shapes.insert(shape.clone(), idx);
            }

            if let Some(&other) = routes.get(&(descriptor.method(), shape.clone())) {
                return Err(ContractError::RouteCollision {
                    method: descriptor.method(),
                    path: descriptor.path().as_str().to_string(),
                    first: self.entries[other].name.clone(),
                    second: entry.name.clone(),
                });
            }
            routes.insert((descriptor.method(), shape), idx);
        }

        Ok(Contract {
            entries: self.entries,
            by_name,
        })
    }
}

fn validate_name(name: &str) -> Result<(), ContractError> {
    let invalid = |reason: &str| ContractError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    for segment in name.split('.') {
        if segment.is_empty() {
            return Err(invalid("empty segment"));
        }
        if !segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid("segments must be [A-Za-z0-9_]+"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route;
    use schemars::JsonSchema;
    use serde::{Deserialize, Serialize};

    #[allow(dead_code)]
    #[derive(Serialize, Deserialize, JsonSchema)]
    struct Message {
        message: String,
    }

    #[allow(dead_code)]
    #[derive(Serialize, Deserialize, JsonSchema)]
    struct ById {
        id: String,
    }

    #[allow(dead_code)]
    #[derive(Serialize, Deserialize, JsonSchema)]
    struct ByUser {
        user_id: String,
    }

    fn hello() -> Procedure<(), Message> {
        route(Method::Get, "/").output::<Message>().unwrap()
    }

    #[test]
    fn keeps_declaration_order_and_lookup() {
        let get = hello();
        let post = route(Method::Post, "/").output::<Message>().unwrap();
        let contract = Contract::builder()
            .procedure("hello.get", &get)
            .procedure("hello.post", &post)
            .build()
            .unwrap();
        let names: Vec<&str> = contract.entries().map(|e| e.name()).collect();
        assert_eq!(names, vec!["hello.get", "hello.post"]);
        assert_eq!(contract.len(), 2);
        assert!(Arc::ptr_eq(
            contract.get("hello.get").unwrap().descriptor(),
            get.descriptor()
        ));
        assert_eq!(
            contract.entry_for(post.descriptor()).unwrap().name(),
            "hello.post"
        );
        assert!(contract.get("hello.put").is_none());
    }

    #[test]
    fn rejects_method_path_collisions() {
        let err = Contract::builder()
            .procedure("a", &hello())
            .procedure("b", &hello())
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ContractError::RouteCollision { ref first, ref second, .. } if first == "a" && second == "b"
        ));
    }

    #[test]
    fn param_names_do_not_hide_collisions() {
        let by_id = route(Method::Get, "/users/{id}")
            .input::<ById>()
            .output::<Message>()
            .unwrap();
        let by_user = route(Method::Get, "/users/{user_id}")
            .input::<ByUser>()
            .output::<Message>()
            .unwrap();
        let err = Contract::builder()
            .procedure("users.get", &by_id)
            .procedure("users.find", &by_user)
            .build()
            .unwrap_err();
        assert!(matches!(err, ContractError::ConflictingParams { .. }));

        let delete_user = route(Method::Delete, "/users/{user_id}")
            .input::<ByUser>()
            .output::<Message>()
            .unwrap();
        let err = Contract::builder()
            .procedure("users.get", &by_id)
            .procedure("users.delete", &delete_user)
            .build()
            .unwrap_err();
        assert!(matches!(err, ContractError::ConflictingParams { .. }));

        let delete_id = route(Method::Delete, "/users/{id}")
            .input::<ById>()
            .output::<Message>()
            .unwrap();
        assert!(Contract::builder()
            .procedure("users.get", &by_id)
            .procedure("users.delete", &delete_id)
            .build()
            .is_ok());
    }

    #[test]
    fn rejects_bad_and_duplicate_names() {
        for bad in ["", "hello.", ".get", "hello get", "hello-get"] {
            let err = Contract::builder().procedure(bad, &hello()).build().unwrap_err();
            assert!(matches!(err, ContractError::InvalidName { .. }), "{bad:?}");
        }
        let post = route(Method::Post, "/").output::<Message>().unwrap();
        let err = Contract::builder()
            .procedure("hello", &hello())
            .procedure("hello", &post)
            .build()
            .unwrap_err();
        assert!(matches!(err, ContractError::DuplicateName(ref n) if n == "hello"));
    }

    #[test]
    fn manifest_lists_operations() {
        let contract = Contract::builder()
            .procedure("hello.get", &hello())
            .build()
            .unwrap();
        let manifest = contract.manifest();
        let op = &manifest["operations"][0];
        assert_eq!(op["name"], "hello.get");
        assert_eq!(op["method"], "GET");
        assert_eq!(op["path"], "/");
        assert!(op["input"].is_null());
        assert_eq!(op["output"]["properties"]["message"]["type"], "string");
    }
}
