use std::fmt;

use jsonschema::Validator;
use keel_protocol::FieldIssue;
use schemars::JsonSchema;
use serde_json::Value;

use crate::ContractError;

/// Compiled JSON Schema for one side (input or output) of an operation.
pub struct Schema {
    name: String,
    document: Value,
    validator: Validator,
}

/// Scalar type a string-valued field (path segment, query value) should be coerced into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl Schema {
    /// Derive the schema of `T` and compile it.
    pub fn of<T: JsonSchema>() -> Result<Self, ContractError> {
        let root = schemars::schema_for!(T);
        let document = serde_json::to_value(&root)?;
        Self::from_document(T::schema_name(), document)
    }

    pub fn from_document(name: impl Into<String>, document: Value) -> Result<Self, ContractError> {
        let name = name.into();
        let validator =
            jsonschema::validator_for(&document).map_err(|err| ContractError::InvalidSchema {
                name: name.clone(),
                reason: err.to_string(),
            })?;
        Ok(Self {
            name,
            document,
            validator,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw JSON Schema document (draft-07).
    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn is_valid(&self, value: &Value) -> bool {
        self.validator.is_valid(value)
    }

    /// Validate `value`, collecting every failure with the JSON pointer it applies to.
    pub fn validate(&self, value: &Value) -> Result<(), Vec<FieldIssue>> {
        let issues: Vec<FieldIssue> = self
            .validator
            .iter_errors(value)
            .map(|e| FieldIssue::new(e.instance_path.to_string(), e.to_string()))
            .collect();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }

    /// Whether the top-level object declares `property`.
    pub fn has_property(&self, property: &str) -> bool {
        self.document
            .get("properties")
            .and_then(Value::as_object)
            .is_some_and(|props| props.contains_key(property))
    }

    /// Names of the top-level properties, in document order.
    pub fn properties(&self) -> Vec<&str> {
        self.document
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn is_required(&self, property: &str) -> bool {
        self.document
            .get("required")
            .and_then(Value::as_array)
            .is_some_and(|req| req.iter().any(|r| r.as_str() == Some(property)))
    }

    fn property(&self, property: &str) -> Option<&Value> {
        self.document
            .get("properties")
            .and_then(|props| props.get(property))
    }

    /// How a string-typed transport value for `property` should be interpreted.
    ///
    /// Strings win whenever the declared type admits them; properties without a plain `type`
    /// (references, unions) are left as strings and rejected by validation if that is wrong.
    pub fn scalar_kind(&self, property: &str) -> ScalarKind {
        kind_of(self.property(property).and_then(|prop| prop.get("type")))
    }

    /// Whether `property` is declared as an array, so repeated query keys collect into it.
    pub fn is_array(&self, property: &str) -> bool {
        declared_types(self.property(property).and_then(|prop| prop.get("type")))
            .contains(&"array")
    }

    /// Interpret a transport string as the declared scalar type of `property` (or of its items,
    /// for arrays). Values that do not parse are passed through as strings so validation
    /// reports them.
    pub fn coerce(&self, property: &str, raw: &str) -> Value {
        let kind = if self.is_array(property) {
            kind_of(
                self.property(property)
                    .and_then(|prop| prop.get("items"))
                    .and_then(|items| items.get("type")),
            )
        } else {
            self.scalar_kind(property)
        };
        match kind {
            ScalarKind::String => Value::String(raw.to_string()),
            ScalarKind::Integer => raw
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(raw.to_string())),
            ScalarKind::Number => raw
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(raw.to_string())),
            ScalarKind::Boolean => match raw {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::String(raw.to_string()),
            },
        }
    }
}

fn declared_types(declared: Option<&Value>) -> Vec<&str> {
    match declared {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn kind_of(declared: Option<&Value>) -> ScalarKind {
    let types = declared_types(declared);
    if types.is_empty() || types.contains(&"string") {
        ScalarKind::String
    } else if types.contains(&"integer") {
        ScalarKind::Integer
    } else if types.contains(&"number") {
        ScalarKind::Number
    } else if types.contains(&"boolean") {
        ScalarKind::Boolean
    } else {
        ScalarKind::String
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[allow(dead_code)]
    #[derive(Deserialize, JsonSchema)]
    struct Lookup {
        id: u32,
        verbose: Option<bool>,
        label: String,
        ratio: f64,
    }

    #[test]
    fn reports_issue_paths() {
        let schema = Schema::of::<Lookup>().unwrap();
        assert_eq!(schema.name(), "Lookup");
        assert!(schema
            .validate(&json!({"id": 3, "label": "x", "ratio": 0.5}))
            .is_ok());

        let issues = schema
            .validate(&json!({"id": "three", "ratio": 0.5}))
            .unwrap_err();
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().any(|i| i.path == "/id"));
        assert!(issues
            .iter()
            .any(|i| i.path.is_empty() && i.message.contains("label")));
    }

    #[test]
    fn coerces_by_declared_type() {
        let schema = Schema::of::<Lookup>().unwrap();
        assert_eq!(schema.coerce("id", "42"), json!(42));
        assert_eq!(schema.coerce("id", "forty"), json!("forty"));
        assert_eq!(schema.coerce("verbose", "true"), json!(true));
        assert_eq!(schema.coerce("label", "7"), json!("7"));
        assert_eq!(schema.coerce("ratio", "0.25"), json!(0.25));
        assert_eq!(schema.coerce("unknown", "1"), json!("1"));
    }

    #[allow(dead_code)]
    #[derive(Deserialize, JsonSchema)]
    struct Filter {
        ids: Vec<u32>,
        names: Option<Vec<String>>,
    }

    #[test]
    fn array_properties_coerce_items() {
        let schema = Schema::of::<Filter>().unwrap();
        assert!(schema.is_array("ids"));
        assert!(schema.is_array("names"));
        assert_eq!(schema.coerce("ids", "5"), json!(5));
        assert_eq!(schema.coerce("names", "5"), json!("5"));
    }

    #[test]
    fn property_helpers() {
        let schema = Schema::of::<Lookup>().unwrap();
        assert!(schema.has_property("id"));
        assert!(!schema.has_property("missing"));
        assert!(schema.is_required("id"));
        assert!(!schema.is_required("verbose"));
        assert_eq!(schema.properties().len(), 4);
    }

    #[test]
    fn rejects_broken_documents() {
        let err = Schema::from_document("broken", json!({"type": 12})).unwrap_err();
        assert!(matches!(err, ContractError::InvalidSchema { .. }));
    }
}
