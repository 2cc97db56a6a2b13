use keel_contract::{FieldIssue, OperationDescriptor};
use serde_json::{Map, Value};

use crate::ServerError;

/// Assemble the raw input value of one request: path parameters plus either the query string
/// (GET, DELETE) or the JSON body. Path parameters win over body fields of the same name.
pub(crate) fn build_input(
    descriptor: &OperationDescriptor,
    path_params: Vec<(String, String)>,
    query: Option<&str>,
    body: &[u8],
) -> Result<Value, ServerError> {
    let Some(schema) = descriptor.input() else {
        return Ok(Value::Null);
    };

    let mut fields = Map::new();
    if descriptor.method().carries_body() {
        let blank = body.iter().all(u8::is_ascii_whitespace);
        if !blank {
            let parsed: Value = serde_json::from_slice(body).map_err(|err| {
                ServerError::Validation(vec![FieldIssue::new(
                    "",
                    format!("request body is not valid JSON: {err}"),
                )])
            })?;
            match parsed {
                Value::Object(map) => fields = map,
                other if path_params.is_empty() => return Ok(other),
                _ => {
                    return Err(ServerError::Validation(vec![FieldIssue::new(
                        "",
                        "request body must be a JSON object",
                    )]))
                }
            }
        }
    } else if let Some(query) = query {
        for (key, raw) in url::form_urlencoded::parse(query.as_bytes()) {
            let value = schema.coerce(&key, &raw);
            match fields.get_mut(&*key) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None if schema.is_array(&key) => {
                    fields.insert(key.into_owned(), Value::Array(vec![value]));
                }
                None => {
                    fields.insert(key.into_owned(), value);
                }
            }
        }
    }
    if !descriptor.method().carries_body() {
        // An empty list has no query pairs; a required one is still present.
        for prop in schema.properties() {
            if schema.is_array(prop) && schema.is_required(prop) && !fields.contains_key(prop) {
                fields.insert(prop.to_string(), Value::Array(Vec::new()));
            }
        }
    }

    for (name, raw) in path_params {
        let value = schema.coerce(&name, &raw);
        fields.insert(name, value);
    }
    Ok(Value::Object(fields))
}
