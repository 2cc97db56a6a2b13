//! OpenAPI rendering of a [`Contract`] as a typed `utoipa` document.
//!
//! Each schemars root becomes a named component; its `definitions` are registered next to it and
//! `#/definitions/..` references point at `#/components/schemas/..`.

use std::collections::BTreeMap;

use serde_json::Value;
use utoipa::openapi::path::{HttpMethod, OperationBuilder, ParameterBuilder, ParameterIn};
use utoipa::openapi::request_body::RequestBodyBuilder;
use utoipa::openapi::response::ResponseBuilder;
use utoipa::openapi::schema::{
    AdditionalProperties, AllOfBuilder, AnyOfBuilder, ArrayBuilder, ObjectBuilder, OneOfBuilder,
    SchemaFormat, SchemaType, Type,
};
use utoipa::openapi::{
    ComponentsBuilder, ContentBuilder, InfoBuilder, OpenApi, OpenApiBuilder, PathItem,
    PathsBuilder, Ref, RefOr, Required, Schema,
};

use crate::{Contract, ContractError, Method, OperationDescriptor, Schema as ContractSchema};

const PROBLEM: &str = "ProblemDetails";

type Components = BTreeMap<String, RefOr<Schema>>;

/// Render `contract` as an OpenAPI document.
pub fn document(contract: &Contract, title: &str, version: &str) -> Result<OpenApi, ContractError> {
    let mut components = Components::new();
    let problem = serde_json::to_value(schemars::schema_for!(keel_protocol::ProblemDetails))?;
    register(&mut components, PROBLEM, &problem);

    let mut paths = PathsBuilder::new();
    for entry in contract.entries() {
        let descriptor = entry.descriptor();
        let op = operation(entry.name(), descriptor, &mut components);
        paths = paths.path(
            descriptor.path().as_str(),
            PathItem::new(http_method(descriptor.method()), op),
        );
    }

    let components = components
        .into_iter()
        .fold(ComponentsBuilder::new(), |builder, (name, schema)| {
            builder.schema(name, schema)
        })
        .build();

    Ok(OpenApiBuilder::new()
        .info(InfoBuilder::new().title(title).version(version).build())
        .paths(paths.build())
        .components(Some(components))
        .build())
}

fn http_method(method: Method) -> HttpMethod {
    match method {
        Method::Get => HttpMethod::Get,
        Method::Post => HttpMethod::Post,
        Method::Put => HttpMethod::Put,
        Method::Patch => HttpMethod::Patch,
        Method::Delete => HttpMethod::Delete,
    }
}

fn operation(
    name: &str,
    descriptor: &OperationDescriptor,
    components: &mut Components,
) -> utoipa::openapi::path::Operation {
    let mut op = OperationBuilder::new()
        .operation_id(Some(name))
        .summary(descriptor.summary());
    if !descriptor.tags().is_empty() {
        op = op.tags(Some(descriptor.tags().to_vec()));
    }

    let path_params = descriptor.path().params();
    for param in &path_params {
        let schema = descriptor
            .input()
            .map(|input| property_schema(input, param))
            .unwrap_or_else(|| scalar(Type::String));
        op = op.parameter(
            ParameterBuilder::new()
                .name(*param)
                .parameter_in(ParameterIn::Path)
                .required(Required::True)
                .schema(Some(schema))
                .build(),
        );
    }

    if let Some(input) = descriptor.input() {
        if descriptor.method().carries_body() {
            let reference = register(components, input.name(), input.document());
            op = op.request_body(Some(
                RequestBodyBuilder::new()
                    .required(Some(Required::True))
                    .content(
                        "application/json",
                        ContentBuilder::new().schema(Some(reference)).build(),
                    )
                    .build(),
            ));
        } else {
            for prop in input.properties() {
                if path_params.contains(&prop) {
                    continue;
                }
                let required = if input.is_required(prop) {
                    Required::True
                } else {
                    Required::False
                };
                op = op.parameter(
                    ParameterBuilder::new()
                        .name(prop)
                        .parameter_in(ParameterIn::Query)
                        .required(required)
                        .schema(Some(property_schema(input, prop)))
                        .build(),
                );
            }
        }
    }

    let output = register(
        components,
        descriptor.output().name(),
        descriptor.output().document(),
    );
    op.response(
        "200",
        ResponseBuilder::new()
            .description("Success")
            .content(
                "application/json",
                ContentBuilder::new().schema(Some(output)).build(),
            )
            .build(),
    )
    .response(
        "default",
        ResponseBuilder::new()
            .description("Problem details")
            .content(
                "application/problem+json",
                ContentBuilder::new()
                    .schema(Some(RefOr::Ref(Ref::from_schema_name(PROBLEM))))
                    .build(),
            )
            .build(),
    )
    .build()
}

/// Add a schemars root (and its definitions) to the component table; return a reference to it.
fn register(components: &mut Components, name: &str, document: &Value) -> RefOr<Schema> {
    if let Some(Value::Object(defs)) = document.get("definitions") {
        for (def_name, def) in defs {
            components
                .entry(def_name.clone())
                .or_insert_with(|| convert(def));
        }
    }
    let root = convert(document);

    // `()` and similar non-object roots are inlined rather than named.
    let is_object = matches!(
        &root,
        RefOr::T(Schema::Object(obj)) if obj.schema_type == SchemaType::Type(Type::Object)
    );
    if !is_object && !matches!(root, RefOr::Ref(_)) {
        return root;
    }
    components.entry(name.to_string()).or_insert(root);
    RefOr::Ref(Ref::from_schema_name(name))
}

fn property_schema(schema: &ContractSchema, property: &str) -> RefOr<Schema> {
    schema
        .document()
        .get("properties")
        .and_then(|props| props.get(property))
        .map(convert)
        .unwrap_or_else(|| scalar(Type::String))
}

fn scalar(ty: Type) -> RefOr<Schema> {
    RefOr::T(Schema::Object(
        ObjectBuilder::new().schema_type(SchemaType::Type(ty)).build(),
    ))
}

fn text(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn length(value: &Value, key: &str) -> Option<usize> {
    value
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
}

fn json_type(name: &str) -> Option<Type> {
    match name {
        "object" => Some(Type::Object),
        "string" => Some(Type::String),
        "integer" => Some(Type::Integer),
        "number" => Some(Type::Number),
        "boolean" => Some(Type::Boolean),
        "array" => Some(Type::Array),
        "null" => Some(Type::Null),
        _ => None,
    }
}

fn schema_type(types: &[Type]) -> Option<SchemaType> {
    match types {
        [] => None,
        [single] => Some(SchemaType::Type(single.clone())),
        many => Some(SchemaType::Array(many.to_vec())),
    }
}

/// Translate one draft-07 schemars node into the `utoipa` model.
fn convert(value: &Value) -> RefOr<Schema> {
    let Value::Object(node) = value else {
        return RefOr::T(Schema::Object(ObjectBuilder::new().build()));
    };

    if let Some(target) = node.get("$ref").and_then(Value::as_str) {
        return RefOr::Ref(match target.strip_prefix("#/definitions/") {
            Some(name) => Ref::from_schema_name(name),
            None => Ref::new(target),
        });
    }

    let items = |key: &str| -> Option<Vec<RefOr<Schema>>> {
        node.get(key)
            .and_then(Value::as_array)
            .map(|list| list.iter().map(convert).collect())
    };
    let description = text(value, "description");
    if let Some(list) = items("anyOf") {
        let builder = list
            .into_iter()
            .fold(AnyOfBuilder::new(), |b, item| b.item(item));
        return RefOr::T(Schema::AnyOf(builder.description(description).build()));
    }
    if let Some(list) = items("oneOf") {
        let builder = list
            .into_iter()
            .fold(OneOfBuilder::new(), |b, item| b.item(item));
        return RefOr::T(Schema::OneOf(builder.description(description).build()));
    }
    if let Some(list) = items("allOf") {
        let builder = list
            .into_iter()
            .fold(AllOfBuilder::new(), |b, item| b.item(item));
        return RefOr::T(Schema::AllOf(builder.description(description).build()));
    }

    let types: Vec<Type> = match node.get("type") {
        Some(Value::String(t)) => json_type(t).into_iter().collect(),
        Some(Value::Array(list)) => list.iter().filter_map(Value::as_str).filter_map(json_type).collect(),
        _ => Vec::new(),
    };

    if types.contains(&Type::Array) {
        let item = node
            .get("items")
            .map(convert)
            .unwrap_or_else(|| RefOr::T(Schema::Object(ObjectBuilder::new().build())));
        let mut builder = ArrayBuilder::new()
            .items(item)
            .title(text(value, "title"))
            .description(description);
        if let Some(ty) = schema_type(&types) {
            builder = builder.schema_type(ty);
        }
        return RefOr::T(Schema::Array(builder.build()));
    }

    let mut builder = ObjectBuilder::new()
        .title(text(value, "title"))
        .description(description)
        .format(text(value, "format").map(SchemaFormat::Custom))
        .enum_values(node.get("enum").and_then(Value::as_array).cloned())
        .min_length(length(value, "minLength"))
        .max_length(length(value, "maxLength"));
    if let Some(ty) = schema_type(&types) {
        builder = builder.schema_type(ty);
    }
    if let Some(Value::Object(props)) = node.get("properties") {
        for (name, prop) in props {
            builder = builder.property(name.as_str(), convert(prop));
        }
    }
    if let Some(Value::Array(required)) = node.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            builder = builder.required(name);
        }
    }
    match node.get("additionalProperties") {
        Some(Value::Bool(allowed)) => {
            builder = builder.additional_properties(Some(AdditionalProperties::FreeForm(*allowed)));
        }
        Some(extra @ Value::Object(_)) => {
            builder = builder.additional_properties(Some(AdditionalProperties::RefOr(convert(extra))));
        }
        _ => {}
    }
    RefOr::T(Schema::Object(builder.build()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{route, Method};
    use schemars::JsonSchema;
    use serde::{Deserialize, Serialize};

    #[allow(dead_code)]
    #[derive(Serialize, Deserialize, JsonSchema)]
    struct Message {
        message: String,
    }

    #[allow(dead_code)]
    #[derive(Serialize, Deserialize, JsonSchema)]
    struct Tag {
        label: String,
    }

    #[allow(dead_code)]
    #[derive(Serialize, Deserialize, JsonSchema)]
    struct Item {
        id: u64,
        tags: Vec<Tag>,
    }

    #[allow(dead_code)]
    #[derive(Serialize, Deserialize, JsonSchema)]
    struct ListItems {
        owner: String,
        limit: Option<u32>,
    }

    #[allow(dead_code)]
    #[derive(Serialize, Deserialize, JsonSchema)]
    struct RenameItem {
        id: u64,
        name: String,
    }

    fn contract() -> Contract {
        let hello = route(Method::Get, "/")
            .summary("Greeting")
            .output::<Message>()
            .unwrap();
        let list = route(Method::Get, "/owners/{owner}/items")
            .tag("items")
            .input::<ListItems>()
            .output::<Vec<Item>>()
            .unwrap();
        let rename = route(Method::Patch, "/items/{id}")
            .input::<RenameItem>()
            .output::<Item>()
            .unwrap();
        Contract::builder()
            .procedure("hello.get", &hello)
            .procedure("items.list", &list)
            .procedure("items.rename", &rename)
            .build()
            .unwrap()
    }

    fn rendered() -> Value {
        serde_json::to_value(document(&contract(), "keel", "0.1.0").unwrap()).unwrap()
    }

    #[test]
    fn renders_paths_and_operation_ids() {
        let doc = rendered();
        assert_eq!(doc["openapi"], "3.1.0");
        assert_eq!(doc["info"]["title"], "keel");
        let hello = &doc["paths"]["/"]["get"];
        assert_eq!(hello["operationId"], "hello.get");
        assert_eq!(hello["summary"], "Greeting");
        assert!(hello.get("parameters").is_none());
        assert_eq!(
            hello["responses"]["200"]["content"]["application/json"]["schema"]["$ref"],
            "#/components/schemas/Message"
        );
    }

    #[test]
    fn splits_path_and_query_parameters() {
        let doc = rendered();
        let params = doc["paths"]["/owners/{owner}/items"]["get"]["parameters"]
            .as_array()
            .unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0]["in"], "path");
        assert_eq!(params[0]["name"], "owner");
        assert_eq!(params[1]["in"], "query");
        assert_eq!(params[1]["name"], "limit");
        assert_eq!(params[1]["required"], false);
    }

    #[test]
    fn body_methods_use_request_body_and_hoisted_refs() {
        let doc = rendered();
        let rename = &doc["paths"]["/items/{id}"]["patch"];
        assert_eq!(
            rename["requestBody"]["content"]["application/json"]["schema"]["$ref"],
            "#/components/schemas/RenameItem"
        );
        assert_eq!(rename["parameters"][0]["in"], "path");

        let schemas = &doc["components"]["schemas"];
        assert!(schemas.get("Tag").is_some());
        assert!(schemas.get("ProblemDetails").is_some());
        assert_eq!(
            schemas["Item"]["properties"]["tags"]["items"]["$ref"],
            "#/components/schemas/Tag"
        );
        let text = serde_json::to_string(&doc).unwrap();
        assert!(!text.contains("#/definitions/"));
    }
}
