use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use keel_api::HelloResponse;
use keel_contract::Contract;
use keel_rpc::{RpcContext, RpcError};
use serde_json::json;
use sha2::{Digest, Sha256};

const GREETING: &str = "Hello World!";
const CACHE_CONTROL_SPEC: &str = "public, max-age=300, must-revalidate";

pub(crate) async fn hello_get(_ctx: RpcContext, _input: ()) -> Result<HelloResponse, RpcError> {
    Ok(HelloResponse {
        message: GREETING.to_string(),
    })
}

pub(crate) async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

/// The generated OpenAPI document, rendered once at startup.
#[derive(Debug)]
pub(crate) struct SpecDocument {
    body: Vec<u8>,
    etag: HeaderValue,
}

impl SpecDocument {
    pub fn render(contract: &Contract) -> anyhow::Result<Self> {
        let doc = keel_contract::openapi::document(
            contract,
            keel_api::TITLE,
            env!("CARGO_PKG_VERSION"),
        )?;
        let body = serde_json::to_vec_pretty(&doc)?;
        let digest = hex::encode(Sha256::digest(&body));
        let etag = HeaderValue::from_str(&format!("\"{digest}\""))?;
        Ok(Self { body, etag })
    }

    fn tag(&self) -> &str {
        self.etag.to_str().unwrap_or_default().trim_matches('"')
    }
}

pub(crate) async fn spec_openapi(
    State(spec): State<Arc<SpecDocument>>,
    headers: HeaderMap,
) -> Response {
    let status = if if_none_match_matches(&headers, spec.tag()) {
        StatusCode::NOT_MODIFIED
    } else {
        StatusCode::OK
    };
    let body = if status == StatusCode::OK {
        Body::from(spec.body.clone())
    } else {
        Body::empty()
    };
    let mut res = Response::new(body);
    *res.status_mut() = status;
    let h = res.headers_mut();
    h.insert(header::ETAG, spec.etag.clone());
    h.insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL_SPEC));
    if status == StatusCode::OK {
        h.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    res
}

fn if_none_match_matches(headers: &HeaderMap, etag: &str) -> bool {
    let Some(raw) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    raw.split(',').any(|candidate| {
        let value = candidate.trim();
        if value == "*" {
            return true;
        }
        let value = value.strip_prefix("W/").unwrap_or(value).trim();
        value.trim_matches('"').eq_ignore_ascii_case(etag)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn if_none_match_handles_lists_and_weak_tags() {
        let mut headers = HeaderMap::new();
        assert!(!if_none_match_matches(&headers, "abc"));
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"zzz\", W/\"abc\""));
        assert!(if_none_match_matches(&headers, "abc"));
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("*"));
        assert!(if_none_match_matches(&headers, "anything"));
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"zzz\""));
        assert!(!if_none_match_matches(&headers, "abc"));
    }

    #[test]
    fn spec_document_is_tagged() {
        let contract = keel_api::contract().unwrap();
        let spec = SpecDocument::render(&contract).unwrap();
        assert_eq!(spec.tag().len(), 64);
        let doc: serde_json::Value = serde_json::from_slice(&spec.body).unwrap();
        assert_eq!(doc["info"]["title"], "keel");
        assert!(doc["paths"]["/"]["get"].is_object());
    }
}
