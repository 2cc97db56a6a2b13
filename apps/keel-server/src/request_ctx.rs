use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

pub(crate) const HEADER_REQUEST_ID: &str = "x-request-id";
const MAX_ID_LEN: usize = 128;

/// Correlation id of the request being served.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RequestId {
    id: String,
    generated: bool,
}

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.id
    }

    pub fn generated(&self) -> bool {
        self.generated
    }
}

/// Accept a caller's `x-request-id` (sanitized) or mint one, and echo it on the response.
pub(crate) async fn correlation_mw(mut req: Request<Body>, next: Next) -> Response {
    let header = HeaderName::from_static(HEADER_REQUEST_ID);
    let provided = req
        .headers()
        .get(&header)
        .and_then(|value| value.to_str().ok())
        .and_then(normalize_id);
    let request_id = match provided {
        Some(id) => RequestId {
            id,
            generated: false,
        },
        None => RequestId {
            id: Uuid::new_v4().to_string(),
            generated: true,
        },
    };

    let value = HeaderValue::from_str(request_id.as_str()).ok();
    if let Some(value) = &value {
        req.headers_mut().insert(header.clone(), value.clone());
    }
    req.extensions_mut().insert(request_id);

    let mut res = next.run(req).await;
    if let Some(value) = value {
        res.headers_mut().insert(header, value);
    }
    res
}

pub(crate) fn request_id<B>(req: &Request<B>) -> Option<RequestId> {
    req.extensions().get::<RequestId>().cloned()
}

fn normalize_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len().min(MAX_ID_LEN));
    for ch in trimmed.chars() {
        if ch.is_control() {
            continue;
        }
        if out.len() >= MAX_ID_LEN {
            break;
        }
        out.push(ch);
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use tower::ServiceExt;

    #[test]
    fn normalize_id_trims_controls_and_limits_length() {
        assert_eq!(normalize_id("  abc  "), Some("abc".into()));
        assert!(normalize_id("   ").is_none());
        assert_eq!(normalize_id("a\u{0007}b\u{007f}c"), Some("abc".into()));
        let long = "x".repeat(MAX_ID_LEN + 24);
        assert_eq!(normalize_id(&long).map(|s| s.len()), Some(MAX_ID_LEN));
    }

    fn app() -> Router {
        Router::new()
            .route(
                "/",
                get(|req: Request<Body>| async move {
                    let id = request_id(&req).expect("request id extension");
                    let header = req.headers()[HEADER_REQUEST_ID].to_str().unwrap().to_string();
                    assert_eq!(id.as_str(), header);
                    id.generated().to_string()
                }),
            )
            .layer(axum::middleware::from_fn(correlation_mw))
    }

    #[tokio::test]
    async fn provided_id_is_echoed() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(HEADER_REQUEST_ID, " req-xyz ")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[HEADER_REQUEST_ID], "req-xyz");
    }

    #[tokio::test]
    async fn missing_id_is_generated() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let id = response.headers()[HEADER_REQUEST_ID].to_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }
}
