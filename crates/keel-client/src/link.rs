use std::sync::Arc;

use keel_protocol::{ProblemDetails, SESSION_COOKIE};
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, COOKIE, SET_COOKIE};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::ClientError;

pub const API_URL_ENV: &str = "NEXT_PUBLIC_API_URL";
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Called with every failed call, after the built-in log line.
pub type ClientInterceptor = Arc<dyn Fn(&ClientError) + Send + Sync>;

/// Session token shared by every request made through one [`Link`].
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    token: Arc<RwLock<Option<String>>>,
}

impl Credentials {
    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    pub fn clear(&self) {
        *self.token.write() = None;
    }

    pub fn is_set(&self) -> bool {
        self.token.read().is_some()
    }

    fn cookie_header(&self) -> Option<String> {
        self.token
            .read()
            .as_ref()
            .map(|token| format!("{SESSION_COOKIE}={token}"))
    }

    /// Apply any session cookie the server set or expired.
    fn capture(&self, headers: &HeaderMap) {
        for raw in headers.get_all(SET_COOKIE).iter().filter_map(|v| v.to_str().ok()) {
            let mut parts = raw.split(';').map(str::trim);
            let Some((name, value)) = parts.next().and_then(|p| p.split_once('=')) else {
                continue;
            };
            if name != SESSION_COOKIE {
                continue;
            }
            let expired = parts.any(|attr| attr.eq_ignore_ascii_case("max-age=0"));
            if value.is_empty() || expired {
                self.clear();
            } else {
                self.set(value);
            }
        }
    }
}

/// Transport shared by the contract and auth clients.
#[derive(Clone)]
pub struct Link {
    base: String,
    http: reqwest::Client,
    credentials: Credentials,
    interceptors: Vec<ClientInterceptor>,
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("base", &self.base)
            .field("signed_in", &self.credentials.is_set())
            .finish()
    }
}

impl Link {
    pub fn new(base: &str) -> Result<Self, ClientError> {
        let parsed = Url::parse(base).map_err(|err| ClientError::InvalidBaseUrl {
            url: base.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::InvalidBaseUrl {
                url: base.to_string(),
                reason: "scheme must be http or https".into(),
            });
        }
        Ok(Self {
            base: parsed.as_str().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            credentials: Credentials::default(),
            interceptors: Vec::new(),
        })
    }

    /// Base URL from `NEXT_PUBLIC_API_URL`, defaulting to `http://localhost:3000`.
    pub fn from_env() -> Result<Self, ClientError> {
        let base = std::env::var(API_URL_ENV)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        Self::new(&base)
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn on_error<F>(mut self, interceptor: F) -> Self
    where
        F: Fn(&ClientError) + Send + Sync + 'static,
    {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Perform one request. Non-2xx answers become [`ClientError::Remote`].
    pub(crate) async fn send<Q, B>(
        &self,
        method: Method,
        path: &str,
        query: Option<&Q>,
        body: Option<&B>,
    ) -> Result<Value, ClientError>
    where
        Q: Serialize + ?Sized,
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base, path);
        let mut request = self.http.request(method, url);
        if let Some(query) = query {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(cookie) = self.credentials.cookie_header() {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await?;
        self.credentials.capture(response.headers());
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let problem = serde_json::from_slice::<ProblemDetails>(&bytes).unwrap_or_else(|_| {
                ProblemDetails::new(
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Request failed"),
                )
            });
            return Err(ClientError::Remote {
                status: status.as_u16(),
                problem,
            });
        }

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|err| ClientError::Decode(err.to_string()))
    }

    /// Log a failure and hand it to the interceptors; returns it for `?`.
    pub(crate) fn intercept(&self, err: ClientError) -> ClientError {
        tracing::warn!(base = %self.base, "api call failed: {err}");
        for interceptor in &self.interceptors {
            interceptor(&err);
        }
        err
    }
}
