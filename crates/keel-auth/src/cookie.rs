use axum::http::{header, HeaderMap};
use chrono::Duration;
use keel_protocol::SESSION_COOKIE;

/// `Set-Cookie` value for a fresh session. `None` lifetime yields a browser-session cookie.
pub fn session_cookie(token: &str, lifetime: Option<Duration>) -> String {
    let mut cookie = format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; Secure; SameSite=None");
    if let Some(lifetime) = lifetime {
        cookie.push_str(&format!("; Max-Age={}", lifetime.num_seconds().max(0)));
    }
    cookie
}

pub fn expired_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Secure; SameSite=None; Max-Age=0")
}

/// Session token from the `Cookie` header, falling back to `Authorization: Bearer`.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
        });
    if from_cookie.is_some() {
        return from_cookie;
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Origins allowed to drive mutating auth requests.
///
/// Entries ending in `://` (app schemes such as `myapp://`) match by prefix; everything else must
/// match exactly, ignoring a trailing slash.
#[derive(Debug, Clone, Default)]
pub struct TrustedOrigins {
    entries: Vec<String>,
}

impl TrustedOrigins {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(Into::into)
                .filter(|e: &String| !e.trim().is_empty())
                .collect(),
        }
    }

    /// `CORS_ORIGIN` plus the mobile app schemes.
    pub fn for_web_origin(origin: &str) -> Self {
        Self::new([origin, "myapp://", "exp://"])
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn allows(&self, origin: &str) -> bool {
        let origin = origin.trim();
        self.entries.iter().any(|entry| {
            if entry.ends_with("://") {
                origin.starts_with(entry.as_str())
            } else {
                entry.trim_end_matches('/') == origin.trim_end_matches('/')
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn cookie_attributes() {
        let cookie = session_cookie("abc", Some(Duration::days(7)));
        assert_eq!(
            cookie,
            "keel.session_token=abc; Path=/; HttpOnly; Secure; SameSite=None; Max-Age=604800"
        );
        assert!(!session_cookie("abc", None).contains("Max-Age"));
        assert!(expired_session_cookie().ends_with("Max-Age=0"));
    }

    #[test]
    fn reads_token_from_cookie_or_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; keel.session_token=tok123; other=1"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("tok123"));

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok456"));
        assert_eq!(session_token(&headers).as_deref(), Some("tok456"));

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("keel.session_token="));
        assert!(session_token(&headers).is_none());
    }

    #[test]
    fn trusted_origin_matching() {
        let trusted = TrustedOrigins::for_web_origin("http://localhost:3001");
        assert!(trusted.allows("http://localhost:3001"));
        assert!(trusted.allows("http://localhost:3001/"));
        assert!(trusted.allows("myapp://callback"));
        assert!(trusted.allows("exp://192.168.1.4:8081"));
        assert!(!trusted.allows("http://localhost:3002"));
        assert!(!trusted.allows("https://evil.example"));

        let empty = TrustedOrigins::for_web_origin("");
        assert_eq!(empty.entries().len(), 2);
    }
}
