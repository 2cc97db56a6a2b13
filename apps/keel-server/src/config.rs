use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

pub const DEFAULT_PORT: u16 = 3000;
const DEFAULT_BIND: &str = "0.0.0.0";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub(crate) enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ThrottleConfig {
    pub ttl: Duration,
    pub limit: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct ServerConfig {
    pub database_url: Option<Url>,
    pub cors_origin: String,
    pub port: u16,
    pub bind: IpAddr,
    pub throttle: ThrottleConfig,
    pub auth_users: Option<PathBuf>,
    pub session_ttl_secs: i64,
    pub hsts: bool,
    pub trust_forward: bool,
    pub access_log: bool,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read every setting through `lookup`, stopping at the first invalid one.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let database_url = get("DATABASE_URL")
            .map(|raw| parse_database_url(&raw))
            .transpose()?;

        let cors_origin = get("CORS_ORIGIN").ok_or(ConfigError::Missing("CORS_ORIGIN"))?;
        Url::parse(&cors_origin).map_err(|err| ConfigError::invalid("CORS_ORIGIN", err.to_string()))?;

        let port = match get("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(|| ConfigError::invalid("PORT", format!("{raw:?} is not a port number")))?,
            None => DEFAULT_PORT,
        };

        let ttl_ms = get("THROTTLE_TTL").ok_or(ConfigError::Missing("THROTTLE_TTL"))?;
        let ttl_ms = ttl_ms
            .parse::<u64>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| {
                ConfigError::invalid("THROTTLE_TTL", format!("{ttl_ms:?} is not a positive number of milliseconds"))
            })?;

        let limit = get("THROTTLE_LIMIT").ok_or(ConfigError::Missing("THROTTLE_LIMIT"))?;
        let limit = limit
            .parse::<u32>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| ConfigError::invalid("THROTTLE_LIMIT", format!("{limit:?} is not a positive integer")))?;

        let bind_raw = get("KEEL_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw
            .trim_matches(|c| c == '[' || c == ']')
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::invalid("KEEL_BIND", format!("{bind_raw:?} is not an IP address")))?;

        let auth_users = get("KEEL_AUTH_USERS").map(PathBuf::from);

        let session_ttl_secs = match get("KEEL_SESSION_TTL_SECS") {
            Some(raw) => raw.parse::<i64>().ok().filter(|v| *v > 0).ok_or_else(|| {
                ConfigError::invalid("KEEL_SESSION_TTL_SECS", format!("{raw:?} is not a positive integer"))
            })?,
            None => keel_auth::DEFAULT_SESSION_TTL_SECS,
        };

        let hsts = get("KEEL_HSTS").as_deref() != Some("0");
        let trust_forward = get("KEEL_TRUST_FORWARD_HEADERS").as_deref() == Some("1");
        let access_log = get("KEEL_ACCESS_LOG").as_deref() == Some("1");

        Ok(Self {
            database_url,
            cors_origin,
            port,
            bind,
            throttle: ThrottleConfig {
                ttl: Duration::from_millis(ttl_ms),
                limit,
            },
            auth_users,
            session_ttl_secs,
            hsts,
            trust_forward,
            access_log,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

fn parse_database_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|err| ConfigError::invalid("DATABASE_URL", err.to_string()))?;
    match url.scheme() {
        "postgres" | "postgresql" => Ok(url),
        other => Err(ConfigError::invalid(
            "DATABASE_URL",
            format!("unsupported scheme {other:?}; expected postgres:// or postgresql://"),
        )),
    }
}
