use std::path::PathBuf;

use once_cell::sync::OnceCell;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

/// Target used by the HTTP access log middleware.
pub const ACCESS_TARGET: &str = "http.access";

static ACCESS_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Minutely,
    Hourly,
    Daily,
}

/// Where the rolling access log goes when `KEEL_ACCESS_LOG_ROLL=1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessLogFile {
    pub dir: PathBuf,
    pub prefix: String,
    pub rotation: Rotation,
}

impl AccessLogFile {
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if lookup("KEEL_ACCESS_LOG_ROLL").as_deref() != Some("1") {
            return None;
        }
        let dir = lookup("KEEL_ACCESS_LOG_DIR")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "logs".to_string());
        let prefix = lookup("KEEL_ACCESS_LOG_PREFIX").unwrap_or_else(|| "http-access".into());
        let rotation = match lookup("KEEL_ACCESS_LOG_ROTATION")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "hourly" => Rotation::Hourly,
            "minutely" => Rotation::Minutely,
            _ => Rotation::Daily,
        };
        Some(Self {
            dir: PathBuf::from(dir),
            prefix,
            rotation,
        })
    }

    fn writer(&self) -> tracing_appender::rolling::RollingFileAppender {
        match self.rotation {
            Rotation::Hourly => tracing_appender::rolling::hourly(&self.dir, &self.prefix),
            Rotation::Minutely => tracing_appender::rolling::minutely(&self.dir, &self.prefix),
            Rotation::Daily => tracing_appender::rolling::daily(&self.dir, &self.prefix),
        }
    }
}

/// Install the global subscriber: console output filtered by `RUST_LOG` (default `info`), plus
/// the rolling access log file when enabled. Safe to call more than once.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(fmt::layer().with_filter(filter));

    let Some(file) = AccessLogFile::from_env() else {
        let _ = registry.try_init();
        return;
    };
    if std::fs::create_dir_all(&file.dir).is_err() {
        tracing::warn!(directory = %file.dir.display(), "failed to create access log directory");
    }
    let (nb, guard) = tracing_appender::non_blocking(file.writer());
    let _ = ACCESS_GUARD.set(guard);
    let targets = Targets::new().with_target(ACCESS_TARGET, tracing::Level::INFO);
    let access_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(nb)
        .with_filter(targets);
    let _ = registry.with(access_layer).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn rolling_log_is_opt_in() {
        assert_eq!(AccessLogFile::from_lookup(lookup(&[])), None);
        assert_eq!(
            AccessLogFile::from_lookup(lookup(&[("KEEL_ACCESS_LOG_ROLL", "0")])),
            None
        );
    }

    #[test]
    fn rolling_log_defaults_and_overrides() {
        let file = AccessLogFile::from_lookup(lookup(&[("KEEL_ACCESS_LOG_ROLL", "1")])).unwrap();
        assert_eq!(file.dir, PathBuf::from("logs"));
        assert_eq!(file.prefix, "http-access");
        assert_eq!(file.rotation, Rotation::Daily);

        let file = AccessLogFile::from_lookup(lookup(&[
            ("KEEL_ACCESS_LOG_ROLL", "1"),
            ("KEEL_ACCESS_LOG_DIR", "/var/log/keel"),
            ("KEEL_ACCESS_LOG_ROTATION", "Hourly"),
        ]))
        .unwrap();
        assert_eq!(file.dir, PathBuf::from("/var/log/keel"));
        assert_eq!(file.rotation, Rotation::Hourly);
    }
}
