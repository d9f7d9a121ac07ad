//! Configuration types for url-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Prefix for environment overrides (e.g. `URL_DL_WORKERS=8`)
pub const ENV_PREFIX: &str = "URL_DL_";

/// Download behavior configuration (directories, concurrency, limits)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloadConfig {
    /// Directory downloaded files are written to (default: "downloads/files")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Number of worker slots shared by all tasks (default: 5)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Maximum items of a single task in flight at once (default: 5, 0 = unlimited)
    #[serde(default = "default_per_task_concurrency")]
    pub per_task_concurrency: usize,

    /// Capacity of the job queue in front of the workers (default: 100)
    ///
    /// Submitting blocks while the queue is full.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Whole-request timeout for a single transfer (default: 30 minutes)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub download_timeout: Duration,

    /// Per-file size ceiling in bytes (default: 100 MiB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_concurrent_downloads: default_max_concurrent(),
            per_task_concurrency: default_per_task_concurrency(),
            queue_capacity: default_queue_capacity(),
            download_timeout: default_download_timeout(),
            max_file_size: default_max_file_size(),
        }
    }
}

/// Task record storage
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PersistenceConfig {
    /// Directory holding one JSON record per task (default: "downloads/tasks")
    #[serde(default = "default_task_dir")]
    pub task_dir: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            task_dir: default_task_dir(),
        }
    }
}

/// API and external server integration configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,

    /// Maximum URLs accepted in one task submission (default: 10)
    #[serde(default = "default_max_urls_per_task")]
    pub max_urls_per_task: usize,

    /// Accept URLs pointing at loopback, private or link-local hosts (default: false)
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
            max_urls_per_task: default_max_urls_per_task(),
            allow_private_hosts: false,
        }
    }
}

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::Config {
                message: format!("unknown log format '{other}' (expected text or json)"),
                key: Some("logging.format".to_string()),
            }),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset (default: "info,url_dl=debug")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (default: text)
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Main configuration for UrlDownloader
///
/// Fields are organized into sub-configs:
/// - [`download`](DownloadConfig) — directories, concurrency, limits
/// - [`persistence`](PersistenceConfig) — task record directory
/// - [`server`](ServerIntegrationConfig) — REST API
/// - [`logging`](LoggingConfig) — log filter and format
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Task record storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// API server settings
    #[serde(default)]
    pub server: ServerIntegrationConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// How long shutdown waits for in-flight work (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Load configuration from an optional TOML file, then apply `URL_DL_*`
    /// environment overrides and validate.
    ///
    /// A path that does not exist yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_toml_file(path)?,
            Some(path) => {
                tracing::info!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without applying overrides or validation
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Parse TOML text without applying overrides or validation
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config {
            message: format!("invalid TOML: {e}"),
            key: None,
        })
    }

    /// Apply environment overrides using `lookup` to resolve `URL_DL_*` keys
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));

        if let Some(v) = get("DOWNLOAD_DIR") {
            self.download.download_dir = PathBuf::from(v);
        }
        if let Some(v) = get("TASK_DIR") {
            self.persistence.task_dir = PathBuf::from(v);
        }
        if let Some(v) = get("WORKERS") {
            self.download.max_concurrent_downloads = parse_env("WORKERS", &v)?;
        }
        if let Some(v) = get("MAX_FILE_SIZE") {
            self.download.max_file_size = parse_env("MAX_FILE_SIZE", &v)?;
        }
        if let Some(v) = get("DOWNLOAD_TIMEOUT") {
            self.download.download_timeout =
                Duration::from_secs(parse_env("DOWNLOAD_TIMEOUT", &v)?);
        }
        if let Some(v) = get("BIND_ADDRESS") {
            self.server.api.bind_address = parse_env("BIND_ADDRESS", &v)?;
        }
        if let Some(v) = get("SHUTDOWN_TIMEOUT") {
            self.shutdown_timeout = Duration::from_secs(parse_env("SHUTDOWN_TIMEOUT", &v)?);
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = get("LOG_FORMAT") {
            self.logging.format = v.parse()?;
        }
        Ok(())
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.download.max_concurrent_downloads == 0 {
            return Err(invalid(
                "download.max_concurrent_downloads",
                "worker pool needs at least one worker",
            ));
        }
        if self.download.queue_capacity == 0 {
            return Err(invalid(
                "download.queue_capacity",
                "job queue capacity must be at least 1",
            ));
        }
        if self.download.max_file_size == 0 {
            return Err(invalid(
                "download.max_file_size",
                "maximum file size must be greater than zero",
            ));
        }
        if self.download.download_timeout.is_zero() {
            return Err(invalid(
                "download.download_timeout",
                "download timeout must be greater than zero",
            ));
        }
        if self.shutdown_timeout.is_zero() {
            return Err(invalid(
                "shutdown_timeout",
                "shutdown timeout must be greater than zero",
            ));
        }
        if self.download.download_dir.as_os_str().is_empty() {
            return Err(invalid("download.download_dir", "directory must not be empty"));
        }
        if self.persistence.task_dir.as_os_str().is_empty() {
            return Err(invalid("persistence.task_dir", "directory must not be empty"));
        }
        if self.server.api.max_urls_per_task == 0 {
            return Err(invalid(
                "server.api.max_urls_per_task",
                "must accept at least one URL per task",
            ));
        }
        Ok(())
    }

    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Task record directory
    pub fn task_dir(&self) -> &PathBuf {
        &self.persistence.task_dir
    }
}

fn invalid(key: &str, message: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

fn parse_env<T>(suffix: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| Error::Config {
        message: format!("{ENV_PREFIX}{suffix}={value:?}: {e}"),
        key: Some(format!("{ENV_PREFIX}{suffix}")),
    })
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads/files")
}

fn default_task_dir() -> PathBuf {
    PathBuf::from("downloads/tasks")
}

fn default_max_concurrent() -> usize {
    5
}

fn default_per_task_concurrency() -> usize {
    5
}

fn default_queue_capacity() -> usize {
    100
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_max_urls_per_task() -> usize {
    10
}

fn default_log_level() -> String {
    "info,url_dl=debug".to_string()
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();

        assert_eq!(config.download.download_dir, PathBuf::from("downloads/files"));
        assert_eq!(config.persistence.task_dir, PathBuf::from("downloads/tasks"));
        assert_eq!(config.download.max_concurrent_downloads, 5);
        assert_eq!(config.download.per_task_concurrency, 5);
        assert_eq!(config.download.queue_capacity, 100);
        assert_eq!(config.download.max_file_size, 100 * 1024 * 1024);
        assert_eq!(config.download.download_timeout, Duration::from_secs(1800));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(config.server.api.max_urls_per_task, 10);
        assert!(!config.server.api.allow_private_hosts);
        assert_eq!(config.server.api.bind_address.port(), 8080);
        config.validate().expect("defaults must validate");
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.download.max_concurrent_downloads, 5);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn toml_sections_override_selected_fields() {
        let raw = r#"
            shutdown_timeout = 5

            [download]
            download_dir = "/srv/files"
            max_concurrent_downloads = 2
            download_timeout = 60

            [persistence]
            task_dir = "/srv/tasks"

            [server.api]
            bind_address = "127.0.0.1:9000"
            max_urls_per_task = 3

            [logging]
            format = "json"
        "#;

        let config = Config::from_toml_str(raw).unwrap();

        assert_eq!(config.download.download_dir, PathBuf::from("/srv/files"));
        assert_eq!(config.download.max_concurrent_downloads, 2);
        assert_eq!(config.download.download_timeout, Duration::from_secs(60));
        assert_eq!(
            config.download.queue_capacity, 100,
            "unspecified fields keep their defaults"
        );
        assert_eq!(config.persistence.task_dir, PathBuf::from("/srv/tasks"));
        assert_eq!(config.server.api.bind_address.port(), 9000);
        assert_eq!(config.server.api.max_urls_per_task, 3);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = Config::from_toml_str("[download\nmax = ").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[
                ("URL_DL_DOWNLOAD_DIR", "/data/files"),
                ("URL_DL_TASK_DIR", "/data/tasks"),
                ("URL_DL_WORKERS", "12"),
                ("URL_DL_MAX_FILE_SIZE", "2048"),
                ("URL_DL_DOWNLOAD_TIMEOUT", "90"),
                ("URL_DL_BIND_ADDRESS", "127.0.0.1:3000"),
                ("URL_DL_SHUTDOWN_TIMEOUT", "7"),
                ("URL_DL_LOG_LEVEL", "warn"),
                ("URL_DL_LOG_FORMAT", "JSON"),
            ]))
            .unwrap();

        assert_eq!(config.download.download_dir, PathBuf::from("/data/files"));
        assert_eq!(config.persistence.task_dir, PathBuf::from("/data/tasks"));
        assert_eq!(config.download.max_concurrent_downloads, 12);
        assert_eq!(config.download.max_file_size, 2048);
        assert_eq!(config.download.download_timeout, Duration::from_secs(90));
        assert_eq!(config.server.api.bind_address.port(), 3000);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(7));
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn unparsable_env_override_names_the_variable() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(env(&[("URL_DL_WORKERS", "lots")]))
            .unwrap_err();

        match err {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("URL_DL_WORKERS")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut config = Config::default();
        config.download.max_concurrent_downloads = 0;

        match config.validate().unwrap_err() {
            Error::Config { key, .. } => {
                assert_eq!(key.as_deref(), Some("download.max_concurrent_downloads"))
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_zero_size_limit_and_queue() {
        let mut config = Config::default();
        config.download.max_file_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.download.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.persistence.task_dir = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn per_task_concurrency_zero_is_allowed() {
        let mut config = Config::default();
        config.download.per_task_concurrency = 0;
        config.validate().expect("0 means unlimited");
    }

    #[test]
    fn load_with_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.download.queue_capacity, 100);
    }

    #[test]
    fn duration_serde_serializes_as_seconds() {
        let config = Config::default();
        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(json["shutdown_timeout"], 30);
        assert_eq!(json["download"]["download_timeout"], 1800);
    }
}
