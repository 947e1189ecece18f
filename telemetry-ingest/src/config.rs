use serde::Deserialize;
use std::{fs, path::PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for the JSON log file; console only when absent.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    /// Rotated files kept next to the active one.
    #[serde(default = "default_retention")]
    pub retention: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            max_file_bytes: default_max_file_bytes(),
            retention: default_retention(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_file_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_retention() -> usize {
    5
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Http,
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,
    #[serde(default = "default_http_bind_addr")]
    pub http_bind_addr: String,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default)]
    pub auth_bearer_token: Option<String>,
    /// NDJSON input for `kind = "file"`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_http_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_channel_capacity() -> usize {
    1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    /// Output file for normalized readings; stdout when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub dead_letter_path: Option<PathBuf>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            path: None,
            batch_size: default_batch_size(),
            dead_letter_path: None,
        }
    }
}

fn default_batch_size() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("INGESTION_CONFIG")
            .unwrap_or_else(|_| "ingestion-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config {path}: {e}"))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        if cfg.source.kind == SourceKind::File && cfg.source.path.is_none() {
            anyhow::bail!("source.path is required when source.kind = \"file\"");
        }
        if cfg.sink.batch_size == 0 {
            anyhow::bail!("sink.batch_size must be at least 1");
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let cfg = AppConfig::from_toml_str(
            r#"
[logging]
level = "debug"
dir = "/var/log/meters"
max_file_bytes = 1024
retention = 2

[source]
kind = "http"
http_bind_addr = "127.0.0.1:9000"
channel_capacity = 16
auth_bearer_token = "s3cret"

[sink]
path = "readings.ndjson"
batch_size = 10
dead_letter_path = "rejected.ndjson"

[validation]
enabled = false

[metrics]
bind_addr = "127.0.0.1:9100"
"#,
        )
        .unwrap();

        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.logging.dir, Some(PathBuf::from("/var/log/meters")));
        assert_eq!(cfg.logging.retention, 2);
        assert_eq!(cfg.source.kind, SourceKind::Http);
        assert_eq!(cfg.source.channel_capacity, 16);
        assert_eq!(cfg.source.auth_bearer_token.as_deref(), Some("s3cret"));
        assert_eq!(cfg.sink.batch_size, 10);
        assert_eq!(cfg.sink.dead_letter_path, Some(PathBuf::from("rejected.ndjson")));
        assert!(!cfg.validation.enabled);
        assert_eq!(cfg.metrics.unwrap().bind_addr, "127.0.0.1:9100");
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = AppConfig::from_toml_str(
            r#"
[source]
kind = "file"
path = "payloads.ndjson"
"#,
        )
        .unwrap();

        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.logging.max_file_bytes, 5 * 1024 * 1024);
        assert_eq!(cfg.logging.retention, 5);
        assert_eq!(cfg.source.http_bind_addr, "0.0.0.0:8080");
        assert_eq!(cfg.sink.path, None);
        assert_eq!(cfg.sink.batch_size, 100);
        assert!(cfg.validation.enabled);
        assert!(cfg.metrics.is_none());
    }

    #[test]
    fn file_source_requires_path() {
        let res = AppConfig::from_toml_str(
            r#"
[source]
kind = "file"
"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn unknown_source_kind_is_rejected() {
        let res = AppConfig::from_toml_str(
            r#"
[source]
kind = "mqtt"
"#,
        );
        assert!(res.is_err());
    }
}
