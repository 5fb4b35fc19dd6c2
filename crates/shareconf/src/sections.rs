//! Configuration sections, one per TOML table.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where persisted state lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of uploads, shared texts, staging and the visitor counter.
    /// Default: ~/.local/share/sharebox
    #[serde(default = "PathsConfig::default_data_dir")]
    pub data_dir: PathBuf,

    /// Serve existing content only: uploads are refused and nothing under
    /// `data_dir` is written, the visitor counter included.
    #[serde(default)]
    pub read_only: bool,
}

impl PathsConfig {
    fn default_data_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".local/share/sharebox"))
            .unwrap_or_else(|| PathBuf::from(".local/share/sharebox"))
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            read_only: false,
        }
    }
}

/// HTTP listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindConfig {
    /// Default: 0.0.0.0
    #[serde(default = "BindConfig::default_host")]
    pub host: String,

    /// Default: 8090
    #[serde(default = "BindConfig::default_http_port")]
    pub http_port: u16,
}

impl BindConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_http_port() -> u16 {
        8090
    }

    /// `host:port` for the listener.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            http_port: Self::default_http_port(),
        }
    }
}

/// Logging and trace export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive string.
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,

    /// OTLP gRPC endpoint. Empty disables export.
    #[serde(default)]
    pub otlp_endpoint: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }

    pub fn otlp_enabled(&self) -> bool {
        !self.otlp_endpoint.trim().is_empty()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            otlp_endpoint: String::new(),
        }
    }
}

/// Request and storage limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Largest accepted request body.
    /// Default: 50 MiB
    #[serde(default = "LimitsConfig::default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Generated codes tried per upload before giving up.
    /// Default: 32
    #[serde(default = "LimitsConfig::default_max_code_attempts")]
    pub max_code_attempts: u32,

    /// Accepted upload extensions, without the dot. Empty allows any.
    #[serde(default)]
    pub allowed_extensions: Vec<String>,

    /// Seconds without a visit before a visitor session is forgotten.
    /// Default: 1800 (30 minutes)
    #[serde(default = "LimitsConfig::default_session_idle_secs")]
    pub session_idle_secs: u64,
}

impl LimitsConfig {
    fn default_max_upload_bytes() -> usize {
        50 * 1024 * 1024
    }

    fn default_max_code_attempts() -> u32 {
        32
    }

    fn default_session_idle_secs() -> u64 {
        30 * 60
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: Self::default_max_upload_bytes(),
            max_code_attempts: Self::default_max_code_attempts(),
            allowed_extensions: Vec::new(),
            session_idle_secs: Self::default_session_idle_secs(),
        }
    }
}
