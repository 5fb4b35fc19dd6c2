//! Layered configuration loading for sharebox.
//!
//! # Usage
//!
//! ```rust,no_run
//! use shareconf::ShareConfig;
//!
//! let config = ShareConfig::load().expect("Failed to load config");
//!
//! println!("data dir: {}", config.paths.data_dir.display());
//! println!("listening on {}", config.bind.addr());
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/sharebox/config.toml` (system)
//! 2. `~/.config/sharebox/config.toml` (user)
//! 3. `./sharebox.toml` (local override, or the `--config` path)
//! 4. Environment variables (`SHAREBOX_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! data_dir = "~/.local/share/sharebox"
//! read_only = false
//!
//! [bind]
//! host = "0.0.0.0"
//! http_port = 8090
//!
//! [telemetry]
//! log_level = "info"
//! otlp_endpoint = ""
//!
//! [limits]
//! max_upload_bytes = 52428800
//! max_code_attempts = 32
//! allowed_extensions = ["txt", "jpg", "png", "pdf", "docx"]
//! session_idle_secs = 1800
//! ```

pub mod loader;
pub mod sections;

pub use loader::{discover_config_files_with_override, expand_path, ConfigSources};
pub use sections::{BindConfig, LimitsConfig, PathsConfig, TelemetryConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete sharebox configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ShareConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub bind: BindConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub limits: LimitsConfig,
}

impl ShareConfig {
    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/sharebox/config.toml`
    /// 3. `~/.config/sharebox/config.toml`
    /// 4. `./sharebox.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = ShareConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::load_from_file(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Built by hand to keep section order and the header comment
        let mut output = String::new();

        output.push_str("# sharebox configuration\n\n");

        output.push_str("[paths]\n");
        output.push_str(&format!(
            "data_dir = {}\n",
            quote(&self.paths.data_dir.display().to_string())
        ));
        output.push_str(&format!("read_only = {}\n", self.paths.read_only));

        output.push_str("\n[bind]\n");
        output.push_str(&format!("host = {}\n", quote(&self.bind.host)));
        output.push_str(&format!("http_port = {}\n", self.bind.http_port));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = {}\n", quote(&self.telemetry.log_level)));
        output.push_str(&format!(
            "otlp_endpoint = {}\n",
            quote(&self.telemetry.otlp_endpoint)
        ));

        output.push_str("\n[limits]\n");
        output.push_str(&format!(
            "max_upload_bytes = {}\n",
            self.limits.max_upload_bytes
        ));
        output.push_str(&format!(
            "max_code_attempts = {}\n",
            self.limits.max_code_attempts
        ));
        let extensions: Vec<String> = self
            .limits
            .allowed_extensions
            .iter()
            .map(|ext| quote(ext))
            .collect();
        output.push_str(&format!(
            "allowed_extensions = [{}]\n",
            extensions.join(", ")
        ));
        output.push_str(&format!(
            "session_idle_secs = {}\n",
            self.limits.session_idle_secs
        ));

        output
    }
}

fn quote(s: &str) -> String {
    toml::Value::String(s.to_string()).to_string()
}
