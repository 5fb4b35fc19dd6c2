//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, ShareConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/sharebox/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("sharebox/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("sharebox.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file and apply it on top of `config`.
pub fn load_from_file(config: &mut ShareConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

/// Apply the keys present in a TOML document on top of `config`.
///
/// Keys that are absent keep their current value, so layering files is just
/// applying them in order. Unknown keys are ignored.
pub fn apply_toml(
    config: &mut ShareConfig,
    contents: &str,
    path: &Path,
) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let section = Section { path, table: &table };

    if let Some(paths) = section.table("paths")? {
        if let Some(v) = paths.string("data_dir")? {
            config.paths.data_dir = expand_path(&v);
        }
        if let Some(v) = paths.boolean("read_only")? {
            config.paths.read_only = v;
        }
    }

    if let Some(bind) = section.table("bind")? {
        if let Some(v) = bind.string("host")? {
            config.bind.host = v;
        }
        if let Some(v) = bind.integer("http_port")? {
            config.bind.http_port = bind.convert("http_port", v)?;
        }
    }

    if let Some(telemetry) = section.table("telemetry")? {
        if let Some(v) = telemetry.string("log_level")? {
            config.telemetry.log_level = v;
        }
        if let Some(v) = telemetry.string("otlp_endpoint")? {
            config.telemetry.otlp_endpoint = v;
        }
    }

    if let Some(limits) = section.table("limits")? {
        if let Some(v) = limits.integer("max_upload_bytes")? {
            config.limits.max_upload_bytes = limits.convert("max_upload_bytes", v)?;
        }
        if let Some(v) = limits.integer("max_code_attempts")? {
            config.limits.max_code_attempts = limits.convert("max_code_attempts", v)?;
        }
        if let Some(v) = limits.strings("allowed_extensions")? {
            config.limits.allowed_extensions = v;
        }
        if let Some(v) = limits.integer("session_idle_secs")? {
            config.limits.session_idle_secs = limits.convert("session_idle_secs", v)?;
        }
    }

    Ok(())
}

/// A TOML table plus the file it came from, for error messages.
struct Section<'a> {
    path: &'a Path,
    table: &'a toml::Table,
}

impl<'a> Section<'a> {
    fn error(&self, key: &str, expected: &str) -> ConfigError {
        ConfigError::Parse {
            path: self.path.to_path_buf(),
            message: format!("{} must be {}", key, expected),
        }
    }

    fn table(&self, key: &str) -> Result<Option<Section<'a>>, ConfigError> {
        match self.table.get(key) {
            None => Ok(None),
            Some(toml::Value::Table(table)) => Ok(Some(Section {
                path: self.path,
                table,
            })),
            Some(_) => Err(self.error(key, "a table")),
        }
    }

    fn string(&self, key: &str) -> Result<Option<String>, ConfigError> {
        match self.table.get(key) {
            None => Ok(None),
            Some(toml::Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.error(key, "a string")),
        }
    }

    fn integer(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        match self.table.get(key) {
            None => Ok(None),
            Some(toml::Value::Integer(i)) => Ok(Some(*i)),
            Some(_) => Err(self.error(key, "an integer")),
        }
    }

    fn boolean(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.table.get(key) {
            None => Ok(None),
            Some(toml::Value::Boolean(b)) => Ok(Some(*b)),
            Some(_) => Err(self.error(key, "a boolean")),
        }
    }

    fn strings(&self, key: &str) -> Result<Option<Vec<String>>, ConfigError> {
        match self.table.get(key) {
            None => Ok(None),
            Some(toml::Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| self.error(key, "an array of strings"))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(_) => Err(self.error(key, "an array of strings")),
        }
    }

    fn convert<T: TryFrom<i64>>(&self, key: &str, value: i64) -> Result<T, ConfigError> {
        T::try_from(value).map_err(|_| self.error(key, "in range"))
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut ShareConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |key| env::var(key).ok());
}

/// Apply overrides from an arbitrary variable lookup.
pub fn apply_overrides_from<F>(config: &mut ShareConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut take = |key: &str| {
        let value = lookup(key)?;
        sources.env_overrides.push(key.to_string());
        Some(value)
    };

    if let Some(v) = take("SHAREBOX_DATA_DIR") {
        config.paths.data_dir = expand_path(&v);
    }
    if let Some(v) = take("SHAREBOX_READ_ONLY") {
        match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => config.paths.read_only = true,
            "0" | "false" | "no" => config.paths.read_only = false,
            _ => eprintln!("ignoring SHAREBOX_READ_ONLY={:?}: not a boolean", v),
        }
    }

    if let Some(v) = take("SHAREBOX_HOST") {
        config.bind.host = v;
    }
    if let Some(v) = take("SHAREBOX_HTTP_PORT") {
        match v.parse() {
            Ok(port) => config.bind.http_port = port,
            Err(_) => eprintln!("ignoring SHAREBOX_HTTP_PORT={:?}: not a port", v),
        }
    }

    if let Some(v) = take("SHAREBOX_OTLP_ENDPOINT") {
        config.telemetry.otlp_endpoint = v;
    }
    if let Some(v) = take("SHAREBOX_LOG_LEVEL") {
        config.telemetry.log_level = v;
    }
    // RUST_LOG wins over everything else
    if let Some(v) = take("RUST_LOG") {
        config.telemetry.log_level = v;
    }

    if let Some(v) = take("SHAREBOX_MAX_UPLOAD_BYTES") {
        match v.parse() {
            Ok(bytes) => config.limits.max_upload_bytes = bytes,
            Err(_) => eprintln!("ignoring SHAREBOX_MAX_UPLOAD_BYTES={:?}: not a size", v),
        }
    }
    if let Some(v) = take("SHAREBOX_SESSION_IDLE_SECS") {
        match v.parse() {
            Ok(secs) => config.limits.session_idle_secs = secs,
            Err(_) => eprintln!("ignoring SHAREBOX_SESSION_IDLE_SECS={:?}: not a number", v),
        }
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        match directories::BaseDirs::new() {
            Some(dirs) => dirs.home_dir().join(stripped),
            None => PathBuf::from(path),
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // $VAR or $VAR/rest/of/path
        let (var_name, rest) = match stripped.split_once('/') {
            Some((name, rest)) => (name, Some(rest)),
            None => (stripped, None),
        };
        match (env::var(var_name), rest) {
            (Ok(value), Some(rest)) => PathBuf::from(value).join(rest),
            (Ok(value), None) => PathBuf::from(value),
            (Err(_), _) => PathBuf::from(path),
        }
    } else {
        PathBuf::from(path)
    }
}
