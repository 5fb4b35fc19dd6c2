//! Store configuration and on-disk layout.
//!
//! Default base path: `~/.local/share/sharebox`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the artifact and counter stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base path for all persisted state.
    pub base_path: PathBuf,

    /// Read-only mode - rejects uploads and skips directory creation.
    #[serde(default)]
    pub read_only: bool,

    /// How many generated codes to try before giving up on an upload.
    #[serde(default = "default_max_code_attempts")]
    pub max_code_attempts: u32,

    /// Lowercase file extensions accepted for uploads. Empty accepts any.
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
}

fn default_max_code_attempts() -> u32 {
    32
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::with_base_path(default_base_path())
    }
}

fn default_base_path() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".local/share/sharebox"))
        .unwrap_or_else(|| PathBuf::from(".local/share/sharebox"))
}

impl StoreConfig {
    /// Create a config with a specific base path.
    pub fn with_base_path(path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: path.into(),
            read_only: false,
            max_code_attempts: default_max_code_attempts(),
            allowed_extensions: Vec::new(),
        }
    }

    /// Create a read-only config with a specific base path.
    pub fn read_only(path: impl Into<PathBuf>) -> Self {
        Self {
            read_only: true,
            ..Self::with_base_path(path)
        }
    }

    /// Builder: restrict uploads to these extensions.
    pub fn with_allowed_extensions(
        mut self,
        extensions: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        self.allowed_extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    /// Directory holding uploaded files (`<code>_<name>`).
    pub fn uploads_dir(&self) -> PathBuf {
        self.base_path.join("uploads")
    }

    /// Directory holding shared text (`<code>.txt`).
    pub fn texts_dir(&self) -> PathBuf {
        self.base_path.join("shared_texts")
    }

    /// Scratch directory for in-flight writes.
    pub fn staging_dir(&self) -> PathBuf {
        self.base_path.join("staging")
    }

    /// The visitor counter file.
    pub fn counter_path(&self) -> PathBuf {
        self.base_path.join("counter.txt")
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Whether an upload named `name` passes the extension allow-list.
    pub fn extension_allowed(&self, name: &str) -> bool {
        if self.allowed_extensions.is_empty() {
            return true;
        }
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                let ext = ext.to_ascii_lowercase();
                self.allowed_extensions.iter().any(|a| *a == ext)
            }
            _ => false,
        }
    }
}
