//! sharebox: share files and text by 8-digit code.
//!
//! The binary wires [`shareconf`] configuration, [`sharestore`] storage and
//! the HTTP handlers in [`web`] together. The pieces are exposed as a library
//! so integration tests can drive the router directly.

pub mod session;
pub mod telemetry;
pub mod web;

use anyhow::{Context, Result};
use shareconf::ShareConfig;
use sharestore::{CounterStore, FileStore, StoreConfig};
use std::sync::Arc;
use std::time::Duration;

/// Store settings derived from the loaded configuration.
pub fn store_config(config: &ShareConfig) -> StoreConfig {
    let mut store = StoreConfig::with_base_path(&config.paths.data_dir)
        .with_allowed_extensions(&config.limits.allowed_extensions);
    store.max_code_attempts = config.limits.max_code_attempts;
    store.read_only = config.paths.read_only;
    store
}

/// Open the stores under the configured data directory.
pub fn open_state(config: &ShareConfig) -> Result<web::WebState> {
    let store_config = store_config(config);

    let store = FileStore::new(store_config.clone()).with_context(|| {
        format!(
            "Failed to open artifact store at {}",
            store_config.base_path().display()
        )
    })?;
    tracing::info!(
        "artifact store at {} ({} artifacts)",
        store_config.base_path().display(),
        store.len()
    );

    let counter = CounterStore::new(&store_config);
    let visitors = counter
        .current_value()
        .with_context(|| format!("Failed to read {}", counter.path().display()))?;
    tracing::info!("visitor counter at {}", visitors);
    if store_config.read_only {
        tracing::warn!("read-only mode: uploads are disabled and nothing is written");
    }

    let idle_timeout = Duration::from_secs(config.limits.session_idle_secs);
    Ok(web::WebState::new(Arc::new(store), Arc::new(counter))
        .with_max_upload_bytes(config.limits.max_upload_bytes)
        .with_session_idle_timeout(idle_timeout))
}
