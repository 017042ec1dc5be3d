//! Settings file loading.
//!
//! Mirrors `DBPipelineController.load_settings`'s plain `json.load` of a
//! single settings file, but goes through the `config` crate so the same
//! typed [`Settings`] struct could later be assembled from multiple
//! layered sources (file + environment overrides) without changing any
//! call site.

use std::collections::HashMap;
use std::path::Path;

use amsync_core::{Environment, PipelineError};
use amsync_upstream::auth::AuthSettingsTable;
use config::Config;
use serde::Deserialize;

/// Feed names the Schema Provisioner seeds a `feed_<name>` marker
/// document for. Recorded so a future incremental-sync system has
/// somewhere to resume from; never drained by this pipeline.
pub const FEED_NAMES: &[&str] = &["assets", "assetrelaties"];

/// Per-environment ArangoDB connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DbSettings {
    pub base_url: String,
    pub database: String,
    #[serde(default, rename = "user")]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub databases: HashMap<Environment, DbSettings>,
    pub authentication: AuthSettingsTable,
}

/// Load settings from a single JSON file.
pub fn load_settings(path: impl AsRef<Path>) -> Result<Settings, PipelineError> {
    let path = path.as_ref();
    let config = Config::builder()
        .add_source(config::File::from(path))
        .build()
        .map_err(|e| PipelineError::Config(format!("failed to load settings from {}: {e}", path.display())))?;
    config
        .try_deserialize()
        .map_err(|e| PipelineError::Config(format!("malformed settings file {}: {e}", path.display())))
}
