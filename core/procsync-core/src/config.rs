//! Engine tuning loaded from `config.toml`.
//!
//! Every field has a default; a missing file yields the defaults and a
//! malformed one is reported so the caller can fall back to them.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, SyncError};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Above this many projects, status queries use one `list` call.
    pub batch_threshold: usize,
    /// Bound on any single supervisor call.
    pub query_timeout_ms: u64,
    /// Wait after a start/restart before reconciling.
    pub start_settle_ms: u64,
    /// Wait after a stop before reconciling.
    pub stop_settle_ms: u64,
    /// Wait after freeing a declared port before starting.
    pub port_settle_ms: u64,
    /// How many ports above a conflicting one are probed.
    pub probe_window: u16,
    pub pm2_bin: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_threshold: 5,
            query_timeout_ms: 5_000,
            start_settle_ms: 1_500,
            stop_settle_ms: 1_000,
            port_settle_ms: 1_000,
            probe_window: 100,
            pm2_bin: "pm2".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn start_settle(&self) -> Duration {
        Duration::from_millis(self.start_settle_ms)
    }

    pub fn stop_settle(&self) -> Duration {
        Duration::from_millis(self.stop_settle_ms)
    }

    pub fn port_settle(&self) -> Duration {
        Duration::from_millis(self.port_settle_ms)
    }
}

pub fn load_engine_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        return Ok(EngineConfig::default());
    }

    let content = fs_err::read_to_string(path).map_err(|source| SyncError::Io {
        context: format!("Failed to read config {}", path.display()),
        source,
    })?;
    toml::from_str::<EngineConfig>(&content).map_err(|err| SyncError::ConfigMalformed {
        path: path.to_path_buf(),
        details: err.to_string(),
    })
}

/// Loads the config, logging and falling back to defaults on any failure.
pub fn load_engine_config_or_default(path: &Path) -> EngineConfig {
    match load_engine_config(path) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to load engine config; using defaults");
            EngineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let config =
            load_engine_config(&temp_dir.path().join("missing.toml")).expect("load config");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.batch_threshold, 5);
        assert_eq!(config.start_settle(), Duration::from_millis(1_500));
        assert_eq!(config.stop_settle(), Duration::from_millis(1_000));
    }

    #[test]
    fn parses_partial_overrides() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        fs_err::write(
            &path,
            r#"
batch_threshold = 10
probe_window = 20
pm2_bin = "/opt/pm2/bin/pm2"
"#,
        )
        .expect("write config");

        let config = load_engine_config(&path).expect("load config");
        assert_eq!(config.batch_threshold, 10);
        assert_eq!(config.probe_window, 20);
        assert_eq!(config.pm2_bin, "/opt/pm2/bin/pm2");
        assert_eq!(config.query_timeout_ms, 5_000);
    }

    #[test]
    fn malformed_file_is_reported() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        fs_err::write(&path, "batch_threshold = \"many\"").expect("write config");

        let err = load_engine_config(&path).expect_err("malformed");
        assert!(matches!(err, SyncError::ConfigMalformed { .. }));
        assert_eq!(load_engine_config_or_default(&path), EngineConfig::default());
    }
}
