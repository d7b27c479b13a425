//! Storage configuration and path management for procsync.
//!
//! Every path procsync reads or writes is derived from a single root so tests
//! can point the whole crate at a temp directory.
//!
//! - Production: `StorageConfig::default()` → `$PROCSYNC_HOME` or `~/.procsync/`
//! - Tests: `StorageConfig::with_root(temp_dir)`

use std::env;
use std::path::{Path, PathBuf};

pub const HOME_ENV: &str = "PROCSYNC_HOME";
const DIR_NAME: &str = ".procsync";

#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        if let Ok(root) = env::var(HOME_ENV) {
            if !root.trim().is_empty() {
                return Self {
                    root: PathBuf::from(root),
                };
            }
        }
        let root = dirs::home_dir()
            .map(|home| home.join(DIR_NAME))
            .unwrap_or_else(|| env::temp_dir().join("procsync"));
        Self { root }
    }
}

impl StorageConfig {
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to projects.json (the persisted project list).
    pub fn projects_file(&self) -> PathBuf {
        self.root.join("projects.json")
    }

    /// Path to config.toml (engine tuning).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs_err::create_dir_all(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_root_sets_custom_path() {
        let storage = StorageConfig::with_root(PathBuf::from("/tmp/procsync-test"));
        assert_eq!(storage.root(), Path::new("/tmp/procsync-test"));
    }

    #[test]
    fn file_paths_live_under_root() {
        let storage = StorageConfig::with_root(PathBuf::from("/tmp/ps"));
        assert_eq!(storage.projects_file(), PathBuf::from("/tmp/ps/projects.json"));
        assert_eq!(storage.config_file(), PathBuf::from("/tmp/ps/config.toml"));
    }

    #[test]
    fn ensure_dirs_creates_root() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let storage = StorageConfig::with_root(temp_dir.path().join("nested").join("root"));
        storage.ensure_dirs().expect("create dirs");
        assert!(storage.root().is_dir());
    }
}
