//! Filesystem collaborator used by port discovery and conflict resolution.
//!
//! Implementors should:
//! - Return `SyncError::Io` with a `NotFound` source for missing files so
//!   callers can tell "absent" from "unreadable"
//! - Never block the runtime; directory walks belong on a blocking thread

use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Result, SyncError};

/// Directories never descended into when listing source files.
/// These hold generated or vendored code, not the project's own entry points.
pub const IGNORED_DIRECTORIES: &[&str] = &[
    "node_modules",
    "vendor",
    ".git",
    "__pycache__",
    "target",
    "dist",
    "build",
    ".next",
    ".nuxt",
    ".output",
    ".svelte-kit",
    "venv",
    ".venv",
    ".turbo",
    ".cache",
    "coverage",
];

#[async_trait]
pub trait ProjectFs: Send + Sync {
    async fn read_file(&self, path: &Path) -> Result<String>;

    async fn write_file(&self, path: &Path, content: &str) -> Result<()>;

    async fn exists(&self, path: &Path) -> bool;

    /// Files under `root` no deeper than `max_depth` whose extension is in
    /// `extensions`, sorted by path.
    async fn list_files(&self, root: &Path, max_depth: usize, extensions: &[&str])
        -> Vec<PathBuf>;
}

/// Whether an error from [`ProjectFs::read_file`] just means "no such file".
pub fn is_not_found(err: &SyncError) -> bool {
    matches!(err, SyncError::Io { source, .. } if source.kind() == ErrorKind::NotFound)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

#[async_trait]
impl ProjectFs for LocalFs {
    async fn read_file(&self, path: &Path) -> Result<String> {
        fs_err::tokio::read_to_string(path)
            .await
            .map_err(|source| SyncError::Io {
                context: format!("Failed to read {}", path.display()),
                source,
            })
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        let path = path.to_path_buf();
        let content = content.to_string();
        tokio::task::spawn_blocking(move || write_atomic(&path, &content))
            .await
            .map_err(|err| SyncError::Io {
                context: "File writer panicked".to_string(),
                source: std::io::Error::new(ErrorKind::Other, err.to_string()),
            })?
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn list_files(
        &self,
        root: &Path,
        max_depth: usize,
        extensions: &[&str],
    ) -> Vec<PathBuf> {
        let root = root.to_path_buf();
        let extensions: Vec<String> = extensions.iter().map(|e| e.to_string()).collect();

        let walk = tokio::task::spawn_blocking(move || walk_files(&root, max_depth, &extensions));
        match walk.await {
            Ok(files) => files,
            Err(err) => {
                tracing::warn!(error = %err, "Source file walk aborted");
                Vec::new()
            }
        }
    }
}

/// Writes `content` to a temp file beside `path`, then renames it over `path`.
///
/// The temp file gets a unique name, so concurrent writes to sibling files
/// never share one.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|source| SyncError::Io {
        context: format!("Failed to create temp file in {}", dir.display()),
        source,
    })?;
    tmp.write_all(content.as_bytes())
        .map_err(|source| SyncError::Io {
            context: "Failed to write temp file".to_string(),
            source,
        })?;
    tmp.flush().map_err(|source| SyncError::Io {
        context: "Failed to flush temp file".to_string(),
        source,
    })?;
    tmp.persist(path).map_err(|err| SyncError::Io {
        context: format!("Failed to persist {}", path.display()),
        source: err.error,
    })?;
    Ok(())
}

fn walk_files(root: &Path, max_depth: usize, extensions: &[String]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !entry
                    .file_name()
                    .to_str()
                    .map(|name| IGNORED_DIRECTORIES.contains(&name))
                    .unwrap_or(false)
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| extensions.iter().any(|e| e == ext))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}
