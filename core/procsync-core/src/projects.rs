//! Project import and the persisted project list.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};
use crate::fs::{is_not_found, write_atomic, ProjectFs};
use crate::storage::StorageConfig;
use crate::types::{PackageManager, Project, ProjectStatus};

const STORE_VERSION: u32 = 1;

/// Builds a project from a directory containing a `package.json`.
///
/// The name comes from the manifest, falling back to the directory name.
/// The package manager is the first one whose lockfile is present.
pub async fn import_project(fs: &dyn ProjectFs, path: &Path) -> Result<Project> {
    if !path.is_absolute() {
        return Err(SyncError::InvalidProjectPath {
            path: path.display().to_string(),
            reason: "path must be absolute".to_string(),
        });
    }

    let manifest_path = path.join("package.json");
    let content = match fs.read_file(&manifest_path).await {
        Ok(content) => content,
        Err(err) if is_not_found(&err) => {
            return Err(SyncError::InvalidProjectPath {
                path: path.display().to_string(),
                reason: "no package.json".to_string(),
            })
        }
        Err(err) => return Err(err),
    };
    let manifest: Value = serde_json::from_str(&content).map_err(|source| SyncError::Json {
        context: format!("Failed to parse {}", manifest_path.display()),
        source,
    })?;

    let name = manifest
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .or_else(|| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
        })
        .ok_or_else(|| SyncError::InvalidProjectPath {
            path: path.display().to_string(),
            reason: "cannot determine project name".to_string(),
        })?;

    let mut scripts: Vec<String> = manifest
        .get("scripts")
        .and_then(Value::as_object)
        .map(|scripts| scripts.keys().cloned().collect())
        .unwrap_or_default();
    scripts.sort();

    let mut package_manager = PackageManager::default();
    for (lockfile, manager) in PackageManager::LOCKFILES {
        if fs.exists(&path.join(lockfile)).await {
            package_manager = *manager;
            break;
        }
    }

    let project = Project {
        id: ulid::Ulid::new().to_string(),
        name,
        path: path.display().to_string(),
        port: None,
        package_manager,
        status: ProjectStatus::Stopped,
        scripts,
        last_synced_at: None,
    };
    tracing::info!(
        project_id = %project.id,
        name = %project.name,
        package_manager = %project.package_manager,
        "Imported project"
    );
    Ok(project)
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    projects: Vec<Project>,
}

/// `projects.json` under the storage root.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    path: PathBuf,
}

impl ProjectStore {
    pub fn new(storage: &StorageConfig) -> Self {
        Self {
            path: storage.projects_file(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file means no projects. A file written by a newer version is
    /// refused rather than misread.
    pub fn load(&self) -> Result<Vec<Project>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs_err::read_to_string(&self.path).map_err(|source| SyncError::Io {
            context: "Failed to read project store".to_string(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let file: StoreFile = serde_json::from_str(&content).map_err(|source| SyncError::Json {
            context: format!("Failed to parse {}", self.path.display()),
            source,
        })?;
        if file.version > STORE_VERSION {
            return Err(SyncError::ConfigMalformed {
                path: self.path.clone(),
                details: format!(
                    "store version {} is newer than supported version {}",
                    file.version, STORE_VERSION
                ),
            });
        }
        Ok(file.projects)
    }

    /// Saves atomically through a temp file in the same directory.
    pub fn save(&self, projects: &[Project]) -> Result<()> {
        let file = StoreFile {
            version: STORE_VERSION,
            projects: projects.to_vec(),
        };
        let content = serde_json::to_string_pretty(&file).map_err(|source| SyncError::Json {
            context: "Failed to serialize project store".to_string(),
            source,
        })?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs_err::create_dir_all(dir).map_err(|source| SyncError::Io {
            context: "Failed to create store directory".to_string(),
            source,
        })?;
        write_atomic(&self.path, &content)
    }
}
