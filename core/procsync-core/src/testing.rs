//! In-memory collaborators for tests.
//!
//! Available to this crate's unit tests and, with the `test-helpers`
//! feature, to integration tests.

use async_trait::async_trait;
use procsync_supervisor_protocol::{ProcessRecord, StartConfig, StartOutcome};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{Result, SyncError};
use crate::fs::{ProjectFs, IGNORED_DIRECTORIES};
use crate::probe::{PortAvailability, PortOccupant, PortProbe};
use crate::status::is_live;
use crate::types::{PackageManager, Project, ProjectStatus};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A project fixture with no declared port and a `dev` script.
pub fn project(id: &str, name: &str, path: &str) -> Project {
    Project {
        id: id.to_string(),
        name: name.to_string(),
        path: path.to_string(),
        port: None,
        package_manager: PackageManager::Npm,
        status: ProjectStatus::Stopped,
        scripts: vec!["dev".to_string()],
        last_synced_at: None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Supervisor
// ═══════════════════════════════════════════════════════════════════════════════

/// Supervisor process table kept in memory.
///
/// Like PM2, it happily registers a second record under an existing name;
/// deduplication is the gateway's job.
pub struct FakeSupervisor {
    records: Mutex<Vec<ProcessRecord>>,
    calls: Mutex<Vec<String>>,
    reachable: AtomicBool,
    list_fails: AtomicBool,
    slow: Mutex<HashSet<String>>,
    next_pid: AtomicU32,
}

impl Default for FakeSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSupervisor {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            reachable: AtomicBool::new(true),
            list_fails: AtomicBool::new(false),
            slow: Mutex::new(HashSet::new()),
            next_pid: AtomicU32::new(1000),
        }
    }

    /// Registers a record directly, bypassing the call log.
    pub fn insert(&self, name: &str, status: &str) {
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let mut records = lock(&self.records);
        let process_id = records.len() as u32;
        records.push(ProcessRecord {
            name: name.to_string(),
            pid: is_live(Some(status)).then_some(pid),
            process_id: Some(process_id),
            status: Some(status.to_string()),
            cwd: None,
        });
    }

    /// Changes the status of every record under `name`.
    pub fn set_status(&self, name: &str, status: &str) {
        for record in lock(&self.records).iter_mut().filter(|r| r.name == name) {
            record.status = Some(status.to_string());
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_list_fails(&self, fails: bool) {
        self.list_fails.store(fails, Ordering::SeqCst);
    }

    /// Makes `describe(name)` hang until the caller's timeout fires.
    pub fn make_slow(&self, name: &str) {
        lock(&self.slow).insert(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.split(' ').next() == Some(operation))
            .count()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    pub fn record_count(&self, name: &str) -> usize {
        lock(&self.records).iter().filter(|r| r.name == name).count()
    }

    pub fn live_count(&self, name: &str) -> usize {
        lock(&self.records)
            .iter()
            .filter(|r| r.name == name && is_live(r.status.as_deref()))
            .count()
    }

    fn record_call(&self, call: String) -> Result<()> {
        lock(&self.calls).push(call);
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::SupervisorUnavailable(
                "connect ECONNREFUSED".to_string(),
            ))
        }
    }

    fn update<F>(&self, name: &str, mut apply: F) -> Result<()>
    where
        F: FnMut(&mut ProcessRecord),
    {
        let mut records = lock(&self.records);
        let mut found = false;
        for record in records.iter_mut().filter(|r| r.name == name) {
            apply(record);
            found = true;
        }
        if found {
            Ok(())
        } else {
            Err(SyncError::ProcessNotFound(name.to_string()))
        }
    }
}

#[async_trait]
impl crate::supervisor::SupervisorClient for FakeSupervisor {
    async fn connect(&self) -> Result<()> {
        self.record_call("connect".to_string())
    }

    async fn start(&self, config: &StartConfig) -> Result<StartOutcome> {
        self.record_call(format!("start {}", config.name))?;
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let mut records = lock(&self.records);
        let process_id = records.len() as u32;
        records.push(ProcessRecord {
            name: config.name.clone(),
            pid: Some(pid),
            process_id: Some(process_id),
            status: Some("online".to_string()),
            cwd: Some(config.cwd.clone()),
        });
        Ok(StartOutcome {
            success: true,
            pid: Some(pid),
            process_id: Some(process_id),
        })
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.record_call(format!("stop {}", name))?;
        self.update(name, |record| {
            record.status = Some("stopped".to_string());
            record.pid = None;
        })
    }

    async fn restart(&self, name: &str) -> Result<()> {
        self.record_call(format!("restart {}", name))?;
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.update(name, |record| {
            record.status = Some("online".to_string());
            record.pid = Some(pid);
        })
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.record_call(format!("delete {}", name))?;
        let mut records = lock(&self.records);
        let before = records.len();
        records.retain(|r| r.name != name);
        if records.len() == before {
            return Err(SyncError::ProcessNotFound(name.to_string()));
        }
        Ok(())
    }

    async fn describe(&self, name: &str) -> Result<Vec<ProcessRecord>> {
        self.record_call(format!("describe {}", name))?;
        let slow = lock(&self.slow).contains(name);
        if slow {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(lock(&self.records)
            .iter()
            .filter(|r| r.name == name)
            .cloned()
            .collect())
    }

    async fn list(&self) -> Result<Vec<ProcessRecord>> {
        self.record_call("list".to_string())?;
        if self.list_fails.load(Ordering::SeqCst) {
            return Err(SyncError::CommandFailed {
                command: "pm2 jlist".to_string(),
                details: "list disabled".to_string(),
            });
        }
        Ok(lock(&self.records).clone())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Port Probe
// ═══════════════════════════════════════════════════════════════════════════════

/// Port table where occupied ports are listed explicitly; freeing always
/// succeeds.
#[derive(Default)]
pub struct FakePortProbe {
    occupied: Mutex<BTreeSet<u16>>,
    checked: Mutex<Vec<u16>>,
    freed: Mutex<Vec<u16>>,
}

impl FakePortProbe {
    pub fn all_free() -> Self {
        Self::default()
    }

    pub fn occupied<I: IntoIterator<Item = u16>>(ports: I) -> Self {
        let probe = Self::default();
        lock(&probe.occupied).extend(ports);
        probe
    }

    pub fn occupy(&self, port: u16) {
        lock(&self.occupied).insert(port);
    }

    pub fn checked(&self) -> Vec<u16> {
        lock(&self.checked).clone()
    }

    pub fn freed(&self) -> Vec<u16> {
        lock(&self.freed).clone()
    }
}

#[async_trait]
impl PortProbe for FakePortProbe {
    async fn check_port_available(&self, port: u16) -> PortAvailability {
        lock(&self.checked).push(port);
        if lock(&self.occupied).contains(&port) {
            PortAvailability {
                available: false,
                occupied_by: Some(PortOccupant {
                    pid: 4242,
                    name: Some("node".to_string()),
                }),
            }
        } else {
            PortAvailability {
                available: true,
                occupied_by: None,
            }
        }
    }

    async fn free_port(&self, port: u16) -> bool {
        lock(&self.freed).push(port);
        lock(&self.occupied).remove(&port);
        true
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Filesystem
// ═══════════════════════════════════════════════════════════════════════════════

/// Flat map of absolute paths to file contents.
#[derive(Default)]
pub struct MemoryFs {
    files: Mutex<BTreeMap<PathBuf, String>>,
    fail_writes: AtomicBool,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<PathBuf>, content: &str) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&self, path: impl Into<PathBuf>, content: &str) {
        lock(&self.files).insert(path.into(), content.to_string());
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<String> {
        lock(&self.files).get(path.as_ref()).cloned()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

fn relative_depth(root: &Path, path: &Path) -> Option<Vec<String>> {
    let relative = path.strip_prefix(root).ok()?;
    Some(
        relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(name) => name.to_str().map(str::to_string),
                _ => None,
            })
            .collect(),
    )
}

#[async_trait]
impl ProjectFs for MemoryFs {
    async fn read_file(&self, path: &Path) -> Result<String> {
        self.get(path).ok_or_else(|| SyncError::Io {
            context: format!("Failed to read {}", path.display()),
            source: std::io::Error::new(ErrorKind::NotFound, "no such file"),
        })
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::Io {
                context: format!("Failed to write {}", path.display()),
                source: std::io::Error::new(ErrorKind::PermissionDenied, "read-only"),
            });
        }
        self.insert(path, content);
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        lock(&self.files)
            .keys()
            .any(|file| file == path || file.starts_with(path))
    }

    async fn list_files(
        &self,
        root: &Path,
        max_depth: usize,
        extensions: &[&str],
    ) -> Vec<PathBuf> {
        lock(&self.files)
            .keys()
            .filter(|file| {
                let Some(parts) = relative_depth(root, file) else {
                    return false;
                };
                !parts.is_empty()
                    && parts.len() <= max_depth
                    && !parts[..parts.len() - 1]
                        .iter()
                        .any(|dir| IGNORED_DIRECTORIES.contains(&dir.as_str()))
            })
            .filter(|file| {
                file.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| extensions.contains(&ext))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}
