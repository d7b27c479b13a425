//! SyncEngine - the entry point for procsync clients.
//!
//! The engine owns the project registry and every collaborator:
//! - **Registry**: the in-memory project list, mirrored to `projects.json`
//!   when the engine was built from a [`StorageConfig`]
//! - **Status**: only reconciliation passes write `Project::status`; user
//!   actions (start/stop/restart) never touch it directly
//! - **Events**: every status change a pass applies is broadcast to
//!   [`SyncEngine::subscribe`] receivers
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use procsync_core::SyncEngine;
//!
//! let engine = SyncEngine::new()?;
//! let mut changes = engine.subscribe();
//! engine.reconcile_all().await;
//! ```

use async_trait::async_trait;
use procsync_supervisor_protocol::{StartConfig, StartOutcome};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

use crate::config::{load_engine_config_or_default, EngineConfig};
use crate::conflicts::ConflictResolver;
use crate::error::{Result, SyncError};
use crate::events::StatusEvents;
use crate::fs::{LocalFs, ProjectFs};
use crate::ports::PortDiscovery;
use crate::probe::{PortProbe, SystemPortProbe};
use crate::projects::{import_project, ProjectStore};
use crate::reconcile::StatusReconciler;
use crate::storage::StorageConfig;
use crate::supervisor::{ConnectionState, Pm2Cli, SupervisorClient, SupervisorGateway};
use crate::trigger::{SyncScope, SyncTarget};
use crate::types::{
    AutoResolveReport, PortConflict, PortDetectionResult, Project, StatusChange,
    StatusQueryResult,
};

/// The external systems an engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub supervisor: Arc<dyn SupervisorClient>,
    pub probe: Arc<dyn PortProbe>,
    pub fs: Arc<dyn ProjectFs>,
}

impl Collaborators {
    /// PM2 on `PATH` (or `config.pm2_bin`), real sockets, local disk.
    pub fn system(config: &EngineConfig) -> Self {
        Self {
            supervisor: Arc::new(Pm2Cli::new(config.pm2_bin.clone())),
            probe: Arc::new(SystemPortProbe),
            fs: Arc::new(LocalFs),
        }
    }
}

pub struct SyncEngine {
    config: EngineConfig,
    fs: Arc<dyn ProjectFs>,
    gateway: Arc<SupervisorGateway>,
    reconciler: StatusReconciler,
    discovery: PortDiscovery,
    resolver: ConflictResolver,
    registry: RwLock<Vec<Project>>,
    store: Option<ProjectStore>,
    events: StatusEvents,
}

impl SyncEngine {
    /// Engine over the default storage root and the system collaborators.
    pub fn new() -> Result<Self> {
        Self::with_storage(StorageConfig::default())
    }

    /// Loads `config.toml` and `projects.json` from `storage`; registry
    /// changes are written back there.
    pub fn with_storage(storage: StorageConfig) -> Result<Self> {
        let config = load_engine_config_or_default(&storage.config_file());
        let store = ProjectStore::new(&storage);
        let projects = store.load()?;
        let collaborators = Collaborators::system(&config);

        let mut engine = Self::from_parts(config, collaborators, projects);
        engine.store = Some(store);
        Ok(engine)
    }

    /// In-memory engine; nothing is persisted.
    pub fn from_parts(
        config: EngineConfig,
        collaborators: Collaborators,
        projects: Vec<Project>,
    ) -> Self {
        let Collaborators {
            supervisor,
            probe,
            fs,
        } = collaborators;
        let gateway = Arc::new(SupervisorGateway::new(supervisor, probe.clone(), &config));

        Self {
            reconciler: StatusReconciler::new(gateway.clone(), &config),
            discovery: PortDiscovery::new(fs.clone()),
            resolver: ConflictResolver::new(fs.clone(), probe, &config),
            registry: RwLock::new(projects),
            store: None,
            events: StatusEvents::new(),
            gateway,
            fs,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.gateway.connection_state()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.events.subscribe()
    }

    fn read_registry(&self) -> RwLockReadGuard<'_, Vec<Project>> {
        self.registry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, Vec<Project>> {
        self.registry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn persist(&self) -> Result<()> {
        let Some(store) = self.store.clone() else {
            return Ok(());
        };
        let snapshot = self.projects();
        tokio::task::spawn_blocking(move || store.save(&snapshot))
            .await
            .map_err(|err| SyncError::Io {
                context: "Project store writer panicked".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, err.to_string()),
            })?
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Projects API
    // ─────────────────────────────────────────────────────────────────────────────

    /// Snapshot of the registry in registration order.
    pub fn projects(&self) -> Vec<Project> {
        self.read_registry().clone()
    }

    pub fn project(&self, id: &str) -> Result<Project> {
        self.read_registry()
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| SyncError::ProjectNotFound(id.to_string()))
    }

    /// Builds a project from `path` and registers it.
    pub async fn import_project(&self, path: &Path) -> Result<Project> {
        let project = import_project(self.fs.as_ref(), path).await?;
        self.add_project(project.clone()).await?;
        Ok(project)
    }

    pub async fn add_project(&self, project: Project) -> Result<()> {
        {
            let mut registry = self.write_registry();
            if registry
                .iter()
                .any(|p| p.id == project.id || p.path == project.path)
            {
                return Err(SyncError::ProjectAlreadyRegistered(project.path));
            }
            registry.push(project);
        }
        self.persist().await
    }

    /// Sets (or clears) the port passed to the project as `PORT` on start.
    pub async fn set_declared_port(&self, id: &str, port: Option<u16>) -> Result<Project> {
        let updated = {
            let mut registry = self.write_registry();
            let project = registry
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| SyncError::ProjectNotFound(id.to_string()))?;
            project.port = port;
            project.clone()
        };
        self.persist().await?;
        Ok(updated)
    }

    /// Unregisters a project and deletes its supervisor record.
    ///
    /// An unreachable supervisor does not block removal; the orphaned record
    /// is logged.
    pub async fn remove_project(&self, id: &str) -> Result<Project> {
        let project = self.project(id)?;
        match self.gateway.delete(&project.process_key()).await {
            Ok(()) | Err(SyncError::ProcessNotFound(_)) => {}
            Err(err) => {
                tracing::warn!(
                    project_id = %id,
                    error = %err,
                    "Could not delete supervisor record for removed project"
                );
            }
        }

        self.write_registry().retain(|p| p.id != id);
        self.persist().await?;
        tracing::info!(project_id = %id, name = %project.name, "Removed project");
        Ok(project)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Process Control API
    // ─────────────────────────────────────────────────────────────────────────────

    fn start_config(&self, project: &Project) -> Result<StartConfig> {
        let script = project
            .run_script()
            .ok_or_else(|| SyncError::InvalidProjectPath {
                path: project.path.clone(),
                reason: "package.json has no scripts to run".to_string(),
            })?;

        let mut env = BTreeMap::new();
        if let Some(port) = project.port {
            env.insert("PORT".to_string(), port.to_string());
        }
        Ok(StartConfig {
            name: project.process_key(),
            cwd: project.path.clone(),
            script: project.package_manager.binary().to_string(),
            args: project.package_manager.run_args(script),
            env,
        })
    }

    /// Starts the project under its process key. The stored status is left
    /// for the next reconciliation pass.
    pub async fn start_project(&self, id: &str) -> Result<StartOutcome> {
        let project = self.project(id)?;
        let config = self.start_config(&project)?;
        self.gateway.start(&config).await
    }

    pub async fn stop_project(&self, id: &str) -> Result<()> {
        let project = self.project(id)?;
        self.gateway.stop(&project.process_key()).await
    }

    /// Restarts the project, starting it when the supervisor has no record.
    pub async fn restart_project(&self, id: &str) -> Result<()> {
        let project = self.project(id)?;
        match self.gateway.restart(&project.process_key()).await {
            Err(SyncError::ProcessNotFound(_)) => {
                tracing::debug!(project_id = %id, "No process to restart; starting fresh");
                let config = self.start_config(&project)?;
                self.gateway.start(&config).await.map(|_| ())
            }
            other => other,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Status API
    // ─────────────────────────────────────────────────────────────────────────────

    pub async fn query_project_status(&self, project: &Project) -> StatusQueryResult {
        self.reconciler.query_one(project).await
    }

    pub async fn query_multiple_project_status(
        &self,
        projects: &[Project],
    ) -> Vec<StatusQueryResult> {
        self.reconciler.query_many(projects).await
    }

    pub async fn query_multiple_project_status_optimized(
        &self,
        projects: &[Project],
    ) -> Vec<StatusQueryResult> {
        self.reconciler.query_many_optimized(projects).await
    }

    /// Queries every registered project, applies the results and broadcasts
    /// the changes.
    pub async fn reconcile_all(&self) -> Vec<StatusChange> {
        let snapshot = self.projects();
        let results = self.reconciler.query_many_optimized(&snapshot).await;
        self.apply_results(&results).await
    }

    pub async fn reconcile_project(&self, id: &str) -> Result<Option<StatusChange>> {
        let project = self.project(id)?;
        let result = self.reconciler.query_one(&project).await;
        Ok(self.apply_results(&[result]).await.into_iter().next())
    }

    async fn apply_results(&self, results: &[StatusQueryResult]) -> Vec<StatusChange> {
        // Diff and emit without yielding so a pass is applied atomically.
        let changes = {
            let mut registry = self.write_registry();
            StatusReconciler::apply(&mut registry, results)
        };
        for change in &changes {
            self.events.emit(change.clone());
        }

        if results.iter().any(|r| r.success) {
            if let Err(err) = self.persist().await {
                tracing::warn!(error = %err, "Failed to persist reconciled projects");
            }
        }
        changes
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Ports API
    // ─────────────────────────────────────────────────────────────────────────────

    pub async fn detect_project_ports(&self, path: &Path) -> PortDetectionResult {
        self.discovery.detect(path).await
    }

    pub async fn detect_port_conflicts(&self, projects: &[Project]) -> Vec<PortConflict> {
        self.resolver.find_conflicts(projects).await
    }

    /// Moves conflicting projects to free ports. Declared ports that moved
    /// are updated in the registry so the next start passes the new `PORT`.
    pub async fn auto_resolve_port_conflicts(
        &self,
        conflicts: &[PortConflict],
    ) -> AutoResolveReport {
        let report = self.resolver.auto_resolve(conflicts).await;

        let mut updated = 0;
        {
            let mut registry = self.write_registry();
            for moved in report.resolved.iter().filter(|r| r.declared) {
                if let Some(project) = registry.iter_mut().find(|p| p.id == moved.project_id) {
                    project.port = Some(moved.to);
                    updated += 1;
                }
            }
        }
        if updated > 0 {
            if let Err(err) = self.persist().await {
                tracing::warn!(error = %err, "Failed to persist reassigned ports");
            }
        }
        report
    }
}

#[async_trait]
impl SyncTarget for SyncEngine {
    async fn sync_scope(&self, scope: &SyncScope) {
        match scope {
            SyncScope::All => {
                self.reconcile_all().await;
            }
            SyncScope::Project(id) => {
                if let Err(err) = self.reconcile_project(id).await {
                    tracing::warn!(project_id = %id, error = %err, "Project sync failed");
                }
            }
        }
    }
}
