//! # procsync-core
//!
//! Keeps a registry of local dev-server projects consistent with the process
//! table of an external supervisor (PM2), and works out which port each
//! project binds to from its files.
//!
//! ## Design Principles
//!
//! - **Async at the edges**: supervisor calls, file reads and port probes are
//!   tokio I/O behind small traits; the diff/apply step is synchronous.
//! - **Reconciler owns status**: `Project::status` changes only when a
//!   reconciliation pass observes the supervisor.
//! - **Graceful degradation**: unreachable supervisors, unreadable files and
//!   malformed configs are logged and skipped, never fatal to a pass.
//! - **Stable identity**: a project's process name is a pure function of its
//!   name and path.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use procsync_core::{SyncEngine, SyncCoordinator, SyncTrigger};
//!
//! let engine = std::sync::Arc::new(SyncEngine::new()?);
//! let coordinator = SyncCoordinator::new(engine.clone(), engine.config());
//! coordinator.trigger(SyncTrigger::ListLoaded);
//! ```

pub mod config;
pub mod conflicts;
pub mod engine;
pub mod error;
pub mod events;
pub mod fs;
pub mod identity;
pub mod ports;
pub mod probe;
pub mod projects;
pub mod reconcile;
pub mod status;
pub mod storage;
pub mod supervisor;
pub mod trigger;
pub mod types;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

// Re-export commonly used items at crate root
pub use config::{load_engine_config, load_engine_config_or_default, EngineConfig};
pub use conflicts::{group_by_port, ConflictResolver};
pub use engine::{Collaborators, SyncEngine};
pub use error::{Result, SyncError};
pub use events::StatusEvents;
pub use fs::{LocalFs, ProjectFs};
pub use identity::process_key;
pub use ports::PortDiscovery;
pub use probe::{PortAvailability, PortOccupant, PortProbe, SystemPortProbe};
pub use projects::{import_project, ProjectStore};
pub use reconcile::{QueryStrategy, StatusReconciler};
pub use status::normalize;
pub use storage::StorageConfig;
pub use supervisor::{ConnectionState, Pm2Cli, SupervisorClient, SupervisorGateway};
pub use trigger::{
    ProjectAction, SyncCoordinator, SyncScope, SyncState, SyncTarget, SyncTrigger,
    TriggerOutcome,
};
pub use types::*;

pub use procsync_supervisor_protocol::{ProcessRecord, StartConfig, StartOutcome};
