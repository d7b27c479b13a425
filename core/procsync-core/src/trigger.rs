//! When reconciliation runs.
//!
//! A [`SyncCoordinator`] belongs to one view. It turns triggers into
//! scheduled passes and drops automatic triggers whose scope already has a
//! pass claimed. A scope is claimed when the trigger is accepted, so a pass
//! still waiting out its settle delay blocks duplicates too. Manual syncs
//! always run.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectAction {
    Start,
    Stop,
    Restart,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTrigger {
    /// A start/stop/restart finished for this project.
    ActionCompleted {
        action: ProjectAction,
        project_id: String,
    },
    /// The project list was (re)loaded.
    ListLoaded,
    /// The user asked for a sync.
    Manual,
    /// A project's detail view gained focus.
    Focus(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SyncScope {
    All,
    Project(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing,
}

#[derive(Debug)]
pub enum TriggerOutcome {
    Scheduled(JoinHandle<()>),
    Dropped,
}

impl TriggerOutcome {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, TriggerOutcome::Scheduled(_))
    }

    /// Waits for the scheduled pass, if any.
    pub async fn finished(self) {
        if let TriggerOutcome::Scheduled(handle) = self {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "Sync pass aborted");
            }
        }
    }
}

/// Whatever a pass reconciles. Implemented by the sync engine.
#[async_trait]
pub trait SyncTarget: Send + Sync {
    async fn sync_scope(&self, scope: &SyncScope);
}

type Claims = Arc<Mutex<HashMap<SyncScope, usize>>>;

fn lock(claims: &Claims) -> MutexGuard<'_, HashMap<SyncScope, usize>> {
    claims.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Releases a scope when the pass finishes or its task is dropped.
struct ScopeClaim {
    claims: Claims,
    scope: SyncScope,
}

impl Drop for ScopeClaim {
    fn drop(&mut self) {
        let mut claims = lock(&self.claims);
        if let Some(count) = claims.get_mut(&self.scope) {
            *count -= 1;
            if *count == 0 {
                claims.remove(&self.scope);
            }
        }
    }
}

pub struct SyncCoordinator {
    target: Arc<dyn SyncTarget>,
    claims: Claims,
    start_settle: Duration,
    stop_settle: Duration,
}

impl SyncCoordinator {
    pub fn new(target: Arc<dyn SyncTarget>, config: &EngineConfig) -> Self {
        Self {
            target,
            claims: Arc::new(Mutex::new(HashMap::new())),
            start_settle: config.start_settle(),
            stop_settle: config.stop_settle(),
        }
    }

    pub fn state(&self) -> SyncState {
        if lock(&self.claims).is_empty() {
            SyncState::Idle
        } else {
            SyncState::Syncing
        }
    }

    pub fn is_syncing(&self, scope: &SyncScope) -> bool {
        lock(&self.claims).contains_key(scope)
    }

    /// Must be called from within a tokio runtime.
    pub fn trigger(&self, trigger: SyncTrigger) -> TriggerOutcome {
        let (scope, delay, manual) = match trigger {
            SyncTrigger::ActionCompleted { action, project_id } => {
                let delay = match action {
                    ProjectAction::Start | ProjectAction::Restart => self.start_settle,
                    ProjectAction::Stop => self.stop_settle,
                };
                (SyncScope::Project(project_id), delay, false)
            }
            SyncTrigger::ListLoaded => (SyncScope::All, Duration::ZERO, false),
            SyncTrigger::Manual => (SyncScope::All, Duration::ZERO, true),
            SyncTrigger::Focus(project_id) => {
                (SyncScope::Project(project_id), Duration::ZERO, false)
            }
        };

        let claim = {
            let mut claims = lock(&self.claims);
            let count = claims.entry(scope.clone()).or_insert(0);
            if *count > 0 && !manual {
                tracing::debug!(scope = ?scope, "Sync already in flight; dropping trigger");
                return TriggerOutcome::Dropped;
            }
            *count += 1;
            ScopeClaim {
                claims: self.claims.clone(),
                scope: scope.clone(),
            }
        };

        let target = self.target.clone();
        TriggerOutcome::Scheduled(tokio::spawn(async move {
            let _claim = claim;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            tracing::debug!(scope = ?scope, "Running sync pass");
            target.sync_scope(&scope).await;
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[derive(Default)]
    struct RecordingTarget {
        passes: Mutex<Vec<(SyncScope, Instant)>>,
    }

    impl RecordingTarget {
        fn passes(&self) -> Vec<SyncScope> {
            self.passes
                .lock()
                .unwrap()
                .iter()
                .map(|(scope, _)| scope.clone())
                .collect()
        }

        fn first_at(&self) -> Instant {
            self.passes.lock().unwrap()[0].1
        }
    }

    #[async_trait]
    impl SyncTarget for RecordingTarget {
        async fn sync_scope(&self, scope: &SyncScope) {
            self.passes
                .lock()
                .unwrap()
                .push((scope.clone(), Instant::now()));
        }
    }

    fn coordinator() -> (Arc<RecordingTarget>, SyncCoordinator) {
        let target = Arc::new(RecordingTarget::default());
        let coordinator = SyncCoordinator::new(target.clone(), &EngineConfig::default());
        (target, coordinator)
    }

    fn started(id: &str) -> SyncTrigger {
        SyncTrigger::ActionCompleted {
            action: ProjectAction::Start,
            project_id: id.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_waits_for_settle_delay() {
        let (target, coordinator) = coordinator();
        let began = Instant::now();

        let outcome = coordinator.trigger(started("a"));
        tokio::time::sleep(Duration::from_millis(1_400)).await;
        assert!(target.passes().is_empty());
        assert_eq!(coordinator.state(), SyncState::Syncing);

        outcome.finished().await;
        assert_eq!(target.passes(), vec![SyncScope::Project("a".to_string())]);
        assert!(target.first_at() - began >= Duration::from_millis(1_500));
        assert_eq!(coordinator.state(), SyncState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_uses_shorter_delay() {
        let (target, coordinator) = coordinator();
        let began = Instant::now();

        coordinator
            .trigger(SyncTrigger::ActionCompleted {
                action: ProjectAction::Stop,
                project_id: "a".to_string(),
            })
            .finished()
            .await;

        let waited = target.first_at() - began;
        assert!(waited >= Duration::from_millis(1_000));
        assert!(waited < Duration::from_millis(1_500));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_automatic_trigger_is_dropped() {
        let (target, coordinator) = coordinator();

        let first = coordinator.trigger(started("a"));
        let second = coordinator.trigger(SyncTrigger::Focus("a".to_string()));
        assert!(first.is_scheduled());
        assert!(!second.is_scheduled());

        let other = coordinator.trigger(SyncTrigger::Focus("b".to_string()));
        assert!(other.is_scheduled());

        first.finished().await;
        other.finished().await;
        assert_eq!(target.passes().len(), 2);

        assert!(coordinator
            .trigger(SyncTrigger::Focus("a".to_string()))
            .is_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_sync_is_never_dropped() {
        let (target, coordinator) = coordinator();

        let loaded = coordinator.trigger(SyncTrigger::ListLoaded);
        let manual = coordinator.trigger(SyncTrigger::Manual);
        let again = coordinator.trigger(SyncTrigger::ListLoaded);

        assert!(loaded.is_scheduled());
        assert!(manual.is_scheduled());
        assert!(!again.is_scheduled());

        loaded.finished().await;
        manual.finished().await;
        assert_eq!(target.passes(), vec![SyncScope::All, SyncScope::All]);
        assert!(!coordinator.is_syncing(&SyncScope::All));
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_pass_releases_its_scope() {
        let (target, coordinator) = coordinator();

        let TriggerOutcome::Scheduled(handle) = coordinator.trigger(started("a")) else {
            panic!("expected scheduled pass");
        };
        handle.abort();
        let _ = handle.await;

        assert_eq!(coordinator.state(), SyncState::Idle);
        assert!(target.passes().is_empty());
    }
}
