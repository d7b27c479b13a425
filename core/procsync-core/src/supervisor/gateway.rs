//! Connection-aware wrapper around a [`SupervisorClient`].
//!
//! The gateway owns its connection state: it connects lazily on first use and
//! drops back to disconnected whenever a call times out or reports the
//! supervisor unreachable, so the next call reconnects.

use procsync_supervisor_protocol::{ProcessRecord, StartConfig, StartOutcome};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::SupervisorClient;
use crate::config::EngineConfig;
use crate::error::{Result, SyncError};
use crate::probe::PortProbe;
use crate::status::{is_live, normalize};
use crate::types::ProjectStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

pub struct SupervisorGateway {
    client: Arc<dyn SupervisorClient>,
    probe: Arc<dyn PortProbe>,
    connection: Mutex<ConnectionState>,
    call_timeout: Duration,
    port_settle: Duration,
}

impl SupervisorGateway {
    pub fn new(
        client: Arc<dyn SupervisorClient>,
        probe: Arc<dyn PortProbe>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            client,
            probe,
            connection: Mutex::new(ConnectionState::Disconnected),
            call_timeout: config.query_timeout(),
            port_settle: config.port_settle(),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self
            .connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_connection_state(&self, state: ConnectionState) {
        let mut guard = self
            .connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = state;
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.connection_state() == ConnectionState::Connected {
            return Ok(());
        }

        match tokio::time::timeout(self.call_timeout, self.client.connect()).await {
            Ok(Ok(())) => {
                tracing::debug!("Connected to process supervisor");
                self.set_connection_state(ConnectionState::Connected);
                Ok(())
            }
            Ok(Err(err)) => Err(match err {
                SyncError::SupervisorUnavailable(_) => err,
                other => SyncError::SupervisorUnavailable(other.to_string()),
            }),
            Err(_) => Err(SyncError::SupervisorUnavailable(format!(
                "connect timed out after {}ms",
                self.call_timeout.as_millis()
            ))),
        }
    }

    async fn call<T, F>(&self, operation: &'static str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.ensure_connected().await?;

        match tokio::time::timeout(self.call_timeout, future).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                if err.is_transient() {
                    self.set_connection_state(ConnectionState::Disconnected);
                }
                Err(err)
            }
            Err(_) => {
                self.set_connection_state(ConnectionState::Disconnected);
                Err(SyncError::SupervisorUnavailable(format!(
                    "{} timed out after {}ms",
                    operation,
                    self.call_timeout.as_millis()
                )))
            }
        }
    }

    /// Starts a fresh process under `config.name`.
    ///
    /// Any record already registered under the name is stopped (if live) and
    /// deleted first, so repeated starts never leave two processes behind.
    /// A declared `PORT` is checked and, if busy, freed before starting.
    pub async fn start(&self, config: &StartConfig) -> Result<StartOutcome> {
        config.validate()?;
        let name = config.name.as_str();

        let existing = self.call("describe", self.client.describe(name)).await?;
        if !existing.is_empty() {
            let live = existing
                .iter()
                .any(|record| is_live(record.status.as_deref()));
            if live {
                tracing::info!(name, "Stopping live process before restart");
                self.ignore_missing(self.call("stop", self.client.stop(name)).await)?;
            }
            tracing::debug!(name, records = existing.len(), "Deleting stale records");
            self.ignore_missing(self.call("delete", self.client.delete(name)).await)?;
        }

        if let Some(port) = config.env.get("PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.preflight_port(port).await;
        }

        let outcome = self.call("start", self.client.start(config)).await?;
        if !outcome.success {
            return Err(SyncError::CommandFailed {
                command: format!("start {}", name),
                details: "supervisor did not register the process".to_string(),
            });
        }
        tracing::info!(name, pid = ?outcome.pid, "Process started");
        Ok(outcome)
    }

    /// Best-effort: a port that cannot be freed is logged, not fatal.
    async fn preflight_port(&self, port: u16) {
        let availability = self.probe.check_port_available(port).await;
        if availability.available {
            return;
        }

        tracing::warn!(
            port,
            occupant = ?availability.occupied_by,
            "Declared port is occupied; attempting to free it"
        );
        if !self.probe.free_port(port).await {
            tracing::warn!(port, "Could not free declared port; starting anyway");
        }
        tokio::time::sleep(self.port_settle).await;
    }

    fn ignore_missing(&self, result: Result<()>) -> Result<()> {
        match result {
            Err(SyncError::ProcessNotFound(_)) => Ok(()),
            other => other,
        }
    }

    pub async fn stop(&self, key: &str) -> Result<()> {
        self.call("stop", self.client.stop(key)).await
    }

    pub async fn restart(&self, key: &str) -> Result<()> {
        self.call("restart", self.client.restart(key)).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.call("delete", self.client.delete(key)).await
    }

    /// The record under `key`, or `None` when the supervisor has none.
    pub async fn describe(&self, key: &str) -> Result<Option<ProcessRecord>> {
        let records = self.call("describe", self.client.describe(key)).await?;
        Ok(pick_record(records))
    }

    pub async fn list(&self) -> Result<Vec<ProcessRecord>> {
        self.call("list", self.client.list()).await
    }
}

/// Chooses one record among several registered under the same name,
/// preferring one that is running.
pub fn pick_record<I>(records: I) -> Option<ProcessRecord>
where
    I: IntoIterator<Item = ProcessRecord>,
{
    let mut chosen: Option<ProcessRecord> = None;
    for record in records {
        let replace = match &chosen {
            None => true,
            Some(current) => {
                normalize(record.status.as_deref()) == ProjectStatus::Running
                    && normalize(current.status.as_deref()) != ProjectStatus::Running
            }
        };
        if replace {
            chosen = Some(record);
        }
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePortProbe, FakeSupervisor};
    use std::collections::BTreeMap;

    fn start_config(name: &str, port: Option<u16>) -> StartConfig {
        let mut env = BTreeMap::new();
        if let Some(port) = port {
            env.insert("PORT".to_string(), port.to_string());
        }
        StartConfig {
            name: name.to_string(),
            cwd: "/p/a".to_string(),
            script: "npm".to_string(),
            args: vec!["run".to_string(), "dev".to_string()],
            env,
        }
    }

    fn gateway(supervisor: Arc<FakeSupervisor>, probe: Arc<FakePortProbe>) -> SupervisorGateway {
        SupervisorGateway::new(supervisor, probe, &EngineConfig::default())
    }

    fn record(name: &str, status: &str) -> ProcessRecord {
        ProcessRecord {
            name: name.to_string(),
            pid: None,
            process_id: None,
            status: Some(status.to_string()),
            cwd: None,
        }
    }

    #[tokio::test]
    async fn repeated_start_leaves_one_live_record() {
        let supervisor = Arc::new(FakeSupervisor::new());
        let gateway = gateway(supervisor.clone(), Arc::new(FakePortProbe::all_free()));
        let config = start_config("demo000000000001", None);

        gateway.start(&config).await.expect("first start");
        gateway.start(&config).await.expect("second start");

        assert_eq!(supervisor.live_count("demo000000000001"), 1);
        assert_eq!(supervisor.record_count("demo000000000001"), 1);
    }

    #[tokio::test]
    async fn start_deletes_stopped_record_without_stopping() {
        let supervisor = Arc::new(FakeSupervisor::new());
        supervisor.insert("demo000000000001", "stopped");
        let gateway = gateway(supervisor.clone(), Arc::new(FakePortProbe::all_free()));

        gateway
            .start(&start_config("demo000000000001", None))
            .await
            .expect("start");

        let calls = supervisor.calls();
        assert!(!calls.iter().any(|c| c.starts_with("stop")));
        assert!(calls.iter().any(|c| c == "delete demo000000000001"));
        assert_eq!(supervisor.live_count("demo000000000001"), 1);
    }

    #[tokio::test]
    async fn start_stops_then_deletes_live_record() {
        let supervisor = Arc::new(FakeSupervisor::new());
        supervisor.insert("demo000000000001", "online");
        let gateway = gateway(supervisor.clone(), Arc::new(FakePortProbe::all_free()));

        gateway
            .start(&start_config("demo000000000001", None))
            .await
            .expect("start");

        let calls: Vec<String> = supervisor
            .calls()
            .into_iter()
            .filter(|c| c != "connect")
            .collect();
        assert_eq!(
            calls,
            vec![
                "describe demo000000000001",
                "stop demo000000000001",
                "delete demo000000000001",
                "start demo000000000001",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn occupied_port_is_freed_before_start() {
        let supervisor = Arc::new(FakeSupervisor::new());
        let probe = Arc::new(FakePortProbe::occupied([3000]));
        let gateway = gateway(supervisor.clone(), probe.clone());

        gateway
            .start(&start_config("demo000000000001", Some(3000)))
            .await
            .expect("start");

        assert_eq!(probe.freed(), vec![3000]);
        assert_eq!(supervisor.live_count("demo000000000001"), 1);
    }

    #[tokio::test]
    async fn unreachable_supervisor_stays_disconnected() {
        let supervisor = Arc::new(FakeSupervisor::new());
        supervisor.set_reachable(false);
        let gateway = gateway(supervisor.clone(), Arc::new(FakePortProbe::all_free()));

        let err = gateway.list().await.expect_err("unreachable");
        assert!(err.is_transient());
        assert_eq!(gateway.connection_state(), ConnectionState::Disconnected);

        supervisor.set_reachable(true);
        gateway.list().await.expect("list after recovery");
        assert_eq!(gateway.connection_state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn describe_absent_is_none() {
        let supervisor = Arc::new(FakeSupervisor::new());
        let gateway = gateway(supervisor, Arc::new(FakePortProbe::all_free()));
        assert_eq!(gateway.describe("ghost").await.expect("describe"), None);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_any_call() {
        let supervisor = Arc::new(FakeSupervisor::new());
        let gateway = gateway(supervisor.clone(), Arc::new(FakePortProbe::all_free()));
        let mut config = start_config("demo000000000001", None);
        config.cwd = String::new();

        let err = gateway.start(&config).await.expect_err("invalid");
        assert!(matches!(err, SyncError::SupervisorRejected(_)));
        assert!(supervisor.calls().is_empty());
    }

    #[test]
    fn pick_record_prefers_running() {
        let picked = pick_record(vec![record("a", "stopped"), record("a", "online")]);
        assert_eq!(picked.and_then(|r| r.status), Some("online".to_string()));

        let picked = pick_record(vec![record("a", "errored"), record("a", "stopped")]);
        assert_eq!(picked.and_then(|r| r.status), Some("errored".to_string()));

        assert!(pick_record(Vec::new()).is_none());
    }
}
