//! Process supervisor integration.
//!
//! [`SupervisorClient`] is the raw control API of the external supervisor;
//! [`SupervisorGateway`] wraps it with connection state, timeouts and the
//! idempotent start sequence. Add new supervisor backends as further
//! `SupervisorClient` implementations next to [`Pm2Cli`].

mod gateway;
mod pm2;

pub use gateway::{pick_record, ConnectionState, SupervisorGateway};
pub use pm2::Pm2Cli;

use async_trait::async_trait;
use procsync_supervisor_protocol::{ProcessRecord, StartConfig, StartOutcome};

use crate::error::Result;

/// Control API of an external process supervisor.
///
/// Implementors should:
/// - Map "cannot reach the supervisor" to `SyncError::SupervisorUnavailable`
/// - Map "no process under that name" to `SyncError::ProcessNotFound`
/// - Leave timeouts and retries to the gateway
#[async_trait]
pub trait SupervisorClient: Send + Sync {
    async fn connect(&self) -> Result<()>;

    async fn start(&self, config: &StartConfig) -> Result<StartOutcome>;

    async fn stop(&self, name: &str) -> Result<()>;

    async fn restart(&self, name: &str) -> Result<()>;

    async fn delete(&self, name: &str) -> Result<()>;

    /// Every record registered under `name`. Empty when there is none.
    async fn describe(&self, name: &str) -> Result<Vec<ProcessRecord>>;

    async fn list(&self) -> Result<Vec<ProcessRecord>>;
}
