//! PM2 driven through its command-line interface.

use async_trait::async_trait;
use procsync_supervisor_protocol::{parse_process_list, ProcessRecord, StartConfig, StartOutcome};
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::process::Command;

use super::SupervisorClient;
use crate::error::{Result, SyncError};

#[derive(Debug, Clone)]
pub struct Pm2Cli {
    bin: String,
}

impl Default for Pm2Cli {
    fn default() -> Self {
        Self::new("pm2")
    }
}

impl Pm2Cli {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    async fn run(&self, args: &[String], config: Option<&StartConfig>) -> Result<String> {
        let mut command = Command::new(&self.bin);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(config) = config {
            command.envs(&config.env);
        }

        let rendered = format!("{} {}", self.bin, args.join(" "));
        tracing::debug!(command = %rendered, "Running supervisor command");

        let output = command.output().await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                SyncError::SupervisorUnavailable(format!("{} not found on PATH", self.bin))
            } else {
                SyncError::SupervisorUnavailable(format!("Failed to spawn {}: {}", self.bin, err))
            }
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let details = if stderr.is_empty() {
            stdout.trim().to_string()
        } else {
            stderr
        };
        Err(classify_failure(&rendered, args, details))
    }
}

fn classify_failure(rendered: &str, args: &[String], details: String) -> SyncError {
    let lowered = details.to_ascii_lowercase();
    // Only commands addressing a process by name can fail for a missing one.
    if let [command, name, ..] = args {
        let by_name = matches!(command.as_str(), "stop" | "restart" | "delete");
        if by_name && lowered.contains("not found") {
            return SyncError::ProcessNotFound(name.clone());
        }
    }
    if lowered.contains("econnrefused") || lowered.contains("daemon not") {
        return SyncError::SupervisorUnavailable(details);
    }
    SyncError::CommandFailed {
        command: rendered.to_string(),
        details,
    }
}

fn start_args(config: &StartConfig) -> Vec<String> {
    let mut args = vec![
        "start".to_string(),
        config.script.clone(),
        "--name".to_string(),
        config.name.clone(),
        "--cwd".to_string(),
        config.cwd.clone(),
        "--no-autorestart".to_string(),
    ];
    if !config.args.is_empty() {
        args.push("--".to_string());
        args.extend(config.args.iter().cloned());
    }
    args
}

#[async_trait]
impl SupervisorClient for Pm2Cli {
    async fn connect(&self) -> Result<()> {
        self.run(&["ping".to_string()], None).await.map(|_| ())
    }

    async fn start(&self, config: &StartConfig) -> Result<StartOutcome> {
        self.run(&start_args(config), Some(config)).await?;

        let record = self
            .describe(&config.name)
            .await?
            .into_iter()
            .max_by_key(|record| record.process_id);
        Ok(StartOutcome {
            success: record.is_some(),
            pid: record.as_ref().and_then(|r| r.pid),
            process_id: record.and_then(|r| r.process_id),
        })
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.run(&["stop".to_string(), name.to_string()], None)
            .await
            .map(|_| ())
    }

    async fn restart(&self, name: &str) -> Result<()> {
        self.run(&["restart".to_string(), name.to_string()], None)
            .await
            .map(|_| ())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.run(&["delete".to_string(), name.to_string()], None)
            .await
            .map(|_| ())
    }

    async fn describe(&self, name: &str) -> Result<Vec<ProcessRecord>> {
        // `pm2 describe` only prints a table; the JSON listing is filtered instead.
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|record| record.name == name)
            .collect())
    }

    async fn list(&self) -> Result<Vec<ProcessRecord>> {
        let stdout = self.run(&["jlist".to_string()], None).await?;
        Ok(parse_process_list(&stdout)?)
    }
}
