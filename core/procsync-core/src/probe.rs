//! Port occupancy checks and best-effort port freeing.
//!
//! Availability is decided by actually binding the port. The occupant lookup
//! asks `lsof` which pids listen on the port and `sysinfo` what they are; both
//! are optional extras and their absence only loses the `occupied_by` detail.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::process::Stdio;
use sysinfo::{Pid, ProcessRefreshKind, Signal, System};
use tokio::net::TcpListener;
use tokio::process::Command;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortOccupant {
    pub pid: u32,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortAvailability {
    pub available: bool,
    #[serde(default)]
    pub occupied_by: Option<PortOccupant>,
}

#[async_trait]
pub trait PortProbe: Send + Sync {
    async fn check_port_available(&self, port: u16) -> PortAvailability;

    /// Tries to make `port` bindable again. Returns whether it now is.
    async fn free_port(&self, port: u16) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPortProbe;

#[async_trait]
impl PortProbe for SystemPortProbe {
    async fn check_port_available(&self, port: u16) -> PortAvailability {
        if can_bind(port).await {
            return PortAvailability {
                available: true,
                occupied_by: None,
            };
        }

        let occupied_by = match listening_pids(port).await.first() {
            Some(&pid) => Some(PortOccupant {
                pid,
                name: process_name(pid).await,
            }),
            None => None,
        };
        PortAvailability {
            available: false,
            occupied_by,
        }
    }

    async fn free_port(&self, port: u16) -> bool {
        if can_bind(port).await {
            return true;
        }

        let pids = listening_pids(port).await;
        if pids.is_empty() {
            tracing::warn!(port, "Port occupied but no listening process found");
            return false;
        }

        for pid in pids {
            let terminated = terminate(pid).await;
            tracing::info!(port, pid, terminated, "Terminated port occupant");
        }
        can_bind(port).await
    }
}

/// Binds both the wildcard and loopback addresses; either failing means busy.
async fn can_bind(port: u16) -> bool {
    for ip in [Ipv4Addr::UNSPECIFIED, Ipv4Addr::LOCALHOST] {
        match TcpListener::bind(SocketAddrV4::new(ip, port)).await {
            Ok(listener) => drop(listener),
            Err(_) => return false,
        }
    }
    true
}

async fn listening_pids(port: u16) -> Vec<u32> {
    let output = Command::new("lsof")
        .args(["-nP", &format!("-iTCP:{}", port), "-sTCP:LISTEN", "-t"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await;

    match output {
        Ok(output) => parse_pid_lines(&String::from_utf8_lossy(&output.stdout)),
        Err(err) => {
            tracing::debug!(error = %err, port, "lsof unavailable");
            Vec::new()
        }
    }
}

fn parse_pid_lines(stdout: &str) -> Vec<u32> {
    let mut pids: Vec<u32> = stdout
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .filter(|pid| *pid != 0)
        .collect();
    pids.dedup();
    pids
}

async fn process_name(pid: u32) -> Option<String> {
    tokio::task::spawn_blocking(move || {
        let mut sys = System::new();
        let sys_pid = Pid::from(pid as usize);
        sys.refresh_process_specifics(sys_pid, ProcessRefreshKind::new());
        sys.process(sys_pid).map(|process| process.name().to_string())
    })
    .await
    .ok()
    .flatten()
}

async fn terminate(pid: u32) -> bool {
    tokio::task::spawn_blocking(move || {
        let mut sys = System::new();
        let sys_pid = Pid::from(pid as usize);
        sys.refresh_process_specifics(sys_pid, ProcessRefreshKind::new());
        match sys.process(sys_pid) {
            Some(process) => process
                .kill_with(Signal::Term)
                .unwrap_or_else(|| process.kill()),
            None => false,
        }
    })
    .await
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lsof_pid_output() {
        assert_eq!(parse_pid_lines("123\n456\n"), vec![123, 456]);
        assert_eq!(parse_pid_lines("  42 \n\nnot-a-pid\n0\n"), vec![42]);
        assert!(parse_pid_lines("").is_empty());
    }

    #[tokio::test]
    async fn bound_port_is_reported_unavailable() {
        let listener = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
            .await
            .expect("bind ephemeral");
        let port = listener.local_addr().expect("addr").port();

        let availability = SystemPortProbe.check_port_available(port).await;
        assert!(!availability.available);
        drop(listener);
    }
}
