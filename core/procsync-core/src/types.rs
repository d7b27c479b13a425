//! Core types shared by every procsync client.
//!
//! `ProjectStatus` is the only status vocabulary that leaves this crate;
//! supervisor-native strings stop at [`crate::status::normalize`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::identity::process_key;

// ═══════════════════════════════════════════════════════════════════════════════
// Project Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Domain status of a managed project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Running,
    #[default]
    Stopped,
    Error,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectStatus::Running => write!(f, "running"),
            ProjectStatus::Stopped => write!(f, "stopped"),
            ProjectStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageManager {
    #[default]
    Npm,
    Pnpm,
    Yarn,
    Bun,
}

impl PackageManager {
    pub fn binary(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Pnpm => "pnpm",
            Self::Yarn => "yarn",
            Self::Bun => "bun",
        }
    }

    /// Arguments that run a manifest script with this package manager.
    pub fn run_args(&self, script: &str) -> Vec<String> {
        vec!["run".to_string(), script.to_string()]
    }

    /// Lockfiles that identify each package manager, checked in order.
    pub const LOCKFILES: &'static [(&'static str, PackageManager)] = &[
        ("pnpm-lock.yaml", PackageManager::Pnpm),
        ("yarn.lock", PackageManager::Yarn),
        ("bun.lockb", PackageManager::Bun),
        ("bun.lock", PackageManager::Bun),
        ("package-lock.json", PackageManager::Npm),
    ];
}

impl std::fmt::Display for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.binary())
    }
}

/// A project registered with procsync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub path: String,
    /// Port the user declared for this project, if any.
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub package_manager: PackageManager,
    /// Written only by the reconciler.
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub scripts: Vec<String>,
    #[serde(default)]
    pub last_synced_at: Option<String>,
}

impl Project {
    /// Supervisor process name for this project. Recomputed on every call.
    pub fn process_key(&self) -> String {
        process_key(&self.name, &self.path)
    }

    /// Script launched on start: `dev`, then `start`, then the first listed.
    pub fn run_script(&self) -> Option<&str> {
        ["dev", "start"]
            .iter()
            .find(|preferred| self.scripts.iter().any(|s| s == *preferred))
            .copied()
            .or_else(|| self.scripts.first().map(String::as_str))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Status Query Types
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMethod {
    /// One `describe` per project.
    Individual,
    /// A single `list` matched in memory.
    Batch,
}

impl std::fmt::Display for QueryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryMethod::Individual => write!(f, "individual"),
            QueryMethod::Batch => write!(f, "batch"),
        }
    }
}

/// Outcome of querying the supervisor about one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusQueryResult {
    pub project_id: String,
    pub process_key: String,
    pub success: bool,
    /// Supervisor-native status, kept for diagnostics only.
    pub native_status: Option<String>,
    pub status: ProjectStatus,
    pub pid: Option<u32>,
    pub method: QueryMethod,
    pub error: Option<String>,
}

/// Emitted when reconciliation changes a project's stored status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub project_id: String,
    pub new_status: ProjectStatus,
    pub previous_status: ProjectStatus,
    pub changed_at: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Port Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Where a port value was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortOrigin {
    EnvFile,
    PackageScript,
    FrameworkConfig,
    SourceHeuristic,
}

impl PortOrigin {
    /// Tie-break rank among equal-confidence sources. Lower wins.
    pub fn priority(&self) -> u8 {
        match self {
            PortOrigin::FrameworkConfig => 0,
            PortOrigin::EnvFile => 1,
            PortOrigin::PackageScript => 2,
            PortOrigin::SourceHeuristic => 3,
        }
    }
}

impl std::fmt::Display for PortOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortOrigin::EnvFile => write!(f, "env"),
            PortOrigin::PackageScript => write!(f, "package-script"),
            PortOrigin::FrameworkConfig => write!(f, "framework-config"),
            PortOrigin::SourceHeuristic => write!(f, "source"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSource {
    pub origin: PortOrigin,
    pub port: u16,
    pub file: PathBuf,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDetectionResult {
    pub sources: Vec<PortSource>,
    pub default_port: Option<u16>,
    pub conflict: bool,
    /// Distinct values that disagree when `conflict` is set, framework first.
    #[serde(default)]
    pub conflicting_ports: Vec<u16>,
}

impl PortDetectionResult {
    /// Distinct ports in discovery order.
    pub fn ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = Vec::new();
        for source in &self.sources {
            if !ports.contains(&source.port) {
                ports.push(source.port);
            }
        }
        ports
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Conflict Types
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictMember {
    pub project_id: String,
    pub name: String,
    pub path: String,
    /// The project's declared port, the fallback when nothing is detected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_port: Option<u16>,
}

/// Several projects resolved to the same port, in registry order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConflict {
    pub port: u16,
    pub projects: Vec<ConflictMember>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortReassignment {
    pub project_id: String,
    pub from: u16,
    pub to: u16,
    /// The file rewritten with the new port, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Whether the project's declared port moved to `to` as well.
    #[serde(default)]
    pub declared: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionFailure {
    pub project_id: String,
    pub port: u16,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoResolveReport {
    pub resolved: Vec<PortReassignment>,
    pub failed: Vec<ResolutionFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(scripts: &[&str]) -> Project {
        Project {
            id: "01HX".to_string(),
            name: "demo".to_string(),
            path: "/p/a".to_string(),
            port: None,
            package_manager: PackageManager::Npm,
            status: ProjectStatus::Stopped,
            scripts: scripts.iter().map(|s| s.to_string()).collect(),
            last_synced_at: None,
        }
    }

    #[test]
    fn run_script_prefers_dev_then_start() {
        assert_eq!(project(&["build", "start", "dev"]).run_script(), Some("dev"));
        assert_eq!(project(&["build", "start"]).run_script(), Some("start"));
        assert_eq!(project(&["serve"]).run_script(), Some("serve"));
        assert_eq!(project(&[]).run_script(), None);
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&ProjectStatus::Running).expect("serialize");
        assert_eq!(json, "\"running\"");
        assert_eq!(ProjectStatus::Error.to_string(), "error");
    }

    #[test]
    fn detection_ports_are_distinct_in_order() {
        let source = |origin, port| PortSource {
            origin,
            port,
            file: PathBuf::from("/p/a/.env"),
            confidence: Confidence::High,
        };
        let result = PortDetectionResult {
            sources: vec![
                source(PortOrigin::FrameworkConfig, 5173),
                source(PortOrigin::EnvFile, 3000),
                source(PortOrigin::PackageScript, 5173),
            ],
            default_port: Some(5173),
            conflict: true,
            conflicting_ports: vec![5173, 3000],
        };
        assert_eq!(result.ports(), vec![5173, 3000]);
    }

    #[test]
    fn confidence_orders_high_above_low() {
        assert!(Confidence::High > Confidence::Medium);
        assert!(Confidence::Medium > Confidence::Low);
    }
}
