//! Port discovery from project files.
//!
//! Nothing here touches sockets. Each evidence class lives in its own module
//! and returns [`PortSource`]s; [`resolve`] picks the effective port:
//!
//! 1. A framework config port wins outright.
//! 2. Otherwise the highest confidence wins, ties going to the origin with
//!    the better [`PortOrigin::priority`], then to discovery order. Env files
//!    are discovered most specific first (`.env.local` before `.env`).
//!
//! Unreadable or malformed files are logged and skipped.

mod env;
mod framework;
mod heuristics;
mod manifest;

pub use env::{parse_env_ports, replace_env_port, set_env_port, ENV_FILES, PORT_KEYS};
pub use manifest::replace_script_port;
pub use framework::FRAMEWORK_CONFIGS;

use std::cmp::Reverse;
use std::path::Path;
use std::sync::Arc;

use crate::error::SyncError;
use crate::fs::{is_not_found, ProjectFs};
use crate::types::{PortDetectionResult, PortOrigin, PortSource};

#[derive(Clone)]
pub struct PortDiscovery {
    fs: Arc<dyn ProjectFs>,
}

impl PortDiscovery {
    pub fn new(fs: Arc<dyn ProjectFs>) -> Self {
        Self { fs }
    }

    pub async fn detect(&self, project_path: &Path) -> PortDetectionResult {
        let fs = self.fs.as_ref();
        let mut sources = Vec::new();
        sources.extend(framework::scan(fs, project_path).await);
        sources.extend(env::scan(fs, project_path).await);
        sources.extend(manifest::scan(fs, project_path).await);
        sources.extend(heuristics::scan(fs, project_path).await);

        let result = resolve(sources);
        tracing::debug!(
            path = %project_path.display(),
            sources = result.sources.len(),
            default_port = ?result.default_port,
            conflict = result.conflict,
            "Port detection finished"
        );
        result
    }
}

/// The source that decides the effective port.
pub fn winning_source(sources: &[PortSource]) -> Option<&PortSource> {
    sources
        .iter()
        .find(|s| s.origin == PortOrigin::FrameworkConfig)
        .or_else(|| {
            sources
                .iter()
                .min_by_key(|s| (Reverse(s.confidence), s.origin.priority()))
        })
}

pub fn resolve(sources: Vec<PortSource>) -> PortDetectionResult {
    let framework_port = sources
        .iter()
        .find(|s| s.origin == PortOrigin::FrameworkConfig)
        .map(|s| s.port);
    let default_port = winning_source(&sources).map(|s| s.port);

    let mut conflicting_ports = Vec::new();
    if let Some(framework_port) = framework_port {
        for source in sources.iter().filter(|s| s.origin == PortOrigin::EnvFile) {
            if source.port != framework_port && !conflicting_ports.contains(&source.port) {
                conflicting_ports.push(source.port);
            }
        }
        if !conflicting_ports.is_empty() {
            conflicting_ports.insert(0, framework_port);
        }
    }

    PortDetectionResult {
        conflict: !conflicting_ports.is_empty(),
        conflicting_ports,
        default_port,
        sources,
    }
}

/// Accepts 1..=65535; everything else is not a port.
pub(crate) fn parse_port(raw: &str) -> Option<u16> {
    match raw.trim().parse::<u32>() {
        Ok(port) if (1..=65535).contains(&port) => Some(port as u16),
        _ => None,
    }
}

/// Reads an evidence file. Absent files are silent, unreadable ones warn.
pub(crate) async fn read_evidence(fs: &dyn ProjectFs, path: &Path) -> Option<String> {
    match fs.read_file(path).await {
        Ok(content) => Some(content),
        Err(err) if is_not_found(&err) => None,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Skipping unreadable port evidence");
            None
        }
    }
}

pub(crate) fn report_malformed(path: &Path, details: impl Into<String>) {
    let err = SyncError::MalformedEvidence {
        path: path.to_path_buf(),
        details: details.into(),
    };
    tracing::warn!(error = %err, "Skipping malformed port evidence");
}
