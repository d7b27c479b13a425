//! Cross-project port collisions and their automatic resolution.
//!
//! A project's resolved port is its detected default, falling back to the
//! port the user declared. Resolution keeps the first project of each
//! conflict where it is and moves every other member to the next port in a
//! bounded window that is both free on this machine and not handed out
//! earlier in the same run.
//!
//! A move edits whatever decided the port (the winning env assignment, the
//! script flag, or the declared port) and only counts once detection agrees.
//! Framework config ports are never rewritten.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{Result, SyncError};
use crate::fs::{is_not_found, ProjectFs};
use crate::ports::{
    replace_env_port, replace_script_port, set_env_port, winning_source, PortDiscovery,
};
use crate::probe::PortProbe;
use crate::types::{
    AutoResolveReport, ConflictMember, PortConflict, PortOrigin, PortReassignment, Project,
    ResolutionFailure,
};

pub struct ConflictResolver {
    discovery: PortDiscovery,
    fs: Arc<dyn ProjectFs>,
    probe: Arc<dyn PortProbe>,
    window: u16,
}

impl ConflictResolver {
    pub fn new(fs: Arc<dyn ProjectFs>, probe: Arc<dyn PortProbe>, config: &EngineConfig) -> Self {
        Self {
            discovery: PortDiscovery::new(fs.clone()),
            fs,
            probe,
            window: config.probe_window,
        }
    }

    pub async fn resolved_port(&self, project: &Project) -> Option<u16> {
        self.discovery
            .detect(Path::new(&project.path))
            .await
            .default_port
            .or(project.port)
    }

    pub async fn find_conflicts(&self, projects: &[Project]) -> Vec<PortConflict> {
        let mut entries = Vec::with_capacity(projects.len());
        for project in projects {
            if let Some(port) = self.resolved_port(project).await {
                entries.push((port, member(project)));
            }
        }
        group_by_port(entries)
    }

    pub async fn auto_resolve(&self, conflicts: &[PortConflict]) -> AutoResolveReport {
        let mut report = AutoResolveReport::default();
        let mut claimed: BTreeSet<u16> = conflicts.iter().map(|c| c.port).collect();

        for conflict in conflicts {
            for member in conflict.projects.iter().skip(1) {
                match self.move_member(member, conflict.port, &mut claimed).await {
                    Ok(Some(reassignment)) => {
                        tracing::info!(
                            project_id = %member.project_id,
                            from = reassignment.from,
                            to = reassignment.to,
                            "Reassigned conflicting port"
                        );
                        report.resolved.push(reassignment);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(project_id = %member.project_id, error = %err, "Port conflict unresolved");
                        report.failed.push(ResolutionFailure {
                            project_id: member.project_id.clone(),
                            port: conflict.port,
                            reason: err.to_string(),
                        });
                    }
                }
            }
        }
        report
    }

    /// Moves one member off `from` by editing whatever decided its port,
    /// then checks that detection agrees. `None` means it already moved.
    async fn move_member(
        &self,
        member: &ConflictMember,
        from: u16,
        claimed: &mut BTreeSet<u16>,
    ) -> Result<Option<PortReassignment>> {
        let root = Path::new(&member.path);
        let detection = self.discovery.detect(root).await;
        if detection.default_port.or(member.declared_port) != Some(from) {
            tracing::debug!(project_id = %member.project_id, port = from, "Project no longer on conflicting port");
            return Ok(None);
        }

        let target = match winning_source(&detection.sources) {
            None => PortTarget::Declared,
            Some(source) => match source.origin {
                PortOrigin::FrameworkConfig => {
                    return Err(SyncError::PortPinned {
                        port: from,
                        path: source.file.clone(),
                    })
                }
                PortOrigin::EnvFile => PortTarget::EnvFile(source.file.clone()),
                PortOrigin::PackageScript => PortTarget::Manifest(source.file.clone()),
                PortOrigin::SourceHeuristic => PortTarget::DefaultEnv(root.join(".env")),
            },
        };

        let to = self
            .next_free_port(from, claimed)
            .await
            .ok_or(SyncError::PortExhausted {
                port: from,
                window: self.window,
            })?;
        claimed.insert(to);

        let file = self.write_port(&target, from, to).await?;
        let declared = member.declared_port == Some(from);
        let declared_after = if declared { Some(to) } else { member.declared_port };

        let actual = self.discovery.detect(root).await.default_port.or(declared_after);
        if actual != Some(to) {
            return Err(SyncError::PortNotApplied { expected: to, actual });
        }

        Ok(Some(PortReassignment {
            project_id: member.project_id.clone(),
            from,
            to,
            file,
            declared,
        }))
    }

    /// Probes `port+1 ..= port+window` in order, one port at a time.
    async fn next_free_port(&self, port: u16, claimed: &BTreeSet<u16>) -> Option<u16> {
        let last = (port as u32 + self.window as u32).min(u16::MAX as u32) as u16;
        if last <= port {
            return None;
        }
        for candidate in port + 1..=last {
            if claimed.contains(&candidate) {
                continue;
            }
            if self.probe.check_port_available(candidate).await.available {
                return Some(candidate);
            }
        }
        None
    }

    async fn write_port(&self, target: &PortTarget, from: u16, to: u16) -> Result<Option<PathBuf>> {
        let (path, updated) = match target {
            PortTarget::Declared => return Ok(None),
            PortTarget::EnvFile(path) => {
                let content = self.fs.read_file(path).await?;
                (path, replace_env_port(&content, from, to))
            }
            PortTarget::Manifest(path) => {
                let content = self.fs.read_file(path).await?;
                (path, replace_script_port(&content, from, to))
            }
            PortTarget::DefaultEnv(path) => {
                let content = match self.fs.read_file(path).await {
                    Ok(content) => content,
                    Err(err) if is_not_found(&err) => String::new(),
                    Err(err) => return Err(err),
                };
                (path, Some(set_env_port(&content, to)))
            }
        };

        let updated = updated.ok_or_else(|| SyncError::MalformedEvidence {
            path: path.clone(),
            details: format!("no assignment of port {} to rewrite", from),
        })?;
        self.fs.write_file(path, &updated).await?;
        Ok(Some(path.clone()))
    }
}

/// What gets edited to move a project to a new port.
enum PortTarget {
    /// Only the project's declared port; nothing in its files names a port.
    Declared,
    /// The env file whose assignment won detection.
    EnvFile(PathBuf),
    /// `package.json`, whose script flag won detection.
    Manifest(PathBuf),
    /// `.env`, gaining a `PORT` that outranks a source-code guess.
    DefaultEnv(PathBuf),
}

fn member(project: &Project) -> ConflictMember {
    ConflictMember {
        project_id: project.id.clone(),
        name: project.name.clone(),
        path: project.path.clone(),
        declared_port: project.port,
    }
}

/// Groups members by port, keeping first-seen order, and returns only the
/// groups with more than one member.
pub fn group_by_port<I>(entries: I) -> Vec<PortConflict>
where
    I: IntoIterator<Item = (u16, ConflictMember)>,
{
    let mut groups: Vec<PortConflict> = Vec::new();
    for (port, member) in entries {
        match groups.iter_mut().find(|group| group.port == port) {
            Some(group) => group.projects.push(member),
            None => groups.push(PortConflict {
                port,
                projects: vec![member],
            }),
        }
    }
    groups.retain(|group| group.projects.len() > 1);
    groups
}
