//! Port discovery and conflict subcommands.

use procsync_core::SyncEngine;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::output::{find_project, print_json};

pub async fn detect(
    engine: &SyncEngine,
    key: Option<&str>,
    path: Option<&Path>,
    json: bool,
) -> Result<(), String> {
    let path: PathBuf = match (key, path) {
        (_, Some(path)) => fs_err::canonicalize(path).map_err(|e| e.to_string())?,
        (Some(key), None) => PathBuf::from(find_project(engine, key)?.path),
        (None, None) => return Err("Pass a project or --path".to_string()),
    };

    let result = engine.detect_project_ports(&path).await;
    if json {
        return print_json(&result);
    }

    if result.sources.is_empty() {
        println!("No port evidence found in {}", path.display());
        return Ok(());
    }
    for source in &result.sources {
        let file = source
            .file
            .strip_prefix(&path)
            .unwrap_or(source.file.as_path())
            .display();
        println!(
            "{:>5}  {:<16}  {:<6}  {}",
            source.port, source.origin, source.confidence, file
        );
    }
    if let Some(port) = result.default_port {
        println!("Effective port: {}", port);
    }
    if result.conflict {
        let ports: Vec<String> = result
            .conflicting_ports
            .iter()
            .map(|p| p.to_string())
            .collect();
        println!(
            "Warning: framework config and env files disagree ({}); the framework config wins",
            ports.join(" vs ")
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct ConflictOutput<'a> {
    conflicts: &'a [procsync_core::PortConflict],
    #[serde(skip_serializing_if = "Option::is_none")]
    resolution: Option<&'a procsync_core::AutoResolveReport>,
}

pub async fn conflicts(engine: &SyncEngine, fix: bool, json: bool) -> Result<(), String> {
    let conflicts = engine.detect_port_conflicts(&engine.projects()).await;
    let report = if fix && !conflicts.is_empty() {
        Some(engine.auto_resolve_port_conflicts(&conflicts).await)
    } else {
        None
    };

    if json {
        print_json(&ConflictOutput {
            conflicts: &conflicts,
            resolution: report.as_ref(),
        })?;
    } else {
        if conflicts.is_empty() {
            println!("No port conflicts.");
        }
        for conflict in &conflicts {
            let names: Vec<&str> = conflict.projects.iter().map(|p| p.name.as_str()).collect();
            println!("Port {}: {}", conflict.port, names.join(", "));
        }
        if let Some(report) = &report {
            for moved in &report.resolved {
                let target = match &moved.file {
                    Some(file) => file.display().to_string(),
                    None => "declared port".to_string(),
                };
                println!(
                    "  moved {} from {} to {} ({})",
                    moved.project_id, moved.from, moved.to, target
                );
            }
            for failure in &report.failed {
                println!("  could not move {}: {}", failure.project_id, failure.reason);
            }
        } else if !conflicts.is_empty() {
            println!("Run with --fix to reassign ports automatically.");
        }
    }

    match report {
        Some(report) if !report.failed.is_empty() => Err(format!(
            "{} project(s) could not be moved to a free port",
            report.failed.len()
        )),
        _ => Ok(()),
    }
}
