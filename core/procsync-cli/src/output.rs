//! Shared rendering for human and `--json` output.

use chrono::{DateTime, Local};
use procsync_core::{Project, SyncEngine};
use serde::Serialize;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), String> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to serialize output: {}", e))?;
    println!("{}", rendered);
    Ok(())
}

/// Resolves a project by id, then by unique name.
pub fn find_project(engine: &SyncEngine, key: &str) -> Result<Project, String> {
    let projects = engine.projects();
    if let Some(project) = projects.iter().find(|p| p.id == key) {
        return Ok(project.clone());
    }

    let mut by_name = projects.into_iter().filter(|p| p.name == key);
    match (by_name.next(), by_name.next()) {
        (Some(project), None) => Ok(project),
        (Some(_), Some(_)) => Err(format!(
            "Several projects are named '{}'; use the project id",
            key
        )),
        (None, _) => Err(format!("No project with id or name '{}'", key)),
    }
}

pub fn short_id(id: &str) -> &str {
    let end = id.char_indices().nth(10).map(|(i, _)| i).unwrap_or(id.len());
    &id[..end]
}

pub fn port_label(port: Option<u16>) -> String {
    port.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())
}

/// RFC3339 timestamp shown in local time, or `never`.
pub fn synced_label(timestamp: Option<&str>) -> String {
    timestamp
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| {
            ts.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "never".to_string())
}

pub fn print_projects(projects: &[Project]) {
    if projects.is_empty() {
        println!("No projects registered. Add one with `procsync import <PATH>`.");
        return;
    }

    println!(
        "{:<10}  {:<20}  {:<8}  {:>5}  {:<19}  PATH",
        "ID", "NAME", "STATUS", "PORT", "LAST SYNC"
    );
    for project in projects {
        println!(
            "{:<10}  {:<20}  {:<8}  {:>5}  {:<19}  {}",
            short_id(&project.id),
            project.name,
            project.status,
            port_label(project.port),
            synced_label(project.last_synced_at.as_deref()),
            project.path
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_truncates_ulids() {
        assert_eq!(short_id("01HZX3K9Q2ABCDEFGHJKMNPQRS"), "01HZX3K9Q2");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn labels_have_placeholders() {
        assert_eq!(port_label(None), "-");
        assert_eq!(port_label(Some(3000)), "3000");
        assert_eq!(synced_label(None), "never");
        assert_eq!(synced_label(Some("not a time")), "never");
        assert_ne!(synced_label(Some("2026-01-01T00:00:00+00:00")), "never");
    }
}
