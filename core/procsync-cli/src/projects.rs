//! Registry and process-control subcommands.

use procsync_core::{
    LocalFs, ProjectAction, StatusQueryResult, SyncCoordinator, SyncEngine, SyncTrigger,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::output::{find_project, print_json, print_projects, short_id};

pub async fn import(
    engine: &SyncEngine,
    path: &Path,
    port: Option<u16>,
    json: bool,
) -> Result<(), String> {
    let path = fs_err::canonicalize(path).map_err(|e| e.to_string())?;
    let mut project = procsync_core::import_project(&LocalFs, &path).await?;
    project.port = port;
    engine.add_project(project.clone()).await?;

    if json {
        return print_json(&project);
    }
    println!(
        "Imported {} ({}) using {}",
        project.name,
        short_id(&project.id),
        project.package_manager
    );
    match project.run_script() {
        Some(script) => println!("  start runs `{} run {}`", project.package_manager, script),
        None => println!("  no scripts found; start will fail until package.json has one"),
    }
    Ok(())
}

pub fn list(engine: &SyncEngine, json: bool) -> Result<(), String> {
    let projects = engine.projects();
    if json {
        return print_json(&projects);
    }
    print_projects(&projects);
    Ok(())
}

pub async fn remove(engine: &SyncEngine, key: &str, json: bool) -> Result<(), String> {
    let project = find_project(engine, key)?;
    let removed = engine.remove_project(&project.id).await?;
    if json {
        return print_json(&removed);
    }
    println!("Removed {} ({})", removed.name, removed.path);
    Ok(())
}

#[derive(Serialize)]
struct ActionReport<'a> {
    project_id: &'a str,
    action: &'static str,
    status: procsync_core::ProjectStatus,
}

/// Runs an action, then waits for the post-action reconciliation pass so the
/// printed status is what the supervisor reports after settling.
async fn act(
    engine: SyncEngine,
    key: &str,
    action: ProjectAction,
    json: bool,
) -> Result<(), String> {
    let engine = Arc::new(engine);
    let project = find_project(&engine, key)?;
    let coordinator = SyncCoordinator::new(engine.clone(), engine.config());

    let verb = match action {
        ProjectAction::Start => {
            let outcome = engine.start_project(&project.id).await?;
            tracing::info!(pid = ?outcome.pid, "Start accepted");
            "start"
        }
        ProjectAction::Stop => {
            engine.stop_project(&project.id).await?;
            "stop"
        }
        ProjectAction::Restart => {
            engine.restart_project(&project.id).await?;
            "restart"
        }
    };

    coordinator
        .trigger(SyncTrigger::ActionCompleted {
            action,
            project_id: project.id.clone(),
        })
        .finished()
        .await;

    let status = engine.project(&project.id)?.status;
    if json {
        return print_json(&ActionReport {
            project_id: &project.id,
            action: verb,
            status,
        });
    }
    println!("{} {}: now {}", verb, project.name, status);
    Ok(())
}

pub async fn start(engine: SyncEngine, key: &str, json: bool) -> Result<(), String> {
    act(engine, key, ProjectAction::Start, json).await
}

pub async fn stop(engine: SyncEngine, key: &str, json: bool) -> Result<(), String> {
    act(engine, key, ProjectAction::Stop, json).await
}

pub async fn restart(engine: SyncEngine, key: &str, json: bool) -> Result<(), String> {
    act(engine, key, ProjectAction::Restart, json).await
}

pub async fn status(engine: &SyncEngine, key: Option<&str>, json: bool) -> Result<(), String> {
    let results: Vec<StatusQueryResult> = match key {
        Some(key) => {
            let project = find_project(engine, key)?;
            vec![engine.query_project_status(&project).await]
        }
        None => {
            engine
                .query_multiple_project_status_optimized(&engine.projects())
                .await
        }
    };

    if json {
        return print_json(&results);
    }
    if results.is_empty() {
        println!("No projects registered.");
        return Ok(());
    }

    let projects = engine.projects();
    println!(
        "{:<20}  {:<16}  {:<8}  {:<10}  {:>7}  {:<10}",
        "NAME", "PROCESS", "STATUS", "NATIVE", "PID", "METHOD"
    );
    for result in &results {
        let name = projects
            .iter()
            .find(|p| p.id == result.project_id)
            .map(|p| p.name.as_str())
            .unwrap_or("?");
        println!(
            "{:<20}  {:<16}  {:<8}  {:<10}  {:>7}  {:<10}",
            name,
            result.process_key,
            result.status,
            result.native_status.as_deref().unwrap_or("-"),
            result
                .pid
                .map(|pid| pid.to_string())
                .unwrap_or_else(|| "-".to_string()),
            result.method
        );
        if let Some(error) = &result.error {
            println!("    query failed: {}", error);
        }
    }
    Ok(())
}

pub async fn sync(engine: &SyncEngine, json: bool) -> Result<(), String> {
    let changes = engine.reconcile_all().await;
    if json {
        return print_json(&changes);
    }

    if changes.is_empty() {
        println!("All {} projects up to date.", engine.projects().len());
        return Ok(());
    }
    let projects = engine.projects();
    for change in &changes {
        let name = projects
            .iter()
            .find(|p| p.id == change.project_id)
            .map(|p| p.name.as_str())
            .unwrap_or(change.project_id.as_str());
        println!(
            "{}: {} -> {}",
            name, change.previous_status, change.new_status
        );
    }
    Ok(())
}
