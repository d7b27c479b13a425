//! Periodic reconciliation with a live change feed.

use procsync_core::{SyncCoordinator, SyncEngine, SyncTrigger};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use crate::output::print_projects;

pub async fn run(engine: SyncEngine, interval_secs: u64, json: bool) -> Result<(), String> {
    let engine = Arc::new(engine);
    let coordinator = SyncCoordinator::new(engine.clone(), engine.config());
    let mut changes = engine.subscribe();
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

    coordinator.trigger(SyncTrigger::ListLoaded);
    if !json {
        eprintln!(
            "Watching {} projects every {}s (Ctrl-C to stop)",
            engine.projects().len(),
            interval_secs.max(1)
        );
    }

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Dropped when the previous pass is still running.
                coordinator.trigger(SyncTrigger::ListLoaded);
            }
            received = changes.recv() => match received {
                Ok(change) => {
                    if json {
                        let line = serde_json::to_string(&change)
                            .map_err(|e| format!("Failed to serialize change: {}", e))?;
                        println!("{}", line);
                    } else {
                        let name = engine
                            .project(&change.project_id)
                            .map(|p| p.name)
                            .unwrap_or_else(|_| change.project_id.clone());
                        println!(
                            "{}  {}: {} -> {}",
                            change.changed_at, name, change.previous_status, change.new_status
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Change feed lagged; some transitions were not printed");
                }
                Err(RecvError::Closed) => break,
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                break;
            }
        }
    }

    if !json {
        print_projects(&engine.projects());
    }
    Ok(())
}
