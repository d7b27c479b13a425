//! Status reconciliation between the project registry and the supervisor.
//!
//! A pass has two phases. Querying is async and never fails as a whole: each
//! project gets a [`StatusQueryResult`], successful or not. Applying is
//! synchronous and only touches projects whose query succeeded, so a flaky
//! supervisor leaves stored status alone until the next pass.

use futures_util::future::join_all;
use procsync_supervisor_protocol::ProcessRecord;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::SyncError;
use crate::status::normalize;
use crate::supervisor::{pick_record, SupervisorGateway};
use crate::types::{Project, ProjectStatus, QueryMethod, StatusChange, StatusQueryResult};

/// How a multi-project query talks to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStrategy {
    /// One `describe` per project, run concurrently.
    Individual,
    /// One `list`, matched in memory by process key.
    Batch,
}

impl QueryStrategy {
    pub fn for_count(count: usize, batch_threshold: usize) -> Self {
        if count > batch_threshold {
            QueryStrategy::Batch
        } else {
            QueryStrategy::Individual
        }
    }
}

pub struct StatusReconciler {
    gateway: Arc<SupervisorGateway>,
    batch_threshold: usize,
}

impl StatusReconciler {
    pub fn new(gateway: Arc<SupervisorGateway>, config: &EngineConfig) -> Self {
        Self {
            gateway,
            batch_threshold: config.batch_threshold,
        }
    }

    pub async fn query_one(&self, project: &Project) -> StatusQueryResult {
        let key = project.process_key();
        match self.gateway.describe(&key).await {
            Ok(record) => record_result(project, key, record, QueryMethod::Individual),
            Err(SyncError::ProcessNotFound(_)) => {
                record_result(project, key, None, QueryMethod::Individual)
            }
            Err(err) => {
                tracing::warn!(
                    project_id = %project.id,
                    process_key = %key,
                    error = %err,
                    "Status query failed"
                );
                failed_result(project, key, &err, QueryMethod::Individual)
            }
        }
    }

    /// Queries every project individually.
    pub async fn query_many(&self, projects: &[Project]) -> Vec<StatusQueryResult> {
        if projects.is_empty() {
            return Vec::new();
        }
        join_all(projects.iter().map(|project| self.query_one(project))).await
    }

    /// Queries with the strategy the project count calls for, falling back to
    /// individual queries when the batch listing fails.
    pub async fn query_many_optimized(&self, projects: &[Project]) -> Vec<StatusQueryResult> {
        if projects.is_empty() {
            return Vec::new();
        }

        match QueryStrategy::for_count(projects.len(), self.batch_threshold) {
            QueryStrategy::Individual => self.query_many(projects).await,
            QueryStrategy::Batch => match self.gateway.list().await {
                Ok(records) => match_records(projects, records),
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        projects = projects.len(),
                        "Batch status query failed; falling back to individual queries"
                    );
                    self.query_many(projects).await
                }
            },
        }
    }

    /// Writes successful results into `projects` and returns one change per
    /// project whose status actually moved.
    pub fn apply(projects: &mut [Project], results: &[StatusQueryResult]) -> Vec<StatusChange> {
        let by_project: HashMap<&str, &StatusQueryResult> = results
            .iter()
            .filter(|result| result.success)
            .map(|result| (result.project_id.as_str(), result))
            .collect();
        let now = chrono::Utc::now().to_rfc3339();

        let mut changes = Vec::new();
        for project in projects.iter_mut() {
            let Some(result) = by_project.get(project.id.as_str()) else {
                continue;
            };
            project.last_synced_at = Some(now.clone());
            if project.status == result.status {
                continue;
            }
            changes.push(StatusChange {
                project_id: project.id.clone(),
                new_status: result.status,
                previous_status: project.status,
                changed_at: now.clone(),
            });
            project.status = result.status;
        }
        changes
    }
}

fn match_records(projects: &[Project], records: Vec<ProcessRecord>) -> Vec<StatusQueryResult> {
    let mut by_name: HashMap<String, Vec<ProcessRecord>> = HashMap::new();
    for record in records {
        by_name.entry(record.name.clone()).or_default().push(record);
    }

    projects
        .iter()
        .map(|project| {
            let key = project.process_key();
            let record = by_name.get(&key).cloned().and_then(pick_record);
            record_result(project, key, record, QueryMethod::Batch)
        })
        .collect()
}

fn record_result(
    project: &Project,
    key: String,
    record: Option<ProcessRecord>,
    method: QueryMethod,
) -> StatusQueryResult {
    let native_status = record.as_ref().and_then(|r| r.status.clone());
    StatusQueryResult {
        project_id: project.id.clone(),
        process_key: key,
        success: true,
        status: normalize(native_status.as_deref()),
        native_status,
        pid: record.and_then(|r| r.pid),
        method,
        error: None,
    }
}

fn failed_result(
    project: &Project,
    key: String,
    err: &SyncError,
    method: QueryMethod,
) -> StatusQueryResult {
    // Unreachable reads as stopped; anything else the supervisor said is an error.
    let status = if err.is_transient() {
        ProjectStatus::Stopped
    } else {
        ProjectStatus::Error
    };
    StatusQueryResult {
        project_id: project.id.clone(),
        process_key: key,
        success: false,
        native_status: None,
        status,
        pid: None,
        method,
        error: Some(err.to_string()),
    }
}
