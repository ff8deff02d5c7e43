use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use migr_core::error::MigrError;
use migr_core::models::job::{PollOutcome, PollingHandle, ProjectOutcome};
use migr_core::models::project::SnykProject;
use migr_core::models::sync_state::SyncRecord;
use migr_core::models::target::{ImportTarget, Target, TargetId};

use crate::{LogCategory, LogSink};

// ── Record shapes ──

/// One line of the submitted-target log. Readers must ignore unknown fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedTargetRecord {
    #[serde(default)]
    pub target: Option<Target>,
    #[serde(default)]
    pub target_id: Option<TargetId>,
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(default)]
    pub integration_id: Option<String>,
    #[serde(default)]
    pub polling_url: Option<PollingHandle>,
    #[serde(default)]
    pub logged_at: Option<DateTime<Utc>>,
}

impl SubmittedTargetRecord {
    /// The stored TargetId, or one recomputed from the stored target.
    pub fn resolved_target_id(&self) -> Option<TargetId> {
        if let Some(id) = &self.target_id {
            return Some(id.clone());
        }
        match (&self.org_id, &self.integration_id, &self.target) {
            (Some(org), Some(integration), Some(target)) => {
                Some(TargetId::new(org, integration, target))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct FailedImportRecord<'a> {
    target: &'a Target,
    target_id: String,
    org_id: &'a str,
    integration_id: &'a str,
    status: Option<u16>,
    request_id: Option<&'a str>,
    message: String,
    logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct FailedPollRecord<'a> {
    polling_url: &'a str,
    org_id: &'a str,
    message: String,
    logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectRecord<'a> {
    org_id: &'a str,
    polling_url: &'a str,
    #[serde(flatten)]
    outcome: &'a ProjectOutcome,
    logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobResultRecord<'a> {
    org_id: &'a str,
    polling_url: &'a str,
    status: &'a str,
    succeeded: usize,
    failed: usize,
    logged_at: DateTime<Utc>,
}

/// Kind of change applied to a monitored project during sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
    Branch,
    Deactivate,
    Import,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectUpdateRecord<'a> {
    org_id: &'a str,
    project_id: Option<&'a str>,
    project_name: &'a str,
    action: UpdateAction,
    from: Option<&'a str>,
    to: Option<&'a str>,
    dry_run: bool,
    logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct FailedUpdateRecord<'a> {
    org_id: &'a str,
    project_id: Option<&'a str>,
    project_name: &'a str,
    action: UpdateAction,
    status: Option<u16>,
    message: String,
    logged_at: DateTime<Utc>,
}

// ── Helpers ──

async fn append<T: Serialize>(sink: &dyn LogSink, category: LogCategory, record: &T) {
    match serde_json::to_value(record) {
        Ok(value) => sink.append(category, value).await,
        Err(e) => tracing::debug!("failed to encode log record: {e}"),
    }
}

// ── Import ──

pub async fn log_submitted(
    sink: &dyn LogSink,
    request: &ImportTarget,
    target_id: &TargetId,
    handle: &PollingHandle,
) {
    let record = SubmittedTargetRecord {
        target: Some(request.target.clone()),
        target_id: Some(target_id.clone()),
        org_id: Some(request.org_id.clone()),
        integration_id: Some(request.integration_id.clone()),
        polling_url: Some(handle.clone()),
        logged_at: Some(Utc::now()),
    };
    append(sink, LogCategory::SubmittedTargets, &record).await;
}

pub async fn log_failed_import(sink: &dyn LogSink, request: &ImportTarget, error: &MigrError) {
    let record = FailedImportRecord {
        target: &request.target,
        target_id: request.target_id().0,
        org_id: &request.org_id,
        integration_id: &request.integration_id,
        status: error.status(),
        request_id: error.request_id(),
        message: error.to_string(),
        logged_at: Utc::now(),
    };
    append(sink, LogCategory::FailedImports, &record).await;
}

pub async fn log_failed_poll(
    sink: &dyn LogSink,
    org_id: &str,
    handle: &PollingHandle,
    error: &MigrError,
) {
    let record = FailedPollRecord {
        polling_url: handle.as_str(),
        org_id,
        message: error.to_string(),
        logged_at: Utc::now(),
    };
    append(sink, LogCategory::FailedPolls, &record).await;
}

/// Log one completed job: a summary line plus one line per manifest.
pub async fn log_job_result(
    sink: &dyn LogSink,
    org_id: &str,
    handle: &PollingHandle,
    outcome: &PollOutcome,
) {
    let summary = JobResultRecord {
        org_id,
        polling_url: handle.as_str(),
        status: "complete",
        succeeded: outcome.succeeded.len(),
        failed: outcome.failed.len(),
        logged_at: Utc::now(),
    };
    append(
        sink,
        LogCategory::JobResults {
            org_id: org_id.to_string(),
        },
        &summary,
    )
    .await;

    for project in &outcome.succeeded {
        let record = ProjectRecord {
            org_id,
            polling_url: handle.as_str(),
            outcome: project,
            logged_at: Utc::now(),
        };
        append(
            sink,
            LogCategory::ImportedProjects {
                org_id: org_id.to_string(),
            },
            &record,
        )
        .await;
    }
    for project in &outcome.failed {
        let record = ProjectRecord {
            org_id,
            polling_url: handle.as_str(),
            outcome: project,
            logged_at: Utc::now(),
        };
        append(
            sink,
            LogCategory::FailedProjects {
                org_id: org_id.to_string(),
            },
            &record,
        )
        .await;
    }
}

// ── Sync ──

pub async fn log_project_update(
    sink: &dyn LogSink,
    org_id: &str,
    project: &SnykProject,
    action: UpdateAction,
    to: Option<&str>,
    dry_run: bool,
) {
    let record = ProjectUpdateRecord {
        org_id,
        project_id: Some(&project.id),
        project_name: &project.name,
        action,
        from: project.branch.as_deref(),
        to,
        dry_run,
        logged_at: Utc::now(),
    };
    append(
        sink,
        LogCategory::UpdatedProjects {
            org_id: org_id.to_string(),
        },
        &record,
    )
    .await;
}

/// Log a manifest queued for import by sync (no project exists yet).
pub async fn log_manifest_import(
    sink: &dyn LogSink,
    org_id: &str,
    repo_full_name: &str,
    path: &str,
    dry_run: bool,
) {
    let name = format!("{repo_full_name}:{path}");
    let record = ProjectUpdateRecord {
        org_id,
        project_id: None,
        project_name: &name,
        action: UpdateAction::Import,
        from: None,
        to: Some(path),
        dry_run,
        logged_at: Utc::now(),
    };
    append(
        sink,
        LogCategory::UpdatedProjects {
            org_id: org_id.to_string(),
        },
        &record,
    )
    .await;
}

pub async fn log_failed_update(
    sink: &dyn LogSink,
    org_id: &str,
    project: &SnykProject,
    action: UpdateAction,
    error: &MigrError,
) {
    let record = FailedUpdateRecord {
        org_id,
        project_id: Some(&project.id),
        project_name: &project.name,
        action,
        status: error.status(),
        message: error.to_string(),
        logged_at: Utc::now(),
    };
    append(
        sink,
        LogCategory::FailedProjectUpdates {
            org_id: org_id.to_string(),
        },
        &record,
    )
    .await;
}

pub async fn log_sync_record(sink: &dyn LogSink, record: &SyncRecord) {
    append(
        sink,
        LogCategory::JobResults {
            org_id: record.org_id.clone(),
        },
        record,
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySink;

    #[tokio::test]
    async fn test_submitted_record_roundtrip() {
        let sink = MemorySink::new();
        let request = ImportTarget::new("org", "int", Target::repo("snyk", "cli", Some("main")));
        let handle = PollingHandle("https://api/import/1".to_string());
        log_submitted(&sink, &request, &request.target_id(), &handle).await;

        let records = sink.records(&LogCategory::SubmittedTargets);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["targetId"], "org:int:cli:snyk:main");
        assert_eq!(records[0]["pollingUrl"], "https://api/import/1");

        let parsed: SubmittedTargetRecord = serde_json::from_value(records[0].clone()).unwrap();
        assert_eq!(
            parsed.resolved_target_id().unwrap().as_str(),
            "org:int:cli:snyk:main"
        );
    }

    #[test]
    fn test_record_without_target_id_is_recomputed() {
        let parsed: SubmittedTargetRecord = serde_json::from_str(
            r#"{"target":{"id":7},"orgId":"o","integrationId":"i","unknown":[1,2]}"#,
        )
        .unwrap();
        assert_eq!(parsed.resolved_target_id().unwrap().as_str(), "o:i:7");
    }

    #[tokio::test]
    async fn test_job_result_splits_files() {
        let sink = MemorySink::new();
        let outcome = PollOutcome::from_outcomes(vec![
            ProjectOutcome {
                success: true,
                project_url: Some("https://app/p/1".to_string()),
                target_file: "package.json".to_string(),
                user_message: None,
            },
            ProjectOutcome {
                success: false,
                project_url: None,
                target_file: "pom.xml".to_string(),
                user_message: Some("bad pom".to_string()),
            },
        ]);
        let handle = PollingHandle("h".to_string());
        log_job_result(&sink, "org", &handle, &outcome).await;

        let imported = sink.records(&LogCategory::ImportedProjects {
            org_id: "org".to_string(),
        });
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0]["targetFile"], "package.json");
        let failed = sink.records(&LogCategory::FailedProjects {
            org_id: "org".to_string(),
        });
        assert_eq!(failed[0]["userMessage"], "bad pom");
    }
}
