use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a sync operation on one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    PartialSuccess,
    Failed,
    Skipped,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Success => write!(f, "success"),
            SyncStatus::PartialSuccess => write!(f, "partial_success"),
            SyncStatus::Failed => write!(f, "failed"),
            SyncStatus::Skipped => write!(f, "skipped"),
        }
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(SyncStatus::Success),
            "partial_success" => Ok(SyncStatus::PartialSuccess),
            "failed" => Ok(SyncStatus::Failed),
            "skipped" => Ok(SyncStatus::Skipped),
            _ => Err(format!("unknown sync status: {s}")),
        }
    }
}

/// Record of a completed sync of one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRecord {
    pub id: Uuid,
    pub org_id: String,
    /// `<owner>/<repo>` of the synced target.
    pub target: String,
    pub branch_updated: u32,
    pub projects_imported: u32,
    pub projects_deactivated: u32,
    pub status: SyncStatus,
    pub dry_run: bool,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncRecord {
    pub fn new(org_id: &str, target: &str, dry_run: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            org_id: org_id.to_string(),
            target: target.to_string(),
            branch_updated: 0,
            projects_imported: 0,
            projects_deactivated: 0,
            status: SyncStatus::Success,
            dry_run,
            errors: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    /// Close the record, deriving the status from the collected errors and
    /// the change counts. A clean run that changed nothing is `Skipped`.
    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
        let changed = self.branch_updated + self.projects_imported + self.projects_deactivated;
        self.status = match (self.errors.is_empty(), changed) {
            (true, 0) => SyncStatus::Skipped,
            (true, _) => SyncStatus::Success,
            (false, 0) => SyncStatus::Failed,
            (false, _) => SyncStatus::PartialSuccess,
        };
    }
}
