/// File names of the append-only run logs.
pub const SUBMITTED_TARGETS_LOG: &str = "imported-targets.log";
pub const FAILED_IMPORTS_LOG: &str = "failed-imports.log";
pub const FAILED_POLLS_LOG: &str = "failed-polls.log";

const IMPORTED_PROJECTS_SUFFIX: &str = "imported-projects.log";
const FAILED_PROJECTS_SUFFIX: &str = "failed-projects.log";
const JOB_RESULTS_SUFFIX: &str = "import-job-results.log";
const UPDATED_PROJECTS_SUFFIX: &str = "updated-projects.log";
const FAILED_UPDATES_SUFFIX: &str = "failed-project-updates.log";

/// A log file category. Per-org categories get one file per org.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogCategory {
    SubmittedTargets,
    FailedImports,
    FailedPolls,
    ImportedProjects { org_id: String },
    FailedProjects { org_id: String },
    JobResults { org_id: String },
    UpdatedProjects { org_id: String },
    FailedProjectUpdates { org_id: String },
}

impl LogCategory {
    pub fn file_name(&self) -> String {
        match self {
            LogCategory::SubmittedTargets => SUBMITTED_TARGETS_LOG.to_string(),
            LogCategory::FailedImports => FAILED_IMPORTS_LOG.to_string(),
            LogCategory::FailedPolls => FAILED_POLLS_LOG.to_string(),
            LogCategory::ImportedProjects { org_id } => per_org(org_id, IMPORTED_PROJECTS_SUFFIX),
            LogCategory::FailedProjects { org_id } => per_org(org_id, FAILED_PROJECTS_SUFFIX),
            LogCategory::JobResults { org_id } => per_org(org_id, JOB_RESULTS_SUFFIX),
            LogCategory::UpdatedProjects { org_id } => per_org(org_id, UPDATED_PROJECTS_SUFFIX),
            LogCategory::FailedProjectUpdates { org_id } => {
                per_org(org_id, FAILED_UPDATES_SUFFIX)
            }
        }
    }
}

// Org ids are uuids in practice; anything path-like is flattened.
fn per_org(org_id: &str, suffix: &str) -> String {
    let safe: String = org_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{safe}.{suffix}")
}
