use migr_api::ApiClient;
use migr_core::error::MigrError;
use migr_core::models::project::SnykProject;
use migr_log::ops::{self, UpdateAction};

/// What to do about a project's monitored branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchDrift {
    /// The host did not report a default branch.
    NoDefault,
    UpToDate,
    Changed { from: Option<String>, to: String },
}

pub fn detect_branch_drift(project: &SnykProject, default_branch: &str) -> BranchDrift {
    if default_branch.is_empty() {
        return BranchDrift::NoDefault;
    }
    if project.branch.as_deref() == Some(default_branch) {
        return BranchDrift::UpToDate;
    }
    BranchDrift::Changed {
        from: project.branch.clone(),
        to: default_branch.to_string(),
    }
}

/// Result of checking one project's branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchUpdate {
    pub project_id: String,
    pub from: Option<String>,
    pub to: String,
    /// The branch changed, or would change in a dry run.
    pub updated: bool,
    pub dry_run: bool,
}

/// Point a project at the repo's default branch if it drifted.
pub async fn update_branch_if_drifted(
    api: &ApiClient,
    org_id: &str,
    project: &SnykProject,
    default_branch: &str,
    dry_run: bool,
) -> Result<BranchUpdate, MigrError> {
    let mut update = BranchUpdate {
        project_id: project.id.clone(),
        from: project.branch.clone(),
        to: default_branch.to_string(),
        updated: false,
        dry_run,
    };

    let to = match detect_branch_drift(project, default_branch) {
        BranchDrift::NoDefault => {
            tracing::debug!(project = %project.name, "no default branch reported, leaving as is");
            return Ok(update);
        }
        BranchDrift::UpToDate => return Ok(update),
        BranchDrift::Changed { to, .. } => to,
    };

    if !dry_run {
        if let Err(e) = api
            .update_project_branch(org_id, &project.id, &to)
            .await
        {
            ops::log_failed_update(api.sink().as_ref(), org_id, project, UpdateAction::Branch, &e)
                .await;
            return Err(e);
        }
    }
    tracing::info!(
        project = %project.name,
        from = project.branch.as_deref().unwrap_or("-"),
        to = %to,
        dry_run,
        "branch updated"
    );
    ops::log_project_update(
        api.sink().as_ref(),
        org_id,
        project,
        UpdateAction::Branch,
        Some(&to),
        dry_run,
    )
    .await;
    update.updated = true;
    Ok(update)
}
