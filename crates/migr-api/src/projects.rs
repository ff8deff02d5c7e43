use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};

use migr_core::error::MigrError;
use migr_core::models::project::SnykProject;

use crate::executor::RequestExecutor;

/// Feature flag that, when on, lets users monitor non-default branches.
pub const CUSTOM_BRANCH_FLAG: &str = "customBranch";

#[derive(Debug, Deserialize)]
struct ProjectList {
    #[serde(default)]
    projects: Vec<SnykProject>,
}

/// List projects of an org, optionally narrowed to one origin.
pub async fn list_projects(
    executor: &RequestExecutor,
    org_id: &str,
    origin: Option<&str>,
) -> Result<Vec<SnykProject>, MigrError> {
    let mut filters = json!({});
    if let Some(origin) = origin {
        filters["origin"] = json!(origin);
    }
    let response = executor
        .execute(
            Method::POST,
            &format!("org/{org_id}/projects"),
            Some(&json!({ "filters": filters })),
        )
        .await?;
    let list: ProjectList = serde_json::from_value(response.body)?;
    tracing::debug!(org_id, count = list.projects.len(), "listed projects");
    Ok(list.projects)
}

pub async fn deactivate_project(
    executor: &RequestExecutor,
    org_id: &str,
    project_id: &str,
) -> Result<(), MigrError> {
    executor
        .execute(
            Method::POST,
            &format!("org/{org_id}/project/{project_id}/deactivate"),
            None,
        )
        .await?;
    tracing::debug!(org_id, project_id, "project deactivated");
    Ok(())
}

pub async fn update_project_branch(
    executor: &RequestExecutor,
    org_id: &str,
    project_id: &str,
    branch: &str,
) -> Result<(), MigrError> {
    executor
        .execute(
            Method::PUT,
            &format!("org/{org_id}/project/{project_id}"),
            Some(&json!({ "branch": branch })),
        )
        .await?;
    tracing::debug!(org_id, project_id, branch, "project branch updated");
    Ok(())
}

/// Whether a feature flag is on for an org. A 403 means "off".
pub async fn feature_flag_enabled(
    executor: &RequestExecutor,
    org_id: &str,
    flag: &str,
) -> Result<bool, MigrError> {
    match executor
        .execute(Method::GET, &format!("org/{org_id}/featureflags/{flag}"), None)
        .await
    {
        Ok(response) => Ok(response.body.get("ok").and_then(Value::as_bool).unwrap_or(false)),
        Err(e) if e.status() == Some(403) => Ok(false),
        Err(e) => Err(e),
    }
}
