use reqwest::Method;
use serde_json::{json, Value};

use migr_core::error::MigrError;
use migr_core::models::job::PollingHandle;
use migr_core::models::target::ImportTarget;
use migr_log::{ops, LogSink};

use crate::executor::{ApiResponse, RequestExecutor};

/// Status the import endpoint answers with once a job is queued.
const IMPORT_ACCEPTED: u16 = 201;

pub fn import_path(org_id: &str, integration_id: &str) -> String {
    format!("org/{org_id}/integrations/{integration_id}/import")
}

/// Request body for one import: the target plus optional file list and
/// exclusion globs. Org and integration travel in the path.
pub fn import_body(request: &ImportTarget) -> Value {
    let mut body = json!({ "target": request.target });
    if let Some(files) = &request.files {
        body["files"] = json!(files);
    }
    if let Some(globs) = request.exclusion_globs.as_deref().filter(|g| !g.is_empty()) {
        body["exclusionGlobs"] = json!(globs);
    }
    body
}

/// Pull the polling handle out of a submission response.
///
/// Preference order: the `Location` header, a `location`/`pollingUrl` body
/// field, then a bare job `id` turned into the job's status path.
pub fn extract_handle(
    response: &ApiResponse,
    org_id: &str,
    integration_id: &str,
) -> Option<PollingHandle> {
    if let Some(location) = response.location.as_deref().filter(|l| !l.is_empty()) {
        return Some(PollingHandle(location.to_string()));
    }
    for key in ["location", "pollingUrl"] {
        if let Some(url) = response.body.get(key).and_then(Value::as_str) {
            if !url.is_empty() {
                return Some(PollingHandle(url.to_string()));
            }
        }
    }
    let id = match response.body.get("id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return None,
    };
    Some(PollingHandle(format!(
        "{}/{id}",
        import_path(org_id, integration_id)
    )))
}

/// Submit one target for import.
///
/// Success is logged to the submitted-targets log; any failure is logged to
/// the failed-imports log and returned wrapped in [`MigrError::ImportFailed`].
pub async fn submit_import(
    executor: &RequestExecutor,
    sink: &dyn LogSink,
    request: &ImportTarget,
) -> Result<PollingHandle, MigrError> {
    let target_id = request.target_id();
    match submit_once(executor, request).await {
        Ok(handle) => {
            tracing::debug!(target_id = %target_id, handle = %handle, "import submitted");
            ops::log_submitted(sink, request, &target_id, &handle).await;
            Ok(handle)
        }
        Err(e) => {
            tracing::warn!(target_id = %target_id, "import submission failed: {e}");
            ops::log_failed_import(sink, request, &e).await;
            Err(MigrError::ImportFailed {
                target_id: target_id.0,
                source: Box::new(e),
            })
        }
    }
}

async fn submit_once(
    executor: &RequestExecutor,
    request: &ImportTarget,
) -> Result<PollingHandle, MigrError> {
    let path = import_path(&request.org_id, &request.integration_id);
    let response = executor
        .execute(Method::POST, &path, Some(&import_body(request)))
        .await?;

    if response.status != IMPORT_ACCEPTED {
        return Err(MigrError::Api {
            status: response.status,
            message: format!("expected {IMPORT_ACCEPTED} from import, got {}", response.status),
            request_id: response.request_id,
        });
    }

    extract_handle(&response, &request.org_id, &request.integration_id).ok_or_else(|| {
        MigrError::Api {
            status: response.status,
            message: "import accepted without a polling location".to_string(),
            request_id: response.request_id.clone(),
        }
    })
}
