//! Client for the security platform's import and project endpoints.

pub mod executor;
pub mod import;
pub mod poll;
pub mod projects;

use std::sync::Arc;

use migr_core::config::MigrConfig;
use migr_core::error::MigrError;
use migr_core::models::job::PollingHandle;
use migr_core::models::project::SnykProject;
use migr_core::models::target::ImportTarget;
use migr_log::LogSink;

pub use executor::{RequestExecutor, RetryPolicy};
pub use poll::{PendingJob, PollConfig, PollReport};

/// Platform client bundling the request executor, the run log, and the
/// polling policy.
#[derive(Clone)]
pub struct ApiClient {
    executor: RequestExecutor,
    sink: Arc<dyn LogSink>,
    poll: PollConfig,
}

impl ApiClient {
    pub fn new(executor: RequestExecutor, sink: Arc<dyn LogSink>, poll: PollConfig) -> Self {
        Self {
            executor,
            sink,
            poll,
        }
    }

    pub fn from_config(
        config: &MigrConfig,
        token: &str,
        sink: Arc<dyn LogSink>,
    ) -> Result<Self, MigrError> {
        let executor =
            RequestExecutor::new(&config.api_url, token, RetryPolicy::from(&config.retry))?;
        Ok(Self::new(executor, sink, PollConfig::from(&config.poll)))
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    pub fn sink(&self) -> Arc<dyn LogSink> {
        self.sink.clone()
    }

    pub async fn submit_import(&self, request: &ImportTarget) -> Result<PollingHandle, MigrError> {
        import::submit_import(&self.executor, self.sink.as_ref(), request).await
    }

    pub async fn poll_all(&self, jobs: Vec<PendingJob>, concurrency: usize) -> PollReport {
        poll::poll_all(&self.executor, self.sink.clone(), jobs, self.poll, concurrency).await
    }

    pub async fn list_projects(
        &self,
        org_id: &str,
        origin: Option<&str>,
    ) -> Result<Vec<SnykProject>, MigrError> {
        projects::list_projects(&self.executor, org_id, origin).await
    }

    pub async fn deactivate_project(&self, org_id: &str, project_id: &str) -> Result<(), MigrError> {
        projects::deactivate_project(&self.executor, org_id, project_id).await
    }

    pub async fn update_project_branch(
        &self,
        org_id: &str,
        project_id: &str,
        branch: &str,
    ) -> Result<(), MigrError> {
        projects::update_project_branch(&self.executor, org_id, project_id, branch).await
    }

    pub async fn custom_branch_enabled(&self, org_id: &str) -> Result<bool, MigrError> {
        projects::feature_flag_enabled(&self.executor, org_id, projects::CUSTOM_BRANCH_FLAG).await
    }
}
