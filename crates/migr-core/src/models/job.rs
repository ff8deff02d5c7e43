use serde::{Deserialize, Serialize};

/// Opaque reference to a job's status resource, as returned by submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PollingHandle(pub String);

impl PollingHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PollingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status reported by the platform for an import job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Complete,
    /// Anything else the platform reports; treated as not finished.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Complete => write!(f, "complete"),
            JobStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of importing one manifest file within a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_url: Option<String>,
    #[serde(default)]
    pub target_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
}

/// Per-manifest outcomes of one completed job, partitioned by success.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollOutcome {
    pub succeeded: Vec<ProjectOutcome>,
    pub failed: Vec<ProjectOutcome>,
}

impl PollOutcome {
    pub fn from_outcomes(outcomes: Vec<ProjectOutcome>) -> Self {
        let (succeeded, failed) = outcomes.into_iter().partition(|o| o.success);
        Self { succeeded, failed }
    }

    pub fn merge(&mut self, other: PollOutcome) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_status_is_not_complete() {
        let status: JobStatus = serde_json::from_str("\"queued\"").unwrap();
        assert_eq!(status, JobStatus::Unknown);
        let status: JobStatus = serde_json::from_str("\"complete\"").unwrap();
        assert_eq!(status, JobStatus::Complete);
    }

    #[test]
    fn test_poll_outcome_partitions_by_success() {
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
                user_message: Some("could not parse".to_string()),
            },
        ]);
        assert_eq!(outcome.succeeded.len(), 1);
        assert_eq!(outcome.failed[0].target_file, "pom.xml");
    }
}
