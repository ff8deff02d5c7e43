use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use migr_core::config::PollSettings;
use migr_core::error::MigrError;
use migr_core::models::job::{JobStatus, PollOutcome, PollingHandle, ProjectOutcome};
use migr_log::{ops, LogSink};

use crate::executor::RequestExecutor;

/// How long and how often to poll a single job.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub interval: Duration,
    /// Wall-clock ceiling across all attempts, if any.
    pub max_wait: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::from(&PollSettings::default())
    }
}

impl From<&PollSettings> for PollConfig {
    fn from(settings: &PollSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            interval: settings.interval(),
            max_wait: settings.max_wait(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JobStatusBody {
    status: JobStatus,
    #[serde(default)]
    logs: Vec<JobLog>,
}

#[derive(Debug, Deserialize)]
struct JobLog {
    #[serde(default)]
    projects: Vec<ProjectOutcome>,
}

/// Parse a job status document into its status and per-manifest outcomes.
pub fn parse_job_status(body: &serde_json::Value) -> Result<(JobStatus, PollOutcome), MigrError> {
    let parsed: JobStatusBody = serde_json::from_value(body.clone())
        .map_err(|e| MigrError::Serialization(format!("unexpected job status document: {e}")))?;
    let outcomes = parsed.logs.into_iter().flat_map(|log| log.projects).collect();
    Ok((parsed.status, PollOutcome::from_outcomes(outcomes)))
}

/// Poll one job until it reports `complete`.
///
/// Terminates after `max_attempts` status reads or once `max_wait` has
/// elapsed, whichever comes first.
pub async fn poll_until_done(
    executor: &RequestExecutor,
    handle: &PollingHandle,
    config: &PollConfig,
) -> Result<PollOutcome, MigrError> {
    let started = Instant::now();
    let max_attempts = config.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let response = executor.execute(Method::GET, handle.as_str(), None).await?;
        let (status, outcome) = parse_job_status(&response.body)?;

        if status == JobStatus::Complete {
            tracing::debug!(
                handle = %handle,
                attempt,
                succeeded = outcome.succeeded.len(),
                failed = outcome.failed.len(),
                "import job complete"
            );
            return Ok(outcome);
        }

        tracing::debug!(handle = %handle, attempt, %status, "import job not finished");
        if attempt == max_attempts {
            break;
        }
        if let Some(max_wait) = config.max_wait {
            if started.elapsed() + config.interval > max_wait {
                tracing::warn!(handle = %handle, attempt, "giving up after {max_wait:?}");
                return Err(MigrError::PollExhausted {
                    handle: handle.0.clone(),
                    attempts: attempt,
                });
            }
        }
        tokio::time::sleep(config.interval).await;
    }

    Err(MigrError::PollExhausted {
        handle: handle.0.clone(),
        attempts: max_attempts,
    })
}

/// A job to poll: the org it belongs to and its handle.
#[derive(Debug, Clone)]
pub struct PendingJob {
    pub org_id: String,
    pub handle: PollingHandle,
}

/// Aggregate of polling many jobs.
#[derive(Debug, Default)]
pub struct PollReport {
    pub outcome: PollOutcome,
    pub completed: usize,
    pub failed: Vec<PollingHandle>,
}

/// Poll every job with at most `concurrency` in flight.
///
/// Each completed job is logged per manifest; a job that fails or exhausts
/// its attempts is logged to the failed-polls log and skipped.
pub async fn poll_all(
    executor: &RequestExecutor,
    sink: Arc<dyn LogSink>,
    jobs: Vec<PendingJob>,
    config: PollConfig,
    concurrency: usize,
) -> PollReport {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut set = JoinSet::new();

    for job in jobs {
        let executor = executor.clone();
        let sink = sink.clone();
        let semaphore = semaphore.clone();
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            match poll_until_done(&executor, &job.handle, &config).await {
                Ok(outcome) => {
                    ops::log_job_result(sink.as_ref(), &job.org_id, &job.handle, &outcome).await;
                    Some(Ok(outcome))
                }
                Err(e) => {
                    tracing::warn!(handle = %job.handle, "polling failed: {e}");
                    ops::log_failed_poll(sink.as_ref(), &job.org_id, &job.handle, &e).await;
                    Some(Err(job.handle))
                }
            }
        });
    }

    let mut report = PollReport::default();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Some(Ok(outcome))) => {
                report.completed += 1;
                report.outcome.merge(outcome);
            }
            Ok(Some(Err(handle))) => report.failed.push(handle),
            Ok(None) => {}
            Err(e) => tracing::error!("poll task panicked: {e}"),
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::RetryPolicy;
    use migr_log::{LogCategory, MemorySink};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn executor(server: &MockServer) -> RequestExecutor {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
        };
        RequestExecutor::new(&server.uri(), "t", policy).unwrap()
    }

    fn fast_config(max_attempts: u32) -> PollConfig {
        PollConfig {
            max_attempts,
            interval: Duration::from_millis(5),
            max_wait: None,
        }
    }

    fn complete_body() -> serde_json::Value {
        json!({
            "id": "job",
            "status": "complete",
            "logs": [{
                "name": "snyk/cli",
                "projects": [
                    {"targetFile": "package.json", "success": true, "projectUrl": "https://app/p/1"},
                    {"targetFile": "Gemfile.lock", "success": false, "userMessage": "parse error"}
                ]
            }]
        })
    }

    #[test]
    fn test_parse_job_status() {
        let (status, outcome) = parse_job_status(&complete_body()).unwrap();
        assert_eq!(status, JobStatus::Complete);
        assert_eq!(outcome.succeeded.len(), 1);
        assert_eq!(outcome.failed[0].target_file, "Gemfile.lock");

        let (status, _) = parse_job_status(&json!({"status": "failed"})).unwrap();
        assert_eq!(status, JobStatus::Unknown);

        assert!(parse_job_status(&json!({"logs": []})).is_err());
    }

    #[tokio::test]
    async fn test_pending_then_complete() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/job/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "pending"})))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/job/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(complete_body()))
            .expect(1)
            .mount(&server)
            .await;

        let handle = PollingHandle(format!("{}/job/1", server.uri()));
        let outcome = poll_until_done(&executor(&server), &handle, &fast_config(10))
            .await
            .unwrap();
        assert_eq!(outcome.succeeded.len(), 1);
        assert_eq!(outcome.failed.len(), 1);
    }

    #[tokio::test]
    async fn test_never_completes_exhausts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "pending"})))
            .expect(3)
            .mount(&server)
            .await;

        let handle = PollingHandle("job/2".to_string());
        let err = poll_until_done(&executor(&server), &handle, &fast_config(3))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrError::PollExhausted { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_wall_clock_ceiling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "pending"})))
            .mount(&server)
            .await;

        let config = PollConfig {
            max_attempts: 1000,
            interval: Duration::from_millis(50),
            max_wait: Some(Duration::from_millis(120)),
        };
        let handle = PollingHandle("job/3".to_string());
        let err = poll_until_done(&executor(&server), &handle, &config)
            .await
            .unwrap_err();
        match err {
            MigrError::PollExhausted { attempts, .. } => assert!(attempts < 10),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_poll_all_skips_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/job/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(complete_body()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/job/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let sink = Arc::new(MemorySink::new());
        let jobs = vec![
            PendingJob {
                org_id: "org".to_string(),
                handle: PollingHandle("job/ok".to_string()),
            },
            PendingJob {
                org_id: "org".to_string(),
                handle: PollingHandle("job/gone".to_string()),
            },
        ];
        let report = poll_all(&executor(&server), sink.clone(), jobs, fast_config(3), 10).await;

        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, vec![PollingHandle("job/gone".to_string())]);
        assert_eq!(report.outcome.succeeded.len(), 1);
        assert_eq!(sink.records(&LogCategory::FailedPolls).len(), 1);
        assert_eq!(
            sink.records(&LogCategory::ImportedProjects {
                org_id: "org".to_string()
            })
            .len(),
            1
        );
    }
}
