use std::path::PathBuf;

use indicatif::ProgressBar;
use tokio_util::sync::CancellationToken;

use migr_api::{ApiClient, PendingJob};
use migr_core::config::MigrConfig;
use migr_core::error::MigrError;
use migr_core::models::target::ImportTarget;

use crate::dedupe::filter_unimported;
use crate::engine::BatchScheduler;

/// Everything an import run needs besides its targets.
pub struct ImportContext {
    pub api: ApiClient,
    pub concurrency: usize,
    pub poll_concurrency: usize,
    pub dedupe_concurrency: usize,
    /// Submitted-target log of a previous run, for skipping.
    pub previous_log: Option<PathBuf>,
    pub cancel: CancellationToken,
    pub progress: Option<ProgressBar>,
}

impl ImportContext {
    pub fn from_config(api: ApiClient, config: &MigrConfig) -> Self {
        Self {
            api,
            concurrency: config.effective_concurrency(),
            poll_concurrency: config.poll.concurrency,
            dedupe_concurrency: config.dedupe_concurrency,
            previous_log: None,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }
}

/// Totals of one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Targets in the input.
    pub total: usize,
    /// Targets skipped as already imported.
    pub skipped: usize,
    /// Targets attempted (submitted or failed to submit).
    pub processed: usize,
    /// Targets that got a polling handle.
    pub submitted: usize,
    /// Targets whose submission failed.
    pub failed_targets: usize,
    /// Jobs whose polling failed or gave up.
    pub failed_polls: usize,
    pub succeeded_projects: usize,
    pub failed_projects: usize,
    pub cancelled: bool,
}

impl ImportSummary {
    /// One-line operator summary.
    pub fn summary_line(&self, log_dir: &std::path::Path) -> String {
        format!(
            "{} processed out of {}, {} skipped, see logs at {}",
            self.processed,
            self.total,
            self.skipped,
            log_dir.display()
        )
    }
}

/// Import every target: skip already imported ones, submit the rest in
/// batches, then poll all collected jobs.
///
/// Per-target failures are logged and counted; only a tripped circuit
/// breaker fails the run.
pub async fn run_import(
    targets: Vec<ImportTarget>,
    ctx: &ImportContext,
) -> Result<ImportSummary, MigrError> {
    let total = targets.len();
    let (kept, skipped) =
        filter_unimported(targets, ctx.previous_log.as_deref(), ctx.dedupe_concurrency).await;

    let mut scheduler = BatchScheduler::new(ctx.concurrency).with_cancel(ctx.cancel.clone());
    if let Some(pb) = &ctx.progress {
        scheduler = scheduler.with_progress(pb.clone());
    }

    tracing::info!(
        total,
        skipped,
        concurrency = scheduler.concurrency(),
        "submitting import jobs"
    );
    let api = &ctx.api;
    let report = scheduler
        .run(kept, skipped, |target| async move {
            let handle = api.submit_import(&target).await?;
            Ok::<_, MigrError>(PendingJob {
                org_id: target.org_id,
                handle,
            })
        })
        .await?;

    let submitted = report.outputs.len();
    tracing::info!(submitted, failed = report.failed, "polling import jobs");
    let polled = api.poll_all(report.outputs, ctx.poll_concurrency).await;

    let summary = ImportSummary {
        total,
        skipped,
        processed: report.succeeded + report.failed,
        submitted,
        failed_targets: report.failed,
        failed_polls: polled.failed.len(),
        succeeded_projects: polled.outcome.succeeded.len(),
        failed_projects: polled.outcome.failed.len(),
        cancelled: report.cancelled,
    };
    tracing::info!(
        processed = summary.processed,
        succeeded_projects = summary.succeeded_projects,
        failed_projects = summary.failed_projects,
        "import finished"
    );
    Ok(summary)
}
