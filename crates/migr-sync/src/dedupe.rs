use std::collections::HashSet;
use std::path::Path;

use migr_core::models::target::ImportTarget;
use migr_log::ops::SubmittedTargetRecord;

/// Upper bound on blocking workers parsing a previous log.
pub const MAX_PARSE_WORKERS: usize = 150;

/// TargetIds found in one chunk of log lines, plus the malformed line count.
fn parse_chunk(lines: Vec<String>) -> (HashSet<String>, usize) {
    let mut ids = HashSet::new();
    let mut malformed = 0;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<SubmittedTargetRecord>(line) {
            Ok(record) => match record.resolved_target_id() {
                Some(id) => {
                    ids.insert(id.0);
                }
                None => malformed += 1,
            },
            Err(e) => {
                tracing::debug!("skipping malformed log line: {e}");
                malformed += 1;
            }
        }
    }
    (ids, malformed)
}

/// Collect the TargetIds recorded in a submitted-target log.
///
/// Lines are parsed in chunks across at most `concurrency` blocking workers.
pub async fn imported_target_ids(content: String, concurrency: usize) -> HashSet<String> {
    let lines: Vec<String> = content.lines().map(str::to_string).collect();
    if lines.is_empty() {
        return HashSet::new();
    }
    let workers = concurrency.clamp(1, MAX_PARSE_WORKERS);
    let chunk_size = lines.len().div_ceil(workers);

    let mut handles = Vec::new();
    let mut lines = lines.into_iter().peekable();
    while lines.peek().is_some() {
        let chunk: Vec<String> = lines.by_ref().take(chunk_size).collect();
        handles.push(tokio::task::spawn_blocking(move || parse_chunk(chunk)));
    }

    let mut ids = HashSet::new();
    let mut malformed = 0;
    for handle in handles {
        match handle.await {
            Ok((chunk_ids, chunk_malformed)) => {
                ids.extend(chunk_ids);
                malformed += chunk_malformed;
            }
            Err(e) => tracing::warn!("log parsing worker failed: {e}"),
        }
    }
    if malformed > 0 {
        tracing::warn!(malformed, "ignored unreadable lines in previous import log");
    }
    ids
}

/// Drop targets already submitted in a previous run.
///
/// Returns the kept targets in input order and the number skipped. A
/// missing or unreadable log skips nothing.
pub async fn filter_unimported(
    targets: Vec<ImportTarget>,
    import_log: Option<&Path>,
    concurrency: usize,
) -> (Vec<ImportTarget>, usize) {
    let Some(path) = import_log else {
        return (targets, 0);
    };
    let Some(content) = migr_log::load_previous_import_log(path).await else {
        return (targets, 0);
    };

    let imported = imported_target_ids(content, concurrency).await;
    let before = targets.len();
    let kept: Vec<ImportTarget> = targets
        .into_iter()
        .filter(|t| !imported.contains(t.target_id().as_str()))
        .collect();
    let skipped = before - kept.len();
    tracing::info!(
        skipped,
        remaining = kept.len(),
        log = %path.display(),
        "skipping targets already imported"
    );
    (kept, skipped)
}
