//! Append-only, best-effort run logs.
//!
//! Every record is one JSON line in a file chosen by its [`LogCategory`].
//! Appending never fails towards the caller; I/O errors only leave a debug
//! trace.

pub mod category;
pub mod ops;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub use category::LogCategory;

/// Destination for structured run records.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Append one record. Implementations swallow their own failures.
    async fn append(&self, category: LogCategory, record: serde_json::Value);
}

/// Writes each category to `<dir>/<category file>`.
///
/// Concurrent appends to the same file are serialized through a per-file
/// lock and each line goes out in a single `write_all`, so lines never
/// interleave.
pub struct FileLogSink {
    dir: PathBuf,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl FileLogSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, category: &LogCategory) -> PathBuf {
        self.dir.join(category.file_name())
    }

    async fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn write_line(&self, path: &Path, line: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line).await?;
        file.flush().await
    }
}

#[async_trait]
impl LogSink for FileLogSink {
    async fn append(&self, category: LogCategory, record: serde_json::Value) {
        let path = self.path_for(&category);
        let mut line = match serde_json::to_vec(&record) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(file = %path.display(), "failed to encode log record: {e}");
                return;
            }
        };
        line.push(b'\n');

        let lock = self.lock_for(&path).await;
        let _guard = lock.lock().await;
        if let Err(e) = self.write_line(&path, &line).await {
            tracing::debug!(file = %path.display(), "failed to append log record: {e}");
        }
    }
}

/// Collects records in memory. Used by tests and dry runs.
#[derive(Default)]
pub struct MemorySink {
    records: std::sync::Mutex<Vec<(LogCategory, serde_json::Value)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records appended under `category`, in order.
    pub fn records(&self, category: &LogCategory) -> Vec<serde_json::Value> {
        match self.records.lock() {
            Ok(records) => records
                .iter()
                .filter(|(c, _)| c == category)
                .map(|(_, r)| r.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn append(&self, category: LogCategory, record: serde_json::Value) {
        if let Ok(mut records) = self.records.lock() {
            records.push((category, record));
        }
    }
}

/// Read a previous run's log. A missing or unreadable file yields `None`.
pub async fn load_previous_import_log(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Some(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(file = %path.display(), "no previous import log, nothing to skip");
            None
        }
        Err(e) => {
            tracing::warn!(file = %path.display(), "could not read previous import log: {e}");
            None
        }
    }
}
