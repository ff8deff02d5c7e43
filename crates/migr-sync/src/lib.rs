//! Import and sync orchestration.

pub mod branch;
pub mod dedupe;
pub mod engine;
pub mod import_run;
pub mod sync_run;

pub use engine::{BatchReport, BatchScheduler, CircuitBreaker};
pub use import_run::{run_import, ImportContext, ImportSummary};
pub use sync_run::{run_sync, sync_org, RepoState, SyncOutcome, SyncRunSummary, SyncSettings};
