use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;
use indicatif::ProgressBar;
use tokio_util::sync::CancellationToken;

use migr_core::config::MAX_CONCURRENCY;
use migr_core::error::MigrError;

/// Trips after two consecutive batches that failed entirely.
///
/// A batch only counts when it pushes the cumulative failure count past a
/// new multiple of the batch size.
#[derive(Debug)]
pub struct CircuitBreaker {
    batch_size: usize,
    checkpoints: usize,
    previous_all_failed: bool,
    consecutive: usize,
}

impl CircuitBreaker {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            checkpoints: 0,
            previous_all_failed: false,
            consecutive: 0,
        }
    }

    /// Record a finished batch. Returns `true` when the breaker trips.
    pub fn record_batch(
        &mut self,
        batch_len: usize,
        batch_failures: usize,
        total_failures: usize,
    ) -> bool {
        let all_failed = batch_len > 0 && batch_failures == batch_len;
        if !all_failed {
            self.previous_all_failed = false;
            self.consecutive = 0;
            self.checkpoints = total_failures / self.batch_size;
            return false;
        }

        let checkpoint = total_failures / self.batch_size;
        if checkpoint <= self.checkpoints {
            return false;
        }
        self.checkpoints = checkpoint;
        self.consecutive += 1;
        let trip = self.previous_all_failed;
        self.previous_all_failed = true;
        trip
    }

    pub fn consecutive_failed_batches(&self) -> usize {
        self.consecutive
    }
}

/// Outcome of a scheduler run.
#[derive(Debug)]
pub struct BatchReport<R> {
    /// Results of the items that succeeded, batch by batch.
    pub outputs: Vec<R>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub batches: usize,
    /// Set when cancellation stopped the run before every batch started.
    pub cancelled: bool,
}

impl<R> BatchReport<R> {
    /// Items that were attempted, successfully or not.
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Runs items in sequential batches; items inside a batch run concurrently.
pub struct BatchScheduler {
    concurrency: usize,
    cancel: CancellationToken,
    progress: Option<ProgressBar>,
}

impl BatchScheduler {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `f` over every item. `skipped` only feeds the progress message.
    ///
    /// Per-item errors are counted, never propagated; the only error is
    /// [`MigrError::CircuitOpen`].
    pub async fn run<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        skipped: usize,
        f: F,
    ) -> Result<BatchReport<R>, MigrError>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R, MigrError>>,
    {
        let total = items.len();
        let failures = AtomicUsize::new(0);
        let mut breaker = CircuitBreaker::new(self.concurrency);
        let mut report = BatchReport {
            outputs: Vec::with_capacity(total),
            total,
            succeeded: 0,
            failed: 0,
            batches: 0,
            cancelled: false,
        };

        if let Some(pb) = &self.progress {
            pb.set_length(total as u64);
        }

        let mut remaining = items.into_iter().peekable();
        let mut start = 0usize;
        while remaining.peek().is_some() {
            if self.cancel.is_cancelled() {
                tracing::warn!(done = start, total, "cancelled, not starting further batches");
                report.cancelled = true;
                break;
            }

            let batch: Vec<T> = remaining.by_ref().take(self.concurrency).collect();
            let batch_len = batch.len();
            let end = start + batch_len;
            let message = format!("{} - {end} out of {total} (skipped {skipped})", start + 1);
            tracing::info!("{message}");
            if let Some(pb) = &self.progress {
                pb.set_message(message);
            }

            let before = failures.load(Ordering::SeqCst);
            let results = join_all(batch.into_iter().map(|item| {
                let fut = f(item);
                let failures = &failures;
                async move {
                    let result = fut.await;
                    if let Err(e) = &result {
                        failures.fetch_add(1, Ordering::SeqCst);
                        tracing::debug!("batch item failed: {e}");
                    }
                    result
                }
            }))
            .await;

            for result in results {
                if let Ok(output) = result {
                    report.outputs.push(output);
                    report.succeeded += 1;
                }
            }
            let total_failures = failures.load(Ordering::SeqCst);
            report.failed = total_failures;
            report.batches += 1;
            if let Some(pb) = &self.progress {
                pb.inc(batch_len as u64);
            }

            if breaker.record_batch(batch_len, total_failures - before, total_failures) {
                tracing::error!(
                    failed = total_failures,
                    processed = end,
                    total,
                    "consecutive batches failed entirely, stopping"
                );
                if let Some(pb) = &self.progress {
                    pb.abandon_with_message("stopped: too many failures");
                }
                return Err(MigrError::CircuitOpen {
                    failed: total_failures,
                    consecutive_batches: breaker.consecutive_failed_batches(),
                });
            }
            start = end;
        }

        if let Some(pb) = &self.progress {
            pb.finish_with_message(format!("{} processed, {} failed", report.processed(), report.failed));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn fail_if(pred: impl Fn(u32) -> bool) -> impl Fn(u32) -> std::future::Ready<Result<u32, MigrError>> {
        move |n| {
            std::future::ready(if pred(n) {
                Err(MigrError::Other(format!("item {n}")))
            } else {
                Ok(n)
            })
        }
    }

    #[test]
    fn test_concurrency_is_clamped() {
        assert_eq!(BatchScheduler::new(0).concurrency(), 1);
        assert_eq!(BatchScheduler::new(500).concurrency(), MAX_CONCURRENCY);
        assert_eq!(BatchScheduler::new(7).concurrency(), 7);
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_propagated() {
        let report = BatchScheduler::new(2)
            .run((1..=5).collect(), 0, fail_if(|n| n == 3))
            .await
            .unwrap();
        assert_eq!(report.total, 5);
        assert_eq!(report.processed(), 5);
        assert_eq!(report.failed, 1);
        assert_eq!(report.batches, 3);
        assert_eq!(report.outputs, vec![1, 2, 4, 5]);
    }

    #[tokio::test]
    async fn test_two_failed_batches_trip_the_breaker() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();
        let err = BatchScheduler::new(2)
            .run((1..=10).collect::<Vec<u32>>(), 0, move |n| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err::<u32, _>(MigrError::Other(format!("item {n}"))))
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MigrError::CircuitOpen {
                failed: 4,
                consecutive_batches: 2
            }
        ));
        assert_eq!(started.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_failed_batch_then_good_batch_completes() {
        let report = BatchScheduler::new(2)
            .run((1..=6).collect(), 0, fail_if(|n| n <= 2))
            .await
            .unwrap();
        assert_eq!(report.failed, 2);
        assert_eq!(report.succeeded, 4);
    }

    #[tokio::test]
    async fn test_batches_run_sequentially() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (in_flight_c, peak_c) = (in_flight.clone(), peak.clone());

        BatchScheduler::new(3)
            .run((0..9).collect::<Vec<u32>>(), 0, move |n| {
                let in_flight = in_flight_c.clone();
                let peak = peak_c.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<u32, MigrError>(n)
                }
            })
            .await
            .unwrap();

        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = BatchScheduler::new(2)
            .with_cancel(cancel)
            .run((1..=4).collect(), 0, fail_if(|_| false))
            .await
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.processed(), 0);
    }

    #[test]
    fn test_breaker_needs_a_new_checkpoint() {
        let mut breaker = CircuitBreaker::new(2);
        // One partial failure, then two batches that failed entirely.
        assert!(!breaker.record_batch(2, 1, 1));
        assert!(!breaker.record_batch(2, 2, 3));
        assert!(breaker.record_batch(2, 2, 5));
    }
}
