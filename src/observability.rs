//! Progress counters and the periodic status line

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::humanize::HumanDuration;

/// Shared run totals, updated by every job without locking
#[derive(Debug, Default)]
pub struct Progress {
    keys_found: AtomicU64,
    jobs_started: AtomicUsize,
    jobs_completed: AtomicUsize,
    jobs_failed: AtomicUsize,
    jobs_interrupted: AtomicUsize,
    jobs_active: AtomicUsize,
    peak_active: AtomicUsize,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_found(&self) {
        self.keys_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_started(&self) {
        self.jobs_started.fetch_add(1, Ordering::Relaxed);
        let active = self.jobs_active.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_active.fetch_max(active, Ordering::Relaxed);
        tracing::trace!(active, "Job started");
    }

    /// A sweep ended, successfully or not
    pub fn job_completed(&self, failed: bool) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.jobs_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn job_interrupted(&self) {
        self.jobs_interrupted.fetch_add(1, Ordering::Relaxed);
        self.jobs_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            keys_found: self.keys_found.load(Ordering::Relaxed),
            jobs_started: self.jobs_started.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_interrupted: self.jobs_interrupted.load(Ordering::Relaxed),
            jobs_active: self.jobs_active.load(Ordering::Relaxed),
            peak_active: self.peak_active.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub keys_found: u64,
    pub jobs_started: usize,
    pub jobs_completed: usize,
    pub jobs_failed: usize,
    pub jobs_interrupted: usize,
    pub jobs_active: usize,
    /// Highest number of simultaneously active jobs seen so far
    pub peak_active: usize,
}

impl ProgressSnapshot {
    pub fn status_line(&self, elapsed: Duration) -> String {
        format!(
            "Elapsed: {}, Total keys: {}, Buckets started: {}, Buckets completed: {}",
            HumanDuration(elapsed).to_human_readable(),
            self.keys_found,
            self.jobs_started,
            self.jobs_completed,
        )
    }
}

/// Prints a status line to stderr on a fixed interval
pub struct ProgressReporter {
    progress: Arc<Progress>,
    start_time: Instant,
    stop: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    pub fn start(progress: Arc<Progress>, interval: Duration) -> Self {
        let start_time = Instant::now();
        let stop = CancellationToken::new();

        let handle = tokio::spawn({
            let progress = Arc::clone(&progress);
            let stop = stop.clone();
            async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await; // Skip first immediate tick

                loop {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = ticker.tick() => {
                            let line = progress.snapshot().status_line(start_time.elapsed());
                            let _ = write!(io::stderr(), "\r{}", line);
                        }
                    }
                }
            }
        });

        Self {
            progress,
            start_time,
            stop,
            handle: Some(handle),
        }
    }

    /// Stop reporting and print the final totals
    pub async fn stop(mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }

        let line = self
            .progress
            .snapshot()
            .status_line(self.start_time.elapsed());
        let _ = writeln!(io::stderr(), "\r{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let progress = Progress::new();
        progress.job_started();
        progress.job_started();
        progress.key_found();
        progress.key_found();
        progress.key_found();
        progress.job_completed(false);
        progress.job_interrupted();

        let snap = progress.snapshot();
        assert_eq!(snap.keys_found, 3);
        assert_eq!(snap.jobs_started, 2);
        assert_eq!(snap.jobs_completed, 1);
        assert_eq!(snap.jobs_failed, 0);
        assert_eq!(snap.jobs_interrupted, 1);
        assert_eq!(snap.jobs_active, 0);
        assert_eq!(snap.peak_active, 2);
    }

    #[test]
    fn test_failure_counts_as_completed() {
        let progress = Progress::new();
        progress.job_started();
        progress.job_completed(true);

        let snap = progress.snapshot();
        assert_eq!(snap.jobs_completed, 1);
        assert_eq!(snap.jobs_failed, 1);
    }

    #[test]
    fn test_status_line() {
        let snap = ProgressSnapshot {
            keys_found: 42,
            jobs_started: 3,
            jobs_completed: 1,
            ..Default::default()
        };
        assert_eq!(
            snap.status_line(Duration::from_secs(65)),
            "Elapsed: 1m 5s, Total keys: 42, Buckets started: 3, Buckets completed: 1"
        );
    }

    #[tokio::test]
    async fn test_reporter_stops() {
        let progress = Arc::new(Progress::new());
        let reporter = ProgressReporter::start(Arc::clone(&progress), Duration::from_millis(5));
        progress.key_found();
        tokio::time::sleep(Duration::from_millis(20)).await;
        reporter.stop().await;
        assert_eq!(progress.snapshot().keys_found, 1);
    }
}
