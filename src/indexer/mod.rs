//! Concurrent indexing pipeline
//!
//! The [`Indexer`] runs one sweep per [`IndexJob`], at most `concurrency` at a
//! time. Each sweep streams its keys to its own sink as pages arrive. A
//! shutdown cancels the run, closes every open sink exactly once and reports
//! a [`ResumeHint`] per interrupted sweep; jobs that never started come back
//! in [`Summary::pending`].

mod registry;

pub use registry::{ActiveJob, ResumeHint, ShutdownRegistry};

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::bucket::{self, Bucket, ResolveError};
use crate::observability::Progress;
use crate::paginator::SweepError;
use crate::sink::{OutputFormat, SinkError, SinkFactory};
use crate::worker::PageFetcher;
use crate::worker::runner::{JobContext, JobOutcome};

pub const DEFAULT_CONCURRENCY: usize = 10;

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Sweep(#[from] SweepError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("interrupted")]
    Interrupted,
}

/// One bucket to sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexJob {
    /// Input URL the bucket was resolved from
    pub source: String,
    pub bucket: Bucket,
    /// Empty for a fresh sweep
    pub start_token: String,
    pub sink_name: String,
}

impl IndexJob {
    pub fn new(source: impl Into<String>, bucket: Bucket) -> Self {
        let sink_name = format!("{}.txt", bucket.name());
        Self {
            source: source.into(),
            bucket,
            start_token: String::new(),
            sink_name,
        }
    }

    /// Resolve `source` into a fresh job
    pub fn resolve(source: &str) -> Result<Self, ResolveError> {
        let bucket = bucket::resolve(source)?;
        Ok(Self::new(source.trim(), bucket))
    }

    /// Rebuild the job an interrupted sweep left behind
    pub fn from_hint(hint: &ResumeHint) -> Result<Self, ResolveError> {
        Ok(Self::resolve(&hint.source)?
            .with_start_token(hint.token.clone())
            .with_sink_name(hint.sink.clone()))
    }

    pub fn with_start_token(mut self, token: impl Into<String>) -> Self {
        self.start_token = token.into();
        self
    }

    pub fn with_sink_name(mut self, name: impl Into<String>) -> Self {
        self.sink_name = name.into();
        self
    }

    /// Prefix the sink name with a 1-based input position
    pub fn indexed(self, index: usize) -> Self {
        let name = format!("{}-{}.txt", index, self.bucket.name());
        self.with_sink_name(name)
    }

    /// Hint for a job that was never started
    pub fn resume_hint(&self) -> ResumeHint {
        ResumeHint {
            source: self.source.clone(),
            sink: self.sink_name.clone(),
            token: self.start_token.clone(),
            interrupted_at: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Clone, bon::Builder)]
pub struct IndexerOptions {
    #[builder(default = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,
    #[builder(default)]
    pub format: OutputFormat,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A sweep that stopped on an error; its partial output stays in the sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFailure {
    pub source: String,
    pub sink: String,
    /// Token of the page that failed
    pub token: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct Summary {
    pub total_keys: u64,
    pub started: usize,
    /// Finished sweeps, failures included
    pub completed: usize,
    pub failed: Vec<JobFailure>,
    pub interrupted: Vec<ResumeHint>,
    pub pending: Vec<IndexJob>,
}

impl Summary {
    /// Everything needed to continue this run later
    pub fn resume_hints(&self) -> Vec<ResumeHint> {
        self.interrupted
            .iter()
            .cloned()
            .chain(self.pending.iter().map(IndexJob::resume_hint))
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.interrupted.is_empty() && self.pending.is_empty()
    }
}

/// Triggers a graceful shutdown of a running [`Indexer`]
#[derive(Clone)]
pub struct ShutdownHandle {
    cancel: CancellationToken,
    registry: Arc<ShutdownRegistry>,
}

impl ShutdownHandle {
    /// Stop admitting jobs, then close every open sink and record its hint
    pub async fn trigger(&self) {
        info!("Shutting down indexer");
        self.cancel.cancel();
        self.registry.drain().await;
    }

    pub fn is_triggered(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

pub struct Indexer {
    fetcher: Arc<dyn PageFetcher>,
    sinks: Arc<dyn SinkFactory>,
    options: IndexerOptions,
    progress: Arc<Progress>,
    registry: Arc<ShutdownRegistry>,
    cancel: CancellationToken,
}

impl Indexer {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        sinks: Arc<dyn SinkFactory>,
        options: IndexerOptions,
    ) -> Self {
        Self {
            fetcher,
            sinks,
            options,
            progress: Arc::new(Progress::new()),
            registry: Arc::new(ShutdownRegistry::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn progress(&self) -> Arc<Progress> {
        Arc::clone(&self.progress)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            cancel: self.cancel.clone(),
            registry: Arc::clone(&self.registry),
        }
    }

    pub async fn shutdown(&self) {
        self.shutdown_handle().trigger().await;
    }

    /// Sweep every job and wait for all of them to finish or be interrupted
    pub async fn run(&self, jobs: impl IntoIterator<Item = IndexJob>) -> Summary {
        let concurrency = self.options.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let context = JobContext {
            fetcher: Arc::clone(&self.fetcher),
            sinks: Arc::clone(&self.sinks),
            format: self.options.format,
            progress: Arc::clone(&self.progress),
            registry: Arc::clone(&self.registry),
            cancel: self.cancel.clone(),
        };

        let mut tasks = JoinSet::new();
        // Jobs whose task has not reported back yet
        let mut running: BTreeMap<usize, IndexJob> = BTreeMap::new();
        let mut summary = Summary::default();
        let mut jobs = jobs.into_iter().enumerate();

        info!(concurrency, format = ?self.options.format, "Indexer started");

        while let Some((id, job)) = jobs.next() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                summary.pending.push(job);
                summary.pending.extend(jobs.by_ref().map(|(_, job)| job));
                break;
            };

            summary.started += 1;
            running.insert(id, job.clone());
            let context = context.clone();
            tasks.spawn(async move {
                let outcome = context.run(id, job).await;
                drop(permit);
                (id, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (id, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    error!(error = %e, "Sweep task panicked");
                    continue;
                }
            };
            running.remove(&id);
            match outcome {
                JobOutcome::Completed => summary.completed += 1,
                JobOutcome::Failed(failure) => {
                    summary.completed += 1;
                    summary.failed.push(failure);
                }
                JobOutcome::Interrupted => {}
            }
        }

        // Whatever never reported back died with its task
        for (id, job) in running {
            summary.completed += 1;
            summary.failed.push(self.abandon(id, job).await);
        }

        summary.interrupted = self.registry.take_hints();
        // Failed and interrupted sweeps still contributed keys
        summary.total_keys = self.progress.snapshot().keys_found;

        info!(
            keys = summary.total_keys,
            started = summary.started,
            completed = summary.completed,
            failed = summary.failed.len(),
            interrupted = summary.interrupted.len(),
            pending = summary.pending.len(),
            "Indexer finished"
        );
        summary
    }

    /// Settle a job whose task panicked: close its sink and report it as failed
    async fn abandon(&self, id: usize, job: IndexJob) -> JobFailure {
        let token = self
            .registry
            .abandon(id)
            .await
            .unwrap_or_else(|| job.start_token.clone());
        self.progress.job_completed(true);
        error!(job = id, sink = %job.sink_name, %token, "Sweep aborted by panic");

        JobFailure {
            source: job.source,
            sink: job.sink_name,
            token,
            error: "sweep task panicked".to_string(),
        }
    }
}

/// Sweep `buckets` with a fresh [`Indexer`], naming each sink after its bucket
pub async fn run_indexing(
    buckets: Vec<Bucket>,
    concurrency: usize,
    sinks: Arc<dyn SinkFactory>,
    format: OutputFormat,
    fetcher: Arc<dyn PageFetcher>,
) -> Summary {
    let options = IndexerOptions::builder()
        .concurrency(concurrency)
        .format(format)
        .build();
    let indexer = Indexer::new(fetcher, sinks, options);

    let jobs = buckets
        .into_iter()
        .map(|bucket| IndexJob::new(bucket.url(), bucket));
    indexer.run(jobs).await
}
