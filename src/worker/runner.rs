//! Job runner - drives one bucket sweep from sink open to close

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::PageFetcher;
use crate::indexer::{ActiveJob, IndexJob, JobError, JobFailure, ShutdownRegistry};
use crate::observability::Progress;
use crate::paginator::Paginator;
use crate::sink::{OutputFormat, SinkFactory};

/// How a single sweep ended
#[derive(Debug)]
pub(crate) enum JobOutcome {
    Completed,
    Failed(JobFailure),
    Interrupted,
}

/// Everything a sweep shares with the rest of the run
#[derive(Clone)]
pub(crate) struct JobContext {
    pub fetcher: Arc<dyn PageFetcher>,
    pub sinks: Arc<dyn SinkFactory>,
    pub format: OutputFormat,
    pub progress: Arc<Progress>,
    pub registry: Arc<ShutdownRegistry>,
    pub cancel: CancellationToken,
}

impl JobContext {
    pub async fn run(&self, id: usize, job: IndexJob) -> JobOutcome {
        self.progress.job_started();
        let bucket_name = job.bucket.name();
        info!(job = id, bucket = %bucket_name, provider = job.bucket.provider(), "Sweep started");

        let sink = match self.sinks.open(&job.sink_name).await {
            Ok(sink) => sink,
            Err(e) => {
                error!(job = id, sink = %job.sink_name, error = %e, "Failed to open sink");
                self.progress.job_completed(true);
                return JobOutcome::Failed(JobFailure {
                    source: job.source,
                    sink: job.sink_name,
                    token: job.start_token,
                    error: e.to_string(),
                });
            }
        };

        let active = Arc::new(ActiveJob::new(
            id,
            job.source.clone(),
            job.sink_name.clone(),
            sink,
            job.start_token.clone(),
        ));

        if !self.registry.register(Arc::clone(&active)) {
            self.registry.interrupt(&active).await;
            self.progress.job_interrupted();
            return JobOutcome::Interrupted;
        }

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(JobError::Interrupted),
            result = self.sweep(&job, &active) => result,
        };

        match result {
            Ok(keys) => match self.registry.release(&active).await {
                Some(Ok(())) => {
                    info!(job = id, bucket = %bucket_name, keys, "Sweep finished");
                    self.progress.job_completed(false);
                    JobOutcome::Completed
                }
                Some(Err(e)) => self.fail(&active, JobError::Sink(e)),
                // A shutdown got to the sink first and already recorded a hint
                None => self.interrupted(&active),
            },
            Err(JobError::Interrupted) => {
                self.registry.interrupt(&active).await;
                self.interrupted(&active)
            }
            Err(e) => {
                if let Some(Err(close_err)) = self.registry.release(&active).await {
                    warn!(job = id, error = %close_err, "Failed to close sink after error");
                }
                self.fail(&active, e)
            }
        }
    }

    async fn sweep(&self, job: &IndexJob, active: &ActiveJob) -> Result<u64, JobError> {
        let mut paginator = Paginator::new(&job.bucket, self.fetcher.as_ref(), &job.start_token);
        let mut keys = 0u64;

        loop {
            if let Some(token) = paginator.state().token() {
                active.set_cursor(token);
            }

            let Some(page) = paginator.step().await? else {
                break;
            };

            for key in page {
                active
                    .write_line(&self.format.render(&job.bucket, &key))
                    .await?;
                self.progress.key_found();
                keys += 1;
            }
        }

        Ok(keys)
    }

    fn interrupted(&self, active: &ActiveJob) -> JobOutcome {
        info!(job = active.id, sink = %active.sink_name, token = %active.cursor(), "Sweep interrupted");
        self.progress.job_interrupted();
        JobOutcome::Interrupted
    }

    fn fail(&self, active: &ActiveJob, error: JobError) -> JobOutcome {
        let token = active.cursor();
        error!(job = active.id, sink = %active.sink_name, %token, error = %error, "Sweep failed");
        self.progress.job_completed(true);
        JobOutcome::Failed(JobFailure {
            source: active.source.clone(),
            sink: active.sink_name.clone(),
            token,
            error: error.to_string(),
        })
    }
}
