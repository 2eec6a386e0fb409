use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use super::JobError;
use crate::sink::{Sink, SinkError};

/// Where an interrupted sweep can pick up again
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeHint {
    /// Input URL the bucket was resolved from
    pub source: String,
    /// Sink name to reopen in append mode
    pub sink: String,
    /// Token that requested the page in flight when the sweep stopped
    pub token: String,
    pub interrupted_at: DateTime<Utc>,
}

/// A sweep that currently owns an open sink
pub struct ActiveJob {
    pub id: usize,
    pub source: String,
    pub sink_name: String,
    sink: tokio::sync::Mutex<Option<Box<dyn Sink>>>,
    cursor: Mutex<String>,
}

impl ActiveJob {
    pub fn new(
        id: usize,
        source: impl Into<String>,
        sink_name: impl Into<String>,
        sink: Box<dyn Sink>,
        cursor: impl Into<String>,
    ) -> Self {
        Self {
            id,
            source: source.into(),
            sink_name: sink_name.into(),
            sink: tokio::sync::Mutex::new(Some(sink)),
            cursor: Mutex::new(cursor.into()),
        }
    }

    pub fn set_cursor(&self, token: &str) {
        let mut cursor = self.cursor.lock().unwrap_or_else(|p| p.into_inner());
        cursor.clear();
        cursor.push_str(token);
    }

    pub fn cursor(&self) -> String {
        self.cursor.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Write one line, failing with [`JobError::Interrupted`] once the sink was taken
    pub async fn write_line(&self, line: &str) -> Result<(), JobError> {
        let mut guard = self.sink.lock().await;
        match guard.as_mut() {
            Some(sink) => Ok(sink.write_line(line).await?),
            None => Err(JobError::Interrupted),
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.sink.lock().await.is_none()
    }

    /// Flush and close the sink if still open. `on_close` runs before the sink
    /// lock is released, so a concurrent closer observes its effects.
    ///
    /// Returns `None` when another caller already closed it.
    async fn close_with<F>(&self, on_close: F) -> Option<Result<(), SinkError>>
    where
        F: FnOnce(),
    {
        let mut guard = self.sink.lock().await;
        let mut sink = guard.take()?;

        let result = match sink.flush().await {
            Ok(()) => sink.close().await,
            Err(e) => {
                let _ = sink.close().await;
                Err(e)
            }
        };
        on_close();
        Some(result)
    }
}

#[derive(Default)]
struct RegistryState {
    draining: bool,
    jobs: BTreeMap<usize, Arc<ActiveJob>>,
    hints: Vec<ResumeHint>,
}

/// Tracks every open sweep so a shutdown can close each sink exactly once
#[derive(Default)]
pub struct ShutdownRegistry {
    state: Mutex<RegistryState>,
}

impl ShutdownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Returns false once draining has begun; the caller must then interrupt the job itself
    pub fn register(&self, job: Arc<ActiveJob>) -> bool {
        let mut state = self.state();
        if state.draining {
            return false;
        }
        state.jobs.insert(job.id, job);
        true
    }

    fn deregister(&self, id: usize) {
        self.state().jobs.remove(&id);
    }

    /// Close a finished sweep without recording a hint.
    ///
    /// Returns `None` if a shutdown closed the sink first.
    pub async fn release(&self, job: &ActiveJob) -> Option<Result<(), SinkError>> {
        self.deregister(job.id);
        job.close_with(|| {}).await
    }

    /// Close an unfinished sweep and record where it stopped.
    ///
    /// Only the first closer records a hint.
    pub async fn interrupt(&self, job: &ActiveJob) -> Option<Result<(), SinkError>> {
        let result = job
            .close_with(|| {
                let hint = ResumeHint {
                    source: job.source.clone(),
                    sink: job.sink_name.clone(),
                    token: job.cursor(),
                    interrupted_at: Utc::now(),
                };
                debug!(job = job.id, sink = %hint.sink, token = %hint.token, "Recorded resume hint");
                self.state().hints.push(hint);
            })
            .await;
        self.deregister(job.id);

        if let Some(Err(e)) = &result {
            warn!(job = job.id, sink = %job.sink_name, error = %e, "Failed to close sink on interrupt");
        }
        result
    }

    /// Close the sink of a sweep that can no longer release it itself.
    ///
    /// Returns its last cursor, or `None` if it was not registered.
    pub async fn abandon(&self, id: usize) -> Option<String> {
        let job = self.state().jobs.remove(&id)?;
        if let Some(Err(e)) = job.close_with(|| {}).await {
            warn!(job = id, sink = %job.sink_name, error = %e, "Failed to close abandoned sink");
        }
        Some(job.cursor())
    }

    /// Refuse new registrations and interrupt every registered sweep
    pub async fn drain(&self) -> usize {
        let jobs: Vec<Arc<ActiveJob>> = {
            let mut state = self.state();
            state.draining = true;
            state.jobs.values().cloned().collect()
        };

        let mut closed = 0;
        for job in jobs {
            if self.interrupt(&job).await.is_some() {
                closed += 1;
            }
        }
        debug!(closed, "Registry drained");
        closed
    }

    pub fn is_draining(&self) -> bool {
        self.state().draining
    }

    pub fn active(&self) -> usize {
        self.state().jobs.len()
    }

    pub fn take_hints(&self) -> Vec<ResumeHint> {
        std::mem::take(&mut self.state().hints)
    }
}
