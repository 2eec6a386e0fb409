use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Result, Sink, SinkError, SinkFactory};

/// State of one in-memory stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStream {
    /// Lines made durable by a flush
    pub lines: Vec<String>,
    /// Lines written but not yet flushed
    pub pending: Vec<String>,
    pub flushes: usize,
    pub opens: usize,
    pub closed: bool,
}

type Streams = Arc<Mutex<BTreeMap<String, MemoryStream>>>;

fn lock(streams: &Streams) -> MutexGuard<'_, BTreeMap<String, MemoryStream>> {
    // A panicking writer must not hide what was already flushed
    streams.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-process sink; buffered lines only become visible after a flush
pub struct MemorySink {
    name: String,
    streams: Streams,
    closed: bool,
}

impl MemorySink {
    fn with_stream<T>(&self, f: impl FnOnce(&mut MemoryStream) -> T) -> T {
        let mut streams = lock(&self.streams);
        f(streams.entry(self.name.clone()).or_default())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(SinkError::Closed(self.name.clone()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.ensure_open()?;
        self.with_stream(|s| s.pending.push(line.to_string()));
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.with_stream(|s| {
            let pending = std::mem::take(&mut s.pending);
            s.lines.extend(pending);
            s.flushes += 1;
        });
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush().await?;
        self.closed = true;
        self.with_stream(|s| s.closed = true);
        Ok(())
    }
}

/// Factory for [`MemorySink`]s that keeps every stream for inspection
#[derive(Debug, Clone, Default)]
pub struct MemorySinkFactory {
    streams: Streams,
    append: bool,
}

impl MemorySinkFactory {
    pub fn new(append: bool) -> Self {
        Self {
            streams: Arc::default(),
            append,
        }
    }

    /// Snapshot of a stream by name
    pub fn stream(&self, name: &str) -> Option<MemoryStream> {
        lock(&self.streams).get(name).cloned()
    }

    /// Flushed lines of a stream, empty if it was never opened
    pub fn lines(&self, name: &str) -> Vec<String> {
        self.stream(name).map(|s| s.lines).unwrap_or_default()
    }

    pub fn names(&self) -> Vec<String> {
        lock(&self.streams).keys().cloned().collect()
    }
}

#[async_trait]
impl SinkFactory for MemorySinkFactory {
    async fn open(&self, name: &str) -> Result<Box<dyn Sink>> {
        {
            let mut streams = lock(&self.streams);
            let stream = streams.entry(name.to_string()).or_default();
            if !self.append {
                stream.lines.clear();
            }
            stream.pending.clear();
            stream.closed = false;
            stream.opens += 1;
        }

        Ok(Box::new(MemorySink {
            name: name.to_string(),
            streams: Arc::clone(&self.streams),
            closed: false,
        }))
    }
}
