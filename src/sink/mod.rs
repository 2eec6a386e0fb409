//! Output sinks for discovered keys
//!
//! Every bucket sweep writes to exactly one named sink. Sinks are
//! create-or-append line streams; the indexer flushes and closes them when a
//! sweep ends or the process is interrupted.

mod file;
mod format;
mod memory;

pub use file::{FileSink, FileSinkFactory};
pub use format::OutputFormat;
pub use memory::{MemorySink, MemorySinkFactory, MemoryStream};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink is closed: {0}")]
    Closed(String),
}

pub type Result<T> = std::result::Result<T, SinkError>;

/// A named, append-capable line stream
#[async_trait]
pub trait Sink: Send {
    /// Append one line; the trailing newline is added by the sink
    async fn write_line(&mut self, line: &str) -> Result<()>;

    async fn flush(&mut self) -> Result<()>;

    /// Flush and release the underlying stream. Later writes fail with [`SinkError::Closed`].
    async fn close(&mut self) -> Result<()>;
}

/// Opens sinks by name
#[async_trait]
pub trait SinkFactory: Send + Sync {
    async fn open(&self, name: &str) -> Result<Box<dyn Sink>>;
}
