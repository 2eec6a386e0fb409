use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use super::{Result, Sink, SinkError, SinkFactory};

/// Line sink backed by a buffered file
pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    /// Open `path`, appending when `append` is set and the file exists
    pub async fn open(path: impl AsRef<Path>, append: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let exists = fs::try_exists(&path).await.unwrap_or(false);
        let file = if append && exists {
            info!(path = %path.display(), "Appending to existing file");
            OpenOptions::new().append(true).create(true).open(&path).await?
        } else {
            info!(path = %path.display(), "Creating new file");
            File::create(&path).await?
        };

        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        let path = &self.path;
        self.writer
            .as_mut()
            .ok_or_else(|| SinkError::Closed(path.display().to_string()))
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        let writer = self.writer()?;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.writer()?.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
            writer.get_mut().sync_all().await?;
            debug!(path = %self.path.display(), "Closed sink");
        }
        Ok(())
    }
}

/// Opens [`FileSink`]s inside one output directory
#[derive(Debug, Clone)]
pub struct FileSinkFactory {
    dir: PathBuf,
    append: bool,
}

impl FileSinkFactory {
    pub fn new(dir: impl Into<PathBuf>, append: bool) -> Self {
        Self {
            dir: dir.into(),
            append,
        }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

#[async_trait]
impl SinkFactory for FileSinkFactory {
    async fn open(&self, name: &str) -> Result<Box<dyn Sink>> {
        let sink = FileSink::open(self.path_for(name), self.append).await?;
        Ok(Box::new(sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_flush_close() {
        let temp_dir = TempDir::new().unwrap();
        let factory = FileSinkFactory::new(temp_dir.path(), false);

        let mut sink = factory.open("bucket.txt").await.unwrap();
        sink.write_line("a").await.unwrap();
        sink.write_line("b/c").await.unwrap();
        sink.flush().await.unwrap();
        sink.close().await.unwrap();

        let content = std::fs::read_to_string(temp_dir.path().join("bucket.txt")).unwrap();
        assert_eq!(content, "a\nb/c\n");
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = FileSink::open(temp_dir.path().join("x.txt"), false)
            .await
            .unwrap();
        sink.close().await.unwrap();

        assert!(matches!(
            sink.write_line("late").await,
            Err(SinkError::Closed(_))
        ));
        // Closing twice is harmless
        sink.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_truncates_and_append_extends() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/out.txt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "old\n").unwrap();

        let mut sink = FileSink::open(&path, true).await.unwrap();
        sink.write_line("new").await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old\nnew\n");

        let mut sink = FileSink::open(&path, false).await.unwrap();
        sink.write_line("fresh").await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "fresh\n");
    }

    #[tokio::test]
    async fn test_creates_output_directory() {
        let temp_dir = TempDir::new().unwrap();
        let factory = FileSinkFactory::new(temp_dir.path().join("a/b"), false);

        let mut sink = factory.open("1-bucket.txt").await.unwrap();
        sink.close().await.unwrap();

        assert!(temp_dir.path().join("a/b/1-bucket.txt").exists());
    }
}
