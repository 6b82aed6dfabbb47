//! Local filesystem source backend

use async_trait::async_trait;
use tracing::debug;

use super::{ChunkedLineStream, LineStream, SourceReader, SourceStat, DEFAULT_BUFFER_SIZE};
use crate::ingest::error::{IngestError, IngestResult};

/// Reads review files from the local filesystem in fixed-size chunks
pub struct LocalSource {
    buffer_size: usize,
}

impl LocalSource {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    async fn metadata(&self, path: &str) -> IngestResult<std::fs::Metadata> {
        tokio::fs::metadata(path).await.map_err(|e| {
            IngestError::SourceAccess(format!("Cannot access file '{}': {}", path, e))
        })
    }
}

impl Default for LocalSource {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

#[async_trait]
impl SourceReader for LocalSource {
    async fn validate(&self, path: &str) -> IngestResult<()> {
        let meta = self.metadata(path).await?;

        if !meta.is_file() {
            return Err(IngestError::SourceAccess(format!(
                "'{}' is not a regular file",
                path
            )));
        }

        if meta.len() == 0 {
            return Err(IngestError::InvalidFormat(format!(
                "File '{}' is empty",
                path
            )));
        }

        Ok(())
    }

    async fn stat(&self, path: &str) -> IngestResult<SourceStat> {
        let meta = self.metadata(path).await?;
        Ok(SourceStat { size: meta.len() })
    }

    async fn open(&self, path: &str) -> IngestResult<Box<dyn LineStream>> {
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            IngestError::SourceAccess(format!("Cannot open file '{}': {}", path, e))
        })?;

        debug!(path = %path, buffer_size = self.buffer_size, "Opened local file for streaming");

        Ok(Box::new(ChunkedLineStream::new(file, self.buffer_size)))
    }
}
