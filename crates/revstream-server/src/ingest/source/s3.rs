//! Object storage source backend
//!
//! Streams review files straight from S3-compatible storage without
//! buffering whole objects in memory.

use async_trait::async_trait;
use tracing::debug;

use super::{ChunkedLineStream, LineStream, SourceReader, SourceStat, DEFAULT_BUFFER_SIZE};
use crate::ingest::error::{IngestError, IngestResult};
use crate::storage::Storage;

/// Required suffix for object-storage review files
pub const REVIEW_FILE_SUFFIX: &str = ".jl";

/// Reads review files from S3-compatible object storage
pub struct S3Source {
    storage: Storage,
    buffer_size: usize,
}

impl S3Source {
    pub fn new(storage: Storage, buffer_size: usize) -> Self {
        Self {
            storage,
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn with_default_buffer(storage: Storage) -> Self {
        Self::new(storage, DEFAULT_BUFFER_SIZE)
    }
}

#[async_trait]
impl SourceReader for S3Source {
    async fn validate(&self, path: &str) -> IngestResult<()> {
        if !path.ends_with(REVIEW_FILE_SUFFIX) {
            return Err(IngestError::InvalidFormat(format!(
                "Object '{}' does not have the {} suffix",
                path, REVIEW_FILE_SUFFIX
            )));
        }

        let meta = self.storage.get_metadata(path).await.map_err(|e| {
            IngestError::SourceAccess(format!("Cannot access object '{}': {}", path, e))
        })?;

        if meta.size == 0 {
            return Err(IngestError::InvalidFormat(format!(
                "Object '{}' is empty",
                path
            )));
        }

        Ok(())
    }

    async fn stat(&self, path: &str) -> IngestResult<SourceStat> {
        let meta = self.storage.get_metadata(path).await.map_err(|e| {
            IngestError::SourceAccess(format!("Cannot access object '{}': {}", path, e))
        })?;

        Ok(SourceStat {
            size: meta.size.max(0) as u64,
        })
    }

    async fn open(&self, path: &str) -> IngestResult<Box<dyn LineStream>> {
        let body = self.storage.download_stream(path).await.map_err(|e| {
            IngestError::SourceAccess(format!("Cannot open object '{}': {}", path, e))
        })?;

        debug!(path = %path, buffer_size = self.buffer_size, "Opened S3 object for streaming");

        let reader: std::pin::Pin<Box<dyn tokio::io::AsyncRead + Send>> =
            Box::pin(body.into_async_read());

        Ok(Box::new(ChunkedLineStream::new(reader, self.buffer_size)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_file_suffix() {
        assert!("reviews/agoda_com-batch7.jl".ends_with(REVIEW_FILE_SUFFIX));
        assert!(!"reviews/agoda_com-batch7.json".ends_with(REVIEW_FILE_SUFFIX));
    }
}
