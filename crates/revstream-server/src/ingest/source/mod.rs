//! Pluggable source backends for line-delimited review files
//!
//! One streaming contract, two implementations: [`local::LocalSource`] for
//! the filesystem and [`s3::S3Source`] for object storage. Both read fixed
//! size chunks and feed a shared [`LineChunker`] so partial lines at chunk
//! boundaries are reassembled before being yielded.

use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::{IngestError, IngestResult};

pub mod local;
pub mod s3;

pub use local::LocalSource;
pub use s3::S3Source;

/// Default read buffer size (128 KiB)
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

/// Size information for a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceStat {
    pub size: u64,
}

/// Capability set every storage backend must provide
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Check the file exists and is ingestible. Must fail with
    /// [`IngestError::SourceAccess`] or [`IngestError::InvalidFormat`]
    /// before the pipeline is invoked.
    async fn validate(&self, path: &str) -> IngestResult<()>;

    /// Size of the source file in bytes
    async fn stat(&self, path: &str) -> IngestResult<SourceStat>;

    /// Open a lazy, forward-only line stream over the file. Restartable
    /// only by reopening.
    async fn open(&self, path: &str) -> IngestResult<Box<dyn LineStream>>;
}

/// Pull-based stream of raw lines
#[async_trait]
pub trait LineStream: Send {
    /// Next line without its terminator, or `None` at end of stream
    async fn next_line(&mut self) -> IngestResult<Option<String>>;
}

/// Splits raw byte chunks into lines, carrying partial lines across chunk
/// boundaries. Pure state machine shared by all backends.
#[derive(Debug, Default)]
pub struct LineChunker {
    partial: Vec<u8>,
    ready: VecDeque<String>,
}

impl LineChunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, making any completed lines available via
    /// [`LineChunker::pop`].
    pub fn push(&mut self, chunk: &[u8]) {
        let mut start = 0;
        for (i, byte) in chunk.iter().enumerate() {
            if *byte == b'\n' {
                self.partial.extend_from_slice(&chunk[start..i]);
                self.ready.push_back(take_line(&mut self.partial));
                start = i + 1;
            }
        }
        self.partial.extend_from_slice(&chunk[start..]);
    }

    /// Next completed line, if any
    pub fn pop(&mut self) -> Option<String> {
        self.ready.pop_front()
    }

    /// Drain the trailing partial line at end of stream. Returns `None`
    /// when the stream ended on a line terminator.
    pub fn finish(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        Some(take_line(&mut self.partial))
    }
}

fn take_line(buf: &mut Vec<u8>) -> String {
    // Tolerate CRLF input; invalid UTF-8 is replaced and will surface as a
    // parse failure downstream instead of aborting the stream.
    let mut bytes = std::mem::take(buf);
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Line stream over any [`AsyncRead`], reading `buffer_size` chunks
pub struct ChunkedLineStream<R> {
    reader: R,
    chunker: LineChunker,
    buf: Vec<u8>,
    eof: bool,
}

impl<R: AsyncRead + Unpin + Send> ChunkedLineStream<R> {
    pub fn new(reader: R, buffer_size: usize) -> Self {
        Self {
            reader,
            chunker: LineChunker::new(),
            buf: vec![0u8; buffer_size.max(1)],
            eof: false,
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> LineStream for ChunkedLineStream<R> {
    async fn next_line(&mut self) -> IngestResult<Option<String>> {
        loop {
            if let Some(line) = self.chunker.pop() {
                return Ok(Some(line));
            }
            if self.eof {
                return Ok(self.chunker.finish());
            }
            let n = self
                .reader
                .read(&mut self.buf)
                .await
                .map_err(|e| IngestError::SourceAccess(e.to_string()))?;
            if n == 0 {
                self.eof = true;
            } else {
                self.chunker.push(&self.buf[..n]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunker_splits_lines() {
        let mut chunker = LineChunker::new();
        chunker.push(b"one\ntwo\nthree");

        assert_eq!(chunker.pop(), Some("one".to_string()));
        assert_eq!(chunker.pop(), Some("two".to_string()));
        assert_eq!(chunker.pop(), None);
        assert_eq!(chunker.finish(), Some("three".to_string()));
        assert_eq!(chunker.finish(), None);
    }

    #[test]
    fn test_chunker_carries_partial_lines_across_chunks() {
        let mut chunker = LineChunker::new();
        chunker.push(b"{\"hotelId\":");
        assert_eq!(chunker.pop(), None);

        chunker.push(b"42}\n{\"hotel");
        assert_eq!(chunker.pop(), Some("{\"hotelId\":42}".to_string()));
        assert_eq!(chunker.pop(), None);

        chunker.push(b"Id\":43}\n");
        assert_eq!(chunker.pop(), Some("{\"hotelId\":43}".to_string()));
        assert_eq!(chunker.finish(), None);
    }

    #[test]
    fn test_chunker_strips_crlf() {
        let mut chunker = LineChunker::new();
        chunker.push(b"alpha\r\nbeta\r\n");

        assert_eq!(chunker.pop(), Some("alpha".to_string()));
        assert_eq!(chunker.pop(), Some("beta".to_string()));
        assert_eq!(chunker.finish(), None);
    }

    #[tokio::test]
    async fn test_chunked_line_stream_with_tiny_buffer() {
        let data = b"first line\nsecond line\nlast".to_vec();
        // 4-byte buffer forces every line across multiple reads
        let mut stream = ChunkedLineStream::new(std::io::Cursor::new(data), 4);

        assert_eq!(
            stream.next_line().await.unwrap(),
            Some("first line".to_string())
        );
        assert_eq!(
            stream.next_line().await.unwrap(),
            Some("second line".to_string())
        );
        assert_eq!(stream.next_line().await.unwrap(), Some("last".to_string()));
        assert_eq!(stream.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_chunked_line_stream_empty_input() {
        let mut stream = ChunkedLineStream::new(std::io::Cursor::new(Vec::new()), 16);
        assert_eq!(stream.next_line().await.unwrap(), None);
    }
}
