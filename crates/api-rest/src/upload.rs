//! Streams a multipart field into the blocking storage writer.
//!
//! The request task pushes body chunks into a bounded channel; the storage side reads them
//! through [`ChunkReader`] on the blocking pool, so an upload is never buffered whole.

use axum::body::Bytes;
use std::io::{self, ErrorKind, Read};
use tokio::sync::mpsc;

/// Chunks buffered between the request task and the storage writer.
const BUFFERED_CHUNKS: usize = 4;

/// One message from the request task. `Ok(None)` marks the end of the upload.
pub(crate) type Chunk = io::Result<Option<Bytes>>;

pub(crate) fn channel() -> (mpsc::Sender<Chunk>, ChunkReader) {
    let (sender, chunks) = mpsc::channel(BUFFERED_CHUNKS);
    (
        sender,
        ChunkReader {
            chunks,
            current: Bytes::new(),
            finished: false,
        },
    )
}

/// Blocking [`Read`] over the chunks of one upload.
///
/// A sender dropped before the end marker (client disconnect, cancelled request) reads as
/// `UnexpectedEof`, so a truncated upload is never stored.
pub(crate) struct ChunkReader {
    chunks: mpsc::Receiver<Chunk>,
    current: Bytes,
    finished: bool,
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.current.is_empty() {
            if self.finished {
                return Ok(0);
            }
            match self.chunks.blocking_recv() {
                Some(Ok(Some(bytes))) => self.current = bytes,
                Some(Ok(None)) => self.finished = true,
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "upload ended before its last chunk",
                    ))
                }
            }
        }

        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current[..n]);
        self.current = self.current.slice(n..);
        Ok(n)
    }
}
