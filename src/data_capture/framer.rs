use std::collections::VecDeque;

use log::{trace, warn};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use super::types::{Feed, PacketRecord};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Turns a capture tool's stdout into a sequence of [`PacketRecord`]s.
///
/// Every chunk handed over by the reader is treated as one block and split on
/// `\n`; each non-empty segment becomes one record. The sequence ends when the
/// reader reaches EOF, fails, or the cancellation token fires.
pub struct PacketFramer<R> {
    feed: Feed,
    reader: R,
    cancel: CancellationToken,
    pending: VecDeque<PacketRecord>,
    buf: Vec<u8>,
    finished: bool,
}

impl<R: AsyncRead + Unpin> PacketFramer<R> {
    pub fn new(feed: Feed, reader: R, cancel: CancellationToken) -> Self {
        Self {
            feed,
            reader,
            cancel,
            pending: VecDeque::new(),
            buf: vec![0u8; READ_BUFFER_SIZE],
            finished: false,
        }
    }

    /// Waits for the next record.
    ///
    /// Returns `None` once the stream is over. After cancellation no further
    /// records are handed out, including ones already split from a chunk.
    pub async fn next_record(&mut self) -> Option<PacketRecord> {
        loop {
            if self.finished || self.cancel.is_cancelled() {
                self.finished = true;
                return None;
            }
            if let Some(record) = self.pending.pop_front() {
                return Some(record);
            }

            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    trace!("[{}] framer stopped while waiting for output", self.feed);
                    self.finished = true;
                    return None;
                }
                read = self.reader.read(&mut self.buf) => read,
            };

            match read {
                Ok(0) => {
                    trace!("[{}] capture output reached EOF", self.feed);
                    self.finished = true;
                }
                Ok(n) => {
                    let before = self.pending.len();
                    self.pending.extend(split_chunk(&self.buf[..n]));
                    trace!(
                        "[{}] framed {} bytes into {} records",
                        self.feed,
                        n,
                        self.pending.len() - before
                    );
                }
                Err(e) => {
                    warn!("[{}] failed to read capture output: {}", self.feed, e);
                    self.finished = true;
                }
            }
        }
    }
}

/// Splits one delivered chunk on newline bytes, dropping empty segments.
pub fn split_chunk(chunk: &[u8]) -> impl Iterator<Item = PacketRecord> + '_ {
    chunk.split(|b| *b == b'\n').filter_map(PacketRecord::from_payload)
}
