//! Incremental NDJSON frame reader.

use futures::stream::{self, Stream};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use super::Frame;

/// Decodes frames from a byte stream as each line completes.
///
/// Lines are split on `\n` (a trailing `\r` is dropped). A line that is not
/// valid JSON is logged and skipped, and reading carries on. A final line with
/// no terminating newline is still decoded. The reader is forward-only: once
/// it reports the end of the stream it stays there.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    line: Vec<u8>,
    line_number: usize,
    malformed: usize,
    finished: bool,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
            line_number: 0,
            malformed: 0,
            finished: false,
        }
    }

    /// The next decoded frame, or `None` at end of stream.
    pub async fn next_frame(&mut self) -> std::io::Result<Option<Frame>> {
        loop {
            if self.finished {
                return Ok(None);
            }

            self.line.clear();
            let read = self.reader.read_until(b'\n', &mut self.line).await?;
            if read == 0 {
                self.finished = true;
                return Ok(None);
            }
            self.line_number += 1;

            let mut text: &[u8] = &self.line;
            if let Some(rest) = text.strip_suffix(b"\n") {
                text = rest;
            }
            if let Some(rest) = text.strip_suffix(b"\r") {
                text = rest;
            }
            if text.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            match serde_json::from_slice(text) {
                Ok(frame) => return Ok(Some(frame)),
                Err(e) => {
                    // Skip the line but keep reading
                    self.malformed += 1;
                    log::warn!("Skipping malformed frame on line {}: {}", self.line_number, e);
                }
            }
        }
    }

    /// Lines skipped so far because they did not parse.
    pub fn malformed_count(&self) -> usize {
        self.malformed
    }

    /// Lines read so far, including blank and malformed ones.
    pub fn line_count(&self) -> usize {
        self.line_number
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Adapt into a stream of frames. The stream ends after the first I/O error.
    pub fn into_stream(self) -> impl Stream<Item = std::io::Result<Frame>> {
        stream::unfold(Some(self), |state| async move {
            let mut reader = state?;
            match reader.next_frame().await {
                Ok(Some(frame)) => Some((Ok(frame), Some(reader))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}
