//! Result stream protocol.
//!
//! Frames travel as newline-delimited JSON, one complete document per line:
//!
//! ```text
//! {"customer_id":4,"store":{"$pending":"store-store_id"}}\n
//! {"customer_id":4,"store":{"store_id":1}}\n
//! ```
//!
//! Once the first line is written the response status is fixed, so a fault
//! after that point is sent as a final `{ "type", "error" }` line. In
//! collapsing mode (`x-return-last-only: true`) the frames are drained on the
//! server and only the last one is sent, as a single JSON document.

pub mod ndjson;
pub mod reader;

use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::error::{ErrorDocument, ErrorKind};

pub use ndjson::{ndjson_lines, write_ndjson};
pub use reader::FrameReader;

/// One complete snapshot of a query result.
pub type Frame = Value;

/// Content type of the streaming form.
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Content type of the collapsed form.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Request header selecting collapsing mode.
pub const RETURN_LAST_ONLY_HEADER: &str = "x-return-last-only";

/// Message sent in place of the detail of a fault that is not safe to show.
pub const UNKNOWN_FAULT_MESSAGE: &str = "internal error while streaming results";

/// True only for the header value `true`.
pub fn is_return_last_only(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

/// A fault that may have to be written as the final line of a stream.
pub trait StreamFault: std::error::Error {
    /// Kind of a fault that is safe to describe to the client.
    fn fault_kind(&self) -> Option<ErrorKind>;

    /// The error line for this fault.
    ///
    /// Known faults keep their kind and message. Anything else becomes a
    /// `ResponseStreamingFault` without detail.
    fn to_error_frame(&self) -> ErrorDocument {
        match self.fault_kind() {
            Some(kind) => ErrorDocument::new(kind, self.to_string()),
            None => ErrorDocument::new(ErrorKind::ResponseStreamingFault, UNKNOWN_FAULT_MESSAGE),
        }
    }
}

/// One frame as a newline-terminated line.
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let mut line = frame.to_string().into_bytes();
    line.push(b'\n');
    line
}

/// Drain `frames`, keeping only the last one.
///
/// An empty stream is `Ok(None)`, not an error. The first fault stops the drain.
pub async fn collect_last<S, E>(frames: S) -> Result<Option<Frame>, E>
where
    S: Stream<Item = Result<Frame, E>>,
{
    let mut frames = std::pin::pin!(frames);
    let mut last = None;
    while let Some(frame) = frames.next().await {
        last = Some(frame?);
    }
    Ok(last)
}
