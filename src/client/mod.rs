//! Client transport.
//!
//! [`QueryClient`] posts query documents to a server and decodes the
//! newline-delimited response as it arrives:
//!
//! ```text
//! reqwest body ──▶ StreamReader ──▶ FrameReader ──▶ frames
//!  (byte chunks)    (AsyncBufRead)   (one per line)
//! ```
//!
//! Chunk boundaries do not matter: a frame is decoded only once its line is
//! complete, and a malformed line is logged and skipped.

mod error;
mod http;

pub use error::{ClientError, ClientResult};
pub use http::{ClientFrameStream, QueryClient};
