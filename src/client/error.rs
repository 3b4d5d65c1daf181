//! Client-side error types.

use thiserror::Error;

use crate::error::{ErrorDocument, ErrorKind};
use crate::stream::StreamFault;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while fetching query results.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The configured base URL is not an http(s) URL.
    #[error("invalid base url '{0}'")]
    InvalidUrl(String),

    /// The HTTP request itself failed.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Reading the response body failed.
    #[error("failed to read response body: {0}")]
    Io(#[from] std::io::Error),

    /// A collapsed response was not valid JSON.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The server reported a fault, before or during the stream.
    #[error("{kind}: {message}")]
    Server {
        /// The error document's `type`.
        kind: String,
        /// The error document's `error`.
        message: String,
    },

    /// The server answered with an error status and no error document.
    #[error("server answered with status {0}")]
    Status(u16),
}

impl ClientError {
    pub(crate) fn from_document(doc: ErrorDocument) -> Self {
        ClientError::Server {
            kind: doc.kind,
            message: doc.error,
        }
    }

    /// The server-reported kind, if it is one this crate knows.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ClientError::Server { kind, .. } => ErrorKind::parse(kind),
            _ => None,
        }
    }

    /// True if the server reported the fault in-band after streaming began.
    pub fn is_streaming_fault(&self) -> bool {
        self.kind() == Some(ErrorKind::ResponseStreamingFault)
    }
}

impl StreamFault for ClientError {
    fn fault_kind(&self) -> Option<ErrorKind> {
        self.kind()
    }

    /// Server faults are passed through as received.
    fn to_error_frame(&self) -> ErrorDocument {
        match self {
            ClientError::Server { kind, message } => ErrorDocument {
                kind: kind.clone(),
                error: message.clone(),
            },
            other => ErrorDocument::new(ErrorKind::ResponseStreamingFault, other.to_string()),
        }
    }
}
