//! HTTP client for the query endpoint.

use std::io;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{json, Map, Value};
use tokio_util::io::StreamReader;

use super::error::{ClientError, ClientResult};
use crate::config::ClientSettings;
use crate::error::ErrorDocument;
use crate::query::{QueryNode, REGISTERED_QUERY};
use crate::stream::{Frame, FrameReader, RETURN_LAST_ONLY_HEADER};

/// Default connect timeout (30 seconds).
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Frames of one response, decoded as each line arrives.
///
/// An in-band error line ends the stream as [`ClientError::Server`].
pub type ClientFrameStream = BoxStream<'static, ClientResult<Frame>>;

/// Client for a server's `POST /query` endpoint.
///
/// # Example
///
/// ```ignore
/// use futures::StreamExt;
/// use tributary::client::QueryClient;
///
/// let client = QueryClient::new("http://127.0.0.1:4417")?;
/// let mut frames = client.fetch(&query).await?;
/// while let Some(frame) = frames.next().await {
///     println!("{}", frame?);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct QueryClient {
    http: reqwest::Client,
    endpoint: String,
}

impl QueryClient {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        Self::with_connect_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Streams may legitimately stay open for a long time, so only
    /// connecting is bounded.
    pub fn with_connect_timeout(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder().connect_timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/query", base_url.trim_end_matches('/')),
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> ClientResult<Self> {
        let base_url = settings
            .resolved_base_url()
            .map_err(|_| ClientError::InvalidUrl(settings.base_url.clone()))?;
        Self::with_connect_timeout(&base_url, Duration::from_secs(settings.timeout_secs))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Stream every frame of `query`.
    pub async fn fetch(&self, query: &QueryNode) -> ClientResult<ClientFrameStream> {
        self.fetch_document(&query.to_value()).await
    }

    /// Stream every frame of a registered query.
    pub async fn fetch_registered(
        &self,
        query_id: &str,
        params: Map<String, Value>,
    ) -> ClientResult<ClientFrameStream> {
        self.fetch_document(&registered(query_id, params)).await
    }

    /// Stream every frame of a raw request document.
    pub async fn fetch_document(&self, document: &Value) -> ClientResult<ClientFrameStream> {
        let response = self.send(document, false).await?;
        Ok(frames(response))
    }

    /// The final frame of `query`, or `None` if the server produced none.
    pub async fn fetch_last(&self, query: &QueryNode) -> ClientResult<Option<Frame>> {
        self.fetch_document_last(&query.to_value()).await
    }

    pub async fn fetch_registered_last(
        &self,
        query_id: &str,
        params: Map<String, Value>,
    ) -> ClientResult<Option<Frame>> {
        self.fetch_document_last(&registered(query_id, params)).await
    }

    pub async fn fetch_document_last(&self, document: &Value) -> ClientResult<Option<Frame>> {
        let response = self.send(document, true).await?;
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let body = response.bytes().await?;
        Ok(Some(serde_json::from_slice(&body)?))
    }

    async fn send(&self, document: &Value, last_only: bool) -> ClientResult<reqwest::Response> {
        let mut request = self.http.post(&self.endpoint).json(document);
        if last_only {
            request = request.header(RETURN_LAST_ONLY_HEADER, "true");
        }

        let response = request.send().await?;
        let status = response.status();
        if !(status.is_client_error() || status.is_server_error()) {
            return Ok(response);
        }

        let body = response.bytes().await?;
        let doc = serde_json::from_slice::<Value>(&body)
            .ok()
            .and_then(|value| ErrorDocument::from_frame(&value));
        Err(match doc {
            Some(doc) => ClientError::from_document(doc),
            None => ClientError::Status(status.as_u16()),
        })
    }
}

fn registered(query_id: &str, params: Map<String, Value>) -> Value {
    json!({
        "type": REGISTERED_QUERY,
        "queryId": query_id,
        "params": params,
    })
}

fn frames(response: reqwest::Response) -> ClientFrameStream {
    let body = Box::pin(
        response
            .bytes_stream()
            .map(|chunk| chunk.map_err(io::Error::other)),
    );
    let reader = FrameReader::new(StreamReader::new(body));

    stream::unfold(Some(reader), |state| async move {
        let mut reader = state?;
        match reader.next_frame().await {
            Ok(Some(frame)) => match ErrorDocument::from_frame(&frame) {
                Some(doc) => Some((Err(ClientError::from_document(doc)), None)),
                None => Some((Ok(frame), Some(reader))),
            },
            Ok(None) => {
                if reader.malformed_count() > 0 {
                    log::warn!(
                        "Response ended; {} malformed line(s) were skipped",
                        reader.malformed_count()
                    );
                }
                None
            }
            Err(e) => Some((Err(ClientError::Io(e)), None)),
        }
    })
    .boxed()
}
