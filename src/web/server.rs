//! Axum server for query requests.
//!
//! `POST /query` accepts a query document (or a registered-query reference) and
//! answers in one of two modes:
//!
//! - streaming (default): `application/x-ndjson`, one frame per line as the
//!   engine produces them;
//! - collapsing (`x-return-last-only: true`): `application/json`, the final
//!   frame only, or `204 No Content` when the engine produced none.
//!
//! Known faults found before the first byte is written are answered with
//! `400` and an error document. Unknown faults are logged and answered with a
//! bare `500`. After the first line, faults can only be reported in-band.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::engine::{EngineError, ExecuteOptions, QueryEngine};
use crate::error::Error;
use crate::query::QueryRequest;
use crate::registry::QueryRegistry;
use crate::schema::Schema;
use crate::stream::{
    collect_last, is_return_last_only, ndjson_lines, Frame, JSON_CONTENT_TYPE, NDJSON_CONTENT_TYPE,
    RETURN_LAST_ONLY_HEADER,
};

/// Response header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Catalog literal queries are checked against; `None` skips schema checks.
    pub schema: Option<Arc<Schema>>,
    pub registry: Arc<QueryRegistry>,
    pub engine: Arc<dyn QueryEngine>,
}

impl AppState {
    pub fn new(engine: impl QueryEngine + 'static) -> Self {
        Self {
            schema: None,
            registry: Arc::new(QueryRegistry::new()),
            engine: Arc::new(engine),
        }
    }

    pub fn with_schema(mut self, schema: Arc<Schema>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_registry(mut self, registry: Arc<QueryRegistry>) -> Self {
        self.registry = registry;
        self
    }
}

/// Build the axum router with all routes
pub fn router(state: AppState, cors: bool) -> Router {
    let app = Router::new()
        .route("/query", post(execute_query))
        .route("/queries", get(list_queries))
        .route("/health", get(health))
        .with_state(state);

    if cors {
        app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        app
    }
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(
    state: AppState,
    addr: &str,
    cors: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);
    log::info!(
        "{} registered quer{}",
        state.registry.len(),
        if state.registry.len() == 1 { "y" } else { "ies" }
    );

    axum::serve(listener, router(state, cors)).await?;
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
async fn health() -> &'static str {
    "ok"
}

/// GET /queries - ids of registered queries
async fn list_queries(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.registry.ids())
}

/// POST /query
async fn execute_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, UnhandledError> {
    let request_id = Uuid::new_v4().to_string();
    let return_last_only = is_return_last_only(
        headers
            .get(RETURN_LAST_ONLY_HEADER)
            .and_then(|value| value.to_str().ok()),
    );

    let request = match QueryRequest::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return reject(&request_id, Error::JsonParsing(e)),
    };
    let query = match request.resolve(state.schema.as_ref(), &state.registry) {
        Ok(query) => query,
        Err(e) => return reject(&request_id, e.into()),
    };

    log::info!(
        "[{}] query '{}' ({}) {}",
        request_id,
        query.name(),
        query.hash(),
        if return_last_only { "last-only" } else { "streaming" }
    );

    let options = ExecuteOptions::new(request_id.as_str()).with_return_last_only(return_last_only);
    let mut frames = state.engine.execute(query, options);

    if return_last_only {
        return match collect_last(frames).await {
            Ok(Some(frame)) => Ok(json_response(&request_id, frame)),
            Ok(None) => Ok((
                StatusCode::NO_CONTENT,
                [(request_id_header(), request_id.as_str())],
            )
                .into_response()),
            Err(e) => reject(&request_id, e.into()),
        };
    }

    // The status line is decided by the first frame
    let first = match frames.next().await {
        None => return Ok(ndjson_response(&request_id, Body::empty())),
        Some(Err(e)) => return reject(&request_id, e.into()),
        Some(Ok(frame)) => frame,
    };
    let frames = futures::stream::iter([Ok::<Frame, EngineError>(first)]).chain(frames);
    Ok(ndjson_response(&request_id, Body::from_stream(ndjson_lines(frames))))
}

fn request_id_header() -> HeaderName {
    HeaderName::from_static(REQUEST_ID_HEADER)
}

fn json_response(request_id: &str, frame: Frame) -> Response {
    (
        [
            (header::CONTENT_TYPE, JSON_CONTENT_TYPE),
            (request_id_header(), request_id),
        ],
        frame.to_string(),
    )
        .into_response()
}

fn ndjson_response(request_id: &str, body: Body) -> Response {
    (
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (request_id_header(), request_id),
        ],
        body,
    )
        .into_response()
}

/// Answer a fault found before anything was written.
fn reject(request_id: &str, err: Error) -> Result<Response, UnhandledError> {
    match err.to_document() {
        Some(doc) => {
            log::warn!("[{}] rejected: {}", request_id, doc.error);
            Ok((
                StatusCode::BAD_REQUEST,
                [(request_id_header(), request_id)],
                Json(doc),
            )
                .into_response())
        }
        None => Err(UnhandledError {
            request_id: request_id.to_string(),
            source: err,
        }),
    }
}

/// A fault this layer does not know how to present to clients.
#[derive(Debug)]
pub struct UnhandledError {
    request_id: String,
    source: Error,
}

impl IntoResponse for UnhandledError {
    fn into_response(self) -> Response {
        log::error!("[{}] unhandled fault: {}", self.request_id, self.source);
        (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
    }
}
