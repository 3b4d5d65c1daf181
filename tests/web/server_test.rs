use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde_json::{json, Map, Value};
use tributary::client::{ClientError, QueryClient};
use tributary::engine::{EngineError, ExecuteOptions, FrameStream, MemoryEngine, QueryEngine};
use tributary::query::{QueryBuilder, QueryNode, QueryParam, RefOp};
use tributary::registry::QueryRegistry;
use tributary::schema::{ColumnSchema, Schema};
use tributary::stream::{NDJSON_CONTENT_TYPE, RETURN_LAST_ONLY_HEADER};
use tributary::web::{router, AppState, REQUEST_ID_HEADER};
use tributary::ErrorKind;

fn rental_data() -> MemoryEngine {
    MemoryEngine::from_value(json!({
        "customer": [
            {"customer_id": 1, "store_id": 1},
            {"customer_id": 4, "store_id": 2}
        ],
        "store": [{"store_id": 1}, {"store_id": 2}],
        "payment": [
            {"payment_id": 10, "customer_id": 4},
            {"payment_id": 11, "customer_id": 4}
        ]
    }))
    .unwrap()
}

/// Produces no frames at all.
struct Silent;

impl QueryEngine for Silent {
    fn execute(&self, _query: Arc<QueryNode>, _options: ExecuteOptions) -> FrameStream {
        stream::empty().boxed()
    }
}

/// Fails inside the backend before producing anything.
struct Broken;

impl QueryEngine for Broken {
    fn execute(&self, _query: Arc<QueryNode>, _options: ExecuteOptions) -> FrameStream {
        stream::iter([Err(EngineError::Backend("disk on fire".to_string()))]).boxed()
    }
}

async fn spawn(state: AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state, true)).await.unwrap();
    });
    format!("http://{}", addr)
}

fn customer_with_payments() -> QueryNode {
    let payments = QueryBuilder::new("payment")
        .select(["payment_id"])
        .filter("customer_id", RefOp::unchecked("customer", "customer_id"))
        .lazy()
        .many()
        .unwrap();
    QueryBuilder::new("customer")
        .select(["customer_id"])
        .filter("customer_id", json!(4))
        .include("payments", payments)
        .one()
        .unwrap()
}

async fn collect(frames: tributary::client::ClientFrameStream) -> Vec<Result<Value, ClientError>> {
    frames.collect().await
}

#[tokio::test]
async fn test_streams_frames_as_they_resolve() {
    let base = spawn(AppState::new(rental_data())).await;
    let client = QueryClient::new(&base).unwrap();

    let frames: Vec<Value> = collect(client.fetch(&customer_with_payments()).await.unwrap())
        .await
        .into_iter()
        .map(|frame| frame.unwrap())
        .collect();

    assert_eq!(
        frames,
        vec![
            json!({"customer_id": 4, "payments": {"$pending": "payment-customer_id"}}),
            json!({"customer_id": 4, "payments": [{"payment_id": 10}, {"payment_id": 11}]}),
        ]
    );
}

#[tokio::test]
async fn test_last_only_matches_final_frame() {
    let base = spawn(AppState::new(rental_data())).await;
    let client = QueryClient::new(&base).unwrap();
    let query = customer_with_payments();

    let streamed = collect(client.fetch(&query).await.unwrap()).await;
    let last = client.fetch_last(&query).await.unwrap();

    assert_eq!(last.as_ref(), streamed.last().unwrap().as_ref().ok());
}

#[tokio::test]
async fn test_response_headers() {
    let base = spawn(AppState::new(rental_data())).await;
    let http = reqwest::Client::new();
    let body = customer_with_payments().to_value();

    let streaming = http
        .post(format!("{}/query", base))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(streaming.status(), 200);
    assert_eq!(
        streaming.headers()["content-type"].to_str().unwrap(),
        NDJSON_CONTENT_TYPE
    );
    assert!(streaming.headers().contains_key(REQUEST_ID_HEADER));

    let collapsed = http
        .post(format!("{}/query", base))
        .header(RETURN_LAST_ONLY_HEADER, "true")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(collapsed.status(), 200);
    assert_eq!(
        collapsed.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );
    let value: Value = collapsed.json().await.unwrap();
    assert_eq!(value["payments"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_no_frames_is_no_content() {
    let base = spawn(AppState::new(Silent)).await;
    let client = QueryClient::new(&base).unwrap();
    let query = QueryBuilder::new("film").many().unwrap();

    assert_eq!(client.fetch_last(&query).await.unwrap(), None);
    assert!(collect(client.fetch(&query).await.unwrap()).await.is_empty());
}

#[tokio::test]
async fn test_unparseable_body_is_rejected() {
    let base = spawn(AppState::new(rental_data())).await;

    let response = reqwest::Client::new()
        .post(format!("{}/query", base))
        .body("{\"from\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let doc: Value = response.json().await.unwrap();
    assert_eq!(doc["type"], "JsonParsingError");

    let client = QueryClient::new(&base).unwrap();
    let err = client
        .fetch_document(&json!({"from": "film", "bogus": true}))
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), Some(ErrorKind::JsonParsing));
}

#[tokio::test]
async fn test_unsafe_tree_is_rejected_before_execution() {
    let base = spawn(AppState::new(rental_data())).await;
    let client = QueryClient::new(&base).unwrap();

    let document = json!({
        "from": "customer",
        "include": {"store": {"from": "store", "cardinality": "one"}}
    });
    let err = client.fetch_document(&document).await.err().unwrap();
    assert_eq!(err.kind(), Some(ErrorKind::NestedQueryMissingJoinPredicate));

    let err = client.fetch_document_last(&document).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::NestedQueryMissingJoinPredicate));
}

#[tokio::test]
async fn test_schema_reference_errors() {
    let schema = Arc::new(Schema::default().with_table(
        "customer",
        [
            ("customer_id", ColumnSchema::new("integer").primary_key()),
            ("store_id", ColumnSchema::new("integer")),
        ],
    ));
    let base = spawn(AppState::new(rental_data()).with_schema(schema)).await;
    let client = QueryClient::new(&base).unwrap();

    let err = client
        .fetch_document(&json!({"from": "customer", "select": ["email"]}))
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), Some(ErrorKind::Reference));

    let frames = collect(
        client
            .fetch_document(&json!({"from": "customer", "where": {"customer_id": 1}}))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(
        frames[0].as_ref().unwrap(),
        &json!([{"customer_id": 1, "store_id": 1}])
    );
}

#[tokio::test]
async fn test_fault_before_first_frame() {
    // A known fault is a client error
    let base = spawn(AppState::new(rental_data())).await;
    let client = QueryClient::new(&base).unwrap();
    let query = QueryBuilder::new("customer").one().unwrap();

    let err = client.fetch(&query).await.err().unwrap();
    assert_eq!(err.kind(), Some(ErrorKind::Cardinality));

    // An unknown one is a bare 500
    let base = spawn(AppState::new(Broken)).await;
    let client = QueryClient::new(&base).unwrap();
    let err = client.fetch(&query).await.err().unwrap();
    assert!(matches!(err, ClientError::Status(500)));
}

#[tokio::test]
async fn test_fault_after_first_frame_ends_the_stream() {
    let base = spawn(AppState::new(rental_data())).await;
    let client = QueryClient::new(&base).unwrap();

    // Customer 4 has two payments, so the deferred `one` fails in the second wave
    let payment = QueryBuilder::new("payment")
        .filter("customer_id", RefOp::unchecked("customer", "customer_id"))
        .lazy()
        .one()
        .unwrap();
    let query = QueryBuilder::new("customer")
        .filter("customer_id", json!(4))
        .include("payment", payment)
        .one()
        .unwrap();

    let frames = collect(client.fetch(&query).await.unwrap()).await;
    assert_eq!(frames.len(), 2);
    assert!(frames[0].is_ok());
    let err = frames[1].as_ref().unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Cardinality));
    assert!(!err.is_streaming_fault());
}

#[tokio::test]
async fn test_registered_queries() {
    let registry = QueryRegistry::new();
    let id = registry.register(
        QueryBuilder::new("customer")
            .select(["store_id"])
            .filter("customer_id", QueryParam::unbound("id"))
            .one()
            .unwrap(),
    );
    let base = spawn(AppState::new(rental_data()).with_registry(Arc::new(registry))).await;
    let client = QueryClient::new(&base).unwrap();

    let mut params = Map::new();
    params.insert("id".to_string(), json!(4));
    assert_eq!(
        client.fetch_registered_last(&id, params).await.unwrap(),
        Some(json!({"store_id": 2}))
    );

    let err = client
        .fetch_registered(&id, Map::new())
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), Some(ErrorKind::MissingParameter));

    let err = client
        .fetch_registered("0", Map::new())
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), Some(ErrorKind::UnregisteredQuery));

    let ids: Vec<String> = reqwest::get(format!("{}/queries", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ids, vec![id]);
}

#[tokio::test]
async fn test_health() {
    let base = spawn(AppState::new(Silent)).await;
    let body = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_row_shaped_like_an_error_line() {
    let engine = MemoryEngine::from_value(json!({
        "audit": [{"audit_id": 1, "type": "login", "error": "bad password"}]
    }))
    .unwrap();
    let base = spawn(AppState::new(engine)).await;
    let client = QueryClient::new(&base).unwrap();

    // Exactly `type` and `error` as strings reads as an error line when streamed
    let query = QueryBuilder::new("audit")
        .select(["type", "error"])
        .filter("audit_id", json!(1))
        .maybe()
        .unwrap();
    let frames = collect(client.fetch(&query).await.unwrap()).await;
    match frames.as_slice() {
        [Err(ClientError::Server { kind, message })] => {
            assert_eq!(kind, "login");
            assert_eq!(message, "bad password");
        }
        other => panic!("unexpected frames: {other:?}"),
    }

    // Collapsed, the same row is plain data
    assert_eq!(
        client.fetch_last(&query).await.unwrap(),
        Some(json!({"type": "login", "error": "bad password"}))
    );

    // Any third key makes it a data frame again
    let wider = query.to_builder().select(["audit_id", "type", "error"]).maybe().unwrap();
    let frames = collect(client.fetch(&wider).await.unwrap()).await;
    assert_eq!(
        frames[0].as_ref().unwrap(),
        &json!({"audit_id": 1, "type": "login", "error": "bad password"})
    );
}
