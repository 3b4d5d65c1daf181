use std::convert::Infallible;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tributary::engine::{EngineError, ExecuteOptions, MemoryEngine, QueryEngine};
use tributary::query::{QueryBuilder, QueryNode, RefOp};
use tributary::stream::{
    collect_last, ndjson_lines, write_ndjson, Frame, FrameReader, UNKNOWN_FAULT_MESSAGE,
};
use tributary::{ErrorDocument, ErrorKind};

fn engine() -> MemoryEngine {
    MemoryEngine::from_value(json!({
        "film": [
            {"film_id": 1, "title": "ACADEMY DINOSAUR"},
            {"film_id": 2, "title": "ACE GOLDFINGER"}
        ],
        "inventory": [
            {"inventory_id": 10, "film_id": 2, "store_id": 1},
            {"inventory_id": 11, "film_id": 2, "store_id": 2}
        ],
        "store": [{"store_id": 1}, {"store_id": 2}]
    }))
    .unwrap()
}

/// Two levels of deferred branches, so three frames.
fn films() -> Arc<QueryNode> {
    let store = QueryBuilder::new("store")
        .filter("store_id", RefOp::unchecked("inventory", "store_id"))
        .lazy()
        .one()
        .unwrap();
    let inventory = QueryBuilder::new("inventory")
        .select(["inventory_id"])
        .filter("film_id", RefOp::unchecked("film", "film_id"))
        .include("store", store)
        .lazy()
        .many()
        .unwrap();
    Arc::new(
        QueryBuilder::new("film")
            .select(["title"])
            .include("inventory", inventory)
            .many()
            .unwrap(),
    )
}

async fn encode<S>(frames: S) -> Vec<u8>
where
    S: futures::Stream<Item = Result<Frame, EngineError>> + Unpin,
{
    let chunks: Vec<Result<Vec<u8>, Infallible>> = ndjson_lines(frames).collect().await;
    chunks.into_iter().flat_map(|chunk| chunk.unwrap()).collect()
}

async fn decode(body: &[u8]) -> Vec<Frame> {
    let mut reader = FrameReader::new(body);
    let mut frames = Vec::new();
    while let Some(frame) = reader.next_frame().await.unwrap() {
        frames.push(frame);
    }
    frames
}

#[tokio::test]
async fn test_streaming_and_collapsing_agree() {
    let engine = engine();

    let body = encode(engine.execute(films(), ExecuteOptions::new("stream"))).await;
    let streamed = decode(&body).await;
    assert_eq!(streamed.len(), 3);

    let collapsed = collect_last(engine.execute(
        films(),
        ExecuteOptions::new("collapse").with_return_last_only(true),
    ))
    .await
    .unwrap();
    assert_eq!(collapsed.as_ref(), streamed.last());

    assert_eq!(
        collapsed.unwrap(),
        json!([
            {"title": "ACADEMY DINOSAUR", "inventory": []},
            {"title": "ACE GOLDFINGER", "inventory": [
                {"inventory_id": 10, "store": {"store_id": 1}},
                {"inventory_id": 11, "store": {"store_id": 2}}
            ]}
        ])
    );
}

#[tokio::test]
async fn test_one_frame_per_line() {
    let body = encode(engine().execute(films(), ExecuteOptions::new("lines"))).await;
    let text = String::from_utf8(body).unwrap();

    assert!(text.ends_with('\n'));
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    for line in lines {
        assert!(serde_json::from_str::<Value>(line).is_ok(), "{line}");
    }
}

#[tokio::test]
async fn test_empty_stream() {
    let frames = stream::iter(Vec::<Result<Frame, EngineError>>::new());
    assert!(encode(frames).await.is_empty());

    let frames = stream::iter(Vec::<Result<Frame, EngineError>>::new());
    assert_eq!(collect_last(frames).await.unwrap(), None);
}

#[tokio::test]
async fn test_known_fault_is_the_last_line() {
    let frames = stream::iter(vec![
        Ok(json!({"customer_id": 4, "store": {"$pending": "store"}})),
        Err(EngineError::Cardinality {
            name: "store".to_string(),
            expected: tributary::query::Cardinality::One,
            found: 0,
        }),
        Ok(json!({"never": "sent"})),
    ]);

    let decoded = decode(&encode(frames).await).await;
    assert_eq!(decoded.len(), 2);

    let doc = ErrorDocument::from_frame(&decoded[1]).unwrap();
    assert_eq!(doc.error_kind(), Some(ErrorKind::Cardinality));
    assert!(doc.error.contains("'store'"));
}

#[tokio::test]
async fn test_unknown_fault_hides_detail() {
    let frames = stream::iter(vec![
        Ok(json!({"film_id": 1})),
        Err(EngineError::Backend("connection reset by peer".to_string())),
    ]);

    let decoded = decode(&encode(frames).await).await;
    assert_eq!(
        decoded[1],
        json!({"type": "ResponseStreamingFault", "error": UNKNOWN_FAULT_MESSAGE})
    );
}

#[tokio::test]
async fn test_write_ndjson_counts_frames() {
    let frames = stream::iter(vec![
        Ok(json!(1)),
        Ok(json!(2)),
        Err(EngineError::UnknownTable("film".to_string())),
    ]);

    let mut out: Vec<u8> = Vec::new();
    let written = write_ndjson(&mut out, frames).await.unwrap();
    assert_eq!(written, 2);

    let decoded = decode(&out).await;
    assert_eq!(
        decoded,
        vec![
            json!(1),
            json!(2),
            json!({"type": "ReferenceError", "error": "unknown table 'film'"})
        ]
    );
}
