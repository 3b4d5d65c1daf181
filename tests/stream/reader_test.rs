use futures::StreamExt;
use serde_json::json;
use tokio::io::{AsyncWriteExt, BufReader};
use tributary::stream::{encode_frame, Frame, FrameReader};

async fn read_all(body: &[u8]) -> (Vec<Frame>, usize) {
    let mut reader = FrameReader::new(body);
    let mut frames = Vec::new();
    while let Some(frame) = reader.next_frame().await.unwrap() {
        frames.push(frame);
    }
    (frames, reader.malformed_count())
}

#[tokio::test]
async fn test_frames_split_across_chunks() {
    let expected = vec![
        json!({"customer_id": 4, "store": {"$pending": "store-store_id"}}),
        json!({"customer_id": 4, "store": {"store_id": 1, "name": "Montr\u{e9}al \u{1F3AC}"}}),
    ];
    let body: Vec<u8> = expected.iter().flat_map(encode_frame).collect();

    // A tiny pipe and three-byte writes: no write lines up with a frame
    // boundary, and multibyte characters are cut in half.
    let (mut tx, rx) = tokio::io::duplex(8);
    let writer = tokio::spawn(async move {
        for chunk in body.chunks(3) {
            tx.write_all(chunk).await.unwrap();
        }
    });

    let frames: Vec<Frame> = FrameReader::new(BufReader::new(rx))
        .into_stream()
        .map(|frame| frame.unwrap())
        .collect()
        .await;
    writer.await.unwrap();

    assert_eq!(frames, expected);
}

#[tokio::test]
async fn test_malformed_lines_are_skipped() {
    let body = b"{\"a\":1}\n{\"a\":\nnot json\n{\"a\":2}\n";
    let (frames, malformed) = read_all(body).await;

    assert_eq!(frames, vec![json!({"a": 1}), json!({"a": 2})]);
    assert_eq!(malformed, 2);
}

#[tokio::test]
async fn test_blank_lines_and_crlf() {
    let body = b"\n{\"a\":1}\r\n   \r\n{\"a\":2}\r\n\n";
    let (frames, malformed) = read_all(body).await;

    assert_eq!(frames, vec![json!({"a": 1}), json!({"a": 2})]);
    assert_eq!(malformed, 0);
}

#[tokio::test]
async fn test_last_line_without_newline() {
    let (frames, _) = read_all(b"{\"a\":1}\n[1,2]").await;
    assert_eq!(frames, vec![json!({"a": 1}), json!([1, 2])]);
}

#[tokio::test]
async fn test_end_of_stream_is_sticky() {
    let mut reader = FrameReader::new(&b"7\n"[..]);

    assert_eq!(reader.next_frame().await.unwrap(), Some(json!(7)));
    assert_eq!(reader.next_frame().await.unwrap(), None);
    assert_eq!(reader.next_frame().await.unwrap(), None);
    assert_eq!(reader.line_count(), 1);
}

#[tokio::test]
async fn test_empty_body() {
    let (frames, malformed) = read_all(b"").await;
    assert!(frames.is_empty());
    assert_eq!(malformed, 0);
}
