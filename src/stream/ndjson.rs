//! Newline-delimited JSON encoding of frame streams.

use std::convert::Infallible;

use futures::stream::{self, Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{encode_frame, Frame, StreamFault};

/// Encode `frames` as NDJSON lines for a response body.
///
/// A fault becomes the final line and ends the body; the byte stream itself
/// never fails.
pub fn ndjson_lines<S, E>(frames: S) -> impl Stream<Item = Result<Vec<u8>, Infallible>>
where
    S: Stream<Item = Result<Frame, E>> + Unpin,
    E: StreamFault,
{
    stream::unfold(Some(frames), |state| async move {
        let mut frames = state?;
        match frames.next().await? {
            Ok(frame) => Some((Ok::<_, Infallible>(encode_frame(&frame)), Some(frames))),
            Err(err) => {
                log::error!("Fault after streaming began: {}", err);
                let line = encode_frame(&err.to_error_frame().to_frame());
                Some((Ok(line), None))
            }
        }
    })
}

/// Write `frames` to `writer` as NDJSON, flushing after every line.
///
/// Returns the number of frames written, not counting a trailing error line.
pub async fn write_ndjson<W, S, E>(writer: &mut W, frames: S) -> std::io::Result<usize>
where
    W: AsyncWrite + Unpin,
    S: Stream<Item = Result<Frame, E>>,
    E: StreamFault,
{
    let mut frames = std::pin::pin!(frames);
    let mut written = 0;
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(frame) => {
                writer.write_all(&encode_frame(&frame)).await?;
                writer.flush().await?;
                written += 1;
            }
            Err(err) => {
                log::error!("Fault after {} frame(s): {}", written, err);
                let line = encode_frame(&err.to_error_frame().to_frame());
                writer.write_all(&line).await?;
                writer.flush().await?;
                break;
            }
        }
    }
    Ok(written)
}
