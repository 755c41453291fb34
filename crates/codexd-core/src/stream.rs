//! Rewriting pump for translated SSE streams.
//!
//! The upstream body arrives as raw bytes with records split at
//! arbitrary points; the pump reassembles records, hands each data
//! payload to the rewriter, and re-frames whatever comes back.

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use codexd_protocol::sse::SseReader;

use crate::upstream::UpstreamError;

/// Bridge an upstream SSE byte stream through a rewriter. The
/// downstream closes when the upstream does; a mid-stream transport
/// error terminates the stream without retry.
pub fn rewrite_sse<F>(
    mut upstream: BoxStream<'static, Result<Bytes, UpstreamError>>,
    mut rewrite: F,
) -> ReceiverStream<Bytes>
where
    F: FnMut(&str) -> Vec<Bytes> + Send + 'static,
{
    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(64);
    tokio::spawn(async move {
        let mut reader = SseReader::new();
        while let Some(chunk) = upstream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    debug!(%err, "upstream stream ended with transport error");
                    return;
                }
            };
            for frame in reader.feed(&chunk) {
                if frame.data.is_empty() || frame.data == "[DONE]" {
                    continue;
                }
                for out in rewrite(&frame.data) {
                    if tx.send(out).await.is_err() {
                        return;
                    }
                }
            }
        }
        for frame in reader.close() {
            if frame.data.is_empty() || frame.data == "[DONE]" {
                continue;
            }
            for out in rewrite(&frame.data) {
                if tx.send(out).await.is_err() {
                    return;
                }
            }
        }
    });
    ReceiverStream::new(rx)
}
