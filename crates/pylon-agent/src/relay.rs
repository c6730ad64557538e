//! Line-delimited JSON relay between a remote client and the blob manager.
//!
//! Each input line is an [`Envelope`]; every blob operation produces one
//! `blob_result` reply on the outbound queue, which a separate writer task
//! drains to the output stream.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use pylon_blob::{BlobError, BlobTransferManager, FileSystemAdapter, MessageChannel};
use pylon_shared::protocol::{BlobReply, Envelope, WireMessage};
use pylon_shared::types::BlobOp;
use pylon_shared::ProtocolError;

use crate::error::AgentError;

pub struct Relay<F, C> {
    blobs: Arc<BlobTransferManager<F, C>>,
}

impl<F, C> Relay<F, C>
where
    F: FileSystemAdapter,
    C: MessageChannel,
{
    pub fn new(blobs: Arc<BlobTransferManager<F, C>>) -> Self {
        Self { blobs }
    }

    /// Dispatch one envelope; returns the reply to send, if any.
    pub async fn handle(&self, envelope: Envelope) -> Option<WireMessage> {
        let from = envelope.from;
        let reply = match envelope.message {
            WireMessage::BlobStart(start) => {
                let blob_id = start.blob_id.clone();
                match self.blobs.start(start, &from).await {
                    Ok(outcome) => {
                        let mut reply = BlobReply::ok(BlobOp::Start, blob_id);
                        reply.path = outcome.path.map(|p| p.to_string_lossy().into_owned());
                        reply.same_device = outcome.same_device.then_some(true);
                        reply
                    }
                    Err(e) => failure(BlobOp::Start, blob_id, e),
                }
            }
            WireMessage::BlobChunk(chunk) => {
                let blob_id = chunk.blob_id.clone();
                match self.blobs.chunk(chunk).await {
                    Ok(received) => {
                        let mut reply = BlobReply::ok(BlobOp::Chunk, blob_id);
                        reply.received = Some(received);
                        reply
                    }
                    Err(e) => failure(BlobOp::Chunk, blob_id, e),
                }
            }
            WireMessage::BlobEnd(end) => {
                let blob_id = end.blob_id.clone();
                match self.blobs.end(end).await {
                    Ok(outcome) => {
                        self.blobs.cleanup(&blob_id).await;
                        let mut reply = BlobReply::ok(BlobOp::End, blob_id);
                        reply.path = Some(outcome.path.to_string_lossy().into_owned());
                        reply.context = Some(outcome.context);
                        reply.same_device = outcome.same_device.then_some(true);
                        reply
                    }
                    // transfer stays registered so the peer can retry
                    Err(e) => failure(BlobOp::End, blob_id, e),
                }
            }
            WireMessage::BlobRequest(request) => {
                let blob_id = request.blob_id.clone();
                match self.blobs.request(request, &from).await {
                    Ok(_) => BlobReply::ok(BlobOp::Request, blob_id),
                    Err(e) => failure(BlobOp::Request, blob_id, e),
                }
            }
            other => {
                warn!(from = %from, message = ?other, "Unsupported message, ignoring");
                return None;
            }
        };

        Some(WireMessage::BlobResult(reply))
    }
}

fn failure(op: BlobOp, blob_id: String, error: BlobError) -> BlobReply {
    debug!(blob_id = %blob_id, op = ?op, error = %error, "Blob operation failed");
    let mut reply = BlobReply::failed(op, blob_id, error.to_string());
    reply.missing_chunks = error.missing_chunks().map(<[u32]>::to_vec);
    reply
}

/// Read envelopes from `input` until EOF, queueing replies on `outbound`.
pub async fn serve<R, F, C>(
    relay: &Relay<F, C>,
    input: R,
    outbound: mpsc::Sender<WireMessage>,
) -> Result<(), AgentError>
where
    R: AsyncBufRead + Unpin,
    F: FileSystemAdapter,
    C: MessageChannel,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let envelope = match Envelope::from_line(&line) {
            Ok(envelope) => envelope,
            Err(ProtocolError::EmptyFrame) => continue,
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                continue;
            }
        };

        if let Some(reply) = relay.handle(envelope).await {
            outbound
                .send(reply)
                .await
                .map_err(|_| AgentError::OutboundClosed)?;
        }
    }
    Ok(())
}

/// Drain the outbound queue to `out`, one JSON message per line.
pub async fn write_outbound<W>(mut rx: mpsc::Receiver<WireMessage>, mut out: W) -> Result<(), AgentError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let mut line = message.to_json()?;
        line.push('\n');
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
    }
    Ok(())
}

/// Clean up every transfer idle for at least `max_idle`. Returns how many
/// were removed.
pub async fn sweep_idle<F, C>(blobs: &BlobTransferManager<F, C>, max_idle: Duration) -> usize
where
    F: FileSystemAdapter,
    C: MessageChannel,
{
    let mut removed = 0;
    for blob_id in blobs.idle_transfers(max_idle).await {
        if blobs.cleanup(&blob_id).await {
            warn!(blob_id = %blob_id, "Dropped idle blob transfer");
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use pylon_blob::TokioFs;
    use pylon_shared::checksum::format_checksum;
    use tempfile::TempDir;

    type TestRelay = Relay<TokioFs, mpsc::Sender<WireMessage>>;

    fn relay(dir: &TempDir) -> (TestRelay, Arc<BlobTransferManager<TokioFs, mpsc::Sender<WireMessage>>>, mpsc::Receiver<WireMessage>) {
        let (tx, rx) = mpsc::channel(64);
        let blobs = Arc::new(BlobTransferManager::new(dir.path(), TokioFs, tx));
        (Relay::new(blobs.clone()), blobs, rx)
    }

    fn envelope(json: serde_json::Value) -> Envelope {
        serde_json::from_value(serde_json::json!({ "from": "phone", "message": json })).unwrap()
    }

    fn reply(message: Option<WireMessage>) -> BlobReply {
        match message {
            Some(WireMessage::BlobResult(reply)) => reply,
            other => panic!("expected blob_result, got {:?}", other),
        }
    }

    fn start_json(blob_id: &str, total_chunks: u32) -> serde_json::Value {
        serde_json::json!({
            "type": "blob_start",
            "payload": {
                "blobId": blob_id,
                "filename": "hello.txt",
                "mimeType": "text/plain",
                "totalSize": 6,
                "chunkSize": 3,
                "totalChunks": total_chunks,
                "encoding": "base64",
                "context": { "conversationId": "conv-1", "messageId": "m1" }
            }
        })
    }

    fn chunk_json(blob_id: &str, index: u32, data: &str) -> serde_json::Value {
        serde_json::json!({
            "type": "blob_chunk",
            "payload": { "blobId": blob_id, "index": index, "data": data, "size": 3 }
        })
    }

    #[tokio::test]
    async fn test_full_upload_cleans_up() {
        let dir = TempDir::new().unwrap();
        let (relay, blobs, _rx) = relay(&dir);

        let r = reply(relay.handle(envelope(start_json("b1", 2))).await);
        assert!(r.success);
        assert_eq!(r.op, BlobOp::Start);
        assert_eq!(r.same_device, None);

        let r = reply(relay.handle(envelope(chunk_json("b1", 1, "ZGVm"))).await);
        assert_eq!(r.received, Some(1));
        let r = reply(relay.handle(envelope(chunk_json("b1", 0, "YWJj"))).await);
        assert_eq!(r.received, Some(2));

        let end = serde_json::json!({
            "type": "blob_end",
            "payload": { "blobId": "b1", "checksum": format_checksum(b"abcdef"), "totalReceived": 2 }
        });
        let r = reply(relay.handle(envelope(end)).await);
        assert!(r.success, "{:?}", r.error);
        let context = r.context.unwrap();
        assert_eq!(context.extra["messageId"], "m1");

        let written = dir.path().join("conv-1").join("hello.txt");
        assert_eq!(r.path.as_deref(), Some(&*written.to_string_lossy()));
        assert_eq!(std::fs::read(written).unwrap(), b"abcdef");
        assert_eq!(blobs.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_missing_chunks_reply_keeps_transfer() {
        let dir = TempDir::new().unwrap();
        let (relay, blobs, _rx) = relay(&dir);

        relay.handle(envelope(start_json("b1", 2))).await;
        relay.handle(envelope(chunk_json("b1", 0, "YWJj"))).await;

        let end = serde_json::json!({
            "type": "blob_end",
            "payload": { "blobId": "b1", "totalReceived": 1 }
        });
        let r = reply(relay.handle(envelope(end.clone())).await);
        assert!(!r.success);
        assert_eq!(r.missing_chunks, Some(vec![1]));
        assert_eq!(blobs.active_count().await, 1);

        relay.handle(envelope(chunk_json("b1", 1, "ZGVm"))).await;
        let r = reply(relay.handle(envelope(end)).await);
        assert!(r.success);
    }

    #[tokio::test]
    async fn test_unknown_transfer_reply() {
        let dir = TempDir::new().unwrap();
        let (relay, _blobs, _rx) = relay(&dir);

        let r = reply(relay.handle(envelope(chunk_json("ghost", 0, "YWJj"))).await);
        assert!(!r.success);
        assert!(r.error.unwrap().contains("Unknown transfer"));
    }

    #[tokio::test]
    async fn test_request_not_found_reply() {
        let dir = TempDir::new().unwrap();
        let (relay, _blobs, mut rx) = relay(&dir);

        let request = serde_json::json!({
            "type": "blob_request",
            "payload": { "blobId": "dl-1", "filename": "nope.png" }
        });
        let r = reply(relay.handle(envelope(request)).await);
        assert_eq!(r.op, BlobOp::Request);
        assert!(!r.success);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_serve_and_write_outbound() {
        let dir = TempDir::new().unwrap();
        let (relay, _blobs, _manager_rx) = relay(&dir);
        let (tx, rx) = mpsc::channel(16);

        let input = format!(
            "{}\n\nnot json\n{}\n",
            serde_json::json!({ "from": "phone", "message": start_json("b1", 2) }),
            serde_json::json!({ "from": "phone", "message": chunk_json("b1", 0, "YWJj") }),
        );
        serve(&relay, input.as_bytes(), tx).await.unwrap();

        let mut out = Vec::new();
        write_outbound(rx, &mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let second = WireMessage::from_json(lines[1]).unwrap();
        match second {
            WireMessage::BlobResult(r) => assert_eq!(r.received, Some(1)),
            other => panic!("expected blob_result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sweep_idle() {
        let dir = TempDir::new().unwrap();
        let (relay, blobs, _rx) = relay(&dir);
        relay.handle(envelope(start_json("b1", 2))).await;

        assert_eq!(sweep_idle(&*blobs, Duration::from_secs(3600)).await, 0);
        assert_eq!(sweep_idle(&*blobs, Duration::ZERO).await, 1);
        assert_eq!(blobs.active_count().await, 0);
    }
}
