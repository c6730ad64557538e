use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::{BlobContext, BlobEncoding, BlobOp};

/// All protocol messages exchanged between the agent and a remote client.
///
/// Encoded as `{"type": "blob_start", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WireMessage {
    /// Announces a new incoming (or outgoing) blob
    BlobStart(BlobStart),

    /// One base64 slice of a blob
    BlobChunk(BlobChunk),

    /// All chunks sent; carries the checksum
    BlobEnd(BlobEnd),

    /// Ask the peer to send a file it holds
    BlobRequest(BlobRequest),

    /// Outcome of a blob operation
    BlobResult(BlobReply),

    /// Ask the source of truth for a page of history
    HistoryRequest(HistoryRequest),

    /// A page of history, or the initial load
    HistoryResult(HistoryResult<serde_json::Value>),
}

/// A message together with the peer it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: String,
    pub message: WireMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobStart {
    pub blob_id: String,
    pub filename: String,
    #[serde(default)]
    pub mime_type: String,
    pub total_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u32,
    #[serde(default)]
    pub encoding: BlobEncoding,
    #[serde(default)]
    pub context: BlobContext,
    /// Sender believes the receiver can already read `local_path`
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub same_device: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobChunk {
    pub blob_id: String,
    pub index: u32,
    /// Base64 payload
    pub data: String,
    /// Decoded length in bytes
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobEnd {
    pub blob_id: String,
    /// `sha256:<hex>` of the whole file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default)]
    pub total_received: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobRequest {
    pub blob_id: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
}

/// Structured result of a blob operation. Failures travel as
/// `success: false` plus an error string, never as a dropped message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobReply {
    pub blob_id: String,
    pub op: BlobOp,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_device: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<BlobContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_chunks: Option<Vec<u32>>,
}

impl BlobReply {
    pub fn ok(op: BlobOp, blob_id: impl Into<String>) -> Self {
        Self {
            blob_id: blob_id.into(),
            op,
            success: true,
            path: None,
            same_device: None,
            received: None,
            context: None,
            error: None,
            missing_chunks: None,
        }
    }

    pub fn failed(op: BlobOp, blob_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::ok(op, blob_id)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    pub conversation_id: String,
    /// Index before which older messages are wanted; absent for the initial load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_before: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResult<M> {
    pub conversation_id: String,
    pub messages: Vec<M>,
    pub total_count: u64,
    /// Echo of the request's `loadBefore`; its presence selects prepend
    /// over replace on the receiving side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_before: Option<u64>,
}

impl WireMessage {
    /// Serialize to a single JSON line (no trailing newline)
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(data)?)
    }
}

impl Envelope {
    /// Parse one line of the agent's stdio framing.
    pub fn from_line(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }
        Ok(serde_json::from_str(line)?)
    }
}
