use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by blob transfers.
#[derive(Error, Debug)]
pub enum BlobError {
    /// `blob_chunk` / `blob_end` for a blob that was never started (or was
    /// already cleaned up).
    #[error("Unknown transfer: {0}")]
    UnknownTransfer(String),

    /// `blob_start` reused the id of a transfer that is still active.
    #[error("Transfer already active: {0}")]
    DuplicateTransfer(String),

    #[error("Blob too large: {size} bytes (max {max})")]
    BlobTooLarge { size: u64, max: u64 },

    /// `totalChunks` disagrees with `ceil(totalSize / chunkSize)`.
    #[error("Inconsistent layout for {blob_id}: {total_size} bytes in {total_chunks} chunks of {chunk_size}")]
    InvalidLayout {
        blob_id: String,
        total_size: u64,
        chunk_size: u64,
        total_chunks: u32,
    },

    #[error("Too many chunks for {blob_id}: {total_chunks} (max {max})")]
    TooManyChunks {
        blob_id: String,
        total_chunks: u32,
        max: u32,
    },

    #[error("Chunk {index} out of range for {blob_id} ({total_chunks} chunks declared)")]
    ChunkOutOfRange {
        blob_id: String,
        index: u32,
        total_chunks: u32,
    },

    #[error("Invalid data in chunk {index} of {blob_id}: {source}")]
    InvalidChunkData {
        blob_id: String,
        index: u32,
        #[source]
        source: base64::DecodeError,
    },

    /// Decoded chunk length disagrees with its declared `size`, or exceeds
    /// the transfer's `chunkSize`.
    #[error("Chunk {index} of {blob_id} has {actual} bytes (expected {expected})")]
    ChunkSizeMismatch {
        blob_id: String,
        index: u32,
        expected: u64,
        actual: u64,
    },

    /// Stored chunks would add up to more than the declared `totalSize`.
    #[error("Blob {blob_id} exceeds its declared size: {received} bytes (declared {declared})")]
    ExceedsDeclaredSize {
        blob_id: String,
        received: u64,
        declared: u64,
    },

    /// Assembled length differs from the declared `totalSize`.
    #[error("Size mismatch for {blob_id}: expected {expected} bytes, assembled {actual}")]
    SizeMismatch {
        blob_id: String,
        expected: u64,
        actual: u64,
    },

    /// `blob_end` or a chunk arrived while the assembled file is being written.
    #[error("Write in progress: {0}")]
    WriteInProgress(String),

    /// A chunk arrived after the file had been assembled and written.
    #[error("Transfer already completed: {0}")]
    TransferCompleted(String),

    #[error("Missing chunks for {blob_id}: {missing:?}")]
    MissingChunks { blob_id: String, missing: Vec<u32> },

    #[error("Checksum mismatch for {blob_id}: expected {expected}, got sha256:{actual}")]
    ChecksumMismatch {
        blob_id: String,
        expected: String,
        actual: String,
    },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Path escapes uploads directory: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("Message channel closed")]
    ChannelClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BlobError {
    /// Indices the peer still has to send, when this is a `MissingChunks`.
    pub fn missing_chunks(&self) -> Option<&[u32]> {
        match self {
            BlobError::MissingChunks { missing, .. } => Some(missing),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BlobError>;
