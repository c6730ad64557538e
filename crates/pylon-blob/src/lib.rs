//! # pylon-blob
//!
//! Chunked blob transfer between the agent and remote clients.
//!
//! Incoming files arrive as `blob_start`, any number of `blob_chunk`
//! messages in any order, then `blob_end`; the [`BlobTransferManager`]
//! assembles them, verifies the SHA-256 checksum and writes the file under
//! the uploads directory. Outgoing files are split into chunks and pushed
//! through a [`MessageChannel`]. Filesystem access goes through the
//! [`FileSystemAdapter`] seam so embedders decide where bytes live.

pub mod channel;
pub mod error;
pub mod fs;
pub mod manager;
pub mod path;
pub mod transfer;

pub use channel::MessageChannel;
pub use error::{BlobError, Result};
pub use fs::{FileSystemAdapter, TokioFs};
pub use manager::{chunk_count, BlobLimits, BlobTransferManager, EndOutcome, StartOutcome};
pub use transfer::{BlobTransfer, TransferState};
