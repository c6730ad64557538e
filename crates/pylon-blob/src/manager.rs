//! Blob transfer registry and protocol handlers.
//!
//! Every active transfer lives in one map keyed by blob id. Entries are
//! only ever removed by [`BlobTransferManager::cleanup`]; callers that want
//! an idle timeout query [`BlobTransferManager::idle_transfers`] and clean
//! up themselves. The registry lock is never held across filesystem I/O.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use pylon_shared::checksum::{digest_matches, format_checksum, sha256_hex};
use pylon_shared::constants::{CHUNK_SIZE, MAX_FILE_SIZE, MAX_TOTAL_CHUNKS};
use pylon_shared::filename::{mime_type, sanitize_filename};
use pylon_shared::protocol::{BlobChunk, BlobEnd, BlobRequest, BlobStart, WireMessage};
use pylon_shared::types::{BlobContext, BlobEncoding};

use crate::channel::MessageChannel;
use crate::error::{BlobError, Result};
use crate::fs::FileSystemAdapter;
use crate::path;
use crate::transfer::{BlobTransfer, TransferState};

/// Number of chunks needed for `size` bytes.
pub fn chunk_count(size: u64, chunk_size: usize) -> u32 {
    size.div_ceil(chunk_size as u64) as u32
}

#[derive(Debug, Clone, Copy)]
pub struct BlobLimits {
    /// Largest blob accepted in either direction.
    pub max_blob_size: u64,
    /// Largest `totalChunks` a `blob_start` may declare.
    pub max_chunks: u32,
}

impl Default for BlobLimits {
    fn default() -> Self {
        Self {
            max_blob_size: MAX_FILE_SIZE as u64,
            max_chunks: MAX_TOTAL_CHUNKS,
        }
    }
}

/// Result of a successful `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOutcome {
    /// Set only when the same-device shortcut resolved the file.
    pub path: Option<PathBuf>,
    pub same_device: bool,
}

/// Result of a successful `end`.
#[derive(Debug, Clone, PartialEq)]
pub struct EndOutcome {
    pub path: PathBuf,
    pub context: BlobContext,
    pub same_device: bool,
}

pub struct BlobTransferManager<F, C> {
    uploads_dir: PathBuf,
    fs: F,
    channel: C,
    limits: BlobLimits,
    transfers: Mutex<HashMap<String, BlobTransfer>>,
}

impl<F, C> BlobTransferManager<F, C>
where
    F: FileSystemAdapter,
    C: MessageChannel,
{
    pub fn new(uploads_dir: impl Into<PathBuf>, fs: F, channel: C) -> Self {
        Self::with_limits(uploads_dir, fs, channel, BlobLimits::default())
    }

    pub fn with_limits(uploads_dir: impl Into<PathBuf>, fs: F, channel: C, limits: BlobLimits) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
            fs,
            channel,
            limits,
            transfers: Mutex::new(HashMap::new()),
        }
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    /// Register an incoming blob.
    pub async fn start(&self, payload: BlobStart, sender_id: &str) -> Result<StartOutcome> {
        if self.is_active(&payload.blob_id).await {
            return Err(BlobError::DuplicateTransfer(payload.blob_id));
        }
        self.check_layout(&payload)?;

        let filename = sanitize_filename(&payload.filename);
        let save_path = path::save_path(&self.uploads_dir, &payload.context, &filename)?;
        let dir = path::destination_dir(&self.uploads_dir, &payload.context);
        self.fs.mkdir(&dir).await?;

        let local = match (&payload.local_path, payload.same_device) {
            (Some(local_path), true) => {
                let local_path = PathBuf::from(local_path);
                if self.fs.exists(&local_path).await {
                    Some(local_path)
                } else {
                    debug!(
                        blob_id = %payload.blob_id,
                        local_path = %local_path.display(),
                        "Same-device path missing, falling back to chunked transfer"
                    );
                    None
                }
            }
            _ => None,
        };

        let state = match &local {
            Some(path) => TransferState::Local { path: path.clone() },
            None => TransferState::Streaming {
                chunks: BTreeMap::new(),
            },
        };

        let mime = if payload.mime_type.is_empty() {
            mime_type(&filename).to_string()
        } else {
            payload.mime_type
        };

        let mut transfers = self.transfers.lock().await;
        // a concurrent start for the same id may have won while unlocked
        if transfers.contains_key(&payload.blob_id) {
            return Err(BlobError::DuplicateTransfer(payload.blob_id));
        }

        info!(
            blob_id = %payload.blob_id,
            sender = %sender_id,
            filename = %filename,
            size = payload.total_size,
            chunks = payload.total_chunks,
            same_device = local.is_some(),
            "Blob transfer started"
        );

        transfers.insert(
            payload.blob_id.clone(),
            BlobTransfer {
                blob_id: payload.blob_id,
                filename,
                mime_type: mime,
                save_path,
                total_size: payload.total_size,
                chunk_size: payload.chunk_size,
                total_chunks: payload.total_chunks,
                received_bytes: 0,
                encoding: payload.encoding,
                sender_id: sender_id.to_string(),
                context: payload.context,
                state,
                last_activity: Instant::now(),
            },
        );

        Ok(StartOutcome {
            same_device: local.is_some(),
            path: local,
        })
    }

    /// Size limit, chunk-count limit, and `totalChunks == ceil(totalSize / chunkSize)`.
    fn check_layout(&self, payload: &BlobStart) -> Result<()> {
        if payload.total_size > self.limits.max_blob_size {
            return Err(BlobError::BlobTooLarge {
                size: payload.total_size,
                max: self.limits.max_blob_size,
            });
        }
        if payload.total_chunks > self.limits.max_chunks {
            return Err(BlobError::TooManyChunks {
                blob_id: payload.blob_id.clone(),
                total_chunks: payload.total_chunks,
                max: self.limits.max_chunks,
            });
        }

        let expected = match (payload.total_size, payload.chunk_size) {
            (0, _) => Some(0),
            (_, 0) => None,
            (size, chunk_size) => Some(size.div_ceil(chunk_size)),
        };
        if expected != Some(u64::from(payload.total_chunks)) {
            return Err(BlobError::InvalidLayout {
                blob_id: payload.blob_id.clone(),
                total_size: payload.total_size,
                chunk_size: payload.chunk_size,
                total_chunks: payload.total_chunks,
            });
        }
        Ok(())
    }

    /// Store one chunk. Returns the number of distinct indices held.
    pub async fn chunk(&self, payload: BlobChunk) -> Result<u32> {
        let mut transfers = self.transfers.lock().await;
        let transfer = transfers
            .get_mut(&payload.blob_id)
            .ok_or_else(|| BlobError::UnknownTransfer(payload.blob_id.clone()))?;
        transfer.touch();

        let total_chunks = transfer.total_chunks;
        let total_size = transfer.total_size;
        let chunk_size = transfer.chunk_size;
        let chunks = match &mut transfer.state {
            TransferState::Local { .. } => {
                trace!(blob_id = %payload.blob_id, index = payload.index, "Discarding chunk for same-device blob");
                return Ok(0);
            }
            TransferState::Writing { .. } => {
                return Err(BlobError::WriteInProgress(payload.blob_id));
            }
            TransferState::Written { .. } => {
                return Err(BlobError::TransferCompleted(payload.blob_id));
            }
            TransferState::Streaming { chunks } => chunks,
        };

        if payload.index >= total_chunks {
            return Err(BlobError::ChunkOutOfRange {
                blob_id: payload.blob_id,
                index: payload.index,
                total_chunks,
            });
        }

        let bytes = STANDARD
            .decode(payload.data.as_bytes())
            .map_err(|source| BlobError::InvalidChunkData {
                blob_id: payload.blob_id.clone(),
                index: payload.index,
                source,
            })?;

        let actual = bytes.len() as u64;
        if actual != payload.size || actual > chunk_size {
            let expected = if actual != payload.size { payload.size } else { chunk_size };
            return Err(BlobError::ChunkSizeMismatch {
                blob_id: payload.blob_id,
                index: payload.index,
                expected,
                actual,
            });
        }

        let replaced = chunks.get(&payload.index).map_or(0, |b| b.len() as u64);
        let received_bytes = transfer.received_bytes - replaced + actual;
        if received_bytes > total_size {
            warn!(
                blob_id = %payload.blob_id,
                received_bytes,
                total_size,
                "Chunk would exceed declared blob size"
            );
            return Err(BlobError::ExceedsDeclaredSize {
                blob_id: payload.blob_id,
                received: received_bytes,
                declared: total_size,
            });
        }

        chunks.insert(payload.index, bytes);
        transfer.received_bytes = received_bytes;
        let received = chunks.len() as u32;
        trace!(blob_id = %payload.blob_id, index = payload.index, received, "Stored chunk");
        Ok(received)
    }

    /// Assemble, verify and write a blob.
    ///
    /// A failed `end` leaves the transfer active so the peer can resend
    /// missing chunks or the whole file.
    pub async fn end(&self, payload: BlobEnd) -> Result<EndOutcome> {
        let (buffer, save_path, context) = {
            let mut transfers = self.transfers.lock().await;
            let transfer = transfers
                .get_mut(&payload.blob_id)
                .ok_or_else(|| BlobError::UnknownTransfer(payload.blob_id.clone()))?;
            transfer.touch();

            match &transfer.state {
                TransferState::Local { path } => {
                    return Ok(EndOutcome {
                        path: path.clone(),
                        context: transfer.context.clone(),
                        same_device: true,
                    });
                }
                TransferState::Written { path } => {
                    return Ok(EndOutcome {
                        path: path.clone(),
                        context: transfer.context.clone(),
                        same_device: false,
                    });
                }
                TransferState::Writing { .. } => {
                    return Err(BlobError::WriteInProgress(payload.blob_id));
                }
                TransferState::Streaming { .. } => {}
            }

            let missing = transfer.missing_chunks();
            if !missing.is_empty() {
                warn!(
                    blob_id = %payload.blob_id,
                    missing = missing.len(),
                    "Blob ended with missing chunks"
                );
                return Err(BlobError::MissingChunks {
                    blob_id: payload.blob_id,
                    missing,
                });
            }

            if payload.total_received != transfer.received_count() {
                debug!(
                    blob_id = %payload.blob_id,
                    reported = payload.total_received,
                    stored = transfer.received_count(),
                    "Sender's chunk count differs from ours"
                );
            }

            let buffer = transfer.assemble();
            if buffer.len() as u64 != transfer.total_size {
                return Err(BlobError::SizeMismatch {
                    blob_id: payload.blob_id,
                    expected: transfer.total_size,
                    actual: buffer.len() as u64,
                });
            }

            if let Some(expected) = &payload.checksum {
                let actual = sha256_hex(&buffer);
                if !digest_matches(expected, &actual) {
                    warn!(blob_id = %payload.blob_id, "Blob checksum mismatch");
                    return Err(BlobError::ChecksumMismatch {
                        blob_id: payload.blob_id,
                        expected: expected.clone(),
                        actual,
                    });
                }
            }

            transfer.begin_write();
            (buffer, transfer.save_path.clone(), transfer.context.clone())
        };

        let written = self.fs.write_file(&save_path, &buffer).await;

        let mut transfers = self.transfers.lock().await;
        let transfer = transfers.get_mut(&payload.blob_id);
        if let Err(e) = written {
            warn!(blob_id = %payload.blob_id, error = %e, "Failed to write blob");
            if let Some(transfer) = transfer {
                transfer.abort_write();
            }
            return Err(e.into());
        }

        match transfer {
            Some(transfer) => transfer.finish_write(),
            None => debug!(blob_id = %payload.blob_id, "Transfer cleaned up during write"),
        }

        info!(
            blob_id = %payload.blob_id,
            path = %save_path.display(),
            size = buffer.len(),
            "Blob written"
        );

        Ok(EndOutcome {
            path: save_path,
            context,
            same_device: false,
        })
    }

    /// Send a file this agent holds to the peer, as `blob_start`, one
    /// `blob_chunk` per chunk in index order, then `blob_end`.
    ///
    /// Returns once every message has been handed to the channel. The
    /// start message offers the source path so a peer on the same machine
    /// can take the same-device shortcut.
    pub async fn request(&self, payload: BlobRequest, requester_id: &str) -> Result<u32> {
        let source = self.resolve_source(&payload).await?;

        let size = self.fs.file_size(&source).await?;
        if size > self.limits.max_blob_size {
            return Err(BlobError::BlobTooLarge {
                size,
                max: self.limits.max_blob_size,
            });
        }

        let data = self.fs.read_file(&source).await?;
        let checksum = format_checksum(&data);
        let total_chunks = chunk_count(data.len() as u64, CHUNK_SIZE);

        self.channel
            .send(WireMessage::BlobStart(BlobStart {
                blob_id: payload.blob_id.clone(),
                filename: payload.filename.clone(),
                mime_type: mime_type(&payload.filename).to_string(),
                total_size: data.len() as u64,
                chunk_size: CHUNK_SIZE as u64,
                total_chunks,
                encoding: BlobEncoding::Base64,
                context: BlobContext::default(),
                same_device: true,
                local_path: Some(source.to_string_lossy().into_owned()),
            }))
            .await?;

        for (index, slice) in data.chunks(CHUNK_SIZE).enumerate() {
            self.channel
                .send(WireMessage::BlobChunk(BlobChunk {
                    blob_id: payload.blob_id.clone(),
                    index: index as u32,
                    data: STANDARD.encode(slice),
                    size: slice.len() as u64,
                }))
                .await?;
        }

        self.channel
            .send(WireMessage::BlobEnd(BlobEnd {
                blob_id: payload.blob_id.clone(),
                checksum: Some(checksum),
                total_received: total_chunks,
            }))
            .await?;

        info!(
            blob_id = %payload.blob_id,
            requester = %requester_id,
            path = %source.display(),
            size = data.len(),
            chunks = total_chunks,
            "Blob sent"
        );

        Ok(total_chunks)
    }

    async fn resolve_source(&self, payload: &BlobRequest) -> Result<PathBuf> {
        if let Some(local_path) = &payload.local_path {
            let local_path = PathBuf::from(local_path);
            if self.fs.exists(&local_path).await {
                return Ok(local_path);
            }
            debug!(
                blob_id = %payload.blob_id,
                local_path = %local_path.display(),
                "Requested local path missing, searching uploads"
            );
        }

        let filename = sanitize_filename(&payload.filename);
        match self.fs.find_file(&self.uploads_dir, &filename).await? {
            Some(found) => Ok(found),
            None => Err(BlobError::FileNotFound(payload.filename.clone())),
        }
    }

    async fn is_active(&self, blob_id: &str) -> bool {
        self.transfers.lock().await.contains_key(blob_id)
    }

    /// Drop a transfer and any chunks it still holds.
    pub async fn cleanup(&self, blob_id: &str) -> bool {
        let removed = self.transfers.lock().await.remove(blob_id).is_some();
        if removed {
            debug!(blob_id = %blob_id, "Cleaned up blob transfer");
        }
        removed
    }

    pub async fn received_count(&self, blob_id: &str) -> Option<u32> {
        self.transfers
            .lock()
            .await
            .get(blob_id)
            .map(BlobTransfer::received_count)
    }

    pub async fn is_completed(&self, blob_id: &str) -> Option<bool> {
        self.transfers
            .lock()
            .await
            .get(blob_id)
            .map(BlobTransfer::is_completed)
    }

    pub async fn active_count(&self) -> usize {
        self.transfers.lock().await.len()
    }

    /// Ids of transfers untouched for at least `max_idle`.
    pub async fn idle_transfers(&self, max_idle: Duration) -> Vec<String> {
        self.transfers
            .lock()
            .await
            .values()
            .filter(|t| t.idle_for() >= max_idle)
            .map(|t| t.blob_id.clone())
            .collect()
    }
}
