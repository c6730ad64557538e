use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use pylon_shared::types::{BlobContext, BlobEncoding};

/// Where an active transfer stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferState {
    /// Chunks are arriving. Keyed by chunk index, so arrival order and
    /// retransmitted duplicates do not matter.
    Streaming { chunks: BTreeMap<u32, Vec<u8>> },

    /// Verified and handed to the filesystem. Chunks are kept until the
    /// write succeeds so a failed write can fall back to `Streaming`.
    Writing { chunks: BTreeMap<u32, Vec<u8>> },

    /// Resolved through the same-device shortcut; the file already exists
    /// at `path` and no bytes are ever stored.
    Local { path: PathBuf },

    /// Assembled and written to `path`. Chunk storage has been released.
    Written { path: PathBuf },
}

/// One in-flight file, keyed by its caller-supplied blob id.
#[derive(Debug, Clone)]
pub struct BlobTransfer {
    pub blob_id: String,
    /// Sanitized filename.
    pub filename: String,
    pub mime_type: String,
    pub save_path: PathBuf,
    pub total_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u32,
    /// Sum of the stored chunk lengths. Never exceeds `total_size`.
    pub received_bytes: u64,
    pub encoding: BlobEncoding,
    pub sender_id: String,
    pub context: BlobContext,
    pub state: TransferState,
    pub last_activity: Instant,
}

impl BlobTransfer {
    pub fn received_count(&self) -> u32 {
        match &self.state {
            TransferState::Streaming { chunks } | TransferState::Writing { chunks } => chunks.len() as u32,
            TransferState::Local { .. } => 0,
            TransferState::Written { .. } => self.total_chunks,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.state, TransferState::Local { .. } | TransferState::Written { .. })
    }

    pub fn is_same_device(&self) -> bool {
        matches!(self.state, TransferState::Local { .. })
    }

    /// Indices in `[0, total_chunks)` not yet received. Empty once the
    /// transfer has completed.
    pub fn missing_chunks(&self) -> Vec<u32> {
        match &self.state {
            TransferState::Streaming { chunks } => (0..self.total_chunks)
                .filter(|index| !chunks.contains_key(index))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Stored chunks concatenated in index order. Empty unless streaming.
    pub fn assemble(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.received_bytes as usize);
        if let TransferState::Streaming { chunks } = &self.state {
            for bytes in chunks.values() {
                buffer.extend_from_slice(bytes);
            }
        }
        buffer
    }

    pub(crate) fn begin_write(&mut self) {
        if let TransferState::Streaming { chunks } = &mut self.state {
            let chunks = std::mem::take(chunks);
            self.state = TransferState::Writing { chunks };
        }
    }

    pub(crate) fn finish_write(&mut self) {
        self.state = TransferState::Written {
            path: self.save_path.clone(),
        };
    }

    pub(crate) fn abort_write(&mut self) {
        if let TransferState::Writing { chunks } = &mut self.state {
            let chunks = std::mem::take(chunks);
            self.state = TransferState::Streaming { chunks };
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streaming(total_chunks: u32, indices: &[u32]) -> BlobTransfer {
        let chunks: BTreeMap<u32, Vec<u8>> = indices.iter().map(|i| (*i, vec![*i as u8; 4])).collect();
        BlobTransfer {
            blob_id: "b1".into(),
            filename: "a.bin".into(),
            mime_type: "application/octet-stream".into(),
            save_path: PathBuf::from("/tmp/a.bin"),
            total_size: u64::from(total_chunks) * 4,
            chunk_size: 4,
            total_chunks,
            received_bytes: chunks.values().map(|b| b.len() as u64).sum(),
            encoding: BlobEncoding::Base64,
            sender_id: "phone".into(),
            context: BlobContext::default(),
            state: TransferState::Streaming { chunks },
            last_activity: Instant::now(),
        }
    }

    #[test]
    fn test_missing_chunks_scans_declared_range() {
        let t = streaming(5, &[0, 2]);
        assert_eq!(t.missing_chunks(), vec![1, 3, 4]);
        assert_eq!(t.received_count(), 2);
        assert!(!t.is_completed());
    }

    #[test]
    fn test_local_is_complete_and_empty() {
        let mut t = streaming(3, &[]);
        t.state = TransferState::Local {
            path: PathBuf::from("/home/me/cat.png"),
        };
        assert!(t.is_completed());
        assert!(t.is_same_device());
        assert_eq!(t.received_count(), 0);
        assert!(t.missing_chunks().is_empty());
    }

    #[test]
    fn test_write_transitions() {
        let mut t = streaming(2, &[1, 0]);
        assert_eq!(t.assemble(), vec![0, 0, 0, 0, 1, 1, 1, 1]);

        t.begin_write();
        assert!(!t.is_completed());
        assert_eq!(t.received_count(), 2);
        assert!(t.assemble().is_empty());

        t.abort_write();
        assert_eq!(t.state, TransferState::Streaming { chunks: BTreeMap::from([(0, vec![0; 4]), (1, vec![1; 4])]) });

        t.begin_write();
        t.finish_write();
        assert_eq!(t.state, TransferState::Written { path: PathBuf::from("/tmp/a.bin") });
        assert!(t.is_completed());
    }
}
