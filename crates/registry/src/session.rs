use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cargohold_protocol::{ChunkStatus, SessionStatus};
use cargohold_transfer::ChunkLayout;

/// Per-chunk bookkeeping inside a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSlot {
    pub status: ChunkStatus,
    /// Hex SHA-256 of the stored bytes, recorded when verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    pub received_size: u64,
}

impl ChunkSlot {
    pub fn pending() -> Self {
        Self {
            status: ChunkStatus::Pending,
            checksum: None,
            received_size: 0,
        }
    }
}

/// One upload session: identity, chunk geometry, per-chunk state, and the
/// session status machine. Serialized as the durable state file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub filename: String,
    pub total_size: u64,
    pub chunk_size: u64,
    /// Fixed at init, never recomputed.
    pub total_chunks: u32,
    /// Whole-file hex SHA-256 supplied by the client at init.
    pub file_fingerprint: String,
    pub chunks: Vec<ChunkSlot>,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Whether this session has already claimed its single assembly run.
    /// In-memory only: after a crash, recovery re-derives completeness from
    /// the chunk store and re-triggers assembly itself.
    #[serde(skip)]
    pub assembly_claimed: bool,
}

impl SessionRecord {
    /// Creates a fresh `initialized` session with all chunks pending.
    pub fn new(filename: String, total_size: u64, chunk_size: u64, file_fingerprint: String) -> Self {
        let layout = ChunkLayout::new(total_size, chunk_size);
        let total_chunks = layout.total_chunks();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            filename,
            total_size,
            chunk_size,
            total_chunks,
            file_fingerprint,
            chunks: (0..total_chunks).map(|_| ChunkSlot::pending()).collect(),
            status: SessionStatus::Initialized,
            failure: None,
            created_at: now,
            updated_at: now,
            assembly_claimed: false,
        }
    }

    pub fn layout(&self) -> ChunkLayout {
        ChunkLayout::new(self.total_size, self.chunk_size)
    }

    pub fn verified_count(&self) -> u32 {
        self.chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Verified)
            .count() as u32
    }

    /// Indices already verified, in ascending order (the resume set).
    pub fn verified_indices(&self) -> Vec<u32> {
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.status == ChunkStatus::Verified)
            .map(|(i, _)| i as u32)
            .collect()
    }

    pub fn is_chunk_verified(&self, index: u32) -> bool {
        self.chunks
            .get(index as usize)
            .is_some_and(|c| c.status == ChunkStatus::Verified)
    }

    pub fn all_verified(&self) -> bool {
        self.total_chunks > 0 && self.verified_count() == self.total_chunks
    }

    /// Records that bytes arrived for a chunk that did not verify.
    /// Forward-only: a verified slot is never downgraded.
    pub fn mark_received(&mut self, index: u32, size: u64) {
        let slot = &mut self.chunks[index as usize];
        if slot.status == ChunkStatus::Verified {
            return;
        }
        slot.status = ChunkStatus::Received;
        slot.received_size = size;
        self.touch();
    }

    /// Marks a chunk verified and flips the session out of `initialized`.
    /// Forward-only: a verified slot is never downgraded here.
    pub fn mark_verified(&mut self, index: u32, checksum: String, size: u64) {
        let slot = &mut self.chunks[index as usize];
        slot.status = ChunkStatus::Verified;
        slot.checksum = Some(checksum);
        slot.received_size = size;
        if self.status == SessionStatus::Initialized {
            self.status = SessionStatus::Uploading;
        }
        self.touch();
    }

    /// Resets a chunk to pending (recovery found its bytes missing on disk).
    pub fn reset_chunk(&mut self, index: u32) {
        self.chunks[index as usize] = ChunkSlot::pending();
    }

    pub fn complete(&mut self) {
        self.status = SessionStatus::Completed;
        self.touch();
    }

    pub fn fail(&mut self, reason: &str) {
        self.status = SessionStatus::Failed;
        self.failure = Some(reason.to_string());
        self.touch();
    }

    /// Expires the session. Only reachable from an active state; terminal
    /// sessions are left untouched. Returns whether the transition happened.
    pub fn expire(&mut self) -> bool {
        if !self.status.is_active() {
            return false;
        }
        self.status = SessionStatus::Expired;
        self.touch();
        true
    }

    /// Returns `true` if this session can serve as the resume target for a
    /// re-initiation of the same logical upload.
    pub fn matches_upload(&self, file_fingerprint: &str, total_size: u64) -> bool {
        self.status.is_active()
            && self.file_fingerprint == file_fingerprint
            && self.total_size == total_size
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn sample() -> SessionRecord {
        SessionRecord::new("build.zip".into(), 12 * MIB, 5 * MIB, "ab".repeat(32))
    }

    #[test]
    fn new_session_is_initialized_with_pending_chunks() {
        let rec = sample();
        assert_eq!(rec.status, SessionStatus::Initialized);
        assert_eq!(rec.total_chunks, 3);
        assert_eq!(rec.chunks.len(), 3);
        assert_eq!(rec.verified_count(), 0);
        assert!(rec.verified_indices().is_empty());
        assert!(!rec.all_verified());
    }

    #[test]
    fn mark_verified_flips_to_uploading() {
        let mut rec = sample();
        rec.mark_verified(1, "c".repeat(64), 5 * MIB);
        assert_eq!(rec.status, SessionStatus::Uploading);
        assert!(rec.is_chunk_verified(1));
        assert!(!rec.is_chunk_verified(0));
        assert_eq!(rec.verified_indices(), vec![1]);
    }

    #[test]
    fn all_verified_requires_every_chunk() {
        let mut rec = sample();
        rec.mark_verified(0, "a".repeat(64), 5 * MIB);
        rec.mark_verified(2, "b".repeat(64), 2 * MIB);
        assert!(!rec.all_verified());
        rec.mark_verified(1, "c".repeat(64), 5 * MIB);
        assert!(rec.all_verified());
        assert_eq!(rec.verified_count(), 3);
    }

    #[test]
    fn mark_received_is_forward_only() {
        let mut rec = sample();
        rec.mark_received(0, 5 * MIB);
        assert_eq!(rec.chunks[0].status, cargohold_protocol::ChunkStatus::Received);
        assert_eq!(rec.verified_count(), 0);

        // Received chunks can still verify.
        rec.mark_verified(0, "a".repeat(64), 5 * MIB);
        assert!(rec.is_chunk_verified(0));

        // But a verified chunk is never downgraded.
        rec.mark_received(0, 1);
        assert!(rec.is_chunk_verified(0));
    }

    #[test]
    fn expire_only_from_active_states() {
        let mut rec = sample();
        assert!(rec.expire());
        assert_eq!(rec.status, SessionStatus::Expired);

        let mut done = sample();
        done.complete();
        assert!(!done.expire());
        assert_eq!(done.status, SessionStatus::Completed);

        let mut failed = sample();
        failed.fail("assembly checksum mismatch");
        assert!(!failed.expire());
        assert_eq!(failed.status, SessionStatus::Failed);
    }

    #[test]
    fn matches_upload_requires_active_and_identical_shape() {
        let mut rec = sample();
        let fp = rec.file_fingerprint.clone();
        assert!(rec.matches_upload(&fp, 12 * MIB));
        assert!(!rec.matches_upload(&fp, 11 * MIB));
        assert!(!rec.matches_upload(&"f".repeat(64), 12 * MIB));

        rec.expire();
        assert!(!rec.matches_upload(&fp, 12 * MIB));
    }

    #[test]
    fn state_file_roundtrip_drops_assembly_claim() {
        let mut rec = sample();
        rec.mark_verified(0, "a".repeat(64), 5 * MIB);
        rec.assembly_claimed = true;

        let json = serde_json::to_string(&rec).unwrap();
        let back: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, rec.id);
        assert_eq!(back.verified_indices(), vec![0]);
        assert_eq!(back.status, SessionStatus::Uploading);
        // The claim is process-local and must not survive the round trip.
        assert!(!back.assembly_claimed);
    }

    #[test]
    fn fail_records_reason() {
        let mut rec = sample();
        rec.fail("chunk data missing");
        assert_eq!(rec.failure.as_deref(), Some("chunk data missing"));
    }
}
