use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use cargohold_protocol::{InitUploadRequest, SessionStatus};
use cargohold_transfer::{
    ChunkLayout, ChunkStore, assemble_artifact, checksum_bytes, validate_filename,
};

use crate::RegistryError;
use crate::session::SessionRecord;

/// Registry configuration, externally supplied.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Root under which `state/`, `tmp/` and `files/` live.
    pub storage_root: PathBuf,
    /// Server-owned chunk size; clients must agree on the chunk count it
    /// implies.
    pub chunk_size: u64,
    /// Idle time after which an active session is expired.
    pub session_ttl: Duration,
    /// How long an expired tombstone keeps answering status queries before
    /// it is removed entirely.
    pub expired_grace: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./data"),
            chunk_size: cargohold_transfer::DEFAULT_CHUNK_SIZE,
            session_ttl: Duration::from_secs(30 * 60),
            expired_grace: Duration::from_secs(10 * 60),
        }
    }
}

/// Result of a successfully accepted chunk.
#[derive(Debug)]
pub enum AcceptOutcome {
    /// Chunk verified and stored; more chunks outstanding.
    Verified { verified: u32, total: u32 },
    /// The index was already verified; nothing changed.
    AlreadyVerified,
    /// This was the last chunk: the artifact was assembled and validated.
    Completed { artifact: PathBuf },
}

/// Point-in-time view of a session for status queries.
#[derive(Debug, Clone, Copy)]
pub struct StatusSnapshot {
    pub status: SessionStatus,
    pub verified: u32,
    pub total: u32,
}

/// The session registry. Owns all session state; see the crate docs for the
/// locking model.
pub struct SessionRegistry {
    pub(crate) config: RegistryConfig,
    pub(crate) store: ChunkStore,
    pub(crate) state_dir: PathBuf,
    pub(crate) artifacts_dir: PathBuf,
    pub(crate) sessions: RwLock<HashMap<Uuid, Arc<Mutex<SessionRecord>>>>,
}

impl SessionRegistry {
    /// Creates the registry and its on-disk layout
    /// (`state/`, `tmp/`, `files/` under the storage root).
    pub fn new(config: RegistryConfig) -> std::io::Result<Self> {
        let state_dir = config.storage_root.join("state");
        let tmp_dir = config.storage_root.join("tmp");
        let artifacts_dir = config.storage_root.join("files");
        std::fs::create_dir_all(&state_dir)?;
        std::fs::create_dir_all(&tmp_dir)?;
        std::fs::create_dir_all(&artifacts_dir)?;

        Ok(Self {
            store: ChunkStore::new(tmp_dir),
            state_dir,
            artifacts_dir,
            config,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn chunk_size(&self) -> u64 {
        self.config.chunk_size
    }

    /// Creates a session, or returns the existing one when an active session
    /// matches the same fingerprint and size; that match is what lets a
    /// client resume without holding on to a session id.
    pub async fn init_session(
        &self,
        req: &InitUploadRequest,
    ) -> Result<(Uuid, Vec<u32>), RegistryError> {
        validate_filename(&req.filename)
            .map_err(|e| RegistryError::Validation(e.to_string()))?;
        if req.total_size == 0 {
            return Err(RegistryError::Validation(
                "totalSize must be positive".into(),
            ));
        }
        if !is_hex_sha256(&req.file_hash) {
            return Err(RegistryError::Validation(
                "fileHash must be 64 hex characters".into(),
            ));
        }

        let layout = ChunkLayout::new(req.total_size, self.config.chunk_size);
        if layout.total_chunks() != req.total_chunks {
            return Err(RegistryError::Validation(format!(
                "totalChunks mismatch: {} bytes at {} bytes per chunk yields {}, got {}",
                req.total_size,
                self.config.chunk_size,
                layout.total_chunks(),
                req.total_chunks
            )));
        }

        // Write lock for the whole lookup-or-create, so two concurrent inits
        // of the same upload cannot both create a session.
        let mut sessions = self.sessions.write().await;

        for (id, slot) in sessions.iter() {
            let rec = slot.lock().await;
            if rec.matches_upload(&req.file_hash, req.total_size) {
                tracing::info!(upload_id = %id, verified = rec.verified_count(), "resuming existing upload session");
                return Ok((*id, rec.verified_indices()));
            }
        }

        let rec = SessionRecord::new(
            req.filename.clone(),
            req.total_size,
            self.config.chunk_size,
            req.file_hash.to_lowercase(),
        );
        let id = rec.id;
        self.persist(&rec)?;
        sessions.insert(id, Arc::new(Mutex::new(rec)));

        tracing::info!(
            upload_id = %id,
            filename = %req.filename,
            total_size = req.total_size,
            total_chunks = req.total_chunks,
            "created upload session"
        );
        Ok((id, Vec::new()))
    }

    /// Verifies and stores one chunk. The whole mutation (slot update,
    /// store write, last-chunk check) runs under the session's lock;
    /// only the assembler's streaming I/O happens outside it.
    pub async fn accept_chunk(
        &self,
        id: Uuid,
        index: u32,
        supplied_checksum: &str,
        bytes: Vec<u8>,
    ) -> Result<AcceptOutcome, RegistryError> {
        let session = self.session_arc(id).await?;
        let mut rec = session.lock().await;

        match rec.status {
            SessionStatus::Expired => {
                return Err(RegistryError::Conflict("upload session expired".into()));
            }
            SessionStatus::Completed | SessionStatus::Failed => {
                return Err(RegistryError::Conflict(format!(
                    "upload session is {}, not accepting chunks",
                    rec.status
                )));
            }
            _ => {}
        }

        if index >= rec.total_chunks {
            return Err(RegistryError::Validation(format!(
                "chunkIndex {index} out of range (total {})",
                rec.total_chunks
            )));
        }

        let expected_len = rec
            .layout()
            .expected_len(index)
            .map_err(|e| RegistryError::Validation(e.to_string()))?;
        if bytes.len() as u64 != expected_len {
            return Err(RegistryError::Conflict(format!(
                "chunk {index} size mismatch: expected {expected_len} bytes, got {}",
                bytes.len()
            )));
        }

        if rec.is_chunk_verified(index) {
            // Idempotent re-upload of a verified chunk.
            return Ok(AcceptOutcome::AlreadyVerified);
        }

        // The supplied checksum is an anti-corruption echo: recompute and
        // compare, never trust the caller's digest as proof.
        let computed = checksum_bytes(&bytes);
        if computed != supplied_checksum.to_lowercase() {
            tracing::warn!(
                upload_id = %id,
                chunk_index = index,
                "chunk checksum verification failed"
            );
            // The bytes arrived but are discarded; the slot stays
            // unverified so the client can retry the same index.
            rec.mark_received(index, bytes.len() as u64);
            self.persist(&rec)?;
            return Err(RegistryError::ChecksumMismatch {
                supplied: supplied_checksum.to_string(),
                computed,
            });
        }

        let store = self.store.clone();
        let size = bytes.len() as u64;
        run_blocking(move || store.write_chunk(id, index, &bytes)).await??;

        rec.mark_verified(index, computed, size);
        self.persist(&rec)?;

        tracing::debug!(
            upload_id = %id,
            chunk_index = index,
            verified = rec.verified_count(),
            total = rec.total_chunks,
            "chunk verified"
        );

        if rec.all_verified() && !rec.assembly_claimed {
            rec.assembly_claimed = true;
            drop(rec);
            return self.run_assembly(&session, id).await;
        }

        Ok(AcceptOutcome::Verified {
            verified: rec.verified_count(),
            total: rec.total_chunks,
        })
    }

    /// Assembles the artifact for a fully-verified session and commits the
    /// terminal status. The session lock is released for the streaming
    /// concatenation and re-taken only to commit, so a long assembly never
    /// blocks the registry.
    pub(crate) async fn run_assembly(
        &self,
        session: &Arc<Mutex<SessionRecord>>,
        id: Uuid,
    ) -> Result<AcceptOutcome, RegistryError> {
        let (layout, filename, fingerprint) = {
            let rec = session.lock().await;
            (
                rec.layout(),
                rec.filename.clone(),
                rec.file_fingerprint.clone(),
            )
        };

        let store = self.store.clone();
        let artifacts = self.artifacts_dir.clone();
        let result = run_blocking(move || {
            assemble_artifact(&store, id, &layout, &filename, &fingerprint, &artifacts)
        })
        .await?;

        let mut rec = session.lock().await;
        if rec.status == SessionStatus::Expired {
            // The cleanup sweep evicted the session while we were streaming;
            // its chunks are gone and the expiry stands.
            return Err(RegistryError::Conflict("upload session expired".into()));
        }

        match result {
            Ok(artifact) => {
                rec.complete();
                self.persist(&rec)?;
                drop(rec);

                let store = self.store.clone();
                if let Err(e) = run_blocking(move || store.remove_session(id)).await? {
                    tracing::warn!(upload_id = %id, error = %e, "failed to purge chunk data after completion");
                }

                tracing::info!(upload_id = %id, artifact = %artifact.display(), "upload completed");
                Ok(AcceptOutcome::Completed { artifact })
            }
            Err(e) => {
                rec.fail(&e.to_string());
                self.persist(&rec)?;
                tracing::warn!(upload_id = %id, error = %e, "assembly failed");
                Err(RegistryError::Assembly(e.to_string()))
            }
        }
    }

    /// Status snapshot for a session. Expired tombstones keep answering
    /// until the cleanup sweep removes them.
    pub async fn status(&self, id: Uuid) -> Result<StatusSnapshot, RegistryError> {
        let session = self.session_arc(id).await?;
        let rec = session.lock().await;
        Ok(StatusSnapshot {
            status: rec.status,
            verified: rec.verified_count(),
            total: rec.total_chunks,
        })
    }

    /// Path of the assembled artifact; only available once completed.
    pub async fn artifact_path(&self, id: Uuid) -> Result<PathBuf, RegistryError> {
        let session = self.session_arc(id).await?;
        let rec = session.lock().await;
        if rec.status != SessionStatus::Completed {
            return Err(RegistryError::Conflict(format!(
                "upload session is {}, not completed",
                rec.status
            )));
        }
        Ok(self.artifacts_dir.join(id.to_string()).join(&rec.filename))
    }

    pub(crate) async fn session_arc(
        &self,
        id: Uuid,
    ) -> Result<Arc<Mutex<SessionRecord>>, RegistryError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(RegistryError::NotFound(id))
    }

    pub(crate) fn state_path(&self, id: Uuid) -> PathBuf {
        self.state_dir.join(format!("{id}.json"))
    }

    /// Writes a session's durable mirror via `.part` + rename, so a crash
    /// never leaves a half-written state file under the real name.
    pub(crate) fn persist(&self, rec: &SessionRecord) -> Result<(), RegistryError> {
        let path = self.state_path(rec.id);
        let part = self.state_dir.join(format!("{}.json.part", rec.id));
        std::fs::write(&part, serde_json::to_vec_pretty(rec)?)?;
        std::fs::rename(&part, &path)?;
        Ok(())
    }

    pub(crate) fn state_dir(&self) -> &Path {
        &self.state_dir
    }
}

/// `spawn_blocking` with the join error folded into `RegistryError`.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, RegistryError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RegistryError::Internal(format!("blocking task failed: {e}")))
}

fn is_hex_sha256(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}
