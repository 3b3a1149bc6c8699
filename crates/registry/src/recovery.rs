use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use cargohold_protocol::{ChunkStatus, SessionStatus};

use crate::registry::{SessionRegistry, run_blocking};
use crate::session::{ChunkSlot, SessionRecord};
use crate::RegistryError;

/// Summary of a startup recovery sweep.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecoveryReport {
    /// Sessions loaded into the registry.
    pub restored: usize,
    /// Active sessions whose chunk state disagreed with the store and was
    /// reconciled.
    pub repaired: usize,
    /// Sessions degraded to `failed` (corrupt state file, lost chunk data).
    pub failed: usize,
    /// Sessions found fully verified and assembled during the sweep.
    pub assembled: usize,
}

impl SessionRegistry {
    /// Startup recovery sweep. Must run to completion before the service
    /// accepts requests; nothing else mutates the registry while it runs.
    ///
    /// For every persisted active session the chunk state is re-derived from
    /// what is actually on disk; the persisted flags are never trusted over
    /// the store, so the registry's idea of "verified" cannot outrun what is
    /// durably present. Sessions that cannot be reconciled degrade to
    /// `failed` individually; recovery itself never aborts startup.
    pub async fn recover(&self) -> Result<RecoveryReport, RegistryError> {
        let mut report = RecoveryReport::default();

        let mut ids = Vec::new();
        for entry in std::fs::read_dir(self.state_dir())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            else {
                tracing::warn!(path = %path.display(), "ignoring non-session file in state directory");
                continue;
            };
            ids.push((id, path));
        }

        for (id, path) in ids {
            let rec = match std::fs::read_to_string(&path)
                .map_err(RegistryError::from)
                .and_then(|s| Ok(serde_json::from_str::<SessionRecord>(&s)?))
            {
                Ok(rec) if rec.id == id => rec,
                Ok(rec) => {
                    tracing::warn!(upload_id = %id, file_id = %rec.id, "state file id mismatch, failing session");
                    report.failed += 1;
                    self.insert_failed_tombstone(id, "state file id mismatch")
                        .await?;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(upload_id = %id, error = %e, "corrupt state file, failing session");
                    report.failed += 1;
                    self.insert_failed_tombstone(id, "state file corrupt").await?;
                    continue;
                }
            };

            let rec = if rec.status.is_active() {
                match self.reconcile(rec, &mut report).await {
                    Ok(rec) => rec,
                    Err(e) => {
                        tracing::warn!(upload_id = %id, error = %e, "recovery failed for session");
                        report.failed += 1;
                        self.insert_failed_tombstone(id, &format!("recovery failed: {e}"))
                            .await?;
                        continue;
                    }
                }
            } else {
                rec
            };

            report.restored += 1;
            let session = Arc::new(Mutex::new(rec));
            self.sessions.write().await.insert(id, Arc::clone(&session));

            // A crash between the last accepted chunk and assembly leaves a
            // fully-verified active session; finish the job now.
            let needs_assembly = {
                let mut rec = session.lock().await;
                let ready = rec.status.is_active() && rec.all_verified() && !rec.assembly_claimed;
                if ready {
                    rec.assembly_claimed = true;
                }
                ready
            };
            if needs_assembly {
                match self.run_assembly(&session, id).await {
                    Ok(_) => {
                        report.assembled += 1;
                        tracing::info!(upload_id = %id, "assembled fully-uploaded session during recovery");
                    }
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(upload_id = %id, error = %e, "assembly during recovery failed");
                    }
                }
            }
        }

        tracing::info!(
            restored = report.restored,
            repaired = report.repaired,
            failed = report.failed,
            assembled = report.assembled,
            "recovery sweep finished"
        );
        Ok(report)
    }

    /// Rebuilds an active session's chunk slots from store contents.
    async fn reconcile(
        &self,
        mut rec: SessionRecord,
        report: &mut RecoveryReport,
    ) -> Result<SessionRecord, RegistryError> {
        let id = rec.id;

        // A session that claims durable chunks but has lost its whole chunk
        // directory cannot be trusted anymore.
        if rec.verified_count() > 0 && !self.store.session_dir_exists(id) {
            rec.fail("chunk data missing");
            self.persist(&rec)?;
            report.failed += 1;
            tracing::warn!(upload_id = %id, "chunk directory missing, session failed");
            // Hand back the failed record; the caller loads it.
            return Ok(rec);
        }

        let store = self.store.clone();
        let total = rec.total_chunks;
        let scan = run_blocking(move || store.scan_session(id, total)).await??;

        let layout = rec.layout();
        let mut changed = false;
        for index in 0..rec.total_chunks {
            let expected = layout
                .expected_len(index)
                .map_err(|e| RegistryError::Internal(e.to_string()))?;
            let durable = scan[index as usize] == Some(expected);
            let status = rec.chunks[index as usize].status;
            match (durable, status) {
                (true, ChunkStatus::Verified) => {}
                (true, _) => {
                    // Chunk hit disk but the crash beat the state write.
                    rec.chunks[index as usize] = ChunkSlot {
                        status: ChunkStatus::Verified,
                        checksum: None,
                        received_size: expected,
                    };
                    changed = true;
                }
                (false, ChunkStatus::Pending) => {}
                (false, _) => {
                    // State claimed more than the store holds.
                    rec.reset_chunk(index);
                    changed = true;
                }
            }
        }

        if changed {
            report.repaired += 1;
            if rec.status == SessionStatus::Initialized && rec.verified_count() > 0 {
                rec.status = SessionStatus::Uploading;
            }
            rec.touch();
            self.persist(&rec)?;
            tracing::info!(
                upload_id = %id,
                verified = rec.verified_count(),
                total = rec.total_chunks,
                "reconciled session against chunk store"
            );
        }

        Ok(rec)
    }

    async fn insert_failed_tombstone(
        &self,
        id: Uuid,
        reason: &str,
    ) -> Result<(), RegistryError> {
        let now = Utc::now();
        let rec = SessionRecord {
            id,
            filename: String::new(),
            total_size: 0,
            chunk_size: self.config.chunk_size,
            total_chunks: 0,
            file_fingerprint: String::new(),
            chunks: Vec::new(),
            status: SessionStatus::Failed,
            failure: Some(reason.to_string()),
            created_at: now,
            updated_at: now,
            assembly_claimed: false,
        };
        self.persist(&rec)?;
        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(rec)));
        Ok(())
    }
}
