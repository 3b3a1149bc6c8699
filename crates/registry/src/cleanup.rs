use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use cargohold_protocol::SessionStatus;

use crate::registry::{SessionRegistry, run_blocking};

/// Summary of one cleanup tick.
#[derive(Debug, Default, Clone, Copy)]
pub struct CleanupStats {
    /// Active sessions transitioned to `expired` and purged of chunk data.
    pub expired: usize,
    /// Expired tombstones removed entirely after the grace period.
    pub purged: usize,
}

impl SessionRegistry {
    /// One pass of the cleanup sweep.
    ///
    /// Takes each session's own lock before touching it, so an in-flight
    /// chunk accept can never race the session out from under itself.
    /// Completed and failed sessions are left alone; their retention is a
    /// separate concern.
    pub async fn cleanup_tick(&self) -> CleanupStats {
        let mut stats = CleanupStats::default();
        let now = Utc::now();

        let snapshot: Vec<_> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .map(|(id, slot)| (*id, Arc::clone(slot)))
                .collect()
        };

        let mut remove: Vec<Uuid> = Vec::new();
        for (id, slot) in snapshot {
            let mut rec = slot.lock().await;
            // Negative on clock skew; treated as not idle.
            let idle = (now - rec.updated_at).to_std().unwrap_or_default();

            if rec.status.is_active() && idle > self.config.session_ttl {
                if !rec.expire() {
                    continue;
                }
                if let Err(e) = self.persist(&rec) {
                    tracing::warn!(upload_id = %id, error = %e, "failed to persist expiry");
                }

                let store = self.store.clone();
                match run_blocking(move || store.remove_session(id)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::warn!(upload_id = %id, error = %e, "failed to purge expired chunk data")
                    }
                    Err(e) => tracing::warn!(upload_id = %id, error = %e, "purge task failed"),
                }

                stats.expired += 1;
                tracing::info!(upload_id = %id, idle_secs = idle.as_secs(), "session expired");
            } else if rec.status == SessionStatus::Expired && idle > self.config.expired_grace {
                // Tombstone grace elapsed: forget the session entirely.
                match std::fs::remove_file(self.state_path(id)) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        tracing::warn!(upload_id = %id, error = %e, "failed to remove tombstone")
                    }
                }
                remove.push(id);
                stats.purged += 1;
            }
        }

        if !remove.is_empty() {
            let mut sessions = self.sessions.write().await;
            for id in &remove {
                sessions.remove(id);
            }
        }

        stats
    }

    /// Spawns the periodic cleanup task. Runs until `cancel` fires.
    pub fn spawn_cleanup(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("cleanup sweep stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let stats = registry.cleanup_tick().await;
                        if stats.expired > 0 || stats.purged > 0 {
                            tracing::info!(
                                expired = stats.expired,
                                purged = stats.purged,
                                "cleanup sweep tick"
                            );
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RegistryError;
    use crate::registry::RegistryConfig;
    use cargohold_protocol::InitUploadRequest;
    use cargohold_transfer::{ChunkLayout, checksum_bytes};
    use tempfile::TempDir;

    const CHUNK: u64 = 8;

    fn test_config(dir: &TempDir, ttl: Duration, grace: Duration) -> RegistryConfig {
        RegistryConfig {
            storage_root: dir.path().to_path_buf(),
            chunk_size: CHUNK,
            session_ttl: ttl,
            expired_grace: grace,
        }
    }

    fn init_request(data: &[u8]) -> InitUploadRequest {
        let layout = ChunkLayout::new(data.len() as u64, CHUNK);
        InitUploadRequest {
            filename: "stale.zip".into(),
            total_size: data.len() as u64,
            total_chunks: layout.total_chunks(),
            file_hash: checksum_bytes(data),
        }
    }

    /// Pushes a session's `updated_at` into the past.
    async fn backdate(registry: &SessionRegistry, id: Uuid, secs: i64) {
        let slot = registry.session_arc(id).await.unwrap();
        let mut rec = slot.lock().await;
        rec.updated_at = Utc::now() - chrono::Duration::seconds(secs);
    }

    async fn upload_chunk(registry: &SessionRegistry, id: Uuid, data: &[u8], index: u32) {
        let layout = ChunkLayout::new(data.len() as u64, CHUNK);
        let offset = layout.offset(index) as usize;
        let len = layout.expected_len(index).unwrap() as usize;
        let bytes = data[offset..offset + len].to_vec();
        let checksum = checksum_bytes(&bytes);
        registry
            .accept_chunk(id, index, &checksum, bytes)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn idle_session_expires_and_chunks_are_purged() {
        let dir = TempDir::new().unwrap();
        let registry = SessionRegistry::new(test_config(
            &dir,
            Duration::from_secs(60),
            Duration::from_secs(600),
        ))
        .unwrap();
        let data = b"soon to be abandoned...."; // 24 bytes.

        let (id, _) = registry.init_session(&init_request(data)).await.unwrap();
        upload_chunk(&registry, id, data, 0).await;
        assert!(registry.store.session_dir_exists(id));

        backdate(&registry, id, 120).await;
        let stats = registry.cleanup_tick().await;
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.purged, 0);

        let snapshot = registry.status(id).await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Expired);
        assert!(!registry.store.session_dir_exists(id));

        // Chunk uploads to the tombstone are refused.
        let err = registry
            .accept_chunk(id, 1, &"0".repeat(64), vec![0; CHUNK as usize])
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));
    }

    #[tokio::test]
    async fn fresh_session_survives_cleanup() {
        let dir = TempDir::new().unwrap();
        let registry = SessionRegistry::new(test_config(
            &dir,
            Duration::from_secs(60),
            Duration::from_secs(600),
        ))
        .unwrap();
        let data = b"still actively uploading"; // 24 bytes.

        let (id, _) = registry.init_session(&init_request(data)).await.unwrap();
        let stats = registry.cleanup_tick().await;
        assert_eq!(stats.expired, 0);
        assert!(registry.status(id).await.is_ok());
    }

    #[tokio::test]
    async fn tombstone_removed_after_grace_period() {
        let dir = TempDir::new().unwrap();
        let registry = SessionRegistry::new(test_config(
            &dir,
            Duration::from_secs(60),
            Duration::from_secs(300),
        ))
        .unwrap();
        let data = b"tombstone grace period.."; // 24 bytes.

        let (id, _) = registry.init_session(&init_request(data)).await.unwrap();
        backdate(&registry, id, 120).await;
        registry.cleanup_tick().await;
        assert_eq!(
            registry.status(id).await.unwrap().status,
            SessionStatus::Expired
        );
        assert!(registry.state_path(id).exists());

        // Within grace: tombstone stays.
        let stats = registry.cleanup_tick().await;
        assert_eq!(stats.purged, 0);

        // Past grace: gone entirely.
        backdate(&registry, id, 400).await;
        let stats = registry.cleanup_tick().await;
        assert_eq!(stats.purged, 1);
        assert!(matches!(
            registry.status(id).await.unwrap_err(),
            RegistryError::NotFound(_)
        ));
        assert!(!registry.state_path(id).exists());
    }

    #[tokio::test]
    async fn completed_sessions_are_never_expired() {
        let dir = TempDir::new().unwrap();
        let registry = SessionRegistry::new(test_config(
            &dir,
            Duration::from_secs(60),
            Duration::from_secs(60),
        ))
        .unwrap();
        let data = b"done and dusted already!"; // 24 bytes -> 3 chunks.

        let (id, _) = registry.init_session(&init_request(data)).await.unwrap();
        for index in 0..3 {
            upload_chunk(&registry, id, data, index).await;
        }
        assert_eq!(
            registry.status(id).await.unwrap().status,
            SessionStatus::Completed
        );

        backdate(&registry, id, 3600).await;
        let stats = registry.cleanup_tick().await;
        assert_eq!(stats.expired, 0);
        assert_eq!(stats.purged, 0);
        assert_eq!(
            registry.status(id).await.unwrap().status,
            SessionStatus::Completed
        );
    }

    #[tokio::test]
    async fn expired_session_does_not_match_reinit() {
        let dir = TempDir::new().unwrap();
        let registry = SessionRegistry::new(test_config(
            &dir,
            Duration::from_secs(60),
            Duration::from_secs(600),
        ))
        .unwrap();
        let data = b"expired then reuploaded!"; // 24 bytes.
        let req = init_request(data);

        let (id, _) = registry.init_session(&req).await.unwrap();
        backdate(&registry, id, 120).await;
        registry.cleanup_tick().await;

        let (id2, resume) = registry.init_session(&req).await.unwrap();
        assert_ne!(id, id2);
        assert!(resume.is_empty());
    }

    #[tokio::test]
    async fn spawned_sweep_expires_on_its_own() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(
            SessionRegistry::new(test_config(
                &dir,
                Duration::from_millis(20),
                Duration::from_secs(600),
            ))
            .unwrap(),
        );
        let data = b"background sweep target!"; // 24 bytes.

        let (id, _) = registry.init_session(&init_request(data)).await.unwrap();
        backdate(&registry, id, 60).await;

        let cancel = CancellationToken::new();
        let handle = registry.spawn_cleanup(Duration::from_millis(10), cancel.clone());

        // Give the sweep a few ticks.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(
            registry.status(id).await.unwrap().status,
            SessionStatus::Expired
        );

        cancel.cancel();
        handle.await.unwrap();
    }
}
