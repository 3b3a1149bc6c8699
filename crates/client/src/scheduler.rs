//! The concurrent chunk scheduler.
//!
//! One `upload()` call is one attempt: hash, handshake, then a bounded pool
//! of workers draining a shared queue of chunk indices. The concurrency
//! bound is the number of workers: each worker has at most one request in
//! flight, so the pool size is a hard cap, not an emergent property.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use cargohold_protocol::{InitUploadRequest, StatusResponse};
use cargohold_transfer::{ChunkLayout, FileChunk, fingerprint_file};

use crate::events::{ChunkState, UploadEvent};
use crate::transport::{Transport, TransportError};
use crate::UploadError;

/// Event channel capacity. Events are sent with `try_send` and dropped when
/// the consumer lags; progress reporting must never stall an upload.
const EVENT_BUFFER_SIZE: usize = 256;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Chunk size; must match the server's configured size.
    pub chunk_size: u64,
    /// Hard cap on simultaneous in-flight chunk requests.
    pub max_concurrent: usize,
    /// Retries per chunk after the initial attempt.
    pub max_retries: u32,
    /// Backoff before each retry; the last entry repeats if retries exceed
    /// the schedule length.
    pub retry_delays: Vec<Duration>,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: cargohold_transfer::DEFAULT_CHUNK_SIZE,
            max_concurrent: 3,
            max_retries: 3,
            retry_delays: vec![
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(2000),
            ],
        }
    }
}

/// How an upload attempt ended (errors aside).
#[derive(Debug, Clone)]
pub enum UploadOutcome {
    Completed {
        upload_id: String,
    },
    /// Pause was requested; the session stays resumable on the server.
    Paused {
        upload_id: String,
        completed: u32,
        total: u32,
    },
}

/// The upload scheduler. Create one per upload attempt; call
/// [`upload`](Self::upload) to run it and [`pause`](Self::pause) (or cancel
/// the token) to stop scheduling new chunks.
pub struct Uploader<T: Transport + 'static> {
    transport: Arc<T>,
    config: UploaderConfig,
    cancel: CancellationToken,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
}

impl<T: Transport + 'static> Uploader<T> {
    pub fn new(transport: T, config: UploaderConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER_SIZE);
        Self {
            transport: Arc::new(transport),
            config,
            cancel: CancellationToken::new(),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Token that pauses the attempt when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Requests a cooperative pause: workers stop claiming new chunks;
    /// requests already in flight are allowed to finish.
    pub fn pause(&self) {
        self.cancel.cancel();
    }

    /// Polls the server for a session's progress.
    pub async fn remote_status(&self, upload_id: &str) -> Result<StatusResponse, UploadError> {
        self.transport
            .status(upload_id.to_string())
            .await
            .map_err(|e| UploadError::Handshake(e.to_string()))
    }

    /// Runs one upload attempt of `path`.
    ///
    /// Resume is implicit: the init handshake matches the file's fingerprint
    /// server-side, so a re-run after a pause or crash uploads exactly the
    /// chunks the server has not verified yet.
    pub async fn upload(&self, path: &Path) -> Result<UploadOutcome, UploadError> {
        let path = path.to_path_buf();
        let total_size = tokio::fs::metadata(&path).await?.len();
        if total_size == 0 {
            return Err(UploadError::EmptyFile);
        }
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| UploadError::Handshake("path has no filename".into()))?;

        let layout = ChunkLayout::new(total_size, self.config.chunk_size);
        let total_chunks = layout.total_chunks();

        self.emit(UploadEvent::Hashing);
        let hash_path = path.clone();
        let fingerprint = tokio::task::spawn_blocking(move || fingerprint_file(&hash_path))
            .await
            .map_err(|e| UploadError::Internal(format!("hashing task failed: {e}")))??;

        let resp = self
            .transport
            .init(InitUploadRequest {
                filename,
                total_size,
                total_chunks,
                file_hash: fingerprint,
            })
            .await
            .map_err(|e| match e {
                TransportError::NotFound(msg) => UploadError::SessionGone(msg),
                other => UploadError::Handshake(other.to_string()),
            })?;

        let upload_id = resp.upload_id;
        let verified: HashSet<u32> = resp.uploaded_chunks.iter().copied().collect();
        self.emit(UploadEvent::Initialized {
            upload_id: upload_id.clone(),
            already_verified: verified.len() as u32,
            total_chunks,
        });
        tracing::info!(
            upload_id = %upload_id,
            total_chunks,
            already_verified = verified.len(),
            "upload session ready"
        );

        // Work queue: only the chunks the server does not have yet.
        let queue: VecDeque<u32> = (0..total_chunks).filter(|i| !verified.contains(i)).collect();
        let pending = queue.len();

        let mut states = vec![ChunkState::Pending; total_chunks as usize];
        for &i in &verified {
            states[i as usize] = ChunkState::Success;
        }

        let ctx = Arc::new(WorkerCtx {
            transport: Arc::clone(&self.transport),
            upload_id: upload_id.clone(),
            path,
            layout,
            max_retries: self.config.max_retries,
            retry_delays: self.config.retry_delays.clone(),
            cancel: self.cancel.clone(),
            queue: Mutex::new(queue),
            states: Mutex::new(states),
            completed: AtomicU32::new(verified.len() as u32),
            total: total_chunks,
            fatal: Mutex::new(None),
            events: self.events_tx.clone(),
        });

        let workers = self.config.max_concurrent.min(pending);
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let ctx = Arc::clone(&ctx);
            handles.push(tokio::spawn(run_worker(ctx)));
        }
        for handle in handles {
            handle
                .await
                .map_err(|e| UploadError::Internal(format!("worker task failed: {e}")))?;
        }

        let completed = ctx.completed.load(Ordering::SeqCst);

        if let Some(reason) = ctx.fatal.lock().unwrap().take() {
            self.emit(UploadEvent::Failed {
                error: reason.clone(),
            });
            return Err(UploadError::SessionGone(reason));
        }

        if self.cancel.is_cancelled() {
            self.emit(UploadEvent::Paused {
                completed,
                total: total_chunks,
            });
            tracing::info!(upload_id = %upload_id, completed, total = total_chunks, "upload paused");
            return Ok(UploadOutcome::Paused {
                upload_id,
                completed,
                total: total_chunks,
            });
        }

        let failed: Vec<u32> = {
            let states = ctx.states.lock().unwrap();
            states
                .iter()
                .enumerate()
                .filter(|(_, s)| **s == ChunkState::Error)
                .map(|(i, _)| i as u32)
                .collect()
        };
        if !failed.is_empty() {
            let err = UploadError::ChunksFailed { indices: failed };
            self.emit(UploadEvent::Failed {
                error: err.to_string(),
            });
            return Err(err);
        }

        self.emit(UploadEvent::Completed {
            upload_id: upload_id.clone(),
        });
        Ok(UploadOutcome::Completed { upload_id })
    }

    fn emit(&self, event: UploadEvent) {
        let _ = self.events_tx.try_send(event);
    }
}

/// Shared state of one attempt's worker pool.
struct WorkerCtx<T: Transport> {
    transport: Arc<T>,
    upload_id: String,
    path: PathBuf,
    layout: ChunkLayout,
    max_retries: u32,
    retry_delays: Vec<Duration>,
    cancel: CancellationToken,
    queue: Mutex<VecDeque<u32>>,
    states: Mutex<Vec<ChunkState>>,
    completed: AtomicU32,
    total: u32,
    /// Set when the session itself is gone; stops the whole pool.
    fatal: Mutex<Option<String>>,
    events: mpsc::Sender<UploadEvent>,
}

impl<T: Transport> WorkerCtx<T> {
    fn set_state(&self, index: u32, state: ChunkState) {
        self.states.lock().unwrap()[index as usize] = state;
    }

    fn emit(&self, event: UploadEvent) {
        let _ = self.events.try_send(event);
    }
}

enum ChunkResult {
    Success,
    Failed(String),
    /// Session unknown/expired server-side: abort the whole pool.
    Fatal(String),
    /// Pause arrived while backing off; the chunk goes back to pending.
    Cancelled,
}

/// One worker: claims indices until the queue drains or pause/fatal hits.
/// The cancellation check sits at the task boundary only; an in-flight
/// request is never aborted.
async fn run_worker<T: Transport>(ctx: Arc<WorkerCtx<T>>) {
    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let Some(index) = ctx.queue.lock().unwrap().pop_front() else {
            break;
        };

        ctx.set_state(index, ChunkState::Uploading);
        ctx.emit(UploadEvent::ChunkStarted { index });

        match upload_one(&ctx, index).await {
            ChunkResult::Success => {
                ctx.set_state(index, ChunkState::Success);
                let completed = ctx.completed.fetch_add(1, Ordering::SeqCst) + 1;
                ctx.emit(UploadEvent::ChunkCompleted { index });
                ctx.emit(UploadEvent::Progress {
                    completed,
                    total: ctx.total,
                });
            }
            ChunkResult::Failed(error) => {
                tracing::warn!(chunk_index = index, error = %error, "chunk failed permanently");
                ctx.set_state(index, ChunkState::Error);
                ctx.emit(UploadEvent::ChunkFailed { index, error });
            }
            ChunkResult::Fatal(reason) => {
                ctx.set_state(index, ChunkState::Pending);
                *ctx.fatal.lock().unwrap() = Some(reason);
                ctx.cancel.cancel();
                break;
            }
            ChunkResult::Cancelled => {
                ctx.set_state(index, ChunkState::Pending);
                break;
            }
        }
    }
}

/// Uploads a single chunk with the per-chunk retry budget.
async fn upload_one<T: Transport>(ctx: &WorkerCtx<T>, index: u32) -> ChunkResult {
    let path = ctx.path.clone();
    let layout = ctx.layout;
    let chunk = match tokio::task::spawn_blocking(move || FileChunk::read(&path, &layout, index))
        .await
    {
        Ok(Ok(chunk)) => chunk,
        Ok(Err(e)) => return ChunkResult::Failed(e.to_string()),
        Err(e) => return ChunkResult::Failed(format!("chunk read task failed: {e}")),
    };

    let mut attempt: u32 = 0;
    loop {
        let result = ctx
            .transport
            .upload_chunk(
                ctx.upload_id.clone(),
                index,
                chunk.checksum.clone(),
                chunk.data.clone(),
            )
            .await;

        match result {
            Ok(()) => return ChunkResult::Success,
            Err(TransportError::NotFound(msg)) => return ChunkResult::Fatal(msg),
            Err(e) if !e.is_retryable() => return ChunkResult::Failed(e.to_string()),
            Err(e) if attempt >= ctx.max_retries => return ChunkResult::Failed(e.to_string()),
            Err(e) => {
                let delay = ctx
                    .retry_delays
                    .get(attempt as usize)
                    .or(ctx.retry_delays.last())
                    .copied()
                    .unwrap_or(Duration::from_secs(1));
                tracing::debug!(
                    chunk_index = index,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying chunk after backoff"
                );
                attempt += 1;
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = ctx.cancel.cancelled() => return ChunkResult::Cancelled,
                }
            }
        }
    }
}
