//! Command-line uploader.
//!
//! Uploads one archive to a cargohold server. Ctrl-C pauses cooperatively:
//! workers stop claiming chunks, in-flight requests finish, and running the
//! same command again resumes exactly where the server left off.

use std::path::PathBuf;

use cargohold_client::{HttpTransport, UploadEvent, UploadOutcome, Uploader, UploaderConfig};
use tracing_subscriber::EnvFilter;

const DEFAULT_SERVER_URL: &str = "http://localhost:3001";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(file) = args.next() else {
        eprintln!("usage: cargohold-upload <file> [server-url]");
        std::process::exit(2);
    };
    let server_url = args.next().unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(PathBuf::from(file), server_url))
}

async fn run(file: PathBuf, server_url: String) -> anyhow::Result<()> {
    tracing::info!(file = %file.display(), server = %server_url, "starting upload");

    let mut uploader = Uploader::new(HttpTransport::new(server_url), UploaderConfig::default());
    let mut events = uploader.take_events().expect("fresh uploader has events");

    // Ctrl-C pauses instead of killing the upload mid-chunk.
    let cancel = uploader.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("pause requested; letting in-flight chunks finish");
            cancel.cancel();
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                UploadEvent::Hashing => tracing::info!("computing file fingerprint"),
                UploadEvent::Initialized {
                    upload_id,
                    already_verified,
                    total_chunks,
                } => tracing::info!(
                    upload_id = %upload_id,
                    already_verified,
                    total_chunks,
                    "session ready"
                ),
                UploadEvent::Progress { completed, total } => {
                    tracing::info!("{completed}/{total} chunks uploaded")
                }
                UploadEvent::ChunkFailed { index, error } => {
                    tracing::warn!(chunk_index = index, error = %error, "chunk failed")
                }
                _ => {}
            }
        }
    });

    let result = uploader.upload(&file).await;
    drop(uploader); // close the event channel so the printer drains and exits
    let _ = printer.await;

    match result? {
        UploadOutcome::Completed { upload_id } => {
            tracing::info!(upload_id = %upload_id, "upload complete");
        }
        UploadOutcome::Paused {
            upload_id,
            completed,
            total,
        } => {
            tracing::info!(
                upload_id = %upload_id,
                "upload paused at {completed}/{total}; run the same command to resume"
            );
        }
    }
    Ok(())
}
