use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::layout::ChunkLayout;
use crate::store::ChunkStore;

/// Copy buffer for streaming chunks into the artifact.
const COPY_WINDOW: usize = 64 * 1024;

/// Errors produced while assembling the final artifact.
#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk {0} missing from store")]
    MissingChunk(u32),

    #[error("assembled artifact checksum mismatch: expected {expected}, got {actual}")]
    FingerprintMismatch { expected: String, actual: String },
}

/// Concatenates a session's chunks, in strictly ascending index order, into
/// `<artifacts_root>/<session>/<filename>` and validates the whole-file
/// checksum against `fingerprint` while streaming.
///
/// The artifact is written through a `.part` temp file and only renamed into
/// place after the fingerprint matches, so a half-assembled or mismatched
/// file never appears under the final name. Chunk data is left untouched;
/// the caller decides when to purge it.
pub fn assemble_artifact(
    store: &ChunkStore,
    session: Uuid,
    layout: &ChunkLayout,
    filename: &str,
    fingerprint: &str,
    artifacts_root: &Path,
) -> Result<PathBuf, AssembleError> {
    let dir = artifacts_root.join(session.to_string());
    std::fs::create_dir_all(&dir)?;

    let final_path = dir.join(filename);
    let part_path = dir.join(format!("{filename}.part"));

    let mut out = std::fs::File::create(&part_path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; COPY_WINDOW];

    for index in 0..layout.total_chunks() {
        let mut chunk = store.open_chunk(session, index).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AssembleError::MissingChunk(index)
            } else {
                AssembleError::Io(e)
            }
        })?;

        loop {
            let n = chunk.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            out.write_all(&buf[..n])?;
        }
    }

    out.flush()?;
    drop(out);

    let actual = hex::encode(hasher.finalize());
    if actual != fingerprint {
        std::fs::remove_file(&part_path)?;
        return Err(AssembleError::FingerprintMismatch {
            expected: fingerprint.to_string(),
            actual,
        });
    }

    std::fs::rename(&part_path, &final_path)?;
    Ok(final_path)
}
