use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Durable holding area for verified chunk bytes, addressed by
/// (session id, chunk index). Lives apart from the final-artifact directory
/// so partial uploads never pollute the completed-output namespace.
///
/// Writes go through a `.part` temp file and an atomic rename, so a crash
/// mid-write never leaves a truncated chunk under its final name, so the
/// recovery sweep can trust any `<index>.chunk` it finds.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    /// Creates a store rooted at `root` (the temporary-chunks area).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding one session's chunks.
    pub fn session_dir(&self, session: Uuid) -> PathBuf {
        self.root.join(session.to_string())
    }

    fn chunk_path(&self, session: Uuid, index: u32) -> PathBuf {
        self.session_dir(session).join(format!("{index}.chunk"))
    }

    /// Persists one chunk. Idempotent: writing an index that already exists
    /// with the same length is a silent success.
    pub fn write_chunk(&self, session: Uuid, index: u32, data: &[u8]) -> std::io::Result<()> {
        let final_path = self.chunk_path(session, index);

        if let Ok(meta) = std::fs::metadata(&final_path) {
            if meta.len() == data.len() as u64 {
                return Ok(());
            }
        }

        let dir = self.session_dir(session);
        std::fs::create_dir_all(&dir)?;

        let part_path = dir.join(format!("{index}.chunk.part"));
        std::fs::write(&part_path, data)?;
        std::fs::rename(&part_path, &final_path)?;
        Ok(())
    }

    /// Returns the stored length of a chunk, or `None` if absent.
    pub fn chunk_len(&self, session: Uuid, index: u32) -> std::io::Result<Option<u64>> {
        match std::fs::metadata(self.chunk_path(session, index)) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Opens a stored chunk for reading (used by the assembler).
    pub fn open_chunk(&self, session: Uuid, index: u32) -> std::io::Result<std::fs::File> {
        std::fs::File::open(self.chunk_path(session, index))
    }

    /// Scans a session's chunks: element `i` is `Some(len)` when chunk `i`
    /// is durably present. `.part` leftovers are invisible here.
    pub fn scan_session(
        &self,
        session: Uuid,
        total_chunks: u32,
    ) -> std::io::Result<Vec<Option<u64>>> {
        let mut present = Vec::with_capacity(total_chunks as usize);
        for index in 0..total_chunks {
            present.push(self.chunk_len(session, index)?);
        }
        Ok(present)
    }

    /// Returns `true` if the session has any on-disk chunk directory.
    pub fn session_dir_exists(&self, session: Uuid) -> bool {
        self.session_dir(session).is_dir()
    }

    /// Deletes all chunk data for a session. Succeeds if nothing exists.
    pub fn remove_session(&self, session: Uuid) -> std::io::Result<()> {
        match std::fs::remove_dir_all(self.session_dir(session)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// The store's root path.
    pub fn root(&self) -> &Path {
        &self.root
    }
}
