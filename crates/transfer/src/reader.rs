use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::checksum::checksum_bytes;
use crate::layout::ChunkLayout;
use crate::TransferError;

/// One chunk sliced out of a local file, with its checksum precomputed.
#[derive(Debug, Clone)]
pub struct FileChunk {
    /// Chunk index within the file.
    pub index: u32,
    /// Raw chunk bytes.
    pub data: Vec<u8>,
    /// Hex SHA-256 of `data`.
    pub checksum: String,
}

impl FileChunk {
    /// Reads chunk `index` of `path` according to `layout`.
    ///
    /// Opens the file per call so concurrent workers can slice the same file
    /// without sharing a handle. Returns `SizeMismatch` if the file shrank
    /// since the layout was computed.
    pub fn read(path: &Path, layout: &ChunkLayout, index: u32) -> Result<Self, TransferError> {
        let expected = layout.expected_len(index)?;

        let mut file = std::fs::File::open(path)?;
        file.seek(SeekFrom::Start(layout.offset(index)))?;

        let mut data = vec![0u8; expected as usize];
        let mut filled = 0;
        while filled < data.len() {
            let n = file.read(&mut data[filled..])?;
            if n == 0 {
                return Err(TransferError::SizeMismatch {
                    expected,
                    actual: filled as u64,
                });
            }
            filled += n;
        }

        let checksum = checksum_bytes(&data);
        Ok(Self {
            index,
            data,
            checksum,
        })
    }
}
