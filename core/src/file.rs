use crate::hash::{content_hash, ContentHash};
use crate::{Result, SimError};
use std::fs;
use std::path::Path;

pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024; // 256KB

/// A file selected for a simulated transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl SimFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Read a file from disk, keeping only its file name.
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        Ok(Self { name, data })
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn chunks(&self, chunk_size: usize) -> Result<Vec<FileChunk>> {
        chunk_bytes(&self.data, chunk_size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChunk {
    pub id: u32,
    pub offset: u64,
    pub data: Vec<u8>,
    pub hash: ContentHash,
}

impl FileChunk {
    pub fn new(id: u32, offset: u64, data: Vec<u8>) -> Self {
        let hash = content_hash(&data);
        Self {
            id,
            offset,
            data,
            hash,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Verify that a chunk's data matches its hash
pub fn verify_chunk(chunk: &FileChunk) -> bool {
    content_hash(&chunk.data) == chunk.hash
}

/// Split bytes into consecutive chunks of at most `chunk_size` bytes.
///
/// Each chunk is hashed on its own bytes only. Empty input yields no chunks.
pub fn chunk_bytes(data: &[u8], chunk_size: usize) -> Result<Vec<FileChunk>> {
    if chunk_size == 0 {
        return Err(SimError::InvalidChunkSize);
    }

    Ok(data
        .chunks(chunk_size)
        .enumerate()
        .map(|(index, slice)| {
            FileChunk::new(index as u32, (index * chunk_size) as u64, slice.to_vec())
        })
        .collect())
}

/// Reassemble chunks into the original bytes, in id order.
pub fn assemble_chunks(chunks: &[FileChunk]) -> Result<Vec<u8>> {
    let mut sorted: Vec<&FileChunk> = chunks.iter().collect();
    sorted.sort_by_key(|c| c.id);

    let mut out = Vec::with_capacity(chunks.iter().map(|c| c.data.len()).sum());
    for (i, chunk) in sorted.iter().enumerate() {
        if chunk.id != i as u32 {
            return Err(SimError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Missing chunk {}", i),
            )));
        }

        if !verify_chunk(chunk) {
            return Err(SimError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Chunk {} data verification failed", i),
            )));
        }

        out.extend_from_slice(&chunk.data);
    }

    Ok(out)
}
