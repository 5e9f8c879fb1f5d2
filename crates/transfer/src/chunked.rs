use std::io::Read;
use std::path::Path;

use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// One ordered slice of a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 1-based position within the transfer.
    pub ordinal: u32,
    /// Number of chunks the whole file splits into.
    pub total_chunks: u32,
    /// Byte offset of `data` within the file.
    pub offset: u64,
    /// Raw chunk data.
    pub data: Vec<u8>,
}

impl Chunk {
    /// Returns `true` for the final chunk of the file.
    pub fn is_last(&self) -> bool {
        self.ordinal == self.total_chunks
    }

    /// Size of this chunk in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Number of chunks a file of `file_size` bytes splits into: `ceil(size / chunk)`.
pub fn chunk_count(file_size: u64, chunk_size: usize) -> u64 {
    let chunk_size = effective_chunk_size(chunk_size) as u64;
    file_size.div_ceil(chunk_size)
}

fn effective_chunk_size(chunk_size: usize) -> usize {
    if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    }
}

/// Reads a file sequentially in fixed-size chunks.
///
/// Only one chunk buffer is alive at a time; every chunk except possibly the
/// last is exactly `chunk_size` bytes.
pub struct ChunkReader {
    file: std::fs::File,
    chunk_size: usize,
    offset: u64,
    file_size: u64,
    next_ordinal: u32,
    total_chunks: u32,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used. Directories and
    /// other non-regular paths are refused with [`TransferError::NotAFile`].
    pub fn new(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file = std::fs::File::open(path)?;
        let metadata = file.metadata()?;
        if !metadata.is_file() {
            return Err(TransferError::NotAFile(path.to_path_buf()));
        }
        let file_size = metadata.len();
        let chunk_size = effective_chunk_size(chunk_size);

        let chunks = chunk_count(file_size, chunk_size);
        let total_chunks =
            u32::try_from(chunks).map_err(|_| TransferError::TooManyChunks { chunks, chunk_size })?;

        Ok(Self {
            file,
            chunk_size,
            offset: 0,
            file_size,
            next_ordinal: 1,
            total_chunks,
        })
    }

    /// Reads the next chunk. Returns `None` once the file is exhausted.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(None);
        }

        let read_size = remaining.min(self.chunk_size as u64) as usize;
        let mut buf = vec![0u8; read_size];
        self.file.read_exact(&mut buf)?;

        let chunk = Chunk {
            ordinal: self.next_ordinal,
            total_chunks: self.total_chunks,
            offset: self.offset,
            data: buf,
        };
        self.offset += read_size as u64;
        self.next_ordinal += 1;
        Ok(Some(chunk))
    }

    /// Chunk size in effect for this reader.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Total number of chunks the file splits into.
    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.file_size - self.offset
    }
}
