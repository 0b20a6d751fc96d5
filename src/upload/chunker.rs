//! Fixed-size chunking of an in-memory buffer
//!
//! Chunk `i` (0-based) covers `[i * size, min((i + 1) * size, len))` and is
//! uploaded as part `i + 1`. Empty buffers are rejected: an object store
//! cannot finalize a multipart upload without parts.

use super::types::{UploadError, MAX_PARTS};

/// One contiguous slice of the plaintext
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// 1-based, contiguous sequence number; doubles as the part number
    pub number: usize,
    pub data: &'a [u8],
}

/// Splits a buffer into ordered chunks of at most `chunk_size` bytes
#[derive(Debug, Clone, Copy)]
pub struct Chunker<'a> {
    data: &'a [u8],
    chunk_size: usize,
}

impl<'a> Chunker<'a> {
    pub fn new(data: &'a [u8], chunk_size: usize) -> Result<Self, UploadError> {
        if chunk_size == 0 {
            return Err(UploadError::InvalidInput("chunk size must be positive".into()));
        }
        if data.is_empty() {
            return Err(UploadError::InvalidInput("file is empty".into()));
        }

        let chunker = Self { data, chunk_size };
        if chunker.count() > MAX_PARTS {
            return Err(UploadError::InvalidInput(format!(
                "{} bytes in {} byte chunks needs {} parts (max: {})",
                data.len(),
                chunk_size,
                chunker.count(),
                MAX_PARTS
            )));
        }

        Ok(chunker)
    }

    /// Number of chunks, `ceil(len / chunk_size)`
    pub fn count(&self) -> usize {
        self.data.len().div_ceil(self.chunk_size)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Iterate chunks in order. Each call starts again from the first chunk.
    pub fn iter(&self) -> Chunks<'a> {
        Chunks {
            inner: self.data.chunks(self.chunk_size),
            next_number: 1,
        }
    }
}

impl<'a> IntoIterator for &Chunker<'a> {
    type Item = Chunk<'a>;
    type IntoIter = Chunks<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over the chunks of a [`Chunker`]
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    inner: std::slice::Chunks<'a, u8>,
    next_number: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let data = self.inner.next()?;
        let number = self.next_number;
        self.next_number += 1;
        Some(Chunk { number, data })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Chunks<'_> {}
