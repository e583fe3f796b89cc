//! Chunk codec for child process output streams.
//!
//! Console output is not line-oriented: an `input()` prompt arrives without
//! a trailing newline and must reach the display immediately. [`OutputCodec`]
//! therefore yields whatever bytes the last read produced, split only when a
//! read exceeds [`MAX_CHUNK_BYTES`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use halyra_run::runner::codec::OutputCodec;
//!
//! let reader = FramedRead::new(child_stdout, OutputCodec::new());
//! ```

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::{AppError, Result};

/// Largest chunk handed to the display sink in one event: 64 KiB.
pub const MAX_CHUNK_BYTES: usize = 65_536;

/// Read-chunk codec for raw output streams.
#[derive(Debug, Clone, Copy)]
pub struct OutputCodec {
    max_chunk: usize,
}

impl OutputCodec {
    /// Create a codec with the default [`MAX_CHUNK_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_chunk: MAX_CHUNK_BYTES,
        }
    }

    /// Create a codec with a custom chunk limit (minimum 1 byte).
    #[must_use]
    pub fn with_max_chunk(max_chunk: usize) -> Self {
        Self {
            max_chunk: max_chunk.max(1),
        }
    }

    /// Configured chunk limit.
    #[must_use]
    pub fn max_chunk(&self) -> usize {
        self.max_chunk
    }
}

impl Default for OutputCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for OutputCodec {
    type Item = Bytes;
    type Error = AppError;

    /// Take up to `max_chunk` buffered bytes.
    ///
    /// Returns `Ok(None)` only when nothing is buffered.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.is_empty() {
            return Ok(None);
        }
        let len = src.len().min(self.max_chunk);
        Ok(Some(src.split_to(len).freeze()))
    }
}
