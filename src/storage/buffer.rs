//! Chunk buffers
//!
//! A `ChunkBuffer` is a byte vector plus an updated flag and, for data
//! buffers, the column's encoder. Variable-length chunks pair a data buffer
//! with an offset-index buffer whose entries are little-endian `u32`s.

use crate::storage::encoder::Encoder;
use crate::{invariant, Result};

/// Byte width of one offset-index entry
pub const INDEX_ENTRY_SIZE: usize = std::mem::size_of::<u32>();

/// One buffer of a chunk: its length is its size
pub struct ChunkBuffer {
    pub(crate) bytes: Vec<u8>,
    pub(crate) updated: bool,
    pub(crate) encoder: Option<Box<dyn Encoder>>,
}

impl ChunkBuffer {
    /// Data buffer with its encoder attached
    pub fn new_data(bytes: Vec<u8>, encoder: Box<dyn Encoder>) -> Self {
        Self {
            bytes,
            updated: false,
            encoder: Some(encoder),
        }
    }

    /// Offset-index buffer (no encoder)
    pub fn new_index(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            updated: false,
            encoder: None,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn truncate(&mut self, len: usize) {
        self.bytes.truncate(len);
    }

    pub fn mark_updated(&mut self) {
        self.updated = true;
    }

    pub fn clear_updated(&mut self) {
        self.updated = false;
    }

    pub fn is_updated(&self) -> bool {
        self.updated
    }

    pub fn encoder(&self) -> Result<&dyn Encoder> {
        self.encoder
            .as_deref()
            .ok_or_else(|| invariant("buffer has no encoder"))
    }

    pub fn encoder_mut(&mut self) -> Result<&mut (dyn Encoder + 'static)> {
        match self.encoder.as_deref_mut() {
            Some(e) => Ok(e),
            None => Err(invariant("buffer has no encoder")),
        }
    }

    /// Drop the payload; the buffer is unusable until re-materialized
    pub fn release(&mut self) {
        self.bytes = Vec::new();
        self.updated = false;
    }
}

/// Read offset-index entry `i`
#[inline]
pub fn read_index_entry(bytes: &[u8], i: usize) -> u32 {
    let at = i * INDEX_ENTRY_SIZE;
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Write offset-index entry `i`
#[inline]
pub fn write_index_entry(bytes: &mut [u8], i: usize, value: u32) {
    let at = i * INDEX_ENTRY_SIZE;
    bytes[at..at + INDEX_ENTRY_SIZE].copy_from_slice(&value.to_le_bytes());
}
