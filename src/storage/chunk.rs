//! Chunks and chunk keys
//!
//! A chunk is the slice of one column within one fragment: a data buffer
//! plus, for variable-length encodings, an offset-index buffer. Chunks are
//! shared between the data manager's pool and any in-flight update journal.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::catalog::ColumnDescriptor;
use crate::storage::buffer::ChunkBuffer;

/// Identity of one chunk: `(db, table, column, fragment)`. Also used as a
/// prefix when evicting mirror copies from other memory tiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkKey {
    pub db_id: i32,
    pub table_id: i32,
    pub column_id: i32,
    pub fragment_id: i32,
}

impl ChunkKey {
    pub fn new(db_id: i32, table_id: i32, column_id: i32, fragment_id: i32) -> Self {
        Self {
            db_id,
            table_id,
            column_id,
            fragment_id,
        }
    }

    /// Prefix match at chunk granularity
    pub fn has_prefix(&self, prefix: &ChunkKey) -> bool {
        self.db_id == prefix.db_id
            && self.table_id == prefix.table_id
            && self.column_id == prefix.column_id
            && self.fragment_id == prefix.fragment_id
    }
}

/// A pinned column slice
pub struct Chunk {
    pub key: ChunkKey,
    pub desc: Arc<ColumnDescriptor>,
    pub data: Mutex<ChunkBuffer>,
    pub index: Option<Mutex<ChunkBuffer>>,
}

impl Chunk {
    pub fn new(
        key: ChunkKey,
        desc: Arc<ColumnDescriptor>,
        data: ChunkBuffer,
        index: Option<ChunkBuffer>,
    ) -> Self {
        Self {
            key,
            desc,
            data: Mutex::new(data),
            index: index.map(Mutex::new),
        }
    }

}
