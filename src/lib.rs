//! Fragbase Columnar Fragment Core
//!
//! The column-update and fragment-compaction core of a columnar analytical
//! table store. A table is partitioned into fragments (row ranges); each
//! fragment holds one chunk per physical column. This crate provides:
//!
//! - In-place update of one column's values at a set of row offsets inside a
//!   single fragment, with per-target-type re-encoding and min/max/null
//!   statistics coalescing.
//! - Logical-delete-driven vacuum: physical removal of marked rows from
//!   fixed-width and variable-length chunks, preserving survivor order.
//! - Transactional staging through an update journal that either publishes
//!   dirty chunks and shadow metadata atomically or discards them.

pub mod catalog;
pub mod data;
pub mod fragment;
pub mod storage;

// Re-export main types
pub use catalog::{Catalog, ColumnDescriptor, ColumnSpec, MemoryLevel, TableDescriptor};
pub use data::{Compression, ScalarValue, SqlType, TypeKind};
pub use fragment::{compact_rows, update_column, Fragmenter, FragmenterConfig, UpdateRoll};
pub use storage::{ChunkKey, ChunkMeta, StatValue};

/// Storage core error type
#[derive(Debug, thiserror::Error)]
pub enum FragError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("UPDATE does not support cast {0}")]
    UnsupportedCast(String),

    #[error("Data conversion overflow {0}")]
    DataConversionOverflow(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Dictionary not found for id {0}")]
    DictionaryMissing(i32),

    #[error("Update journal misuse: {0}")]
    JournalMisuse(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Update failed: {0}")]
    UpdateFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, FragError>;

/// Shorthand for contract-breach failures (CHECK-equivalent): these indicate
/// caller error or catalog corruption and abort the operation immediately.
pub(crate) fn invariant(msg: impl Into<String>) -> FragError {
    FragError::InvariantViolation(msg.into())
}
