//! Update journal
//!
//! Per logical update, accumulates dirty chunks, shadow chunk metadata, and
//! shadow tuple counts, then either publishes everything to the owning
//! fragments (commit) or discards it (cancel). Taking `self` by value on
//! both terminators makes reuse after termination unrepresentable.

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;

use crate::catalog::{Catalog, MemoryLevel};
use crate::storage::{Chunk, ChunkKey, ChunkMeta};
use crate::{invariant, FragError, Result};

/// `(table_id, fragment_id)` addressing one staged fragment
pub type MetaKey = (i32, i32);

#[derive(Default)]
struct RollInner {
    catalog: Option<Arc<Catalog>>,
    logical_table_id: Option<i32>,
    memory_level: Option<MemoryLevel>,
    /// Strong ownership of every chunk touched by this update
    dirty_chunks: AHashMap<ChunkKey, Arc<Chunk>>,
    /// Keys used to evict mirror copies on other tiers at commit
    dirty_chunk_keys: AHashSet<ChunkKey>,
    /// Staged successor of each fragment's chunk metadata map
    chunk_metadata: AHashMap<MetaKey, BTreeMap<i32, ChunkMeta>>,
    /// Staged successor of each fragment's tuple count
    num_tuples: AHashMap<MetaKey, usize>,
}

/// Per-update staging journal
#[derive(Default)]
pub struct UpdateRoll {
    inner: Mutex<RollInner>,
}

impl UpdateRoll {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the update's context. The first write wins; later writes must
    /// agree or the journal is being shared across incompatible operations.
    pub fn record_context(
        &self,
        catalog: &Arc<Catalog>,
        logical_table_id: i32,
        memory_level: MemoryLevel,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        match &inner.catalog {
            None => {
                inner.catalog = Some(Arc::clone(catalog));
                inner.logical_table_id = Some(logical_table_id);
                inner.memory_level = Some(memory_level);
                Ok(())
            }
            Some(existing) => {
                if !Arc::ptr_eq(existing, catalog)
                    || inner.logical_table_id != Some(logical_table_id)
                    || inner.memory_level != Some(memory_level)
                {
                    return Err(FragError::JournalMisuse(
                        "journal context disagrees with an earlier operation".into(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Idempotent insert of a touched chunk
    pub fn ensure_dirty_chunk(&self, chunk: &Arc<Chunk>) {
        let mut inner = self.inner.lock();
        inner
            .dirty_chunks
            .entry(chunk.key.clone())
            .or_insert_with(|| Arc::clone(chunk));
    }

    pub fn add_dirty_key(&self, key: ChunkKey) {
        self.inner.lock().dirty_chunk_keys.insert(key);
    }

    /// Overwrite one column's staged metadata entry. The fragment's staged
    /// map and tuple count are lazily initialized from the current physical
    /// state on first touch.
    pub fn stage_meta(
        &self,
        key: MetaKey,
        init_map: &BTreeMap<i32, ChunkMeta>,
        init_num_tuples: usize,
        column_id: i32,
        meta: ChunkMeta,
    ) {
        let mut inner = self.inner.lock();
        inner
            .num_tuples
            .entry(key)
            .or_insert(init_num_tuples);
        inner
            .chunk_metadata
            .entry(key)
            .or_insert_with(|| init_map.clone())
            .insert(column_id, meta);
    }

    /// Refresh only the element/byte counts of one column's staged entry,
    /// leaving its stat bounds as they were.
    pub fn stage_counts(
        &self,
        key: MetaKey,
        init_map: &BTreeMap<i32, ChunkMeta>,
        init_num_tuples: usize,
        column_id: i32,
        num_elements: usize,
        num_bytes: usize,
    ) {
        let mut inner = self.inner.lock();
        inner
            .num_tuples
            .entry(key)
            .or_insert(init_num_tuples);
        let entry = inner
            .chunk_metadata
            .entry(key)
            .or_insert_with(|| init_map.clone())
            .entry(column_id)
            .or_default();
        entry.num_elements = num_elements;
        entry.num_bytes = num_bytes;
    }

    pub fn set_num_tuples(&self, key: MetaKey, n: usize) {
        self.inner.lock().num_tuples.insert(key, n);
    }

    /// Whether any state has been staged (used by tests and callers probing
    /// for no-op updates)
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        inner.dirty_chunks.is_empty() && inner.chunk_metadata.is_empty()
    }

    /// Publish all staged state. A journal never given a context is a no-op.
    pub fn commit(self) -> Result<()> {
        let inner = self.inner.into_inner();
        let Some(catalog) = inner.catalog else {
            return Ok(());
        };
        let logical_table_id = inner
            .logical_table_id
            .ok_or_else(|| FragError::JournalMisuse("journal has no table context".into()))?;
        let td = catalog.table_by_id(logical_table_id)?;

        // Checkpoint disk-persisted tables regardless of dirtiness so shard
        // epochs stay in sync.
        if td.persistence_level == MemoryLevel::Disk {
            catalog.checkpoint(logical_table_id)?;
        }

        for (key, metadata) in &inner.chunk_metadata {
            let table = catalog.table_by_id(key.0)?;
            let num_tuples = inner
                .num_tuples
                .get(key)
                .copied()
                .ok_or_else(|| invariant("staged metadata without a staged tuple count"))?;
            table
                .fragmenter
                .registry()
                .update_metadata(key.1, metadata, num_tuples)?;
        }

        // Mirror copies on the GPU tier are stale unless the update ran there.
        if inner.memory_level != Some(MemoryLevel::Gpu) {
            for key in &inner.dirty_chunk_keys {
                catalog.data_mgr().delete_chunks_with_prefix(key, MemoryLevel::Gpu);
            }
        }

        log::debug!(
            "committed update: {} fragments, {} dirty chunks",
            inner.chunk_metadata.len(),
            inner.dirty_chunks.len()
        );
        Ok(())
    }

    /// Discard all staged state. Dirty buffers are freed when the table does
    /// not persist at the tier the update ran at, forcing a re-materialize
    /// from the persisted image on next pin.
    pub fn cancel(self) -> Result<()> {
        let inner = self.inner.into_inner();
        let Some(catalog) = inner.catalog else {
            return Ok(());
        };
        let logical_table_id = inner
            .logical_table_id
            .ok_or_else(|| FragError::JournalMisuse("journal has no table context".into()))?;
        let td = catalog.table_by_id(logical_table_id)?;

        if Some(td.persistence_level) != inner.memory_level {
            for chunk in inner.dirty_chunks.values() {
                catalog.data_mgr().free(chunk);
            }
        }
        log::debug!("cancelled update: {} dirty chunks", inner.dirty_chunks.len());
        Ok(())
    }
}
