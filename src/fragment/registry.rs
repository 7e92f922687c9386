//! Fragment descriptors and the per-table fragment registry

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::storage::ChunkMeta;
use crate::{invariant, Result};

/// One row range of a table. The shadow fields stage the successor state an
/// in-flight update journal will publish on commit.
#[derive(Debug, Clone)]
pub struct FragmentInfo {
    pub fragment_id: i32,
    physical_num_tuples: usize,
    shadow_num_tuples: usize,
    chunk_metadata: BTreeMap<i32, ChunkMeta>,
    shadow_chunk_metadata: BTreeMap<i32, ChunkMeta>,
}

impl FragmentInfo {
    pub fn new(fragment_id: i32, num_tuples: usize, metadata: BTreeMap<i32, ChunkMeta>) -> Self {
        Self {
            fragment_id,
            physical_num_tuples: num_tuples,
            shadow_num_tuples: num_tuples,
            shadow_chunk_metadata: metadata.clone(),
            chunk_metadata: metadata,
        }
    }

    pub fn physical_num_tuples(&self) -> usize {
        self.physical_num_tuples
    }

    pub fn shadow_num_tuples(&self) -> usize {
        self.shadow_num_tuples
    }

    pub fn chunk_metadata(&self) -> &BTreeMap<i32, ChunkMeta> {
        &self.chunk_metadata
    }

    pub fn shadow_chunk_metadata(&self) -> &BTreeMap<i32, ChunkMeta> {
        &self.shadow_chunk_metadata
    }

    pub fn chunk_meta(&self, column_id: i32) -> Result<&ChunkMeta> {
        self.chunk_metadata.get(&column_id).ok_or_else(|| {
            invariant(format!(
                "no chunk metadata for column {column_id} in fragment {}",
                self.fragment_id
            ))
        })
    }
}

/// Owns the fragment descriptors of one table and serializes metadata
/// publication behind a reader/writer lock.
#[derive(Default)]
pub struct FragmentRegistry {
    fragments: RwLock<Vec<FragmentInfo>>,
}

impl FragmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_fragment(&self, info: FragmentInfo) {
        self.fragments.write().push(info);
    }

    /// Clone of the fragment descriptor. Absence is a caller contract breach.
    pub fn get(&self, fragment_id: i32) -> Result<FragmentInfo> {
        self.fragments
            .read()
            .iter()
            .find(|f| f.fragment_id == fragment_id)
            .cloned()
            .ok_or_else(|| invariant(format!("fragment {fragment_id} not found")))
    }

    /// Publish staged chunk metadata and tuple count: both the live and the
    /// shadow copies are overwritten under the writer lock.
    pub fn update_metadata(
        &self,
        fragment_id: i32,
        metadata: &BTreeMap<i32, ChunkMeta>,
        num_tuples: usize,
    ) -> Result<()> {
        let mut fragments = self.fragments.write();
        let fragment = fragments
            .iter_mut()
            .find(|f| f.fragment_id == fragment_id)
            .ok_or_else(|| invariant(format!("fragment {fragment_id} not found")))?;
        fragment.shadow_chunk_metadata = metadata.clone();
        fragment.chunk_metadata = metadata.clone();
        fragment.shadow_num_tuples = num_tuples;
        fragment.physical_num_tuples = num_tuples;
        Ok(())
    }

}

/// Behavior knobs for a table's fragmenter
#[derive(Debug, Clone, Copy, Default)]
pub struct FragmenterConfig {
    /// Vacuum a fragment immediately whenever its delete marker is updated.
    /// A testing hook; production vacuums are scheduled separately.
    pub unconditional_vacuum: bool,
}

/// Per-table driver for fragment mutation: owns the registry, the dictionary
/// add lock, and the vacuum configuration.
pub struct Fragmenter {
    pub table_id: i32,
    pub(crate) registry: FragmentRegistry,
    /// Serializes dictionary id allocation across parallel update tasks
    pub(crate) dict_lock: Mutex<()>,
    pub(crate) config: FragmenterConfig,
    next_fragment_id: AtomicI32,
}

impl Fragmenter {
    pub fn new(table_id: i32, config: FragmenterConfig) -> Self {
        Self {
            table_id,
            registry: FragmentRegistry::new(),
            dict_lock: Mutex::new(()),
            config,
            next_fragment_id: AtomicI32::new(0),
        }
    }

    pub fn registry(&self) -> &FragmentRegistry {
        &self.registry
    }

    pub(crate) fn alloc_fragment_id(&self) -> i32 {
        self.next_fragment_id.fetch_add(1, Ordering::SeqCst)
    }
}
