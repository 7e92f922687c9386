//! Data manager: chunk pools per memory level plus persisted images
//!
//! Pinned chunks live in per-level pools keyed by `ChunkKey`. The persisted
//! image map stands in for the disk tier: `get_chunk` materializes a chunk
//! from its image on first touch, `checkpoint_table` writes updated buffers
//! back.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::catalog::{ColumnDescriptor, MemoryLevel};
use crate::storage::buffer::ChunkBuffer;
use crate::storage::chunk::{Chunk, ChunkKey};
use crate::storage::encoder::{seeded_encoder, ChunkMeta};
use crate::{invariant, Result};

/// Checkpointed form of one chunk
#[derive(Debug, Clone)]
pub struct ChunkImage {
    pub data: Vec<u8>,
    pub index: Option<Vec<u8>>,
    pub meta: ChunkMeta,
}

/// Buffer pool and persistence stand-in for all chunks
#[derive(Default)]
pub struct DataManager {
    pools: Mutex<AHashMap<(MemoryLevel, ChunkKey), Arc<Chunk>>>,
    images: Mutex<AHashMap<ChunkKey, ChunkImage>>,
}

impl DataManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the chunk for `key` at `level`, materializing it from its
    /// persisted image on first touch. `num_bytes`/`num_elements` come from
    /// the fragment's current chunk metadata and validate the image.
    pub fn get_chunk(
        &self,
        desc: &Arc<ColumnDescriptor>,
        key: &ChunkKey,
        level: MemoryLevel,
        num_bytes: usize,
        num_elements: usize,
    ) -> Result<Arc<Chunk>> {
        let mut pools = self.pools.lock();
        if let Some(chunk) = pools.get(&(level, key.clone())) {
            return Ok(Arc::clone(chunk));
        }

        let images = self.images.lock();
        let image = images
            .get(key)
            .ok_or_else(|| invariant(format!("no persisted chunk for {key:?}")))?;
        if image.data.len() != num_bytes {
            return Err(invariant(format!(
                "chunk {key:?} size mismatch: image {} bytes, metadata {} bytes",
                image.data.len(),
                num_bytes
            )));
        }

        let mut encoder = seeded_encoder(&desc.column_type, &image.meta);
        encoder.set_num_elems(num_elements);
        let data = ChunkBuffer::new_data(image.data.clone(), encoder);
        let index = image.index.clone().map(ChunkBuffer::new_index);
        let chunk = Arc::new(Chunk::new(key.clone(), Arc::clone(desc), data, index));
        pools.insert((level, key.clone()), Arc::clone(&chunk));
        Ok(chunk)
    }

    /// Unpin and drop a chunk's buffers from every pool level
    pub fn free(&self, chunk: &Arc<Chunk>) {
        let mut pools = self.pools.lock();
        pools.retain(|(_, key), _| key != &chunk.key);
        drop(pools);
        chunk.data.lock().release();
        if let Some(index) = &chunk.index {
            index.lock().release();
        }
    }

    /// Evict every chunk matching `prefix` from the given level
    pub fn delete_chunks_with_prefix(&self, prefix: &ChunkKey, level: MemoryLevel) {
        let mut pools = self.pools.lock();
        pools.retain(|(l, key), _| *l != level || !key.has_prefix(prefix));
    }

    /// Write every updated CPU buffer of the table back to its persisted
    /// image and clear the updated flags.
    pub fn checkpoint_table(&self, db_id: i32, table_id: i32) -> Result<()> {
        let chunks: Vec<Arc<Chunk>> = {
            let pools = self.pools.lock();
            pools
                .iter()
                .filter(|((level, key), _)| {
                    *level == MemoryLevel::Cpu && key.db_id == db_id && key.table_id == table_id
                })
                .map(|(_, chunk)| Arc::clone(chunk))
                .collect()
        };

        let mut flushed = 0usize;
        for chunk in chunks {
            let mut data = chunk.data.lock();
            let index_updated = chunk
                .index
                .as_ref()
                .map(|i| i.lock().is_updated())
                .unwrap_or(false);
            if !data.is_updated() && !index_updated {
                continue;
            }

            let mut meta = ChunkMeta::default();
            data.encoder()?.get_metadata(&mut meta);
            meta.num_bytes = data.len();

            let index_bytes = match &chunk.index {
                Some(index) => {
                    let mut idx = index.lock();
                    idx.clear_updated();
                    Some(idx.bytes().to_vec())
                }
                None => None,
            };

            let mut images = self.images.lock();
            images.insert(
                chunk.key.clone(),
                ChunkImage {
                    data: data.bytes().to_vec(),
                    index: index_bytes,
                    meta,
                },
            );
            drop(images);
            data.clear_updated();
            flushed += 1;
        }
        log::debug!("checkpointed {flushed} chunks for table {table_id}");
        Ok(())
    }

    /// Install the persisted image for a freshly built chunk
    pub fn register_image(&self, key: ChunkKey, image: ChunkImage) {
        self.images.lock().insert(key, image);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SqlType;

    fn test_desc() -> Arc<ColumnDescriptor> {
        Arc::new(ColumnDescriptor {
            table_id: 1,
            column_id: 1,
            name: "v".into(),
            column_type: SqlType::int(),
            is_virtual: false,
            is_delete_col: false,
        })
    }

    fn int_image(values: &[i32]) -> ChunkImage {
        let mut data = Vec::new();
        for v in values {
            data.extend_from_slice(&v.to_le_bytes());
        }
        ChunkImage {
            meta: ChunkMeta {
                num_elements: values.len(),
                num_bytes: data.len(),
                ..ChunkMeta::default()
            },
            data,
            index: None,
        }
    }

    #[test]
    fn test_pin_materializes_and_reuses() {
        let mgr = DataManager::new();
        let key = ChunkKey::new(1, 1, 1, 0);
        mgr.register_image(key.clone(), int_image(&[10, 20, 30]));

        let desc = test_desc();
        let a = mgr.get_chunk(&desc, &key, MemoryLevel::Cpu, 12, 3).unwrap();
        let b = mgr.get_chunk(&desc, &key, MemoryLevel::Cpu, 12, 3).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.data.lock().len(), 12);
    }

    #[test]
    fn test_size_mismatch_is_fatal() {
        let mgr = DataManager::new();
        let key = ChunkKey::new(1, 1, 1, 0);
        mgr.register_image(key.clone(), int_image(&[1, 2]));
        let err = mgr.get_chunk(&test_desc(), &key, MemoryLevel::Cpu, 99, 2);
        assert!(err.is_err());
    }

    #[test]
    fn test_free_forces_rematerialize() {
        let mgr = DataManager::new();
        let key = ChunkKey::new(1, 1, 1, 0);
        mgr.register_image(key.clone(), int_image(&[7]));

        let desc = test_desc();
        let chunk = mgr.get_chunk(&desc, &key, MemoryLevel::Cpu, 4, 1).unwrap();
        chunk.data.lock().bytes_mut()[0] = 0xFF;
        mgr.free(&chunk);

        let fresh = mgr.get_chunk(&desc, &key, MemoryLevel::Cpu, 4, 1).unwrap();
        assert!(!Arc::ptr_eq(&chunk, &fresh));
        assert_eq!(fresh.data.lock().bytes()[0], 7);
    }

    #[test]
    fn test_gpu_prefix_eviction() {
        let mgr = DataManager::new();
        let key = ChunkKey::new(1, 1, 1, 0);
        mgr.register_image(key.clone(), int_image(&[5]));

        let desc = test_desc();
        let _cpu = mgr.get_chunk(&desc, &key, MemoryLevel::Cpu, 4, 1).unwrap();
        let _gpu = mgr.get_chunk(&desc, &key, MemoryLevel::Gpu, 4, 1).unwrap();

        mgr.delete_chunks_with_prefix(&key, MemoryLevel::Gpu);
        let pools = mgr.pools.lock();
        assert!(pools.contains_key(&(MemoryLevel::Cpu, key.clone())));
        assert!(!pools.contains_key(&(MemoryLevel::Gpu, key)));
    }

    #[test]
    fn test_checkpoint_writes_back() {
        let mgr = DataManager::new();
        let key = ChunkKey::new(1, 1, 1, 0);
        mgr.register_image(key.clone(), int_image(&[1, 2, 3]));

        let desc = test_desc();
        let chunk = mgr.get_chunk(&desc, &key, MemoryLevel::Cpu, 12, 3).unwrap();
        {
            let mut data = chunk.data.lock();
            data.bytes_mut()[0..4].copy_from_slice(&42i32.to_le_bytes());
            data.mark_updated();
        }
        mgr.checkpoint_table(1, 1).unwrap();

        assert!(!chunk.data.lock().is_updated());
        let images = mgr.images.lock();
        let img = images.get(&key).unwrap();
        assert_eq!(&img.data[0..4], &42i32.to_le_bytes());
    }
}
