//! Per-fragment row compaction
//!
//! Physically removes a set of logically deleted rows from every physical
//! column of one fragment. Each column's chunk is vacuumed by its own task;
//! fixed-width columns rescan their surviving rows to rebuild statistics,
//! fixed-length arrays replay their encoder's per-row refresh, and
//! variable-length columns keep whatever their encoder reports.

use std::sync::Arc;

use rayon::prelude::*;

use crate::catalog::{Catalog, MemoryLevel, TableDescriptor};
use crate::fragment::coerce::{get_scalar_f64, get_scalar_i64};
use crate::fragment::registry::{FragmentInfo, Fragmenter};
use crate::fragment::roll::UpdateRoll;
use crate::fragment::stats::ChunkStats;
use crate::fragment::vacuum::{vacuum_fixed_rows, vacuum_varlen_rows};
use crate::storage::{write_index_entry, Chunk, ChunkKey, INDEX_ENTRY_SIZE};
use crate::{invariant, FragError, Result};

/// Name-resolving entry point for fragment compaction
pub fn compact_rows(
    catalog: &Arc<Catalog>,
    table_name: &str,
    fragment_id: i32,
    frag_offsets: &[u64],
    memory_level: MemoryLevel,
    roll: &UpdateRoll,
) -> Result<()> {
    let td = catalog.get_table(table_name)?;
    td.fragmenter
        .compact_rows(catalog, &td, fragment_id, frag_offsets, memory_level, roll)
}

impl Fragmenter {
    /// Remove the rows at `frag_offsets` from every physical column of the
    /// fragment, staging refreshed metadata and the reduced tuple count in
    /// the journal.
    pub fn compact_rows(
        &self,
        catalog: &Arc<Catalog>,
        td: &Arc<TableDescriptor>,
        fragment_id: i32,
        frag_offsets: &[u64],
        memory_level: MemoryLevel,
        roll: &UpdateRoll,
    ) -> Result<()> {
        if frag_offsets.is_empty() {
            return Ok(());
        }
        roll.record_context(catalog, catalog.logical_table_id(td.table_id)?, memory_level)?;

        let fragment = self.registry.get(fragment_id)?;
        let nrows_in_fragment = fragment.physical_num_tuples();
        if !frag_offsets.windows(2).all(|w| w[0] < w[1]) {
            return Err(invariant("delete offsets are not strictly increasing"));
        }
        if let Some(&last) = frag_offsets.last() {
            if last as usize >= nrows_in_fragment {
                return Err(invariant(format!(
                    "delete offset {last} outside fragment of {nrows_in_fragment} tuples"
                )));
            }
        }

        let chunks = self.chunks_for_all_columns(catalog, td, &fragment, memory_level)?;
        let nrows_to_keep = nrows_in_fragment - frag_offsets.len();
        log::debug!(
            "compacting fragment {fragment_id}: {} deletes over {} columns, {nrows_to_keep} rows kept",
            frag_offsets.len(),
            chunks.len()
        );

        let results: Vec<Result<ChunkStats>> = chunks
            .par_iter()
            .map(|chunk| {
                if chunk.desc.column_type.is_varlen() {
                    self.vacuum_varlen_chunk(
                        chunk,
                        frag_offsets,
                        nrows_in_fragment,
                        nrows_to_keep,
                        &fragment,
                        roll,
                    )
                    .map(|_| ChunkStats::new())
                } else {
                    self.vacuum_fixlen_chunk(
                        chunk,
                        frag_offsets,
                        nrows_in_fragment,
                        nrows_to_keep,
                        &fragment,
                        roll,
                    )
                }
            })
            .collect();

        let mut per_chunk = Vec::with_capacity(chunks.len());
        let mut first_err: Option<FragError> = None;
        for r in results {
            match r {
                Ok(s) => per_chunk.push(s),
                Err(e) => {
                    per_chunk.push(ChunkStats::new());
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }

        roll.set_num_tuples((td.table_id, fragment_id), nrows_to_keep);

        for (chunk, stats) in chunks.iter().zip(per_chunk.iter()) {
            if !chunk.desc.column_type.is_fixlen_array() {
                self.update_column_metadata(&chunk.desc, &fragment, chunk, stats, roll)?;
            }
        }
        Ok(())
    }

    /// Pin one chunk per physical column of the fragment
    fn chunks_for_all_columns(
        &self,
        catalog: &Arc<Catalog>,
        td: &Arc<TableDescriptor>,
        fragment: &FragmentInfo,
        memory_level: MemoryLevel,
    ) -> Result<Vec<Arc<Chunk>>> {
        let mut chunks = Vec::new();
        for cd in td.physical_columns() {
            let meta = fragment.chunk_meta(cd.column_id)?;
            let key = ChunkKey::new(
                catalog.current_db_id(),
                td.table_id,
                cd.column_id,
                fragment.fragment_id,
            );
            chunks.push(catalog.data_mgr().get_chunk(
                cd,
                &key,
                memory_level,
                meta.num_bytes,
                meta.num_elements,
            )?);
        }
        Ok(chunks)
    }

    /// Vacuum one fixed-width (or fixed-length-array) chunk and rebuild its
    /// statistics from the surviving rows.
    fn vacuum_fixlen_chunk(
        &self,
        chunk: &Arc<Chunk>,
        frag_offsets: &[u64],
        nrows_in_fragment: usize,
        nrows_to_keep: usize,
        fragment: &FragmentInfo,
        roll: &UpdateRoll,
    ) -> Result<ChunkStats> {
        let ty = &chunk.desc.column_type;
        let element_size = ty
            .size()
            .ok_or_else(|| invariant(format!("column {} has no fixed size", chunk.desc.name)))?;

        let mut data = chunk.data.lock();
        let nbytes_kept =
            vacuum_fixed_rows(data.bytes_mut(), element_size, nrows_in_fragment, frag_offsets);
        data.truncate(nbytes_kept);
        data.encoder_mut()?.set_num_elems(nrows_to_keep);
        data.mark_updated();

        roll.stage_counts(
            (chunk.desc.table_id, fragment.fragment_id),
            fragment.chunk_metadata(),
            fragment.shadow_num_tuples(),
            chunk.desc.column_id,
            nrows_to_keep,
            nbytes_kept,
        );
        roll.ensure_dirty_chunk(chunk);

        let mut stats = ChunkStats::new();
        let buf = &mut *data;
        if ty.is_fixlen_array() {
            let encoder = buf
                .encoder
                .as_deref_mut()
                .and_then(|e| e.as_fixed_array())
                .ok_or_else(|| {
                    invariant(format!(
                        "column {} lacks a fixed-length array encoder",
                        chunk.desc.name
                    ))
                })?;
            for row in buf.bytes[..nbytes_kept].chunks_exact(element_size) {
                encoder.update_metadata(row);
            }
        } else {
            let can_be_null = !ty.get_notnull();
            for slot in buf.bytes[..nbytes_kept].chunks_exact(element_size) {
                if ty.is_fp() {
                    match get_scalar_f64(slot, ty) {
                        Some(v) => stats.observe_f64(v),
                        None => {
                            if can_be_null {
                                stats.observe_null();
                            }
                        }
                    }
                } else {
                    match get_scalar_i64(slot, ty) {
                        Some(v) => stats.observe_i64(v),
                        None => {
                            if can_be_null {
                                stats.observe_null();
                            }
                        }
                    }
                }
            }
        }
        Ok(stats)
    }

    /// Vacuum one variable-length chunk, keeping the data buffer and its
    /// offset index consistent.
    fn vacuum_varlen_chunk(
        &self,
        chunk: &Arc<Chunk>,
        frag_offsets: &[u64],
        nrows_in_fragment: usize,
        nrows_to_keep: usize,
        fragment: &FragmentInfo,
        roll: &UpdateRoll,
    ) -> Result<()> {
        let index = chunk.index.as_ref().ok_or_else(|| {
            invariant(format!(
                "variable-length column {} has no index buffer",
                chunk.desc.name
            ))
        })?;

        let mut data = chunk.data.lock();
        let mut idx = index.lock();
        let nbytes_kept = vacuum_varlen_rows(
            data.bytes_mut(),
            idx.bytes_mut(),
            nrows_in_fragment,
            frag_offsets,
        );

        data.encoder_mut()?.set_num_elems(nrows_to_keep);
        data.truncate(nbytes_kept);
        data.mark_updated();

        write_index_entry(idx.bytes_mut(), nrows_to_keep, nbytes_kept as u32);
        let index_len = if nrows_to_keep == 0 {
            0
        } else {
            (nrows_to_keep + 1) * INDEX_ENTRY_SIZE
        };
        idx.truncate(index_len);
        idx.mark_updated();

        roll.stage_counts(
            (chunk.desc.table_id, fragment.fragment_id),
            fragment.chunk_metadata(),
            fragment.shadow_num_tuples(),
            chunk.desc.column_id,
            nrows_to_keep,
            nbytes_kept,
        );
        roll.ensure_dirty_chunk(chunk);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ScalarValue, SqlType};
    use crate::fragment::testkit::*;
    use crate::storage::StatValue;

    #[test]
    fn test_compact_fixed_rows() {
        let h = Harness::int_table(&[10, 20, 30, 40, 50]);
        let roll = UpdateRoll::new();
        h.compact(&[1, 3], &roll).unwrap();
        roll.commit().unwrap();

        assert_eq!(h.fragment_tuples(), 3);
        assert_eq!(h.read_i32s("v"), vec![10, 30, 50]);
        let meta = h.fragment_meta("v");
        assert_eq!(meta.num_elements, 3);
        assert_eq!(meta.num_bytes, 12);
    }

    #[test]
    fn test_compact_varlen_rows() {
        let h = Harness::varlen_table(&["aa", "bbb", "cccc"]);
        let roll = UpdateRoll::new();
        h.compact(&[1], &roll).unwrap();
        roll.commit().unwrap();

        assert_eq!(h.fragment_tuples(), 2);
        assert_eq!(h.read_bytes("s"), b"aacccc".to_vec());
        assert_eq!(h.read_index("s"), vec![0, 2, 6]);
        let meta = h.fragment_meta("s");
        assert_eq!(meta.num_elements, 2);
        assert_eq!(meta.num_bytes, 6);
        assert_eq!(meta.min, None);
        assert_eq!(meta.max, None);
    }

    #[test]
    fn test_compact_all_rows() {
        let h = Harness::varlen_table(&["x", "yy"]);
        let roll = UpdateRoll::new();
        h.compact(&[0, 1], &roll).unwrap();
        roll.commit().unwrap();

        assert_eq!(h.fragment_tuples(), 0);
        assert!(h.read_bytes("s").is_empty());
        assert!(h.read_index("s").is_empty());
    }

    #[test]
    fn test_compact_multi_column_table() {
        let h = Harness::mixed_table(
            &[1, 2, 3, 4, 5],
            &[1.5, 2.5, 3.5, 4.5, 5.5],
            &["a", "b", "c", "d", "e"],
        );
        let roll = UpdateRoll::new();
        h.compact(&[0, 4], &roll).unwrap();
        roll.commit().unwrap();

        assert_eq!(h.fragment_tuples(), 3);
        assert_eq!(h.read_i32s("v"), vec![2, 3, 4]);
        assert_eq!(h.read_f32s("f"), vec![2.5, 3.5, 4.5]);
        assert_eq!(h.read_bytes("s"), b"bcd".to_vec());
        assert_eq!(h.read_index("s"), vec![0, 1, 2, 3]);

        // Fixed-width stats are rebuilt from the survivors; bounds only ever
        // widen, so the committed bounds still cover the original range.
        let meta = h.fragment_meta("v");
        assert_eq!(meta.num_elements, 3);
        assert!(meta.min.unwrap().as_i64().unwrap() <= 2);
        assert!(meta.max.unwrap().as_i64().unwrap() >= 4);
    }

    #[test]
    fn test_compact_stats_rescan_covers_each_row() {
        // Survivors with distinct values at head, middle, and tail verify
        // the rescan advances through every surviving row.
        let h = Harness::int_table(&[9, 100, -7, 55, 3]);
        let roll = UpdateRoll::new();
        h.compact(&[1], &roll).unwrap();
        roll.commit().unwrap();

        let meta = h.fragment_meta("v");
        // Survivors are [9, -7, 55, 3]; a rescan stuck on the first row
        // would report min == max == 9.
        assert_eq!(meta.min, Some(StatValue::Int(-7)));
        assert!(meta.max.unwrap().as_i64().unwrap() >= 55);
    }

    #[test]
    fn test_update_then_vacuum_round_trip() {
        let h = Harness::deletable_int_table(&[10, 20, 30, 40, 50], true);
        let roll = UpdateRoll::new();

        // Marking rows deleted through the delete column triggers the
        // unconditional vacuum hook.
        h.update(
            "deleted",
            &[1, 3],
            &[ScalarValue::Int64(1)],
            &SqlType::boolean(),
            &roll,
        )
        .unwrap();
        roll.commit().unwrap();

        assert_eq!(h.fragment_tuples(), 3);
        assert_eq!(h.read_i32s("v"), vec![10, 30, 50]);
        assert_eq!(h.read_bytes("deleted"), vec![0, 0, 0]);
    }

    #[test]
    fn test_compact_fixed_array_column() {
        let h = Harness::fixed_array_table(&[[1, 2], [30, 40], [5, 6]]);
        let roll = UpdateRoll::new();
        h.compact(&[1], &roll).unwrap();
        roll.commit().unwrap();

        assert_eq!(h.fragment_tuples(), 2);
        assert_eq!(h.read_i32s("arr"), vec![1, 2, 5, 6]);
        // Counts are staged even though array columns skip the stat publish.
        let meta = h.fragment_meta("arr");
        assert_eq!(meta.num_elements, 2);
        assert_eq!(meta.num_bytes, 16);
    }

    #[test]
    fn test_compact_by_name() {
        let h = Harness::int_table(&[7, 8, 9]);
        let roll = UpdateRoll::new();
        compact_rows(&h.catalog, "t", h.fragment_id, &[2], MemoryLevel::Cpu, &roll).unwrap();
        roll.commit().unwrap();
        assert_eq!(h.read_i32s("v"), vec![7, 8]);
    }

    #[test]
    fn test_cancel_discards_compaction() {
        let h = Harness::int_table_on_disk(&[1, 2, 3, 4]);
        let roll = UpdateRoll::new();
        h.compact(&[0], &roll).unwrap();
        roll.cancel().unwrap();

        // Metadata was never published and the mutated buffer was freed, so
        // a fresh pin sees the committed image.
        assert_eq!(h.fragment_tuples(), 4);
        assert_eq!(h.read_i32s("v"), vec![1, 2, 3, 4]);
    }
}
