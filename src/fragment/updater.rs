//! Parallel column updater
//!
//! Applies RHS values at a set of row offsets inside one fragment. Offsets
//! are partitioned into contiguous segments, one task per worker thread;
//! each task coerces its rows straight into the chunk's data buffer and
//! folds a thread-local stat accumulator, merged after the join.

use std::sync::Arc;

use rayon::prelude::*;

use crate::catalog::{Catalog, ColumnDescriptor, DictDescriptor, MemoryLevel, TableDescriptor};
use crate::data::ScalarValue;
use crate::data::SqlType;
use crate::fragment::coerce::{coerce_rhs, CoerceCtx, DecimalOverflowValidator, StatUpdate};
use crate::fragment::registry::{FragmentInfo, Fragmenter};
use crate::fragment::roll::UpdateRoll;
use crate::fragment::stats::ChunkStats;
use crate::storage::{Chunk, ChunkKey, ChunkMeta};
use crate::{invariant, FragError, Result};

/// Name-resolving entry point: looks up the table and column, then delegates
/// to the table's fragmenter.
#[allow(clippy::too_many_arguments)]
pub fn update_column(
    catalog: &Arc<Catalog>,
    table_name: &str,
    column_name: &str,
    fragment_id: i32,
    frag_offsets: &[u64],
    rhs_values: &[ScalarValue],
    rhs_type: &SqlType,
    memory_level: MemoryLevel,
    roll: &UpdateRoll,
) -> Result<()> {
    let td = catalog.get_table(table_name)?;
    let cd = td.column(column_name)?;
    td.fragmenter.update_column(
        catalog,
        &td,
        &cd,
        fragment_id,
        frag_offsets,
        rhs_values,
        rhs_type,
        memory_level,
        roll,
    )
}

impl Fragmenter {
    /// Broadcast one RHS value to every offset
    #[allow(clippy::too_many_arguments)]
    pub fn update_column_value(
        &self,
        catalog: &Arc<Catalog>,
        td: &Arc<TableDescriptor>,
        cd: &Arc<ColumnDescriptor>,
        fragment_id: i32,
        frag_offsets: &[u64],
        rhs_value: ScalarValue,
        rhs_type: &SqlType,
        memory_level: MemoryLevel,
        roll: &UpdateRoll,
    ) -> Result<()> {
        self.update_column(
            catalog,
            td,
            cd,
            fragment_id,
            frag_offsets,
            &[rhs_value],
            rhs_type,
            memory_level,
            roll,
        )
    }

    /// Update one column of one fragment at the given row offsets.
    ///
    /// `rhs_values` holds either one value per offset or a single value
    /// broadcast to all of them. Offsets must be strictly increasing and
    /// within the fragment; the caller holds the fragment write permit.
    #[allow(clippy::too_many_arguments)]
    pub fn update_column(
        &self,
        catalog: &Arc<Catalog>,
        td: &Arc<TableDescriptor>,
        cd: &Arc<ColumnDescriptor>,
        fragment_id: i32,
        frag_offsets: &[u64],
        rhs_values: &[ScalarValue],
        rhs_type: &SqlType,
        memory_level: MemoryLevel,
        roll: &UpdateRoll,
    ) -> Result<()> {
        let nrow = frag_offsets.len();
        if nrow == 0 {
            return Ok(());
        }
        let n_rhs = rhs_values.len();
        if n_rhs != nrow && n_rhs != 1 {
            return Err(invariant(format!(
                "{n_rhs} values for {nrow} target offsets"
            )));
        }

        roll.record_context(catalog, catalog.logical_table_id(td.table_id)?, memory_level)?;

        let fragment = self.registry.get(fragment_id)?;
        validate_offsets(frag_offsets, fragment.physical_num_tuples())?;

        let lhs_type = &cd.column_type;
        let element_size = lhs_type.size().ok_or_else(|| {
            invariant(format!(
                "column {} is variable-length and cannot be updated in place",
                cd.name
            ))
        })?;

        let chunk_meta = fragment.chunk_meta(cd.column_id)?;
        let chunk_key = ChunkKey::new(
            catalog.current_db_id(),
            td.table_id,
            cd.column_id,
            fragment_id,
        );
        let chunk = catalog.data_mgr().get_chunk(
            cd,
            &chunk_key,
            MemoryLevel::Cpu,
            chunk_meta.num_bytes,
            chunk_meta.num_elements,
        )?;

        roll.ensure_dirty_chunk(&chunk);
        roll.add_dirty_key(chunk_key);

        let lhs_dict: Option<Arc<DictDescriptor>> = if lhs_type.is_string() {
            if !lhs_type.is_dict_encoded_string() {
                return Err(invariant(format!(
                    "string column {} is not dictionary encoded",
                    cd.name
                )));
            }
            Some(
                catalog
                    .get_dictionary(lhs_type.get_comp_param())
                    .ok_or_else(|| {
                        invariant(format!("no dictionary for string column {}", cd.name))
                    })?,
            )
        } else {
            None
        };
        let validator = DecimalOverflowValidator::new(lhs_type);
        let ctx = CoerceCtx {
            lhs_type,
            rhs_type,
            col_name: &cd.name,
            catalog: catalog.as_ref(),
            dict: lhs_dict.as_deref(),
            dict_lock: &self.dict_lock,
            validator: &validator,
        };

        let ncore = rayon::current_num_threads().max(1);
        let segsz = (nrow + ncore - 1) / ncore;
        let nseg = (nrow + segsz - 1) / segsz;

        log::debug!(
            "updating column {} fragment {fragment_id}: {nrow} rows over {nseg} segments",
            cd.name
        );

        let mut data = chunk.data.lock();
        data.mark_updated();

        let results: Vec<Result<ChunkStats>> = {
            let bytes = data.bytes_mut();
            if let Some(&last) = frag_offsets.last() {
                if (last as usize + 1) * element_size > bytes.len() {
                    return Err(invariant(format!(
                        "offset {last} past the end of the chunk buffer"
                    )));
                }
            }
            // Capture the buffer base as usize so it is Send across worker
            // threads.
            let base_addr = bytes.as_mut_ptr() as usize;

            (0..nseg)
                .into_par_iter()
                .map(|seg| {
                    let begin = seg * segsz;
                    let end = ((seg + 1) * segsz).min(nrow);
                    let mut stats = ChunkStats::new();
                    for r in begin..end {
                        let at = frag_offsets[r] as usize * element_size;
                        // SAFETY: the buffer guard is held for the duration
                        // of this parallel section, offsets are strictly
                        // increasing and bounds-checked above, and segments
                        // partition the offset list, so every task writes a
                        // disjoint set of slots.
                        let slot = unsafe {
                            std::slice::from_raw_parts_mut(
                                (base_addr + at) as *mut u8,
                                element_size,
                            )
                        };
                        let sv = &rhs_values[if n_rhs == 1 { 0 } else { r }];
                        match coerce_rhs(slot, sv, &ctx)? {
                            StatUpdate::Int(v) => stats.observe_i64(v),
                            StatUpdate::Float(v) => stats.observe_f64(v),
                            StatUpdate::Null => stats.observe_null(),
                        }
                    }
                    Ok(stats)
                })
                .collect()
        };
        drop(data);

        let mut folded = ChunkStats::new();
        let mut first_err: Option<FragError> = None;
        for r in results {
            match r {
                Ok(s) => folded.merge(&s),
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        if let Some(e) = first_err {
            return Err(FragError::UpdateFailed(e.to_string()));
        }

        // Vacuum-on-write hook: when the delete marker itself was updated,
        // compact the fragment right away instead of publishing stats for
        // rows that are about to disappear.
        if self.config.unconditional_vacuum && cd.is_delete_col {
            let deleted = self.get_vacuum_offsets(&chunk);
            if !deleted.is_empty() {
                return self.compact_rows(catalog, td, fragment_id, &deleted, memory_level, roll);
            }
        }

        self.update_column_metadata(cd, &fragment, &chunk, &folded, roll)
    }

    /// Row offsets whose delete marker is set, scanning the whole chunk
    pub fn get_vacuum_offsets(&self, chunk: &Chunk) -> Vec<u64> {
        let data = chunk.data.lock();
        let bytes = data.bytes();
        let mut deleted = Vec::new();
        for (r, b) in bytes.iter().enumerate() {
            if *b != 0 {
                deleted.push(r as u64);
            }
        }
        deleted
    }

    /// Fold the reduced stats into the chunk's encoder and stage the
    /// refreshed metadata entry in the journal.
    pub(crate) fn update_column_metadata(
        &self,
        cd: &ColumnDescriptor,
        fragment: &FragmentInfo,
        chunk: &Chunk,
        stats: &ChunkStats,
        roll: &UpdateRoll,
    ) -> Result<()> {
        let lhs = &cd.column_type;
        let mut data = chunk.data.lock();
        {
            let enc = data.encoder_mut()?;
            if lhs.is_integral() || lhs.is_decimal() {
                enc.update_stats_i64(stats.max_i64, stats.has_null);
                enc.update_stats_i64(stats.min_i64, stats.has_null);
            } else if lhs.is_fp() {
                enc.update_stats_f64(stats.max_f64, stats.has_null);
                enc.update_stats_f64(stats.min_f64, stats.has_null);
            } else if !lhs.is_array() && !(lhs.is_string() && !lhs.is_dict_encoded_string()) {
                enc.update_stats_i64(stats.max_i64, stats.has_null);
                enc.update_stats_i64(stats.min_i64, stats.has_null);
            }
        }
        let mut meta = ChunkMeta::default();
        data.encoder()?.get_metadata(&mut meta);
        meta.num_bytes = data.len();
        drop(data);

        roll.stage_meta(
            (cd.table_id, fragment.fragment_id),
            fragment.chunk_metadata(),
            fragment.shadow_num_tuples(),
            cd.column_id,
            meta,
        );
        Ok(())
    }
}

fn validate_offsets(frag_offsets: &[u64], num_tuples: usize) -> Result<()> {
    if !frag_offsets.windows(2).all(|w| w[0] < w[1]) {
        return Err(invariant("row offsets are not strictly increasing"));
    }
    if let Some(&last) = frag_offsets.last() {
        if last as usize >= num_tuples {
            return Err(invariant(format!(
                "row offset {last} outside fragment of {num_tuples} tuples"
            )));
        }
    }
    Ok(())
}
