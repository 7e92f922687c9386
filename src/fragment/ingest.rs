//! Fragment ingest
//!
//! Builds a fragment from rows of scalar values, encoding each column
//! through the same coercion and stat-fold machinery the updater uses, then
//! registers the fragment descriptor and the persisted chunk images. A raw
//! registration path covers encodings the row builder does not speak
//! (fixed-length arrays).

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::catalog::{Catalog, ColumnDescriptor, DictDescriptor, TableDescriptor};
use crate::data::{ScalarValue, SqlType};
use crate::fragment::coerce::{coerce_rhs, CoerceCtx, DecimalOverflowValidator, StatUpdate};
use crate::fragment::registry::{FragmentInfo, Fragmenter};
use crate::fragment::stats::ChunkStats;
use crate::storage::{
    write_index_entry, ChunkImage, ChunkKey, ChunkMeta, StatValue, INDEX_ENTRY_SIZE,
};
use crate::{FragError, Result};

/// Pre-encoded column payload for `register_fragment`
pub struct RawColumn {
    pub column_id: i32,
    pub data: Vec<u8>,
    pub index: Option<Vec<u8>>,
    pub meta: ChunkMeta,
}

enum ColumnWriter {
    Fixed {
        element_size: usize,
        bytes: Vec<u8>,
        stats: ChunkStats,
        dict: Option<Arc<DictDescriptor>>,
    },
    Varlen {
        data: Vec<u8>,
        index: Vec<u8>,
        has_null: bool,
    },
}

fn implied_rhs_type(sv: &ScalarValue) -> SqlType {
    match sv {
        ScalarValue::Int64(_) => SqlType::big_int(),
        ScalarValue::Double(_) => SqlType::double(),
        ScalarValue::Float(_) => SqlType::float(),
        ScalarValue::NullableString(_) => SqlType::text_none(),
    }
}

impl Fragmenter {
    /// Build a new fragment from rows of values, one value per physical
    /// column. Fixed-length array columns are not expressible as scalar rows;
    /// use `register_fragment` for those.
    pub fn insert_rows(
        &self,
        catalog: &Arc<Catalog>,
        td: &Arc<TableDescriptor>,
        rows: &[Vec<ScalarValue>],
    ) -> Result<i32> {
        let columns: Vec<&Arc<ColumnDescriptor>> = td.physical_columns().collect();
        let mut writers = Vec::with_capacity(columns.len());
        for cd in &columns {
            writers.push(ColumnWriter::for_column(catalog, cd)?);
        }

        for row in rows {
            if row.len() != columns.len() {
                return Err(FragError::InvalidValue(format!(
                    "row has {} values for {} columns",
                    row.len(),
                    columns.len()
                )));
            }
            for ((cd, writer), sv) in columns.iter().zip(writers.iter_mut()).zip(row.iter()) {
                writer.push(catalog, cd, sv, &self.dict_lock)?;
            }
        }

        let raw: Vec<RawColumn> = columns
            .iter()
            .zip(writers)
            .map(|(cd, w)| w.finish(cd, rows.len()))
            .collect();
        self.register_fragment(catalog, td, raw, rows.len())
    }

    /// Register a fragment from pre-encoded column payloads: installs the
    /// persisted chunk images and the fragment descriptor.
    pub fn register_fragment(
        &self,
        catalog: &Arc<Catalog>,
        td: &Arc<TableDescriptor>,
        columns: Vec<RawColumn>,
        num_rows: usize,
    ) -> Result<i32> {
        let fragment_id = self.alloc_fragment_id();
        let mut metadata = BTreeMap::new();
        for mut col in columns {
            col.meta.num_elements = num_rows;
            col.meta.num_bytes = col.data.len();
            let key = ChunkKey::new(
                catalog.current_db_id(),
                td.table_id,
                col.column_id,
                fragment_id,
            );
            metadata.insert(col.column_id, col.meta.clone());
            catalog.data_mgr().register_image(
                key,
                ChunkImage {
                    data: col.data,
                    index: col.index,
                    meta: col.meta,
                },
            );
        }
        self.registry
            .add_fragment(FragmentInfo::new(fragment_id, num_rows, metadata));
        log::debug!(
            "registered fragment {fragment_id} of table {}: {num_rows} rows",
            td.table_id
        );
        Ok(fragment_id)
    }
}

impl ColumnWriter {
    fn for_column(catalog: &Arc<Catalog>, cd: &Arc<ColumnDescriptor>) -> Result<Self> {
        let ty = &cd.column_type;
        if ty.is_fixlen_array() {
            return Err(FragError::InvalidValue(format!(
                "column {} is a fixed-length array; register it pre-encoded",
                cd.name
            )));
        }
        if ty.is_varlen() {
            let mut index = vec![0u8; INDEX_ENTRY_SIZE];
            write_index_entry(&mut index, 0, 0);
            return Ok(ColumnWriter::Varlen {
                data: Vec::new(),
                index,
                has_null: false,
            });
        }
        let dict = if ty.is_dict_encoded_string() {
            Some(
                catalog
                    .get_dictionary(ty.get_comp_param())
                    .ok_or(FragError::DictionaryMissing(ty.get_comp_param()))?,
            )
        } else {
            None
        };
        let element_size = ty
            .size()
            .ok_or_else(|| FragError::InvalidValue(format!("column {} has no size", cd.name)))?;
        Ok(ColumnWriter::Fixed {
            element_size,
            bytes: Vec::new(),
            stats: ChunkStats::new(),
            dict,
        })
    }

    fn push(
        &mut self,
        catalog: &Arc<Catalog>,
        cd: &Arc<ColumnDescriptor>,
        sv: &ScalarValue,
        dict_lock: &parking_lot::Mutex<()>,
    ) -> Result<()> {
        match self {
            ColumnWriter::Fixed {
                element_size,
                bytes,
                stats,
                dict,
            } => {
                let rhs_type = implied_rhs_type(sv);
                let validator = DecimalOverflowValidator::new(&cd.column_type);
                let ctx = CoerceCtx {
                    lhs_type: &cd.column_type,
                    rhs_type: &rhs_type,
                    col_name: &cd.name,
                    catalog: catalog.as_ref(),
                    dict: dict.as_deref(),
                    dict_lock,
                    validator: &validator,
                };
                let start = bytes.len();
                bytes.resize(start + *element_size, 0);
                match coerce_rhs(&mut bytes[start..], sv, &ctx)? {
                    StatUpdate::Int(v) => stats.observe_i64(v),
                    StatUpdate::Float(v) => stats.observe_f64(v),
                    StatUpdate::Null => stats.observe_null(),
                }
                Ok(())
            }
            ColumnWriter::Varlen {
                data,
                index,
                has_null,
            } => {
                match sv {
                    ScalarValue::NullableString(Some(s)) => data.extend_from_slice(s.as_bytes()),
                    ScalarValue::NullableString(None) => *has_null = true,
                    _ => {
                        return Err(FragError::InvalidValue(format!(
                            "column {} takes string payloads",
                            cd.name
                        )))
                    }
                }
                let entry = index.len() / INDEX_ENTRY_SIZE;
                index.resize(index.len() + INDEX_ENTRY_SIZE, 0);
                write_index_entry(index, entry, data.len() as u32);
                Ok(())
            }
        }
    }

    fn finish(self, cd: &Arc<ColumnDescriptor>, num_rows: usize) -> RawColumn {
        match self {
            ColumnWriter::Fixed {
                bytes, stats, ..
            } => {
                let ty = &cd.column_type;
                let (min, max) = if ty.is_fp() && stats.has_f64_values() {
                    (
                        Some(StatValue::Float(stats.min_f64)),
                        Some(StatValue::Float(stats.max_f64)),
                    )
                } else if stats.has_i64_values() {
                    (
                        Some(StatValue::Int(stats.min_i64)),
                        Some(StatValue::Int(stats.max_i64)),
                    )
                } else {
                    (None, None)
                };
                RawColumn {
                    column_id: cd.column_id,
                    data: bytes,
                    index: None,
                    meta: ChunkMeta {
                        num_elements: num_rows,
                        num_bytes: 0,
                        min,
                        max,
                        has_null: stats.has_null,
                    },
                }
            }
            ColumnWriter::Varlen {
                data,
                index,
                has_null,
            } => RawColumn {
                column_id: cd.column_id,
                data,
                index: Some(index),
                meta: ChunkMeta {
                    num_elements: num_rows,
                    num_bytes: 0,
                    min: None,
                    max: None,
                    has_null,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnSpec, MemoryLevel};
    use crate::fragment::FragmenterConfig;

    #[test]
    fn test_insert_rows_builds_fragment() {
        let catalog = Arc::new(Catalog::new(1));
        let td = catalog
            .create_table(
                "t",
                vec![
                    ColumnSpec::new("v", SqlType::int()),
                    ColumnSpec::new("s", SqlType::text_none()),
                ],
                MemoryLevel::Cpu,
                FragmenterConfig::default(),
            )
            .unwrap();

        let rows = vec![
            vec![ScalarValue::Int64(5), ScalarValue::string("aa")],
            vec![ScalarValue::Int64(-2), ScalarValue::string("b")],
        ];
        let fid = td.fragmenter.insert_rows(&catalog, &td, &rows).unwrap();

        let frag = td.fragmenter.registry().get(fid).unwrap();
        assert_eq!(frag.physical_num_tuples(), 2);
        let meta = frag.chunk_meta(1).unwrap();
        assert_eq!(meta.num_bytes, 8);
        assert_eq!(meta.min, Some(StatValue::Int(-2)));
        assert_eq!(meta.max, Some(StatValue::Int(5)));
        let smeta = frag.chunk_meta(2).unwrap();
        assert_eq!(smeta.num_bytes, 3);
        assert_eq!(smeta.min, None);
    }

    #[test]
    fn test_insert_rejects_ragged_rows() {
        let catalog = Arc::new(Catalog::new(1));
        let td = catalog
            .create_table(
                "t",
                vec![ColumnSpec::new("v", SqlType::int())],
                MemoryLevel::Cpu,
                FragmenterConfig::default(),
            )
            .unwrap();
        let rows = vec![vec![ScalarValue::Int64(1), ScalarValue::Int64(2)]];
        assert!(td.fragmenter.insert_rows(&catalog, &td, &rows).is_err());
    }
}
