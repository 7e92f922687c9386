//! Shared table/fragment fixtures for the fragment tests

use std::sync::Arc;

use crate::catalog::{Catalog, ColumnSpec, MemoryLevel, TableDescriptor};
use crate::data::{ScalarValue, SqlType};
use crate::fragment::ingest::RawColumn;
use crate::fragment::registry::FragmenterConfig;
use crate::fragment::roll::UpdateRoll;
use crate::storage::{ChunkKey, ChunkMeta};
use crate::Result;

pub(crate) struct Harness {
    pub catalog: Arc<Catalog>,
    pub td: Arc<TableDescriptor>,
    pub fragment_id: i32,
}

impl Harness {
    fn build(
        specs: Vec<ColumnSpec>,
        rows: Vec<Vec<ScalarValue>>,
        persistence: MemoryLevel,
        config: FragmenterConfig,
    ) -> Self {
        let catalog = Arc::new(Catalog::new(1));
        let td = catalog.create_table("t", specs, persistence, config).unwrap();
        let fragment_id = td.fragmenter.insert_rows(&catalog, &td, &rows).unwrap();
        Self {
            catalog,
            td,
            fragment_id,
        }
    }

    pub fn int_table(values: &[i32]) -> Self {
        let rows = values
            .iter()
            .map(|v| vec![ScalarValue::Int64(*v as i64)])
            .collect();
        Self::build(
            vec![ColumnSpec::new("v", SqlType::int())],
            rows,
            MemoryLevel::Cpu,
            FragmenterConfig::default(),
        )
    }

    pub fn int_table_on_disk(values: &[i32]) -> Self {
        let rows = values
            .iter()
            .map(|v| vec![ScalarValue::Int64(*v as i64)])
            .collect();
        Self::build(
            vec![ColumnSpec::new("v", SqlType::int())],
            rows,
            MemoryLevel::Disk,
            FragmenterConfig::default(),
        )
    }

    pub fn float_table(values: &[f32]) -> Self {
        let rows = values
            .iter()
            .map(|v| vec![ScalarValue::Float(*v)])
            .collect();
        Self::build(
            vec![ColumnSpec::new("v", SqlType::float())],
            rows,
            MemoryLevel::Cpu,
            FragmenterConfig::default(),
        )
    }

    pub fn decimal_table(dimension: i32, scale: i32, values: &[f64]) -> Self {
        let rows = values
            .iter()
            .map(|v| vec![ScalarValue::Double(*v)])
            .collect();
        Self::build(
            vec![ColumnSpec::new("v", SqlType::decimal(dimension, scale))],
            rows,
            MemoryLevel::Cpu,
            FragmenterConfig::default(),
        )
    }

    pub fn dict_table(values: &[&str]) -> Self {
        let rows = values
            .iter()
            .map(|s| vec![ScalarValue::string(*s)])
            .collect();
        Self::build(
            vec![ColumnSpec::new("tag", SqlType::text_dict(0))],
            rows,
            MemoryLevel::Cpu,
            FragmenterConfig::default(),
        )
    }

    pub fn varlen_table(values: &[&str]) -> Self {
        let rows = values
            .iter()
            .map(|s| vec![ScalarValue::string(*s)])
            .collect();
        Self::build(
            vec![ColumnSpec::new("s", SqlType::text_none())],
            rows,
            MemoryLevel::Cpu,
            FragmenterConfig::default(),
        )
    }

    pub fn mixed_table(ints: &[i32], floats: &[f32], strings: &[&str]) -> Self {
        let rows = ints
            .iter()
            .zip(floats)
            .zip(strings)
            .map(|((i, f), s)| {
                vec![
                    ScalarValue::Int64(*i as i64),
                    ScalarValue::Float(*f),
                    ScalarValue::string(*s),
                ]
            })
            .collect();
        Self::build(
            vec![
                ColumnSpec::new("v", SqlType::int()),
                ColumnSpec::new("f", SqlType::float()),
                ColumnSpec::new("s", SqlType::text_none()),
            ],
            rows,
            MemoryLevel::Cpu,
            FragmenterConfig::default(),
        )
    }

    pub fn deletable_int_table(values: &[i32], unconditional_vacuum: bool) -> Self {
        let rows = values
            .iter()
            .map(|v| vec![ScalarValue::Int64(*v as i64), ScalarValue::Int64(0)])
            .collect();
        Self::build(
            vec![
                ColumnSpec::new("v", SqlType::int()),
                ColumnSpec::delete_marker("deleted"),
            ],
            rows,
            MemoryLevel::Cpu,
            FragmenterConfig {
                unconditional_vacuum,
            },
        )
    }

    pub fn fixed_array_table(rows: &[[i32; 2]]) -> Self {
        let catalog = Arc::new(Catalog::new(1));
        let td = catalog
            .create_table(
                "t",
                vec![ColumnSpec::new(
                    "arr",
                    SqlType::fixed_array(SqlType::int(), 2),
                )],
                MemoryLevel::Cpu,
                FragmenterConfig::default(),
            )
            .unwrap();

        let mut data = Vec::new();
        for row in rows {
            for v in row {
                data.extend_from_slice(&v.to_le_bytes());
            }
        }
        let raw = vec![RawColumn {
            column_id: 1,
            data,
            index: None,
            meta: ChunkMeta::default(),
        }];
        let fragment_id = td
            .fragmenter
            .register_fragment(&catalog, &td, raw, rows.len())
            .unwrap();
        Self {
            catalog,
            td,
            fragment_id,
        }
    }

    pub fn update(
        &self,
        col: &str,
        offsets: &[u64],
        values: &[ScalarValue],
        rhs_type: &SqlType,
        roll: &UpdateRoll,
    ) -> Result<()> {
        let cd = self.td.column(col)?;
        self.td.fragmenter.update_column(
            &self.catalog,
            &self.td,
            &cd,
            self.fragment_id,
            offsets,
            values,
            rhs_type,
            MemoryLevel::Cpu,
            roll,
        )
    }

    pub fn update_i64(
        &self,
        col: &str,
        offsets: &[u64],
        values: &[i64],
        roll: &UpdateRoll,
    ) -> Result<()> {
        let svs: Vec<ScalarValue> = values.iter().map(|v| ScalarValue::Int64(*v)).collect();
        self.update(col, offsets, &svs, &SqlType::big_int(), roll)
    }

    pub fn compact(&self, offsets: &[u64], roll: &UpdateRoll) -> Result<()> {
        self.td.fragmenter.compact_rows(
            &self.catalog,
            &self.td,
            self.fragment_id,
            offsets,
            MemoryLevel::Cpu,
            roll,
        )
    }

    /// Current bytes of the column's data buffer, as a fresh pin would see
    /// them
    pub fn read_bytes(&self, col: &str) -> Vec<u8> {
        let cd = self.td.column(col).unwrap();
        let frag = self.td.fragmenter.registry().get(self.fragment_id).unwrap();
        let meta = frag.chunk_meta(cd.column_id).unwrap().clone();
        let key = ChunkKey::new(
            self.catalog.current_db_id(),
            self.td.table_id,
            cd.column_id,
            self.fragment_id,
        );
        let chunk = self
            .catalog
            .data_mgr()
            .get_chunk(&cd, &key, MemoryLevel::Cpu, meta.num_bytes, meta.num_elements)
            .unwrap();
        let bytes = chunk.data.lock().bytes().to_vec();
        bytes
    }

    pub fn read_index(&self, col: &str) -> Vec<u32> {
        let cd = self.td.column(col).unwrap();
        let frag = self.td.fragmenter.registry().get(self.fragment_id).unwrap();
        let meta = frag.chunk_meta(cd.column_id).unwrap().clone();
        let key = ChunkKey::new(
            self.catalog.current_db_id(),
            self.td.table_id,
            cd.column_id,
            self.fragment_id,
        );
        let chunk = self
            .catalog
            .data_mgr()
            .get_chunk(&cd, &key, MemoryLevel::Cpu, meta.num_bytes, meta.num_elements)
            .unwrap();
        let index = chunk.index.as_ref().unwrap();
        let guard = index.lock();
        guard
            .bytes()
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }

    pub fn read_i32s(&self, col: &str) -> Vec<i32> {
        self.read_bytes(col)
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }

    pub fn read_i64s(&self, col: &str) -> Vec<i64> {
        self.read_bytes(col)
            .chunks_exact(8)
            .map(|c| i64::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }

    pub fn read_f32s(&self, col: &str) -> Vec<f32> {
        self.read_bytes(col)
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }

    /// Committed chunk metadata for the column
    pub fn fragment_meta(&self, col: &str) -> ChunkMeta {
        let cd = self.td.column(col).unwrap();
        let frag = self.td.fragmenter.registry().get(self.fragment_id).unwrap();
        frag.chunk_meta(cd.column_id).unwrap().clone()
    }

    pub fn fragment_tuples(&self) -> usize {
        self.td
            .fragmenter
            .registry()
            .get(self.fragment_id)
            .unwrap()
            .physical_num_tuples()
    }

    pub fn dict_len(&self, col: &str) -> usize {
        let cd = self.td.column(col).unwrap();
        self.catalog
            .get_dictionary(cd.column_type.get_comp_param())
            .unwrap()
            .dict
            .len()
    }
}
