//! Catalog: table, column, and dictionary descriptors
//!
//! The catalog resolves names to descriptors, owns the data manager handle,
//! and drives checkpointing. Fragments themselves are owned by each table's
//! fragmenter.

mod dictionary;

use std::path::PathBuf;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::data::SqlType;
use crate::fragment::{Fragmenter, FragmenterConfig};
use crate::storage::DataManager;
use crate::{FragError, Result};

pub use dictionary::{DictDescriptor, StringDictionary};

/// Memory tier a buffer lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryLevel {
    Disk,
    Cpu,
    Gpu,
}

/// Column definition within a table
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    pub table_id: i32,
    pub column_id: i32,
    pub name: String,
    pub column_type: SqlType,
    /// Virtual columns (e.g. rowid projections) carry no chunk
    pub is_virtual: bool,
    /// The table's logical-delete marker column
    pub is_delete_col: bool,
}

/// Table definition
pub struct TableDescriptor {
    pub table_id: i32,
    pub name: String,
    pub columns: Vec<Arc<ColumnDescriptor>>,
    /// Tier the table persists at; DISK tables checkpoint on commit
    pub persistence_level: MemoryLevel,
    pub fragmenter: Arc<Fragmenter>,
}

impl TableDescriptor {
    pub fn column(&self, name: &str) -> Result<Arc<ColumnDescriptor>> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .cloned()
            .ok_or_else(|| FragError::ColumnNotFound(name.to_string()))
    }

    pub fn column_by_id(&self, column_id: i32) -> Result<Arc<ColumnDescriptor>> {
        self.columns
            .iter()
            .find(|c| c.column_id == column_id)
            .cloned()
            .ok_or_else(|| FragError::ColumnNotFound(format!("id {column_id}")))
    }

    /// Physical (non-virtual) columns in column-id order
    pub fn physical_columns(&self) -> impl Iterator<Item = &Arc<ColumnDescriptor>> {
        self.columns.iter().filter(|c| !c.is_virtual)
    }

    pub fn delete_column(&self) -> Option<&Arc<ColumnDescriptor>> {
        self.columns.iter().find(|c| c.is_delete_col)
    }
}

/// Column request passed to `create_table`
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub ty: SqlType,
    pub is_delete_col: bool,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, ty: SqlType) -> Self {
        Self {
            name: name.into(),
            ty,
            is_delete_col: false,
        }
    }

    /// Mark this column as the table's logical-delete marker
    pub fn delete_marker(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: SqlType::boolean(),
            is_delete_col: true,
        }
    }
}

/// Checkpoint manifest written per table when a data directory is configured
#[derive(Debug, Serialize, Deserialize)]
struct TableManifest {
    table_id: i32,
    epoch: u64,
    checkpointed_at: i64,
}

#[derive(Default)]
struct CatalogInner {
    tables: AHashMap<i32, Arc<TableDescriptor>>,
    by_name: AHashMap<String, i32>,
    dicts: AHashMap<i32, Arc<DictDescriptor>>,
    epochs: AHashMap<i32, u64>,
    next_table_id: i32,
    next_dict_id: i32,
}

/// In-memory catalog for one database
pub struct Catalog {
    db_id: i32,
    data_dir: Option<PathBuf>,
    data_mgr: Arc<DataManager>,
    inner: RwLock<CatalogInner>,
}

impl Catalog {
    pub fn new(db_id: i32) -> Self {
        Self {
            db_id,
            data_dir: None,
            data_mgr: Arc::new(DataManager::new()),
            inner: RwLock::new(CatalogInner {
                next_table_id: 1,
                next_dict_id: 1,
                ..CatalogInner::default()
            }),
        }
    }

    /// Catalog that writes checkpoint manifests under `data_dir`
    pub fn with_data_dir(db_id: i32, data_dir: impl Into<PathBuf>) -> Self {
        let mut c = Self::new(db_id);
        c.data_dir = Some(data_dir.into());
        c
    }

    pub fn current_db_id(&self) -> i32 {
        self.db_id
    }

    pub fn data_mgr(&self) -> &Arc<DataManager> {
        &self.data_mgr
    }

    /// Create a table. Dictionary-encoded string columns with no dictionary
    /// id get a fresh dictionary registered for them.
    pub fn create_table(
        &self,
        name: &str,
        columns: Vec<ColumnSpec>,
        persistence_level: MemoryLevel,
        config: FragmenterConfig,
    ) -> Result<Arc<TableDescriptor>> {
        let mut inner = self.inner.write();
        if inner.by_name.contains_key(name) {
            return Err(FragError::InvalidValue(format!(
                "table {name} already exists"
            )));
        }
        let table_id = inner.next_table_id;
        inner.next_table_id += 1;

        let mut descs = Vec::with_capacity(columns.len());
        for (i, spec) in columns.into_iter().enumerate() {
            let mut ty = spec.ty;
            if ty.is_dict_encoded_string() && ty.get_comp_param() == 0 {
                let dict_id = inner.next_dict_id;
                inner.next_dict_id += 1;
                inner.dicts.insert(
                    dict_id,
                    Arc::new(DictDescriptor {
                        dict_id,
                        dict: StringDictionary::new(),
                    }),
                );
                ty = ty.with_dict_id(dict_id);
            }
            descs.push(Arc::new(ColumnDescriptor {
                table_id,
                column_id: (i + 1) as i32,
                name: spec.name,
                column_type: ty,
                is_virtual: false,
                is_delete_col: spec.is_delete_col,
            }));
        }

        let td = Arc::new(TableDescriptor {
            table_id,
            name: name.to_string(),
            columns: descs,
            persistence_level,
            fragmenter: Arc::new(Fragmenter::new(table_id, config)),
        });
        inner.tables.insert(table_id, Arc::clone(&td));
        inner.by_name.insert(name.to_string(), table_id);
        inner.epochs.insert(table_id, 0);
        Ok(td)
    }

    pub fn get_table(&self, name: &str) -> Result<Arc<TableDescriptor>> {
        let inner = self.inner.read();
        let id = inner
            .by_name
            .get(name)
            .ok_or_else(|| FragError::TableNotFound(name.to_string()))?;
        inner
            .tables
            .get(id)
            .cloned()
            .ok_or_else(|| FragError::TableNotFound(name.to_string()))
    }

    pub fn table_by_id(&self, table_id: i32) -> Result<Arc<TableDescriptor>> {
        self.inner
            .read()
            .tables
            .get(&table_id)
            .cloned()
            .ok_or_else(|| FragError::TableNotFound(format!("id {table_id}")))
    }

    pub fn get_column(&self, table_id: i32, name: &str) -> Result<Arc<ColumnDescriptor>> {
        self.table_by_id(table_id)?.column(name)
    }

    /// Logical table id for a physical table. With no sharding the mapping is
    /// the identity, verified against the catalog.
    pub fn logical_table_id(&self, table_id: i32) -> Result<i32> {
        self.table_by_id(table_id).map(|td| td.table_id)
    }

    pub fn get_dictionary(&self, dict_id: i32) -> Option<Arc<DictDescriptor>> {
        self.inner.read().dicts.get(&dict_id).cloned()
    }

    pub fn table_epoch(&self, table_id: i32) -> u64 {
        self.inner
            .read()
            .epochs
            .get(&table_id)
            .copied()
            .unwrap_or(0)
    }

    /// Flush the table's updated buffers and advance its epoch. Writes a
    /// manifest when a data directory is configured.
    pub fn checkpoint(&self, logical_table_id: i32) -> Result<()> {
        let td = self.table_by_id(logical_table_id)?;
        self.data_mgr.checkpoint_table(self.db_id, td.table_id)?;

        let epoch = {
            let mut inner = self.inner.write();
            let e = inner.epochs.entry(td.table_id).or_insert(0);
            *e += 1;
            *e
        };

        if let Some(dir) = &self.data_dir {
            let manifest = TableManifest {
                table_id: td.table_id,
                epoch,
                checkpointed_at: chrono::Utc::now().timestamp(),
            };
            let bytes = bincode::serialize(&manifest)
                .map_err(|e| FragError::SerializationError(e.to_string()))?;
            std::fs::create_dir_all(dir)?;
            std::fs::write(dir.join(format!("{}.manifest", td.name)), bytes)?;
        }
        log::info!("checkpointed table {} at epoch {}", td.name, epoch);
        Ok(())
    }
}
