//! Fragment core: update, vacuum, compaction, and journaling
//!
//! A fragment is a contiguous row range of a table holding one chunk per
//! physical column. This module owns the fragment registry, the parallel
//! column updater, the fixed- and variable-length vacuumers, the per-fragment
//! compactor, and the update journal that stages dirty state until commit.

mod coerce;
mod compact;
mod ingest;
mod registry;
mod roll;
mod stats;
mod updater;
mod vacuum;

pub use coerce::{
    coerce_rhs, get_scalar_f64, get_scalar_i64, put_null, put_scalar_f64, put_scalar_i64,
    CoerceCtx, DecimalOverflowValidator, StatUpdate,
};
pub use compact::compact_rows;
pub use ingest::RawColumn;
pub use registry::{FragmentInfo, FragmentRegistry, Fragmenter, FragmenterConfig};
pub use roll::UpdateRoll;
pub use stats::ChunkStats;
pub use updater::update_column;
pub use vacuum::{vacuum_fixed_rows, vacuum_varlen_rows};

#[cfg(test)]
pub(crate) mod testkit;
