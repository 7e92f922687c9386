//! Chunk encoders and chunk-level metadata
//!
//! An encoder is attached to each data buffer and maintains the chunk's
//! element count and min/max/has-null summary. The update and vacuum paths
//! feed it one numeric sample at a time through `update_stats_*`; readers
//! materialize a `ChunkMeta` snapshot via `get_metadata`.

use serde::{Deserialize, Serialize};

use crate::data::{SqlType, NULL_DOUBLE, NULL_FLOAT};

// ============================================================================
// Chunk Metadata
// ============================================================================

/// A min/max bound, kept in the widest numeric domain appropriate to the
/// column: signed 64-bit for integral/decimal/dictionary-id columns, IEEE
/// double for floating point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StatValue {
    Int(i64),
    Float(f64),
}

impl StatValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StatValue::Int(v) => Some(*v),
            StatValue::Float(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StatValue::Int(_) => None,
            StatValue::Float(v) => Some(*v),
        }
    }
}

/// Per-chunk summary published into the fragment's metadata map
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub num_elements: usize,
    pub num_bytes: usize,
    /// Lower bound over non-null values; `None` for variable-length columns
    pub min: Option<StatValue>,
    /// Upper bound over non-null values; `None` for variable-length columns
    pub max: Option<StatValue>,
    pub has_null: bool,
}

// ============================================================================
// Encoder Trait
// ============================================================================

/// Stat-maintaining component attached to a chunk's data buffer.
///
/// `update_stats_*` take one numeric sample per call and only ever widen the
/// bounds; a reduction is pushed as two calls, one per bound.
pub trait Encoder: Send {
    fn update_stats_i64(&mut self, value: i64, has_null: bool);
    fn update_stats_f64(&mut self, value: f64, has_null: bool);
    /// Fill `meta` with the element count and stat summary. The byte size is
    /// owned by the buffer and left untouched.
    fn get_metadata(&self, meta: &mut ChunkMeta);
    fn set_num_elems(&mut self, n: usize);
    fn num_elems(&self) -> usize;
    /// Downcast hook for the fixed-length-array refresh path
    fn as_fixed_array(&mut self) -> Option<&mut FixedArrayEncoder> {
        None
    }
}

/// Build the encoder matching a column type
pub fn make_encoder(ty: &SqlType) -> Box<dyn Encoder> {
    if ty.is_fixlen_array() {
        Box::new(FixedArrayEncoder::new(ty))
    } else if ty.is_varlen() {
        Box::new(NoneEncoder::default())
    } else {
        Box::new(ScalarEncoder::default())
    }
}

/// Build an encoder seeded with an existing metadata snapshot (used when a
/// chunk is materialized from its persisted image)
pub fn seeded_encoder(ty: &SqlType, meta: &ChunkMeta) -> Box<dyn Encoder> {
    if ty.is_fixlen_array() {
        let mut enc = FixedArrayEncoder::new(ty);
        enc.seed(meta);
        Box::new(enc)
    } else if ty.is_varlen() {
        let mut enc = NoneEncoder::default();
        enc.seed(meta);
        Box::new(enc)
    } else {
        let mut enc = ScalarEncoder::default();
        enc.seed(meta);
        Box::new(enc)
    }
}

// ============================================================================
// Scalar Encoder
// ============================================================================

/// Encoder for fixed-width scalar columns, including dictionary-encoded
/// strings (whose 32-bit ids are summarized in the integer domain)
#[derive(Debug)]
pub struct ScalarEncoder {
    num_elems: usize,
    min_i64: i64,
    max_i64: i64,
    min_f64: f64,
    max_f64: f64,
    has_null: bool,
}

impl Default for ScalarEncoder {
    fn default() -> Self {
        Self {
            num_elems: 0,
            min_i64: i64::MAX,
            max_i64: i64::MIN,
            min_f64: f64::INFINITY,
            max_f64: f64::NEG_INFINITY,
            has_null: false,
        }
    }
}

impl ScalarEncoder {
    fn seed(&mut self, meta: &ChunkMeta) {
        self.num_elems = meta.num_elements;
        self.has_null = meta.has_null;
        match (meta.min, meta.max) {
            (Some(StatValue::Int(lo)), Some(StatValue::Int(hi))) => {
                self.min_i64 = lo;
                self.max_i64 = hi;
            }
            (Some(StatValue::Float(lo)), Some(StatValue::Float(hi))) => {
                self.min_f64 = lo;
                self.max_f64 = hi;
            }
            _ => {}
        }
    }
}

impl Encoder for ScalarEncoder {
    fn update_stats_i64(&mut self, value: i64, has_null: bool) {
        self.min_i64 = self.min_i64.min(value);
        self.max_i64 = self.max_i64.max(value);
        self.has_null |= has_null;
    }

    fn update_stats_f64(&mut self, value: f64, has_null: bool) {
        self.min_f64 = self.min_f64.min(value);
        self.max_f64 = self.max_f64.max(value);
        self.has_null |= has_null;
    }

    fn get_metadata(&self, meta: &mut ChunkMeta) {
        meta.num_elements = self.num_elems;
        meta.has_null = self.has_null;
        if self.min_i64 <= self.max_i64 {
            meta.min = Some(StatValue::Int(self.min_i64));
            meta.max = Some(StatValue::Int(self.max_i64));
        } else if self.min_f64 <= self.max_f64 {
            meta.min = Some(StatValue::Float(self.min_f64));
            meta.max = Some(StatValue::Float(self.max_f64));
        } else {
            meta.min = None;
            meta.max = None;
        }
    }

    fn set_num_elems(&mut self, n: usize) {
        self.num_elems = n;
    }

    fn num_elems(&self) -> usize {
        self.num_elems
    }
}

// ============================================================================
// None Encoder (variable length)
// ============================================================================

/// Encoder for variable-length columns: tracks counts only, no numeric stats
#[derive(Debug, Default)]
pub struct NoneEncoder {
    num_elems: usize,
    has_null: bool,
}

impl NoneEncoder {
    fn seed(&mut self, meta: &ChunkMeta) {
        self.num_elems = meta.num_elements;
        self.has_null = meta.has_null;
    }
}

impl Encoder for NoneEncoder {
    fn update_stats_i64(&mut self, _value: i64, has_null: bool) {
        self.has_null |= has_null;
    }

    fn update_stats_f64(&mut self, _value: f64, has_null: bool) {
        self.has_null |= has_null;
    }

    fn get_metadata(&self, meta: &mut ChunkMeta) {
        meta.num_elements = self.num_elems;
        meta.has_null = self.has_null;
        meta.min = None;
        meta.max = None;
    }

    fn set_num_elems(&mut self, n: usize) {
        self.num_elems = n;
    }

    fn num_elems(&self) -> usize {
        self.num_elems
    }
}

// ============================================================================
// Fixed-Length Array Encoder
// ============================================================================

/// Encoder for fixed-length array columns. Stats are refreshed by replaying
/// `update_metadata` over each surviving row after a vacuum.
#[derive(Debug)]
pub struct FixedArrayEncoder {
    elem: SqlType,
    num_elems: usize,
    min_i64: i64,
    max_i64: i64,
    min_f64: f64,
    max_f64: f64,
    has_null: bool,
}

impl FixedArrayEncoder {
    pub fn new(ty: &SqlType) -> Self {
        let elem = ty.elem_type().cloned().unwrap_or_else(SqlType::big_int);
        Self {
            elem,
            num_elems: 0,
            min_i64: i64::MAX,
            max_i64: i64::MIN,
            min_f64: f64::INFINITY,
            max_f64: f64::NEG_INFINITY,
            has_null: false,
        }
    }

    fn seed(&mut self, meta: &ChunkMeta) {
        self.num_elems = meta.num_elements;
        self.has_null = meta.has_null;
        match (meta.min, meta.max) {
            (Some(StatValue::Int(lo)), Some(StatValue::Int(hi))) => {
                self.min_i64 = lo;
                self.max_i64 = hi;
            }
            (Some(StatValue::Float(lo)), Some(StatValue::Float(hi))) => {
                self.min_f64 = lo;
                self.max_f64 = hi;
            }
            _ => {}
        }
    }

    /// Fold one stored array row (raw bytes) into the summary
    pub fn update_metadata(&mut self, row: &[u8]) {
        let Some(width) = self.elem.size() else {
            return;
        };
        for slot in row.chunks_exact(width) {
            if self.elem.is_fp() {
                let v = match width {
                    4 => {
                        let raw = f32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]);
                        if raw == NULL_FLOAT {
                            self.has_null = true;
                            continue;
                        }
                        raw as f64
                    }
                    _ => {
                        let mut b = [0u8; 8];
                        b.copy_from_slice(slot);
                        let raw = f64::from_le_bytes(b);
                        if raw == NULL_DOUBLE {
                            self.has_null = true;
                            continue;
                        }
                        raw
                    }
                };
                self.min_f64 = self.min_f64.min(v);
                self.max_f64 = self.max_f64.max(v);
            } else {
                let v = match width {
                    1 => slot[0] as i8 as i64,
                    2 => i16::from_le_bytes([slot[0], slot[1]]) as i64,
                    4 => i32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]) as i64,
                    _ => {
                        let mut b = [0u8; 8];
                        b.copy_from_slice(slot);
                        i64::from_le_bytes(b)
                    }
                };
                if v == self.elem.null_int() {
                    self.has_null = true;
                    continue;
                }
                self.min_i64 = self.min_i64.min(v);
                self.max_i64 = self.max_i64.max(v);
            }
        }
    }
}

impl Encoder for FixedArrayEncoder {
    fn update_stats_i64(&mut self, value: i64, has_null: bool) {
        self.min_i64 = self.min_i64.min(value);
        self.max_i64 = self.max_i64.max(value);
        self.has_null |= has_null;
    }

    fn update_stats_f64(&mut self, value: f64, has_null: bool) {
        self.min_f64 = self.min_f64.min(value);
        self.max_f64 = self.max_f64.max(value);
        self.has_null |= has_null;
    }

    fn get_metadata(&self, meta: &mut ChunkMeta) {
        meta.num_elements = self.num_elems;
        meta.has_null = self.has_null;
        if self.elem.is_fp() {
            if self.min_f64 <= self.max_f64 {
                meta.min = Some(StatValue::Float(self.min_f64));
                meta.max = Some(StatValue::Float(self.max_f64));
            } else {
                meta.min = None;
                meta.max = None;
            }
        } else if self.min_i64 <= self.max_i64 {
            meta.min = Some(StatValue::Int(self.min_i64));
            meta.max = Some(StatValue::Int(self.max_i64));
        } else {
            meta.min = None;
            meta.max = None;
        }
    }

    fn set_num_elems(&mut self, n: usize) {
        self.num_elems = n;
    }

    fn num_elems(&self) -> usize {
        self.num_elems
    }

    fn as_fixed_array(&mut self) -> Option<&mut FixedArrayEncoder> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_encoder_widens_never_shrinks() {
        let mut enc = ScalarEncoder::default();
        enc.set_num_elems(3);
        enc.update_stats_i64(10, false);
        enc.update_stats_i64(50, false);
        enc.update_stats_i64(20, true);

        let mut meta = ChunkMeta::default();
        enc.get_metadata(&mut meta);
        assert_eq!(meta.min, Some(StatValue::Int(10)));
        assert_eq!(meta.max, Some(StatValue::Int(50)));
        assert!(meta.has_null);
    }

    #[test]
    fn test_scalar_encoder_int_domain() {
        let mut enc = ScalarEncoder::default();
        enc.set_num_elems(5);
        enc.update_stats_i64(7, false);
        enc.update_stats_i64(50, false);

        let mut meta = ChunkMeta::default();
        enc.get_metadata(&mut meta);
        assert_eq!(meta.num_elements, 5);
        assert_eq!(meta.min, Some(StatValue::Int(7)));
        assert_eq!(meta.max, Some(StatValue::Int(50)));
        assert!(!meta.has_null);
    }

    #[test]
    fn test_scalar_encoder_float_domain() {
        let mut enc = ScalarEncoder::default();
        enc.update_stats_f64(-1.5, false);
        enc.update_stats_f64(3.0, false);

        let mut meta = ChunkMeta::default();
        enc.get_metadata(&mut meta);
        assert_eq!(meta.min, Some(StatValue::Float(-1.5)));
        assert_eq!(meta.max, Some(StatValue::Float(3.0)));
    }

    #[test]
    fn test_none_encoder_reports_no_bounds() {
        let mut enc = NoneEncoder::default();
        enc.set_num_elems(4);
        let mut meta = ChunkMeta::default();
        enc.get_metadata(&mut meta);
        assert_eq!(meta.num_elements, 4);
        assert_eq!(meta.min, None);
        assert_eq!(meta.max, None);
    }

    #[test]
    fn test_fixed_array_replay() {
        let ty = SqlType::fixed_array(SqlType::int(), 3);
        let mut enc = FixedArrayEncoder::new(&ty);

        let mut row = Vec::new();
        for v in [5i32, -2, 9] {
            row.extend_from_slice(&v.to_le_bytes());
        }
        enc.update_metadata(&row);

        let mut row2 = Vec::new();
        for v in [i32::MIN, 100, 1] {
            row2.extend_from_slice(&v.to_le_bytes());
        }
        enc.update_metadata(&row2);

        let mut meta = ChunkMeta::default();
        enc.get_metadata(&mut meta);
        assert_eq!(meta.min, Some(StatValue::Int(-2)));
        assert_eq!(meta.max, Some(StatValue::Int(100)));
        assert!(meta.has_null); // i32::MIN element is the null sentinel
    }

    #[test]
    fn test_seeded_encoder_round_trip() {
        let meta = ChunkMeta {
            num_elements: 5,
            num_bytes: 40,
            min: Some(StatValue::Int(10)),
            max: Some(StatValue::Int(50)),
            has_null: false,
        };
        let enc = seeded_encoder(&SqlType::big_int(), &meta);
        let mut out = ChunkMeta::default();
        enc.get_metadata(&mut out);
        assert_eq!(out.num_elements, 5);
        assert_eq!(out.min, Some(StatValue::Int(10)));
        assert_eq!(out.max, Some(StatValue::Int(50)));
    }
}
