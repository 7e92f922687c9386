//! SQL column type descriptors
//!
//! A `SqlType` describes the logical kind of a column plus the physical
//! encoding details the storage layer needs: dimension/scale for decimals,
//! dictionary id for encoded strings, day-granularity compression for dates.

use serde::{Deserialize, Serialize};

/// Seconds per calendar day; date-in-days statistics are kept in seconds.
pub const SECS_PER_DAY: i64 = 86_400;

/// Inline null sentinel for FLOAT columns
pub const NULL_FLOAT: f32 = f32::MIN;
/// Inline null sentinel for DOUBLE columns
pub const NULL_DOUBLE: f64 = f64::MIN;

/// Logical type kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Decimal,
    Time,
    Timestamp,
    Date,
    Interval,
    Text,
    FixedArray,
    Array,
}

/// Physical encoding applied on top of the logical kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    /// Values stored at their natural width
    None,
    /// Strings stored as 32-bit ids into an external dictionary
    Dict,
    /// Dates stored as day counts instead of epoch seconds
    DateInDays,
}

/// Column type descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlType {
    kind: TypeKind,
    /// Decimal precision (total digits); 0 elsewhere
    dimension: i32,
    /// Decimal scale (fractional digits); 0 elsewhere
    scale: i32,
    notnull: bool,
    compression: Compression,
    /// Dictionary id for `Compression::Dict`; fixed-width override bits for
    /// `Compression::DateInDays` (16 selects a 2-byte day count)
    comp_param: i32,
    /// Element type for array kinds
    elem: Option<Box<SqlType>>,
    /// Element count for `FixedArray`
    array_len: usize,
}

impl SqlType {
    fn plain(kind: TypeKind) -> Self {
        Self {
            kind,
            dimension: 0,
            scale: 0,
            notnull: false,
            compression: Compression::None,
            comp_param: 0,
            elem: None,
            array_len: 0,
        }
    }

    pub fn boolean() -> Self {
        Self::plain(TypeKind::Boolean)
    }

    pub fn tiny_int() -> Self {
        Self::plain(TypeKind::TinyInt)
    }

    pub fn small_int() -> Self {
        Self::plain(TypeKind::SmallInt)
    }

    pub fn int() -> Self {
        Self::plain(TypeKind::Int)
    }

    pub fn big_int() -> Self {
        Self::plain(TypeKind::BigInt)
    }

    pub fn float() -> Self {
        Self::plain(TypeKind::Float)
    }

    pub fn double() -> Self {
        Self::plain(TypeKind::Double)
    }

    pub fn decimal(dimension: i32, scale: i32) -> Self {
        let mut t = Self::plain(TypeKind::Decimal);
        t.dimension = dimension;
        t.scale = scale;
        t
    }

    pub fn time() -> Self {
        Self::plain(TypeKind::Time)
    }

    pub fn timestamp() -> Self {
        Self::plain(TypeKind::Timestamp)
    }

    /// Date stored as 64-bit epoch seconds
    pub fn date() -> Self {
        Self::plain(TypeKind::Date)
    }

    /// Date stored as a 32-bit day count
    pub fn date_in_days() -> Self {
        let mut t = Self::plain(TypeKind::Date);
        t.compression = Compression::DateInDays;
        t
    }

    pub fn interval() -> Self {
        Self::plain(TypeKind::Interval)
    }

    /// Dictionary-encoded string column
    pub fn text_dict(dict_id: i32) -> Self {
        let mut t = Self::plain(TypeKind::Text);
        t.compression = Compression::Dict;
        t.comp_param = dict_id;
        t
    }

    /// None-encoded (variable-length) string column
    pub fn text_none() -> Self {
        Self::plain(TypeKind::Text)
    }

    pub fn fixed_array(elem: SqlType, len: usize) -> Self {
        let mut t = Self::plain(TypeKind::FixedArray);
        t.elem = Some(Box::new(elem));
        t.array_len = len;
        t
    }

    pub fn var_array(elem: SqlType) -> Self {
        let mut t = Self::plain(TypeKind::Array);
        t.elem = Some(Box::new(elem));
        t
    }

    pub fn notnull(mut self) -> Self {
        self.notnull = true;
        self
    }

    pub fn with_dict_id(mut self, dict_id: i32) -> Self {
        self.comp_param = dict_id;
        self
    }

    // ------------------------------------------------------------------
    // Predicates
    // ------------------------------------------------------------------

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::TinyInt | TypeKind::SmallInt | TypeKind::Int | TypeKind::BigInt
        )
    }

    pub fn is_boolean(&self) -> bool {
        self.kind == TypeKind::Boolean
    }

    pub fn is_time(&self) -> bool {
        matches!(self.kind, TypeKind::Time | TypeKind::Timestamp | TypeKind::Date)
    }

    pub fn is_time_interval(&self) -> bool {
        self.kind == TypeKind::Interval
    }

    pub fn is_fp(&self) -> bool {
        matches!(self.kind, TypeKind::Float | TypeKind::Double)
    }

    pub fn is_decimal(&self) -> bool {
        self.kind == TypeKind::Decimal
    }

    pub fn is_string(&self) -> bool {
        self.kind == TypeKind::Text
    }

    pub fn is_dict_encoded_string(&self) -> bool {
        self.kind == TypeKind::Text && self.compression == Compression::Dict
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, TypeKind::FixedArray | TypeKind::Array)
    }

    pub fn is_fixlen_array(&self) -> bool {
        self.kind == TypeKind::FixedArray
    }

    /// Whether the column stores variable-length payloads (separate data and
    /// offset-index buffers)
    pub fn is_varlen(&self) -> bool {
        match self.kind {
            TypeKind::Text => self.compression != Compression::Dict,
            TypeKind::Array => true,
            _ => false,
        }
    }

    /// Integral family: narrowed through signed 64-bit on update
    pub fn is_integral(&self) -> bool {
        self.is_integer() || self.is_boolean() || self.is_time() || self.is_time_interval()
    }

    pub fn is_date_in_days(&self) -> bool {
        self.kind == TypeKind::Date && self.compression == Compression::DateInDays
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn get_dimension(&self) -> i32 {
        self.dimension
    }

    pub fn get_scale(&self) -> i32 {
        self.scale
    }

    pub fn get_notnull(&self) -> bool {
        self.notnull
    }

    pub fn get_compression(&self) -> Compression {
        self.compression
    }

    pub fn get_comp_param(&self) -> i32 {
        self.comp_param
    }

    pub fn elem_type(&self) -> Option<&SqlType> {
        self.elem.as_deref()
    }

    pub fn array_len(&self) -> usize {
        self.array_len
    }

    /// Physical size in bytes of one stored element; `None` for
    /// variable-length encodings. Fixed-length arrays report the full array
    /// footprint.
    pub fn size(&self) -> Option<usize> {
        match self.kind {
            TypeKind::Boolean | TypeKind::TinyInt => Some(1),
            TypeKind::SmallInt => Some(2),
            TypeKind::Int | TypeKind::Float => Some(4),
            TypeKind::BigInt
            | TypeKind::Double
            | TypeKind::Decimal
            | TypeKind::Time
            | TypeKind::Timestamp
            | TypeKind::Interval => Some(8),
            TypeKind::Date => match self.compression {
                Compression::DateInDays => Some(if self.comp_param == 16 { 2 } else { 4 }),
                _ => Some(8),
            },
            TypeKind::Text => match self.compression {
                Compression::Dict => Some(4),
                _ => None,
            },
            TypeKind::FixedArray => {
                let e = self.elem.as_ref()?;
                Some(e.size()? * self.array_len)
            }
            TypeKind::Array => None,
        }
    }

    /// Inline null sentinel for integral-stored kinds, at the stored width
    pub fn null_int(&self) -> i64 {
        match self.size() {
            Some(1) => i8::MIN as i64,
            Some(2) => i16::MIN as i64,
            Some(4) => i32::MIN as i64,
            _ => i64::MIN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(SqlType::boolean().size(), Some(1));
        assert_eq!(SqlType::small_int().size(), Some(2));
        assert_eq!(SqlType::int().size(), Some(4));
        assert_eq!(SqlType::big_int().size(), Some(8));
        assert_eq!(SqlType::decimal(5, 2).size(), Some(8));
        assert_eq!(SqlType::date().size(), Some(8));
        assert_eq!(SqlType::date_in_days().size(), Some(4));
        assert_eq!(SqlType::text_dict(7).size(), Some(4));
        assert_eq!(SqlType::text_none().size(), None);
        assert_eq!(SqlType::fixed_array(SqlType::int(), 3).size(), Some(12));
        assert_eq!(SqlType::var_array(SqlType::int()).size(), None);
    }

    #[test]
    fn test_predicates() {
        assert!(SqlType::small_int().is_integral());
        assert!(SqlType::boolean().is_integral());
        assert!(SqlType::date().is_time());
        assert!(SqlType::interval().is_time_interval());
        assert!(!SqlType::decimal(5, 2).is_integral());
        assert!(SqlType::text_none().is_varlen());
        assert!(!SqlType::text_dict(1).is_varlen());
        assert!(SqlType::var_array(SqlType::int()).is_varlen());
        assert!(!SqlType::fixed_array(SqlType::int(), 2).is_varlen());
        assert!(SqlType::date_in_days().is_date_in_days());
        assert!(!SqlType::date().is_date_in_days());
    }

    #[test]
    fn test_null_sentinels() {
        assert_eq!(SqlType::boolean().null_int(), i8::MIN as i64);
        assert_eq!(SqlType::small_int().null_int(), i16::MIN as i64);
        assert_eq!(SqlType::text_dict(1).null_int(), i32::MIN as i64);
        assert_eq!(SqlType::date_in_days().null_int(), i32::MIN as i64);
        assert_eq!(SqlType::big_int().null_int(), i64::MIN);
    }
}
