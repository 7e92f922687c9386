//! Scalar coercion into column slots
//!
//! Converts one right-hand-side `ScalarValue` into the destination column's
//! physical encoding, writing the encoded bytes into the row's slot and
//! reporting the value that statistics should see. Date-in-days slots speak
//! epoch seconds at this interface: stores divide down to days, reads
//! multiply back up, so stat values are always in seconds.

use parking_lot::Mutex;

use crate::catalog::{Catalog, DictDescriptor};
use crate::data::{
    parse_bool_literal, parse_lenient_f64, string_to_datum_seconds, ScalarValue, SqlType,
    NULL_DOUBLE, NULL_FLOAT, SECS_PER_DAY,
};
use crate::{invariant, FragError, Result};

/// What the statistics folder should observe for one coerced value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatUpdate {
    Int(i64),
    Float(f64),
    Null,
}

/// Shared per-update context for the coercer
pub struct CoerceCtx<'a> {
    pub lhs_type: &'a SqlType,
    pub rhs_type: &'a SqlType,
    pub col_name: &'a str,
    pub catalog: &'a Catalog,
    /// Destination dictionary when the target is a dict-encoded string column
    pub dict: Option<&'a DictDescriptor>,
    /// Fragmenter-level lock serializing dictionary id allocation
    pub dict_lock: &'a Mutex<()>,
    pub validator: &'a DecimalOverflowValidator,
}

// ============================================================================
// Decimal helpers
// ============================================================================

/// Rejects integer forms whose magnitude cannot fit the target decimal's
/// precision. Constructed once per update; a no-op for non-decimal targets.
pub struct DecimalOverflowValidator {
    enabled: bool,
    max: i64,
    dimension: i32,
    scale: i32,
}

impl DecimalOverflowValidator {
    pub fn new(ty: &SqlType) -> Self {
        Self {
            enabled: ty.is_decimal(),
            max: pow10(ty.get_dimension()),
            dimension: ty.get_dimension(),
            scale: ty.get_scale(),
        }
    }

    pub fn validate(&self, v: i64) -> Result<()> {
        if self.enabled && (v >= self.max || v <= -self.max) {
            return Err(FragError::DataConversionOverflow(format!(
                "on {v}: out of DECIMAL({}, {}) range",
                self.dimension, self.scale
            )));
        }
        Ok(())
    }
}

fn pow10(e: i32) -> i64 {
    10i64.checked_pow(e.max(0) as u32).unwrap_or(i64::MAX)
}

/// Move a scaled integer between decimal scales, rounding half away from
/// zero when narrowing. Widening wraps on overflow; the post-store sign
/// check catches the wrap.
fn rescale_decimal(v: i64, from_scale: i32, to_scale: i32) -> i64 {
    let d = to_scale - from_scale;
    if d >= 0 {
        v.wrapping_mul(pow10(d))
    } else {
        let f = pow10(-d);
        let half = f / 2;
        let adj = if v >= 0 { half } else { -half };
        (v + adj) / f
    }
}

fn decimal_to_double(ty: &SqlType, v: i64) -> f64 {
    v as f64 / 10f64.powi(ty.get_scale())
}

// ============================================================================
// Slot accessors
// ============================================================================

fn write_int(slot: &mut [u8], v: i64) {
    match slot.len() {
        1 => slot.copy_from_slice(&(v as i8).to_le_bytes()),
        2 => slot.copy_from_slice(&(v as i16).to_le_bytes()),
        4 => slot.copy_from_slice(&(v as i32).to_le_bytes()),
        _ => slot.copy_from_slice(&v.to_le_bytes()),
    }
}

fn read_int(slot: &[u8]) -> i64 {
    match slot.len() {
        1 => slot[0] as i8 as i64,
        2 => i16::from_le_bytes([slot[0], slot[1]]) as i64,
        4 => i32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]) as i64,
        _ => {
            let mut b = [0u8; 8];
            b.copy_from_slice(slot);
            i64::from_le_bytes(b)
        }
    }
}

fn int_range(width: usize) -> (i64, i64) {
    match width {
        1 => (i8::MIN as i64, i8::MAX as i64),
        2 => (i16::MIN as i64, i16::MAX as i64),
        4 => (i32::MIN as i64, i32::MAX as i64),
        _ => (i64::MIN, i64::MAX),
    }
}

fn narrow_checked(slot: &mut [u8], v: i64, ty: &SqlType, col_name: &str) -> Result<()> {
    let (lo, hi) = int_range(slot.len());
    if v < lo || v > hi {
        return Err(FragError::InvalidValue(format!(
            "out of range conversion of {v} for column {col_name}"
        )));
    }
    write_int(slot, v);
    Ok(())
}

/// Store an integral-domain value. Date-in-days targets take epoch seconds
/// and store the day count.
pub fn put_scalar_i64(slot: &mut [u8], ty: &SqlType, v: i64, col_name: &str) -> Result<()> {
    if ty.is_fp() {
        return put_scalar_f64(slot, ty, v as f64, col_name);
    }
    if ty.is_decimal() {
        write_int(slot, v);
        return Ok(());
    }
    if ty.is_date_in_days() {
        return narrow_checked(slot, v.div_euclid(SECS_PER_DAY), ty, col_name);
    }
    if ty.is_integral() || ty.is_dict_encoded_string() {
        return narrow_checked(slot, v, ty, col_name);
    }
    Err(invariant(format!(
        "no fixed-width integral store for column {col_name}"
    )))
}

/// Store a floating-domain value, rounding for integral targets
pub fn put_scalar_f64(slot: &mut [u8], ty: &SqlType, v: f64, col_name: &str) -> Result<()> {
    if ty.is_fp() {
        match slot.len() {
            4 => slot.copy_from_slice(&(v as f32).to_le_bytes()),
            _ => slot.copy_from_slice(&v.to_le_bytes()),
        }
        return Ok(());
    }
    if !v.is_finite() || v < i64::MIN as f64 || v > i64::MAX as f64 {
        return Err(FragError::InvalidValue(format!(
            "out of range conversion of {v} for column {col_name}"
        )));
    }
    if ty.is_decimal() {
        write_int(slot, v.round() as i64);
        return Ok(());
    }
    put_scalar_i64(slot, ty, v.round() as i64, col_name)
}

/// Store the column's inline null sentinel
pub fn put_null(slot: &mut [u8], ty: &SqlType) {
    if ty.is_fp() {
        match slot.len() {
            4 => slot.copy_from_slice(&NULL_FLOAT.to_le_bytes()),
            _ => slot.copy_from_slice(&NULL_DOUBLE.to_le_bytes()),
        }
    } else {
        write_int(slot, ty.null_int());
    }
}

/// Read an integral-domain value back; `None` when the slot holds the null
/// sentinel. Date-in-days slots come back in seconds.
pub fn get_scalar_i64(slot: &[u8], ty: &SqlType) -> Option<i64> {
    let raw = read_int(slot);
    if raw == ty.null_int() {
        return None;
    }
    if ty.is_date_in_days() {
        return Some(raw * SECS_PER_DAY);
    }
    Some(raw)
}

/// Read a floating-point value back; `None` when the slot holds the null
/// sentinel
pub fn get_scalar_f64(slot: &[u8], ty: &SqlType) -> Option<f64> {
    match slot.len() {
        4 => {
            let v = f32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]);
            if v == NULL_FLOAT {
                None
            } else {
                Some(v as f64)
            }
        }
        _ => {
            let mut b = [0u8; 8];
            b.copy_from_slice(slot);
            let v = f64::from_le_bytes(b);
            if v == NULL_DOUBLE {
                None
            } else {
                Some(v)
            }
        }
    }
}

fn reread_int_stat(slot: &[u8], ty: &SqlType) -> StatUpdate {
    match get_scalar_i64(slot, ty) {
        Some(v) => StatUpdate::Int(v),
        None => StatUpdate::Null,
    }
}

// ============================================================================
// Coercion dispatch
// ============================================================================

/// Coerce one RHS value into the destination slot. The single dispatch site
/// over `ScalarValue`.
pub fn coerce_rhs(slot: &mut [u8], sv: &ScalarValue, ctx: &CoerceCtx<'_>) -> Result<StatUpdate> {
    // An int64 RHS under a string type carries a dictionary id. When the
    // source dictionary is resolvable the real string is materialized and
    // handled by the string path; a bare literal index cannot be resolved
    // at this layer.
    let materialized;
    let sv = if ctx.rhs_type.is_string() {
        if let ScalarValue::Int64(id) = sv {
            let dict = ctx
                .catalog
                .get_dictionary(ctx.rhs_type.get_comp_param())
                .ok_or_else(|| {
                    FragError::UnsupportedCast("from string literal to string column".into())
                })?;
            materialized = ScalarValue::NullableString(Some(dict.dict.get_string(*id as i32)?));
            &materialized
        } else {
            sv
        }
    } else {
        sv
    };

    match sv {
        ScalarValue::Int64(v) => coerce_from_i64(slot, *v, ctx),
        ScalarValue::Double(v) => coerce_from_f64(slot, *v, ctx),
        ScalarValue::Float(v) => coerce_from_f64(slot, *v as f64, ctx),
        ScalarValue::NullableString(s) => coerce_from_str(slot, s.as_deref(), ctx),
    }
}

fn coerce_from_i64(slot: &mut [u8], v: i64, ctx: &CoerceCtx<'_>) -> Result<StatUpdate> {
    let lhs = ctx.lhs_type;
    if lhs.is_string() {
        #[cfg(feature = "string-conversion")]
        {
            return store_dict_string(slot, &format_i64(v, ctx.rhs_type), ctx);
        }
        #[cfg(not(feature = "string-conversion"))]
        return Err(FragError::UnsupportedCast("to string".into()));
    }

    ctx.validator.validate(v)?;

    if lhs.is_decimal() {
        let scaled = rescale_decimal(v, ctx.rhs_type.get_scale(), lhs.get_scale());
        put_scalar_i64(slot, lhs, scaled, ctx.col_name)?;
        let stored = read_int(slot);
        if (v >= 0) != (stored >= 0) {
            return Err(FragError::DataConversionOverflow(format!(
                "on {v} from DECIMAL({}, {}) to ({}, {})",
                ctx.rhs_type.get_dimension(),
                ctx.rhs_type.get_scale(),
                lhs.get_dimension(),
                lhs.get_scale()
            )));
        }
        return Ok(StatUpdate::Int(stored));
    }

    if lhs.is_integral() {
        let v_eff = if ctx.rhs_type.is_decimal() {
            decimal_to_double(ctx.rhs_type, v).round() as i64
        } else {
            v
        };
        put_scalar_i64(slot, lhs, v_eff, ctx.col_name)?;
        return Ok(reread_int_stat(slot, lhs));
    }

    if lhs.is_fp() {
        let v_eff = if ctx.rhs_type.is_decimal() {
            decimal_to_double(ctx.rhs_type, v)
        } else {
            v as f64
        };
        put_scalar_f64(slot, lhs, v_eff, ctx.col_name)?;
        return Ok(StatUpdate::Float(v_eff));
    }

    Err(FragError::UnsupportedCast(format!(
        "to {:?}",
        lhs.kind()
    )))
}

fn coerce_from_f64(slot: &mut [u8], v: f64, ctx: &CoerceCtx<'_>) -> Result<StatUpdate> {
    let lhs = ctx.lhs_type;
    if lhs.is_string() {
        #[cfg(feature = "string-conversion")]
        {
            return store_dict_string(slot, &format_f64(v), ctx);
        }
        #[cfg(not(feature = "string-conversion"))]
        return Err(FragError::UnsupportedCast("to string".into()));
    }

    if lhs.is_fp() {
        put_scalar_f64(slot, lhs, v, ctx.col_name)?;
        return Ok(StatUpdate::Float(v));
    }

    if lhs.is_decimal() {
        let scaled = v * 10f64.powi(lhs.get_scale());
        if !scaled.is_finite() || scaled < i64::MIN as f64 || scaled > i64::MAX as f64 {
            return Err(FragError::DataConversionOverflow(format!(
                "on {v}: out of DECIMAL({}, {}) range",
                lhs.get_dimension(),
                lhs.get_scale()
            )));
        }
        let scaled = scaled.round() as i64;
        ctx.validator.validate(scaled)?;
        put_scalar_i64(slot, lhs, scaled, ctx.col_name)?;
        return Ok(reread_int_stat(slot, lhs));
    }

    if lhs.is_integral() {
        put_scalar_f64(slot, lhs, v, ctx.col_name)?;
        return Ok(reread_int_stat(slot, lhs));
    }

    Err(FragError::UnsupportedCast(format!(
        "to {:?}",
        lhs.kind()
    )))
}

fn coerce_from_str(
    slot: &mut [u8],
    s: Option<&str>,
    ctx: &CoerceCtx<'_>,
) -> Result<StatUpdate> {
    let lhs = ctx.lhs_type;
    let Some(s) = s else {
        put_null(slot, lhs);
        return Ok(StatUpdate::Null);
    };

    if lhs.is_string() {
        return store_dict_string(slot, s, ctx);
    }

    if s.is_empty() {
        put_null(slot, lhs);
        return Ok(StatUpdate::Null);
    }

    let dval = if lhs.is_boolean() {
        i64::from(parse_bool_literal(s)) as f64
    } else if lhs.is_time() {
        string_to_datum_seconds(s, lhs)? as f64
    } else {
        parse_lenient_f64(s).ok_or_else(|| {
            FragError::InvalidValue(format!(
                "cannot convert '{s}' for column {}",
                ctx.col_name
            ))
        })?
    };

    if lhs.is_fp() {
        put_scalar_f64(slot, lhs, dval, ctx.col_name)?;
        return Ok(StatUpdate::Float(dval));
    }

    if lhs.is_decimal() {
        let scaled = dval * 10f64.powi(lhs.get_scale());
        if !scaled.is_finite() || scaled < i64::MIN as f64 || scaled > i64::MAX as f64 {
            return Err(FragError::DataConversionOverflow(format!(
                "on {dval}: out of DECIMAL({}, {}) range",
                lhs.get_dimension(),
                lhs.get_scale()
            )));
        }
        let scaled = scaled.round() as i64;
        ctx.validator.validate(scaled)?;
        put_scalar_i64(slot, lhs, scaled, ctx.col_name)?;
        return Ok(reread_int_stat(slot, lhs));
    }

    put_scalar_f64(slot, lhs, dval, ctx.col_name)?;
    Ok(reread_int_stat(slot, lhs))
}

/// Add the string to the destination dictionary and store its 32-bit id
fn store_dict_string(slot: &mut [u8], s: &str, ctx: &CoerceCtx<'_>) -> Result<StatUpdate> {
    let dict = ctx
        .dict
        .ok_or_else(|| FragError::DictionaryMissing(ctx.lhs_type.get_comp_param()))?;
    let id = {
        let _guard = ctx.dict_lock.lock();
        dict.dict.get_or_add(s)
    };
    write_int(slot, id as i64);
    Ok(StatUpdate::Int(id as i64))
}

#[cfg(feature = "string-conversion")]
fn format_i64(v: i64, rhs_type: &SqlType) -> String {
    if rhs_type.is_time() {
        chrono::DateTime::from_timestamp(v, 0)
            .map(|dt| dt.naive_utc().to_string())
            .unwrap_or_else(|| v.to_string())
    } else {
        v.to_string()
    }
}

#[cfg(feature = "string-conversion")]
fn format_f64(v: f64) -> String {
    v.to_string()
}
