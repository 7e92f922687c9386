//! Right-hand-side scalar values and literal parsing
//!
//! `ScalarValue` is the tagged sum carried into the column updater: the
//! coercer in `fragment::coerce` is its single dispatch site.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::data::types::{SqlType, TypeKind};
use crate::{FragError, Result};

/// One right-hand-side value for a column update
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Int64(i64),
    Double(f64),
    Float(f32),
    /// A string value, or NULL when the inner option is empty
    NullableString(Option<String>),
}

impl ScalarValue {
    pub fn null_string() -> Self {
        ScalarValue::NullableString(None)
    }

    pub fn string(s: impl Into<String>) -> Self {
        ScalarValue::NullableString(Some(s.into()))
    }
}

/// Parse the longest valid leading float out of a string (`atof` semantics).
/// Returns `None` when no numeric prefix exists at all.
pub fn parse_lenient_f64(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    let mut seen_digit = false;

    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
        seen_digit = true;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
            seen_digit = true;
        }
    }
    if !seen_digit {
        return None;
    }
    // Optional exponent; only consumed when it carries digits.
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > digits_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok()
}

/// Boolean literal: case-insensitive `t` / `true`
pub fn parse_bool_literal(s: &str) -> bool {
    s.eq_ignore_ascii_case("t") || s.eq_ignore_ascii_case("true")
}

/// Parse a time/date/timestamp literal into epoch (or midnight-relative)
/// seconds for the given column type.
pub fn string_to_datum_seconds(s: &str, ty: &SqlType) -> Result<i64> {
    let s = s.trim();
    match ty.kind() {
        TypeKind::Time => {
            let t = NaiveTime::parse_from_str(s, "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
                .map_err(|_| FragError::InvalidValue(format!("bad TIME literal '{s}'")))?;
            Ok(t.signed_duration_since(midnight()).num_seconds())
        }
        TypeKind::Date => {
            let d = parse_date(s)?;
            let dt = d
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| FragError::InvalidValue(format!("bad DATE literal '{s}'")))?;
            Ok(dt.and_utc().timestamp())
        }
        TypeKind::Timestamp => {
            let dt = parse_datetime(s)?;
            Ok(dt.and_utc().timestamp())
        }
        _ => Err(FragError::InvalidValue(format!(
            "'{s}' is not a datetime literal"
        ))),
    }
}

fn midnight() -> NaiveTime {
    NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default()
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .map_err(|_| FragError::InvalidValue(format!("bad DATE literal '{s}'")))
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| {
            parse_date(s).and_then(|d| {
                d.and_hms_opt(0, 0, 0)
                    .ok_or_else(|| FragError::InvalidValue(format!("bad TIMESTAMP literal '{s}'")))
            })
        })
        .map_err(|_| FragError::InvalidValue(format!("bad TIMESTAMP literal '{s}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_float() {
        assert_eq!(parse_lenient_f64("3.5"), Some(3.5));
        assert_eq!(parse_lenient_f64("  -12"), Some(-12.0));
        assert_eq!(parse_lenient_f64("7abc"), Some(7.0));
        assert_eq!(parse_lenient_f64(".25"), Some(0.25));
        assert_eq!(parse_lenient_f64("1e3"), Some(1000.0));
        assert_eq!(parse_lenient_f64("2e"), Some(2.0));
        assert_eq!(parse_lenient_f64("abc"), None);
        assert_eq!(parse_lenient_f64(""), None);
        assert_eq!(parse_lenient_f64("-"), None);
    }

    #[test]
    fn test_bool_literal() {
        assert!(parse_bool_literal("t"));
        assert!(parse_bool_literal("TRUE"));
        assert!(parse_bool_literal("True"));
        assert!(!parse_bool_literal("yes"));
        assert!(!parse_bool_literal("false"));
    }

    #[test]
    fn test_datum_parsing() {
        let secs = string_to_datum_seconds("1970-01-02", &SqlType::date()).unwrap();
        assert_eq!(secs, 86_400);

        let secs = string_to_datum_seconds("00:01:30", &SqlType::time()).unwrap();
        assert_eq!(secs, 90);

        let secs =
            string_to_datum_seconds("1970-01-01 01:00:00", &SqlType::timestamp()).unwrap();
        assert_eq!(secs, 3600);

        assert!(string_to_datum_seconds("garbage", &SqlType::date()).is_err());
    }
}
