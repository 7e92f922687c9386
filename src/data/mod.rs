//! Data type and scalar value definitions

mod types;
mod value;

pub use types::{Compression, SqlType, TypeKind, NULL_DOUBLE, NULL_FLOAT, SECS_PER_DAY};
pub use value::{parse_bool_literal, parse_lenient_f64, string_to_datum_seconds, ScalarValue};
