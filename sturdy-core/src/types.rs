//! Logical column types and the runtime value representation.
//!
//! Every bind parameter and every cell of a result row passes through [`Value`].
//! Conversions between `Value` and Rust types are expressed with [`IntoValue`]
//! and [`FromValue`]; a failed conversion surfaces as [`Error::TypeMismatch`].

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{Error, Result};

/// How an enum column is stored in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumRepr {
    /// Stored as the underlying integer.
    Int,
    /// Stored as the variant name; parsed back case-insensitively.
    Text,
}

/// The logical (database-independent) type of a column.
///
/// Dialects map logical types onto their own DDL types; see
/// [`Dialect::column_type`][crate::dialect::Dialect::column_type].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalType {
    Bool,
    /// 16-bit integer.
    Short,
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    Long,
    Double,
    Decimal {
        precision: u8,
        scale: u8,
    },
    /// Variable-length text, optionally bounded.
    Text {
        max_len: Option<u32>,
    },
    Bytes,
    /// A point in time, stored and compared in UTC.
    DateTime,
    /// A point in time that keeps its original offset.
    DateTimeOffset,
    /// A signed duration.
    Interval,
    Guid,
    Enum(EnumRepr),
}

impl LogicalType {
    /// Shorthand for a bounded text column.
    pub fn text(max_len: u32) -> Self {
        LogicalType::Text {
            max_len: Some(max_len),
        }
    }
}

/// A single bind parameter or result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
    DateTimeOffset(DateTime<FixedOffset>),
    Interval(Duration),
    Guid(Uuid),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value counts as "absent" for upsert purposes: SQL NULL or
    /// an integer zero primary key.
    pub(crate) fn is_absent_key(&self) -> bool {
        matches!(self, Value::Null | Value::Int(0))
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::DateTime(_) => "datetime",
            Value::DateTimeOffset(_) => "datetime-offset",
            Value::Interval(_) => "interval",
            Value::Guid(_) => "guid",
        }
    }
}

/// The storage format for [`Value::DateTime`]: second precision, UTC, no zone suffix.
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Conversion of a Rust value into a bind [`Value`].
pub trait IntoValue {
    fn into_value(self) -> Value;
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

macro_rules! impl_into_value {
    ($($ty:ty => $arm:expr),* $(,)?) => {
        $(impl IntoValue for $ty {
            fn into_value(self) -> Value {
                #[allow(clippy::redundant_closure_call)]
                ($arm)(self)
            }
        })*
    };
}

impl_into_value! {
    bool => Value::Bool,
    i16 => |v: i16| Value::Int(v as i64),
    i32 => |v: i32| Value::Int(v as i64),
    i64 => Value::Int,
    u32 => |v: u32| Value::Int(v as i64),
    f32 => |v: f32| Value::Double(v as f64),
    f64 => Value::Double,
    Decimal => Value::Decimal,
    String => Value::Text,
    &str => |v: &str| Value::Text(v.to_owned()),
    Vec<u8> => Value::Bytes,
    &[u8] => |v: &[u8]| Value::Bytes(v.to_vec()),
    DateTime<Utc> => Value::DateTime,
    DateTime<FixedOffset> => Value::DateTimeOffset,
    Duration => Value::Interval,
    Uuid => Value::Guid,
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => Value::Null,
        }
    }
}

/// Conversion of a result cell back into a Rust value.
///
/// Backends return a narrow set of physical shapes (ints, reals, text, blobs),
/// so every implementation accepts the encodings the dialects produce for its
/// logical type in addition to the exact [`Value`] variant.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch(expected: &str, got: &Value) -> Error {
    Error::type_mismatch(format!("expected {expected}, found {}", got.type_name()))
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(v) => Ok(*v),
            Value::Int(0) => Ok(false),
            Value::Int(1) => Ok(true),
            other => Err(mismatch("bool", other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Int(v) => Ok(*v),
            other => Err(mismatch("int", other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| Error::type_mismatch(format!("{wide} out of range for i32")))
    }
}

impl FromValue for i16 {
    fn from_value(value: &Value) -> Result<Self> {
        let wide = i64::from_value(value)?;
        i16::try_from(wide).map_err(|_| Error::type_mismatch(format!("{wide} out of range for i16")))
    }
}

impl FromValue for u32 {
    fn from_value(value: &Value) -> Result<Self> {
        let wide = i64::from_value(value)?;
        u32::try_from(wide).map_err(|_| Error::type_mismatch(format!("{wide} out of range for u32")))
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> Result<Self> {
        let wide = i64::from_value(value)?;
        u64::try_from(wide).map_err(|_| Error::type_mismatch(format!("{wide} out of range for u64")))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Double(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            Value::Decimal(v) => {
                use rust_decimal::prelude::ToPrimitive;
                v.to_f64()
                    .ok_or_else(|| Error::type_mismatch("decimal out of range for f64"))
            }
            other => Err(mismatch("double", other)),
        }
    }
}

impl FromValue for Decimal {
    fn from_value(value: &Value) -> Result<Self> {
        use rust_decimal::prelude::FromPrimitive;
        match value {
            Value::Decimal(v) => Ok(*v),
            Value::Int(v) => Ok(Decimal::from(*v)),
            Value::Double(v) => Decimal::from_f64(*v)
                .ok_or_else(|| Error::type_mismatch("double not representable as decimal")),
            Value::Text(v) => v
                .parse()
                .map_err(|_| Error::type_mismatch(format!("`{v}` is not a decimal"))),
            other => Err(mismatch("decimal", other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(v) => Ok(v.clone()),
            other => Err(mismatch("text", other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bytes(v) => Ok(v.clone()),
            other => Err(mismatch("bytes", other)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::DateTime(v) => Ok(*v),
            Value::DateTimeOffset(v) => Ok(v.with_timezone(&Utc)),
            Value::Text(v) => parse_datetime(v),
            other => Err(mismatch("datetime", other)),
        }
    }
}

impl FromValue for DateTime<FixedOffset> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::DateTimeOffset(v) => Ok(*v),
            Value::DateTime(v) => Ok(v.fixed_offset()),
            Value::Text(v) => DateTime::parse_from_rfc3339(v)
                .map_err(|_| Error::type_mismatch(format!("`{v}` is not an offset datetime"))),
            other => Err(mismatch("datetime-offset", other)),
        }
    }
}

impl FromValue for Duration {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Interval(v) => Ok(*v),
            // dialects store intervals as whole microseconds
            Value::Int(v) => Ok(Duration::microseconds(*v)),
            other => Err(mismatch("interval", other)),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Guid(v) => Ok(*v),
            Value::Text(v) => Uuid::parse_str(v)
                .map_err(|_| Error::type_mismatch(format!("`{v}` is not a guid"))),
            Value::Bytes(v) => Uuid::from_slice(v)
                .map_err(|_| Error::type_mismatch("blob has wrong width for a guid")),
            other => Err(mismatch("guid", other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

pub(crate) fn parse_datetime(text: &str) -> Result<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, DATETIME_FORMAT) {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    // values written by other tools commonly carry fractional seconds or a zone
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    DateTime::parse_from_rfc3339(text)
        .map(|v| v.with_timezone(&Utc))
        .map_err(|_| Error::type_mismatch(format!("`{text}` is not a datetime")))
}

/// Mapping between a Rust enum and its stored form.
///
/// Implemented by entity definitions for each enum column; the engine never
/// sees the enum type itself, only this codec via [`Row::try_get_enum`] and
/// [`IntoValue`] on the stored form.
///
/// [`Row::try_get_enum`]: crate::row::Row::try_get_enum
pub trait EnumCodec: Sized + Copy + 'static {
    /// All variants, paired with their canonical names.
    const VARIANTS: &'static [(&'static str, Self)];

    /// The underlying integer for int-stored enum columns.
    fn index(&self) -> i64;

    fn name(&self) -> &'static str;
}

/// Decode an enum column cell per its storage form.
///
/// String-stored values are matched by name, case-insensitively; integer-stored
/// values are matched on the underlying integer. Unknown values are a
/// [`TypeMismatch`][Error::TypeMismatch].
pub fn decode_enum<T: EnumCodec>(value: &Value) -> Result<T> {
    match value {
        Value::Text(name) => T::VARIANTS
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| *v)
            .ok_or_else(|| Error::type_mismatch(format!("unknown enum name `{name}`"))),
        Value::Int(index) => T::VARIANTS
            .iter()
            .find(|(_, v)| v.index() == *index)
            .map(|(_, v)| *v)
            .ok_or_else(|| Error::type_mismatch(format!("unknown enum index {index}"))),
        other => Err(mismatch("enum", other)),
    }
}

/// Encode an enum for storage under the given representation.
pub fn encode_enum<T: EnumCodec>(value: T, repr: EnumRepr) -> Value {
    match repr {
        EnumRepr::Int => Value::Int(value.index()),
        EnumRepr::Text => Value::Text(value.name().to_owned()),
    }
}
