//! Column type tags and their null sentinels.

/// The JDBC-ish column kinds the tuple parser dispatches on. Computed once
/// per column from the result header and cached for the life of the
/// result block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal,
    Numeric,
    Varchar,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    Clob,
    Blob,
    Binary,
}

impl ColumnType {
    /// Parses the MonetDB `type` header field (e.g. `"int"`, `"varchar"`,
    /// `"timestamptz"`). Unknown names fall back to `Varchar`, matching the
    /// tolerant behavior of the rest of the parser (no hard failure on an
    /// unrecognized but well-formed tuple stream).
    pub fn from_header_name(name: &str) -> ColumnType {
        match name.to_ascii_lowercase().as_str() {
            "boolean" => ColumnType::Boolean,
            "tinyint" => ColumnType::TinyInt,
            "smallint" => ColumnType::SmallInt,
            "int" | "integer" => ColumnType::Integer,
            "bigint" | "hugeint" => ColumnType::BigInt,
            "real" => ColumnType::Real,
            "double" => ColumnType::Double,
            "decimal" => ColumnType::Decimal,
            "numeric" => ColumnType::Numeric,
            "date" => ColumnType::Date,
            "time" => ColumnType::Time,
            "timetz" => ColumnType::TimeTz,
            "timestamp" => ColumnType::Timestamp,
            "timestamptz" => ColumnType::TimestampTz,
            "clob" | "char" | "str" => ColumnType::Clob,
            "blob" => ColumnType::Blob,
            "binary" => ColumnType::Binary,
            _ => ColumnType::Varchar,
        }
    }
}

/// A single decoded value. Primitive null sentinels are not distinguished
/// from real minimum values at this layer; a per-row null flag (returned
/// alongside by the tuple parser) is authoritative.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Null,
}

/// The per-type null sentinel.
pub fn null_sentinel(ty: ColumnType) -> Value {
    match ty {
        ColumnType::Boolean | ColumnType::TinyInt => Value::I8(i8::MIN),
        ColumnType::SmallInt => Value::I16(i16::MIN),
        ColumnType::Integer => Value::I32(i32::MIN),
        ColumnType::BigInt => Value::I64(i64::MIN),
        ColumnType::Real => Value::F32(f32::MIN_POSITIVE),
        ColumnType::Double => Value::F64(f64::MIN_POSITIVE),
        ColumnType::Decimal
        | ColumnType::Numeric
        | ColumnType::Varchar
        | ColumnType::Date
        | ColumnType::Time
        | ColumnType::TimeTz
        | ColumnType::Timestamp
        | ColumnType::TimestampTz
        | ColumnType::Clob
        | ColumnType::Blob
        | ColumnType::Binary => Value::Null,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn primitive_sentinels_match_type_minimums() {
        assert_eq!(null_sentinel(ColumnType::TinyInt), Value::I8(i8::MIN));
        assert_eq!(null_sentinel(ColumnType::SmallInt), Value::I16(i16::MIN));
        assert_eq!(null_sentinel(ColumnType::Integer), Value::I32(i32::MIN));
        assert_eq!(null_sentinel(ColumnType::BigInt), Value::I64(i64::MIN));
    }

    #[test]
    fn object_columns_use_null_slot() {
        assert_eq!(null_sentinel(ColumnType::Varchar), Value::Null);
        assert_eq!(null_sentinel(ColumnType::Blob), Value::Null);
    }

    #[test]
    fn unknown_header_name_falls_back_to_varchar() {
        assert_eq!(ColumnType::from_header_name("weird_type"), ColumnType::Varchar);
    }
}
