//! The tuple-line parser: quoted-string escape decoding, NULL detection,
//! and per-column typed dispatch.

use mapi_common::err::mapi_error::MapiError;
use mapi_common::err::MapiResult;

use crate::types::{null_sentinel, ColumnType, Value};

/// One decoded row: a value plus an authoritative null flag per column
/// (primitive sentinels alone are not enough to distinguish "the minimum
/// value" from "NULL").
pub struct Row {
    pub values: Vec<Value>,
    pub is_null: Vec<bool>,
}

/// Parses one tuple line against the expected column types. `scratch` is a
/// caller-owned buffer reused across calls to avoid a per-row allocation
/// for escape decoding.
pub fn parse_line(line: &[u8], types: &[ColumnType], scratch: &mut Vec<u8>) -> MapiResult<Row> {
    if line.first() == Some(&b'=') {
        if types.len() != 1 {
            return Err(MapiError::Protocol(
                "scalar result line requires exactly one column".into(),
            ));
        }
        let raw = trim_ascii(&line[1..]);
        let (value, is_null) = decode_field(raw, types[0], scratch)?;
        return Ok(Row {
            values: vec![value],
            is_null: vec![is_null],
        });
    }

    let fields = split_fields(line)?;
    if fields.len() != types.len() {
        return Err(MapiError::Protocol(format!(
            "row has {} columns, expected {}",
            fields.len(),
            types.len()
        )));
    }

    let mut values = Vec::with_capacity(types.len());
    let mut is_null = Vec::with_capacity(types.len());
    for (field, ty) in fields.iter().zip(types.iter()) {
        let (value, null) = decode_field(field, *ty, scratch)?;
        values.push(value);
        is_null.push(null);
    }
    Ok(Row { values, is_null })
}

/// Splits `[ f0,\tf1,\tf2\t]` into raw (still possibly quoted) field slices.
/// The true delimiter is an unquoted tab; a comma immediately adjacent to
/// it on either side is decorative and trimmed away per field.
fn split_fields(line: &[u8]) -> MapiResult<Vec<&[u8]>> {
    if line.len() < 2 || line[0] != b'[' {
        return Err(MapiError::Protocol("tuple line does not start with '['".into()));
    }
    let close = line
        .iter()
        .rposition(|b| *b == b']')
        .ok_or_else(|| MapiError::Protocol("tuple line does not end with ']'".into()))?;

    let mut start = 1;
    if line.get(start) == Some(&b' ') {
        start += 1;
    }
    let body = &line[start..close];

    let mut fields = Vec::new();
    let mut field_start = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0usize;
    while i < body.len() {
        let b = body[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
        } else if b == b'"' {
            in_string = true;
        } else if b == b'\t' {
            fields.push(trim_comma(&body[field_start..i]));
            field_start = i + 1;
        }
        i += 1;
    }
    // Every field, including the last, is tab-terminated; a trailing slice
    // only exists if the line was malformed and is missing that final tab.
    if field_start < body.len() {
        fields.push(trim_comma(&body[field_start..]));
    }
    Ok(fields)
}

fn trim_comma(field: &[u8]) -> &[u8] {
    let field = if field.first() == Some(&b',') { &field[1..] } else { field };
    if field.last() == Some(&b',') {
        &field[..field.len() - 1]
    } else {
        field
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map(|i| i + 1).unwrap_or(start);
    &bytes[start..end]
}

/// Decodes one raw field (quoted or not) into a typed value plus its null
/// flag.
fn decode_field(raw: &[u8], ty: ColumnType, scratch: &mut Vec<u8>) -> MapiResult<(Value, bool)> {
    let raw = trim_ascii(raw);

    if raw.len() >= 2 && raw.first() == Some(&b'"') && raw.last() == Some(&b'"') {
        let inner = &raw[1..raw.len() - 1];
        let text = if inner.contains(&b'\\') {
            scratch.clear();
            unescape_into(inner, scratch);
            String::from_utf8_lossy(scratch).into_owned()
        } else {
            String::from_utf8_lossy(inner).into_owned()
        };
        return Ok((dispatch_text(&text, ty), false));
    }

    if raw == b"NULL" {
        return Ok((null_sentinel(ty), true));
    }

    let text = String::from_utf8_lossy(raw);
    Ok((dispatch_text(&text, ty), false))
}

/// Decodes backslash escapes into `out`: `\\ \" \n \t \r \f` and three-digit
/// octal `\DDD` (000..377). Any other `\x` passes `x` through unchanged,
/// never fails.
fn unescape_into(input: &[u8], out: &mut Vec<u8>) {
    let mut i = 0;
    while i < input.len() {
        let b = input[i];
        if b != b'\\' || i + 1 >= input.len() {
            out.push(b);
            i += 1;
            continue;
        }
        let next = input[i + 1];
        match next {
            b'\\' => {
                out.push(b'\\');
                i += 2;
            }
            b'"' => {
                out.push(b'"');
                i += 2;
            }
            b'n' => {
                out.push(b'\n');
                i += 2;
            }
            b't' => {
                out.push(b'\t');
                i += 2;
            }
            b'r' => {
                out.push(b'\r');
                i += 2;
            }
            b'f' => {
                out.push(0x0c);
                i += 2;
            }
            b'0'..=b'3' if i + 3 < input.len() && is_octal(input[i + 2]) && is_octal(input[i + 3]) => {
                let value = (next - b'0') as u32 * 64
                    + (input[i + 2] - b'0') as u32 * 8
                    + (input[i + 3] - b'0') as u32;
                out.push(value as u8);
                i += 4;
            }
            other => {
                out.push(other);
                i += 2;
            }
        }
    }
}

fn is_octal(b: u8) -> bool {
    (b'0'..=b'7').contains(&b)
}

fn dispatch_text(text: &str, ty: ColumnType) -> Value {
    match ty {
        ColumnType::Boolean => Value::Bool(text == "true" || text == "1"),
        ColumnType::TinyInt => Value::I8(parse_int(text) as i8),
        ColumnType::SmallInt => Value::I16(parse_int(text) as i16),
        ColumnType::Integer => Value::I32(parse_int(text) as i32),
        ColumnType::BigInt => Value::I64(parse_int(text)),
        ColumnType::Real => Value::F32(text.parse().unwrap_or(0.0)),
        ColumnType::Double => Value::F64(text.parse().unwrap_or(0.0)),
        ColumnType::Blob | ColumnType::Binary => {
            Value::Bytes(hex::decode(text).unwrap_or_default())
        }
        ColumnType::Decimal
        | ColumnType::Numeric
        | ColumnType::Varchar
        | ColumnType::Date
        | ColumnType::Time
        | ColumnType::TimeTz
        | ColumnType::Timestamp
        | ColumnType::TimestampTz
        | ColumnType::Clob => Value::Text(text.to_string()),
    }
}

/// Digit-by-digit integer parse: a leading `-` is allowed once; an
/// embedded `.` (interval literals) terminates the scan rather than
/// erroring.
fn parse_int(text: &str) -> i64 {
    let bytes = text.as_bytes();
    let mut i = 0;
    let mut neg = false;
    if bytes.first() == Some(&b'-') {
        neg = true;
        i = 1;
    }
    let mut value: i64 = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'.' {
            break;
        }
        if !b.is_ascii_digit() {
            break;
        }
        value = value * 10 + (b - b'0') as i64;
        i += 1;
    }
    if neg {
        -value
    } else {
        value
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn types(n: &[ColumnType]) -> Vec<ColumnType> {
        n.to_vec()
    }

    #[test]
    fn scenario_int_string_null() {
        let mut scratch = Vec::new();
        let row = parse_line(
            b"[ 1,\t\"hello\",\tNULL\t]",
            &types(&[ColumnType::Integer, ColumnType::Varchar, ColumnType::Varchar]),
            &mut scratch,
        )
        .unwrap();
        assert_eq!(row.values[0], Value::I32(1));
        assert_eq!(row.values[1], Value::Text("hello".to_string()));
        assert!(row.is_null[2]);
    }

    #[test]
    fn scenario_tab_and_newline_escapes() {
        let mut scratch = Vec::new();
        let row = parse_line(
            b"[ \"a\\tb\\nc\"\t]",
            &types(&[ColumnType::Varchar]),
            &mut scratch,
        )
        .unwrap();
        assert_eq!(row.values[0], Value::Text("a\tb\nc".to_string()));
    }

    #[test]
    fn scenario_octal_escape() {
        let mut scratch = Vec::new();
        let row = parse_line(b"[ \"\\377\"\t]", &types(&[ColumnType::Varchar]), &mut scratch).unwrap();
        match &row.values[0] {
            Value::Text(s) => assert_eq!(s.as_bytes(), &[0xFFu8][..]),
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn scenario_scalar_line() {
        let mut scratch = Vec::new();
        let row = parse_line(b"= 42", &types(&[ColumnType::Integer]), &mut scratch).unwrap();
        assert_eq!(row.values[0], Value::I32(42));
    }

    #[test]
    fn scenario_tab_before_comma_ordering() {
        let mut scratch = Vec::new();
        let row = parse_line(
            b"[ \"x\"\t,\"y\"\t]",
            &types(&[ColumnType::Varchar, ColumnType::Varchar]),
            &mut scratch,
        )
        .unwrap();
        assert_eq!(row.values[0], Value::Text("x".to_string()));
        assert_eq!(row.values[1], Value::Text("y".to_string()));
    }

    #[test]
    fn wrong_column_count_is_protocol_error() {
        let mut scratch = Vec::new();
        let err = parse_line(b"[ 1\t]", &types(&[ColumnType::Integer, ColumnType::Integer]), &mut scratch)
            .unwrap_err();
        assert!(matches!(err, MapiError::Protocol(_)));
    }

    #[test]
    fn invalid_octal_falls_back_to_literal_digit() {
        let mut out = Vec::new();
        unescape_into(b"\\9", &mut out);
        assert_eq!(out, b"9");
    }

    #[test]
    fn parsing_same_line_twice_is_idempotent() {
        let mut scratch = Vec::new();
        let a = parse_line(b"[ 1,\t\"hello\",\tNULL\t]", &types(&[ColumnType::Integer, ColumnType::Varchar, ColumnType::Varchar]), &mut scratch).unwrap();
        let b = parse_line(b"[ 1,\t\"hello\",\tNULL\t]", &types(&[ColumnType::Integer, ColumnType::Varchar, ColumnType::Varchar]), &mut scratch).unwrap();
        assert_eq!(a.values, b.values);
        assert_eq!(a.is_null, b.is_null);
    }
}
