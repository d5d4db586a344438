//! Result-header bookkeeping: the column metadata collected from HEADER
//! lines between a table SOHEADER and its first RESULT line.

use mapi_common::err::mapi_error::MapiError;
use mapi_common::err::MapiResult;

use crate::types::ColumnType;

/// The kind encoded by the single digit following `&` on a SOHEADER line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoHeaderKind {
    Table,
    UpdateCount,
    SchemaChange,
    AutoCommitToggle,
    Prepare,
    DataBlock,
}

impl SoHeaderKind {
    pub fn from_digit(digit: u8) -> MapiResult<SoHeaderKind> {
        match digit {
            b'1' => Ok(SoHeaderKind::Table),
            b'2' => Ok(SoHeaderKind::UpdateCount),
            b'3' => Ok(SoHeaderKind::SchemaChange),
            b'4' => Ok(SoHeaderKind::AutoCommitToggle),
            b'5' => Ok(SoHeaderKind::Prepare),
            b'6' => Ok(SoHeaderKind::DataBlock),
            other => Err(MapiError::Protocol(format!(
                "unknown SOHEADER kind digit '{}'",
                other as char
            ))),
        }
    }
}

/// Parses a SOHEADER line (`&1 …`) into its kind and the remaining
/// space-separated fields (row count, column count, and so on, whose
/// exact shape depends on `kind`).
pub fn parse_soheader(line: &[u8]) -> MapiResult<(SoHeaderKind, Vec<String>)> {
    if line.first() != Some(&b'&') || line.len() < 2 {
        return Err(MapiError::Protocol("not a SOHEADER line".into()));
    }
    let kind = SoHeaderKind::from_digit(line[1])?;
    let rest = String::from_utf8_lossy(&line[2..]);
    let fields = rest.split_whitespace().map(|s| s.to_string()).collect();
    Ok((kind, fields))
}

/// Column metadata accumulated from HEADER lines for one table result.
#[derive(Debug, Clone, Default)]
pub struct ResultHeader {
    pub names: Vec<String>,
    pub lengths: Vec<usize>,
    pub types: Vec<ColumnType>,
    pub table_names: Vec<String>,
}

impl ResultHeader {
    /// Folds one `% … # <name>` HEADER line into the accumulator. `name`
    /// identifies which array the `%`-prefixed values populate.
    pub fn apply_line(&mut self, line: &[u8]) -> MapiResult<()> {
        let text = std::str::from_utf8(line)?;
        let body = text.strip_prefix('%').ok_or_else(|| {
            MapiError::Protocol("not a HEADER line".into())
        })?;
        let (values_part, name) = body
            .rsplit_once('#')
            .ok_or_else(|| MapiError::Protocol("HEADER line missing '#' name tag".into()))?;
        let name = name.trim();
        let values: Vec<&str> = values_part.split(',').map(|s| s.trim()).collect();

        match name {
            "name" => self.names = values.into_iter().map(|s| s.to_string()).collect(),
            "length" => {
                self.lengths = values
                    .into_iter()
                    .map(|s| s.parse::<usize>().unwrap_or(0))
                    .collect()
            }
            "type" => {
                self.types = values.into_iter().map(ColumnType::from_header_name).collect()
            }
            "table_name" => {
                self.table_names = values.into_iter().map(|s| s.to_string()).collect()
            }
            _ => {}
        }
        Ok(())
    }

    pub fn column_count(&self) -> usize {
        self.types.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_table_soheader() {
        let (kind, fields) = parse_soheader(b"&1 3 2 10 2").unwrap();
        assert_eq!(kind, SoHeaderKind::Table);
        assert_eq!(fields, vec!["3", "2", "10", "2"]);
    }

    #[test]
    fn unknown_soheader_digit_is_protocol_error() {
        let err = parse_soheader(b"&9").unwrap_err();
        assert!(matches!(err, MapiError::Protocol(_)));
    }

    #[test]
    fn accumulates_name_and_type_headers() {
        let mut header = ResultHeader::default();
        header.apply_line(b"% id,\tname # name").unwrap();
        header.apply_line(b"% int,\tvarchar # type").unwrap();
        assert_eq!(header.names, vec!["id", "name"]);
        assert_eq!(header.types, vec![ColumnType::Integer, ColumnType::Varchar]);
        assert_eq!(header.column_count(), 2);
    }
}
