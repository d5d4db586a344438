//! Line classification and the ERROR/SQLSTATE rewrite.

use crate::consts::{FILETRANSFER_SENTINEL, MORE_SENTINEL, PROMPT_SENTINEL};

/// Classification of a single server line by its leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineType {
    Unknown,
    Error,
    Header,
    Result,
    Prompt,
    More,
    FileTransfer,
    SoHeader,
    Redirect,
    Info,
}

/// A classified server line: its tag-derived kind plus the raw bytes
/// (SQLSTATE-rewritten for ERROR lines).
#[derive(Debug, Clone)]
pub struct Line {
    kind: LineType,
    bytes: Vec<u8>,
}

impl Line {
    pub fn kind(&self) -> LineType {
        self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Builds a classified line from raw bytes (without the trailing `\n`).
    pub fn from_raw(raw: &[u8]) -> Self {
        let kind = classify(raw);
        let bytes = if kind == LineType::Error {
            rewrite_error_sqlstate(raw)
        } else {
            raw.to_vec()
        };
        Line { kind, bytes }
    }
}

/// Classifies a line by its leading bytes. Two-byte
/// sentinels are checked first since they share a leading `0x01` byte that
/// never appears as a single-byte ASCII tag.
pub fn classify(line: &[u8]) -> LineType {
    if line.len() >= 2 && line[0] == 0x01 {
        let sentinel = [line[0], line[1]];
        if sentinel == PROMPT_SENTINEL {
            return LineType::Prompt;
        }
        if sentinel == MORE_SENTINEL {
            return LineType::More;
        }
        if sentinel == FILETRANSFER_SENTINEL {
            return LineType::FileTransfer;
        }
        return LineType::Unknown;
    }

    match line.first() {
        None => LineType::Unknown,
        Some(b'!') => LineType::Error,
        Some(b'%') => LineType::Header,
        Some(b'[') | Some(b'=') => LineType::Result,
        Some(b'&') => LineType::SoHeader,
        Some(b'^') => LineType::Redirect,
        Some(b'#') => LineType::Info,
        Some(_) => LineType::Unknown,
    }
}

/// `![A-Z0-9]{5}!` — MonetDB's SQLSTATE tag convention.
fn has_sqlstate_tag(line: &[u8]) -> bool {
    if line.len() < 7 || line[0] != b'!' || line[6] != b'!' {
        return false;
    }
    line[1..6]
        .iter()
        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// ERROR lines that don't already carry a `!SQLSTATE!` prefix get `22000!`
/// (the generic "no SQLSTATE" class) prepended, so a SQLSTATE is always
/// present downstream.
fn rewrite_error_sqlstate(line: &[u8]) -> Vec<u8> {
    if has_sqlstate_tag(line) {
        return line.to_vec();
    }
    let mut rewritten = Vec::with_capacity(line.len() + 7);
    rewritten.push(b'!');
    rewritten.extend_from_slice(b"22000!");
    rewritten.extend_from_slice(&line[1..]);
    rewritten
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classifies_every_single_byte_tag() {
        assert_eq!(classify(b"!oops"), LineType::Error);
        assert_eq!(classify(b"%name"), LineType::Header);
        assert_eq!(classify(b"[ 1\t]"), LineType::Result);
        assert_eq!(classify(b"=42"), LineType::Result);
        assert_eq!(classify(b"&1 1 1 1"), LineType::SoHeader);
        assert_eq!(classify(b"^mapi:monetdb://x"), LineType::Redirect);
        assert_eq!(classify(b"#info"), LineType::Info);
        assert_eq!(classify(b"xyz"), LineType::Unknown);
        assert_eq!(classify(b""), LineType::Unknown);
    }

    #[test]
    fn classifies_two_byte_sentinels() {
        assert_eq!(classify(&[0x01, 0x01]), LineType::Prompt);
        assert_eq!(classify(&[0x01, 0x02]), LineType::More);
        assert_eq!(classify(&[0x01, 0x03]), LineType::FileTransfer);
        assert_eq!(classify(&[0x01, 0x09]), LineType::Unknown);
    }

    #[test]
    fn error_without_sqlstate_gets_22000_prefix() {
        let line = Line::from_raw(b"!oops");
        assert_eq!(line.bytes(), b"!22000!oops");
    }

    #[test]
    fn error_with_sqlstate_is_passed_through() {
        let line = Line::from_raw(b"!08M01!already present");
        assert_eq!(line.bytes(), b"!08M01!already present");
    }
}
