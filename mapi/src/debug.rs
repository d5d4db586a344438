//! The optional debug sink: the entire observability surface of the core
//! besides `tracing` spans.

/// Tags a traced byte span: raw bytes crossing the socket (`Rx`/`Tx`) or
/// decoded/encoded lines crossing the reader/writer boundary (`Rd`/`Td`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugTag {
    Rx,
    Tx,
    Rd,
    Td,
}

impl DebugTag {
    pub fn as_str(self) -> &'static str {
        match self {
            DebugTag::Rx => "RX",
            DebugTag::Tx => "TX",
            DebugTag::Rd => "RD",
            DebugTag::Td => "TD",
        }
    }
}

/// Injectable sink for tagged traffic. A `Session` holds at most one; when
/// present, the framer/reader/writer forward bytes through it. Never
/// required for correct operation.
pub trait DebugSink: Send {
    fn on_line(&mut self, tag: DebugTag, bytes: &[u8], millis: u64);
}

/// A `DebugSink` that writes `TAG millis bytes` to stderr, useful for
/// manual protocol debugging sessions.
pub struct StderrDebugSink;

impl DebugSink for StderrDebugSink {
    fn on_line(&mut self, tag: DebugTag, bytes: &[u8], millis: u64) {
        eprintln!(
            "{} {} {}",
            tag.as_str(),
            millis,
            String::from_utf8_lossy(bytes)
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Capture(Vec<(DebugTag, Vec<u8>)>);

    impl DebugSink for Capture {
        fn on_line(&mut self, tag: DebugTag, bytes: &[u8], _millis: u64) {
            self.0.push((tag, bytes.to_vec()));
        }
    }

    #[test]
    fn sink_receives_tagged_lines() {
        let mut sink = Capture(Vec::new());
        sink.on_line(DebugTag::Tx, b"s select 1\n;", 0);
        assert_eq!(sink.0.len(), 1);
        assert_eq!(sink.0[0].0, DebugTag::Tx);
    }
}
