//! The buffered, line-oriented reader sitting above the block framer.

use std::io::{Read, Write};

use mapi_common::err::MapiResult;

use crate::debug::{DebugSink, DebugTag};
use crate::framer::BlockFramer;
use crate::line::{Line, LineType};

/// Reads one line at a time from a `BlockFramer`, classifying each as it
/// arrives. `advance` is a no-op once the current line is a PROMPT; callers
/// must `reset_kind` before issuing a new command.
pub struct LineReader<T> {
    framer: BlockFramer<T>,
    scratch: Vec<u8>,
    current: Option<Line>,
    armed: bool,
}

impl<T: Read + Write> LineReader<T> {
    pub fn new(framer: BlockFramer<T>) -> Self {
        LineReader {
            framer,
            scratch: Vec::with_capacity(256),
            current: None,
            armed: true,
        }
    }

    pub fn framer_mut(&mut self) -> &mut BlockFramer<T> {
        &mut self.framer
    }

    pub fn into_framer(self) -> BlockFramer<T> {
        self.framer
    }

    pub fn kind(&self) -> LineType {
        self.current.as_ref().map(|l| l.kind()).unwrap_or(LineType::Unknown)
    }

    pub fn line(&self) -> &[u8] {
        self.current.as_ref().map(|l| l.bytes()).unwrap_or(&[])
    }

    /// Re-arms the reader for a fresh response cycle, clearing the "already
    /// saw PROMPT" latch.
    pub fn reset_kind(&mut self) {
        self.armed = true;
        self.current = None;
    }

    /// Reads the next line from the framer, unless the current line is
    /// already PROMPT and `reset_kind` has not been called since.
    pub fn advance(&mut self) -> MapiResult<()> {
        self.advance_with_sink(None)
    }

    pub fn advance_with_sink(&mut self, mut sink: Option<&mut dyn DebugSink>) -> MapiResult<()> {
        if !self.armed {
            return Ok(());
        }

        self.scratch.clear();
        let mut byte = [0u8; 1];
        loop {
            let n = self.framer.read_with_sink(&mut byte, sink.as_deref_mut())?;
            if n == 0 {
                break;
            }
            if byte[0] == b'\n' {
                break;
            }
            self.scratch.push(byte[0]);
        }

        let line = Line::from_raw(&self.scratch);
        if let Some(sink) = sink {
            sink.on_line(DebugTag::Rd, line.bytes(), 0);
        }
        if line.kind() == LineType::Prompt {
            self.armed = false;
        }
        self.current = Some(line);
        Ok(())
    }

    pub fn close(&mut self) -> MapiResult<()> {
        self.framer.close()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    #[derive(Default)]
    struct Pipe {
        buf: VecDeque<u8>,
    }

    impl Read for Pipe {
        fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
            let n = out.len().min(self.buf.len());
            for slot in out.iter_mut().take(n) {
                *slot = self.buf.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for Pipe {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.buf.extend(data);
            Ok(data.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn reader_over(lines: &[&[u8]]) -> LineReader<Pipe> {
        let mut framer = BlockFramer::new(Pipe::default());
        for (i, line) in lines.iter().enumerate() {
            framer.write(line).unwrap();
            if i + 1 == lines.len() {
                framer.flush().unwrap();
            } else {
                framer.write(b"\n").unwrap();
            }
        }
        LineReader::new(framer)
    }

    #[test]
    fn advance_stops_once_prompt_seen() {
        let mut reader = reader_over(&[b"#info line"]);
        reader.advance().unwrap();
        assert_eq!(reader.kind(), LineType::Info);
        reader.advance().unwrap();
        assert_eq!(reader.kind(), LineType::Prompt);
        // A second advance without reset_kind is a no-op.
        reader.advance().unwrap();
        assert_eq!(reader.kind(), LineType::Prompt);
    }

    #[test]
    fn reset_kind_rearms_for_next_cycle() {
        let mut reader = reader_over(&[b"#info line"]);
        reader.advance().unwrap();
        reader.advance().unwrap();
        assert_eq!(reader.kind(), LineType::Prompt);
        reader.reset_kind();
        assert_eq!(reader.kind(), LineType::Unknown);
    }
}
