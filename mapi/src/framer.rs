//! The block framer: chunks a byte transport into length-delimited
//! MAPI blocks and synthesizes a prompt at each logical-message boundary.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::TcpStream;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use native_tls::TlsStream;

use mapi_common::err::mapi_error::MapiError;
use mapi_common::err::MapiResult;

use crate::consts::{BLOCK_HEADER_SIZE, BLOCK_SIZE, PROMPT_SENTINEL};
use crate::debug::{DebugSink, DebugTag};

/// The underlying transport, plain or TLS-wrapped. Mirrors the
/// teacher's `ChannelStream` split between `Tcp`/`Tls` variants.
pub enum Transport {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tcp(s) => write!(f, "Transport::Tcp({:?})", s),
            Transport::Tls(_) => write!(f, "Transport::Tls(..)"),
            #[cfg(unix)]
            Transport::Unix(s) => write!(f, "Transport::Unix({:?})", s),
        }
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(s) => s.read(buf),
            Transport::Tls(s) => s.read(buf),
            #[cfg(unix)]
            Transport::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(s) => s.write(buf),
            Transport::Tls(s) => s.write(buf),
            #[cfg(unix)]
            Transport::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Transport::Tcp(s) => s.flush(),
            Transport::Tls(s) => s.flush(),
            #[cfg(unix)]
            Transport::Unix(s) => s.flush(),
        }
    }
}

/// Wraps a raw bidirectional transport and speaks the MAPI block protocol
/// over it. Generic over the transport so
/// tests can loop it back over an in-memory pipe instead of a real socket.
#[derive(Debug)]
pub struct BlockFramer<T> {
    transport: T,

    /// Outgoing bytes not yet flushed as a block.
    out_buf: Vec<u8>,

    /// Decoded bytes from the current block (plus any synthesized trailer)
    /// not yet delivered to the caller.
    in_buf: Vec<u8>,
    in_pos: usize,

    closed: bool,
}

impl<T: Read + Write> BlockFramer<T> {
    pub fn new(transport: T) -> Self {
        BlockFramer {
            transport,
            out_buf: Vec::with_capacity(BLOCK_SIZE),
            in_buf: Vec::new(),
            in_pos: 0,
            closed: false,
        }
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Reads up to `buf.len()` decoded bytes. Returns `Ok(0)` only on a
    /// clean close observed before any header byte was read.
    pub fn read(&mut self, buf: &mut [u8]) -> MapiResult<usize> {
        self.read_with_sink(buf, None)
    }

    /// Same as `read`, tagging the raw payload of each block actually
    /// pulled off the transport as `DebugTag::Rx` when a sink is given.
    pub fn read_with_sink(&mut self, buf: &mut [u8], sink: Option<&mut dyn DebugSink>) -> MapiResult<usize> {
        if self.in_pos >= self.in_buf.len() && !self.fill_with_sink(sink)? {
            return Ok(0);
        }
        let available = &self.in_buf[self.in_pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.in_pos += n;
        Ok(n)
    }

    /// Refills `in_buf` with the next block's payload (plus the synthesized
    /// trailer when it is the final block of a logical message). Returns
    /// `false` on a clean close before any header byte was read.
    fn fill_with_sink(&mut self, sink: Option<&mut dyn DebugSink>) -> MapiResult<bool> {
        self.in_buf.clear();
        self.in_pos = 0;

        let (payload, last) = match self.next_raw_block()? {
            None => {
                self.closed = true;
                return Ok(false);
            }
            Some(block) => block,
        };

        if let Some(sink) = sink {
            sink.on_line(DebugTag::Rx, &payload, 0);
        }

        self.in_buf = payload;
        if last {
            if self.in_buf.last() != Some(&b'\n') {
                self.in_buf.push(b'\n');
            }
            self.in_buf.extend_from_slice(&PROMPT_SENTINEL);
            self.in_buf.push(b'\n');
        }
        Ok(true)
    }

    /// Reads one raw block's header and payload with no line-protocol
    /// trailer synthesis: `(payload, is_last)`, or `None` on a clean close
    /// before any header byte was read. Used directly by file-transfer
    /// streams, which carry binary data rather than prompt-terminated
    /// lines.
    pub(crate) fn next_raw_block(&mut self) -> MapiResult<Option<(Vec<u8>, bool)>> {
        let mut header = [0u8; BLOCK_HEADER_SIZE];
        match read_fully_or_eof(&mut self.transport, &mut header)? {
            ReadOutcome::Eof => return Ok(None),
            ReadOutcome::Partial => {
                return Err(MapiError::Protocol(
                    "connection closed mid block header".into(),
                ));
            }
            ReadOutcome::Full => {}
        }

        let value = (&header[..])
            .read_u16::<LittleEndian>()
            .map_err(|e| MapiError::Protocol(format!("malformed block header: {}", e)))?;
        let len = (value >> 1) as usize;
        let last = value & 1 == 1;

        if len > BLOCK_SIZE {
            return Err(MapiError::Protocol(format!(
                "block length {} exceeds maximum {}",
                len, BLOCK_SIZE
            )));
        }

        let mut payload = vec![0u8; len];
        if len > 0 {
            match read_fully_or_eof(&mut self.transport, &mut payload)? {
                ReadOutcome::Full => {}
                _ => return Err(MapiError::Protocol("incomplete block".into())),
            }
        }

        Ok(Some((payload, last)))
    }

    /// Buffers bytes for the next outgoing block, flushing non-final blocks
    /// as `out_buf` fills to `BLOCK_SIZE`.
    pub fn write(&mut self, buf: &[u8]) -> MapiResult<()> {
        self.write_with_sink(buf, None)
    }

    /// Same as `write`, tagging `buf` as `DebugTag::Tx` when a sink is given.
    pub fn write_with_sink(&mut self, buf: &[u8], sink: Option<&mut dyn DebugSink>) -> MapiResult<()> {
        if let Some(sink) = sink {
            sink.on_line(DebugTag::Tx, buf, 0);
        }
        let mut offset = 0;
        while offset < buf.len() {
            let room = BLOCK_SIZE - self.out_buf.len();
            let take = room.min(buf.len() - offset);
            self.out_buf.extend_from_slice(&buf[offset..offset + take]);
            offset += take;
            if self.out_buf.len() == BLOCK_SIZE {
                self.emit_block(false)?;
            }
        }
        Ok(())
    }

    /// Emits a final block (possibly empty) and flushes the transport,
    /// ending the current logical message.
    pub fn flush(&mut self) -> MapiResult<()> {
        self.emit_block(true)?;
        self.transport.flush()?;
        Ok(())
    }

    fn emit_block(&mut self, last: bool) -> MapiResult<()> {
        let payload = std::mem::take(&mut self.out_buf);
        let header_value = ((payload.len() as u16) << 1) | (last as u16);
        let mut header = [0u8; BLOCK_HEADER_SIZE];
        (&mut header[..]).write_u16::<LittleEndian>(header_value)?;
        self.transport.write_all(&header)?;
        self.transport.write_all(&payload)?;
        Ok(())
    }

    pub fn close(&mut self) -> MapiResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let _ = self.transport.flush();
        Ok(())
    }
}

/// The framer as used over a real connection.
pub type Framer = BlockFramer<Transport>;

enum ReadOutcome {
    Full,
    Partial,
    Eof,
}

/// Loops a short read to completion; distinguishes "EOF before any byte"
/// (clean close) from "EOF mid-read" (fatal).
fn read_fully_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> MapiResult<ReadOutcome> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => {
                return Ok(if total == 0 {
                    ReadOutcome::Eof
                } else {
                    ReadOutcome::Partial
                });
            }
            Ok(n) => total += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(MapiError::Io(e)),
        }
    }
    Ok(ReadOutcome::Full)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::VecDeque;

    /// A single-buffer pipe: what the framer writes becomes what it next
    /// reads back, letting a loopback test drive one `BlockFramer` through
    /// a full write/flush/read cycle without a real socket.
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

    fn read_all(framer: &mut BlockFramer<Pipe>) -> Vec<u8> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 64];
        loop {
            let n = framer.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }
        out
    }

    #[test]
    fn round_trip_synthesizes_newline_and_prompt() {
        let mut framer = BlockFramer::new(Pipe::default());
        framer.write(b"select 1").unwrap();
        framer.flush().unwrap();

        let out = read_all(&mut framer);
        let mut expected = b"select 1\n".to_vec();
        expected.extend_from_slice(&PROMPT_SENTINEL);
        expected.push(b'\n');
        assert_eq!(out, expected);
    }

    #[test]
    fn round_trip_preserves_existing_trailing_newline() {
        let mut framer = BlockFramer::new(Pipe::default());
        framer.write(b"select 1\n").unwrap();
        framer.flush().unwrap();

        let out = read_all(&mut framer);
        let mut expected = b"select 1\n".to_vec();
        expected.extend_from_slice(&PROMPT_SENTINEL);
        expected.push(b'\n');
        assert_eq!(out, expected);
    }

    #[test]
    fn chunking_across_multiple_writes_round_trips() {
        let mut framer = BlockFramer::new(Pipe::default());
        for chunk in [b"sel".as_slice(), b"ect ".as_slice(), b"1".as_slice()] {
            framer.write(chunk).unwrap();
        }
        framer.flush().unwrap();

        let out = read_all(&mut framer);
        assert!(out.starts_with(b"select 1\n"));
    }

    #[test]
    fn oversized_block_header_is_fatal() {
        let mut pipe = Pipe::default();
        // length field of BLOCK_SIZE + 1, last bit set
        let bogus_len = (BLOCK_SIZE as u16 + 1) << 1 | 1;
        pipe.buf.extend(bogus_len.to_le_bytes());
        let mut framer = BlockFramer::new(pipe);
        let mut buf = [0u8; 16];
        let err = framer.read(&mut buf).unwrap_err();
        assert!(matches!(err, MapiError::Protocol(_)));
    }

    #[test]
    fn clean_eof_before_any_header_byte_is_not_an_error() {
        let mut framer = BlockFramer::new(Pipe::default());
        let mut buf = [0u8; 16];
        assert_eq!(framer.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn eof_mid_header_is_fatal() {
        let mut pipe = Pipe::default();
        pipe.buf.push_back(0x42); // one stray header byte, then nothing
        let mut framer = BlockFramer::new(pipe);
        let mut buf = [0u8; 16];
        let err = framer.read(&mut buf).unwrap_err();
        assert!(matches!(err, MapiError::Protocol(_)));
    }
}
