//! Server-to-client file download: a read-only stream over the block
//! framer with an optional CRLF transform.

use std::io::{Read, Write};

use mapi_common::err::MapiResult;

use crate::framer::BlockFramer;

/// Reads raw bytes from the framer until the underlying transport reports
/// a clean close, optionally rewriting `\n` to `\r\n` as it goes.
pub struct DownloadStream<T> {
    framer: BlockFramer<T>,
    crlf: bool,
    /// Raw bytes decoded from the current block, not yet delivered.
    current: Vec<u8>,
    pos: usize,
    /// True once a block with the "last" bit set has been fully consumed.
    done: bool,
    /// Set when a `\n` fell on the last byte delivered to the caller and
    /// its paired `\r` still needs to be emitted at the start of the next
    /// read.
    pending_cr: bool,
}

impl<T: Read + Write> DownloadStream<T> {
    pub fn new(framer: BlockFramer<T>, crlf: bool) -> Self {
        DownloadStream {
            framer,
            crlf,
            current: Vec::new(),
            pos: 0,
            done: false,
            pending_cr: false,
        }
    }

    /// Reads decoded bytes into `out`, returning the number written.
    /// `Ok(0)` means the transfer is complete.
    pub fn read(&mut self, out: &mut [u8]) -> MapiResult<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        if self.pending_cr {
            out[0] = b'\r';
            self.pending_cr = false;
            let n = 1 + self.fill_plain(&mut out[1..])?;
            return Ok(n);
        }

        self.fill_plain(out)
    }

    fn fill_plain(&mut self, out: &mut [u8]) -> MapiResult<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        if self.pos >= self.current.len() {
            if self.done {
                return Ok(0);
            }
            match self.framer.next_raw_block()? {
                None => {
                    self.done = true;
                    return Ok(0);
                }
                Some((payload, last)) => {
                    self.current = payload;
                    self.pos = 0;
                    if last {
                        self.done = true;
                    }
                    if self.current.is_empty() {
                        return Ok(0);
                    }
                }
            }
        }

        let available = &self.current[self.pos..];
        if !self.crlf {
            let n = available.len().min(out.len());
            out[..n].copy_from_slice(&available[..n]);
            self.pos += n;
            return Ok(n);
        }

        let mut written = 0;
        let mut i = 0;
        while i < available.len() && written < out.len() {
            let b = available[i];
            if b == b'\n' {
                if written + 1 < out.len() {
                    out[written] = b'\r';
                    written += 1;
                    out[written] = b'\n';
                    written += 1;
                } else {
                    // Exactly one slot left: emit the `\n` now and defer
                    // its paired `\r` to the start of the next read.
                    out[written] = b'\n';
                    written += 1;
                    self.pending_cr = true;
                }
            } else {
                out[written] = b;
                written += 1;
            }
            i += 1;
        }
        self.pos += i;
        Ok(written)
    }

    /// Drains any remaining blocks, acknowledges completion with a single
    /// `\n`, then flushes.
    pub fn close(mut self) -> MapiResult<()> {
        let mut sink = [0u8; 4096];
        while self.read(&mut sink)? > 0 {}
        self.framer.write(b"\n")?;
        self.framer.flush()?;
        Ok(())
    }
}
