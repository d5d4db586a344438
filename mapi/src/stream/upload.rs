//! Client-to-server file upload: chunked writes with server-initiated
//! cancellation.

use std::io::{Read, Write};

use mapi_common::err::mapi_error::MapiError;
use mapi_common::err::MapiResult;

use crate::consts::DEFAULT_UPLOAD_CHUNK_SIZE;
use crate::line::LineType;
use crate::reader::LineReader;

/// Writes bytes to the server in fixed-size chunks, each ended by a framer
/// flush and acknowledged by a `MORE` prompt. A `FILETRANSFER` prompt
/// arriving instead means the server cancelled the upload.
pub struct UploadStream<T> {
    reader: LineReader<T>,
    chunk_size: usize,
    buffer: Vec<u8>,
    cancelled: bool,
    on_cancel: Option<Box<dyn FnMut()>>,
}

impl<T: Read + Write> UploadStream<T> {
    pub fn new(reader: LineReader<T>) -> Self {
        UploadStream {
            reader,
            chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
            buffer: Vec::new(),
            cancelled: false,
            on_cancel: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn on_cancel(mut self, callback: impl FnMut() + 'static) -> Self {
        self.on_cancel = Some(Box::new(callback));
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn write(&mut self, data: &[u8]) -> MapiResult<()> {
        if self.cancelled {
            return Err(MapiError::Canceled("upload was cancelled by the server".into()));
        }
        self.buffer.extend_from_slice(data);
        while self.buffer.len() >= self.chunk_size {
            let chunk: Vec<u8> = self.buffer.drain(..self.chunk_size).collect();
            self.send_chunk(&chunk)?;
            if self.cancelled {
                return Err(MapiError::Canceled("upload was cancelled by the server".into()));
            }
        }
        Ok(())
    }

    fn send_chunk(&mut self, chunk: &[u8]) -> MapiResult<()> {
        self.reader.framer_mut().write(chunk)?;
        self.reader.framer_mut().flush()?;
        self.reader.reset_kind();
        self.reader.advance()?;
        match self.reader.kind() {
            LineType::More => Ok(()),
            LineType::FileTransfer => {
                self.cancelled = true;
                if let Some(cb) = self.on_cancel.as_mut() {
                    cb();
                }
                Ok(())
            }
            other => Err(MapiError::Protocol(format!(
                "expected MORE or FILETRANSFER after upload chunk, got {:?}",
                other
            ))),
        }
    }

    /// Flushes any remaining bytes, emits a zero-length final block, and
    /// requires the server's `FILETRANSFER` completion acknowledgement.
    pub fn close(mut self) -> MapiResult<()> {
        if self.cancelled {
            return Ok(());
        }
        if !self.buffer.is_empty() {
            let remaining = std::mem::take(&mut self.buffer);
            self.reader.framer_mut().write(&remaining)?;
        }
        self.reader.framer_mut().flush()?;

        self.reader.reset_kind();
        self.reader.advance()?;
        match self.reader.kind() {
            LineType::FileTransfer => Ok(()),
            other => Err(MapiError::Protocol(format!(
                "expected FILETRANSFER close acknowledgement, got {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::framer::BlockFramer;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::io;
    use std::rc::Rc;

    #[derive(Default)]
    struct Pipe {
        inbound: VecDeque<u8>,
        outbound: Vec<u8>,
    }

    impl Read for Pipe {
        fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
            let n = out.len().min(self.inbound.len());
            for slot in out.iter_mut().take(n) {
                *slot = self.inbound.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for Pipe {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.outbound.extend_from_slice(data);
            Ok(data.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn push_prompt_bytes(inbound: &mut VecDeque<u8>, sentinel: [u8; 2]) {
        // One block containing just the sentinel, marked final so the
        // framer's own synthesized prompt immediately follows it too.
        let payload = sentinel;
        let header = ((payload.len() as u16) << 1) | 1;
        inbound.extend(header.to_le_bytes());
        inbound.extend(payload);
    }

    #[test]
    fn small_write_stays_buffered_until_close() {
        let mut pipe = Pipe::default();
        push_prompt_bytes(&mut pipe.inbound, crate::consts::FILETRANSFER_SENTINEL);
        let framer = BlockFramer::new(pipe);
        let reader = LineReader::new(framer);
        let mut upload = UploadStream::new(reader).with_chunk_size(1024);
        upload.write(b"hello").unwrap();
        upload.close().unwrap();
    }

    #[test]
    fn cancellation_marks_stream_and_fires_callback_once() {
        let mut pipe = Pipe::default();
        push_prompt_bytes(&mut pipe.inbound, crate::consts::FILETRANSFER_SENTINEL);
        let framer = BlockFramer::new(pipe);
        let reader = LineReader::new(framer);

        let fired = Rc::new(Cell::new(0));
        let fired_clone = fired.clone();
        let mut upload = UploadStream::new(reader)
            .with_chunk_size(4)
            .on_cancel(move || fired_clone.set(fired_clone.get() + 1));

        upload.write(b"abcd").unwrap_err();
        assert!(upload.is_cancelled());
        assert_eq!(fired.get(), 1);

        let err = upload.write(b"more").unwrap_err();
        assert!(matches!(err, MapiError::Canceled(_)));
        assert_eq!(fired.get(), 1);
    }
}
