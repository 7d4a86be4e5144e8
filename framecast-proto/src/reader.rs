//! Blocking frame reader over any `Read`

use std::io::{ErrorKind, Read};

use bytes::Bytes;

use crate::{Disconnect, FrameAssembler, FrameError, READ_CHUNK};

/// What one call to [`FrameReader::read_event`] produced
#[derive(Debug)]
pub enum ReadEvent {
    /// A complete payload
    Frame(Bytes),
    /// The peer closed the stream (read returned zero bytes)
    Closed(Disconnect),
    /// The read timed out before a frame completed; buffered bytes are kept
    Idle,
}

/// Reads frames from a byte stream using bounded reads of at most
/// [`READ_CHUNK`] bytes.
pub struct FrameReader<R> {
    reader: R,
    assembler: FrameAssembler,
    chunk: Box<[u8]>,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_assembler(reader, FrameAssembler::new())
    }

    pub fn with_assembler(reader: R, assembler: FrameAssembler) -> Self {
        Self {
            reader,
            assembler,
            chunk: vec![0u8; READ_CHUNK].into_boxed_slice(),
        }
    }

    /// Read until a frame completes, the peer closes, or the read times out.
    ///
    /// Frames already buffered are returned without touching the reader.
    /// `WouldBlock`/`TimedOut` map to [`ReadEvent::Idle`]; `Interrupted` is
    /// retried; any other I/O error is returned.
    pub fn read_event(&mut self) -> Result<ReadEvent, FrameError> {
        loop {
            if let Some(payload) = self.assembler.next_frame()? {
                return Ok(ReadEvent::Frame(payload));
            }

            match self.reader.read(&mut self.chunk) {
                Ok(0) => return Ok(ReadEvent::Closed(self.assembler.close())),
                Ok(n) => self.assembler.extend(&self.chunk[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(ReadEvent::Idle);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn assembler(&self) -> &FrameAssembler {
        &self.assembler
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }
}
