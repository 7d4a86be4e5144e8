//! Frame reassembly over an accumulation buffer.
//!
//! Socket reads arrive in arbitrary pieces. The assembler appends them to a
//! single `BytesMut` and walks a two-state machine:
//!
//! - `AwaitingHeader`: need `HEADER_SIZE` bytes
//! - `AwaitingPayload { len }`: header consumed, need `len` more bytes
//!
//! Bytes are consumed strictly from the front, in arrival order, and only
//! once. Whatever follows the current frame (the next header, or part of
//! it) stays in the buffer for the next call.

use bytes::{Buf, Bytes, BytesMut};

use crate::{DEFAULT_MAX_PAYLOAD, Disconnect, FrameError, HEADER_SIZE, decode_header};

/// Where the assembler is in the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    AwaitingHeader,
    AwaitingPayload { len: usize },
}

pub struct FrameAssembler {
    buffer: BytesMut,
    state: AssemblyState,
    max_payload: usize,
    received: u64,
    consumed: u64,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: AssemblyState::AwaitingHeader,
            max_payload,
            received: 0,
            consumed: 0,
        }
    }

    /// Append bytes from one read
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        self.received += data.len() as u64;
    }

    /// Advance the state machine and emit at most one payload.
    ///
    /// Returns `Ok(None)` when more bytes are needed. A zero-length header
    /// yields an empty payload immediately. On `TooLarge` the offending
    /// header is left in the buffer and the stream must be abandoned.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, FrameError> {
        loop {
            match self.state {
                AssemblyState::AwaitingHeader => {
                    if self.buffer.len() < HEADER_SIZE {
                        return Ok(None);
                    }

                    let mut header = [0u8; HEADER_SIZE];
                    header.copy_from_slice(&self.buffer[..HEADER_SIZE]);
                    let len = decode_header(header);

                    if len > self.max_payload {
                        return Err(FrameError::TooLarge {
                            len,
                            max: self.max_payload,
                        });
                    }

                    self.buffer.advance(HEADER_SIZE);
                    self.consumed += HEADER_SIZE as u64;
                    self.state = AssemblyState::AwaitingPayload { len };

                    // grow once for the whole payload instead of per read
                    if self.buffer.len() < len {
                        self.buffer.reserve(len - self.buffer.len());
                    }
                }
                AssemblyState::AwaitingPayload { len } => {
                    if self.buffer.len() < len {
                        return Ok(None);
                    }

                    let payload = self.buffer.split_to(len).freeze();
                    self.consumed += len as u64;
                    self.state = AssemblyState::AwaitingHeader;
                    return Ok(Some(payload));
                }
            }
        }
    }

    /// Classify an end of stream at the current position
    pub fn close(&self) -> Disconnect {
        match self.state {
            AssemblyState::AwaitingHeader => Disconnect::Clean {
                partial_header: self.buffer.len(),
            },
            AssemblyState::AwaitingPayload { len } => Disconnect::Truncated {
                expected: len,
                received: self.buffer.len(),
            },
        }
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    /// Bytes received but not yet consumed
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes ever appended
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Total bytes consumed as headers or payloads
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameAssembler")
            .field("state", &self.state)
            .field("buffered", &self.buffer.len())
            .field("max_payload", &self.max_payload)
            .finish()
    }
}
