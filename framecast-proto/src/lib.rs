//! framecast wire protocol - length-prefixed framing
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┐
//! │ Length (4 bytes) │ Payload (Length bytes)   │
//! │ Big-endian u32   │ opaque compressed image  │
//! └──────────────────┴──────────────────────────┘
//! ```
//!
//! Frames repeat back to back until the connection closes. There is no
//! handshake, version negotiation or heartbeat.
//!
//! Both ends use the same fixed 4-byte header. A header value of `0` is a
//! valid, empty frame. Header values above the reader's `max_payload` are
//! rejected with [`FrameError::TooLarge`] before any payload byte is
//! buffered, and the stream must be dropped: the reader cannot resynchronize.

use std::io::{self, Write};

mod assembler;
mod reader;

pub use assembler::{AssemblyState, FrameAssembler};
pub use bytes::Bytes;
pub use reader::{FrameReader, ReadEvent};

/// Size of the length prefix in bytes
pub const HEADER_SIZE: usize = 4;

/// Largest payload a reader accepts unless configured otherwise (8 MiB)
pub const DEFAULT_MAX_PAYLOAD: usize = 8 * 1024 * 1024;

/// Upper bound for a single socket read
pub const READ_CHUNK: usize = 4096;

/// Errors raised while framing or reassembling a stream
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Header announced more bytes than this end accepts
    #[error("frame too large: {len} bytes (max {max})")]
    TooLarge { len: usize, max: usize },
}

/// How a stream ended, as seen by the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    /// Peer closed between frames. `partial_header` counts header bytes that
    /// were buffered but never completed; they are dropped.
    Clean { partial_header: usize },
    /// Peer closed after a header was committed but before the whole payload
    /// arrived. The stream was desynchronized at this point.
    Truncated { expected: usize, received: usize },
}

impl Disconnect {
    pub fn is_clean(&self) -> bool {
        matches!(self, Disconnect::Clean { .. })
    }
}

/// Encode a payload length as a header
pub fn encode_header(len: usize) -> Result<[u8; HEADER_SIZE], FrameError> {
    let len32 = u32::try_from(len).map_err(|_| FrameError::TooLarge {
        len,
        max: u32::MAX as usize,
    })?;
    Ok(len32.to_be_bytes())
}

/// Decode a header into the payload length it announces
pub fn decode_header(header: [u8; HEADER_SIZE]) -> usize {
    u32::from_be_bytes(header) as usize
}

/// Write `header ++ payload` into `buf`, replacing its contents.
///
/// The buffer is reused across frames so a sender allocates once.
pub fn encode_frame_into(payload: &[u8], buf: &mut Vec<u8>) -> Result<(), FrameError> {
    let header = encode_header(payload.len())?;
    buf.clear();
    buf.reserve(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header);
    buf.extend_from_slice(payload);
    Ok(())
}

/// Write one frame as a single logical write
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError> {
    let mut buf = Vec::new();
    encode_frame_into(payload, &mut buf)?;
    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}

/// Async frame operations for tokio (`async` feature, on by default).
///
/// The `framecast` binary uses blocking sockets and builds without this
/// feature; the module is for tokio-based peers speaking the same wire
/// format.
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), framecast_proto::FrameError> {
/// use framecast_proto::async_io::{AsyncFrameReader, write_frame};
/// use framecast_proto::{Disconnect, ReadEvent};
///
/// let (mut tx, rx) = tokio::io::duplex(16);
/// tokio::spawn(async move { write_frame(&mut tx, b"jpeg bytes").await });
///
/// let mut reader = AsyncFrameReader::new(rx);
/// match reader.read_event().await? {
///     ReadEvent::Frame(payload) => assert_eq!(&payload[..], b"jpeg bytes"),
///     other => panic!("expected a frame, got {other:?}"),
/// }
/// assert!(matches!(
///     reader.read_event().await?,
///     ReadEvent::Closed(Disconnect::Clean { partial_header: 0 })
/// ));
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "async")]
pub mod async_io {
    use super::*;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    pub async fn write_frame<W: AsyncWrite + Unpin>(
        writer: &mut W,
        payload: &[u8],
    ) -> Result<(), FrameError> {
        let mut buf = Vec::new();
        encode_frame_into(payload, &mut buf)?;
        writer.write_all(&buf).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Async counterpart of [`FrameReader`], sharing the same assembler.
    ///
    /// Tokio readers have no read timeout, so this never yields
    /// [`ReadEvent::Idle`]; wrap calls in `tokio::time::timeout` instead.
    pub struct AsyncFrameReader<R> {
        reader: R,
        assembler: FrameAssembler,
        chunk: Box<[u8]>,
    }

    impl<R: AsyncRead + Unpin> AsyncFrameReader<R> {
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

        pub async fn read_event(&mut self) -> Result<ReadEvent, FrameError> {
            loop {
                if let Some(payload) = self.assembler.next_frame()? {
                    return Ok(ReadEvent::Frame(payload));
                }
                let n = self.reader.read(&mut self.chunk).await?;
                if n == 0 {
                    return Ok(ReadEvent::Closed(self.assembler.close()));
                }
                self.assembler.extend(&self.chunk[..n]);
            }
        }

        pub fn assembler(&self) -> &FrameAssembler {
            &self.assembler
        }
    }

}
