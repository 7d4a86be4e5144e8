//! Why a session loop stopped

use std::io;

/// Reasons a transmit or receive loop ends once its session is running.
///
/// Only setup (bind, connect, camera open) is reported as an `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Peer closed the stream between frames
    PeerClosed,
    /// Peer went away mid-write or mid-read (reset, broken pipe)
    PeerGone,
    /// Peer closed after a header but before its payload completed
    Truncated { expected: usize, received: usize },
    /// Camera reported end of stream
    EndOfStream,
    /// Interrupt signal
    Interrupted,
    /// User pressed the quit key
    Quit,
    /// Peer announced a frame above the size limit; the stream cannot resync
    Oversized { len: usize, max: usize },
    /// Socket or terminal I/O failed mid-session
    Failed(io::ErrorKind),
}

impl SessionEnd {
    /// Endings that are worth an error log but still end the session normally
    pub fn is_failure(&self) -> bool {
        matches!(self, SessionEnd::Oversized { .. } | SessionEnd::Failed(_))
    }
}

/// I/O errors that mean the other end is gone rather than something broke here
pub(crate) fn is_peer_gone(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}
