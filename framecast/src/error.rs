//! Error types for framecast

use framecast_proto::FrameError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that end a session or stop it from starting.
///
/// Per-frame failures (capture, codec, detection) never surface here; the
/// loops log them and move on to the next frame.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// Camera device could not be opened; no frame was sent
    #[error("could not open camera: {0}")]
    CameraOpen(String),

    #[error("could not connect to {addr}: {source} (is the server running?)")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}
