//! framecast - stream camera frames over TCP and scan them for QR codes
//!
//! A [`Transmitter`] accepts exactly one peer and writes length-prefixed
//! JPEG frames to it. A [`Receiver`] reassembles frames from the socket,
//! decodes them, runs a [`QrScanner`] over each image and hands the
//! annotated image to a [`Display`].
//!
//! Camera, codec, QR detection and display are traits so the session loops
//! can be driven by real devices or by test doubles.

pub mod camera;
pub mod codec;
pub mod config;
pub mod display;
mod error;
pub mod qr;
mod receiver;
mod session;
mod shutdown;
mod transmitter;

pub use camera::{Camera, Capture, PatternCamera};
pub use codec::{CodecError, FrameCodec, JpegCodec};
pub use config::{ReceiverConfig, TransmitterConfig};
pub use display::{Display, DisplayControl, TerminalDisplay};
pub use error::{Error, Result};
pub use qr::{DetectError, Detection, Detector, Polygon, QrScanner, RawPoints, RqrrDetector};
pub use receiver::{FrameOutcome, ReceiveSummary, Receiver, process_frame};
pub use session::SessionEnd;
pub use shutdown::Shutdown;
pub use transmitter::{TransmitSummary, Transmitter};

pub use framecast_proto::{Disconnect, FrameError};
pub use image::RgbImage;
