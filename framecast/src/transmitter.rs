//! Sending side: accept one peer and stream frames to it

use std::io::{ErrorKind, Write};
use std::net::{self, SocketAddr, TcpListener, TcpStream};
use std::thread;

use framecast_proto::encode_frame_into;

use crate::camera::{Camera, Capture};
use crate::codec::FrameCodec;
use crate::config::{ACCEPT_POLL, TransmitterConfig};
use crate::session::{SessionEnd, is_peer_gone};
use crate::shutdown::Shutdown;

/// Totals for one transmit session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitSummary {
    pub frames_sent: u64,
    pub frames_skipped: u64,
    /// Header and payload bytes written
    pub bytes_sent: u64,
    pub end: SessionEnd,
}

/// Single-peer frame server.
///
/// Serves exactly one connection per run and does not listen again once the
/// peer goes away.
pub struct Transmitter {
    listener: TcpListener,
    config: TransmitterConfig,
}

impl Transmitter {
    /// Bind the listening socket. `std` sets `SO_REUSEADDR` on Unix, so a
    /// quick restart does not trip over `TIME_WAIT`.
    pub fn bind(config: TransmitterConfig) -> crate::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr)?;
        listener.set_nonblocking(true)?;
        log::info!("Server listening on {}", listener.local_addr()?);
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> crate::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn config(&self) -> &TransmitterConfig {
        &self.config
    }

    /// Wait for a peer, open the camera, and send frames until the camera
    /// runs dry, the peer leaves, or shutdown is requested.
    ///
    /// The camera is only opened once a peer is connected; if opening fails
    /// the connection is dropped without sending anything.
    pub fn run<C, F, K>(
        self,
        open_camera: F,
        codec: &mut K,
        shutdown: &Shutdown,
    ) -> crate::Result<TransmitSummary>
    where
        C: Camera,
        F: FnOnce() -> crate::Result<C>,
        K: FrameCodec,
    {
        let Some((mut stream, peer)) = self.accept(shutdown)? else {
            log::info!("Shutdown requested before a client connected");
            return Ok(TransmitSummary {
                frames_sent: 0,
                frames_skipped: 0,
                bytes_sent: 0,
                end: SessionEnd::Interrupted,
            });
        };
        log::info!("Connected by {peer}");

        let mut camera = open_camera()?;
        let summary = send_frames(
            &mut stream,
            &mut camera,
            codec,
            shutdown,
            self.config.max_payload,
        );

        // Peer may already be gone
        let _ = stream.shutdown(net::Shutdown::Both);

        log::info!(
            "Transmit session ended ({:?}): {} frames sent, {} bytes, {} skipped",
            summary.end,
            summary.frames_sent,
            summary.bytes_sent,
            summary.frames_skipped
        );
        Ok(summary)
    }

    /// Poll the non-blocking listener so the shutdown flag is honoured while
    /// nobody is connecting. `None` means shutdown was requested.
    fn accept(&self, shutdown: &Shutdown) -> crate::Result<Option<(TcpStream, SocketAddr)>> {
        loop {
            if shutdown.requested() {
                return Ok(None);
            }
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    stream.set_nonblocking(false)?;
                    if let Err(e) = stream.set_nodelay(true) {
                        log::warn!("Failed to set TCP_NODELAY for {addr}: {e}");
                    }
                    return Ok(Some((stream, addr)));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Capture, encode and write frames to `writer` until the session ends.
///
/// Capture and encode failures skip the frame. Each frame goes out as one
/// `write_all` of header and payload, so a skipped frame never leaves a
/// partial write behind. A failed write ends the session; it is not an
/// error.
fn send_frames<W, C, K>(
    writer: &mut W,
    camera: &mut C,
    codec: &mut K,
    shutdown: &Shutdown,
    max_payload: usize,
) -> TransmitSummary
where
    W: Write,
    C: Camera,
    K: FrameCodec,
{
    let mut frames_sent = 0u64;
    let mut frames_skipped = 0u64;
    let mut bytes_sent = 0u64;
    let mut frame = Vec::with_capacity(64 * 1024);

    let end = loop {
        if shutdown.requested() {
            break SessionEnd::Interrupted;
        }

        let image = match camera.capture() {
            Capture::Frame(image) => image,
            Capture::Skip(reason) => {
                log::warn!("Failed to grab frame: {reason}");
                frames_skipped += 1;
                continue;
            }
            Capture::EndOfStream => {
                log::info!("Camera reported end of stream");
                break SessionEnd::EndOfStream;
            }
        };

        let payload = match codec.encode(&image) {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("Skipping frame: {e}");
                frames_skipped += 1;
                continue;
            }
        };
        if payload.len() > max_payload {
            log::warn!(
                "Skipping frame: {} bytes exceeds limit of {max_payload}",
                payload.len()
            );
            frames_skipped += 1;
            continue;
        }

        if let Err(e) = encode_frame_into(&payload, &mut frame) {
            log::warn!("Skipping frame: {e}");
            frames_skipped += 1;
            continue;
        }
        match writer.write_all(&frame) {
            Ok(()) => {
                frames_sent += 1;
                bytes_sent += frame.len() as u64;
                log::debug!("Sent frame {frames_sent} ({} bytes)", payload.len());
            }
            Err(e) if is_peer_gone(&e) => {
                log::info!("Client disconnected: {e}");
                break SessionEnd::PeerGone;
            }
            Err(e) => {
                log::error!("Write failed: {e}");
                break SessionEnd::Failed(e.kind());
            }
        }
    };

    TransmitSummary {
        frames_sent,
        frames_skipped,
        bytes_sent,
        end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecError;
    use crate::error::Error;
    use framecast_proto::{FrameReader, ReadEvent};
    use image::RgbImage;
    use std::collections::VecDeque;
    use std::io::{self, Cursor, Read};

    /// Replays a fixed capture script, then reports end of stream
    struct ScriptedCamera(VecDeque<Capture>);

    impl ScriptedCamera {
        fn new(script: Vec<Capture>) -> Self {
            Self(script.into())
        }
    }

    impl Camera for ScriptedCamera {
        fn capture(&mut self) -> Capture {
            self.0.pop_front().unwrap_or(Capture::EndOfStream)
        }
    }

    /// Payload is `width` copies of the width byte; width 2 fails to encode
    struct WidthCodec;

    impl FrameCodec for WidthCodec {
        fn encode(&mut self, image: &RgbImage) -> Result<Vec<u8>, CodecError> {
            match image.width() {
                2 => Err(CodecError::Encode("scripted failure".to_string())),
                w => Ok(vec![w as u8; w as usize]),
            }
        }

        fn decode(&mut self, _payload: &[u8]) -> Result<RgbImage, CodecError> {
            unreachable!("sender never decodes")
        }
    }

    /// Accepts `budget` writes, then fails every write with `kind`
    struct FailingWriter {
        budget: usize,
        kind: ErrorKind,
        written: Vec<u8>,
    }

    impl Write for FailingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(self.kind, "scripted"));
            }
            self.budget -= 1;
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn frame(width: u32) -> Capture {
        Capture::Frame(RgbImage::new(width, 1))
    }

    fn payloads(bytes: Vec<u8>) -> Vec<Vec<u8>> {
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let mut out = Vec::new();
        loop {
            match reader.read_event().unwrap() {
                ReadEvent::Frame(p) => out.push(p.to_vec()),
                ReadEvent::Closed(end) => {
                    assert!(end.is_clean());
                    return out;
                }
                ReadEvent::Idle => unreachable!(),
            }
        }
    }

    #[test]
    fn failed_captures_and_encodes_are_skipped() {
        let mut camera = ScriptedCamera::new(vec![
            frame(3),
            Capture::Skip("device busy".to_string()),
            frame(2),
            frame(5),
        ]);
        let mut out = Vec::new();

        let summary = send_frames(&mut out, &mut camera, &mut WidthCodec, &Shutdown::new(), 1024);

        assert_eq!(summary.end, SessionEnd::EndOfStream);
        assert_eq!(summary.frames_sent, 2);
        assert_eq!(summary.frames_skipped, 2);
        assert_eq!(summary.bytes_sent, out.len() as u64);
        assert_eq!(payloads(out), vec![vec![3u8; 3], vec![5u8; 5]]);
    }

    #[test]
    fn oversized_payloads_are_not_sent() {
        let mut camera = ScriptedCamera::new(vec![frame(200), frame(4)]);
        let mut out = Vec::new();

        let summary = send_frames(&mut out, &mut camera, &mut WidthCodec, &Shutdown::new(), 100);

        assert_eq!(summary.frames_sent, 1);
        assert_eq!(summary.frames_skipped, 1);
        assert_eq!(payloads(out), vec![vec![4u8; 4]]);
    }

    #[test]
    fn broken_pipe_ends_cleanly() {
        let mut camera = ScriptedCamera::new(vec![frame(3), frame(3), frame(3)]);
        let mut out = FailingWriter {
            budget: 1,
            kind: ErrorKind::BrokenPipe,
            written: Vec::new(),
        };

        let summary = send_frames(&mut out, &mut camera, &mut WidthCodec, &Shutdown::new(), 1024);

        assert_eq!(summary.end, SessionEnd::PeerGone);
        assert_eq!(summary.frames_sent, 1);
        assert_eq!(out.written, vec![0, 0, 0, 3, 3, 3, 3]);
    }

    #[test]
    fn other_write_errors_end_the_session() {
        let mut camera = ScriptedCamera::new(vec![frame(3), frame(3)]);
        let mut out = FailingWriter {
            budget: 0,
            kind: ErrorKind::PermissionDenied,
            written: Vec::new(),
        };

        let summary = send_frames(&mut out, &mut camera, &mut WidthCodec, &Shutdown::new(), 1024);
        assert_eq!(summary.end, SessionEnd::Failed(ErrorKind::PermissionDenied));
        assert!(summary.end.is_failure());
        assert_eq!(summary.frames_sent, 0);
    }

    #[test]
    fn shutdown_stops_before_capture() {
        let shutdown = Shutdown::new();
        shutdown.request();
        let mut camera = ScriptedCamera::new(vec![frame(3)]);
        let mut out = Vec::new();

        let summary = send_frames(&mut out, &mut camera, &mut WidthCodec, &shutdown, 1024);
        assert_eq!(summary.end, SessionEnd::Interrupted);
        assert!(out.is_empty());
    }

    fn loopback() -> Transmitter {
        let config = TransmitterConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..TransmitterConfig::default()
        };
        Transmitter::bind(config).unwrap()
    }

    #[test]
    fn shutdown_before_accept_returns() {
        let transmitter = loopback();
        let shutdown = Shutdown::new();
        shutdown.request();

        let summary = transmitter
            .run(
                || -> crate::Result<ScriptedCamera> { panic!("camera opened without a peer") },
                &mut WidthCodec,
                &shutdown,
            )
            .unwrap();
        assert_eq!(summary.end, SessionEnd::Interrupted);
    }

    #[test]
    fn camera_open_failure_sends_nothing() {
        let transmitter = loopback();
        let addr = transmitter.local_addr().unwrap();
        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).unwrap();
            buf
        });

        let result = transmitter.run(
            || -> crate::Result<ScriptedCamera> { Err(Error::CameraOpen("no device".to_string())) },
            &mut WidthCodec,
            &Shutdown::new(),
        );

        assert!(matches!(result, Err(Error::CameraOpen(_))));
        assert!(client.join().unwrap().is_empty());
    }

    #[test]
    fn serves_one_peer_over_tcp() {
        let transmitter = loopback();
        let addr = transmitter.local_addr().unwrap();
        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).unwrap();
            buf
        });

        let summary = transmitter
            .run(
                || Ok(ScriptedCamera::new(vec![frame(1), frame(7)])),
                &mut WidthCodec,
                &Shutdown::new(),
            )
            .unwrap();

        assert_eq!(summary.end, SessionEnd::EndOfStream);
        assert_eq!(summary.frames_sent, 2);
        assert_eq!(payloads(client.join().unwrap()), vec![vec![1u8], vec![7u8; 7]]);
    }
}
