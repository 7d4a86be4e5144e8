//! Receiving side: reassemble, decode, scan and display frames

use std::io::Read;
use std::net::TcpStream;

use framecast_proto::{Disconnect, FrameAssembler, FrameError, FrameReader, ReadEvent};
use image::RgbImage;

use crate::codec::FrameCodec;
use crate::config::ReceiverConfig;
use crate::display::{Display, DisplayControl};
use crate::error::Error;
use crate::qr::{Detector, QrScanner};
use crate::session::{SessionEnd, is_peer_gone};
use crate::shutdown::Shutdown;

/// What became of one received payload
#[derive(Debug)]
pub enum FrameOutcome {
    /// Decoded and scanned; `image` carries any overlay
    Ready { image: RgbImage, qr: Option<String> },
    /// Payload could not be decoded; the stream goes on
    Skip(String),
}

/// Decode one payload and scan it for QR codes
pub fn process_frame<K, D>(
    codec: &mut K,
    scanner: &mut QrScanner<D>,
    payload: &[u8],
) -> FrameOutcome
where
    K: FrameCodec,
    D: Detector,
{
    match codec.decode(payload) {
        Ok(mut image) => {
            let qr = scanner.process(&mut image);
            FrameOutcome::Ready { image, qr }
        }
        Err(e) => FrameOutcome::Skip(e.to_string()),
    }
}

/// Totals for one receive session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveSummary {
    /// Frames decoded and shown
    pub frames: u64,
    /// Payloads that failed to decode
    pub skipped: u64,
    /// Frames in which a QR code was decoded
    pub qr_hits: u64,
    pub end: SessionEnd,
}

/// Frame consumer over any byte stream
pub struct Receiver<R> {
    frames: FrameReader<R>,
}

impl Receiver<TcpStream> {
    /// Connect to a transmitter. A configured read timeout is applied so the
    /// loop can poll for quit while the stream is idle.
    pub fn connect(config: &ReceiverConfig) -> crate::Result<Self> {
        log::info!("Connecting to {}...", config.server_addr);
        let stream = TcpStream::connect(&config.server_addr).map_err(|source| Error::Connect {
            addr: config.server_addr.clone(),
            source,
        })?;
        stream.set_read_timeout(config.read_timeout)?;
        if let Err(e) = stream.set_nodelay(true) {
            log::warn!("Failed to set TCP_NODELAY: {e}");
        }
        log::info!("Connected to server at {}", stream.peer_addr()?);
        Ok(Self::new(stream, config))
    }
}

impl<R: Read> Receiver<R> {
    pub fn new(reader: R, config: &ReceiverConfig) -> Self {
        Self {
            frames: FrameReader::with_assembler(
                reader,
                FrameAssembler::with_max_payload(config.max_payload),
            ),
        }
    }

    /// Receive frames until the peer closes, the user quits, or shutdown is
    /// requested.
    ///
    /// Undecodable payloads are skipped. A peer that closes mid-frame ends
    /// the session with [`SessionEnd::Truncated`]. An oversized header or a
    /// socket or terminal failure ends it with [`SessionEnd::Oversized`] or
    /// [`SessionEnd::Failed`], logged at error level; the stream cannot be
    /// resynchronized after either.
    pub fn run<K, D, V>(
        mut self,
        codec: &mut K,
        scanner: &mut QrScanner<D>,
        display: &mut V,
        shutdown: &Shutdown,
    ) -> ReceiveSummary
    where
        K: FrameCodec,
        D: Detector,
        V: Display,
    {
        let mut frames = 0u64;
        let mut skipped = 0u64;
        let mut qr_hits = 0u64;

        let end = loop {
            if shutdown.requested() {
                break SessionEnd::Interrupted;
            }

            let event = match self.frames.read_event() {
                Ok(event) => event,
                Err(FrameError::Io(e)) if is_peer_gone(&e) => {
                    log::info!("Server went away: {e}");
                    break SessionEnd::PeerGone;
                }
                Err(FrameError::TooLarge { len, max }) => {
                    log::error!("Frame of {len} bytes exceeds limit of {max}");
                    break SessionEnd::Oversized { len, max };
                }
                Err(FrameError::Io(e)) => {
                    log::error!("Read failed: {e}");
                    break SessionEnd::Failed(e.kind());
                }
            };

            let control = match event {
                ReadEvent::Idle => display.poll(),
                ReadEvent::Closed(Disconnect::Clean { partial_header }) => {
                    if partial_header > 0 {
                        log::debug!("Dropping {partial_header} bytes of incomplete header");
                    }
                    log::info!("Server closed connection");
                    break SessionEnd::PeerClosed;
                }
                ReadEvent::Closed(Disconnect::Truncated { expected, received }) => {
                    log::warn!(
                        "Server closed mid-frame: got {received} of {expected} payload bytes"
                    );
                    break SessionEnd::Truncated { expected, received };
                }
                ReadEvent::Frame(payload) => match process_frame(codec, scanner, &payload) {
                    FrameOutcome::Skip(reason) => {
                        log::warn!("Failed to decode frame: {reason}");
                        skipped += 1;
                        display.poll()
                    }
                    FrameOutcome::Ready { image, qr } => {
                        frames += 1;
                        if let Some(text) = &qr {
                            log::info!("QR Code Detected: {text}");
                            qr_hits += 1;
                        }
                        display.show(&image, qr.as_deref())
                    }
                },
            };

            let control = match control {
                Ok(control) => control,
                Err(e) => {
                    log::error!("Display failed: {e}");
                    break SessionEnd::Failed(e.kind());
                }
            };
            if control == DisplayControl::Quit {
                log::info!("Quit requested");
                break SessionEnd::Quit;
            }
        };

        log::info!(
            "Receive session ended ({end:?}): {frames} frames, {qr_hits} with QR, {skipped} skipped"
        );
        ReceiveSummary {
            frames,
            skipped,
            qr_hits,
            end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecError;
    use crate::qr::{DetectError, Detection, RawPoints};
    use framecast_proto::write_frame;
    use image::GrayImage;
    use std::io::{self, Cursor, ErrorKind};

    /// Payload `[w, h]` decodes to a `w`x`h` image; anything else fails
    struct TinyCodec;

    impl FrameCodec for TinyCodec {
        fn encode(&mut self, _image: &RgbImage) -> Result<Vec<u8>, CodecError> {
            unreachable!("receiver never encodes")
        }

        fn decode(&mut self, payload: &[u8]) -> Result<RgbImage, CodecError> {
            match payload {
                &[w, h] if w > 0 && h > 0 => Ok(RgbImage::new(w as u32, h as u32)),
                _ => Err(CodecError::Decode("not a tiny image".to_string())),
            }
        }
    }

    /// Reports a code in images wider than 4 pixels
    struct WideDetector;

    impl Detector for WideDetector {
        fn detect(&mut self, image: &GrayImage) -> Result<Vec<Detection>, DetectError> {
            if image.width() <= 4 {
                return Ok(vec![]);
            }
            Ok(vec![Detection {
                text: format!("wide:{}", image.width()),
                points: RawPoints::Flat(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]),
            }])
        }
    }

    #[derive(Default)]
    struct Recorder {
        shown: Vec<((u32, u32), Option<String>)>,
        polls: usize,
        quit_after: Option<usize>,
    }

    impl Display for Recorder {
        fn show(&mut self, image: &RgbImage, qr: Option<&str>) -> io::Result<DisplayControl> {
            self.shown.push((image.dimensions(), qr.map(str::to_string)));
            if self.quit_after == Some(self.shown.len()) {
                return Ok(DisplayControl::Quit);
            }
            Ok(DisplayControl::Continue)
        }

        fn poll(&mut self) -> io::Result<DisplayControl> {
            self.polls += 1;
            Ok(DisplayControl::Continue)
        }
    }

    fn stream(payloads: &[&[u8]]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for p in payloads {
            write_frame(&mut bytes, p).unwrap();
        }
        bytes
    }

    fn config() -> ReceiverConfig {
        ReceiverConfig::new("127.0.0.1", 0)
    }

    fn run(bytes: Vec<u8>, display: &mut Recorder) -> ReceiveSummary {
        Receiver::new(Cursor::new(bytes), &config()).run(
            &mut TinyCodec,
            &mut QrScanner::new(WideDetector),
            display,
            &Shutdown::new(),
        )
    }

    #[test]
    fn frames_are_decoded_scanned_and_shown() {
        let mut display = Recorder::default();
        let summary = run(stream(&[&[2, 2], b"junk", &[8, 3]]), &mut display);

        assert_eq!(
            summary,
            ReceiveSummary {
                frames: 2,
                skipped: 1,
                qr_hits: 1,
                end: SessionEnd::PeerClosed,
            }
        );
        assert_eq!(
            display.shown,
            vec![((2, 2), None), ((8, 3), Some("wide:8".to_string()))]
        );
        assert_eq!(display.polls, 1);
    }

    #[test]
    fn quit_key_ends_the_session() {
        let mut display = Recorder {
            quit_after: Some(1),
            ..Recorder::default()
        };
        let summary = run(stream(&[&[1, 1], &[1, 1]]), &mut display);

        assert_eq!(summary.end, SessionEnd::Quit);
        assert_eq!(display.shown.len(), 1);
    }

    #[test]
    fn mid_frame_close_is_truncated() {
        let mut bytes = stream(&[&[1, 1]]);
        bytes.extend_from_slice(&[0, 0, 0, 9, 1, 2]);

        let summary = run(bytes, &mut Recorder::default());
        assert_eq!(summary.frames, 1);
        assert_eq!(
            summary.end,
            SessionEnd::Truncated {
                expected: 9,
                received: 2
            }
        );
    }

    #[test]
    fn oversized_header_ends_the_session() {
        let config = ReceiverConfig {
            max_payload: 16,
            ..config()
        };
        let mut bytes = stream(&[&[1, 1]]);
        bytes.extend_from_slice(&[0, 0, 1, 0]);

        let summary = Receiver::new(Cursor::new(bytes), &config).run(
            &mut TinyCodec,
            &mut QrScanner::new(WideDetector),
            &mut Recorder::default(),
            &Shutdown::new(),
        );
        assert_eq!(summary.frames, 1);
        assert_eq!(summary.end, SessionEnd::Oversized { len: 256, max: 16 });
        assert!(summary.end.is_failure());
    }

    /// Fails every read with `kind`
    struct Broken(ErrorKind);

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(self.0, "scripted"))
        }
    }

    /// Fails to show anything
    struct DeadTerminal;

    impl Display for DeadTerminal {
        fn show(&mut self, _image: &RgbImage, _qr: Option<&str>) -> io::Result<DisplayControl> {
            Err(io::Error::other("terminal gone"))
        }

        fn poll(&mut self) -> io::Result<DisplayControl> {
            Ok(DisplayControl::Continue)
        }
    }

    #[test]
    fn read_and_display_failures_end_the_session() {
        let summary = Receiver::new(Broken(ErrorKind::PermissionDenied), &config()).run(
            &mut TinyCodec,
            &mut QrScanner::new(WideDetector),
            &mut Recorder::default(),
            &Shutdown::new(),
        );
        assert_eq!(summary.end, SessionEnd::Failed(ErrorKind::PermissionDenied));

        let summary = Receiver::new(Cursor::new(stream(&[&[1, 1]])), &config()).run(
            &mut TinyCodec,
            &mut QrScanner::new(WideDetector),
            &mut DeadTerminal,
            &Shutdown::new(),
        );
        assert_eq!(summary.frames, 1);
        assert_eq!(summary.end, SessionEnd::Failed(ErrorKind::Other));
    }

    /// Times out once, then resets the connection
    struct IdleThenReset(u8);

    impl Read for IdleThenReset {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            self.0 += 1;
            match self.0 {
                1 => Err(io::Error::new(ErrorKind::WouldBlock, "timeout")),
                _ => Err(io::Error::new(ErrorKind::ConnectionReset, "reset")),
            }
        }
    }

    #[test]
    fn idle_polls_display_and_reset_ends_cleanly() {
        let mut display = Recorder::default();
        let summary = Receiver::new(IdleThenReset(0), &config())
            .run(
                &mut TinyCodec,
                &mut QrScanner::new(WideDetector),
                &mut display,
                &Shutdown::new(),
            );

        assert_eq!(summary.end, SessionEnd::PeerGone);
        assert_eq!(display.polls, 1);
    }

    #[test]
    fn shutdown_wins_over_pending_frames() {
        let shutdown = Shutdown::new();
        shutdown.request();
        let mut display = Recorder::default();

        let summary = Receiver::new(Cursor::new(stream(&[&[1, 1]])), &config())
            .run(
                &mut TinyCodec,
                &mut QrScanner::new(WideDetector),
                &mut display,
                &shutdown,
            );
        assert_eq!(summary.end, SessionEnd::Interrupted);
        assert!(display.shown.is_empty());
    }

    #[test]
    fn connect_refused_names_the_address() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        match Receiver::connect(&ReceiverConfig::new("127.0.0.1", port)) {
            Err(Error::Connect { addr, .. }) => assert_eq!(addr, format!("127.0.0.1:{port}")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("connected to a closed port"),
        }
    }
}
