//! Integration tests: full capture → resample → DDP → UDP sessions
//! against a receiver on localhost, backend fallback, and error paths.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ddpcast_core::pipeline::{Capture, RawFrame};
use ddpcast_core::pipeline::types::PixelFormat;
use ddpcast_core::{
    BackendChain, BackendKind, Capabilities, CaptureBackend, CastError, DATA_TYPE_RGB24,
    DdpEncoder, DdpHeader, HEADER_LENGTH, MirrorConfig, MirroringController, PacketMode,
    PatternCapture, SessionState, TargetSize, Transport,
};
use tokio::net::UdpSocket;
use tokio_test::{assert_err, assert_ok};

// ── Helpers ──────────────────────────────────────────────────────

/// Bind a receiver on an OS-assigned localhost port and return a
/// config pointing at it.
async fn receiver() -> (UdpSocket, MirrorConfig) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let config = MirrorConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        target: TargetSize::new(90, 50).unwrap(),
        frame_interval: Duration::from_millis(20),
        capture_timeout: Duration::from_millis(10),
        ..Default::default()
    };
    (socket, config)
}

async fn recv_packet(socket: &UdpSocket) -> Vec<u8> {
    let mut buf = vec![0u8; 65536];
    let (len, _) = tokio::time::timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
        .await
        .expect("timeout")
        .expect("recv failed");
    buf.truncate(len);
    buf
}

fn solid_red_desktop() -> MirroringController {
    MirroringController::with_backends(Arc::new(|_| {
        BackendChain::new(vec![Box::new(PatternCapture::solid(1920, 1080, [255, 0, 0]))])
    }))
}

/// Initialisation always fails, like a machine without duplication support.
struct NoDuplication;

impl CaptureBackend for NoDuplication {
    fn kind(&self) -> BackendKind {
        BackendKind::HardwareDuplication
    }
    fn initialize(&mut self) -> Result<Capabilities, CastError> {
        Err(CastError::BackendInit {
            backend: BackendKind::HardwareDuplication,
            reason: "no outputs enumerated".into(),
        })
    }
    fn capture_once(&mut self, _timeout: Duration) -> Result<Capture<'_>, CastError> {
        unreachable!("never initialised")
    }
}

/// Software blit stand-in: a 24-bit bottom-padded BGR screen.
struct FakeBlit {
    buffer: Vec<u8>,
}

impl FakeBlit {
    const W: u32 = 1366;
    const H: u32 = 768;
    const STRIDE: usize = 4100;

    fn new() -> Self {
        let mut buffer = vec![0u8; Self::STRIDE * Self::H as usize];
        for row in buffer.chunks_exact_mut(Self::STRIDE) {
            for px in row[..Self::W as usize * 3].chunks_exact_mut(3) {
                px.copy_from_slice(&[30, 20, 10]);
            }
        }
        Self { buffer }
    }
}

impl CaptureBackend for FakeBlit {
    fn kind(&self) -> BackendKind {
        BackendKind::SoftwareBlit
    }
    fn initialize(&mut self) -> Result<Capabilities, CastError> {
        Ok(Capabilities::new(BackendKind::SoftwareBlit, false, Self::W, Self::H))
    }
    fn capture_once(&mut self, _timeout: Duration) -> Result<Capture<'_>, CastError> {
        Ok(Capture::Frame(RawFrame {
            width: Self::W,
            height: Self::H,
            stride: Self::STRIDE,
            format: PixelFormat::Bgr8,
            data: &self.buffer,
        }))
    }
}

// ── End to end ───────────────────────────────────────────────────

#[tokio::test]
async fn test_solid_red_reaches_the_wire() {
    let (socket, config) = receiver().await;
    let mut ctrl = solid_red_desktop();

    let caps = assert_ok!(ctrl.start(&config));
    assert_eq!((caps.screen_width, caps.screen_height), (1920, 1080));
    assert!(ctrl.state().is_active());

    let packet = recv_packet(&socket).await;
    assert_eq!(packet.len(), 13510);
    assert_eq!(packet[2], DATA_TYPE_RGB24);
    assert_eq!(u16::from_be_bytes([packet[8], packet[9]]), 13500);

    let payload = &packet[HEADER_LENGTH..];
    assert!(payload.chunks_exact(3).all(|px| px == [255, 0, 0]));

    let frame = ctrl.latest_frame().expect("slot holds a frame");
    assert_eq!(frame.as_bytes(), payload);

    assert_ok!(ctrl.stop());
    assert!(ctrl.state().is_idle());
}

#[tokio::test]
async fn test_chunked_frames_reassemble() {
    let (socket, mut config) = receiver().await;
    config.packet_mode = PacketMode::Chunked { max_payload: 1440 };
    config.sequence_numbers = true;
    let mut ctrl = solid_red_desktop();
    assert_ok!(ctrl.start(&config));

    // Collect packets until one full frame (ending in PUSH) is seen.
    let mut frame = vec![0u8; 13500];
    let mut covered = 0;
    let mut started = false;
    loop {
        let packet = recv_packet(&socket).await;
        let header = assert_ok!(DdpHeader::decode(&packet));
        assert_ne!(header.sequence, 0);
        if header.offset == 0 {
            started = true;
            covered = 0;
        }
        if !started {
            continue;
        }
        let start = header.offset as usize;
        frame[start..start + header.payload_length()].copy_from_slice(&packet[HEADER_LENGTH..]);
        covered += header.payload_length();
        if header.flags.is_push() {
            break;
        }
    }
    assert_ok!(ctrl.stop());

    assert_eq!(covered, 13500);
    assert!(frame.chunks_exact(3).all(|px| px == [255, 0, 0]));
}

#[tokio::test]
async fn test_ipv6_destination_receives_frames() {
    let socket = UdpSocket::bind("[::1]:0").await.unwrap();
    let config = MirrorConfig {
        host: "::1".into(),
        port: socket.local_addr().unwrap().port(),
        frame_interval: Duration::from_millis(20),
        capture_timeout: Duration::from_millis(10),
        ..Default::default()
    };
    let mut ctrl = solid_red_desktop();
    assert_ok!(ctrl.start(&config));
    assert!(ctrl.destination().is_some_and(|d| d.is_ipv6()));

    let packet = recv_packet(&socket).await;
    assert_eq!(packet.len(), 13510);
    assert!(packet[HEADER_LENGTH..].chunks_exact(3).all(|px| px == [255, 0, 0]));

    let stats = ctrl.stats().expect("session stats");
    assert!(stats.packets_sent > 0);
    assert_eq!(stats.send_failures, 0);
    assert_ok!(ctrl.stop());
}

// ── Fallback ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_falls_back_to_software_blit() {
    let (socket, config) = receiver().await;
    let mut ctrl = MirroringController::with_backends(Arc::new(|_| {
        BackendChain::new(vec![Box::new(NoDuplication), Box::new(FakeBlit::new())])
    }));

    let caps = assert_ok!(ctrl.start(&config));
    assert_eq!(caps.backend, BackendKind::SoftwareBlit);
    assert!(!caps.hardware_accelerated);
    assert!(ctrl.state().is_active());

    let packet = recv_packet(&socket).await;
    assert!(packet[HEADER_LENGTH..]
        .chunks_exact(3)
        .all(|px| px == [10, 20, 30]));

    assert_ok!(ctrl.stop());
}

#[tokio::test]
async fn test_no_backend_fails_start() {
    let (_socket, config) = receiver().await;
    let mut ctrl =
        MirroringController::with_backends(Arc::new(|_| BackendChain::new(vec![Box::new(NoDuplication)])));

    let err = assert_err!(ctrl.start(&config));
    assert!(matches!(err, CastError::AllBackendsFailed(_)));
    assert!(matches!(ctrl.state(), SessionState::Error(_)));

    // Stop from Error returns to Idle.
    assert_ok!(ctrl.stop());
    assert!(ctrl.state().is_idle());
}

// ── Lifecycle ────────────────────────────────────────────────────

#[tokio::test]
async fn test_stop_is_prompt() {
    let (_socket, config) = receiver().await;
    let mut ctrl = solid_red_desktop();
    assert_ok!(ctrl.start(&config));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let begin = Instant::now();
    assert_ok!(ctrl.stop());
    let took = begin.elapsed();
    assert!(
        took < config.capture_timeout + Duration::from_millis(200),
        "stop took {took:?}"
    );
}

#[tokio::test]
async fn test_invalid_configuration_fails_fast() {
    let (_socket, mut config) = receiver().await;
    config.frame_interval = Duration::ZERO;
    let mut ctrl = solid_red_desktop();

    let err = assert_err!(ctrl.start(&config));
    assert!(matches!(err, CastError::InvalidConfiguration(_)));
    assert!(ctrl.stats().is_none());

    // 65520 bytes fits the length field but not one datagram.
    config.frame_interval = Duration::from_millis(50);
    config.target = TargetSize::new(120, 182).unwrap();
    let err = assert_err!(ctrl.start(&config));
    assert!(matches!(err, CastError::InvalidConfiguration(_)));

    config.target = TargetSize::new(90, 50).unwrap();
    config.host = "host.invalid".into();
    let err = assert_err!(ctrl.start(&config));
    assert!(matches!(err, CastError::InvalidConfiguration(_)));
}

// ── One-shot ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_one_shot_frame() {
    let (socket, config) = receiver().await;
    let dest = assert_ok!(config.resolve_destination());

    let packet = assert_ok!(DdpEncoder::new().encode(&vec![0x11; config.target.frame_len()]));
    let sent = assert_ok!(Transport::send_once(packet.as_bytes(), dest).await);
    assert_eq!(sent, 13510);

    let received = recv_packet(&socket).await;
    assert_eq!(received, packet.as_bytes());
}

#[tokio::test]
async fn test_one_shot_frame_over_ipv6() {
    let socket = UdpSocket::bind("[::1]:0").await.unwrap();
    let dest = socket.local_addr().unwrap();

    let packet = assert_ok!(DdpEncoder::new().encode(&[0x22; 300]));
    assert_ok!(Transport::send_once(packet.as_bytes(), dest).await);
    assert_eq!(recv_packet(&socket).await, packet.as_bytes());
}
