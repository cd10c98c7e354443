//! Outbound datagram transport for DDP packets.
//!
//! One socket is bound to an ephemeral port when a session starts and
//! kept until the session stops. Sends are fire-and-forget: the socket
//! is non-blocking, a full buffer or network error drops the packet,
//! and the drop is counted instead of retried.
//!
//! [`DdpSink`] is the capture loop's view of the transport: it encodes
//! each published frame and sends the packets in capture order.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::CastError;
use crate::packet::DdpEncoder;
use crate::pipeline::scheduler::FrameSink;
use crate::pipeline::stats::PipelineStats;
use crate::pipeline::types::ResampledFrame;

/// Default DDP port.
pub const DEFAULT_PORT: u16 = 4048;

/// Send failures logged at `warn` before switching to `debug`.
const LOUD_FAILURES: u64 = 5;

/// Ephemeral local address in the same family as `dest`.
fn unspecified_for(dest: SocketAddr) -> SocketAddr {
    match dest {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    }
}

// ── Transport ────────────────────────────────────────────────────

/// Persistent outbound UDP socket.
#[derive(Debug)]
pub struct Transport {
    socket: UdpSocket,
    stats: Arc<PipelineStats>,
}

impl Transport {
    /// Bind an ephemeral port that can reach `dest`: `0.0.0.0:0` for
    /// IPv4 destinations, `[::]:0` for IPv6 ones.
    pub fn open(dest: SocketAddr, stats: Arc<PipelineStats>) -> Result<Self, CastError> {
        Self::bind(unspecified_for(dest), stats)
    }

    pub fn bind(addr: SocketAddr, stats: Arc<PipelineStats>) -> Result<Self, CastError> {
        let socket = UdpSocket::bind(addr).map_err(CastError::NetworkBind)?;
        socket.set_nonblocking(true).map_err(CastError::NetworkBind)?;
        debug!("transport bound to {}", socket.local_addr()?);
        Ok(Self { socket, stats })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, CastError> {
        Ok(self.socket.local_addr()?)
    }

    /// Hand one datagram to the OS without waiting.
    ///
    /// Success and failure are both counted in the session stats.
    pub fn send(&self, packet: &[u8], dest: SocketAddr) -> Result<usize, CastError> {
        match self.socket.send_to(packet, dest) {
            Ok(n) => {
                self.stats.record_sent(n);
                Ok(n)
            }
            Err(e) => {
                let failures = self.stats.record_send_failure();
                if failures <= LOUD_FAILURES {
                    warn!("send to {dest} failed ({failures}): {e}");
                } else {
                    debug!("send to {dest} failed ({failures}): {e}");
                }
                Err(CastError::NetworkSend(e))
            }
        }
    }

    /// Send a single packet from a throwaway socket.
    ///
    /// For low-frequency use where keeping a session socket is not
    /// worth it.
    pub async fn send_once(packet: &[u8], dest: SocketAddr) -> Result<usize, CastError> {
        let socket = tokio::net::UdpSocket::bind(unspecified_for(dest))
            .await
            .map_err(CastError::NetworkBind)?;
        socket
            .send_to(packet, dest)
            .await
            .map_err(CastError::NetworkSend)
    }
}

// ── DdpSink ──────────────────────────────────────────────────────

/// Encodes frames and sends them to one destination.
pub struct DdpSink {
    transport: Arc<Transport>,
    encoder: DdpEncoder,
    dest: SocketAddr,
}

impl DdpSink {
    pub fn new(transport: Arc<Transport>, encoder: DdpEncoder, dest: SocketAddr) -> Self {
        Self {
            transport,
            encoder,
            dest,
        }
    }
}

impl FrameSink for DdpSink {
    fn deliver(&mut self, frame: &ResampledFrame) {
        let packets = match self.encoder.encode_frame(frame.as_bytes()) {
            Ok(p) => p,
            Err(e) => {
                warn!("dropping frame: {e}");
                return;
            }
        };
        for packet in &packets {
            // Lossy by design: failures are already counted.
            let _ = self.transport.send(packet.as_bytes(), self.dest);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
