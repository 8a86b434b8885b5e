//! Multicast frame sender.
//!
//! ```text
//! frame --> Fragmenter --> [hdr|payload] x N --> UDP send_to (x repeats, 1ms apart)
//! ```
//!
//! Redundancy via repeats is the only loss mitigation: the receiver set is
//! unknown and changes at will, so there is nobody to ACK or NACK.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::addr::resolve_target;
use crate::error::{Result, TransportError};
use crate::fragment::Fragmenter;
use crate::iface;
use crate::logging::{TracingLogger, TransportEvent, TransportLogger};
use crate::protocol::{DEFAULT_TTL, SEND_SPACING};

/// Configuration for the sender.
pub struct SenderConfig {
    /// Destination `host:port`, normally a multicast group.
    pub target: String,
    /// Outgoing interface name; system default route when None.
    pub interface: Option<String>,
    pub ttl: u32,
    pub logger: Arc<dyn TransportLogger>,
}

impl SenderConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            interface: None,
            ttl: DEFAULT_TTL,
            logger: Arc::new(TracingLogger),
        }
    }
}

/// Result of one successful `send_frame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentFrame {
    pub frame_id: u32,
    pub bytes: usize,
    pub fragments: usize,
    pub repeats: usize,
}

pub struct MulticastSender {
    socket: UdpSocket,
    target: SocketAddr,
    fragmenter: Fragmenter,
    logger: Arc<dyn TransportLogger>,
}

impl MulticastSender {
    /// Resolve the target, set up the socket, and apply TTL, loopback and
    /// interface options. Every failure here is a configuration error.
    pub async fn open(config: SenderConfig) -> Result<Self> {
        let target = SocketAddr::V4(resolve_target(&config.target).await?);
        let interface = match config.interface.as_deref() {
            Some(name) => Some(iface::resolve(name)?),
            None => None,
        };

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(TransportError::Socket)?;
        if let Err(e) = socket.set_multicast_ttl_v4(config.ttl) {
            tracing::warn!("failed to set multicast TTL {}: {}", config.ttl, e);
        }
        // Lets a receiver on this host see our own traffic.
        if let Err(e) = socket.set_multicast_loop_v4(true) {
            tracing::warn!("failed to enable multicast loopback: {}", e);
        }
        if let Some(ref iface) = interface {
            socket
                .set_multicast_if_v4(&iface.addr)
                .map_err(TransportError::Socket)?;
        }
        socket
            .bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)).into())
            .map_err(TransportError::Socket)?;
        socket.set_nonblocking(true).map_err(TransportError::Socket)?;

        let std_sock: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_sock).map_err(TransportError::Socket)?;

        config.logger.log(
            "sender",
            TransportEvent::SenderOpened {
                target,
                ttl: config.ttl,
                interface: interface.map(|i| i.addr),
            },
        );

        Ok(Self {
            socket,
            target,
            fragmenter: Fragmenter::new(),
            logger: config.logger,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(TransportError::Socket)
    }

    /// ID given to the most recent frame (0 before the first one).
    pub fn last_frame_id(&self) -> u32 {
        self.fragmenter.last_frame_id()
    }

    /// Fragment `frame` for `mtu` and write every fragment `repeats` times.
    ///
    /// Stops at the first write error. Datagrams already written stay written;
    /// the frame ID is consumed either way.
    pub async fn send_frame(&mut self, frame: &[u8], mtu: usize, repeats: usize) -> Result<SentFrame> {
        let repeats = repeats.max(1);
        let fragmented = self.fragmenter.fragment(frame, mtu)?;

        for datagram in &fragmented.datagrams {
            for _ in 0..repeats {
                self.socket
                    .send_to(datagram, self.target)
                    .await
                    .map_err(TransportError::Send)?;
                tokio::time::sleep(SEND_SPACING).await;
            }
        }

        let sent = SentFrame {
            frame_id: fragmented.frame_id,
            bytes: frame.len(),
            fragments: fragmented.datagrams.len(),
            repeats,
        };
        self.logger.log(
            "sender",
            TransportEvent::FrameSent {
                frame_id: sent.frame_id,
                bytes: sent.bytes,
                fragments: sent.fragments,
                repeats: sent.repeats,
            },
        );
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NullLogger;
    use crate::protocol::{decode_fragment_header, FRAGMENT_HEADER};

    fn quiet(target: String) -> SenderConfig {
        SenderConfig {
            logger: Arc::new(NullLogger),
            ..SenderConfig::new(target)
        }
    }

    #[tokio::test]
    async fn test_send_frame_repeats_each_fragment() {
        let sink = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = sink.local_addr().unwrap().to_string();
        let mut sender = MulticastSender::open(quiet(target)).await.unwrap();

        let frame: Vec<u8> = (0..2500u32).map(|i| i as u8).collect();
        let sent = sender.send_frame(&frame, 1200, 2).await.unwrap();
        assert_eq!(sent, SentFrame { frame_id: 1, bytes: 2500, fragments: 3, repeats: 2 });

        let mut buf = vec![0u8; 2048];
        let mut indices = Vec::new();
        for _ in 0..6 {
            let (len, _) = sink.recv_from(&mut buf).await.unwrap();
            let header = decode_fragment_header(&buf[..len]).unwrap();
            assert_eq!(header.frame_id, 1);
            assert_eq!(header.total, 3);
            assert!(len <= 1200 && len > FRAGMENT_HEADER);
            indices.push(header.index);
        }
        assert_eq!(indices, vec![0, 0, 1, 1, 2, 2]);
    }

    #[tokio::test]
    async fn test_frame_ids_advance_per_send() {
        let sink = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut sender = MulticastSender::open(quiet(sink.local_addr().unwrap().to_string()))
            .await
            .unwrap();
        assert_eq!(sender.send_frame(b"one", 1200, 1).await.unwrap().frame_id, 1);
        assert_eq!(sender.send_frame(b"two", 1200, 0).await.unwrap().frame_id, 2);
        assert_eq!(sender.last_frame_id(), 2);
    }

    #[tokio::test]
    async fn test_open_rejects_bad_configuration() {
        let err = MulticastSender::open(quiet("nonsense".into())).await.err().unwrap();
        assert!(err.is_configuration());

        let mut config = quiet("224.0.0.250:5000".into());
        config.interface = Some("no-such-iface-42".into());
        let err = MulticastSender::open(config).await.err().unwrap();
        assert!(matches!(err, TransportError::UnknownInterface(_)));
    }
}
