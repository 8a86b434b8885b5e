//! Structured transport events.
//!
//! The sender and receiver report lifecycle and per-frame events through a
//! `TransportLogger`, so callers can route them to `tracing` or discard them.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};

/// Transport events that can be logged.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Sender socket ready
    SenderOpened {
        target: SocketAddr,
        ttl: u32,
        interface: Option<Ipv4Addr>,
    },
    /// Sender: all fragments of a frame written
    FrameSent {
        frame_id: u32,
        bytes: usize,
        fragments: usize,
        repeats: usize,
    },
    /// Receiver: group membership established
    GroupJoined {
        group: Ipv4Addr,
        interface: String,
    },
    /// Receiver: a single join attempt failed
    GroupJoinFailed {
        group: Ipv4Addr,
        interface: String,
        error: String,
    },
    /// Receiver: no interface accepted the join, listening anyway
    DegradedMode {
        group: Ipv4Addr,
        port: u16,
    },
    /// Receiver: frame complete and queued
    FrameReassembled {
        frame_id: u32,
        bytes: usize,
        fragments: u16,
    },
    /// Receiver: short or foreign-version datagram forwarded whole
    LegacyPassthrough {
        bytes: usize,
        from: SocketAddr,
    },
    /// Receiver: outbound queue full, frame dropped
    OutboundDropped {
        bytes: usize,
    },
    /// Receiver: stale incomplete frames removed
    FramesPurged {
        count: usize,
        in_flight: usize,
    },
    /// Receiver: socket read failed, retrying
    ReadError {
        message: String,
    },
    /// Receiver: background tasks stopped
    ReceiverStopped,
}

impl fmt::Display for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SenderOpened { target, ttl, interface } => match interface {
                Some(iface) => write!(f, "sender_opened target={} ttl={} iface={}", target, ttl, iface),
                None => write!(f, "sender_opened target={} ttl={} iface=default", target, ttl),
            },
            Self::FrameSent { frame_id, bytes, fragments, repeats } => {
                write!(f, "frame_sent id={} bytes={} fragments={} repeats={}", frame_id, bytes, fragments, repeats)
            }
            Self::GroupJoined { group, interface } => {
                write!(f, "joined multicast group {} on iface {}", group, interface)
            }
            Self::GroupJoinFailed { group, interface, error } => {
                write!(f, "failed to join multicast group {} on iface {}: {}", group, interface, error)
            }
            Self::DegradedMode { group, port } => {
                write!(f, "could not join multicast group {} on any interface; continuing to listen on :{}", group, port)
            }
            Self::FrameReassembled { frame_id, bytes, fragments } => {
                write!(f, "frame_reassembled id={} bytes={} fragments={}", frame_id, bytes, fragments)
            }
            Self::LegacyPassthrough { bytes, from } => {
                write!(f, "legacy_passthrough bytes={} from={}", bytes, from)
            }
            Self::OutboundDropped { bytes } => {
                write!(f, "outbound_dropped bytes={}", bytes)
            }
            Self::FramesPurged { count, in_flight } => {
                write!(f, "frames_purged count={} in_flight={}", count, in_flight)
            }
            Self::ReadError { message } => {
                write!(f, "recv error: {}", message)
            }
            Self::ReceiverStopped => write!(f, "receiver_stopped"),
        }
    }
}

/// Trait for transport logging. Implementations can write to tracing or
/// discard the events.
pub trait TransportLogger: Send + Sync {
    fn log(&self, component: &'static str, event: TransportEvent);
}

/// Logger that uses the `tracing` crate.
pub struct TracingLogger;

impl TransportLogger for TracingLogger {
    fn log(&self, component: &'static str, event: TransportEvent) {
        match &event {
            TransportEvent::GroupJoinFailed { .. }
            | TransportEvent::DegradedMode { .. }
            | TransportEvent::ReadError { .. } => {
                tracing::warn!(component = component, "{}", event);
            }
            TransportEvent::SenderOpened { .. }
            | TransportEvent::GroupJoined { .. }
            | TransportEvent::ReceiverStopped => {
                tracing::info!(component = component, "{}", event);
            }
            _ => {
                tracing::debug!(component = component, "{}", event);
            }
        }
    }
}

/// No-op logger that discards all events.
pub struct NullLogger;

impl TransportLogger for NullLogger {
    fn log(&self, _component: &'static str, _event: TransportEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_display() {
        let event = TransportEvent::FrameReassembled { frame_id: 7, bytes: 5000, fragments: 5 };
        assert_eq!(event.to_string(), "frame_reassembled id=7 bytes=5000 fragments=5");

        let event = TransportEvent::DegradedMode { group: Ipv4Addr::new(224, 0, 0, 250), port: 5000 };
        assert!(event.to_string().contains("continuing to listen on :5000"));
    }
}
