//! UDP fragment format for multicast frame transport.
//!
//! ```text
//! [0]      Version (u8, always 1)
//! [1..5]   Frame ID (u32 BE, per sender, wraps)
//! [5..7]   Total fragments in this frame (u16 BE)
//! [7..9]   Fragment index within the frame (u16 BE)
//! [9..]    Payload slice
//! ```
//!
//! Datagrams shorter than the header, or carrying any other version byte,
//! are legacy whole-frame payloads and are never parsed.

use std::time::Duration;

use bytes::Bytes;

/// Header size in bytes.
pub const FRAGMENT_HEADER: usize = 1 + 4 + 2 + 2;

/// The only fragment version this crate speaks.
pub const FRAGMENT_VERSION: u8 = 1;

/// Smallest datagram the sender will emit.
pub const MIN_MTU: usize = FRAGMENT_HEADER + 16;

/// Largest UDP payload over IPv4 (65535 - 20 IP - 8 UDP).
pub const MAX_MTU: usize = 65_507;

/// Default datagram size bound.
pub const DEFAULT_MTU: usize = 1200;

/// Default multicast TTL (stay on the local link).
pub const DEFAULT_TTL: u32 = 1;

/// A frame may not span more fragments than the index field can address.
pub const MAX_FRAGMENTS: usize = u16::MAX as usize;

/// Approximate IPv4 + UDP header bytes per datagram, for bandwidth estimates.
pub const IP_UDP_OVERHEAD: usize = 28;

/// Pause between consecutive datagrams of one send call.
pub const SEND_SPACING: Duration = Duration::from_millis(1);

/// Incomplete frames older than this are dropped.
pub const PURGE_AFTER: Duration = Duration::from_secs(5);

/// How often the receiver scans for stale frames.
pub const PURGE_INTERVAL: Duration = Duration::from_secs(1);

/// Backoff after a failed socket read.
pub const READ_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// OS receive buffer size (4 MB) so bursts survive a slow read loop.
pub const UDP_RECV_BUFFER: usize = 4 * 1024 * 1024;

/// Read buffer for one datagram.
pub const MAX_DATAGRAM: usize = 65_536;

/// Completed frames waiting for `MulticastReceiver::next`.
pub const OUTBOUND_QUEUE: usize = 8;

/// Parsed fragment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    pub frame_id: u32,
    pub total: u16,
    pub index: u16,
}

/// A received datagram after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datagram {
    /// One piece of a fragmented frame.
    Fragment { header: FragmentHeader, payload: Bytes },
    /// Short or foreign-version packet, passed through as a whole frame.
    Legacy(Bytes),
}

/// Clamp a requested datagram size into `[MIN_MTU, MAX_MTU]`.
pub fn clamp_mtu(mtu: usize) -> usize {
    mtu.clamp(MIN_MTU, MAX_MTU)
}

/// Payload bytes carried by each fragment for a (clamped) MTU.
pub fn payload_per_fragment(mtu: usize) -> usize {
    clamp_mtu(mtu) - FRAGMENT_HEADER
}

/// Number of fragments a frame of `len` bytes needs at this MTU.
pub fn fragments_for(len: usize, mtu: usize) -> usize {
    len.div_ceil(payload_per_fragment(mtu))
}

/// Encode one fragment (header + payload) into a fresh buffer.
pub fn encode_fragment(header: FragmentHeader, payload: &[u8]) -> Bytes {
    let mut buf = Vec::with_capacity(FRAGMENT_HEADER + payload.len());
    buf.push(FRAGMENT_VERSION);
    buf.extend_from_slice(&header.frame_id.to_be_bytes());
    buf.extend_from_slice(&header.total.to_be_bytes());
    buf.extend_from_slice(&header.index.to_be_bytes());
    buf.extend_from_slice(payload);
    Bytes::from(buf)
}

/// Decode a fragment header. Returns None for short or foreign-version data.
pub fn decode_fragment_header(data: &[u8]) -> Option<FragmentHeader> {
    if data.len() < FRAGMENT_HEADER || data[0] != FRAGMENT_VERSION {
        return None;
    }
    Some(FragmentHeader {
        frame_id: u32::from_be_bytes([data[1], data[2], data[3], data[4]]),
        total: u16::from_be_bytes([data[5], data[6]]),
        index: u16::from_be_bytes([data[7], data[8]]),
    })
}

/// Classify a raw datagram.
pub fn classify(data: Bytes) -> Datagram {
    match decode_fragment_header(&data) {
        Some(header) => Datagram::Fragment {
            header,
            payload: data.slice(FRAGMENT_HEADER..),
        },
        None => Datagram::Legacy(data),
    }
}
