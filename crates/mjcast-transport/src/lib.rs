//! mjcast transport: frame distribution over IPv4 UDP multicast.
//!
//! Provides:
//! - A 9-byte fragment header so frames larger than one datagram survive UDP
//! - A sender that fragments frames and repeats fragments for redundancy
//! - A receiver that reassembles fragments arriving in any order, ignores
//!   duplicates, purges stale partial frames, and never blocks on a slow reader
//! - Best-effort group membership with interface probing

pub mod addr;
pub mod assembly;
pub mod error;
pub mod fragment;
pub mod iface;
pub mod logging;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod stats;

// Re-export key types for convenience.
pub use assembly::{AssemblingFrame, AssemblyTable, Ingest};
pub use error::{Result, TransportError};
pub use fragment::{FragmentedFrame, Fragmenter};
pub use iface::MulticastInterface;
pub use logging::{NullLogger, TracingLogger, TransportEvent, TransportLogger};
pub use protocol::{
    classify, clamp_mtu, decode_fragment_header, encode_fragment, fragments_for, payload_per_fragment,
    Datagram, FragmentHeader, DEFAULT_MTU, DEFAULT_TTL, FRAGMENT_HEADER, FRAGMENT_VERSION,
    IP_UDP_OVERHEAD, MAX_MTU, MIN_MTU,
};
pub use receiver::{MulticastReceiver, ReceiverConfig};
pub use sender::{MulticastSender, SenderConfig, SentFrame};
pub use stats::{ReceiverStats, ReceiverStatsSnapshot};
