//! Multicast frame receiver: two background tasks.
//!
//! ```text
//! [Read loop]  ----> AssemblyTable ----> outbound queue ----> next()
//! recv_from()        (one lock)          bounded, drop new
//! 4MB recv buf            ^
//!                         |
//! [Purge loop] -----------+  every 1s, drop frames older than 5s
//! ```
//!
//! The socket reuses address and port so several local listeners can share
//! a group. Group membership is best effort: if no interface accepts the
//! join the receiver keeps listening anyway.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::addr::parse_group;
use crate::assembly::{AssemblyTable, Ingest};
use crate::error::{Result, TransportError};
use crate::iface::{self, MulticastInterface};
use crate::logging::{TracingLogger, TransportEvent, TransportLogger};
use crate::protocol::*;
use crate::stats::ReceiverStats;

/// Configuration for the receiver.
pub struct ReceiverConfig {
    /// Multicast `group:port` to join.
    pub group: String,
    /// Interface to join on; probe every candidate when None.
    pub interface: Option<String>,
    pub logger: Arc<dyn TransportLogger>,
}

impl ReceiverConfig {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            interface: None,
            logger: Arc::new(TracingLogger),
        }
    }
}

pub struct MulticastReceiver {
    frames: mpsc::Receiver<Bytes>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    stats: Arc<ReceiverStats>,
    local_addr: SocketAddr,
    joined: Option<MulticastInterface>,
    logger: Arc<dyn TransportLogger>,
}

/// State shared by the read and purge loops.
struct Shared {
    table: Mutex<AssemblyTable>,
    stats: Arc<ReceiverStats>,
    logger: Arc<dyn TransportLogger>,
    cancel: CancellationToken,
}

impl Shared {
    fn table(&self) -> MutexGuard<'_, AssemblyTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MulticastReceiver {
    /// Bind the group port, join the group, and start the read and purge loops.
    pub async fn open(config: ReceiverConfig) -> Result<Self> {
        let group = parse_group(&config.group)?;
        let named = match config.interface.as_deref() {
            Some(name) => Some(iface::resolve(name)?),
            None => None,
        };

        let socket = create_recv_socket(group.port()).map_err(TransportError::Socket)?;
        let joined = join_group(&socket, group, named, config.logger.as_ref());

        let std_sock: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_sock).map_err(TransportError::Socket)?;
        let local_addr = socket.local_addr().map_err(TransportError::Socket)?;

        let cancel = CancellationToken::new();
        let stats = Arc::new(ReceiverStats::new());
        let shared = Arc::new(Shared {
            table: Mutex::new(AssemblyTable::new(PURGE_AFTER)),
            stats: stats.clone(),
            logger: config.logger.clone(),
            cancel: cancel.clone(),
        });
        let (frames_tx, frames_rx) = mpsc::channel(OUTBOUND_QUEUE);

        let tasks = vec![
            tokio::spawn(read_loop(Arc::new(socket), shared.clone(), frames_tx)),
            tokio::spawn(purge_loop(shared)),
        ];

        Ok(Self {
            frames: frames_rx,
            cancel,
            tasks,
            stats,
            local_addr,
            joined,
            logger: config.logger,
        })
    }

    /// Wait for the next complete frame (or legacy payload).
    ///
    /// Fails with `TransportError::Closed` once the receiver is closed.
    pub async fn next(&mut self) -> Result<Bytes> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Closed);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TransportError::Closed),
            frame = self.frames.recv() => frame.ok_or(TransportError::Closed),
        }
    }

    /// Stop the background loops. Pending and future `next` calls fail.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Close and wait for both loops to exit; the socket is released.
    pub async fn shutdown(mut self) {
        self.close();
        for task in std::mem::take(&mut self.tasks) {
            let _ = task.await;
        }
        self.logger.log("receiver", TransportEvent::ReceiverStopped);
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn stats(&self) -> Arc<ReceiverStats> {
        self.stats.clone()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Interface the group was joined on; None in degraded mode.
    pub fn joined_interface(&self) -> Option<&MulticastInterface> {
        self.joined.as_ref()
    }
}

impl Drop for MulticastReceiver {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn read_loop(socket: Arc<UdpSocket>, shared: Arc<Shared>, frames_tx: mpsc::Sender<Bytes>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        let received = tokio::select! {
            _ = shared.cancel.cancelled() => break,
            r = socket.recv_from(&mut buf) => r,
        };

        match received {
            Ok((len, src)) => {
                ReceiverStats::bump(&shared.stats.datagrams);
                handle_datagram(&shared, &frames_tx, Bytes::copy_from_slice(&buf[..len]), src);
            }
            // ICMP port unreachable from an earlier send surfaces here on
            // Windows; it says nothing about this socket.
            Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
            Err(e) => {
                ReceiverStats::bump(&shared.stats.read_errors);
                shared.logger.log("receiver", TransportEvent::ReadError { message: e.to_string() });
                tokio::select! {
                    _ = shared.cancel.cancelled() => break,
                    _ = tokio::time::sleep(READ_RETRY_BACKOFF) => {}
                }
            }
        }
    }
}

fn handle_datagram(shared: &Shared, frames_tx: &mpsc::Sender<Bytes>, data: Bytes, src: SocketAddr) {
    let stats = &shared.stats;
    match classify(data) {
        Datagram::Legacy(frame) => {
            ReceiverStats::bump(&stats.legacy_frames);
            shared.logger.log("receiver", TransportEvent::LegacyPassthrough { bytes: frame.len(), from: src });
            emit(shared, frames_tx, frame);
        }
        Datagram::Fragment { header, payload } => {
            let outcome = {
                let mut table = shared.table();
                let outcome = table.insert(header, payload, Instant::now());
                stats.in_flight.store(table.len() as u64, Ordering::Relaxed);
                outcome
            };
            match outcome {
                Ingest::Pending => ReceiverStats::bump(&stats.fragments),
                Ingest::Duplicate | Ingest::Late => ReceiverStats::bump(&stats.duplicates),
                Ingest::Malformed => ReceiverStats::bump(&stats.malformed),
                Ingest::Complete { frame_id, fragments, frame } => {
                    ReceiverStats::bump(&stats.fragments);
                    ReceiverStats::bump(&stats.frames_completed);
                    shared.logger.log(
                        "receiver",
                        TransportEvent::FrameReassembled { frame_id, bytes: frame.len(), fragments },
                    );
                    emit(shared, frames_tx, frame);
                }
            }
        }
    }
}

/// Queue a frame for `next`, dropping it if the queue is full.
fn emit(shared: &Shared, frames_tx: &mpsc::Sender<Bytes>, frame: Bytes) {
    match frames_tx.try_send(frame) {
        Ok(()) => {}
        Err(TrySendError::Full(frame)) => {
            ReceiverStats::bump(&shared.stats.outbound_dropped);
            shared.logger.log("receiver", TransportEvent::OutboundDropped { bytes: frame.len() });
        }
        // receiver handle gone; the read loop is about to be cancelled
        Err(TrySendError::Closed(_)) => {}
    }
}

async fn purge_loop(shared: Arc<Shared>) {
    let mut interval = tokio::time::interval(PURGE_INTERVAL);

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let (purged, in_flight) = {
            let mut table = shared.table();
            (table.purge(Instant::now()), table.len())
        };
        if purged > 0 {
            shared
                .stats
                .frames_purged
                .fetch_add(purged as u64, Ordering::Relaxed);
            shared
                .stats
                .in_flight
                .store(in_flight as u64, Ordering::Relaxed);
            shared.logger.log("receiver", TransportEvent::FramesPurged { count: purged, in_flight });
        }
    }
}

/// Create a UDP socket bound to the group port with reuse options and a
/// large receive buffer.
fn create_recv_socket(port: u16) -> io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuse_port(true)?;
    if let Err(e) = socket.set_recv_buffer_size(UDP_RECV_BUFFER) {
        tracing::warn!("failed to set recv buffer to {} bytes: {}", UDP_RECV_BUFFER, e);
    }
    if let Err(e) = socket.set_multicast_loop_v4(true) {
        tracing::warn!("failed to enable multicast loopback: {}", e);
    }
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)).into())?;
    Ok(socket)
}

/// Join on the named interface, or on the first candidate that accepts.
fn join_group(
    socket: &Socket,
    group: SocketAddrV4,
    named: Option<MulticastInterface>,
    logger: &dyn TransportLogger,
) -> Option<MulticastInterface> {
    let candidates = match named {
        Some(iface) => vec![iface],
        None => iface::candidates(),
    };

    for iface in candidates {
        match socket.join_multicast_v4(group.ip(), &iface.addr) {
            Ok(()) => {
                logger.log(
                    "receiver",
                    TransportEvent::GroupJoined { group: *group.ip(), interface: iface.name.clone() },
                );
                return Some(iface);
            }
            Err(e) => {
                logger.log(
                    "receiver",
                    TransportEvent::GroupJoinFailed {
                        group: *group.ip(),
                        interface: iface.name.clone(),
                        error: e.to_string(),
                    },
                );
            }
        }
    }

    logger.log("receiver", TransportEvent::DegradedMode { group: *group.ip(), port: group.port() });
    None
}
