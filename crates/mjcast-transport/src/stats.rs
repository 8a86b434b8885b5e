//! Receiver statistics, shared between the background tasks and callers.
//! All fields are atomic for lock-free reads.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Default)]
pub struct ReceiverStats {
    /// Datagrams read from the socket.
    pub datagrams: AtomicU64,
    /// Fragments stored into an in-flight frame.
    pub fragments: AtomicU64,
    /// Fragments ignored because their index was already present or their
    /// frame was already emitted.
    pub duplicates: AtomicU64,
    /// Fragments ignored for an inconsistent header (bad index or total).
    pub malformed: AtomicU64,
    /// Frames fully reassembled.
    pub frames_completed: AtomicU64,
    /// Short or foreign-version datagrams forwarded whole.
    pub legacy_frames: AtomicU64,
    /// Incomplete frames dropped by the purge loop.
    pub frames_purged: AtomicU64,
    /// Frames dropped because the outbound queue was full.
    pub outbound_dropped: AtomicU64,
    /// Failed socket reads.
    pub read_errors: AtomicU64,
    /// Frames currently being assembled.
    pub in_flight: AtomicU64,
}

/// Point-in-time copy of `ReceiverStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReceiverStatsSnapshot {
    pub datagrams: u64,
    pub fragments: u64,
    pub duplicates: u64,
    pub malformed: u64,
    pub frames_completed: u64,
    pub legacy_frames: u64,
    pub frames_purged: u64,
    pub outbound_dropped: u64,
    pub read_errors: u64,
    pub in_flight: u64,
}

impl ReceiverStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ReceiverStatsSnapshot {
        ReceiverStatsSnapshot {
            datagrams: self.datagrams.load(Ordering::Relaxed),
            fragments: self.fragments.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            frames_completed: self.frames_completed.load(Ordering::Relaxed),
            legacy_frames: self.legacy_frames.load(Ordering::Relaxed),
            frames_purged: self.frames_purged.load(Ordering::Relaxed),
            outbound_dropped: self.outbound_dropped.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }
}
