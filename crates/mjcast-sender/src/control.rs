//! Sender control loop.
//!
//! ```text
//! every 200ms: FrameSource -> sha256 == last sent? -> skip
//!                                      \-> MulticastSender::send_frame -> rate estimate
//! ```

use std::time::{Duration, Instant};

use mjcast_transport::{MulticastSender, SentFrame, TransportError};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bandwidth::{bits_on_wire, BandwidthEstimator, RateSample};
use crate::change::ChangeDetector;
use crate::source::{FrameSource, FrameSourceError};

/// 5 Hz.
pub const TICK: Duration = Duration::from_millis(200);

/// Outcome of one tick.
#[derive(Debug)]
pub enum Tick {
    Sent { frame: SentFrame, rate: RateSample },
    Unchanged,
    SourceFailed(FrameSourceError),
    SendFailed(TransportError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlStats {
    pub sent: u64,
    pub skipped: u64,
    pub source_errors: u64,
    pub send_errors: u64,
}

pub struct ControlLoop<S> {
    source: S,
    sender: MulticastSender,
    detector: ChangeDetector,
    estimator: BandwidthEstimator,
    mtu: usize,
    repeats: usize,
    stats: ControlStats,
}

impl<S: FrameSource> ControlLoop<S> {
    pub fn new(source: S, sender: MulticastSender, mtu: usize, repeats: usize) -> Self {
        Self {
            source,
            sender,
            detector: ChangeDetector::new(),
            estimator: BandwidthEstimator::default(),
            mtu,
            repeats: repeats.max(1),
            stats: ControlStats::default(),
        }
    }

    pub fn stats(&self) -> ControlStats {
        self.stats
    }

    /// Generate, compare, and send at most one frame.
    pub async fn tick(&mut self) -> Tick {
        let frame = match self.source.generate_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.source_errors += 1;
                return Tick::SourceFailed(e);
            }
        };

        let Some(digest) = self.detector.check(&frame) else {
            self.stats.skipped += 1;
            return Tick::Unchanged;
        };

        match self.sender.send_frame(&frame, self.mtu, self.repeats).await {
            Ok(sent) => {
                self.detector.commit(digest);
                self.stats.sent += 1;
                let bits = bits_on_wire(sent.bytes, sent.fragments, sent.repeats);
                let rate = self.estimator.record(bits, Instant::now());
                debug!("frame {} digest {}", sent.frame_id, hex::encode(&digest[..6]));
                Tick::Sent { frame: sent, rate }
            }
            Err(e) => {
                self.stats.send_errors += 1;
                Tick::SendFailed(e)
            }
        }
    }

    /// Tick until cancelled. Errors are logged and the next tick tries again.
    pub async fn run(mut self, cancel: CancellationToken) -> ControlStats {
        let mut interval = tokio::time::interval(TICK);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.tick().await {
                Tick::Sent { frame, rate } => {
                    info!(
                        "frame: bytes={} fragments={} bytes_on_wire={} repeats={} inst={:.3} Mbps ewma={:.3} Mbps",
                        frame.bytes,
                        frame.fragments,
                        bits_on_wire(frame.bytes, frame.fragments, frame.repeats) / 8,
                        frame.repeats,
                        rate.inst_bps / 1e6,
                        rate.ewma_bps / 1e6,
                    );
                    if self.stats.sent % 10 == 0 {
                        info!("sent frames: {} (skipped {})", self.stats.sent, self.stats.skipped);
                    }
                }
                Tick::Unchanged => {}
                Tick::SourceFailed(e) => warn!("frame: {}", e),
                Tick::SendFailed(e) => warn!("send: {}", e),
            }
        }

        info!("shutting down sender after {} frames", self.stats.sent);
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use mjcast_transport::{decode_fragment_header, NullLogger, SenderConfig};
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tokio::net::UdpSocket;

    /// Replays a fixed list of frames, then fails.
    struct Scripted(VecDeque<Bytes>);

    impl FrameSource for Scripted {
        fn generate_frame(&mut self) -> Result<Bytes, FrameSourceError> {
            self.0
                .pop_front()
                .ok_or_else(|| FrameSourceError::NoFrames("script".into()))
        }
    }

    async fn control(frames: Vec<Vec<u8>>) -> (ControlLoop<Scripted>, UdpSocket) {
        let sink = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sender = MulticastSender::open(SenderConfig {
            logger: Arc::new(NullLogger),
            ..SenderConfig::new(sink.local_addr().unwrap().to_string())
        })
        .await
        .unwrap();
        let source = Scripted(frames.into_iter().map(Bytes::from).collect());
        (ControlLoop::new(source, sender, 1200, 1), sink)
    }

    #[tokio::test]
    async fn test_identical_frames_send_once() {
        let a = vec![7u8; 3000];
        let mut b = a.clone();
        b[1500] ^= 1;
        let (mut ctl, sink) = control(vec![a.clone(), a, b]).await;

        let first = match ctl.tick().await {
            Tick::Sent { frame, .. } => frame,
            other => panic!("expected send, got {:?}", other),
        };
        assert_eq!(first.fragments, 3);
        assert!(matches!(ctl.tick().await, Tick::Unchanged));
        let second = match ctl.tick().await {
            Tick::Sent { frame, .. } => frame,
            other => panic!("expected send, got {:?}", other),
        };
        assert_eq!(second.frame_id, first.frame_id + 1);

        // Exactly two frames' worth of datagrams reached the wire.
        let mut buf = vec![0u8; 2048];
        let mut ids = Vec::new();
        for _ in 0..6 {
            let (len, _) = sink.recv_from(&mut buf).await.unwrap();
            ids.push(decode_fragment_header(&buf[..len]).unwrap().frame_id);
        }
        assert_eq!(ids, vec![1, 1, 1, 2, 2, 2]);

        assert_eq!(ctl.stats(), ControlStats { sent: 2, skipped: 1, source_errors: 0, send_errors: 0 });
    }

    #[tokio::test]
    async fn test_source_error_does_not_stop_loop() {
        let (mut ctl, _sink) = control(vec![vec![1u8; 10]]).await;
        assert!(matches!(ctl.tick().await, Tick::Sent { .. }));
        assert!(matches!(ctl.tick().await, Tick::SourceFailed(_)));
        assert_eq!(ctl.stats().source_errors, 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let (ctl, _sink) = control(vec![vec![1u8; 10], vec![1u8; 10]]).await;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(ctl.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let stats = tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert_eq!(stats.sent, 1);
    }
}
