use std::time::Duration;

use mjcast_hub::Hub;
use mjcast_transport::{MulticastReceiver, TransportError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How often the subscriber count is logged.
pub const CLIENT_REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Move reassembled frames from the receiver into the hub until cancelled
/// or the receiver closes. Returns the number of frames broadcast.
pub async fn run_pump(mut receiver: MulticastReceiver, hub: Hub, cancel: CancellationToken) -> u64 {
    let mut broadcasted: u64 = 0;

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = receiver.next() => frame,
        };

        match frame {
            Ok(frame) => {
                let outcome = hub.broadcast(frame);
                broadcasted += 1;
                if outcome.dropped > 0 {
                    debug!("hub: {} slow subscribers skipped a frame", outcome.dropped);
                }
                if broadcasted % 10 == 0 {
                    info!("broadcasted frames: {}", broadcasted);
                }
            }
            Err(TransportError::Closed) => break,
            Err(e) => {
                warn!("rx: {}", e);
            }
        }
    }

    receiver.shutdown().await;
    broadcasted
}

/// Log `clients=<n>` periodically until cancelled.
pub async fn run_client_report(hub: Hub, every: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    // first tick fires at once; skip it
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => info!("hub: clients={}", hub.subscriber_count()),
        }
    }
}
