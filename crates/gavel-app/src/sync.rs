// Startup clock sync: keep measuring until one attempt succeeds.

use std::time::Duration;

use tokio::sync::oneshot;
use tracing::warn;

use gavel_core::clock::{ClockSynchronizer, Measurement};
use gavel_core::snapshot::SnapshotSource;

/// Measure, retrying every `retry` until a measurement succeeds.
///
/// Until then the app runs with a zero offset and no items.
pub async fn sync_with_retry<S: SnapshotSource>(
    synchronizer: &ClockSynchronizer<S>,
    retry: Duration,
) -> Measurement {
    let mut attempt = 1u32;
    loop {
        match synchronizer.measure().await {
            Ok(measurement) => return measurement,
            Err(e) => {
                warn!("Snapshot attempt {attempt} failed: {e}; retrying in {retry:?}");
                attempt += 1;
                tokio::time::sleep(retry).await;
            }
        }
    }
}

/// Run [`sync_with_retry`] on its own task and hand the result back over a
/// oneshot.
pub fn spawn_initial_sync<S>(
    synchronizer: ClockSynchronizer<S>,
    retry: Duration,
) -> (oneshot::Receiver<Measurement>, tokio::task::JoinHandle<()>)
where
    S: SnapshotSource + 'static,
{
    let (tx, rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        let measurement = sync_with_retry(&synchronizer, retry).await;
        let _ = tx.send(measurement);
    });
    (rx, handle)
}
