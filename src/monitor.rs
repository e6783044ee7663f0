//! Periodic status monitor
//!
//! Background task that re-tests every registered cluster on a fixed
//! interval, so stored statuses stay current without anyone calling the
//! test endpoint.

use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::inventory::ClusterInventory;
use crate::tester::ConnectionReport;

pub struct StatusMonitor {
    inventory: ClusterInventory,
    interval: Duration,
}

impl StatusMonitor {
    pub fn new(inventory: ClusterInventory, interval: Duration) -> Self {
        Self { inventory, interval }
    }

    /// Test all clusters concurrently. A failed listing yields no reports.
    pub async fn check_all(&self) -> Vec<(String, ConnectionReport)> {
        let clusters = match self.inventory.list().await {
            Ok(clusters) => clusters,
            Err(e) => {
                warn!("Status monitor could not list clusters: {}", e);
                return Vec::new();
            }
        };

        let checks = clusters.iter().map(|cluster| async move {
            let report = self.inventory.test_connection(cluster.id()).await;
            (cluster.id().to_string(), report)
        });
        join_all(checks).await
    }

    /// Run until the shutdown signal flips to `true`
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting status monitor: interval={}s", self.interval.as_secs());

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    let reports = self.check_all().await;
                    let connected = reports.iter().filter(|(_, r)| r.connected).count();
                    debug!(
                        "Status monitor checked {} clusters ({} connected)",
                        reports.len(),
                        connected
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Status monitor shutting down");
                        break;
                    }
                }
            }
        }
    }
}

/// Spawn the monitor as a background task.
///
/// Returns a shutdown sender that can be used to stop the loop.
pub fn spawn_monitor(inventory: ClusterInventory, interval: Duration) -> watch::Sender<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = StatusMonitor::new(inventory, interval);

    tokio::spawn(async move {
        monitor.run(shutdown_rx).await;
    });

    shutdown_tx
}
