use crate::engine::AggregationEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Pilote l'engine : un cycle immédiat puis un cycle après chaque intervalle.
/// Les cycles sont séquentiels : un cycle trop long retarde simplement le suivant.
pub struct PollScheduler {
    engine: Arc<AggregationEngine>,
    interval: Duration,
}

impl PollScheduler {
    pub fn new(engine: Arc<AggregationEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "alert polling started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = self.engine.run_cycle() => {}
                }
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
            info!(cycles = self.engine.cycle_count(), "alert polling stopped");
        })
    }
}
