//! `ExpirySweeper` periodically deletes authorization records whose every
//! credential has expired.
//!
//! Expired records are already invisible to validation and introspection, the
//! sweep only reclaims storage. The task stops when the sweeper is dropped.

use crate::store::{RecordStore, Store};
use chrono::Utc;
use log::{debug, error, info};
use stats::SweeperStats;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

mod stats;

#[derive(Debug)]
pub struct ExpirySweeper {
    /// A cancellation token to signal shutdown
    shutdown_token: CancellationToken,
    stats: Arc<SweeperStats>,
}

impl ExpirySweeper {
    /// Spawns the sweep task, running one pass every `interval`
    pub fn start(store: Store, interval: Duration) -> Self {
        let sweeper = Self {
            shutdown_token: CancellationToken::new(),
            stats: Arc::new(SweeperStats::default()),
        };
        sweeper.spawn(store, interval);
        sweeper
    }

    /// Number of sweep passes performed so far
    pub fn runs(&self) -> usize {
        self.stats.runs()
    }

    /// Number of passes that failed
    pub fn failures(&self) -> usize {
        self.stats.failures()
    }

    /// Total number of records removed
    pub fn removed(&self) -> usize {
        self.stats.removed()
    }

    /// Stops the sweep task. Dropping the sweeper has the same effect.
    pub fn shutdown(&self) {
        self.shutdown_token.cancel();
    }

    fn spawn(&self, store: Store, period: Duration) {
        let shutdown_token = self.shutdown_token.clone();
        let stats = self.stats.clone();

        info!("Starting expiry sweeper (interval: {}s)", period.as_secs_f64());
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_token.cancelled() => {
                        info!("Expiry sweeper received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        match store.remove_expired(Utc::now()).await {
                            Ok(0) => {
                                stats.record_run(0);
                                debug!("Expiry sweep found nothing to remove");
                            }
                            Ok(count) => {
                                stats.record_run(count);
                                info!("Expiry sweep removed {} records", count);
                            }
                            Err(e) => {
                                stats.record_failure();
                                error!("Expiry sweep failed: {}", e);
                            }
                        }
                    }
                }
            }
        });
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        debug!("Expiry sweeper is dropping, stopping sweep task");
        self.shutdown_token.cancel();
    }
}
