//! Background TTL sweep task

use std::time::Duration;

use gkcache::{GatekeeperCache, TtlSweeper};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Runs a [`TtlSweeper`] on a fixed period
pub struct Janitor {
    sweeper: TtlSweeper,
    period: Duration,
}

impl Janitor {
    pub fn new(cache: GatekeeperCache, period: Duration) -> Self {
        Self {
            sweeper: TtlSweeper::new(cache),
            period,
        }
    }

    /// Spawn the sweep loop; `None` when the period is zero
    pub fn spawn(self) -> Option<JoinHandle<()>> {
        if self.period.is_zero() {
            info!("TTL janitor disabled");
            return None;
        }

        info!(
            "Starting TTL janitor with {}ms interval",
            self.period.as_millis()
        );
        Some(tokio::spawn(self.run()))
    }

    async fn run(mut self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let report = self.sweeper.run_once();
            debug!(
                "Janitor pass {} evicted {} entries, {} remain",
                self.sweeper.passes(),
                report.total(),
                self.sweeper.cache().count()
            );
        }
    }
}
