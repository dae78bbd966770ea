//! TTL sweeper: one expiry pass over every device, driven by the host's timer

use tracing::debug;

use crate::device::SweepReport;
use crate::manager::SweepScope;
use crate::shared::GatekeeperCache;

/// Periodic expiry routine
pub struct TtlSweeper {
    cache: GatekeeperCache,
    passes: u64,
    last_report: Option<SweepReport>,
    last_entries: Option<(u64, u64)>,
}

impl TtlSweeper {
    /// Sweeper over `cache`
    pub fn new(cache: GatekeeperCache) -> Self {
        Self {
            cache,
            passes: 0,
            last_report: None,
            last_entries: None,
        }
    }

    /// Evict every expired record across all devices
    pub fn run_once(&mut self) -> SweepReport {
        // Counts and sweep under one lock so concurrent inserts cannot skew them
        let (before, report, after) = self.cache.with_manager(|manager| {
            let before = manager.count();
            let report = manager.sweep_expired(SweepScope::All);
            (before, report, manager.count())
        });
        self.passes += 1;

        if report.total() > 0 {
            debug!(
                "TTL sweep #{}: {} devices, {} attributes and {} flows evicted, {} -> {} entries",
                self.passes,
                report.devices,
                report.attributes,
                report.flows,
                before,
                after
            );
        }

        self.last_report = Some(report);
        self.last_entries = Some((before, after));
        report
    }

    /// Completed passes
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Report of the most recent pass
    pub fn last_report(&self) -> Option<SweepReport> {
        self.last_report
    }

    /// Entry count before and after the most recent pass
    pub fn last_entries(&self) -> Option<(u64, u64)> {
        self.last_entries
    }

    /// Cache being swept
    pub fn cache(&self) -> &GatekeeperCache {
        &self.cache
    }
}
