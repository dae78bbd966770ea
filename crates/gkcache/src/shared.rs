//! GatekeeperCache: thread-safe handle around the cache manager
//!
//! The manager itself assumes serialized access. This handle puts one
//! coarse lock around it so the traffic path and the janitor sweep can run
//! on different threads; each call holds the lock for exactly one manager
//! operation.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::device::SweepReport;
use crate::error::Result;
use crate::kind::{FlowDirection, RequestType};
use crate::mac::MacAddr;
use crate::manager::{AttributeEntry, CacheManager, CachedVerdict, FlowEntry, InsertOutcome, SweepScope};
use crate::record::FlowKey;
use crate::stats::CacheStats;

/// Shared verdict cache
#[derive(Clone)]
pub struct GatekeeperCache {
    /// Cache engine
    inner: Arc<Mutex<CacheManager>>,

    /// Cache statistics, readable without the lock
    stats: Arc<CacheStats>,
}

impl GatekeeperCache {
    /// Create a cache on the system clock
    pub fn new(config: CacheConfig) -> Result<Self> {
        Ok(Self::from_manager(CacheManager::new(config)?))
    }

    /// Create a cache on the given clock
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Ok(Self::from_manager(CacheManager::with_clock(config, clock)?))
    }

    /// Wrap an existing manager
    pub fn from_manager(manager: CacheManager) -> Self {
        let stats = Arc::clone(manager.stats());
        Self {
            inner: Arc::new(Mutex::new(manager)),
            stats,
        }
    }

    /// Store an attribute verdict
    pub fn insert_attribute(&self, entry: AttributeEntry) -> Result<InsertOutcome> {
        self.inner.lock().insert_attribute(entry)
    }

    /// Look up an attribute verdict
    pub fn lookup_attribute(
        &self,
        mac: MacAddr,
        request_type: RequestType,
        value: &str,
    ) -> Result<CachedVerdict> {
        self.inner.lock().lookup_attribute(mac, request_type, value)
    }

    /// Remove an attribute record
    pub fn delete_attribute(&self, mac: MacAddr, request_type: RequestType, value: &str) -> Result<()> {
        self.inner.lock().delete_attribute(mac, request_type, value)
    }

    /// Store a flow verdict
    pub fn insert_flow(&self, entry: FlowEntry) -> Result<InsertOutcome> {
        self.inner.lock().insert_flow(entry)
    }

    /// Look up a flow verdict
    pub fn lookup_flow(
        &self,
        mac: MacAddr,
        direction: FlowDirection,
        key: &FlowKey,
    ) -> Result<CachedVerdict> {
        self.inner.lock().lookup_flow(mac, direction, key)
    }

    /// Remove a flow record
    pub fn delete_flow(&self, mac: MacAddr, direction: FlowDirection, key: &FlowKey) -> Result<()> {
        self.inner.lock().delete_flow(mac, direction, key)
    }

    /// Evict expired records
    pub fn sweep_expired(&self, scope: SweepScope) -> SweepReport {
        self.inner.lock().sweep_expired(scope)
    }

    /// Drop one device and its records
    pub fn purge_device(&self, mac: MacAddr) -> Result<usize> {
        self.inner.lock().purge_device(mac)
    }

    /// Drop everything
    pub fn cleanup(&self) {
        self.inner.lock().cleanup();
    }

    /// Live records
    pub fn count(&self) -> u64 {
        self.inner.lock().count()
    }

    /// Devices with a cache
    pub fn device_count(&self) -> usize {
        self.inner.lock().device_count()
    }

    /// Dump every record at debug level
    pub fn log_entries(&self) {
        self.inner.lock().log_entries();
    }

    /// Run `f` with the manager locked
    pub fn with_manager<T>(&self, f: impl FnOnce(&mut CacheManager) -> T) -> T {
        let mut manager = self.inner.lock();
        f(&mut *manager)
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}
