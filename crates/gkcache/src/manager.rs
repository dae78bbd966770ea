//! Cache manager: every per-device cache plus the global entry counter
//!
//! The manager is an explicit context object. Hosts build one at start-up
//! and hand it (usually wrapped in a [`GatekeeperCache`]) to the traffic
//! path and the janitor sweep.
//!
//! ## Counter invariant
//! `count()` always equals the number of records reachable from the device
//! trees. Every path that stores a new record increments it exactly once and
//! every path that drops records (delete, lookup of an expired record, TTL
//! sweep, device purge, cleanup) decrements it by the number dropped.
//!
//! [`GatekeeperCache`]: crate::GatekeeperCache

use std::collections::HashMap;
use std::sync::Arc;

use ahash::RandomState;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::device::{DeviceCache, SweepReport};
use crate::error::{Error, Result};
use crate::kind::{AttrKind, FlowDirection, RequestType};
use crate::mac::MacAddr;
use crate::record::{AttrRecord, Attribute, CacheStamp, Expiring, FlowKey, FlowRecord};
use crate::stats::CacheStats;
use crate::verdict::Verdict;

/// Attribute verdict handed to the cache after a resolver reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeEntry {
    /// Originating device
    pub mac: MacAddr,
    /// Classifier request type
    pub request_type: RequestType,
    /// Attribute value (host name, URL, address text, app id)
    pub value: String,
    /// Resolver verdict
    pub verdict: Verdict,
    /// Redirect target, kept for the hostname family only
    pub redirect: Option<String>,
    /// Lifetime; the configured default when `None`
    pub ttl: Option<u64>,
}

impl AttributeEntry {
    /// Entry without redirect, using the default TTL
    pub fn new(
        mac: MacAddr,
        request_type: RequestType,
        value: impl Into<String>,
        verdict: Verdict,
    ) -> Self {
        Self {
            mac,
            request_type,
            value: value.into(),
            verdict,
            redirect: None,
            ttl: None,
        }
    }

    /// Set the redirect target
    pub fn with_redirect(mut self, target: impl Into<String>) -> Self {
        self.redirect = Some(target.into());
        self
    }

    /// Set an explicit TTL
    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Flow verdict handed to the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowEntry {
    /// Originating device
    pub mac: MacAddr,
    /// Flow tree to store into
    pub direction: FlowDirection,
    /// Flow identity
    pub key: FlowKey,
    /// Resolver verdict
    pub verdict: Verdict,
    /// Lifetime; the configured default when `None`
    pub ttl: Option<u64>,
}

impl FlowEntry {
    /// Entry using the default TTL
    pub fn new(mac: MacAddr, direction: FlowDirection, key: FlowKey, verdict: Verdict) -> Self {
        Self {
            mac,
            direction,
            key,
            verdict,
            ttl: None,
        }
    }

    /// Set an explicit TTL
    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// What an insert did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertOutcome {
    /// A new record was stored
    Inserted,
    /// An existing record was refreshed in place
    Replaced,
}

/// Copy of a cached verdict returned by lookups
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedVerdict {
    /// Cached verdict
    pub verdict: Verdict,
    /// Redirect target (hostname family only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    /// Lookups served by the record, this one included
    pub hit_count: u64,
    /// Seconds before the record expires
    pub expires_in: u64,
}

impl CachedVerdict {
    fn from_parts(verdict: &Verdict, redirect: Option<&str>, stamp: &CacheStamp, now: u64) -> Self {
        Self {
            verdict: verdict.clone(),
            redirect: redirect.map(str::to_string),
            hit_count: stamp.hit_count,
            expires_in: stamp.expires_in(now),
        }
    }
}

/// Devices covered by a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepScope {
    /// Every device
    All,
    /// One device
    Device(MacAddr),
}

/// Owner of every per-device cache
pub struct CacheManager {
    devices: HashMap<MacAddr, DeviceCache, RandomState>,
    total_entries: u64,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    stats: Arc<CacheStats>,
}

impl CacheManager {
    /// Create a manager on the system clock
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Create a manager on the given clock
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            devices: HashMap::with_hasher(RandomState::new()),
            total_entries: 0,
            config,
            clock,
            stats: Arc::new(CacheStats::new()),
        })
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    /// Store an attribute verdict
    ///
    /// An existing record for the same (device, tree, value) is refreshed in
    /// place. A new record is refused with [`Error::CacheFull`] once the
    /// cache holds `max_entries` records and none of them has expired.
    pub fn insert_attribute(&mut self, entry: AttributeEntry) -> Result<InsertOutcome> {
        let AttributeEntry {
            mac,
            request_type,
            value,
            verdict,
            redirect,
            ttl,
        } = entry;

        let kind = request_type
            .attr_kind()
            .ok_or(Error::InvalidKind(request_type))?;
        if value.is_empty() {
            return Err(Error::MissingValue);
        }

        let now = self.clock.now_secs();
        let ttl = ttl.unwrap_or(self.config.attribute_ttl_secs);

        let existing = self
            .devices
            .get_mut(&mac)
            .and_then(|device| device.attr_tree_mut(kind).get_mut(value.as_str()));
        if let Some(record) = existing {
            record.verdict = verdict;
            record.attribute.set_redirect(redirect);
            record.stamp.refresh(now, ttl);
            self.stats.record_replace();
            trace!("Refreshed {} attribute '{}' for device {}", kind, value, mac);
            return Ok(InsertOutcome::Replaced);
        }

        self.reserve_slot()?;
        trace!("Adding {} attribute '{}' for device {}", request_type, value, mac);
        let record = AttrRecord::new(Attribute::new(kind, value, redirect), verdict, now, ttl);
        self.device_entry(mac).attr_tree_mut(kind).insert(record);
        self.total_entries += 1;
        self.stats.record_insert();

        Ok(InsertOutcome::Inserted)
    }

    /// Look up a cached attribute verdict
    ///
    /// A record found expired is evicted and reported as [`Error::NotFound`].
    pub fn lookup_attribute(
        &mut self,
        mac: MacAddr,
        request_type: RequestType,
        value: &str,
    ) -> Result<CachedVerdict> {
        let kind = match Self::attr_kind_for(request_type, "lookup") {
            Some(kind) => kind,
            None => return self.miss(),
        };
        let now = self.clock.now_secs();

        let tree = match self.devices.get_mut(&mac) {
            Some(device) => device.attr_tree_mut(kind),
            None => return self.miss(),
        };

        match tree.get_mut(value) {
            None => return self.miss(),
            Some(record) if !record.is_expired(now) => {
                record.stamp.touch();
                self.stats.record_hit();
                return Ok(CachedVerdict::from_parts(
                    &record.verdict,
                    record.attribute.redirect(),
                    &record.stamp,
                    now,
                ));
            }
            Some(_) => {}
        }

        if tree.remove(value).is_some() {
            trace!(
                "Removing {} attribute '{}' for device {} due to expired TTL",
                kind,
                value,
                mac
            );
            self.release(1);
            self.stats.record_evictions(1);
        }
        self.miss()
    }

    /// Remove one attribute record
    ///
    /// Hostname, FQDN, HTTP host and SNI all address the hostname-family
    /// tree. Flow request types and unknown values report [`Error::NotFound`].
    pub fn delete_attribute(
        &mut self,
        mac: MacAddr,
        request_type: RequestType,
        value: &str,
    ) -> Result<()> {
        if value.is_empty() {
            return Err(Error::NotFound);
        }
        let kind = Self::attr_kind_for(request_type, "delete").ok_or(Error::NotFound)?;
        let device = self.devices.get_mut(&mac).ok_or(Error::NotFound)?;
        let record = device.attr_tree_mut(kind).remove(value).ok_or(Error::NotFound)?;

        trace!(
            "Deleting {} attribute '{}' for device {}",
            kind,
            record.attribute.value(),
            mac
        );
        drop(record);

        self.release(1);
        self.stats.record_delete();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Flows
    // ------------------------------------------------------------------

    /// Store a flow verdict, same replace and capacity rules as attributes
    pub fn insert_flow(&mut self, entry: FlowEntry) -> Result<InsertOutcome> {
        let FlowEntry {
            mac,
            direction,
            key,
            verdict,
            ttl,
        } = entry;

        let now = self.clock.now_secs();
        let ttl = ttl.unwrap_or(self.config.flow_ttl_secs);

        let existing = self
            .devices
            .get_mut(&mac)
            .and_then(|device| device.flow_tree_mut(direction).get_mut(&key));
        if let Some(record) = existing {
            record.verdict = verdict;
            record.stamp.refresh(now, ttl);
            self.stats.record_replace();
            trace!("Refreshed {} flow {} for device {}", direction, key, mac);
            return Ok(InsertOutcome::Replaced);
        }

        self.reserve_slot()?;
        trace!("Adding {} flow {} for device {}", direction, key, mac);
        let record = FlowRecord::new(key, direction, verdict, now, ttl);
        self.device_entry(mac).flow_tree_mut(direction).insert(record);
        self.total_entries += 1;
        self.stats.record_insert();

        Ok(InsertOutcome::Inserted)
    }

    /// Look up a cached flow verdict, evicting it if expired
    pub fn lookup_flow(
        &mut self,
        mac: MacAddr,
        direction: FlowDirection,
        key: &FlowKey,
    ) -> Result<CachedVerdict> {
        let now = self.clock.now_secs();

        let tree = match self.devices.get_mut(&mac) {
            Some(device) => device.flow_tree_mut(direction),
            None => return self.miss(),
        };

        match tree.get_mut(key) {
            None => return self.miss(),
            Some(record) if !record.is_expired(now) => {
                record.stamp.touch();
                self.stats.record_hit();
                return Ok(CachedVerdict::from_parts(&record.verdict, None, &record.stamp, now));
            }
            Some(_) => {}
        }

        if tree.remove(key).is_some() {
            trace!(
                "Removing {} flow {} for device {} due to expired TTL",
                direction,
                key,
                mac
            );
            self.release(1);
            self.stats.record_evictions(1);
        }
        self.miss()
    }

    /// Remove one flow record
    pub fn delete_flow(&mut self, mac: MacAddr, direction: FlowDirection, key: &FlowKey) -> Result<()> {
        let device = self.devices.get_mut(&mac).ok_or(Error::NotFound)?;
        let record = device.flow_tree_mut(direction).remove(key).ok_or(Error::NotFound)?;

        trace!("Deleting {} flow {} for device {}", direction, record.key, mac);
        drop(record);

        self.release(1);
        self.stats.record_delete();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Evict every expired record in `scope`
    ///
    /// Per-device caches left empty stay in place unless
    /// `reclaim_empty_devices` is configured.
    pub fn sweep_expired(&mut self, scope: SweepScope) -> SweepReport {
        let now = self.clock.now_secs();
        let mut report = SweepReport::default();

        trace!(
            "Cache entries before flushing expired TTL entries: {}",
            self.total_entries
        );

        match scope {
            SweepScope::All => {
                for device in self.devices.values_mut() {
                    report.merge(device.remove_expired(now));
                }
            }
            SweepScope::Device(mac) => {
                if let Some(device) = self.devices.get_mut(&mac) {
                    report.merge(device.remove_expired(now));
                }
            }
        }

        self.release(report.total());
        self.stats.record_evictions(report.total() as u64);

        if self.config.reclaim_empty_devices {
            self.reclaim_empty(scope);
        }

        trace!(
            "Cache entries after flushing expired TTL entries: {}",
            self.total_entries
        );
        report
    }

    /// Drop every record of one device and the device itself
    ///
    /// Returns the number of records removed.
    pub fn purge_device(&mut self, mac: MacAddr) -> Result<usize> {
        let mut device = self.devices.remove(&mac).ok_or(Error::NotFound)?;
        let before = self.total_entries;

        let removed = device.purge();
        self.release(removed);
        self.stats.record_purged(removed as u64);

        info!("Purged {} cache entries for device {}", removed, mac);
        Ok((before - self.total_entries) as usize)
    }

    /// Drop every device and record; the counter returns to zero
    pub fn cleanup(&mut self) {
        if self.devices.is_empty() && self.total_entries == 0 {
            return;
        }

        let mut removed = 0usize;
        for (_, mut device) in self.devices.drain() {
            removed += device.purge();
        }
        self.release(removed);
        debug_assert_eq!(self.total_entries, 0);
        self.total_entries = 0;
        self.stats.record_purged(removed as u64);

        info!("Cache cleanup released {} entries", removed);
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Live records across every device
    pub fn count(&self) -> u64 {
        self.total_entries
    }

    /// Count records by walking every tree
    pub fn recount(&self) -> u64 {
        self.devices.values().map(|d| d.len() as u64).sum()
    }

    /// Devices with a cache, empty shells included
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// True if `mac` has a cache
    pub fn contains_device(&self, mac: MacAddr) -> bool {
        self.devices.contains_key(&mac)
    }

    /// Records held for `mac`
    pub fn device_entry_count(&self, mac: MacAddr) -> Option<usize> {
        self.devices.get(&mac).map(DeviceCache::len)
    }

    /// Cache for one device
    pub fn device(&self, mac: MacAddr) -> Option<&DeviceCache> {
        self.devices.get(&mac)
    }

    /// Every device cache
    pub fn devices(&self) -> impl Iterator<Item = &DeviceCache> + '_ {
        self.devices.values()
    }

    /// Active policy
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Activity counters
    pub fn stats(&self) -> &Arc<CacheStats> {
        &self.stats
    }

    /// Dump every record at debug level
    pub fn log_entries(&self) {
        let now = self.clock.now_secs();
        debug!(
            "Gatekeeper cache: {} entries across {} devices",
            self.total_entries,
            self.devices.len()
        );

        for device in self.devices.values() {
            debug!("Device {}: {} entries", device.mac(), device.len());
            for kind in AttrKind::ALL {
                for record in device.attr_tree(kind).iter() {
                    debug!(
                        "  {} '{}' action={:?} category={} hits={} expires_in={}s",
                        kind,
                        record.attribute.value(),
                        record.verdict.action,
                        record.verdict.category_id,
                        record.stamp.hit_count,
                        record.stamp.expires_in(now)
                    );
                }
            }
            for direction in FlowDirection::ALL {
                for record in device.flow_tree(direction).iter() {
                    debug!(
                        "  {} flow {} action={:?} hits={} expires_in={}s",
                        direction,
                        record.key,
                        record.verdict.action,
                        record.stamp.hit_count,
                        record.stamp.expires_in(now)
                    );
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn attr_kind_for(request_type: RequestType, op: &str) -> Option<AttrKind> {
        match request_type.attr_kind() {
            Some(kind) => {
                if request_type.is_hostname_alias() {
                    debug!("{}: {} request uses the hostname tree", op, request_type);
                }
                Some(kind)
            }
            None => {
                debug!("{}: invalid attribute type {}", op, request_type);
                None
            }
        }
    }

    fn device_entry(&mut self, mac: MacAddr) -> &mut DeviceCache {
        self.devices.entry(mac).or_insert_with(|| {
            debug!("Creating cache for device {}", mac);
            DeviceCache::new(mac)
        })
    }

    /// Make room for one new record
    ///
    /// A full cache first evicts whatever already expired; only a cache
    /// still full of live records refuses the insert.
    fn reserve_slot(&mut self) -> Result<()> {
        if self.total_entries < self.config.max_entries {
            return Ok(());
        }

        let report = self.sweep_expired(SweepScope::All);
        if report.total() > 0 {
            debug!(
                "Cache full, evicted {} expired entries to make room",
                report.total()
            );
        }

        if self.total_entries >= self.config.max_entries {
            self.stats.record_rejection();
            warn!(
                "Cache full ({} entries), rejecting new entry",
                self.config.max_entries
            );
            return Err(Error::CacheFull {
                max_entries: self.config.max_entries,
            });
        }
        Ok(())
    }

    fn release(&mut self, count: usize) {
        debug_assert!(self.total_entries >= count as u64, "cache counter underflow");
        self.total_entries = self.total_entries.saturating_sub(count as u64);
    }

    fn miss<T>(&self) -> Result<T> {
        self.stats.record_miss();
        Err(Error::NotFound)
    }

    fn reclaim_empty(&mut self, scope: SweepScope) {
        match scope {
            SweepScope::All => self.devices.retain(|mac, device| {
                if device.is_empty() {
                    debug!("Reclaiming empty cache for device {}", mac);
                    false
                } else {
                    true
                }
            }),
            SweepScope::Device(mac) => {
                if self.devices.get(&mac).is_some_and(DeviceCache::is_empty) {
                    debug!("Reclaiming empty cache for device {}", mac);
                    self.devices.remove(&mac);
                }
            }
        }
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("devices", &self.devices.len())
            .field("total_entries", &self.total_entries)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::verdict::Action;
    use std::net::{IpAddr, Ipv4Addr};

    fn mac(n: u8) -> MacAddr {
        MacAddr::new([0x02, 0, 0, 0, 0, n])
    }

    fn manager(config: CacheConfig) -> (CacheManager, ManualClock) {
        let clock = ManualClock::new(1_000);
        let manager = CacheManager::with_clock(config, Arc::new(clock.clone())).unwrap();
        (manager, clock)
    }

    fn default_manager() -> (CacheManager, ManualClock) {
        manager(CacheConfig::default())
    }

    fn key(port: u16) -> FlowKey {
        FlowKey::new(
            IpAddr::V4(Ipv4Addr::new(192, 168, 40, 2)),
            IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)),
            6,
            port,
            443,
        )
    }

    fn allow() -> Verdict {
        Verdict::new(Action::Allow)
    }

    fn assert_consistent(manager: &CacheManager) {
        assert_eq!(manager.count(), manager.recount());
    }

    #[test]
    fn test_insert_and_lookup() {
        let (mut m, _) = default_manager();
        let verdict = Verdict::new(Action::Block).with_category(12).with_policy("adult");

        let outcome = m
            .insert_attribute(AttributeEntry::new(mac(1), RequestType::Fqdn, "bad.com", verdict.clone()))
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);
        assert_eq!(m.count(), 1);

        let cached = m.lookup_attribute(mac(1), RequestType::Fqdn, "bad.com").unwrap();
        assert_eq!(cached.verdict, verdict);
        assert_eq!(cached.hit_count, 1);
        assert_eq!(cached.expires_in, CacheConfig::default().attribute_ttl_secs);

        let cached = m.lookup_attribute(mac(1), RequestType::Fqdn, "bad.com").unwrap();
        assert_eq!(cached.hit_count, 2);
        assert_eq!(m.stats().hits(), 2);
    }

    #[test]
    fn test_lookup_misses() {
        let (mut m, _) = default_manager();
        m.insert_attribute(AttributeEntry::new(mac(1), RequestType::Url, "http://a/", allow()))
            .unwrap();

        assert_eq!(m.lookup_attribute(mac(2), RequestType::Url, "http://a/"), Err(Error::NotFound));
        assert_eq!(m.lookup_attribute(mac(1), RequestType::Url, "http://b/"), Err(Error::NotFound));
        assert_eq!(m.lookup_attribute(mac(1), RequestType::App, "http://a/"), Err(Error::NotFound));
        assert_eq!(m.stats().misses(), 3);
    }

    #[test]
    fn test_insert_replaces_existing_value() {
        let (mut m, clock) = default_manager();
        let entry = AttributeEntry::new(mac(1), RequestType::Sni, "a.com", allow()).with_ttl(10);
        m.insert_attribute(entry).unwrap();
        m.lookup_attribute(mac(1), RequestType::Sni, "a.com").unwrap();

        clock.advance(8);
        let entry = AttributeEntry::new(mac(1), RequestType::Host, "a.com", Verdict::new(Action::Block))
            .with_ttl(10);
        assert_eq!(m.insert_attribute(entry).unwrap(), InsertOutcome::Replaced);
        assert_eq!(m.count(), 1);

        // Refreshed stamp outlives the original TTL, hit count carries over
        clock.advance(5);
        let cached = m.lookup_attribute(mac(1), RequestType::Fqdn, "a.com").unwrap();
        assert_eq!(cached.verdict.action, Action::Block);
        assert_eq!(cached.hit_count, 2);
        assert_eq!(m.stats().replacements(), 1);
        assert_consistent(&m);
    }

    #[test]
    fn test_insert_rejects_bad_input() {
        let (mut m, _) = default_manager();

        let err = m
            .insert_attribute(AttributeEntry::new(mac(1), RequestType::Inbound, "x", allow()))
            .unwrap_err();
        assert_eq!(err, Error::InvalidKind(RequestType::Inbound));

        let err = m
            .insert_attribute(AttributeEntry::new(mac(1), RequestType::Url, "", allow()))
            .unwrap_err();
        assert_eq!(err, Error::MissingValue);

        assert_eq!(m.count(), 0);
        assert_eq!(m.device_count(), 0);
    }

    #[test]
    fn test_full_cache_evicts_expired_before_rejecting() {
        let (mut m, clock) = manager(CacheConfig::with_max_entries(2));
        m.insert_attribute(
            AttributeEntry::new(mac(1), RequestType::Fqdn, "a.com", allow()).with_ttl(1),
        )
        .unwrap();
        m.insert_flow(FlowEntry::new(mac(2), FlowDirection::Outbound, key(1), allow()).with_ttl(1))
            .unwrap();

        clock.advance(100);
        let outcome = m
            .insert_attribute(AttributeEntry::new(mac(1), RequestType::Fqdn, "c.com", allow()))
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);
        assert_eq!(m.count(), 1);
        assert_eq!(m.stats().ttl_evictions(), 2);
        assert_eq!(m.stats().rejections(), 0);
        assert!(m.lookup_attribute(mac(1), RequestType::Fqdn, "a.com").is_err());
        assert!(m.lookup_attribute(mac(1), RequestType::Fqdn, "c.com").is_ok());
        assert_consistent(&m);
    }

    #[test]
    fn test_full_cache_keeps_live_records() {
        let (mut m, clock) = manager(CacheConfig::with_max_entries(2));
        m.insert_attribute(
            AttributeEntry::new(mac(1), RequestType::Fqdn, "a.com", allow()).with_ttl(1),
        )
        .unwrap();
        m.insert_attribute(
            AttributeEntry::new(mac(1), RequestType::Fqdn, "b.com", allow()).with_ttl(500),
        )
        .unwrap();

        clock.advance(10);
        m.insert_attribute(AttributeEntry::new(mac(1), RequestType::Url, "c.com", allow()))
            .unwrap();

        // Only one record had expired; the next insert finds the cache full
        let err = m
            .insert_attribute(AttributeEntry::new(mac(1), RequestType::Url, "d.com", allow()))
            .unwrap_err();
        assert_eq!(err, Error::CacheFull { max_entries: 2 });
        assert_eq!(m.count(), 2);
        assert_consistent(&m);
    }

    #[test]
    fn test_capacity_rejects_new_but_allows_replace() {
        let (mut m, _) = manager(CacheConfig::with_max_entries(2));
        m.insert_attribute(AttributeEntry::new(mac(1), RequestType::Fqdn, "a.com", allow()))
            .unwrap();
        m.insert_flow(FlowEntry::new(mac(2), FlowDirection::Inbound, key(1), allow()))
            .unwrap();

        let err = m
            .insert_attribute(AttributeEntry::new(mac(1), RequestType::Fqdn, "b.com", allow()))
            .unwrap_err();
        assert_eq!(err, Error::CacheFull { max_entries: 2 });
        let err = m
            .insert_flow(FlowEntry::new(mac(2), FlowDirection::Inbound, key(2), allow()))
            .unwrap_err();
        assert_eq!(err, Error::CacheFull { max_entries: 2 });

        let outcome = m
            .insert_attribute(AttributeEntry::new(mac(1), RequestType::Fqdn, "a.com", allow()))
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Replaced);
        assert_eq!(m.count(), 2);
        assert_eq!(m.stats().rejections(), 2);

        // Freed capacity is reusable
        m.delete_attribute(mac(1), RequestType::Fqdn, "a.com").unwrap();
        m.insert_attribute(AttributeEntry::new(mac(1), RequestType::Fqdn, "b.com", allow()))
            .unwrap();
        assert_consistent(&m);
    }

    #[test]
    fn test_redirect_kept_for_hostname_only() {
        let (mut m, _) = default_manager();
        m.insert_attribute(
            AttributeEntry::new(mac(1), RequestType::Fqdn, "a.com", Verdict::new(Action::Block))
                .with_redirect("1.2.3.4"),
        )
        .unwrap();
        m.insert_attribute(
            AttributeEntry::new(mac(1), RequestType::Url, "http://a.com/", Verdict::new(Action::Block))
                .with_redirect("1.2.3.4"),
        )
        .unwrap();

        let host = m.lookup_attribute(mac(1), RequestType::Sni, "a.com").unwrap();
        assert_eq!(host.redirect.as_deref(), Some("1.2.3.4"));
        let url = m.lookup_attribute(mac(1), RequestType::Url, "http://a.com/").unwrap();
        assert_eq!(url.redirect, None);
    }

    #[test]
    fn test_ttl_boundary_on_lookup() {
        let (mut m, clock) = default_manager();
        m.insert_attribute(AttributeEntry::new(mac(1), RequestType::Ipv4, "10.0.0.1", allow()).with_ttl(60))
            .unwrap();

        clock.advance(59);
        assert!(m.lookup_attribute(mac(1), RequestType::Ipv4, "10.0.0.1").is_ok());

        clock.advance(1);
        assert_eq!(
            m.lookup_attribute(mac(1), RequestType::Ipv4, "10.0.0.1"),
            Err(Error::NotFound)
        );
        // Expired record was evicted by the lookup itself
        assert_eq!(m.count(), 0);
        assert_eq!(m.stats().ttl_evictions(), 1);
        assert_consistent(&m);
    }

    #[test]
    fn test_ttl_boundary_on_sweep() {
        let (mut m, clock) = default_manager();
        m.insert_attribute(AttributeEntry::new(mac(1), RequestType::Ipv6, "::1", allow()).with_ttl(60))
            .unwrap();

        clock.advance(59);
        assert_eq!(m.sweep_expired(SweepScope::All).total(), 0);
        assert_eq!(m.count(), 1);

        clock.advance(1);
        let report = m.sweep_expired(SweepScope::All);
        assert_eq!(report.attributes, 1);
        assert_eq!(m.count(), 0);
    }

    #[test]
    fn test_kind_aliasing_on_delete() {
        let (mut m, _) = default_manager();
        m.insert_attribute(AttributeEntry::new(mac(1), RequestType::Fqdn, "a.com", allow()))
            .unwrap();

        assert_eq!(m.delete_attribute(mac(1), RequestType::Url, "a.com"), Err(Error::NotFound));
        assert_eq!(m.count(), 1);

        assert_eq!(m.delete_attribute(mac(1), RequestType::Sni, "a.com"), Ok(()));
        assert_eq!(m.count(), 0);
        assert_consistent(&m);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (mut m, _) = default_manager();
        m.insert_attribute(AttributeEntry::new(mac(1), RequestType::App, "youtube", allow()))
            .unwrap();

        assert_eq!(m.delete_attribute(mac(1), RequestType::App, "youtube"), Ok(()));
        assert_eq!(m.delete_attribute(mac(1), RequestType::App, "youtube"), Err(Error::NotFound));
        assert_eq!(m.count(), 0);
        assert_eq!(m.stats().deletes(), 1);
    }

    #[test]
    fn test_delete_not_found_cases() {
        let (mut m, _) = default_manager();
        m.insert_attribute(AttributeEntry::new(mac(1), RequestType::Hostname, "nas", allow()))
            .unwrap();

        assert_eq!(m.delete_attribute(mac(9), RequestType::Hostname, "nas"), Err(Error::NotFound));
        assert_eq!(m.delete_attribute(mac(1), RequestType::Outbound, "nas"), Err(Error::NotFound));
        assert_eq!(m.delete_attribute(mac(1), RequestType::Hostname, ""), Err(Error::NotFound));
        assert_eq!(m.count(), 1);
    }

    #[test]
    fn test_sweep_retains_even_entries() {
        let (mut m, clock) = default_manager();
        let n = 21u16;
        for i in 0..n {
            let ttl = if i % 2 == 1 { 5 } else { 500 };
            m.insert_attribute(
                AttributeEntry::new(mac(1), RequestType::Url, format!("http://site/{}", i), allow())
                    .with_ttl(ttl as u64),
            )
            .unwrap();
            m.insert_flow(
                FlowEntry::new(mac(1), FlowDirection::Outbound, key(i), allow()).with_ttl(ttl as u64),
            )
            .unwrap();
        }
        assert_eq!(m.count(), 2 * n as u64);

        clock.advance(5);
        let report = m.sweep_expired(SweepScope::All);
        let odd = (n / 2) as usize;

        assert_eq!(report.attributes, odd);
        assert_eq!(report.flows, odd);
        assert_eq!(m.count(), 2 * (n as u64 - odd as u64));
        for i in 0..n {
            let url = format!("http://site/{}", i);
            let present = m.lookup_attribute(mac(1), RequestType::Url, &url).is_ok();
            assert_eq!(present, i % 2 == 0, "{}", url);
            let present = m.lookup_flow(mac(1), FlowDirection::Outbound, &key(i)).is_ok();
            assert_eq!(present, i % 2 == 0, "port {}", i);
        }
        assert_consistent(&m);
    }

    #[test]
    fn test_sweep_single_device_scope() {
        let (mut m, clock) = default_manager();
        for n in 1..=2 {
            m.insert_attribute(AttributeEntry::new(mac(n), RequestType::Fqdn, "a.com", allow()).with_ttl(1))
                .unwrap();
        }

        clock.advance(1);
        let report = m.sweep_expired(SweepScope::Device(mac(1)));
        assert_eq!(report, SweepReport { devices: 1, attributes: 1, flows: 0 });
        assert_eq!(m.count(), 1);
        assert_eq!(m.device_entry_count(mac(2)), Some(1));

        let report = m.sweep_expired(SweepScope::Device(mac(7)));
        assert_eq!(report, SweepReport::default());
    }

    #[test]
    fn test_sweep_keeps_empty_shell_by_default() {
        let (mut m, clock) = default_manager();
        m.insert_attribute(AttributeEntry::new(mac(1), RequestType::Fqdn, "a.com", allow()).with_ttl(1))
            .unwrap();

        clock.advance(1);
        m.sweep_expired(SweepScope::All);
        assert!(m.contains_device(mac(1)));
        assert_eq!(m.device_entry_count(mac(1)), Some(0));

        // The shell is still purgeable and reports nothing removed
        assert_eq!(m.purge_device(mac(1)), Ok(0));
        assert!(!m.contains_device(mac(1)));
    }

    #[test]
    fn test_sweep_reclaims_empty_devices_when_configured() {
        let config = CacheConfig {
            reclaim_empty_devices: true,
            ..CacheConfig::default()
        };
        let (mut m, clock) = manager(config);
        m.insert_attribute(AttributeEntry::new(mac(1), RequestType::Fqdn, "a.com", allow()).with_ttl(1))
            .unwrap();
        m.insert_attribute(AttributeEntry::new(mac(2), RequestType::Fqdn, "a.com", allow()).with_ttl(100))
            .unwrap();

        clock.advance(1);
        m.sweep_expired(SweepScope::All);
        assert!(!m.contains_device(mac(1)));
        assert!(m.contains_device(mac(2)));
        assert_eq!(m.device_count(), 1);
    }

    #[test]
    fn test_purge_device_accounting() {
        let (mut m, _) = default_manager();
        let attrs = [
            (RequestType::Fqdn, "a.com"),
            (RequestType::Url, "http://a.com/x"),
            (RequestType::Ipv4, "1.2.3.4"),
            (RequestType::Ipv6, "2001:db8::1"),
            (RequestType::App, "zoom"),
        ];
        for (t, v) in attrs {
            m.insert_attribute(AttributeEntry::new(mac(1), t, v, allow())).unwrap();
        }
        for port in 0..3 {
            m.insert_flow(FlowEntry::new(mac(1), FlowDirection::Inbound, key(port), allow()))
                .unwrap();
        }
        m.insert_attribute(AttributeEntry::new(mac(2), RequestType::Fqdn, "a.com", allow()))
            .unwrap();

        assert_eq!(m.purge_device(mac(1)), Ok(8));
        assert_eq!(m.count(), 1);
        assert!(!m.contains_device(mac(1)));
        for (t, v) in attrs {
            assert_eq!(m.lookup_attribute(mac(1), t, v), Err(Error::NotFound));
        }
        assert_eq!(m.lookup_flow(mac(1), FlowDirection::Inbound, &key(0)), Err(Error::NotFound));
        assert_eq!(m.purge_device(mac(1)), Err(Error::NotFound));
        assert_eq!(m.stats().purged(), 8);
        assert_consistent(&m);
    }

    #[test]
    fn test_cleanup_zeroes_counter() {
        let (mut m, _) = default_manager();
        for n in 0..5 {
            m.insert_attribute(AttributeEntry::new(mac(n), RequestType::Fqdn, "a.com", allow()))
                .unwrap();
            m.insert_flow(FlowEntry::new(mac(n), FlowDirection::Outbound, key(1), allow()))
                .unwrap();
        }
        assert_eq!(m.count(), 10);

        m.cleanup();
        assert_eq!(m.count(), 0);
        assert_eq!(m.device_count(), 0);
        assert_eq!(m.stats().purged(), 10);

        // Second cleanup is a no-op
        m.cleanup();
        assert_eq!(m.stats().purged(), 10);
    }

    #[test]
    fn test_cleanup_on_fresh_manager() {
        let (mut m, _) = default_manager();
        m.cleanup();
        assert_eq!(m.count(), 0);
    }

    #[test]
    fn test_flow_roundtrip() {
        let (mut m, _) = default_manager();
        let verdict = Verdict::new(Action::Block).with_policy("iot");
        m.insert_flow(FlowEntry::new(mac(1), FlowDirection::Inbound, key(80), verdict.clone()))
            .unwrap();

        // Direction is part of the identity
        assert_eq!(m.lookup_flow(mac(1), FlowDirection::Outbound, &key(80)), Err(Error::NotFound));
        let cached = m.lookup_flow(mac(1), FlowDirection::Inbound, &key(80)).unwrap();
        assert_eq!(cached.verdict, verdict);
        assert_eq!(cached.redirect, None);

        assert_eq!(m.delete_flow(mac(1), FlowDirection::Inbound, &key(80)), Ok(()));
        assert_eq!(m.delete_flow(mac(1), FlowDirection::Inbound, &key(80)), Err(Error::NotFound));
        assert_eq!(m.count(), 0);
    }

    #[test]
    fn test_flow_expired_on_lookup() {
        let (mut m, clock) = default_manager();
        m.insert_flow(FlowEntry::new(mac(1), FlowDirection::Outbound, key(1), allow()).with_ttl(3))
            .unwrap();

        clock.advance(3);
        assert_eq!(m.lookup_flow(mac(1), FlowDirection::Outbound, &key(1)), Err(Error::NotFound));
        assert_eq!(m.count(), 0);
    }

    #[test]
    fn test_counter_invariant_mixed_sequence() {
        let (mut m, clock) = default_manager();
        let kinds = [
            RequestType::Fqdn,
            RequestType::Sni,
            RequestType::Url,
            RequestType::Ipv4,
            RequestType::App,
        ];

        for round in 0..40u64 {
            let device = mac((round % 4) as u8);
            let kind = kinds[(round % kinds.len() as u64) as usize];
            let value = format!("value-{}", round % 7);

            let _ = m.insert_attribute(
                AttributeEntry::new(device, kind, value.clone(), allow()).with_ttl(round % 5 + 1),
            );
            let _ = m.insert_flow(
                FlowEntry::new(device, FlowDirection::Inbound, key((round % 6) as u16), allow())
                    .with_ttl(round % 3 + 1),
            );
            assert_consistent(&m);

            if round % 3 == 0 {
                let _ = m.delete_attribute(device, RequestType::Hostname, &value);
                assert_consistent(&m);
            }
            if round % 5 == 0 {
                let _ = m.lookup_attribute(device, kind, &value);
                assert_consistent(&m);
            }
            if round % 4 == 0 {
                clock.advance(2);
                m.sweep_expired(SweepScope::All);
                assert_consistent(&m);
            }
            if round % 11 == 0 {
                let _ = m.purge_device(device);
                assert_consistent(&m);
            }
        }

        m.cleanup();
        assert_eq!(m.count(), 0);
        assert_consistent(&m);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = CacheManager::new(CacheConfig::with_max_entries(0));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
