//! Capacity and TTL policy

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default capacity, in records across all devices
pub const DEFAULT_MAX_ENTRIES: u64 = 100_000;

/// Default lifetime of an attribute verdict
pub const DEFAULT_ATTRIBUTE_TTL_SECS: u64 = 300;

/// Default lifetime of a flow verdict
pub const DEFAULT_FLOW_TTL_SECS: u64 = 300;

/// Cache sizing and expiry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Records the cache may hold before new inserts are rejected
    pub max_entries: u64,
    /// TTL applied to attribute records inserted without one
    pub attribute_ttl_secs: u64,
    /// TTL applied to flow records inserted without one
    pub flow_ttl_secs: u64,
    /// Drop per-device caches left empty by a TTL sweep
    pub reclaim_empty_devices: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            attribute_ttl_secs: DEFAULT_ATTRIBUTE_TTL_SECS,
            flow_ttl_secs: DEFAULT_FLOW_TTL_SECS,
            reclaim_empty_devices: false,
        }
    }
}

impl CacheConfig {
    /// Default policy with a different capacity
    pub fn with_max_entries(max_entries: u64) -> Self {
        Self {
            max_entries,
            ..Self::default()
        }
    }

    /// Check the policy is usable
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(Error::InvalidConfig("max_entries must be greater than 0".to_string()));
        }
        if self.attribute_ttl_secs == 0 {
            return Err(Error::InvalidConfig("attribute_ttl_secs must be greater than 0".to_string()));
        }
        if self.flow_ttl_secs == 0 {
            return Err(Error::InvalidConfig("flow_ttl_secs must be greater than 0".to_string()));
        }
        Ok(())
    }
}
