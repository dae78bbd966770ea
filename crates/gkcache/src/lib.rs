//! # gkcache
//!
//! Per-device policy verdict cache for the gatekeeper traffic-control agent.
//!
//! ## Architecture
//! - **Record store**: attribute and flow records with TTL metadata
//! - **Trees**: one ordered tree per attribute kind and flow direction
//! - **Device cache**: the seven trees of one hardware address
//! - **Manager**: every device cache plus the global entry counter
//! - **Sweeper**: TTL expiry pass driven by the host's timer
//!
//! Hostname, FQDN, HTTP host and SNI verdicts share one tree per device.
//! The cache is in-memory only.

#![warn(missing_docs)]

mod clock;
mod config;
mod device;
mod error;
mod kind;
mod mac;
mod manager;
mod record;
mod shared;
mod stats;
mod sweeper;
mod tree;
mod verdict;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, DEFAULT_ATTRIBUTE_TTL_SECS, DEFAULT_FLOW_TTL_SECS, DEFAULT_MAX_ENTRIES};
pub use device::{DeviceCache, SweepReport};
pub use error::{Error, Result};
pub use kind::{AttrKind, FlowDirection, RequestType};
pub use mac::MacAddr;
pub use manager::{AttributeEntry, CacheManager, CachedVerdict, FlowEntry, InsertOutcome, SweepScope};
pub use record::{AttrRecord, Attribute, CacheStamp, Expiring, FlowKey, FlowRecord};
pub use shared::GatekeeperCache;
pub use stats::{CacheStats, StatsSnapshot};
pub use sweeper::TtlSweeper;
pub use tree::{AttrTree, FlowTree, Keyed, RecordTree};
pub use verdict::{Action, Verdict};
