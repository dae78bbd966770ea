//! Record store: one cached attribute or flow with its TTL metadata
//!
//! Records are owned by exactly one tree. Removing a record from its tree
//! hands ownership to the caller; dropping it releases every buffer it
//! holds, so a record can be neither leaked nor released twice.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::kind::{AttrKind, FlowDirection};
use crate::verdict::Verdict;

/// Attribute payload, one variant per attribute tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    /// Hostname family (internal hostname, FQDN, HTTP host, SNI)
    Hostname {
        /// Host name
        name: String,
        /// Redirect target handed out instead of the real address
        redirect: Option<String>,
    },
    /// URL
    Url(String),
    /// Textual IPv4 address
    Ipv4(String),
    /// Textual IPv6 address
    Ipv6(String),
    /// Application identifier
    App(String),
}

impl Attribute {
    /// Build the payload for `kind`
    ///
    /// Only the hostname family keeps a redirect target; one offered for any
    /// other kind is dropped.
    pub fn new(kind: AttrKind, value: String, redirect: Option<String>) -> Self {
        if kind != AttrKind::Hostname {
            if let Some(target) = &redirect {
                debug!("Ignoring redirect '{}' for {} attribute '{}'", target, kind, value);
            }
        }

        match kind {
            AttrKind::Hostname => Attribute::Hostname {
                name: value,
                redirect,
            },
            AttrKind::Url => Attribute::Url(value),
            AttrKind::Ipv4 => Attribute::Ipv4(value),
            AttrKind::Ipv6 => Attribute::Ipv6(value),
            AttrKind::App => Attribute::App(value),
        }
    }

    /// Attribute value, the key within its tree
    pub fn value(&self) -> &str {
        match self {
            Attribute::Hostname { name, .. } => name,
            Attribute::Url(v) | Attribute::Ipv4(v) | Attribute::Ipv6(v) | Attribute::App(v) => v,
        }
    }

    /// Tree this payload belongs to
    pub fn kind(&self) -> AttrKind {
        match self {
            Attribute::Hostname { .. } => AttrKind::Hostname,
            Attribute::Url(_) => AttrKind::Url,
            Attribute::Ipv4(_) => AttrKind::Ipv4,
            Attribute::Ipv6(_) => AttrKind::Ipv6,
            Attribute::App(_) => AttrKind::App,
        }
    }

    /// Redirect target, hostname family only
    pub fn redirect(&self) -> Option<&str> {
        match self {
            Attribute::Hostname { redirect, .. } => redirect.as_deref(),
            _ => None,
        }
    }

    /// Replace the redirect target; no-op outside the hostname family
    pub(crate) fn set_redirect(&mut self, target: Option<String>) {
        if let Attribute::Hostname { redirect, .. } = self {
            *redirect = target;
        }
    }
}

/// Creation time, lifetime and usage of a cached record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStamp {
    /// Insertion (or last refresh) time, clock seconds
    pub created_at: u64,
    /// Lifetime in seconds
    pub ttl: u64,
    /// Lookups served from this record
    pub hit_count: u64,
}

impl CacheStamp {
    /// Fresh stamp
    pub fn new(created_at: u64, ttl: u64) -> Self {
        Self {
            created_at,
            ttl,
            hit_count: 0,
        }
    }

    /// True once `ttl` seconds have passed since `created_at`
    #[inline]
    pub fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.created_at) >= self.ttl
    }

    /// Seconds left before expiry, zero once expired
    pub fn expires_in(&self, now: u64) -> u64 {
        self.ttl.saturating_sub(now.saturating_sub(self.created_at))
    }

    /// Count a lookup hit
    #[inline]
    pub fn touch(&mut self) {
        self.hit_count += 1;
    }

    /// Restart the lifetime, keeping the hit count
    pub fn refresh(&mut self, now: u64, ttl: u64) {
        self.created_at = now;
        self.ttl = ttl;
    }
}

/// Records that carry TTL metadata
pub trait Expiring {
    /// TTL metadata
    fn stamp(&self) -> &CacheStamp;

    /// True if the record outlived its TTL at `now`
    fn is_expired(&self, now: u64) -> bool {
        self.stamp().is_expired(now)
    }
}

/// Cached verdict for one attribute value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrRecord {
    /// Payload
    pub attribute: Attribute,
    /// Cached verdict
    pub verdict: Verdict,
    /// TTL metadata
    pub stamp: CacheStamp,
}

impl AttrRecord {
    /// New record stamped at `now`
    pub fn new(attribute: Attribute, verdict: Verdict, now: u64, ttl: u64) -> Self {
        Self {
            attribute,
            verdict,
            stamp: CacheStamp::new(now, ttl),
        }
    }
}

impl Expiring for AttrRecord {
    fn stamp(&self) -> &CacheStamp {
        &self.stamp
    }
}

/// Flow identity: addresses, ports and IP protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowKey {
    /// Source address
    pub src: IpAddr,
    /// Destination address
    pub dst: IpAddr,
    /// IP protocol number
    pub protocol: u8,
    /// Source port
    #[serde(default)]
    pub src_port: u16,
    /// Destination port
    #[serde(default)]
    pub dst_port: u16,
}

impl FlowKey {
    /// Build a key from its five parts
    pub fn new(src: IpAddr, dst: IpAddr, protocol: u8, src_port: u16, dst_port: u16) -> Self {
        Self {
            src,
            dst,
            protocol,
            src_port,
            dst_port,
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} proto {}",
            SocketAddr::new(self.src, self.src_port),
            SocketAddr::new(self.dst, self.dst_port),
            self.protocol
        )
    }
}

/// Cached verdict for one directional flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRecord {
    /// Flow identity
    pub key: FlowKey,
    /// Tree the record lives in
    pub direction: FlowDirection,
    /// Cached verdict
    pub verdict: Verdict,
    /// TTL metadata
    pub stamp: CacheStamp,
}

impl FlowRecord {
    /// New record stamped at `now`
    pub fn new(key: FlowKey, direction: FlowDirection, verdict: Verdict, now: u64, ttl: u64) -> Self {
        Self {
            key,
            direction,
            verdict,
            stamp: CacheStamp::new(now, ttl),
        }
    }
}

impl Expiring for FlowRecord {
    fn stamp(&self) -> &CacheStamp {
        &self.stamp
    }
}
