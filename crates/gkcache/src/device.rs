//! Per-device cache: five attribute trees and two flow trees

use serde::Serialize;
use tracing::trace;

use crate::kind::{AttrKind, FlowDirection};
use crate::mac::MacAddr;
use crate::tree::{AttrTree, FlowTree};

/// Records removed by one expiry pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Devices visited
    pub devices: usize,
    /// Attribute records evicted
    pub attributes: usize,
    /// Flow records evicted
    pub flows: usize,
}

impl SweepReport {
    /// Total records evicted
    pub fn total(&self) -> usize {
        self.attributes + self.flows
    }

    /// Fold another report into this one
    pub fn merge(&mut self, other: SweepReport) {
        self.devices += other.devices;
        self.attributes += other.attributes;
        self.flows += other.flows;
    }
}

/// Every cached record for one hardware address
#[derive(Debug)]
pub struct DeviceCache {
    mac: MacAddr,
    hostname: AttrTree,
    url: AttrTree,
    ipv4: AttrTree,
    ipv6: AttrTree,
    app: AttrTree,
    inbound: FlowTree,
    outbound: FlowTree,
}

impl DeviceCache {
    /// Empty cache for `mac`
    pub fn new(mac: MacAddr) -> Self {
        Self {
            mac,
            hostname: AttrTree::new(),
            url: AttrTree::new(),
            ipv4: AttrTree::new(),
            ipv6: AttrTree::new(),
            app: AttrTree::new(),
            inbound: FlowTree::new(),
            outbound: FlowTree::new(),
        }
    }

    /// Device hardware address
    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    /// Tree holding `kind`
    pub fn attr_tree(&self, kind: AttrKind) -> &AttrTree {
        match kind {
            AttrKind::Hostname => &self.hostname,
            AttrKind::Url => &self.url,
            AttrKind::Ipv4 => &self.ipv4,
            AttrKind::Ipv6 => &self.ipv6,
            AttrKind::App => &self.app,
        }
    }

    /// Mutable tree holding `kind`
    pub fn attr_tree_mut(&mut self, kind: AttrKind) -> &mut AttrTree {
        match kind {
            AttrKind::Hostname => &mut self.hostname,
            AttrKind::Url => &mut self.url,
            AttrKind::Ipv4 => &mut self.ipv4,
            AttrKind::Ipv6 => &mut self.ipv6,
            AttrKind::App => &mut self.app,
        }
    }

    /// Flow tree for `direction`
    pub fn flow_tree(&self, direction: FlowDirection) -> &FlowTree {
        match direction {
            FlowDirection::Inbound => &self.inbound,
            FlowDirection::Outbound => &self.outbound,
        }
    }

    /// Mutable flow tree for `direction`
    pub fn flow_tree_mut(&mut self, direction: FlowDirection) -> &mut FlowTree {
        match direction {
            FlowDirection::Inbound => &mut self.inbound,
            FlowDirection::Outbound => &mut self.outbound,
        }
    }

    /// Attribute records across the five trees
    pub fn attr_len(&self) -> usize {
        AttrKind::ALL.iter().map(|k| self.attr_tree(*k).len()).sum()
    }

    /// Flow records across both directions
    pub fn flow_len(&self) -> usize {
        FlowDirection::ALL.iter().map(|d| self.flow_tree(*d).len()).sum()
    }

    /// All records held for the device
    pub fn len(&self) -> usize {
        self.attr_len() + self.flow_len()
    }

    /// True if every tree is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empty all seven trees; returns the number of records dropped
    pub fn purge(&mut self) -> usize {
        let attrs: usize = AttrKind::ALL.iter().map(|k| self.attr_tree_mut(*k).clear()).sum();
        let flows: usize = FlowDirection::ALL
            .iter()
            .map(|d| self.flow_tree_mut(*d).clear())
            .sum();
        attrs + flows
    }

    /// Evict every record expired at `now`
    pub fn remove_expired(&mut self, now: u64) -> SweepReport {
        let mac = self.mac;
        let mut report = SweepReport {
            devices: 1,
            ..SweepReport::default()
        };

        for kind in AttrKind::ALL {
            report.attributes += self.attr_tree_mut(kind).remove_expired(now, |record| {
                trace!(
                    "Removing {} attribute '{}' for device {} due to expired TTL",
                    kind,
                    record.attribute.value(),
                    mac
                );
            });
        }

        for direction in FlowDirection::ALL {
            report.flows += self.flow_tree_mut(direction).remove_expired(now, |record| {
                trace!(
                    "Removing {} flow {} for device {} due to expired TTL",
                    direction,
                    record.key,
                    mac
                );
            });
        }

        trace!(
            "Expired entries for device {}: {} attributes, {} flows",
            mac,
            report.attributes,
            report.flows
        );
        report
    }
}
