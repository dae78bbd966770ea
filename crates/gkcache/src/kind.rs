//! Request types and the trees they address
//!
//! The classifier hands the cache a [`RequestType`]. Hostname, FQDN, HTTP
//! host and SNI all share the hostname-family tree; flow directions address
//! the flow trees.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Request type as produced by the traffic classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    /// Internal hostname-family type
    Hostname = 0,
    /// Fully qualified domain name (DNS)
    Fqdn = 1,
    /// HTTP Host header
    Host = 2,
    /// TLS server name indication
    Sni = 3,
    /// HTTP URL
    Url = 4,
    /// Textual IPv4 address
    Ipv4 = 5,
    /// Textual IPv6 address
    Ipv6 = 6,
    /// Application identifier
    App = 7,
    /// Inbound flow
    Inbound = 8,
    /// Outbound flow
    Outbound = 9,
}

impl RequestType {
    /// Every request type, in discriminant order
    pub const ALL: [RequestType; 10] = [
        RequestType::Hostname,
        RequestType::Fqdn,
        RequestType::Host,
        RequestType::Sni,
        RequestType::Url,
        RequestType::Ipv4,
        RequestType::Ipv6,
        RequestType::App,
        RequestType::Inbound,
        RequestType::Outbound,
    ];

    /// Attribute tree addressed by this request type, `None` for flows
    pub fn attr_kind(self) -> Option<AttrKind> {
        match self {
            RequestType::Hostname | RequestType::Fqdn | RequestType::Host | RequestType::Sni => {
                Some(AttrKind::Hostname)
            }
            RequestType::Url => Some(AttrKind::Url),
            RequestType::Ipv4 => Some(AttrKind::Ipv4),
            RequestType::Ipv6 => Some(AttrKind::Ipv6),
            RequestType::App => Some(AttrKind::App),
            RequestType::Inbound | RequestType::Outbound => None,
        }
    }

    /// Flow tree addressed by this request type, `None` for attributes
    pub fn flow_direction(self) -> Option<FlowDirection> {
        match self {
            RequestType::Inbound => Some(FlowDirection::Inbound),
            RequestType::Outbound => Some(FlowDirection::Outbound),
            _ => None,
        }
    }

    /// True for the request types folded into the hostname-family tree
    pub fn is_hostname_alias(self) -> bool {
        self.attr_kind() == Some(AttrKind::Hostname)
    }

    /// Lower-case name
    pub fn as_str(self) -> &'static str {
        match self {
            RequestType::Hostname => "hostname",
            RequestType::Fqdn => "fqdn",
            RequestType::Host => "host",
            RequestType::Sni => "sni",
            RequestType::Url => "url",
            RequestType::Ipv4 => "ipv4",
            RequestType::Ipv6 => "ipv6",
            RequestType::App => "app",
            RequestType::Inbound => "inbound",
            RequestType::Outbound => "outbound",
        }
    }
}

impl TryFrom<i32> for RequestType {
    type Error = Error;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        RequestType::ALL
            .into_iter()
            .find(|t| *t as i32 == raw)
            .ok_or(Error::InvalidRequestType(raw))
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five attribute trees held per device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrKind {
    /// Hostname, FQDN, HTTP host and SNI
    Hostname,
    /// URLs
    Url,
    /// IPv4 addresses
    Ipv4,
    /// IPv6 addresses
    Ipv6,
    /// Application identifiers
    App,
}

impl AttrKind {
    /// Sweep order
    pub const ALL: [AttrKind; 5] = [
        AttrKind::Hostname,
        AttrKind::Url,
        AttrKind::Ipv4,
        AttrKind::Ipv6,
        AttrKind::App,
    ];

    /// Lower-case name
    pub fn as_str(self) -> &'static str {
        match self {
            AttrKind::Hostname => "hostname",
            AttrKind::Url => "url",
            AttrKind::Ipv4 => "ipv4",
            AttrKind::Ipv6 => "ipv6",
            AttrKind::App => "app",
        }
    }
}

impl fmt::Display for AttrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flow direction, one tree each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowDirection {
    /// Traffic towards the device
    Inbound,
    /// Traffic from the device
    Outbound,
}

impl FlowDirection {
    /// Sweep order
    pub const ALL: [FlowDirection; 2] = [FlowDirection::Inbound, FlowDirection::Outbound];

    /// Lower-case name
    pub fn as_str(self) -> &'static str {
        match self {
            FlowDirection::Inbound => "inbound",
            FlowDirection::Outbound => "outbound",
        }
    }
}

impl fmt::Display for FlowDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
