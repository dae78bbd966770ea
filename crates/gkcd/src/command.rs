//! JSON-lines command protocol
//!
//! One request object per input line, tagged by `op`:
//! ```text
//! {"op":"insert","mac":"aa:bb:cc:dd:ee:ff","kind":"fqdn","value":"a.com","verdict":{"action":"block"},"ttl":60}
//! {"op":"lookup","mac":"aa:bb:cc:dd:ee:ff","kind":"sni","value":"a.com"}
//! {"op":"sweep"}
//! ```
//! One response object per output line, tagged by `status`.

use gkcache::{CachedVerdict, FlowDirection, FlowKey, MacAddr, RequestType, StatsSnapshot, SweepReport, Verdict};
use serde::{Deserialize, Serialize};

/// Request read from stdin
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Insert {
        mac: MacAddr,
        kind: RequestType,
        value: String,
        verdict: Verdict,
        redirect: Option<String>,
        ttl: Option<u64>,
    },
    Lookup {
        mac: MacAddr,
        kind: RequestKind,
        value: String,
    },
    Delete {
        mac: MacAddr,
        kind: RequestKind,
        value: String,
    },
    InsertFlow {
        mac: MacAddr,
        direction: FlowDirection,
        flow: FlowKey,
        verdict: Verdict,
        ttl: Option<u64>,
    },
    LookupFlow {
        mac: MacAddr,
        direction: FlowDirection,
        flow: FlowKey,
    },
    DeleteFlow {
        mac: MacAddr,
        direction: FlowDirection,
        flow: FlowKey,
    },
    Sweep {
        mac: Option<MacAddr>,
    },
    Purge {
        mac: MacAddr,
    },
    Count,
    Stats,
    Cleanup,
    Dump,
}

/// Request type on lookup and delete
///
/// Names outside the classifier enumeration still parse; they address no
/// tree and answer `not_found`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RequestKind {
    Known(RequestType),
    Unknown(String),
}

/// Reply written to stdout
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok,
    Inserted,
    Replaced,
    Verdict(CachedVerdict),
    NotFound,
    Swept(SweepReport),
    Purged { removed: usize },
    Count { entries: u64, devices: usize },
    Stats(StatsSnapshot),
    Error { message: String },
}
