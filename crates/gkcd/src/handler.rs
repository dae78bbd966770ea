//! Command handler for the JSON-lines protocol

use gkcache::{
    AttributeEntry, Error, FlowEntry, GatekeeperCache, InsertOutcome, Result, SweepScope,
};
use tracing::{debug, warn};

use crate::command::{Command, RequestKind, Response};

pub struct CommandHandler {
    cache: GatekeeperCache,
}

impl CommandHandler {
    pub fn new(cache: GatekeeperCache) -> Self {
        Self { cache }
    }

    /// Parse one input line and produce one output line
    pub fn handle_line(&self, line: &str) -> String {
        let response = match serde_json::from_str::<Command>(line) {
            Ok(cmd) => self.handle(cmd),
            Err(e) => {
                warn!("Parse error: {}", e);
                Response::Error {
                    message: e.to_string(),
                }
            }
        };

        serde_json::to_string(&response)
            .unwrap_or_else(|e| format!(r#"{{"status":"error","message":"{}"}}"#, e))
    }

    pub fn handle(&self, cmd: Command) -> Response {
        match cmd {
            Command::Insert {
                mac,
                kind,
                value,
                verdict,
                redirect,
                ttl,
            } => {
                let entry = AttributeEntry {
                    mac,
                    request_type: kind,
                    value,
                    verdict,
                    redirect,
                    ttl,
                };
                stored(self.cache.insert_attribute(entry))
            }
            Command::Lookup { mac, kind, value } => match kind {
                RequestKind::Known(kind) => {
                    reply(self.cache.lookup_attribute(mac, kind, &value), Response::Verdict)
                }
                RequestKind::Unknown(name) => unknown_kind("lookup", &name),
            },
            Command::Delete { mac, kind, value } => match kind {
                RequestKind::Known(kind) => {
                    reply(self.cache.delete_attribute(mac, kind, &value), |_| Response::Ok)
                }
                RequestKind::Unknown(name) => unknown_kind("delete", &name),
            },
            Command::InsertFlow {
                mac,
                direction,
                flow,
                verdict,
                ttl,
            } => {
                let entry = FlowEntry {
                    mac,
                    direction,
                    key: flow,
                    verdict,
                    ttl,
                };
                stored(self.cache.insert_flow(entry))
            }
            Command::LookupFlow {
                mac,
                direction,
                flow,
            } => reply(self.cache.lookup_flow(mac, direction, &flow), Response::Verdict),
            Command::DeleteFlow {
                mac,
                direction,
                flow,
            } => reply(self.cache.delete_flow(mac, direction, &flow), |_| Response::Ok),
            Command::Sweep { mac } => {
                let scope = mac.map_or(SweepScope::All, SweepScope::Device);
                Response::Swept(self.cache.sweep_expired(scope))
            }
            Command::Purge { mac } => reply(self.cache.purge_device(mac), |removed| {
                Response::Purged { removed }
            }),
            Command::Count => self.cache.with_manager(|manager| Response::Count {
                entries: manager.count(),
                devices: manager.device_count(),
            }),
            Command::Stats => Response::Stats(self.cache.stats().snapshot()),
            Command::Cleanup => {
                self.cache.cleanup();
                Response::Ok
            }
            Command::Dump => {
                self.cache.log_entries();
                Response::Ok
            }
        }
    }
}

fn unknown_kind(op: &str, name: &str) -> Response {
    debug!("{}: invalid attribute type {}", op, name);
    Response::NotFound
}

fn stored(result: Result<InsertOutcome>) -> Response {
    reply(result, |outcome| match outcome {
        InsertOutcome::Inserted => Response::Inserted,
        InsertOutcome::Replaced => Response::Replaced,
    })
}

fn reply<T>(result: Result<T>, on_ok: impl FnOnce(T) -> Response) -> Response {
    match result {
        Ok(value) => on_ok(value),
        Err(Error::NotFound) => Response::NotFound,
        Err(e) => Response::Error {
            message: e.to_string(),
        },
    }
}
