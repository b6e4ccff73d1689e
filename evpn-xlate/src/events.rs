// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Scripted object changes, and a driver replaying them against an
//! in-memory object store and table model.

use std::fmt;
use std::fs;
use std::path::Path;

use aal::OpKind;
use aal::TableOperation;
use aal::TableWriter;
use serde::Deserialize;
use serde::Serialize;
use slog::info;

use crate::nexthop::FdbEntry;
use crate::nexthop::L2Nexthop;
use crate::nexthop::Nexthop;
use crate::nexthop::Route;
use crate::objects::BridgePort;
use crate::objects::LogicalBridge;
use crate::objects::Sa;
use crate::objects::SaConfig;
use crate::objects::Svi;
use crate::objects::TunnelRep;
use crate::objects::Vrf;
use crate::soft::SoftTables;
use crate::store::MemStore;
use crate::translator::Translator;
use crate::types::XlateResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOp {
    Add,
    Delete,
}

impl From<EventOp> for OpKind {
    fn from(op: EventOp) -> Self {
        match op {
            EventOp::Add => OpKind::Add,
            EventOp::Delete => OpKind::Delete,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Object {
    Vrf(Vrf),
    LogicalBridge(LogicalBridge),
    Svi(Svi),
    BridgePort(BridgePort),
    Sa(Sa),
    Tunnel(TunnelRep),
    Route(Route),
    Nexthop(Nexthop),
    L2Nexthop(L2Nexthop),
    Fdb(FdbEntry),
}

/// A single add or delete of a configuration object
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Event {
    pub op: EventOp,
    #[serde(flatten)]
    pub object: Object,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let op = match self.op {
            EventOp::Add => "add",
            EventOp::Delete => "delete",
        };
        match &self.object {
            Object::Vrf(v) => write!(f, "{op} vrf {}", v.name),
            Object::LogicalBridge(lb) => {
                write!(f, "{op} logical bridge {}", lb.name)
            }
            Object::Svi(s) => write!(f, "{op} svi {}", s.name),
            Object::BridgePort(bp) => write!(f, "{op} bridge port {}", bp.name),
            Object::Sa(sa) => write!(f, "{op} sa {}", sa.index),
            Object::Tunnel(t) => write!(f, "{op} tunnel {}", t.if_id),
            Object::Route(r) => {
                write!(f, "{op} route {} in {}", r.prefix, r.vrf)
            }
            Object::Nexthop(nh) => write!(f, "{op} nexthop {}", nh.id),
            Object::L2Nexthop(nh) => write!(f, "{op} l2 nexthop {}", nh.id),
            Object::Fdb(e) => {
                write!(f, "{op} fdb {} vlan {}", e.mac, e.vlan_id)
            }
        }
    }
}

/// Read a json array of events
pub fn load_events(path: impl AsRef<Path>) -> XlateResult<Vec<Event>> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// What replaying one event produced
#[derive(Debug, Serialize)]
pub struct Outcome {
    pub event: String,
    pub ops: Vec<TableOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sa_config: Option<SaConfig>,
}

/// Drives a Translator with a sequence of events.  Objects other decoders
/// look up are added to the store before they are translated, and removed
/// only after their delete has been translated.
pub struct Replay<'a> {
    log: slog::Logger,
    translator: &'a Translator,
    store: MemStore,
    tables: SoftTables,
}

impl<'a> Replay<'a> {
    pub fn new(log: &slog::Logger, translator: &'a Translator) -> Self {
        let log = log.new(slog::o!("unit" => "replay"));
        let tables = SoftTables::new(&log);
        Replay {
            log,
            translator,
            store: MemStore::new(),
            tables,
        }
    }

    pub fn store(&self) -> &MemStore {
        &self.store
    }

    pub fn tables(&self) -> &SoftTables {
        &self.tables
    }

    /// Program the static entries
    pub fn startup(&mut self) -> XlateResult<Vec<TableOperation>> {
        let ops = self.translator.startup()?;
        self.tables.apply_all(&ops)?;
        Ok(ops)
    }

    /// Remove the static entries
    pub fn shutdown(&mut self) -> XlateResult<Vec<TableOperation>> {
        let ops = self.translator.shutdown()?;
        self.tables.apply_all(&ops)?;
        Ok(ops)
    }

    pub fn apply(&mut self, event: &Event) -> XlateResult<Outcome> {
        let kind = OpKind::from(event.op);
        let t = self.translator;
        let mut sa_config = None;

        let ops = match &event.object {
            Object::Vrf(vrf) => {
                if kind == OpKind::Add {
                    self.store.insert_vrf(vrf.clone());
                }
                let ops = t.vrf(vrf, kind)?;
                if kind == OpKind::Delete {
                    self.store.remove_vrf(&vrf.name);
                }
                ops
            }
            Object::LogicalBridge(lb) => {
                if kind == OpKind::Add {
                    self.store.insert_logical_bridge(lb.clone());
                }
                let ops = t.logical_bridge(lb, kind)?;
                if kind == OpKind::Delete {
                    self.store.remove_logical_bridge(&lb.name);
                }
                ops
            }
            Object::Svi(svi) => {
                if kind == OpKind::Add {
                    self.store.insert_svi(svi.clone());
                }
                let ops = t.svi(&self.store, svi, kind)?;
                if kind == OpKind::Delete {
                    self.store.remove_svi(&svi.name);
                }
                ops
            }
            Object::BridgePort(bp) => {
                if kind == OpKind::Add {
                    self.store.insert_bridge_port(bp.clone());
                }
                let ops = t.bridge_port(&self.store, bp, kind)?;
                if kind == OpKind::Delete {
                    self.store.remove_bridge_port(&bp.name);
                }
                ops
            }
            Object::Sa(sa) => {
                if kind == OpKind::Add {
                    self.store.insert_sa(sa.clone());
                }
                let (ops, config) = t.sa(&self.store, sa, kind)?;
                if let Some(config) = &config {
                    self.tables.install_sa(config)?;
                }
                if kind == OpKind::Delete {
                    self.store.remove_sa(sa.index);
                }
                sa_config = config;
                ops
            }
            Object::Tunnel(tun) => {
                if kind == OpKind::Add {
                    self.store.insert_tunnel(tun.clone());
                }
                let ops = t.tunnel(tun, kind)?;
                if kind == OpKind::Delete {
                    self.store.remove_tunnel(tun.if_id);
                }
                ops
            }
            Object::Route(route) => t.route(route, kind)?,
            Object::Nexthop(nh) => t.nexthop(nh, kind)?,
            Object::L2Nexthop(nh) => t.l2_nexthop(nh, kind)?,
            Object::Fdb(fdb) => t.fdb(fdb, kind)?,
        };

        self.tables.apply_all(&ops)?;
        info!(self.log, "replayed"; "event" => %event, "ops" => ops.len());
        Ok(Outcome {
            event: event.to_string(),
            ops,
            sa_config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nexthop::Directions;
    use crate::nexthop::FdbKind;
    use crate::store::ObjectStore;
    use pretty_assertions::assert_eq;

    const EVENTS: &str = r#"[
        {
            "op": "add",
            "type": "vrf",
            "name": "blue",
            "vni": 100,
            "routing_table": 5,
            "vtep_ip": "10.10.0.1",
            "router_mac": "00:aa:00:00:00:01"
        },
        {
            "op": "add",
            "type": "route",
            "vrf": "blue",
            "routing_table": 5,
            "prefix": "10.0.0.0/24",
            "direction": "rx",
            "nexthops": [{
                "id": 7,
                "key": {
                    "vrf": "blue",
                    "dst": "10.0.0.1",
                    "dev": "eth0",
                    "prefsrc": null,
                    "local": false
                },
                "kind": {
                    "type": "physical",
                    "smac": "00:10:00:00:00:00",
                    "dmac": "00:bb:00:00:00:01",
                    "egress_vport": 16
                }
            }]
        },
        {
            "op": "delete",
            "type": "fdb",
            "mac": "00:cc:00:00:00:01",
            "vlan_id": 10,
            "kind": "bridge_port",
            "nexthop_id": 5
        }
    ]"#;

    #[test]
    fn test_parse() -> anyhow::Result<()> {
        let events: Vec<Event> = serde_json::from_str(EVENTS)?;
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].op, EventOp::Add);
        assert_eq!(events[0].to_string(), "add vrf blue");
        let Object::Route(route) = &events[1].object else {
            panic!("expected a route, found {:?}", events[1].object);
        };
        assert_eq!(route.direction, Directions::Rx);
        assert_eq!(route.nexthops[0].weight, 1);
        let Object::Fdb(fdb) = &events[2].object else {
            panic!("expected an fdb entry, found {:?}", events[2].object);
        };
        assert_eq!(fdb.kind, FdbKind::BridgePort);
        assert_eq!(fdb.direction, Directions::Both);
        Ok(())
    }

    #[test]
    fn test_store_order() -> anyhow::Result<()> {
        let log = crate::test_logger();
        let t = Translator::new(&log, crate::test_config())?;
        let mut replay = Replay::new(&log, &t);
        let events: Vec<Event> = serde_json::from_str(EVENTS)?;

        replay.apply(&events[0])?;
        assert!(replay.store().vrf("blue").is_ok());
        let route = replay.apply(&events[1])?;
        assert_eq!(route.ops.len(), 2);
        assert_eq!(replay.tables().len(), 4);

        let mut delete = events[0].clone();
        delete.op = EventOp::Delete;
        let outcome = replay.apply(&delete)?;
        assert_eq!(outcome.ops.len(), 2);
        assert!(replay.store().vrf("blue").is_err());
        assert_eq!(replay.tables().len(), 2);
        Ok(())
    }
}
