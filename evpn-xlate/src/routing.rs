// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! IPv4 routes, ECMP groups and the rewrite side of L3 nexthops.

use std::sync::Arc;

use aal::OpKind;
use aal::TableOperation;
use common::network::GRD_VLAN;

use crate::config::Config;
use crate::ecmp::EcmpGroup;
use crate::nexthop::Direction;
use crate::nexthop::Nexthop;
use crate::nexthop::NexthopKind;
use crate::nexthop::Route;
use crate::pools::ModPtrKey;
use crate::pools::Pools;
use crate::table::egress_vsi;
use crate::table::ingress::DaKey;
use crate::table::ingress::IngressAction;
use crate::table::ingress::PortDaKey;
use crate::table::ingress::PortKey;
use crate::table::ingress::VsiDaKey;
use crate::table::ingress::VsiKey;
use crate::table::ingress::VsiVidKey;
use crate::table::nexthop::NeighborKey;
use crate::table::nexthop::NexthopAction;
use crate::table::nexthop::P2P_QID;
use crate::table::rewrite::ModAction;
use crate::table::rewrite::ModBlobKey;
use crate::table::route::EcmpSelectionAction;
use crate::table::route::EcmpSelectionKey;
use crate::table::route::LemKey;
use crate::table::route::LpmKey;
use crate::table::route::P2pLpmKey;
use crate::table::route::RedirectAction;
use crate::table::route::RedirectKey;
use crate::table::route::RouteAction;
use crate::table::tcam_prefix;
use crate::table::OpList;
use crate::table::TableType;
use crate::table::GRD_TCAM;
use crate::table::IGNORE_PTR;
use crate::table::P2P_TCAM;
use crate::txn::atomically;
use crate::txn::Txn;
use crate::types::narrow16;
use crate::types::XlateError;
use crate::types::XlateResult;

/// Priority of every LPM route entry
const LPM_PRIORITY: i32 = 1;

// What a route forwards to: a single nexthop, or an ECMP group
enum Target<'r> {
    Single(&'r Nexthop),
    Group { group: EcmpGroup<'r>, id: u32 },
}

impl Target<'_> {
    fn neighbor(&self, dir: Direction) -> XlateResult<u16> {
        match self {
            Target::Single(nh) => nh.p4_id(dir),
            Target::Group { group, id } => group.p4_id(*id, dir),
        }
    }

    fn ecmp_on(&self) -> u16 {
        match self {
            Target::Single(_) => 0,
            Target::Group { .. } => 1,
        }
    }
}

pub struct RoutingDecoder {
    log: slog::Logger,
    config: Arc<Config>,
    pools: Arc<Pools>,
}

impl RoutingDecoder {
    pub fn new(
        log: &slog::Logger,
        config: Arc<Config>,
        pools: Arc<Pools>,
    ) -> Self {
        RoutingDecoder {
            log: log.new(slog::o!("unit" => "routing")),
            config,
            pools,
        }
    }

    /// Translate a route add or delete
    pub fn translate_route(
        &self,
        route: &Route,
        kind: OpKind,
    ) -> XlateResult<Vec<TableOperation>> {
        let what = format!("route {} in {}", route.prefix, route.vrf);
        atomically(&self.log, kind, &what, |txn, ops| {
            self.route_ops(txn, ops, route)
        })
    }

    /// Translate an L3 nexthop add or delete
    pub fn translate_nexthop(
        &self,
        nh: &Nexthop,
        kind: OpKind,
    ) -> XlateResult<Vec<TableOperation>> {
        let what = format!("{} nexthop {}", nh.kind.name(), nh.id);
        atomically(&self.log, kind, &what, |txn, ops| {
            self.nexthop_ops(txn, ops, nh)
        })
    }

    /// The entries programmed once at startup, or removed at shutdown
    pub fn static_entries(
        &self,
        kind: OpKind,
    ) -> XlateResult<Vec<TableOperation>> {
        atomically(&self.log, kind, &"routing statics", |txn, ops| {
            self.static_ops(txn, ops)
        })
    }

    pub(crate) fn route_ops<'a>(
        &'a self,
        txn: &mut Txn<'a>,
        ops: &mut OpList,
        route: &Route,
    ) -> XlateResult<()> {
        let kind = ops.kind();
        let first = route.nexthops.first().ok_or_else(|| {
            XlateError::InvalidConfiguration(format!(
                "route {} has no nexthops",
                route.prefix
            ))
        })?;
        let vrf_id = route.vrf_id();

        let target = if route.nexthops.len() > 1 {
            let group = EcmpGroup::new(&route.nexthops)?;
            let change = txn.bind_with_ref(
                kind,
                &self.pools.ecmp,
                &group.signature(),
                &route.key(),
            )?;
            // The selection entries are shared by every route using the
            // group
            if change.is_edge(kind) {
                self.selection_ops(ops, &group, change.id)?;
            }
            Target::Group {
                group,
                id: change.id,
            }
        } else {
            Target::Single(first)
        };

        for dir in route.direction.list() {
            let action = RouteAction::SetNeighbor {
                neighbor: target.neighbor(*dir)?,
                ecmp_on: target.ecmp_on(),
            };
            if route.is_host() {
                let key = LemKey {
                    vrf: narrow16("vrf id", vrf_id)?,
                    direction: dir.code(),
                    dst_ip: route.prefix.addr(),
                };
                ops.push(TableType::L3Lem, &key, 0, &action)?;
            } else {
                let tcam = tcam_prefix(vrf_id, *dir)?;
                let change = txn.bind_with_ref(
                    kind,
                    &self.pools.trie,
                    &tcam,
                    &route.prefix,
                )?;
                if change.is_edge(kind) {
                    let key = RedirectKey { tcam_prefix: tcam };
                    let action = RedirectAction::Lut1 { tidx: change.id };
                    ops.push(
                        TableType::EcmpLpmRootLut1,
                        &key,
                        change.id as i32,
                        &action,
                    )?;
                }
                let key = LpmKey {
                    ipv4_table_lpm_root1: change.id,
                    dst_ip: route.prefix,
                };
                ops.push(TableType::L3Routing, &key, LPM_PRIORITY, &action)?;
            }
        }

        // Traffic arriving on a physical port for the global routing domain
        // may bypass the VRF lookup
        let p2p = route.is_grd()
            && matches!(
                first.kind,
                NexthopKind::Physical(_) | NexthopKind::IpTunnel(_)
            );
        if p2p {
            let action = RouteAction::SetP2pNeighbor {
                neighbor: target.neighbor(Direction::Rx)?,
                ecmp_on: target.ecmp_on(),
            };
            if route.is_host() {
                let key = LemKey {
                    vrf: narrow16("vrf id", vrf_id)?,
                    direction: Direction::Rx.code(),
                    dst_ip: route.prefix.addr(),
                };
                ops.push(TableType::L3P2pLem, &key, 0, &action)?;
            } else {
                let tidx = self.pools.trie.lookup(&P2P_TCAM).ok_or_else(|| {
                    XlateError::NotFound(
                        "point-to-point redirect index".to_string(),
                    )
                })?;
                let key = P2pLpmKey {
                    ipv4_table_lpm_root2: tidx,
                    dst_ip: route.prefix,
                };
                ops.push(
                    TableType::L3P2pRouting,
                    &key,
                    LPM_PRIORITY,
                    &action,
                )?;
            }
        }
        Ok(())
    }

    // Spread the group's hash slots across its members
    fn selection_ops(
        &self,
        ops: &mut OpList,
        group: &EcmpGroup,
        group_id: u32,
    ) -> XlateResult<()> {
        let slots = group.slots();
        for dir in group.selection_directions() {
            let neighbor = group.p4_id(group_id, *dir)?;
            for (hash, member) in slots.iter().enumerate() {
                let key = EcmpSelectionKey {
                    neighbor,
                    hash: hash as u16,
                    bit32_zeros: 0,
                };
                let action = EcmpSelectionAction::SetNeighbor {
                    neighbor: member.p4_id(*dir)?,
                };
                ops.push(TableType::EcmpSelection, &key, 0, &action)?;
            }
        }
        Ok(())
    }

    pub(crate) fn nexthop_ops<'a>(
        &'a self,
        txn: &mut Txn<'a>,
        ops: &mut OpList,
        nh: &Nexthop,
    ) -> XlateResult<()> {
        let kind = ops.kind();
        let owner = ModPtrKey::L3Nexthop(nh.key.clone());
        let rx = NeighborKey::new(nh.p4_id(Direction::Rx)?);
        let tx = NeighborKey::new(nh.p4_id(Direction::Tx)?);

        match &nh.kind {
            NexthopKind::Physical(phy) => {
                let mod_ptr =
                    self.pools.bind_mod_ptr(txn, kind, owner.clone())?;
                let vport = phy.egress_vport;
                ops.push(
                    TableType::MacMod,
                    &ModBlobKey::new(mod_ptr),
                    0,
                    &ModAction::UpdateSmacDmac {
                        smac: phy.smac,
                        dmac: phy.dmac,
                    },
                )?;
                ops.push(
                    TableType::L3NexthopTx,
                    &tx,
                    0,
                    &NexthopAction::PushMac { mod_ptr, vport },
                )?;
                ops.push(
                    TableType::L3NexthopRx,
                    &rx,
                    0,
                    &NexthopAction::SendP2pPushMac {
                        mod_ptr,
                        vport,
                        q_id: P2P_QID,
                    },
                )?;
                ops.push(
                    TableType::IngressP2p,
                    &rx,
                    0,
                    &NexthopAction::FwdToPort { port: vport },
                )?;
            }
            NexthopKind::Acc(acc) => {
                let mod_ptr =
                    self.pools.bind_mod_ptr(txn, kind, owner.clone())?;
                ops.push(
                    TableType::DmacVlanPushMod,
                    &ModBlobKey::new(mod_ptr),
                    0,
                    &ModAction::DmacVlanPush {
                        pcp: 0,
                        dei: 1,
                        vlan_id: acc.vlan_id,
                        dmac: acc.dmac,
                    },
                )?;
                let action = NexthopAction::PushDmacVlan {
                    mod_ptr,
                    vport: egress_vsi(acc.egress_vport),
                };
                ops.push(TableType::L3NexthopRx, &tx, 0, &action)?;
                ops.push(TableType::L3NexthopTx, &tx, 0, &action)?;
            }
            NexthopKind::SviTrunk(svi) => {
                let mod_ptr =
                    self.pools.bind_mod_ptr(txn, kind, owner.clone())?;
                ops.push(
                    TableType::MacVlanPushMod,
                    &ModBlobKey::new(mod_ptr),
                    0,
                    &ModAction::UpdateSmacDmacVlan {
                        smac: svi.smac,
                        dmac: svi.dmac,
                        pcp: 0,
                        dei: 1,
                        vlan_id: svi.vlan_id,
                    },
                )?;
                let action = NexthopAction::PushMacVlan {
                    mod_ptr,
                    vport: egress_vsi(svi.egress_vport),
                };
                ops.push(TableType::L3NexthopRx, &tx, 0, &action)?;
                ops.push(TableType::L3NexthopTx, &tx, 0, &action)?;
            }
            NexthopKind::SviAccess(svi) => {
                let mod_ptr =
                    self.pools.bind_mod_ptr(txn, kind, owner.clone())?;
                ops.push(
                    TableType::MacMod,
                    &ModBlobKey::new(mod_ptr),
                    0,
                    &ModAction::UpdateSmacDmac {
                        smac: svi.smac,
                        dmac: svi.dmac,
                    },
                )?;
                let action = NexthopAction::PushMac {
                    mod_ptr,
                    vport: egress_vsi(svi.egress_vport),
                };
                ops.push(TableType::L3NexthopRx, &tx, 0, &action)?;
                ops.push(TableType::L3NexthopTx, &tx, 0, &action)?;
            }
            // Encapsulating nexthops are programmed by the vxlan and ipsec
            // decoders
            NexthopKind::Vxlan(_)
            | NexthopKind::IpTunnel(_)
            | NexthopKind::VxlanTunnel(_) => {}
        }
        Ok(())
    }

    pub(crate) fn static_ops<'a>(
        &'a self,
        txn: &mut Txn<'a>,
        ops: &mut OpList,
    ) -> XlateResult<()> {
        let reps = &self.config.representors;

        ops.push(
            TableType::TaggedVportIngress,
            &VsiVidKey {
                vsi: reps.vrf_mux.vsi,
                vid: GRD_VLAN,
            },
            0,
            &IngressAction::PopVlanSetGrdVrf {
                mod_ptr: IGNORE_PTR,
                tcam_prefix: GRD_TCAM,
                vrf: 0,
            },
        )?;

        // The gRPC representors forward to each other
        for (port, peer) in [
            (reps.grpc_acc, reps.grpc_host),
            (reps.grpc_host, reps.grpc_acc),
        ] {
            ops.push(
                TableType::VportSviIngress,
                &VsiDaKey {
                    vsi: port.vsi,
                    da: peer.mac,
                },
                0,
                &IngressAction::FwdToPort {
                    port: egress_vsi(peer.vsi),
                },
            )?;
            ops.push(
                TableType::L2FwdRx,
                &DaKey { da: port.mac },
                0,
                &IngressAction::L2Fwd {
                    vport: egress_vsi(port.vsi),
                },
            )?;
        }

        for port in &reps.phy {
            ops.push(
                TableType::PhyIngressIp,
                &PortDaKey {
                    port_id: port.port_id,
                    da: port.mac,
                },
                0,
                &IngressAction::SetVrfId {
                    tcam_prefix: GRD_TCAM,
                    vport: egress_vsi(self.config.routing_default_vsi),
                    vrf: 0,
                },
            )?;
            ops.push(
                TableType::PhyIngressArp,
                &PortKey {
                    port_id: port.port_id,
                    bit32_zeros: 0,
                },
                0,
                &IngressAction::FwdToPort {
                    port: egress_vsi(port.vsi),
                },
            )?;
            let to_port = IngressAction::FwdToPort {
                port: u32::from(port.port_id),
            };
            ops.push(
                TableType::VportIngress,
                &VsiKey::new(port.vsi),
                0,
                &to_port,
            )?;
            ops.push(
                TableType::VportArpIngress,
                &VsiKey::new(port.vsi),
                0,
                &to_port,
            )?;
        }

        let tidx = txn.bind(ops.kind(), &self.pools.trie, &P2P_TCAM)?.id;
        ops.push(
            TableType::EcmpLpmRootLut2,
            &RedirectKey {
                tcam_prefix: P2P_TCAM,
            },
            tidx as i32,
            &RedirectAction::Lut2 { tidx },
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nexthop::Directions;
    use crate::nexthop::NexthopKey;
    use crate::nexthop::PhysicalNexthop;
    use crate::nexthop::GRD_VRF;
    use crate::test_config;
    use aal::MatchEntryValue;
    use aal::ValueTypes;
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    fn decoder() -> RoutingDecoder {
        let log = crate::test_logger();
        let config = Arc::new(test_config());
        let pools = Arc::new(Pools::new(&log, &config).unwrap());
        RoutingDecoder::new(&log, config, pools)
    }

    fn phy(id: u32, direction: Directions) -> Nexthop {
        Nexthop {
            id,
            key: NexthopKey {
                vrf: GRD_VRF.to_string(),
                dst: Some(Ipv4Addr::new(192, 168, 0, id as u8)),
                dev: "eth0".to_string(),
                prefsrc: None,
                local: false,
            },
            weight: 1,
            direction,
            kind: NexthopKind::Physical(PhysicalNexthop {
                smac: "00:10:00:00:00:00".parse().unwrap(),
                dmac: "00:aa:00:00:00:01".parse().unwrap(),
                egress_vport: 0,
            }),
        }
    }

    fn route(vrf: &str, prefix: &str, direction: Directions) -> Route {
        Route {
            vrf: vrf.to_string(),
            routing_table: 5,
            prefix: prefix.parse().unwrap(),
            direction,
            nexthops: vec![phy(3, Directions::Both)],
        }
    }

    fn tables(ops: &[TableOperation]) -> Vec<&str> {
        ops.iter().map(|op| op.table.as_str()).collect()
    }

    #[test]
    fn test_host_route() -> anyhow::Result<()> {
        let d = decoder();
        let r = route("blue", "10.1.1.1/32", Directions::Both);
        let ops = d.translate_route(&r, OpKind::Add)?;
        assert_eq!(ops.len(), 2);
        assert!(ops.iter().all(|op| op.table == TableType::L3Lem.name()));
        let dir = &ops[0].key.field_by_name("direction")?.value;
        assert_eq!(dir, &MatchEntryValue::Exact(ValueTypes::U16(1)));
        assert_eq!(d.pools.trie.in_use(), 0);

        let r = Route {
            direction: Directions::Rx,
            ..r
        };
        assert_eq!(d.translate_route(&r, OpKind::Add)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_network_route() -> anyhow::Result<()> {
        let d = decoder();
        let r = route("blue", "10.0.0.0/24", Directions::Rx);
        let ops = d.translate_route(&r, OpKind::Add)?;
        assert_eq!(
            tables(&ops),
            vec![
                TableType::EcmpLpmRootLut1.name(),
                TableType::L3Routing.name()
            ]
        );
        let tidx = d.pools.trie.lookup(&50).unwrap();
        assert_eq!(ops[0].priority, tidx as i32);
        assert_eq!(ops[1].priority, 1);

        // A second prefix shares the redirect
        let r2 = route("blue", "10.0.1.0/24", Directions::Rx);
        let ops = d.translate_route(&r2, OpKind::Add)?;
        assert_eq!(tables(&ops), vec![TableType::L3Routing.name()]);

        let ops = d.translate_route(&r, OpKind::Delete)?;
        assert_eq!(tables(&ops), vec![TableType::L3Routing.name()]);
        let ops = d.translate_route(&r2, OpKind::Delete)?;
        assert_eq!(
            tables(&ops),
            vec![
                TableType::L3Routing.name(),
                TableType::EcmpLpmRootLut1.name()
            ]
        );
        assert_eq!(d.pools.trie.in_use(), 0);
        Ok(())
    }

    #[test]
    fn test_p2p_route() -> anyhow::Result<()> {
        let d = decoder();
        // Network routes in the GRD need the static redirect in place
        let r = route(GRD_VRF, "10.2.0.0/16", Directions::Tx);
        assert!(matches!(
            d.translate_route(&r, OpKind::Add),
            Err(XlateError::NotFound(_))
        ));
        assert_eq!(d.pools.trie.in_use(), 0);

        d.static_entries(OpKind::Add)?;
        let ops = d.translate_route(&r, OpKind::Add)?;
        assert_eq!(
            ops.last().map(|op| op.table.as_str()),
            Some(TableType::L3P2pRouting.name())
        );

        let r = route(GRD_VRF, "10.2.0.1/32", Directions::Tx);
        let ops = d.translate_route(&r, OpKind::Add)?;
        assert_eq!(
            tables(&ops),
            vec![TableType::L3Lem.name(), TableType::L3P2pLem.name()]
        );
        Ok(())
    }

    #[test]
    fn test_ecmp_route() -> anyhow::Result<()> {
        let d = decoder();
        let mut r = route("blue", "10.1.1.1/32", Directions::Tx);
        r.nexthops = vec![phy(3, Directions::Tx), phy(4, Directions::Tx)];

        let ops = d.translate_route(&r, OpKind::Add)?;
        // 16 slots for each of rx and tx, then the route itself
        assert_eq!(ops.len(), 33);
        let action = ops[32].action.as_ref().unwrap();
        assert_eq!(action.arg_by_name("ecmp_on")?.value, ValueTypes::U16(1));
        let group = d.pools.ecmp.lookup(&vec![3, 4]).unwrap();
        assert_eq!(
            action.arg_by_name("neighbor")?.value,
            ValueTypes::U16((group << 1) as u16)
        );

        // Another route on the same group only adds its own entry
        let mut r2 = r.clone();
        r2.prefix = "10.1.1.2/32".parse()?;
        assert_eq!(d.translate_route(&r2, OpKind::Add)?.len(), 1);
        assert_eq!(d.pools.ecmp.refcount(&vec![3, 4]), 2);

        assert_eq!(d.translate_route(&r2, OpKind::Delete)?.len(), 1);
        let ops = d.translate_route(&r, OpKind::Delete)?;
        assert_eq!(ops.len(), 33);
        assert_eq!(ops[0].table, TableType::L3Lem.name());
        assert_eq!(d.pools.ecmp.in_use(), 0);
        Ok(())
    }

    #[test]
    fn test_ecmp_direction_conflict() {
        let d = decoder();
        let mut r = route("blue", "10.0.0.0/24", Directions::Both);
        r.nexthops = vec![phy(3, Directions::Rx), phy(4, Directions::Tx)];
        assert!(matches!(
            d.translate_route(&r, OpKind::Add),
            Err(XlateError::InvalidConfiguration(_))
        ));
        assert_eq!(d.pools.ecmp.in_use(), 0);
        assert_eq!(d.pools.trie.in_use(), 0);
    }

    #[test]
    fn test_tcam_overflow_rolls_back() {
        let d = decoder();
        let mut r = route("big", "10.0.0.0/24", Directions::Tx);
        r.routing_table = 429_496_729;
        assert!(d.translate_route(&r, OpKind::Add).is_ok());
        assert_eq!(d.pools.trie.in_use(), 1);

        // The group is bound before the composite key overflows
        let mut r = route("bigger", "10.0.0.0/24", Directions::Tx);
        r.routing_table = 429_496_730;
        r.nexthops = vec![phy(3, Directions::Tx), phy(4, Directions::Tx)];
        assert!(matches!(
            d.translate_route(&r, OpKind::Add),
            Err(XlateError::InvalidConfiguration(_))
        ));
        assert_eq!(d.pools.ecmp.in_use(), 0);
        assert_eq!(d.pools.trie.in_use(), 1);
    }

    #[test]
    fn test_phy_nexthop() -> anyhow::Result<()> {
        let d = decoder();
        let nh = phy(3, Directions::Tx);
        let ops = d.translate_nexthop(&nh, OpKind::Add)?;
        assert_eq!(
            tables(&ops),
            vec![
                TableType::MacMod.name(),
                TableType::L3NexthopTx.name(),
                TableType::L3NexthopRx.name(),
                TableType::IngressP2p.name(),
            ]
        );
        let neighbor = &ops[2].key.field_by_name("neighbor")?.value;
        assert_eq!(neighbor, &MatchEntryValue::Exact(ValueTypes::U16(7)));

        let del = d.translate_nexthop(&nh, OpKind::Delete)?;
        assert_eq!(del.last().unwrap().table, TableType::MacMod.name());
        assert_eq!(d.pools.mod_ptr.in_use(), 0);
        Ok(())
    }

    #[test]
    fn test_static_entries() -> anyhow::Result<()> {
        let d = decoder();
        let add = d.static_entries(OpKind::Add)?;
        // GRD vlan, two per grpc port, four per phy port, p2p redirect
        assert_eq!(add.len(), 1 + 4 + 4 * 2 + 1);
        assert!(d.pools.trie.lookup(&P2P_TCAM).is_some());

        let del = d.static_entries(OpKind::Delete)?;
        assert_eq!(del.len(), add.len());
        assert_eq!(del[0].table, TableType::EcmpLpmRootLut2.name());
        assert_eq!(d.pools.trie.lookup(&P2P_TCAM), None);
        Ok(())
    }
}
