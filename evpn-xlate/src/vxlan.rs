// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! VXLAN termination and encapsulation.

use std::sync::Arc;

use aal::OpKind;
use aal::TableOperation;
use common::network::validate_vlan;

use crate::config::Config;
use crate::nexthop::Direction;
use crate::nexthop::FdbEntry;
use crate::nexthop::FdbKind;
use crate::nexthop::L2Nexthop;
use crate::nexthop::L2NexthopKind;
use crate::nexthop::Nexthop;
use crate::nexthop::NexthopKind;
use crate::objects::LogicalBridge;
use crate::objects::Vrf;
use crate::pools::ModPtrKey;
use crate::pools::Pools;
use crate::table::egress_vsi;
use crate::table::ingress::push_fdb;
use crate::table::ingress::IngressAction;
use crate::table::ingress::VxlanKey;
use crate::table::ingress::VxlanVlanKey;
use crate::table::nexthop::NeighborKey;
use crate::table::nexthop::NexthopAction;
use crate::table::nexthop::P2P_QID;
use crate::table::rewrite::ModAction;
use crate::table::rewrite::ModBlobKey;
use crate::table::tcam_prefix;
use crate::table::OpList;
use crate::table::TableType;
use crate::table::IGNORE_PTR;
use crate::txn::atomically;
use crate::txn::Txn;
use crate::types::narrow16;
use crate::types::validate_vni;
use crate::types::XlateError;
use crate::types::XlateResult;

pub struct VxlanDecoder {
    log: slog::Logger,
    config: Arc<Config>,
    pools: Arc<Pools>,
}

impl VxlanDecoder {
    pub fn new(
        log: &slog::Logger,
        config: Arc<Config>,
        pools: Arc<Pools>,
    ) -> Self {
        VxlanDecoder {
            log: log.new(slog::o!("unit" => "vxlan")),
            config,
            pools,
        }
    }

    pub fn translate_vrf(
        &self,
        vrf: &Vrf,
        kind: OpKind,
    ) -> XlateResult<Vec<TableOperation>> {
        let what = format!("vrf {}", vrf.name);
        atomically(&self.log, kind, &what, |_, ops| self.vrf_ops(ops, vrf))
    }

    pub fn translate_logical_bridge(
        &self,
        lb: &LogicalBridge,
        kind: OpKind,
    ) -> XlateResult<Vec<TableOperation>> {
        let what = format!("logical bridge {}", lb.name);
        atomically(&self.log, kind, &what, |_, ops| {
            self.logical_bridge_ops(ops, lb)
        })
    }

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

    pub fn translate_l2_nexthop(
        &self,
        nh: &L2Nexthop,
        kind: OpKind,
    ) -> XlateResult<Vec<TableOperation>> {
        let what = format!("l2 nexthop {}", nh.id);
        atomically(&self.log, kind, &what, |txn, ops| {
            self.l2_nexthop_ops(txn, ops, nh)
        })
    }

    pub fn translate_fdb(
        &self,
        fdb: &FdbEntry,
        kind: OpKind,
    ) -> XlateResult<Vec<TableOperation>> {
        let what = format!("fdb {} vlan {}", fdb.mac, fdb.vlan_id);
        atomically(&self.log, kind, &what, |_, ops| self.fdb_ops(ops, fdb))
    }

    /// Terminate the VRF's VXLAN traffic once the router MAC is known
    pub(crate) fn vrf_ops(
        &self,
        ops: &mut OpList,
        vrf: &Vrf,
    ) -> XlateResult<()> {
        let Some(vni) = vrf.vni else {
            return Ok(());
        };
        let vtep = vrf.vtep_ip.ok_or_else(|| {
            XlateError::InvalidConfiguration(format!(
                "vrf {} has a vni but no vtep address",
                vrf.name
            ))
        })?;
        let router_mac = vrf.router_mac.ok_or_else(|| {
            XlateError::Unresolved(format!("router mac of vrf {}", vrf.name))
        })?;

        let key = VxlanKey {
            dst_ip: vtep,
            vni: validate_vni(vni)?,
            da: router_mac,
        };
        let action = IngressAction::PopVxlanSetVrfId {
            mod_ptr: IGNORE_PTR,
            tcam_prefix: tcam_prefix(vrf.vrf_id(), Direction::Rx)?,
            vrf: vrf.vrf_id(),
        };
        ops.push(TableType::PhyIngressVxlan, &key, 0, &action)
    }

    pub(crate) fn logical_bridge_ops(
        &self,
        ops: &mut OpList,
        lb: &LogicalBridge,
    ) -> XlateResult<()> {
        let Some(vni) = lb.vni else {
            return Ok(());
        };
        let vtep = lb.vtep_ip.ok_or_else(|| {
            XlateError::InvalidConfiguration(format!(
                "logical bridge {} has a vni but no vtep address",
                lb.name
            ))
        })?;

        let key = VxlanVlanKey {
            dst_ip: vtep,
            vni: validate_vni(vni)?,
        };
        let action = IngressAction::PopVxlanSetVlanId {
            mod_ptr: IGNORE_PTR,
            vlan_id: validate_vlan(lb.vlan_id)?,
            vport: egress_vsi(self.config.vxlan_default_vsi),
        };
        ops.push(TableType::PhyIngressVxlanVlan, &key, 0, &action)
    }

    pub(crate) fn nexthop_ops<'a>(
        &'a self,
        txn: &mut Txn<'a>,
        ops: &mut OpList,
        nh: &Nexthop,
    ) -> XlateResult<()> {
        let NexthopKind::Vxlan(vxlan) = &nh.kind else {
            return Ok(());
        };
        let vni = validate_vni(vxlan.vni)?;
        let rx = NeighborKey::new(nh.p4_id(Direction::Rx)?);
        let tx = NeighborKey::new(nh.p4_id(Direction::Tx)?);
        let vport = vxlan.egress_vport;
        let mod_ptr = self.pools.bind_mod_ptr(
            txn,
            ops.kind(),
            ModPtrKey::L3Nexthop(nh.key.clone()),
        )?;

        ops.push(
            TableType::OmacVxlanImacPushMod,
            &ModBlobKey::new(mod_ptr),
            0,
            &ModAction::OmacVxlanImacPush {
                smac: vxlan.phy_smac,
                dmac: vxlan.phy_dmac,
                src_ip: vxlan.local_vtep,
                dst_ip: vxlan.remote_vtep,
                dst_port: self.config.vxlan_udp_port,
                vni,
                inner_smac: vxlan.inner_smac,
                inner_dmac: vxlan.inner_dmac,
            },
        )?;
        ops.push(
            TableType::L3NexthopTx,
            &tx,
            0,
            &NexthopAction::PushOuterMacVxlanInnerMac { mod_ptr, vport },
        )?;
        ops.push(
            TableType::L3NexthopRx,
            &rx,
            0,
            &NexthopAction::SendP2pPushOuterMacVxlanInnerMac {
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
        )
    }

    pub(crate) fn l2_nexthop_ops<'a>(
        &'a self,
        txn: &mut Txn<'a>,
        ops: &mut OpList,
        nh: &L2Nexthop,
    ) -> XlateResult<()> {
        let L2NexthopKind::Vxlan(vxlan) = &nh.kind else {
            return Ok(());
        };
        let vni = validate_vni(vxlan.vni)?;
        let neighbor = NeighborKey::new(narrow16("l2 nexthop id", nh.id)?);
        let mod_ptr = self.pools.bind_mod_ptr(
            txn,
            ops.kind(),
            ModPtrKey::L2Nexthop(nh.key.clone()),
        )?;

        ops.push(
            TableType::OmacVxlanPushMod,
            &ModBlobKey::new(mod_ptr),
            0,
            &ModAction::OmacVxlanPush {
                smac: vxlan.phy_smac,
                dmac: vxlan.phy_dmac,
                src_ip: vxlan.local_vtep,
                dst_ip: vxlan.remote_vtep,
                dst_port: self.config.vxlan_udp_port,
                vni,
            },
        )?;
        ops.push(
            TableType::L2NexthopTx,
            &neighbor,
            0,
            &NexthopAction::PushOuterMacVxlan {
                mod_ptr,
                vport: egress_vsi(vxlan.egress_vport),
            },
        )
    }

    pub(crate) fn fdb_ops(
        &self,
        ops: &mut OpList,
        fdb: &FdbEntry,
    ) -> XlateResult<()> {
        match fdb.kind {
            FdbKind::Vxlan => push_fdb(ops, fdb),
            FdbKind::BridgePort => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nexthop::Directions;
    use crate::nexthop::L2NexthopKey;
    use crate::nexthop::L2VxlanNexthop;
    use crate::nexthop::NexthopKey;
    use crate::nexthop::VxlanNexthop;
    use crate::test_config;
    use aal::MatchEntryValue;
    use aal::ValueTypes;
    use common::network::MacAddr;
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    fn decoder() -> VxlanDecoder {
        let log = crate::test_logger();
        let config = Arc::new(test_config());
        let pools = Arc::new(Pools::new(&log, &config).unwrap());
        VxlanDecoder::new(&log, config, pools)
    }

    fn vrf() -> Vrf {
        Vrf {
            name: "blue".to_string(),
            vni: Some(100),
            routing_table: 5,
            vtep_ip: Some(Ipv4Addr::new(10, 10, 0, 1)),
            router_mac: Some(MacAddr::new(0, 0xaa, 0, 0, 0, 1)),
        }
    }

    fn vxlan_nexthop(id: u32) -> Nexthop {
        Nexthop {
            id,
            key: NexthopKey {
                vrf: "blue".to_string(),
                dst: Some(Ipv4Addr::new(10, 20, 0, 1)),
                dev: "vxlan-blue".to_string(),
                prefsrc: None,
                local: false,
            },
            weight: 1,
            direction: Directions::Tx,
            kind: NexthopKind::Vxlan(VxlanNexthop {
                phy_smac: MacAddr::new(0, 0x10, 0, 0, 0, 0),
                phy_dmac: MacAddr::new(0, 0xbb, 0, 0, 0, 1),
                egress_vport: 0,
                local_vtep: Ipv4Addr::new(10, 10, 0, 1),
                remote_vtep: Ipv4Addr::new(10, 20, 0, 1),
                vni: 100,
                inner_smac: MacAddr::new(0, 0xcc, 0, 0, 0, 1),
                inner_dmac: MacAddr::new(0, 0xcc, 0, 0, 0, 2),
            }),
        }
    }

    #[test]
    fn test_vrf() -> anyhow::Result<()> {
        let d = decoder();
        let ops = d.translate_vrf(&vrf(), OpKind::Add)?;
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].table, TableType::PhyIngressVxlan.name());
        let action = ops[0].action.as_ref().unwrap();
        assert_eq!(
            action.arg_by_name("tcam_prefix")?.value,
            ValueTypes::U32(50)
        );
        assert_eq!(action.arg_by_name("vrf")?.value, ValueTypes::U32(5));

        let del = d.translate_vrf(&vrf(), OpKind::Delete)?;
        assert_eq!(del.len(), 1);
        assert_eq!(del[0].key, ops[0].key);
        assert!(del[0].is_delete());
        Ok(())
    }

    #[test]
    fn test_vrf_unresolved() -> anyhow::Result<()> {
        let d = decoder();
        let pending = Vrf {
            router_mac: None,
            ..vrf()
        };
        assert!(d.translate_vrf(&pending, OpKind::Add)?.is_empty());

        let plain = Vrf {
            vni: None,
            ..vrf()
        };
        assert!(d.translate_vrf(&plain, OpKind::Add)?.is_empty());

        let wide = Vrf {
            vni: Some(1 << 24),
            ..vrf()
        };
        assert!(matches!(
            d.translate_vrf(&wide, OpKind::Add),
            Err(XlateError::InvalidConfiguration(_))
        ));
        Ok(())
    }

    #[test]
    fn test_vrf_vni_without_vtep() {
        let d = decoder();
        let no_vtep = Vrf {
            vtep_ip: None,
            ..vrf()
        };
        assert!(matches!(
            d.translate_vrf(&no_vtep, OpKind::Add),
            Err(XlateError::InvalidConfiguration(_))
        ));

        // The address is checked before the router mac is resolved
        let bare = Vrf {
            vtep_ip: None,
            router_mac: None,
            ..vrf()
        };
        assert!(matches!(
            d.translate_vrf(&bare, OpKind::Add),
            Err(XlateError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_logical_bridge() -> anyhow::Result<()> {
        let d = decoder();
        let mut lb = LogicalBridge {
            name: "lb10".to_string(),
            vlan_id: 10,
            vni: Some(1010),
            vtep_ip: Some(Ipv4Addr::new(10, 10, 0, 1)),
            svi: None,
            bridge_ports: Vec::new(),
        };
        let ops = d.translate_logical_bridge(&lb, OpKind::Add)?;
        assert_eq!(ops.len(), 1);
        let action = ops[0].action.as_ref().unwrap();
        assert_eq!(action.arg_by_name("vlan_id")?.value, ValueTypes::U16(10));
        assert_eq!(action.arg_by_name("vport")?.value, ValueTypes::U32(27));

        lb.vlan_id = 4089;
        assert!(d.translate_logical_bridge(&lb, OpKind::Add).is_err());
        lb.vni = None;
        assert!(d.translate_logical_bridge(&lb, OpKind::Add)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_nexthop() -> anyhow::Result<()> {
        let d = decoder();
        let nh = vxlan_nexthop(4);
        let ops = d.translate_nexthop(&nh, OpKind::Add)?;
        assert_eq!(ops.len(), 4);
        assert_eq!(ops[0].table, TableType::OmacVxlanImacPushMod.name());
        let action = ops[0].action.as_ref().unwrap();
        assert_eq!(
            action.arg_by_name("dst_port")?.value,
            ValueTypes::U16(4789)
        );
        let neighbor = &ops[2].key.field_by_name("neighbor")?.value;
        assert_eq!(neighbor, &MatchEntryValue::Exact(ValueTypes::U16(9)));
        assert_eq!(d.pools.mod_ptr.in_use(), 1);

        let del = d.translate_nexthop(&nh, OpKind::Delete)?;
        assert_eq!(del.len(), 4);
        assert_eq!(del[3].table, TableType::OmacVxlanImacPushMod.name());
        assert_eq!(del[3].key, ops[0].key);
        assert_eq!(d.pools.mod_ptr.in_use(), 0);
        Ok(())
    }

    #[test]
    fn test_l2_nexthop() -> anyhow::Result<()> {
        let d = decoder();
        let nh = L2Nexthop {
            id: 12,
            key: L2NexthopKey {
                dev: "vxlan-lb10".to_string(),
                vlan_id: 10,
                dst: Some(Ipv4Addr::new(10, 20, 0, 1)),
            },
            vlan_id: 10,
            kind: L2NexthopKind::Vxlan(L2VxlanNexthop {
                phy_smac: MacAddr::new(0, 0x10, 0, 0, 0, 0),
                phy_dmac: MacAddr::new(0, 0xbb, 0, 0, 0, 1),
                egress_vport: 0x10,
                local_vtep: Ipv4Addr::new(10, 10, 0, 1),
                remote_vtep: Ipv4Addr::new(10, 20, 0, 1),
                vni: 1010,
            }),
        };
        let ops = d.translate_l2_nexthop(&nh, OpKind::Add)?;
        assert_eq!(
            ops.iter().map(|op| op.table.as_str()).collect::<Vec<_>>(),
            vec![
                TableType::OmacVxlanPushMod.name(),
                TableType::L2NexthopTx.name()
            ]
        );
        let action = ops[1].action.as_ref().unwrap();
        assert_eq!(action.arg_by_name("vport")?.value, ValueTypes::U32(0x20));
        Ok(())
    }

    #[test]
    fn test_fdb() -> anyhow::Result<()> {
        let d = decoder();
        let mut fdb = FdbEntry {
            mac: MacAddr::new(0, 0xdd, 0, 0, 0, 1),
            vlan_id: 10,
            direction: Directions::Both,
            kind: FdbKind::Vxlan,
            nexthop_id: 12,
        };
        assert_eq!(d.translate_fdb(&fdb, OpKind::Add)?.len(), 2);
        fdb.direction = Directions::Rx;
        assert_eq!(d.translate_fdb(&fdb, OpKind::Add)?.len(), 1);
        fdb.kind = FdbKind::BridgePort;
        assert!(d.translate_fdb(&fdb, OpKind::Add)?.is_empty());
        Ok(())
    }
}
