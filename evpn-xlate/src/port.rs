// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Tenant bridge ports.
//!
//! Traffic between a bridge port and the tenant bridge on the host crosses
//! the port mux.  Frames headed up to the host are tagged with the port's
//! VSI in an S-tag (and, for access ports, the bridge's VLAN in a C-tag) so
//! the host can tell which representor they belong to; frames coming back
//! down have those tags popped.  Each port owns a pop template, keyed by its
//! MAC, and push templates: one for an access port, one per carried VLAN for
//! a trunk port.

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
use crate::nexthop::PortType;
use crate::objects::BridgePort;
use crate::objects::Svi;
use crate::objects::Vrf;
use crate::pools::ModPtrKey;
use crate::pools::Pools;
use crate::store::ObjectStore;
use crate::table::egress_vsi;
use crate::table::ingress::push_fdb;
use crate::table::ingress::DaKey;
use crate::table::ingress::IngressAction;
use crate::table::ingress::VsiDaKey;
use crate::table::ingress::VsiKey;
use crate::table::ingress::VsiVidDaKey;
use crate::table::ingress::VsiVidKey;
use crate::table::ingress::ZerosKey;
use crate::table::nexthop::NeighborKey;
use crate::table::nexthop::NexthopAction;
use crate::table::rewrite::ModAction;
use crate::table::rewrite::ModBlobKey;
use crate::table::tcam_prefix;
use crate::table::OpList;
use crate::table::TableType;
use crate::table::FLOOD_NEIGHBOR;
use crate::table::FLOOD_PTR;
use crate::table::IGNORE_PTR;
use crate::txn::atomically;
use crate::txn::Txn;
use crate::types::narrow16;
use crate::types::XlateError;
use crate::types::XlateResult;

// Treat a missing object as "not created yet".  Bridge ports and SVIs may
// arrive in either order; whichever comes second programs the entries
// joining them.
fn present<T>(result: XlateResult<T>) -> XlateResult<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(XlateError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

pub struct PortDecoder {
    log: slog::Logger,
    config: Arc<Config>,
    pools: Arc<Pools>,
}

impl PortDecoder {
    pub fn new(
        log: &slog::Logger,
        config: Arc<Config>,
        pools: Arc<Pools>,
    ) -> Self {
        PortDecoder {
            log: log.new(slog::o!("unit" => "port")),
            config,
            pools,
        }
    }

    pub fn translate_bridge_port(
        &self,
        store: &dyn ObjectStore,
        bp: &BridgePort,
        kind: OpKind,
    ) -> XlateResult<Vec<TableOperation>> {
        let what = format!("bridge port {}", bp.name);
        atomically(&self.log, kind, &what, |txn, ops| {
            self.bridge_port_ops(txn, ops, store, bp)
        })
    }

    pub fn translate_svi(
        &self,
        store: &dyn ObjectStore,
        svi: &Svi,
        kind: OpKind,
    ) -> XlateResult<Vec<TableOperation>> {
        let what = format!("svi {}", svi.name);
        atomically(&self.log, kind, &what, |_, ops| {
            self.svi_ops(ops, store, svi)
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

    /// The mux wiring and flood path, programmed once
    pub fn static_entries(
        &self,
        kind: OpKind,
    ) -> XlateResult<Vec<TableOperation>> {
        atomically(&self.log, kind, &"port statics", |_, ops| {
            self.static_ops(ops)
        })
    }

    pub(crate) fn bridge_port_ops<'a>(
        &'a self,
        txn: &mut Txn<'a>,
        ops: &mut OpList,
        store: &dyn ObjectStore,
        bp: &BridgePort,
    ) -> XlateResult<()> {
        match bp.port_type {
            PortType::Access => self.access_port_ops(txn, ops, store, bp),
            PortType::Trunk => self.trunk_port_ops(txn, ops, store, bp),
        }
    }

    fn access_port_ops<'a>(
        &'a self,
        txn: &mut Txn<'a>,
        ops: &mut OpList,
        store: &dyn ObjectStore,
        bp: &BridgePort,
    ) -> XlateResult<()> {
        let [lb_name] = bp.logical_bridges.as_slice() else {
            return Err(XlateError::InvalidConfiguration(format!(
                "access port {} must belong to exactly one logical bridge",
                bp.name
            )));
        };
        let lb = store.logical_bridge(lb_name)?;
        let vid = validate_vlan(lb.vlan_id)?;
        let kind = ops.kind();
        let port_mux = self.config.representors.port_mux;
        let vport = egress_vsi(bp.vsi);

        // Traffic from the host
        let pop_ptr =
            self.pools.bind_mod_ptr(txn, kind, ModPtrKey::PortPop(bp.mac))?;
        ops.push(
            TableType::VlanCtagStagPopMod,
            &ModBlobKey::new(pop_ptr),
            0,
            &ModAction::VlanCtagStagPop { dmac: bp.mac },
        )?;
        ops.push(
            TableType::PortMuxIngress,
            &VsiVidKey {
                vsi: port_mux.vsi,
                vid: bp.vsi,
            },
            0,
            &IngressAction::PopCtagStagVlan {
                mod_ptr: pop_ptr,
                vport,
            },
        )?;
        ops.push(
            TableType::L2FwdRx,
            &DaKey { da: bp.mac },
            0,
            &IngressAction::L2Fwd { vport },
        )?;

        // Traffic to the host
        let push_ptr = self.pools.bind_mod_ptr(
            txn,
            kind,
            ModPtrKey::PortPush { vsi: bp.vsi },
        )?;
        ops.push(
            TableType::VlanEncapCtagStagMod,
            &ModBlobKey::new(push_ptr),
            0,
            &ModAction::VlanPushAccess {
                pcp: 0,
                dei: 0,
                vlan_id: vid,
                s_pcp: 0,
                s_dei: 0,
                s_vlan_id: bp.vsi,
            },
        )?;
        ops.push(
            TableType::VportArpIngress,
            &VsiKey::new(bp.vsi),
            0,
            &IngressAction::SendToPortMuxAccess {
                mod_ptr: push_ptr,
                vport: egress_vsi(port_mux.vsi),
            },
        )?;
        ops.push(
            TableType::VportIngress,
            &VsiKey::new(bp.vsi),
            0,
            &IngressAction::SetVlan {
                vlan_id: vid,
                bit32_zeros: 0,
            },
        )?;

        if let Some(name) = &lb.svi {
            if let Some(svi) = present(store.svi(name))? {
                let vrf = store.vrf(&svi.vrf)?;
                self.svi_entry(ops, bp, vid, &svi, &vrf)?;
            }
        }
        Ok(())
    }

    fn trunk_port_ops<'a>(
        &'a self,
        txn: &mut Txn<'a>,
        ops: &mut OpList,
        store: &dyn ObjectStore,
        bp: &BridgePort,
    ) -> XlateResult<()> {
        let kind = ops.kind();
        let port_mux = self.config.representors.port_mux;
        let vport = egress_vsi(bp.vsi);

        let pop_ptr =
            self.pools.bind_mod_ptr(txn, kind, ModPtrKey::PortPop(bp.mac))?;
        ops.push(
            TableType::VlanStagPopMod,
            &ModBlobKey::new(pop_ptr),
            0,
            &ModAction::VlanStagPop { dmac: bp.mac },
        )?;
        ops.push(
            TableType::PortMuxIngress,
            &VsiVidKey {
                vsi: port_mux.vsi,
                vid: bp.vsi,
            },
            0,
            &IngressAction::PopStagVlan {
                mod_ptr: pop_ptr,
                vport,
            },
        )?;
        ops.push(
            TableType::L2FwdRx,
            &DaKey { da: bp.mac },
            0,
            &IngressAction::L2Fwd { vport },
        )?;

        for name in &bp.logical_bridges {
            let lb = store.logical_bridge(name)?;
            let vid = validate_vlan(lb.vlan_id)?;
            let push_ptr = self.pools.bind_mod_ptr(
                txn,
                kind,
                ModPtrKey::TrunkPush {
                    vsi: bp.vsi,
                    vlan: vid,
                },
            )?;
            ops.push(
                TableType::VlanEncapStagMod,
                &ModBlobKey::new(push_ptr),
                0,
                &ModAction::VlanPushTrunk {
                    pcp: 0,
                    dei: 0,
                    vlan_id: u32::from(bp.vsi),
                },
            )?;
            let key = VsiVidKey {
                vsi: bp.vsi,
                vid,
            };
            ops.push(
                TableType::TaggedVportArpIngress,
                &key,
                0,
                &IngressAction::SendToPortMuxTrunk {
                    mod_ptr: push_ptr,
                    vport: egress_vsi(port_mux.vsi),
                },
            )?;
            ops.push(
                TableType::TaggedVportIngress,
                &key,
                0,
                &IngressAction::SetVlanAndPopVlan {
                    mod_ptr: IGNORE_PTR,
                    vlan_id: vid,
                    bit32_zeros: 0,
                },
            )?;

            if let Some(name) = &lb.svi {
                if let Some(svi) = present(store.svi(name))? {
                    let vrf = store.vrf(&svi.vrf)?;
                    self.svi_entry(ops, bp, vid, &svi, &vrf)?;
                }
            }
        }
        Ok(())
    }

    // Hand traffic for the SVI's MAC arriving on the port to the SVI's VRF
    fn svi_entry(
        &self,
        ops: &mut OpList,
        bp: &BridgePort,
        vid: u16,
        svi: &Svi,
        vrf: &Vrf,
    ) -> XlateResult<()> {
        let tcam_prefix = tcam_prefix(vrf.vrf_id(), Direction::Tx)?;
        let vrf_id = narrow16("vrf id", vrf.vrf_id())?;
        match bp.port_type {
            PortType::Access => ops.push(
                TableType::VportSviIngress,
                &VsiDaKey {
                    vsi: bp.vsi,
                    da: svi.mac,
                },
                0,
                &IngressAction::SetVrfIdTx {
                    tcam_prefix,
                    vport: 0,
                    vrf: vrf_id,
                },
            ),
            PortType::Trunk => ops.push(
                TableType::TaggedVportSviIngress,
                &VsiVidDaKey {
                    vsi: bp.vsi,
                    vid,
                    da: svi.mac,
                },
                0,
                &IngressAction::PopVlanSetVrfId {
                    mod_ptr: IGNORE_PTR,
                    tcam_prefix,
                    vrf: vrf_id,
                },
            ),
        }
    }

    /// The SVI entry of every existing bridge port on the SVI's bridge
    pub(crate) fn svi_ops(
        &self,
        ops: &mut OpList,
        store: &dyn ObjectStore,
        svi: &Svi,
    ) -> XlateResult<()> {
        let lb = store.logical_bridge(&svi.logical_bridge)?;
        let vid = validate_vlan(lb.vlan_id)?;
        let vrf = store.vrf(&svi.vrf)?;
        for name in &lb.bridge_ports {
            if let Some(bp) = present(store.bridge_port(name))? {
                self.svi_entry(ops, &bp, vid, svi, &vrf)?;
            }
        }
        Ok(())
    }

    pub(crate) fn l2_nexthop_ops<'a>(
        &'a self,
        txn: &mut Txn<'a>,
        ops: &mut OpList,
        nh: &L2Nexthop,
    ) -> XlateResult<()> {
        let L2NexthopKind::BridgePort(port) = &nh.kind else {
            return Ok(());
        };
        let neighbor = NeighborKey::new(narrow16("l2 nexthop id", nh.id)?);
        let vport = egress_vsi(port.vsi);

        let action = match port.port_type {
            PortType::Access => NexthopAction::FwdToPort { port: vport },
            PortType::Trunk => {
                let mod_ptr = self.pools.bind_mod_ptr(
                    txn,
                    ops.kind(),
                    ModPtrKey::L2Nexthop(nh.key.clone()),
                )?;
                ops.push(
                    TableType::VlanPushMod,
                    &ModBlobKey::new(mod_ptr),
                    0,
                    &ModAction::VlanPush {
                        pcp: 0,
                        dei: 0,
                        vlan_id: validate_vlan(nh.vlan_id)?,
                    },
                )?;
                NexthopAction::PushVlanL2 { mod_ptr, vport }
            }
        };
        ops.push(TableType::L2NexthopRx, &neighbor, 0, &action)?;
        ops.push(TableType::L2NexthopTx, &neighbor, 0, &action)
    }

    pub(crate) fn fdb_ops(
        &self,
        ops: &mut OpList,
        fdb: &FdbEntry,
    ) -> XlateResult<()> {
        match fdb.kind {
            FdbKind::BridgePort => push_fdb(ops, fdb),
            FdbKind::Vxlan => Ok(()),
        }
    }

    pub(crate) fn static_ops(&self, ops: &mut OpList) -> XlateResult<()> {
        let reps = &self.config.representors;
        let port_mux = egress_vsi(reps.port_mux.vsi);

        ops.push(
            TableType::PortMuxFwd,
            &ZerosKey { bit32_zeros: 0 },
            0,
            &IngressAction::SendToPortMux { vport: port_mux },
        )?;
        for mux in [reps.port_mux, reps.vrf_mux] {
            ops.push(
                TableType::L2FwdRx,
                &DaKey { da: mux.mac },
                0,
                &IngressAction::L2Fwd {
                    vport: egress_vsi(mux.vsi),
                },
            )?;
        }

        // Unknown unicast and broadcast go up to the host bridge, tagged
        // with the ingress VSI and VLAN
        ops.push(
            TableType::VlanEncapCtagStagFloodMod,
            &ModBlobKey::new(FLOOD_PTR),
            0,
            &ModAction::VlanPushStagCtagFlood { vlan_id: 0 },
        )?;
        ops.push(
            TableType::L2NexthopTx,
            &NeighborKey::new(FLOOD_NEIGHBOR),
            0,
            &NexthopAction::PushStagCtag {
                mod_ptr: FLOOD_PTR,
                vport: port_mux,
            },
        )
    }
}
