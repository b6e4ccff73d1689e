// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Ingress classification: the physical, vport and mux ingress tables, L2
//! forwarding, and the fdb.

use std::net::Ipv4Addr;

use aal::ActionParse;
use aal::MatchParse;
use aal_macros::*;
use common::network::validate_vlan;
use common::network::MacAddr;

use crate::nexthop::FdbEntry;
use crate::table::OpList;
use crate::table::TableType;
use crate::types::narrow16;
use crate::types::XlateResult;

// tagged_vport_ingress_table, tagged_vport_arp_ingress_table and
// port_mux_ingress_table
#[derive(MatchParse, Hash, Debug, Clone, PartialEq)]
pub struct VsiVidKey {
    pub vsi: u16,
    pub vid: u16,
}

// vport_svi_ingress_table
#[derive(MatchParse, Hash, Debug, Clone, PartialEq)]
pub struct VsiDaKey {
    pub vsi: u16,
    pub da: MacAddr,
}

// tagged_vport_svi_ingress_table
#[derive(MatchParse, Hash, Debug, Clone, PartialEq)]
pub struct VsiVidDaKey {
    pub vsi: u16,
    pub vid: u16,
    pub da: MacAddr,
}

// vport_ingress_table and vport_arp_ingress_table
#[derive(MatchParse, Hash, Debug, Clone, PartialEq)]
pub struct VsiKey {
    pub vsi: u16,
    pub bit32_zeros: u32,
}

impl VsiKey {
    pub fn new(vsi: u16) -> Self {
        VsiKey {
            vsi,
            bit32_zeros: 0,
        }
    }
}

// l2_fwd_rx_table
#[derive(MatchParse, Hash, Debug, Clone, PartialEq)]
pub struct DaKey {
    pub da: MacAddr,
}

// phy_ingress_ip_table
#[derive(MatchParse, Hash, Debug, Clone, PartialEq)]
pub struct PortDaKey {
    pub port_id: u16,
    pub da: MacAddr,
}

// phy_ingress_arp_table
#[derive(MatchParse, Hash, Debug, Clone, PartialEq)]
pub struct PortKey {
    pub port_id: u16,
    pub bit32_zeros: u32,
}

// phy_ingress_vxlan_table
#[derive(MatchParse, Hash, Debug, Clone, PartialEq)]
pub struct VxlanKey {
    pub dst_ip: Ipv4Addr,
    pub vni: u32,
    pub da: MacAddr,
}

// phy_ingress_vxlan_vlan_table
#[derive(MatchParse, Hash, Debug, Clone, PartialEq)]
pub struct VxlanVlanKey {
    pub dst_ip: Ipv4Addr,
    pub vni: u32,
}

// port_mux_fwd_table
#[derive(MatchParse, Hash, Debug, Clone, PartialEq)]
pub struct ZerosKey {
    pub bit32_zeros: u32,
}

#[derive(ActionParse, Debug, Clone, Copy, PartialEq)]
pub enum IngressAction {
    #[action_xlate(name = "evpn_gw_control.pop_vxlan_set_vrf_id")]
    PopVxlanSetVrfId {
        mod_ptr: u32,
        tcam_prefix: u32,
        vrf: u32,
    },
    #[action_xlate(name = "evpn_gw_control.pop_vxlan_set_vlan_id")]
    PopVxlanSetVlanId {
        mod_ptr: u32,
        vlan_id: u16,
        vport: u32,
    },
    #[action_xlate(name = "evpn_gw_control.pop_stag_vlan")]
    PopStagVlan { mod_ptr: u32, vport: u32 },
    #[action_xlate(name = "evpn_gw_control.pop_ctag_stag_vlan")]
    PopCtagStagVlan { mod_ptr: u32, vport: u32 },
    #[action_xlate(name = "evpn_gw_control.l2_fwd")]
    L2Fwd { vport: u32 },
    #[action_xlate(name = "evpn_gw_control.send_to_port_mux_trunk")]
    SendToPortMuxTrunk { mod_ptr: u32, vport: u32 },
    #[action_xlate(name = "evpn_gw_control.send_to_port_mux_access")]
    SendToPortMuxAccess { mod_ptr: u32, vport: u32 },
    #[action_xlate(name = "evpn_gw_control.send_to_port_mux")]
    SendToPortMux { vport: u32 },
    #[action_xlate(name = "evpn_gw_control.set_vlan_and_pop_vlan")]
    SetVlanAndPopVlan {
        mod_ptr: u32,
        vlan_id: u16,
        bit32_zeros: u32,
    },
    #[action_xlate(name = "evpn_gw_control.set_vlan")]
    SetVlan { vlan_id: u16, bit32_zeros: u32 },
    #[action_xlate(name = "evpn_gw_control.pop_vlan_set_vrf_id")]
    PopVlanSetVrfId {
        mod_ptr: u32,
        tcam_prefix: u32,
        vrf: u16,
    },
    #[action_xlate(name = "evpn_gw_control.set_vrf_id_tx")]
    SetVrfIdTx {
        tcam_prefix: u32,
        vport: u32,
        vrf: u16,
    },
    // The GRD's VLAN on the VRF mux
    #[action_xlate(name = "evpn_gw_control.pop_vlan_set_vrfid")]
    PopVlanSetGrdVrf {
        mod_ptr: u32,
        tcam_prefix: u32,
        vrf: u32,
    },
    #[action_xlate(name = "evpn_gw_control.set_vrf_id")]
    SetVrfId {
        tcam_prefix: u32,
        vport: u32,
        vrf: u32,
    },
    #[action_xlate(name = "evpn_gw_control.fwd_to_port")]
    FwdToPort { port: u32 },
}

// l2_dmac_table
#[derive(MatchParse, Hash, Debug, Clone, PartialEq)]
pub struct L2DmacKey {
    pub vlan_id: u16,
    pub da: MacAddr,
    pub direction: u16,
}

#[derive(ActionParse, Debug, Clone, Copy, PartialEq)]
pub enum FdbAction {
    #[action_xlate(name = "evpn_gw_control.set_neighbor")]
    SetNeighbor { neighbor: u16 },
}

/// Push one l2_dmac_table entry for each direction an fdb entry covers
pub(crate) fn push_fdb(ops: &mut OpList, fdb: &FdbEntry) -> XlateResult<()> {
    let vlan_id = validate_vlan(fdb.vlan_id)?;
    let action = FdbAction::SetNeighbor {
        neighbor: narrow16("nexthop id", fdb.nexthop_id)?,
    };
    for dir in fdb.direction.list() {
        let key = L2DmacKey {
            vlan_id,
            da: fdb.mac,
            direction: dir.code(),
        };
        ops.push(TableType::L2Dmac, &key, 0, &action)?;
    }
    Ok(())
}
