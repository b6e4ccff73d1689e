// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Packet-modification templates.  Each template lives in a table keyed by
//! a modification pointer, and is applied by any entry whose action carries
//! that pointer.

use std::net::Ipv4Addr;

use aal::ActionParse;
use aal::MatchParse;
use aal_macros::*;
use common::network::MacAddr;

#[derive(MatchParse, Hash, Debug, Clone, PartialEq)]
pub struct ModBlobKey {
    #[match_xlate(name = "meta.common.mod_blob_ptr")]
    pub mod_ptr: u32,
}

impl ModBlobKey {
    pub fn new(mod_ptr: u32) -> Self {
        ModBlobKey { mod_ptr }
    }
}

#[derive(ActionParse, Debug, Clone, Copy, PartialEq)]
pub enum ModAction {
    #[action_xlate(name = "evpn_gw_control.update_smac_dmac")]
    UpdateSmacDmac { smac: MacAddr, dmac: MacAddr },
    #[action_xlate(name = "evpn_gw_control.update_smac_dmac_vlan")]
    UpdateSmacDmacVlan {
        smac: MacAddr,
        dmac: MacAddr,
        pcp: u16,
        dei: u16,
        vlan_id: u16,
    },
    #[action_xlate(name = "evpn_gw_control.dmac_vlan_push")]
    DmacVlanPush {
        pcp: u16,
        dei: u16,
        vlan_id: u16,
        dmac: MacAddr,
    },
    #[action_xlate(name = "evpn_gw_control.omac_vxlan_imac_push")]
    OmacVxlanImacPush {
        smac: MacAddr,
        dmac: MacAddr,
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
        dst_port: u16,
        vni: u32,
        inner_smac: MacAddr,
        inner_dmac: MacAddr,
    },
    #[action_xlate(name = "evpn_gw_control.omac_vxlan_push")]
    OmacVxlanPush {
        smac: MacAddr,
        dmac: MacAddr,
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
        dst_port: u16,
        vni: u32,
    },
    #[action_xlate(name = "evpn_gw_control.vlan_push")]
    VlanPush { pcp: u16, dei: u16, vlan_id: u16 },
    // C-tag carrying the tenant VLAN, S-tag carrying the port's VSI
    #[action_xlate(name = "evpn_gw_control.vlan_push_access")]
    VlanPushAccess {
        pcp: u16,
        dei: u16,
        vlan_id: u16,
        s_pcp: u16,
        s_dei: u16,
        s_vlan_id: u16,
    },
    #[action_xlate(name = "evpn_gw_control.vlan_push_trunk")]
    VlanPushTrunk { pcp: u16, dei: u16, vlan_id: u32 },
    #[action_xlate(name = "evpn_gw_control.vlan_ctag_stag_pop")]
    VlanCtagStagPop { dmac: MacAddr },
    #[action_xlate(name = "evpn_gw_control.vlan_stag_pop")]
    VlanStagPop { dmac: MacAddr },
    #[action_xlate(name = "evpn_gw_control.vlan_push_stag_ctag_flood")]
    VlanPushStagCtagFlood { vlan_id: u32 },
    #[action_xlate(name = "evpn_gw_control.pop_vlan_push_outer_mac_ip_mod")]
    PopVlanPushOuterMacIp {
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
        smac: MacAddr,
        dmac: MacAddr,
    },
    #[action_xlate(name = "evpn_gw_control.omac_crypto_vxlan_imac_push")]
    OmacCryptoVxlanImacPush {
        smac: MacAddr,
        dmac: MacAddr,
        local_tep: Ipv4Addr,
        remote_tep: Ipv4Addr,
        local_vtep: Ipv4Addr,
        remote_vtep: Ipv4Addr,
        dst_port: u16,
        vni: u32,
        inner_smac: MacAddr,
        inner_dmac: MacAddr,
    },
    #[action_xlate(name = "evpn_gw_control.crypto_tunnel_ip_mod")]
    CryptoTunnelIp {
        smac: MacAddr,
        dmac: MacAddr,
        local_tep: Ipv4Addr,
        remote_tep: Ipv4Addr,
    },
}
