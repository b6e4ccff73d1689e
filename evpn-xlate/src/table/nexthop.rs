// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use aal::ActionParse;
use aal::MatchParse;
use aal_macros::*;

/// Key shared by the L3 and L2 nexthop tables and the point-to-point ingress
/// table.
#[derive(MatchParse, Hash, Debug, Clone, PartialEq)]
pub struct NeighborKey {
    pub neighbor: u16,
    pub bit32_zeros: u32,
}

impl NeighborKey {
    pub fn new(neighbor: u16) -> Self {
        NeighborKey {
            neighbor,
            bit32_zeros: 0,
        }
    }
}

/// What to do with a packet once its neighbor is known.  Most actions chain
/// a rewrite template through its modification pointer.
#[derive(ActionParse, Debug, Clone, Copy, PartialEq)]
pub enum NexthopAction {
    #[action_xlate(name = "evpn_gw_control.push_mac")]
    PushMac { mod_ptr: u32, vport: u32 },
    #[action_xlate(name = "evpn_gw_control.send_p2p_push_mac")]
    SendP2pPushMac { mod_ptr: u32, vport: u32, q_id: u16 },
    #[action_xlate(name = "evpn_gw_control.fwd_to_port")]
    FwdToPort { port: u32 },
    #[action_xlate(name = "evpn_gw_control.push_dmac_vlan")]
    PushDmacVlan { mod_ptr: u32, vport: u32 },
    #[action_xlate(name = "evpn_gw_control.push_mac_vlan")]
    PushMacVlan { mod_ptr: u32, vport: u32 },
    #[action_xlate(name = "evpn_gw_control.push_outermac_vxlan_innermac")]
    PushOuterMacVxlanInnerMac { mod_ptr: u32, vport: u32 },
    #[action_xlate(
        name = "evpn_gw_control.send_p2p_push_outermac_vxlan_innermac"
    )]
    SendP2pPushOuterMacVxlanInnerMac { mod_ptr: u32, vport: u32, q_id: u16 },
    #[action_xlate(name = "evpn_gw_control.push_outermac_vxlan")]
    PushOuterMacVxlan { mod_ptr: u32, vport: u32 },
    #[action_xlate(name = "evpn_gw_control.set_crypto_ip")]
    SetCryptoIp { mod_ptr: u32, sa_idx: u32, vport: u32 },
    #[action_xlate(name = "evpn_gw_control.send_p2p")]
    SendP2p { vport: u32, q_id: u32 },
    #[action_xlate(name = "evpn_gw_control.push_crypto_outermac_vxlan_innermac")]
    PushCryptoOuterMacVxlanInnerMac {
        mod_ptr: u32,
        vport: u32,
        sa_idx: u32,
    },
    #[action_xlate(name = "evpn_gw_control.push_vlan_l2")]
    PushVlanL2 { mod_ptr: u32, vport: u32 },
    #[action_xlate(name = "evpn_gw_control.push_stag_ctag")]
    PushStagCtag { mod_ptr: u32, vport: u32 },
}

/// Queue used for point-to-point traffic.  Every port currently shares
/// queue 0.
pub const P2P_QID: u16 = 0;
