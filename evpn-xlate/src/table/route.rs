// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Route lookup: host routes, LPM routes, the TCAM redirects that select an
//! LPM root, and ECMP member selection.

use std::net::Ipv4Addr;

use aal::ActionParse;
use aal::MatchParse;
use aal_macros::*;
use oxnet::Ipv4Net;

// Host routes in l3_lem_table and l3_p2p_lem_table
#[derive(MatchParse, Hash, Debug, Clone, PartialEq)]
pub struct LemKey {
    pub vrf: u16,
    pub direction: u16,
    pub dst_ip: Ipv4Addr,
}

// Network routes in l3_routing_table
#[derive(MatchParse, Hash, Debug, Clone, PartialEq)]
pub struct LpmKey {
    pub ipv4_table_lpm_root1: u32,
    #[match_xlate(type = "lpm")]
    pub dst_ip: Ipv4Net,
}

// Network routes in l3_p2p_routing_table
#[derive(MatchParse, Hash, Debug, Clone, PartialEq)]
pub struct P2pLpmKey {
    pub ipv4_table_lpm_root2: u32,
    #[match_xlate(type = "lpm")]
    pub dst_ip: Ipv4Net,
}

#[derive(ActionParse, Debug, Clone, Copy, PartialEq)]
pub enum RouteAction {
    #[action_xlate(name = "evpn_gw_control.set_neighbor")]
    SetNeighbor { neighbor: u16, ecmp_on: u16 },
    #[action_xlate(name = "evpn_gw_control.set_p2p_neighbor")]
    SetP2pNeighbor { neighbor: u16, ecmp_on: u16 },
}

// TCAM redirect keyed by the (vrf, direction) composite
#[derive(MatchParse, Hash, Debug, Clone, PartialEq)]
pub struct RedirectKey {
    #[match_xlate(name = "user_meta.cmeta.tcam_prefix", type = "ternary")]
    pub tcam_prefix: u32,
}

#[derive(ActionParse, Debug, Clone, Copy, PartialEq)]
pub enum RedirectAction {
    #[action_xlate(name = "evpn_gw_control.ecmp_lpm_root_lut1_action")]
    Lut1 { tidx: u32 },
    #[action_xlate(name = "evpn_gw_control.ecmp_lpm_root_lut2_action")]
    Lut2 { tidx: u32 },
}

// One hash slot of an ECMP group
#[derive(MatchParse, Hash, Debug, Clone, PartialEq)]
pub struct EcmpSelectionKey {
    pub neighbor: u16,
    pub hash: u16,
    pub bit32_zeros: u32,
}

#[derive(ActionParse, Debug, Clone, Copy, PartialEq)]
pub enum EcmpSelectionAction {
    #[action_xlate(name = "evpn_gw_control.set_neighbor_withoutrec")]
    SetNeighbor { neighbor: u16 },
}
