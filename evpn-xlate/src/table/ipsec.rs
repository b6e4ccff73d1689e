// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Decrypt classification, the inline crypto engine's SA database, and the
//! ingress tables that see traffic after decryption.

use std::net::Ipv4Addr;

use aal::ActionParse;
use aal::MatchParse;
use aal_macros::*;
use common::network::MacAddr;

/// Value of meta.common.crypto_status for successfully decrypted traffic
pub const CRYPTO_OK: u32 = 0;

/// Values of the SA database's direction field
pub const SAD_INBOUND: u32 = 1;
pub const SAD_OUTBOUND: u32 = 0;

#[derive(MatchParse, Hash, Debug, Clone, PartialEq)]
pub struct SaClassificationKey {
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    #[match_xlate(name = "hdrs.esp.spi")]
    pub spi: u32,
}

#[derive(ActionParse, Debug, Clone, Copy, PartialEq)]
pub enum SaClassificationAction {
    #[action_xlate(name = "CXPControl.ipsec_decrypt")]
    Decrypt { sa_idx: u32 },
}

// The SA database entry.  It is only ever removed through the table
// protocol; entries are installed with the SaConfig descriptor.
#[derive(MatchParse, Hash, Debug, Clone, PartialEq)]
pub struct SadKey {
    pub offload_id: u32,
    pub direction: u32,
}

// phy_ingress_ip_ip_table
#[derive(MatchParse, Hash, Debug, Clone, PartialEq)]
pub struct DecryptedKey {
    #[match_xlate(name = "meta.common.crypto_status")]
    pub crypto_status: u32,
    #[match_xlate(name = "meta.common.saidx")]
    pub sa_idx: u32,
}

// phy_ingress_ip_vxlan_table
#[derive(MatchParse, Hash, Debug, Clone, PartialEq)]
pub struct DecryptedVxlanKey {
    #[match_xlate(name = "meta.common.crypto_status")]
    pub crypto_status: u32,
    pub dst_ip: Ipv4Addr,
    pub vni: u32,
    pub da: MacAddr,
}

#[derive(ActionParse, Debug, Clone, Copy, PartialEq)]
pub enum DecryptedAction {
    #[action_xlate(name = "evpn_gw_control.pop_outer_ip_set_vrf_id")]
    PopOuterIpSetVrfId {
        mod_ptr: u32,
        tcam_prefix: u32,
        vrf: u32,
    },
    #[action_xlate(name = "evpn_gw_control.pop_omac_ip_vxlan_set_vrf_id")]
    PopOmacIpVxlanSetVrfId {
        mod_ptr: u32,
        tcam_prefix: u32,
        vrf: u32,
    },
}

#[derive(ActionParse, Debug, Clone, Copy, PartialEq)]
pub enum TunnelAction {
    #[action_xlate(name = "evpn_gw_control.pop_vlan_push_outer_mac_ip")]
    PopVlanPushOuterMacIp {
        mod_ptr: u32,
        port_id: u32,
        sa_idx: u32,
    },
}
