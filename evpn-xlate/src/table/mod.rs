// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The pipeline tables programmed by the decoders, along with the key and
//! action types describing each table's entries.

use std::convert::TryFrom;
use std::fmt;

use aal::ActionParse;
use aal::MatchParse;
use aal::OpKind;
use aal::TableOperation;
use serde::Serialize;
use strum::IntoEnumIterator;

use crate::nexthop::Direction;
use crate::types::XlateError;
use crate::types::XlateResult;

pub mod ingress;
pub mod ipsec;
pub mod nexthop;
pub mod rewrite;
pub mod route;

/// Modification pointer meaning "no rewrite"
pub const IGNORE_PTR: u32 = 0;
/// Modification pointer of the flood template
pub const FLOOD_PTR: u32 = 1;
/// Neighbor id of the flood nexthop
pub const FLOOD_NEIGHBOR: u16 = 1;
/// TCAM composite key of the point-to-point bypass path
pub const P2P_TCAM: u32 = 0x7865_4312;
/// TCAM composite key set on traffic entering the global routing domain
pub const GRD_TCAM: u32 = 0;

/// Every pipeline table the decoders program
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    strum::EnumIter,
)]
pub enum TableType {
    L3Routing,
    L3Lem,
    L3P2pRouting,
    L3P2pLem,
    L3NexthopRx,
    L3NexthopTx,
    EcmpSelection,
    IngressP2p,
    EcmpLpmRootLut1,
    EcmpLpmRootLut2,
    PhyIngressIp,
    PhyIngressArp,
    PhyIngressVxlan,
    PhyIngressVxlanVlan,
    PhyIngressIpIp,
    PhyIngressIpVxlan,
    VportArpIngress,
    TaggedVportArpIngress,
    VportIngress,
    TaggedVportIngress,
    VportSviIngress,
    TaggedVportSviIngress,
    PortMuxIngress,
    PortMuxFwd,
    L2FwdRx,
    L2Dmac,
    L2NexthopRx,
    L2NexthopTx,
    VlanPushMod,
    MacVlanPushMod,
    DmacVlanPushMod,
    MacMod,
    OmacVxlanImacPushMod,
    OmacVxlanPushMod,
    VlanEncapCtagStagMod,
    VlanEncapStagMod,
    VlanCtagStagPopMod,
    VlanStagPopMod,
    VlanEncapCtagStagFloodMod,
    PopVlanPushOuterMacIpMod,
    OmacCryptoVxlanImacPushMod,
    CryptoTunnelIpMod,
    IpsecRxSaClassification,
    IpsecSaConfig,
}

impl TableType {
    /// The table's fully qualified pipeline name
    pub fn name(&self) -> &'static str {
        match self {
            TableType::L3Routing => "evpn_gw_control.l3_routing_table",
            TableType::L3Lem => "evpn_gw_control.l3_lem_table",
            TableType::L3P2pRouting => "evpn_gw_control.l3_p2p_routing_table",
            TableType::L3P2pLem => "evpn_gw_control.l3_p2p_lem_table",
            TableType::L3NexthopRx => "evpn_gw_control.l3_nexthop_table_rx",
            TableType::L3NexthopTx => "evpn_gw_control.l3_nexthop_table_tx",
            TableType::EcmpSelection => "evpn_gw_control.ecmp_selection_table",
            TableType::IngressP2p => "evpn_gw_control.ingress_p2p_table",
            TableType::EcmpLpmRootLut1 => "evpn_gw_control.ecmp_lpm_root_lut1",
            TableType::EcmpLpmRootLut2 => "evpn_gw_control.ecmp_lpm_root_lut2",
            TableType::PhyIngressIp => "evpn_gw_control.phy_ingress_ip_table",
            TableType::PhyIngressArp => "evpn_gw_control.phy_ingress_arp_table",
            TableType::PhyIngressVxlan => {
                "evpn_gw_control.phy_ingress_vxlan_table"
            }
            TableType::PhyIngressVxlanVlan => {
                "evpn_gw_control.phy_ingress_vxlan_vlan_table"
            }
            TableType::PhyIngressIpIp => {
                "evpn_gw_control.phy_ingress_ip_ip_table"
            }
            TableType::PhyIngressIpVxlan => {
                "evpn_gw_control.phy_ingress_ip_vxlan_table"
            }
            TableType::VportArpIngress => {
                "evpn_gw_control.vport_arp_ingress_table"
            }
            TableType::TaggedVportArpIngress => {
                "evpn_gw_control.tagged_vport_arp_ingress_table"
            }
            TableType::VportIngress => "evpn_gw_control.vport_ingress_table",
            TableType::TaggedVportIngress => {
                "evpn_gw_control.tagged_vport_ingress_table"
            }
            TableType::VportSviIngress => {
                "evpn_gw_control.vport_svi_ingress_table"
            }
            TableType::TaggedVportSviIngress => {
                "evpn_gw_control.tagged_vport_svi_ingress_table"
            }
            TableType::PortMuxIngress => {
                "evpn_gw_control.port_mux_ingress_table"
            }
            TableType::PortMuxFwd => "evpn_gw_control.port_mux_fwd_table",
            TableType::L2FwdRx => "evpn_gw_control.l2_fwd_rx_table",
            TableType::L2Dmac => "evpn_gw_control.l2_dmac_table",
            TableType::L2NexthopRx => "evpn_gw_control.l2_nexthop_table_rx",
            TableType::L2NexthopTx => "evpn_gw_control.l2_nexthop_table_tx",
            TableType::VlanPushMod => "evpn_gw_control.vlan_push_mod_table",
            TableType::MacVlanPushMod => {
                "evpn_gw_control.mac_vlan_push_mod_table"
            }
            TableType::DmacVlanPushMod => {
                "evpn_gw_control.dmac_vlan_push_mod_table"
            }
            TableType::MacMod => "evpn_gw_control.mac_mod_table",
            TableType::OmacVxlanImacPushMod => {
                "evpn_gw_control.omac_vxlan_imac_push_mod_table"
            }
            TableType::OmacVxlanPushMod => {
                "evpn_gw_control.omac_vxlan_push_mod_table"
            }
            TableType::VlanEncapCtagStagMod => {
                "evpn_gw_control.vlan_encap_ctag_stag_mod_table"
            }
            TableType::VlanEncapStagMod => {
                "evpn_gw_control.vlan_encap_stag_mod_table"
            }
            TableType::VlanCtagStagPopMod => {
                "evpn_gw_control.vlan_ctag_stag_pop_mod_table"
            }
            TableType::VlanStagPopMod => {
                "evpn_gw_control.vlan_stag_pop_mod_table"
            }
            TableType::VlanEncapCtagStagFloodMod => {
                "evpn_gw_control.vlan_encap_ctag_stag_flood_mod_table"
            }
            TableType::PopVlanPushOuterMacIpMod => {
                "evpn_gw_control.pop_vlan_push_outer_mac_ip_mod_table"
            }
            TableType::OmacCryptoVxlanImacPushMod => {
                "evpn_gw_control.omac_crypto_vxlan_imac_push_mod_table"
            }
            TableType::CryptoTunnelIpMod => {
                "evpn_gw_control.crypto_tunnel_ip_mod_table"
            }
            TableType::IpsecRxSaClassification => {
                "CXPControl.ipsec_rx_sa_classification_table"
            }
            TableType::IpsecSaConfig => {
                "tdi.fixed.ipsec_offload.ipsec_offload.sad.sad_entry.ipsec-sa-config"
            }
        }
    }

    /// Is this one of the packet-modification tables, whose entries are
    /// keyed by a modification pointer?
    pub fn is_mod_table(&self) -> bool {
        matches!(
            self,
            TableType::VlanPushMod
                | TableType::MacVlanPushMod
                | TableType::DmacVlanPushMod
                | TableType::MacMod
                | TableType::OmacVxlanImacPushMod
                | TableType::OmacVxlanPushMod
                | TableType::VlanEncapCtagStagMod
                | TableType::VlanEncapStagMod
                | TableType::VlanCtagStagPopMod
                | TableType::VlanStagPopMod
                | TableType::VlanEncapCtagStagFloodMod
                | TableType::PopVlanPushOuterMacIpMod
                | TableType::OmacCryptoVxlanImacPushMod
                | TableType::CryptoTunnelIpMod
        )
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl TryFrom<&str> for TableType {
    type Error = XlateError;

    fn try_from(name: &str) -> Result<Self, Self::Error> {
        TableType::iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| {
                XlateError::NotFound(format!("no such table: {name}"))
            })
    }
}

/// The egress VSI corresponding to an ingress VSI
pub fn egress_vsi(vsi: impl Into<u32>) -> u32 {
    vsi.into() + 16
}

/// Build the TCAM composite key for a VRF and direction: the decimal digits
/// of the VRF id followed by the direction code.
pub fn tcam_prefix(vrf_id: u32, dir: Direction) -> XlateResult<u32> {
    u64::from(vrf_id)
        .checked_mul(10)
        .map(|v| v + u64::from(dir.code()))
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| {
            XlateError::InvalidConfiguration(format!(
                "tcam prefix for vrf {vrf_id} does not fit in 32 bits"
            ))
        })
}

/// Collects the table operations for one translation.
///
/// Translation code always walks an object in installation order, pushing
/// each entry it depends on before the entries that reference it.  When the
/// list is removing entries, finish() hands the operations back in reverse,
/// so referencing entries are removed before the entries they point at.
#[derive(Debug)]
pub struct OpList {
    kind: OpKind,
    ops: Vec<TableOperation>,
}

impl OpList {
    pub fn new(kind: OpKind) -> Self {
        OpList {
            kind,
            ops: Vec::new(),
        }
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn is_delete(&self) -> bool {
        self.kind == OpKind::Delete
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Record an entry.  When removing, only the key is kept.
    pub fn push<M, A>(
        &mut self,
        table: TableType,
        key: &M,
        priority: i32,
        action: &A,
    ) -> XlateResult<()>
    where
        M: MatchParse,
        A: ActionParse,
    {
        let op = match self.kind {
            OpKind::Add => {
                TableOperation::add(table.name(), key, priority, action)?
            }
            OpKind::Delete => {
                TableOperation::delete(table.name(), key, priority)?
            }
        };
        self.ops.push(op);
        Ok(())
    }

    /// Record the removal of an entry that is installed by other means.
    /// Nothing is recorded when installing.
    pub fn push_removal<M: MatchParse>(
        &mut self,
        table: TableType,
        key: &M,
        priority: i32,
    ) -> XlateResult<()> {
        if self.kind == OpKind::Delete {
            self.ops
                .push(TableOperation::delete(table.name(), key, priority)?);
        }
        Ok(())
    }

    pub fn finish(self) -> Vec<TableOperation> {
        let mut ops = self.ops;
        if self.kind == OpKind::Delete {
            ops.reverse();
        }
        ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::route::LemKey;
    use crate::table::route::RouteAction;
    use std::net::Ipv4Addr;

    #[test]
    fn test_names() -> anyhow::Result<()> {
        for t in TableType::iter() {
            assert_eq!(TableType::try_from(t.name())?, t);
        }
        assert!(TableType::try_from("evpn_gw_control.nonesuch").is_err());
        assert!(TableType::MacMod.is_mod_table());
        assert!(!TableType::L3Lem.is_mod_table());
        Ok(())
    }

    #[test]
    fn test_tcam_prefix() -> anyhow::Result<()> {
        assert_eq!(tcam_prefix(5, Direction::Rx)?, 50);
        assert_eq!(tcam_prefix(5, Direction::Tx)?, 51);
        assert_eq!(tcam_prefix(0, Direction::Tx)?, 1);
        assert_eq!(tcam_prefix(429_496_729, Direction::Rx)?, 4_294_967_290);
        assert!(tcam_prefix(429_496_730, Direction::Rx).is_err());
        Ok(())
    }

    #[test]
    fn test_egress_vsi() {
        assert_eq!(egress_vsi(0xbu16), 27);
        assert_eq!(egress_vsi(8u32), 24);
    }

    #[test]
    fn test_delete_order() -> anyhow::Result<()> {
        let fill = |ops: &mut OpList| -> XlateResult<()> {
            for host in 1..=3 {
                let key = LemKey {
                    vrf: 0,
                    direction: 0,
                    dst_ip: Ipv4Addr::new(10, 0, 0, host),
                };
                let action = RouteAction::SetNeighbor {
                    neighbor: 2,
                    ecmp_on: 0,
                };
                ops.push(TableType::L3Lem, &key, 0, &action)?;
            }
            Ok(())
        };

        let mut add = OpList::new(OpKind::Add);
        fill(&mut add)?;
        let mut del = OpList::new(OpKind::Delete);
        fill(&mut del)?;
        assert_eq!(del.len(), 3);

        let add = add.finish();
        let del = del.finish();
        assert!(del.iter().all(|op| op.is_delete()));
        let added: Vec<_> = add.iter().map(|op| &op.key).collect();
        let removed: Vec<_> = del.iter().rev().map(|op| &op.key).collect();
        assert_eq!(added, removed);
        Ok(())
    }
}
