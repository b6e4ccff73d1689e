// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Routes, nexthops and forwarding entries as delivered by the event source.
//! These arrive pre-validated, with every MAC, VSI and VNI already resolved.

use std::fmt;
use std::net::Ipv4Addr;

use common::network::MacAddr;
use oxnet::Ipv4Net;
use serde::Deserialize;
use serde::Serialize;

use crate::types::XlateError;
use crate::types::XlateResult;

/// Name of the default VRF, the global routing domain
pub const GRD_VRF: &str = "GRD";

/// The direction a pipeline entry applies to.  Received traffic arrives from
/// the physical ports, transmitted traffic from the host and tenant ports.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Deserialize,
    Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Rx,
    Tx,
}

impl Direction {
    /// The value the pipeline uses for this direction
    pub fn code(self) -> u16 {
        match self {
            Direction::Rx => 0,
            Direction::Tx => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Direction::Rx => write!(f, "rx"),
            Direction::Tx => write!(f, "tx"),
        }
    }
}

/// The set of directions a route, nexthop or fdb entry covers
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Directions {
    Rx,
    Tx,
    #[default]
    Both,
}

impl Directions {
    /// Each covered direction, tx first
    pub fn list(self) -> &'static [Direction] {
        match self {
            Directions::Rx => &[Direction::Rx],
            Directions::Tx => &[Direction::Tx],
            Directions::Both => &[Direction::Tx, Direction::Rx],
        }
    }

    pub fn contains(self, dir: Direction) -> bool {
        self.list().contains(&dir)
    }
}

// Map a logical id into the pipeline's neighbor space.  An entry programmed
// for the rx direction of something that only transmits gets the odd id.
fn neighbor_id(id: u32, native_tx: bool, dir: Direction) -> XlateResult<u16> {
    let rec = u32::from(dir == Direction::Rx && native_tx);
    id.checked_mul(2)
        .map(|n| n + rec)
        .and_then(|n| u16::try_from(n).ok())
        .ok_or_else(|| {
            XlateError::InvalidConfiguration(format!(
                "id {id} does not fit in the neighbor field"
            ))
        })
}

/// Identity of an L3 nexthop.  Rewrite pointers are allocated against it.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
pub struct NexthopKey {
    pub vrf: String,
    pub dst: Option<Ipv4Addr>,
    pub dev: String,
    #[serde(default)]
    pub prefsrc: Option<Ipv4Addr>,
    #[serde(default)]
    pub local: bool,
}

/// Egress through a physical port
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PhysicalNexthop {
    pub smac: MacAddr,
    pub dmac: MacAddr,
    pub egress_vport: u32,
}

/// Egress toward the host through the ACC representor
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct AccNexthop {
    pub dmac: MacAddr,
    pub vlan_id: u16,
    pub egress_vport: u32,
}

/// Egress through a tenant bridge port reached by an SVI
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct SviNexthop {
    pub smac: MacAddr,
    pub dmac: MacAddr,
    pub vlan_id: u16,
    pub egress_vport: u32,
}

/// VXLAN encapsulation toward a remote VTEP
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct VxlanNexthop {
    pub phy_smac: MacAddr,
    pub phy_dmac: MacAddr,
    pub egress_vport: u32,
    pub local_vtep: Ipv4Addr,
    pub remote_vtep: Ipv4Addr,
    pub vni: u32,
    pub inner_smac: MacAddr,
    pub inner_dmac: MacAddr,
}

/// IPsec-encrypted IP tunnel
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TunnelNexthop {
    pub phy_smac: MacAddr,
    pub phy_dmac: MacAddr,
    pub egress_vport: u32,
    pub local_tep: Ipv4Addr,
    pub remote_tep: Ipv4Addr,
    pub sa_idx: u32,
}

/// VXLAN carried inside an IPsec-encrypted tunnel
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct VxlanTunnelNexthop {
    pub phy_smac: MacAddr,
    pub phy_dmac: MacAddr,
    pub egress_vport: u32,
    pub local_tep: Ipv4Addr,
    pub remote_tep: Ipv4Addr,
    pub sa_idx: u32,
    pub local_vtep: Ipv4Addr,
    pub remote_vtep: Ipv4Addr,
    pub vni: u32,
    pub inner_smac: MacAddr,
    pub inner_dmac: MacAddr,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NexthopKind {
    Physical(PhysicalNexthop),
    Acc(AccNexthop),
    SviAccess(SviNexthop),
    SviTrunk(SviNexthop),
    Vxlan(VxlanNexthop),
    IpTunnel(TunnelNexthop),
    VxlanTunnel(VxlanTunnelNexthop),
}

impl NexthopKind {
    pub fn name(&self) -> &'static str {
        match self {
            NexthopKind::Physical(_) => "physical",
            NexthopKind::Acc(_) => "acc",
            NexthopKind::SviAccess(_) => "svi_access",
            NexthopKind::SviTrunk(_) => "svi_trunk",
            NexthopKind::Vxlan(_) => "vxlan",
            NexthopKind::IpTunnel(_) => "ip_tunnel",
            NexthopKind::VxlanTunnel(_) => "vxlan_tunnel",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Nexthop {
    pub id: u32,
    pub key: NexthopKey,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub direction: Directions,
    pub kind: NexthopKind,
}

fn default_weight() -> u32 {
    1
}

impl Nexthop {
    /// The neighbor id an entry programmed for `dir` uses for this nexthop
    pub fn p4_id(&self, dir: Direction) -> XlateResult<u16> {
        neighbor_id(self.id, self.direction == Directions::Tx, dir)
    }
}

/// The group-level equivalent of Nexthop::p4_id()
pub(crate) fn group_p4_id(
    group_id: u32,
    group_dir: Direction,
    dir: Direction,
) -> XlateResult<u16> {
    neighbor_id(group_id, group_dir == Direction::Tx, dir)
}

/// Identity of an L2 nexthop
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
pub struct L2NexthopKey {
    pub dev: String,
    pub vlan_id: u16,
    pub dst: Option<Ipv4Addr>,
}

/// Port flavors for tenant bridge ports
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortType {
    Access,
    Trunk,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct L2VxlanNexthop {
    pub phy_smac: MacAddr,
    pub phy_dmac: MacAddr,
    pub egress_vport: u32,
    pub local_vtep: Ipv4Addr,
    pub remote_vtep: Ipv4Addr,
    pub vni: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct L2PortNexthop {
    pub port_type: PortType,
    pub vsi: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum L2NexthopKind {
    Vxlan(L2VxlanNexthop),
    BridgePort(L2PortNexthop),
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct L2Nexthop {
    pub id: u32,
    pub key: L2NexthopKey,
    pub vlan_id: u16,
    pub kind: L2NexthopKind,
}

/// Which side of the bridge an fdb entry forwards to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FdbKind {
    Vxlan,
    BridgePort,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct FdbEntry {
    pub mac: MacAddr,
    pub vlan_id: u16,
    #[serde(default)]
    pub direction: Directions,
    pub kind: FdbKind,
    /// Id of the L2 nexthop the entry forwards to
    pub nexthop_id: u32,
}

/// Identity of a route, used to track which routes share an ECMP group
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RouteKey {
    pub vrf: String,
    pub prefix: Ipv4Net,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Route {
    pub vrf: String,
    pub routing_table: u32,
    pub prefix: Ipv4Net,
    #[serde(default)]
    pub direction: Directions,
    pub nexthops: Vec<Nexthop>,
}

impl Route {
    pub fn key(&self) -> RouteKey {
        RouteKey {
            vrf: self.vrf.clone(),
            prefix: self.prefix,
        }
    }

    pub fn is_host(&self) -> bool {
        self.prefix.width() == 32
    }

    pub fn is_grd(&self) -> bool {
        self.vrf == GRD_VRF
    }

    /// The id the pipeline uses for the route's VRF
    pub fn vrf_id(&self) -> u32 {
        if self.is_grd() {
            0
        } else {
            self.routing_table
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn phy_nexthop(id: u32, direction: Directions) -> Nexthop {
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
                smac: MacAddr::new(0, 1, 2, 3, 4, 5),
                dmac: MacAddr::new(0, 1, 2, 3, 4, 6),
                egress_vport: 0,
            }),
        }
    }

    #[test]
    fn test_p4_id() -> anyhow::Result<()> {
        let nh = phy_nexthop(5, Directions::Tx);
        assert_eq!(nh.p4_id(Direction::Tx)?, 10);
        assert_eq!(nh.p4_id(Direction::Rx)?, 11);

        // Only a tx-only nexthop gets the odd rx id
        let nh = phy_nexthop(5, Directions::Both);
        assert_eq!(nh.p4_id(Direction::Rx)?, 10);
        let nh = phy_nexthop(5, Directions::Rx);
        assert_eq!(nh.p4_id(Direction::Rx)?, 10);

        assert_eq!(group_p4_id(3, Direction::Tx, Direction::Rx)?, 7);
        assert_eq!(group_p4_id(3, Direction::Rx, Direction::Rx)?, 6);
        assert!(phy_nexthop(40000, Directions::Rx)
            .p4_id(Direction::Rx)
            .is_err());
        Ok(())
    }

    #[test]
    fn test_directions() {
        assert_eq!(Directions::Both.list(), &[Direction::Tx, Direction::Rx]);
        assert_eq!(Directions::Rx.list(), &[Direction::Rx]);
        assert!(!Directions::Tx.contains(Direction::Rx));
        assert_eq!(Direction::Rx.code(), 0);
        assert_eq!(Direction::Tx.code(), 1);
    }

    #[test]
    fn test_nexthop_json() -> anyhow::Result<()> {
        let nh = phy_nexthop(1, Directions::Rx);
        let json = serde_json::to_value(&nh)?;
        assert_eq!(json["kind"]["type"], "physical");
        assert_eq!(json["direction"], "rx");
        let back: Nexthop = serde_json::from_value(json)?;
        assert_eq!(back, nh);
        Ok(())
    }

    #[test]
    fn test_route() {
        let route = Route {
            vrf: "blue".to_string(),
            routing_table: 5,
            prefix: "10.0.0.0/24".parse().unwrap(),
            direction: Directions::Rx,
            nexthops: vec![phy_nexthop(1, Directions::Rx)],
        };
        assert!(!route.is_host());
        assert_eq!(route.vrf_id(), 5);

        let route = Route {
            vrf: GRD_VRF.to_string(),
            prefix: "10.0.0.1/32".parse().unwrap(),
            ..route
        };
        assert!(route.is_host());
        assert_eq!(route.vrf_id(), 0);
    }
}
