// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The configuration objects held by the object store.

use std::net::Ipv4Addr;

use common::network::MacAddr;
use serde::Deserialize;
use serde::Serialize;

use crate::nexthop::PortType;
use crate::nexthop::GRD_VRF;
use crate::types::XlateError;
use crate::types::XlateResult;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Vrf {
    pub name: String,
    /// A VRF without a VNI is a plain routing table, not part of the VPN
    #[serde(default)]
    pub vni: Option<u32>,
    pub routing_table: u32,
    #[serde(default)]
    pub vtep_ip: Option<Ipv4Addr>,
    /// MAC address of the remote router, once it has been learned
    #[serde(default)]
    pub router_mac: Option<MacAddr>,
}

impl Vrf {
    pub fn is_grd(&self) -> bool {
        self.name == GRD_VRF
    }

    /// The id the pipeline uses for this VRF
    pub fn vrf_id(&self) -> u32 {
        if self.is_grd() {
            0
        } else {
            self.routing_table
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct LogicalBridge {
    pub name: String,
    pub vlan_id: u32,
    #[serde(default)]
    pub vni: Option<u32>,
    #[serde(default)]
    pub vtep_ip: Option<Ipv4Addr>,
    /// Name of the routed interface attached to the bridge
    #[serde(default)]
    pub svi: Option<String>,
    #[serde(default)]
    pub bridge_ports: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Svi {
    pub name: String,
    pub vrf: String,
    pub logical_bridge: String,
    pub mac: MacAddr,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct BridgePort {
    pub name: String,
    pub vsi: u16,
    pub mac: MacAddr,
    pub port_type: PortType,
    /// The bridges the port belongs to.  An access port belongs to exactly
    /// one.
    pub logical_bridges: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SaDirection {
    Inbound,
    Outbound,
}

/// Encryption algorithms supported by the inline crypto engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EncAlgorithm {
    AesGcm16,
    NullAuthAesGmac,
}

impl EncAlgorithm {
    /// The engine's code for the algorithm
    pub fn code(self) -> u32 {
        match self {
            EncAlgorithm::AesGcm16 => 0,
            EncAlgorithm::NullAuthAesGmac => 1,
        }
    }
}

/// An IPsec security association
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Sa {
    pub index: u32,
    pub direction: SaDirection,
    pub spi: u32,
    pub key: Vec<u8>,
    pub algorithm: EncAlgorithm,
    /// Extended sequence numbers
    #[serde(default)]
    pub esn: bool,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub vrf: String,
}

impl Sa {
    pub fn is_inbound(&self) -> bool {
        self.direction == SaDirection::Inbound
    }
}

/// The representor of an encrypted tunnel interface
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TunnelRep {
    pub if_id: u32,
    pub src_mac: MacAddr,
    /// MAC of the tunnel's next hop, once it has been resolved
    #[serde(default)]
    pub dst_mac: Option<MacAddr>,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    /// Index of the outbound SA protecting the tunnel
    #[serde(default)]
    pub sa_idx: Option<u32>,
}

/// The description of an SA handed to the inline crypto engine alongside
/// the table operations.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct SaConfig {
    pub offload_id: u32,
    pub inbound: bool,
    pub req_id: u64,
    pub spi: u32,
    pub ext_seq_num: bool,
    pub encryption_algorithm: u32,
    /// Key material as colon-separated hex bytes
    pub key: String,
    pub key_len: u32,
}

/// Every SA is installed with the same request id
pub const SA_REQ_ID: u64 = 2;

/// The longest key the crypto engine accepts: a 256-bit AES key followed by
/// the 4-byte salt used by GCM and GMAC.
pub const MAX_SA_KEY_LEN: usize = 36;

impl TryFrom<&Sa> for SaConfig {
    type Error = XlateError;

    fn try_from(sa: &Sa) -> XlateResult<Self> {
        if sa.key.len() > MAX_SA_KEY_LEN {
            return Err(XlateError::InvalidConfiguration(format!(
                "sa {} key is {} bytes, longer than {MAX_SA_KEY_LEN}",
                sa.index,
                sa.key.len()
            )));
        }
        let key_len = u32::try_from(sa.key.len()).map_err(|_| {
            XlateError::InvalidConfiguration(format!(
                "sa {} key length does not fit in 32 bits",
                sa.index
            ))
        })?;
        let key: Vec<String> =
            sa.key.iter().map(|b| format!("{b:02x}")).collect();
        Ok(SaConfig {
            offload_id: sa.index,
            inbound: sa.is_inbound(),
            req_id: SA_REQ_ID,
            spi: sa.spi,
            ext_seq_num: sa.esn,
            encryption_algorithm: sa.algorithm.code(),
            key: key.join(":"),
            key_len,
        })
    }
}
