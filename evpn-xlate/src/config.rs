// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Configuration for the translation layer.

use std::fs;
use std::path::Path;

use common::logging::LogFormat;
use common::network::MacAddr;
use serde::Deserialize;
use serde::Serialize;

use crate::table::FLOOD_PTR;
use crate::types::XlateError;
use crate::types::XlateResult;

/// A port representor: the VSI the pipeline sees for the port, and the MAC
/// address bound to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Representor {
    pub vsi: u16,
    pub mac: MacAddr,
}

/// A physical port's representor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PhyPort {
    pub port_id: u16,
    pub vsi: u16,
    pub mac: MacAddr,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Representors {
    /// Carries routed traffic between the host and the gateway
    pub vrf_mux: Representor,
    /// Carries bridged traffic between the tenant bridge ports and the
    /// gateway
    pub port_mux: Representor,
    /// Carries traffic for the encrypted tunnel interfaces
    pub tunnel_mux: Representor,
    pub grpc_acc: Representor,
    pub grpc_host: Representor,
    pub phy: Vec<PhyPort>,
}

impl Representors {
    /// Find the VSI of the physical port owning `mac`
    pub fn phy_vsi_by_mac(&self, mac: MacAddr) -> Option<u16> {
        self.phy.iter().find(|p| p.mac == mac).map(|p| p.vsi)
    }
}

/// The half-open range of ids an index pool hands out
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct IdRange {
    pub min: u32,
    pub max: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolRanges {
    pub mod_ptr: IdRange,
    pub trie: IdRange,
    pub ecmp: IdRange,
}

impl Default for PoolRanges {
    fn default() -> Self {
        PoolRanges {
            mod_ptr: IdRange { min: 2, max: 65536 },
            trie: IdRange { min: 1, max: 65536 },
            ecmp: IdRange { min: 1, max: 65536 },
        }
    }
}

const MAX_PHY_PORTS: usize = common::network::PHY_VLANS.len();

fn default_vxlan_udp_port() -> u16 {
    4789
}

fn default_routing_vsi() -> u16 {
    0x6
}

fn default_vxlan_vsi() -> u16 {
    0xb
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// If set, where the log should be written.  If not set, the log goes to
    /// stdout.
    #[serde(default)]
    pub log_file: Option<String>,

    /// Output log info in unstructured text or json?
    #[serde(default)]
    pub log_format: LogFormat,

    pub representors: Representors,

    /// Destination UDP port of originated VXLAN traffic
    #[serde(default = "default_vxlan_udp_port")]
    pub vxlan_udp_port: u16,

    /// VSI that routed traffic from the physical ports is handed to
    #[serde(default = "default_routing_vsi")]
    pub routing_default_vsi: u16,

    /// VSI that terminated L2 VXLAN traffic is handed to
    #[serde(default = "default_vxlan_vsi")]
    pub vxlan_default_vsi: u16,

    #[serde(default)]
    pub pools: PoolRanges,
}

impl Config {
    /// Build a configuration with default settings for everything but the
    /// representors.
    pub fn new(representors: Representors) -> Self {
        Config {
            log_file: None,
            log_format: LogFormat::default(),
            representors,
            vxlan_udp_port: default_vxlan_udp_port(),
            routing_default_vsi: default_routing_vsi(),
            vxlan_default_vsi: default_vxlan_vsi(),
            pools: PoolRanges::default(),
        }
    }

    pub fn from_toml(contents: &str) -> XlateResult<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> XlateResult<Self> {
        let contents = fs::read_to_string(path)?;
        Config::from_toml(&contents)
    }

    pub fn validate(&self) -> XlateResult<()> {
        // Pointers 0 and 1 have fixed meanings
        if self.pools.mod_ptr.min <= FLOOD_PTR {
            return Err(XlateError::InvalidConfiguration(format!(
                "modification pointers must start above {FLOOD_PTR}"
            )));
        }
        for (name, range) in [
            ("mod_ptr", self.pools.mod_ptr),
            ("trie", self.pools.trie),
            ("ecmp", self.pools.ecmp),
        ] {
            if range.min >= range.max {
                return Err(XlateError::InvalidConfiguration(format!(
                    "{name} pool range [{}, {}) is empty",
                    range.min, range.max
                )));
            }
        }
        if self.representors.phy.len() > MAX_PHY_PORTS {
            return Err(XlateError::InvalidConfiguration(format!(
                "at most {MAX_PHY_PORTS} physical ports are supported"
            )));
        }
        Ok(())
    }
}
