// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Read access to the configuration objects the decoders depend on.

use std::collections::BTreeMap;
use std::fmt;

use crate::objects::BridgePort;
use crate::objects::LogicalBridge;
use crate::objects::Sa;
use crate::objects::Svi;
use crate::objects::TunnelRep;
use crate::objects::Vrf;
use crate::types::XlateError;
use crate::types::XlateResult;

/// The object store seam.  Every lookup fails with NotFound when the object
/// does not exist.
pub trait ObjectStore {
    fn vrf(&self, name: &str) -> XlateResult<Vrf>;
    fn logical_bridge(&self, name: &str) -> XlateResult<LogicalBridge>;
    fn svi(&self, name: &str) -> XlateResult<Svi>;
    fn bridge_port(&self, name: &str) -> XlateResult<BridgePort>;
    fn sa(&self, index: u32) -> XlateResult<Sa>;
    fn tunnel(&self, if_id: u32) -> XlateResult<TunnelRep>;
}

fn fetch<K, V>(map: &BTreeMap<K, V>, what: &str, key: &K) -> XlateResult<V>
where
    K: Ord + fmt::Display,
    V: Clone,
{
    map.get(key)
        .cloned()
        .ok_or_else(|| XlateError::NotFound(format!("{what} {key}")))
}

/// An ObjectStore held entirely in memory
#[derive(Debug, Default)]
pub struct MemStore {
    vrfs: BTreeMap<String, Vrf>,
    bridges: BTreeMap<String, LogicalBridge>,
    svis: BTreeMap<String, Svi>,
    ports: BTreeMap<String, BridgePort>,
    sas: BTreeMap<u32, Sa>,
    tunnels: BTreeMap<u32, TunnelRep>,
}

impl MemStore {
    pub fn new() -> Self {
        MemStore::default()
    }

    pub fn insert_vrf(&mut self, vrf: Vrf) {
        self.vrfs.insert(vrf.name.clone(), vrf);
    }

    pub fn remove_vrf(&mut self, name: &str) -> Option<Vrf> {
        self.vrfs.remove(name)
    }

    pub fn insert_logical_bridge(&mut self, lb: LogicalBridge) {
        self.bridges.insert(lb.name.clone(), lb);
    }

    pub fn remove_logical_bridge(
        &mut self,
        name: &str,
    ) -> Option<LogicalBridge> {
        self.bridges.remove(name)
    }

    pub fn insert_svi(&mut self, svi: Svi) {
        self.svis.insert(svi.name.clone(), svi);
    }

    pub fn remove_svi(&mut self, name: &str) -> Option<Svi> {
        self.svis.remove(name)
    }

    pub fn insert_bridge_port(&mut self, bp: BridgePort) {
        self.ports.insert(bp.name.clone(), bp);
    }

    pub fn remove_bridge_port(&mut self, name: &str) -> Option<BridgePort> {
        self.ports.remove(name)
    }

    pub fn insert_sa(&mut self, sa: Sa) {
        self.sas.insert(sa.index, sa);
    }

    pub fn remove_sa(&mut self, index: u32) -> Option<Sa> {
        self.sas.remove(&index)
    }

    pub fn insert_tunnel(&mut self, tun: TunnelRep) {
        self.tunnels.insert(tun.if_id, tun);
    }

    pub fn remove_tunnel(&mut self, if_id: u32) -> Option<TunnelRep> {
        self.tunnels.remove(&if_id)
    }
}

impl ObjectStore for MemStore {
    fn vrf(&self, name: &str) -> XlateResult<Vrf> {
        fetch(&self.vrfs, "vrf", &name.to_string())
    }

    fn logical_bridge(&self, name: &str) -> XlateResult<LogicalBridge> {
        fetch(&self.bridges, "logical bridge", &name.to_string())
    }

    fn svi(&self, name: &str) -> XlateResult<Svi> {
        fetch(&self.svis, "svi", &name.to_string())
    }

    fn bridge_port(&self, name: &str) -> XlateResult<BridgePort> {
        fetch(&self.ports, "bridge port", &name.to_string())
    }

    fn sa(&self, index: u32) -> XlateResult<Sa> {
        fetch(&self.sas, "sa", &index)
    }

    fn tunnel(&self, if_id: u32) -> XlateResult<TunnelRep> {
        fetch(&self.tunnels, "tunnel", &if_id)
    }
}
