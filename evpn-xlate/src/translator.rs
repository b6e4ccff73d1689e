// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! A single entry point for every object family.  Each add or delete is
//! handed to every decoder programming part of the object, and the
//! resulting lists are joined into one.  The whole call is atomic: if any
//! decoder fails, nothing is returned and no pool is left changed.

use std::sync::Arc;

use aal::OpKind;
use aal::TableOperation;
use slog::info;

use crate::config::Config;
use crate::ipsec::IpsecDecoder;
use crate::nexthop::FdbEntry;
use crate::nexthop::L2Nexthop;
use crate::nexthop::Nexthop;
use crate::nexthop::Route;
use crate::objects::BridgePort;
use crate::objects::LogicalBridge;
use crate::objects::Sa;
use crate::objects::SaConfig;
use crate::objects::Svi;
use crate::objects::TunnelRep;
use crate::objects::Vrf;
use crate::pools::Pools;
use crate::port::PortDecoder;
use crate::routing::RoutingDecoder;
use crate::store::ObjectStore;
use crate::txn::atomically;
use crate::txn::skip_unresolved;
use crate::types::XlateResult;
use crate::vxlan::VxlanDecoder;

pub struct Translator {
    log: slog::Logger,
    config: Arc<Config>,
    pools: Arc<Pools>,
    routing: RoutingDecoder,
    vxlan: VxlanDecoder,
    port: PortDecoder,
    ipsec: IpsecDecoder,
}

impl Translator {
    pub fn new(log: &slog::Logger, config: Config) -> XlateResult<Self> {
        config.validate()?;
        let log = log.new(slog::o!("unit" => "translator"));
        let config = Arc::new(config);
        let pools = Arc::new(Pools::new(&log, &config)?);
        info!(log, "translator ready";
            "phy_ports" => config.representors.phy.len(),
            "vxlan_udp_port" => config.vxlan_udp_port);

        Ok(Translator {
            routing: RoutingDecoder::new(&log, config.clone(), pools.clone()),
            vxlan: VxlanDecoder::new(&log, config.clone(), pools.clone()),
            port: PortDecoder::new(&log, config.clone(), pools.clone()),
            ipsec: IpsecDecoder::new(&log, config.clone(), pools.clone()),
            log,
            config,
            pools,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pools(&self) -> &Pools {
        &self.pools
    }

    /// The static entries of every decoder
    pub fn startup(&self) -> XlateResult<Vec<TableOperation>> {
        self.statics(OpKind::Add)
    }

    /// Remove everything startup() programmed
    pub fn shutdown(&self) -> XlateResult<Vec<TableOperation>> {
        self.statics(OpKind::Delete)
    }

    fn statics(&self, kind: OpKind) -> XlateResult<Vec<TableOperation>> {
        atomically(&self.log, kind, &"static entries", |txn, ops| {
            self.routing.static_ops(txn, ops)?;
            self.port.static_ops(ops)
        })
    }

    pub fn vrf(
        &self,
        vrf: &Vrf,
        kind: OpKind,
    ) -> XlateResult<Vec<TableOperation>> {
        let what = format!("vrf {}", vrf.name);
        atomically(&self.log, kind, &what, |_, ops| {
            skip_unresolved(&self.log, self.vxlan.vrf_ops(ops, vrf))?;
            skip_unresolved(&self.log, self.ipsec.vrf_ops(ops, vrf))
        })
    }

    pub fn logical_bridge(
        &self,
        lb: &LogicalBridge,
        kind: OpKind,
    ) -> XlateResult<Vec<TableOperation>> {
        self.vxlan.translate_logical_bridge(lb, kind)
    }

    pub fn svi(
        &self,
        store: &dyn ObjectStore,
        svi: &Svi,
        kind: OpKind,
    ) -> XlateResult<Vec<TableOperation>> {
        self.port.translate_svi(store, svi, kind)
    }

    pub fn bridge_port(
        &self,
        store: &dyn ObjectStore,
        bp: &BridgePort,
        kind: OpKind,
    ) -> XlateResult<Vec<TableOperation>> {
        self.port.translate_bridge_port(store, bp, kind)
    }

    pub fn sa(
        &self,
        store: &dyn ObjectStore,
        sa: &Sa,
        kind: OpKind,
    ) -> XlateResult<(Vec<TableOperation>, Option<SaConfig>)> {
        self.ipsec.translate_sa(store, sa, kind)
    }

    pub fn tunnel(
        &self,
        tun: &TunnelRep,
        kind: OpKind,
    ) -> XlateResult<Vec<TableOperation>> {
        self.ipsec.translate_tunnel(tun, kind)
    }

    pub fn route(
        &self,
        route: &Route,
        kind: OpKind,
    ) -> XlateResult<Vec<TableOperation>> {
        self.routing.translate_route(route, kind)
    }

    /// An L3 nexthop is programmed by whichever decoder handles its kind
    pub fn nexthop(
        &self,
        nh: &Nexthop,
        kind: OpKind,
    ) -> XlateResult<Vec<TableOperation>> {
        let what = format!("{} nexthop {}", nh.kind.name(), nh.id);
        let log = &self.log;
        atomically(log, kind, &what, |txn, ops| {
            skip_unresolved(log, self.routing.nexthop_ops(txn, ops, nh))?;
            skip_unresolved(log, self.vxlan.nexthop_ops(txn, ops, nh))?;
            skip_unresolved(log, self.ipsec.nexthop_ops(txn, ops, nh))
        })
    }

    pub fn l2_nexthop(
        &self,
        nh: &L2Nexthop,
        kind: OpKind,
    ) -> XlateResult<Vec<TableOperation>> {
        let what = format!("l2 nexthop {}", nh.id);
        atomically(&self.log, kind, &what, |txn, ops| {
            self.vxlan.l2_nexthop_ops(txn, ops, nh)?;
            self.port.l2_nexthop_ops(txn, ops, nh)
        })
    }

    pub fn fdb(
        &self,
        fdb: &FdbEntry,
        kind: OpKind,
    ) -> XlateResult<Vec<TableOperation>> {
        let what = format!("fdb {} vlan {}", fdb.mac, fdb.vlan_id);
        atomically(&self.log, kind, &what, |_, ops| {
            self.vxlan.fdb_ops(ops, fdb)?;
            self.port.fdb_ops(ops, fdb)
        })
    }
}
