// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The index pools shared by every decoder.

use aal::OpKind;
use common::network::MacAddr;
use oxnet::Ipv4Net;

use crate::config::Config;
use crate::idpool::IndexPool;
use crate::nexthop::L2NexthopKey;
use crate::nexthop::NexthopKey;
use crate::nexthop::RouteKey;
use crate::txn::Txn;
use crate::types::XlateResult;

/// The owner of a modification pointer
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModPtrKey {
    /// Rewrite template of an L3 nexthop
    L3Nexthop(NexthopKey),
    /// Rewrite template of an L2 nexthop
    L2Nexthop(L2NexthopKey),
    /// Tag push of an access bridge port
    PortPush { vsi: u16 },
    /// Tag push of one VLAN carried by a trunk bridge port
    TrunkPush { vsi: u16, vlan: u16 },
    /// Tag pop of a bridge port, keyed by the port's MAC
    PortPop(MacAddr),
    /// Outer header push of an encrypted tunnel
    Tunnel(u32),
}

pub struct Pools {
    /// Modification pointers
    pub mod_ptr: IndexPool<ModPtrKey>,
    /// TCAM redirect indices, keyed by the (vrf, direction) composite and
    /// held by each prefix routed through it
    pub trie: IndexPool<u32, Ipv4Net>,
    /// ECMP group ids, keyed by the ordered member ids and held by each
    /// route using the group
    pub ecmp: IndexPool<Vec<u32>, RouteKey>,
}

impl Pools {
    pub fn new(log: &slog::Logger, config: &Config) -> XlateResult<Self> {
        let ranges = &config.pools;
        Ok(Pools {
            mod_ptr: IndexPool::new(
                log,
                "mod_ptr",
                ranges.mod_ptr.min,
                ranges.mod_ptr.max,
            )?,
            trie: IndexPool::new(
                log,
                "trie",
                ranges.trie.min,
                ranges.trie.max,
            )?,
            ecmp: IndexPool::new(
                log,
                "ecmp",
                ranges.ecmp.min,
                ranges.ecmp.max,
            )?,
        })
    }

    /// Take or drop the modification pointer owned by `owner`
    pub(crate) fn bind_mod_ptr<'a>(
        &'a self,
        txn: &mut Txn<'a>,
        kind: OpKind,
        owner: ModPtrKey,
    ) -> XlateResult<u32> {
        txn.bind(kind, &self.mod_ptr, &owner).map(|c| c.id)
    }

    /// Number of ids bound in each pool
    pub fn usage(&self) -> Vec<(&str, usize, u32)> {
        vec![
            (
                self.mod_ptr.name(),
                self.mod_ptr.in_use(),
                self.mod_ptr.capacity(),
            ),
            (self.trie.name(), self.trie.in_use(), self.trie.capacity()),
            (self.ecmp.name(), self.ecmp.in_use(), self.ecmp.capacity()),
        ]
    }
}
