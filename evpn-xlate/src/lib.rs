// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Translation of EVPN gateway configuration objects into match-action
//! table operations.
//!
//! Each decoder turns one family of objects into an ordered list of
//! TableOperations: entries to install, in dependency order, when an object
//! is added, and the same entries to remove, in reverse, when it is
//! deleted.  The ids the pipeline needs (modification pointers, LPM trie
//! indices and ECMP groups) come from index pools shared by every decoder.

pub mod config;
pub mod ecmp;
pub mod events;
pub mod idpool;
pub mod ipsec;
pub mod nexthop;
pub mod objects;
pub mod pools;
pub mod port;
pub mod routing;
pub mod soft;
pub mod store;
pub mod table;
pub mod translator;
mod txn;
pub mod types;
pub mod vxlan;

pub use translator::Translator;
pub use types::XlateError;
pub use types::XlateResult;

#[cfg(test)]
pub(crate) fn test_logger() -> slog::Logger {
    use slog::Drain;

    let decorator =
        slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    slog::Logger::root(drain, slog::o!())
}

#[cfg(test)]
pub(crate) fn test_config() -> config::Config {
    use common::network::MacAddr;
    use config::PhyPort;
    use config::Representor;
    use config::Representors;

    let rep = |vsi: u16| Representor {
        vsi,
        mac: MacAddr::new(0, 0x20, 0, 0, 0, vsi as u8),
    };
    config::Config::new(Representors {
        vrf_mux: rep(0x2a),
        port_mux: rep(0x2b),
        tunnel_mux: rep(0x2c),
        grpc_acc: rep(0x20),
        grpc_host: rep(0x21),
        phy: (0..2u8)
            .map(|port| PhyPort {
                port_id: u16::from(port),
                vsi: 0x10 + u16::from(port),
                mac: MacAddr::new(0, 0x10, 0, 0, 0, port),
            })
            .collect(),
    })
}
