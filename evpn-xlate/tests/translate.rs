// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Whole-object lifecycles driven through the Translator and checked
//! against the in-memory table model.

use std::net::Ipv4Addr;

use aal::ActionParse;
use aal::MatchParse;
use aal::OpKind;
use aal::TableWriter;
use common::network::MacAddr;
use pretty_assertions::assert_eq;
use slog::Drain;

use evpn_xlate::config::Config;
use evpn_xlate::config::PhyPort;
use evpn_xlate::config::Representor;
use evpn_xlate::config::Representors;
use evpn_xlate::events::Event;
use evpn_xlate::events::EventOp;
use evpn_xlate::events::Object;
use evpn_xlate::events::Replay;
use evpn_xlate::nexthop::Directions;
use evpn_xlate::nexthop::FdbEntry;
use evpn_xlate::nexthop::FdbKind;
use evpn_xlate::nexthop::L2Nexthop;
use evpn_xlate::nexthop::L2NexthopKey;
use evpn_xlate::nexthop::L2NexthopKind;
use evpn_xlate::nexthop::L2PortNexthop;
use evpn_xlate::nexthop::L2VxlanNexthop;
use evpn_xlate::nexthop::Nexthop;
use evpn_xlate::nexthop::NexthopKey;
use evpn_xlate::nexthop::NexthopKind;
use evpn_xlate::nexthop::PhysicalNexthop;
use evpn_xlate::nexthop::PortType;
use evpn_xlate::nexthop::Route;
use evpn_xlate::nexthop::TunnelNexthop;
use evpn_xlate::nexthop::VxlanNexthop;
use evpn_xlate::nexthop::GRD_VRF;
use evpn_xlate::objects::BridgePort;
use evpn_xlate::objects::EncAlgorithm;
use evpn_xlate::objects::LogicalBridge;
use evpn_xlate::objects::Sa;
use evpn_xlate::objects::SaDirection;
use evpn_xlate::objects::Svi;
use evpn_xlate::objects::TunnelRep;
use evpn_xlate::objects::Vrf;
use evpn_xlate::soft::SoftTables;
use evpn_xlate::table::route::LpmKey;
use evpn_xlate::table::route::RedirectAction;
use evpn_xlate::table::route::RedirectKey;
use evpn_xlate::table::route::RouteAction;
use evpn_xlate::table::TableType;
use evpn_xlate::Translator;
use evpn_xlate::XlateError;

fn logger() -> slog::Logger {
    let decorator =
        slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    slog::Logger::root(drain, slog::o!())
}

fn mac(last: u8) -> MacAddr {
    MacAddr::new(0, 0xaa, 0, 0, 0, last)
}

fn config() -> Config {
    let rep = |vsi: u16| Representor {
        vsi,
        mac: MacAddr::new(0, 0x20, 0, 0, 0, vsi as u8),
    };
    Config::new(Representors {
        vrf_mux: rep(0x2a),
        port_mux: rep(0x2b),
        tunnel_mux: rep(0x2c),
        grpc_acc: rep(0x20),
        grpc_host: rep(0x21),
        phy: vec![
            PhyPort {
                port_id: 0,
                vsi: 0x10,
                mac: MacAddr::new(0, 0x10, 0, 0, 0, 0),
            },
            PhyPort {
                port_id: 1,
                vsi: 0x11,
                mac: MacAddr::new(0, 0x10, 0, 0, 0, 1),
            },
        ],
    })
}

fn blue() -> Vrf {
    Vrf {
        name: "blue".to_string(),
        vni: Some(100),
        routing_table: 5,
        vtep_ip: Some(Ipv4Addr::new(10, 10, 0, 1)),
        router_mac: Some(mac(1)),
    }
}

fn nh_key(vrf: &str, id: u32, dev: &str) -> NexthopKey {
    NexthopKey {
        vrf: vrf.to_string(),
        dst: Some(Ipv4Addr::new(192, 168, 100, id as u8)),
        dev: dev.to_string(),
        prefsrc: None,
        local: false,
    }
}

fn phy_nexthop(id: u32) -> Nexthop {
    Nexthop {
        id,
        key: nh_key(GRD_VRF, id, "eth0"),
        weight: 1,
        direction: Directions::Both,
        kind: NexthopKind::Physical(PhysicalNexthop {
            smac: MacAddr::new(0, 0x10, 0, 0, 0, 0),
            dmac: mac(id as u8),
            egress_vport: 0x10,
        }),
    }
}

fn route(
    vrf: &str,
    prefix: &str,
    direction: Directions,
    nexthops: Vec<Nexthop>,
) -> Route {
    Route {
        vrf: vrf.to_string(),
        routing_table: 5,
        prefix: prefix.parse().unwrap(),
        direction,
        nexthops,
    }
}

fn add(object: Object) -> Event {
    Event {
        op: EventOp::Add,
        object,
    }
}

// A bit of everything each decoder handles, in an order the objects can be
// created in
fn scenario() -> Vec<Event> {
    let lb10 = LogicalBridge {
        name: "lb10".to_string(),
        vlan_id: 10,
        vni: Some(1010),
        vtep_ip: Some(Ipv4Addr::new(10, 10, 0, 1)),
        svi: Some("svi10".to_string()),
        bridge_ports: vec!["bp0".to_string(), "bp1".to_string()],
    };
    let lb20 = LogicalBridge {
        name: "lb20".to_string(),
        vlan_id: 20,
        vni: Some(1020),
        vtep_ip: Some(Ipv4Addr::new(10, 10, 0, 1)),
        svi: None,
        bridge_ports: vec!["bp1".to_string()],
    };
    let access = BridgePort {
        name: "bp0".to_string(),
        vsi: 8,
        mac: mac(0x30),
        port_type: PortType::Access,
        logical_bridges: vec!["lb10".to_string()],
    };
    let trunk = BridgePort {
        name: "bp1".to_string(),
        vsi: 9,
        mac: mac(0x31),
        port_type: PortType::Trunk,
        logical_bridges: vec!["lb10".to_string(), "lb20".to_string()],
    };
    let svi = Svi {
        name: "svi10".to_string(),
        vrf: "blue".to_string(),
        logical_bridge: "lb10".to_string(),
        mac: mac(0x40),
    };
    let sa = |index: u32, direction: SaDirection| Sa {
        index,
        direction,
        spi: 0x1000 + index,
        key: vec![1, 2, 3, 4],
        algorithm: EncAlgorithm::AesGcm16,
        esn: false,
        src_ip: Ipv4Addr::new(172, 16, 0, 2),
        dst_ip: Ipv4Addr::new(172, 16, 0, 1),
        vrf: "blue".to_string(),
    };
    let tunnel = TunnelRep {
        if_id: 30,
        src_mac: MacAddr::new(0, 0x10, 0, 0, 0, 1),
        dst_mac: Some(mac(0x50)),
        src_ip: Ipv4Addr::new(172, 16, 0, 1),
        dst_ip: Ipv4Addr::new(172, 16, 0, 2),
        sa_idx: Some(4),
    };
    let vxlan_nexthop = Nexthop {
        id: 4,
        key: nh_key("blue", 4, "vxlan100"),
        weight: 1,
        direction: Directions::Both,
        kind: NexthopKind::Vxlan(VxlanNexthop {
            phy_smac: MacAddr::new(0, 0x10, 0, 0, 0, 0),
            phy_dmac: mac(0x60),
            egress_vport: 0x10,
            local_vtep: Ipv4Addr::new(10, 10, 0, 1),
            remote_vtep: Ipv4Addr::new(10, 20, 0, 1),
            vni: 100,
            inner_smac: mac(1),
            inner_dmac: mac(2),
        }),
    };
    let tunnel_nexthop = Nexthop {
        id: 6,
        key: nh_key(GRD_VRF, 6, "ipsec0"),
        weight: 1,
        direction: Directions::Both,
        kind: NexthopKind::IpTunnel(TunnelNexthop {
            phy_smac: MacAddr::new(0, 0x10, 0, 0, 0, 1),
            phy_dmac: mac(0x50),
            egress_vport: 0x11,
            local_tep: Ipv4Addr::new(172, 16, 0, 1),
            remote_tep: Ipv4Addr::new(172, 16, 0, 2),
            sa_idx: 4,
        }),
    };
    let l2_vxlan = L2Nexthop {
        id: 3,
        key: L2NexthopKey {
            dev: "vxlan1010".to_string(),
            vlan_id: 10,
            dst: Some(Ipv4Addr::new(10, 20, 0, 1)),
        },
        vlan_id: 10,
        kind: L2NexthopKind::Vxlan(L2VxlanNexthop {
            phy_smac: MacAddr::new(0, 0x10, 0, 0, 0, 0),
            phy_dmac: mac(0x60),
            egress_vport: 0x10,
            local_vtep: Ipv4Addr::new(10, 10, 0, 1),
            remote_vtep: Ipv4Addr::new(10, 20, 0, 1),
            vni: 1010,
        }),
    };
    let l2_trunk = L2Nexthop {
        id: 5,
        key: L2NexthopKey {
            dev: "bp1".to_string(),
            vlan_id: 10,
            dst: None,
        },
        vlan_id: 10,
        kind: L2NexthopKind::BridgePort(L2PortNexthop {
            port_type: PortType::Trunk,
            vsi: 9,
        }),
    };
    let fdb = |last: u8, kind: FdbKind, nexthop_id: u32| FdbEntry {
        mac: mac(last),
        vlan_id: 10,
        direction: Directions::Both,
        kind,
        nexthop_id,
    };

    vec![
        add(Object::Vrf(blue())),
        add(Object::LogicalBridge(lb10)),
        add(Object::LogicalBridge(lb20)),
        add(Object::BridgePort(access)),
        add(Object::BridgePort(trunk)),
        add(Object::Svi(svi)),
        add(Object::Nexthop(phy_nexthop(7))),
        add(Object::Nexthop(phy_nexthop(8))),
        add(Object::Nexthop(vxlan_nexthop.clone())),
        add(Object::Nexthop(tunnel_nexthop)),
        add(Object::Route(route(
            "blue",
            "10.0.0.0/24",
            Directions::Rx,
            vec![phy_nexthop(7)],
        ))),
        add(Object::Route(route(
            "blue",
            "10.0.1.0/24",
            Directions::Both,
            vec![phy_nexthop(7), phy_nexthop(8)],
        ))),
        add(Object::Route(route(
            "blue",
            "10.0.2.0/24",
            Directions::Both,
            vec![phy_nexthop(7), phy_nexthop(8)],
        ))),
        add(Object::Route(route(
            "blue",
            "10.0.3.0/24",
            Directions::Tx,
            vec![vxlan_nexthop],
        ))),
        add(Object::Route(route(
            GRD_VRF,
            "192.168.0.0/16",
            Directions::Both,
            vec![phy_nexthop(7)],
        ))),
        add(Object::Route(route(
            GRD_VRF,
            "192.168.1.1/32",
            Directions::Both,
            vec![phy_nexthop(8)],
        ))),
        add(Object::L2Nexthop(l2_vxlan)),
        add(Object::L2Nexthop(l2_trunk)),
        add(Object::Fdb(fdb(0x70, FdbKind::Vxlan, 3))),
        add(Object::Fdb(fdb(0x71, FdbKind::BridgePort, 5))),
        add(Object::Sa(sa(3, SaDirection::Inbound))),
        add(Object::Sa(sa(4, SaDirection::Outbound))),
        add(Object::Tunnel(tunnel)),
    ]
}

#[test]
fn test_vrf_route_lifecycle() -> anyhow::Result<()> {
    let log = logger();
    let t = Translator::new(&log, config())?;
    let mut tables = SoftTables::new(&log);

    let vrf_ops = t.vrf(&blue(), OpKind::Add)?;
    tables.apply_all(&vrf_ops)?;

    let r = route("blue", "10.0.0.0/24", Directions::Rx, vec![phy_nexthop(7)]);
    let ops = t.route(&r, OpKind::Add)?;
    tables.apply_all(&ops)?;
    let tidx = t.pools().trie.lookup(&50).unwrap();
    assert_eq!(ops.len(), 2);

    assert_eq!(ops[0].table, TableType::EcmpLpmRootLut1.name());
    assert_eq!(ops[0].key, RedirectKey { tcam_prefix: 50 }.key_to_ir()?);
    assert_eq!(ops[0].priority, tidx as i32);
    assert_eq!(
        ops[0].action,
        Some(RedirectAction::Lut1 { tidx }.action_to_ir()?)
    );

    assert_eq!(ops[1].table, TableType::L3Routing.name());
    let key = LpmKey {
        ipv4_table_lpm_root1: tidx,
        dst_ip: r.prefix,
    };
    assert_eq!(ops[1].key, key.key_to_ir()?);
    let action = RouteAction::SetNeighbor {
        neighbor: 14,
        ecmp_on: 0,
    };
    assert_eq!(ops[1].action, Some(action.action_to_ir()?));

    let del = t.route(&r, OpKind::Delete)?;
    assert_eq!(del.len(), 2);
    assert_eq!(del[0].table, TableType::L3Routing.name());
    assert_eq!(del[0].key, ops[1].key);
    assert_eq!(del[1].table, TableType::EcmpLpmRootLut1.name());
    assert_eq!(del[1].key, ops[0].key);
    assert!(del.iter().all(|op| op.is_delete()));
    tables.apply_all(&del)?;
    assert_eq!(t.pools().trie.lookup(&50), None);

    let vrf_del = t.vrf(&blue(), OpKind::Delete)?;
    assert_eq!(vrf_del.len(), vrf_ops.len());
    assert_eq!(vrf_del[0].key, vrf_ops[vrf_ops.len() - 1].key);
    tables.apply_all(&vrf_del)?;
    assert!(tables.is_empty());
    Ok(())
}

#[test]
fn test_full_lifecycle() -> anyhow::Result<()> {
    let log = logger();
    let t = Translator::new(&log, config())?;
    let mut replay = Replay::new(&log, &t);
    let events = scenario();

    replay.startup()?;
    let statics = replay.tables().len();

    for event in &events {
        let outcome = replay.apply(event)?;
        assert!(
            !outcome.ops.is_empty() || outcome.sa_config.is_some(),
            "{event} produced nothing"
        );
    }
    assert!(replay.tables().len() > statics);
    for (pool, in_use, _) in t.pools().usage() {
        assert!(in_use > 0, "nothing allocated from {pool}");
    }

    // The two ECMP routes share a single group
    assert_eq!(t.pools().ecmp.in_use(), 1);

    for event in events.iter().rev() {
        let delete = Event {
            op: EventOp::Delete,
            ..event.clone()
        };
        replay.apply(&delete)?;
    }
    assert_eq!(replay.tables().len(), statics);

    replay.shutdown()?;
    assert!(replay.tables().is_empty());
    for (pool, in_use, _) in t.pools().usage() {
        assert_eq!(in_use, 0, "{pool} still has ids bound");
    }
    Ok(())
}

#[test]
fn test_svi_after_ports() -> anyhow::Result<()> {
    let log = logger();
    let t = Translator::new(&log, config())?;
    let mut replay = Replay::new(&log, &t);
    let events = scenario();

    // vrf, bridges, ports, then the svi joining them
    for event in &events[..5] {
        replay.apply(event)?;
    }
    let outcome = replay.apply(&events[5])?;
    let mut tables: Vec<&str> =
        outcome.ops.iter().map(|op| op.table.as_str()).collect();
    tables.sort();
    let mut expected = vec![
        TableType::TaggedVportSviIngress.name(),
        TableType::VportSviIngress.name(),
    ];
    expected.sort();
    assert_eq!(tables, expected);

    // Removing a port takes its svi entry with it
    let delete = Event {
        op: EventOp::Delete,
        ..events[3].clone()
    };
    let outcome = replay.apply(&delete)?;
    assert!(outcome
        .ops
        .iter()
        .any(|op| op.table == TableType::VportSviIngress.name()));
    Ok(())
}

#[test]
fn test_unresolved_vrf() -> anyhow::Result<()> {
    let log = logger();
    let t = Translator::new(&log, config())?;
    let pending = Vrf {
        router_mac: None,
        ..blue()
    };
    assert!(t.vrf(&pending, OpKind::Add)?.is_empty());
    assert_eq!(t.vrf(&blue(), OpKind::Add)?.len(), 2);
    Ok(())
}

#[test]
fn test_vrf_vni_without_vtep() -> anyhow::Result<()> {
    let log = logger();
    let t = Translator::new(&log, config())?;
    let no_vtep = Vrf {
        vtep_ip: None,
        ..blue()
    };
    assert!(matches!(
        t.vrf(&no_vtep, OpKind::Add),
        Err(XlateError::InvalidConfiguration(_))
    ));

    // Without a vni the vrf terminates nothing and needs no address
    let plain = Vrf {
        vni: None,
        vtep_ip: None,
        ..blue()
    };
    assert!(t.vrf(&plain, OpKind::Add)?.is_empty());
    Ok(())
}

#[test]
fn test_failed_add_leaves_pools() -> anyhow::Result<()> {
    let log = logger();
    let t = Translator::new(&log, config())?;
    let mut rx = phy_nexthop(8);
    rx.direction = Directions::Rx;
    let r = route(
        "blue",
        "10.0.1.0/24",
        Directions::Both,
        vec![phy_nexthop(7), rx],
    );
    assert!(t.route(&r, OpKind::Add).is_err());
    for (pool, in_use, _) in t.pools().usage() {
        assert_eq!(in_use, 0, "{pool} changed by a failed translation");
    }
    Ok(())
}
