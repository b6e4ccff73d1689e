// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::net::Ipv4Addr;

use aal::ActionParse;
use aal::MatchEntryValue;
use aal::MatchKind;
use aal::MatchParse;
use aal::TableOperation;
use aal::ValueTypes;
use aal_macros::*;
use common::network::MacAddr;
use oxnet::Ipv4Net;
use pretty_assertions::assert_eq;

#[derive(MatchParse, Hash, Debug, PartialEq)]
struct RouteKey {
    #[match_xlate(name = "ipv4_table_lpm_root1")]
    root: u32,
    #[match_xlate(type = "lpm")]
    dst_ip: Ipv4Net,
}

#[derive(MatchParse, Hash, Debug, PartialEq)]
struct RedirectKey {
    #[match_xlate(name = "user_meta.cmeta.tcam_prefix", type = "ternary")]
    tcam_prefix: u32,
}

#[derive(ActionParse, Debug, PartialEq)]
enum NeighborAction {
    #[action_xlate(name = "evpn_gw_control.set_neighbor")]
    SetNeighbor { neighbor: u16, ecmp_on: u16 },
    #[action_xlate(name = "evpn_gw_control.update_smac_dmac")]
    Rewrite { smac: MacAddr, dmac: MacAddr },
}

fn prefix() -> Ipv4Net {
    Ipv4Net::new(Ipv4Addr::new(10, 0, 0, 0), 24).unwrap()
}

#[test]
fn test_key_order_and_kinds() -> anyhow::Result<()> {
    let key = RouteKey {
        root: 3,
        dst_ip: prefix(),
    };
    let ir = key.key_to_ir()?;
    let names: Vec<&str> = ir.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["ipv4_table_lpm_root1", "dst_ip"]);
    assert_eq!(ir.fields[0].value.kind(), MatchKind::Exact);
    assert_eq!(ir.fields[1].value.kind(), MatchKind::Lpm);
    assert_eq!(RouteKey::ir_to_key(&ir)?, key);
    Ok(())
}

#[test]
fn test_ternary_key() -> anyhow::Result<()> {
    let key = RedirectKey { tcam_prefix: 50 };
    let ir = key.key_to_ir()?;
    match &ir.fields[0].value {
        MatchEntryValue::Ternary(t) => {
            assert_eq!(t.value, ValueTypes::U32(50));
            assert_eq!(t.mask, ValueTypes::U32(u32::MAX));
        }
        x => panic!("expected a ternary field, found {x:?}"),
    }
    assert_eq!(RedirectKey::ir_to_key(&ir)?, key);
    Ok(())
}

#[test]
fn test_action_args() -> anyhow::Result<()> {
    let action = NeighborAction::SetNeighbor {
        neighbor: 10,
        ecmp_on: 0,
    };
    let ir = action.action_to_ir()?;
    assert_eq!(ir.action, "evpn_gw_control.set_neighbor");
    assert_eq!(ir.args[0].name, "neighbor");
    assert_eq!(ir.args[0].value, ValueTypes::U16(10));
    assert_eq!(ir.args[1].name, "ecmp_on");
    assert_eq!(NeighborAction::ir_to_action(&ir)?, action);

    let smac = MacAddr::new(0, 1, 2, 3, 4, 5);
    let dmac = MacAddr::new(0, 1, 2, 3, 4, 6);
    let action = NeighborAction::Rewrite { smac, dmac };
    let ir = action.action_to_ir()?;
    assert_eq!(ir.args[0].name, "smac");
    assert_eq!(ir.args[0].value.to_bytes(), vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(ir.args[1].name, "dmac");
    assert_eq!(NeighborAction::ir_to_action(&ir)?, action);
    Ok(())
}

#[test]
fn test_unknown_action() -> anyhow::Result<()> {
    let mut ir = NeighborAction::SetNeighbor {
        neighbor: 1,
        ecmp_on: 1,
    }
    .action_to_ir()?;
    ir.action = "evpn_gw_control.nonesuch".to_string();
    assert!(NeighborAction::ir_to_action(&ir).is_err());
    Ok(())
}

#[test]
fn test_operation() -> anyhow::Result<()> {
    let key = RouteKey {
        root: 1,
        dst_ip: prefix(),
    };
    let action = NeighborAction::SetNeighbor {
        neighbor: 2,
        ecmp_on: 0,
    };
    let add = TableOperation::add("t", &key, 1, &action)?;
    let del = TableOperation::delete("t", &key, 1)?;
    assert!(!add.is_delete());
    assert!(del.is_delete());
    assert_eq!(add.key, del.key);
    assert_eq!(
        del.to_string(),
        "del t[ipv4_table_lpm_root1=0x00000001,dst_ip=0x0a000000/24] prio 1"
    );
    Ok(())
}
