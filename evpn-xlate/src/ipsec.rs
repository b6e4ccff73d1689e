// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! IPsec: security associations, encrypted tunnel representors, and the
//! encrypting nexthops.

use std::sync::Arc;

use aal::OpKind;
use aal::TableOperation;
use slog::debug;

use crate::config::Config;
use crate::nexthop::Direction;
use crate::nexthop::Nexthop;
use crate::nexthop::NexthopKind;
use crate::objects::Sa;
use crate::objects::SaConfig;
use crate::objects::TunnelRep;
use crate::objects::Vrf;
use crate::pools::ModPtrKey;
use crate::pools::Pools;
use crate::store::ObjectStore;
use crate::table::ingress::VsiVidKey;
use crate::table::ipsec::DecryptedAction;
use crate::table::ipsec::DecryptedKey;
use crate::table::ipsec::DecryptedVxlanKey;
use crate::table::ipsec::SaClassificationAction;
use crate::table::ipsec::SaClassificationKey;
use crate::table::ipsec::SadKey;
use crate::table::ipsec::TunnelAction;
use crate::table::ipsec::CRYPTO_OK;
use crate::table::ipsec::SAD_INBOUND;
use crate::table::ipsec::SAD_OUTBOUND;
use crate::table::nexthop::NeighborKey;
use crate::table::nexthop::NexthopAction;
use crate::table::nexthop::P2P_QID;
use crate::table::rewrite::ModAction;
use crate::table::rewrite::ModBlobKey;
use crate::table::tcam_prefix;
use crate::table::OpList;
use crate::table::TableType;
use crate::table::IGNORE_PTR;
use crate::txn::atomically;
use crate::txn::Txn;
use crate::types::narrow16;
use crate::types::validate_vni;
use crate::types::XlateError;
use crate::types::XlateResult;

pub struct IpsecDecoder {
    log: slog::Logger,
    config: Arc<Config>,
    pools: Arc<Pools>,
}

impl IpsecDecoder {
    pub fn new(
        log: &slog::Logger,
        config: Arc<Config>,
        pools: Arc<Pools>,
    ) -> Self {
        IpsecDecoder {
            log: log.new(slog::o!("unit" => "ipsec")),
            config,
            pools,
        }
    }

    /// Translate an SA add or delete.  An add also returns the descriptor
    /// used to install the SA in the crypto engine.
    pub fn translate_sa(
        &self,
        store: &dyn ObjectStore,
        sa: &Sa,
        kind: OpKind,
    ) -> XlateResult<(Vec<TableOperation>, Option<SaConfig>)> {
        let sa_config = match kind {
            OpKind::Add => {
                let config = SaConfig::try_from(sa)?;
                debug!(self.log, "sa config";
                    "offload_id" => config.offload_id,
                    "inbound" => config.inbound,
                    "spi" => config.spi,
                    "algorithm" => config.encryption_algorithm);
                Some(config)
            }
            OpKind::Delete => None,
        };
        let what = format!("sa {}", sa.index);
        let ops = atomically(&self.log, kind, &what, |_, ops| {
            self.sa_ops(ops, store, sa)
        })?;
        Ok((ops, sa_config))
    }

    pub fn translate_tunnel(
        &self,
        tun: &TunnelRep,
        kind: OpKind,
    ) -> XlateResult<Vec<TableOperation>> {
        let what = format!("tunnel {}", tun.if_id);
        atomically(&self.log, kind, &what, |txn, ops| {
            self.tunnel_ops(txn, ops, tun)
        })
    }

    pub fn translate_vrf(
        &self,
        vrf: &Vrf,
        kind: OpKind,
    ) -> XlateResult<Vec<TableOperation>> {
        let what = format!("vrf {}", vrf.name);
        atomically(&self.log, kind, &what, |_, ops| self.vrf_ops(ops, vrf))
    }

    pub fn translate_nexthop(
        &self,
        nh: &Nexthop,
        kind: OpKind,
    ) -> XlateResult<Vec<TableOperation>> {
        let what = format!("{} nexthop {}", nh.kind.name(), nh.id);
        atomically(&self.log, kind, &what, |txn, ops| {
            self.nexthop_ops(txn, ops, nh)
        })
    }

    pub(crate) fn sa_ops(
        &self,
        ops: &mut OpList,
        store: &dyn ObjectStore,
        sa: &Sa,
    ) -> XlateResult<()> {
        if sa.is_inbound() {
            ops.push(
                TableType::IpsecRxSaClassification,
                &SaClassificationKey {
                    src_ip: sa.src_ip,
                    dst_ip: sa.dst_ip,
                    spi: sa.spi,
                },
                0,
                &SaClassificationAction::Decrypt { sa_idx: sa.index },
            )?;

            let key = DecryptedKey {
                crypto_status: CRYPTO_OK,
                sa_idx: sa.index,
            };
            // The VRF may already be gone when the SA is removed
            if ops.is_delete() {
                ops.push_removal(TableType::PhyIngressIpIp, &key, 0)?;
            } else {
                let vrf = store.vrf(&sa.vrf)?;
                let action = DecryptedAction::PopOuterIpSetVrfId {
                    mod_ptr: IGNORE_PTR,
                    tcam_prefix: tcam_prefix(vrf.vrf_id(), Direction::Rx)?,
                    vrf: vrf.vrf_id(),
                };
                ops.push(TableType::PhyIngressIpIp, &key, 0, &action)?;
            }
        }

        // The SA database entry is installed through the SA descriptor, but
        // removed like any other entry
        let sad = SadKey {
            offload_id: sa.index,
            direction: if sa.is_inbound() {
                SAD_INBOUND
            } else {
                SAD_OUTBOUND
            },
        };
        ops.push_removal(TableType::IpsecSaConfig, &sad, 0)
    }

    pub(crate) fn tunnel_ops<'a>(
        &'a self,
        txn: &mut Txn<'a>,
        ops: &mut OpList,
        tun: &TunnelRep,
    ) -> XlateResult<()> {
        let dst_mac = tun.dst_mac.ok_or_else(|| {
            XlateError::Unresolved(format!(
                "next hop mac of tunnel {}",
                tun.if_id
            ))
        })?;
        let sa_idx = tun.sa_idx.ok_or_else(|| {
            XlateError::Unresolved(format!("sa of tunnel {}", tun.if_id))
        })?;
        let reps = &self.config.representors;
        let port_id = reps.phy_vsi_by_mac(tun.src_mac).unwrap_or(0);
        let vid = narrow16("tunnel interface id", tun.if_id)?;

        let mod_ptr = self.pools.bind_mod_ptr(
            txn,
            ops.kind(),
            ModPtrKey::Tunnel(tun.if_id),
        )?;
        ops.push(
            TableType::PopVlanPushOuterMacIpMod,
            &ModBlobKey::new(mod_ptr),
            0,
            &ModAction::PopVlanPushOuterMacIp {
                src_ip: tun.src_ip,
                dst_ip: tun.dst_ip,
                smac: tun.src_mac,
                dmac: dst_mac,
            },
        )?;
        ops.push(
            TableType::TaggedVportIngress,
            &VsiVidKey {
                vsi: reps.tunnel_mux.vsi,
                vid,
            },
            0,
            &TunnelAction::PopVlanPushOuterMacIp {
                mod_ptr,
                port_id: u32::from(port_id),
                sa_idx,
            },
        )
    }

    /// Terminate decrypted VXLAN traffic for the VRF
    pub(crate) fn vrf_ops(
        &self,
        ops: &mut OpList,
        vrf: &Vrf,
    ) -> XlateResult<()> {
        let Some(vni) = vrf.vni else {
            return Ok(());
        };
        let vtep = vrf.vtep_ip.ok_or_else(|| {
            XlateError::InvalidConfiguration(format!(
                "vrf {} has a vni but no vtep address",
                vrf.name
            ))
        })?;
        let router_mac = vrf.router_mac.ok_or_else(|| {
            XlateError::Unresolved(format!("router mac of vrf {}", vrf.name))
        })?;

        let key = DecryptedVxlanKey {
            crypto_status: CRYPTO_OK,
            dst_ip: vtep,
            vni: validate_vni(vni)?,
            da: router_mac,
        };
        let action = DecryptedAction::PopOmacIpVxlanSetVrfId {
            mod_ptr: IGNORE_PTR,
            tcam_prefix: tcam_prefix(vrf.vrf_id(), Direction::Rx)?,
            vrf: vrf.vrf_id(),
        };
        ops.push(TableType::PhyIngressIpVxlan, &key, 0, &action)
    }

    pub(crate) fn nexthop_ops<'a>(
        &'a self,
        txn: &mut Txn<'a>,
        ops: &mut OpList,
        nh: &Nexthop,
    ) -> XlateResult<()> {
        let (template, vport, sa_idx) = match &nh.kind {
            NexthopKind::IpTunnel(tun) => (
                (
                    TableType::CryptoTunnelIpMod,
                    ModAction::CryptoTunnelIp {
                        smac: tun.phy_smac,
                        dmac: tun.phy_dmac,
                        local_tep: tun.local_tep,
                        remote_tep: tun.remote_tep,
                    },
                ),
                tun.egress_vport,
                tun.sa_idx,
            ),
            NexthopKind::VxlanTunnel(tun) => (
                (
                    TableType::OmacCryptoVxlanImacPushMod,
                    ModAction::OmacCryptoVxlanImacPush {
                        smac: tun.phy_smac,
                        dmac: tun.phy_dmac,
                        local_tep: tun.local_tep,
                        remote_tep: tun.remote_tep,
                        local_vtep: tun.local_vtep,
                        remote_vtep: tun.remote_vtep,
                        dst_port: self.config.vxlan_udp_port,
                        vni: validate_vni(tun.vni)?,
                        inner_smac: tun.inner_smac,
                        inner_dmac: tun.inner_dmac,
                    },
                ),
                tun.egress_vport,
                tun.sa_idx,
            ),
            _ => return Ok(()),
        };
        let rx = NeighborKey::new(nh.p4_id(Direction::Rx)?);
        let tx = NeighborKey::new(nh.p4_id(Direction::Tx)?);

        let mod_ptr = self.pools.bind_mod_ptr(
            txn,
            ops.kind(),
            ModPtrKey::L3Nexthop(nh.key.clone()),
        )?;
        let (table, action) = template;
        ops.push(table, &ModBlobKey::new(mod_ptr), 0, &action)?;

        let encrypt = match nh.kind {
            NexthopKind::VxlanTunnel(_) => {
                NexthopAction::PushCryptoOuterMacVxlanInnerMac {
                    mod_ptr,
                    vport,
                    sa_idx,
                }
            }
            _ => NexthopAction::SetCryptoIp {
                mod_ptr,
                sa_idx,
                vport,
            },
        };
        ops.push(TableType::L3NexthopTx, &tx, 0, &encrypt)?;
        ops.push(
            TableType::L3NexthopRx,
            &rx,
            0,
            &NexthopAction::SendP2p {
                vport,
                q_id: u32::from(P2P_QID),
            },
        )?;
        ops.push(TableType::IngressP2p, &rx, 0, &encrypt)
    }
}
