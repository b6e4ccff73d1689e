// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! An in-memory model of the pipeline tables.  Operations are checked the
//! way the dataplane would check them: an entry may not be added twice or
//! removed when absent, and an entry may only chain a rewrite template that
//! is already programmed.  A template cannot be removed while anything
//! still uses it.

use std::collections::BTreeMap;
use std::convert::TryFrom;

use aal::ActionData;
use aal::IrError;
use aal::IrResult;
use aal::MatchData;
use aal::MatchEntryValue;
use aal::MatchParse;
use aal::TableOperation;
use aal::TableWriter;
use aal::ValueTypes;
use serde::Serialize;
use slog::debug;
use slog::warn;

use crate::objects::SaConfig;
use crate::table::ipsec::SadKey;
use crate::table::ipsec::SAD_INBOUND;
use crate::table::ipsec::SAD_OUTBOUND;
use crate::table::TableType;
use crate::table::IGNORE_PTR;

const MOD_PTR_KEY: &str = "meta.common.mod_blob_ptr";
const MOD_PTR_ARG: &str = "mod_ptr";

/// Basic statistics about table usage
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TableUsage {
    /// Current number of entries in the table
    pub occupancy: u32,
    /// Total number of entries inserted over time
    pub inserts: u64,
    /// Total number of entries deleted over time
    pub deletes: u64,
    /// Number of inserts failed due to a collision
    pub collisions: u64,
    /// Number of deletes failed due to a missing entry
    pub delete_misses: u64,
    /// Number of operations rejected for a modification pointer problem
    pub dangling: u64,
}

#[derive(Debug, Clone)]
struct Entry {
    priority: i32,
    action: Option<ActionData>,
}

#[derive(Default)]
struct SoftTable {
    usage: TableUsage,
    entries: BTreeMap<MatchData, Entry>,
}

pub struct SoftTables {
    log: slog::Logger,
    tables: BTreeMap<TableType, SoftTable>,
    // Number of entries chaining each programmed modification pointer
    mod_refs: BTreeMap<u32, u32>,
}

// The pointer an entry programs, if it lives in a rewrite table
fn programmed_ptr(table: TableType, key: &MatchData) -> IrResult<Option<u32>> {
    if !table.is_mod_table() {
        return Ok(None);
    }
    match &key.field_by_name(MOD_PTR_KEY)?.value {
        MatchEntryValue::Exact(ValueTypes::U32(ptr)) => Ok(Some(*ptr)),
        x => Err(IrError::InvalidArg(format!("bad {MOD_PTR_KEY}: {x}"))),
    }
}

// The pointer an entry's action chains, if any
fn chained_ptr(action: Option<&ActionData>) -> Option<u32> {
    let arg = action?.arg_by_name(MOD_PTR_ARG).ok()?;
    match arg.value {
        ValueTypes::U32(ptr) if ptr != IGNORE_PTR => Some(ptr),
        _ => None,
    }
}

impl SoftTables {
    pub fn new(log: &slog::Logger) -> Self {
        SoftTables {
            log: log.new(slog::o!("unit" => "soft_tables")),
            tables: BTreeMap::new(),
            mod_refs: BTreeMap::new(),
        }
    }

    /// Total number of entries across every table
    pub fn len(&self) -> usize {
        self.tables.values().map(|t| t.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The action of the entry matching `key`, if it exists
    pub fn get(
        &self,
        table: TableType,
        key: &MatchData,
    ) -> Option<(i32, Option<&ActionData>)> {
        let entry = self.tables.get(&table)?.entries.get(key)?;
        Some((entry.priority, entry.action.as_ref()))
    }

    /// Usage of every table touched so far
    pub fn usage(&self) -> BTreeMap<String, TableUsage> {
        self.tables
            .iter()
            .map(|(t, soft)| (t.name().to_string(), soft.usage.clone()))
            .collect()
    }

    /// Number of entries chaining `ptr`, or None if nothing programs it
    pub fn mod_refs(&self, ptr: u32) -> Option<u32> {
        self.mod_refs.get(&ptr).copied()
    }

    /// Model the crypto engine installing an SA's database entry
    pub fn install_sa(&mut self, sa: &SaConfig) -> IrResult<()> {
        let key = SadKey {
            offload_id: sa.offload_id,
            direction: if sa.inbound { SAD_INBOUND } else { SAD_OUTBOUND },
        };
        self.insert(TableType::IpsecSaConfig, key.key_to_ir()?, 0, None)
    }

    fn insert(
        &mut self,
        table: TableType,
        key: MatchData,
        priority: i32,
        action: Option<ActionData>,
    ) -> IrResult<()> {
        let programs = programmed_ptr(table, &key)?;
        let chains = chained_ptr(action.as_ref());
        let soft = self.tables.entry(table).or_default();

        if soft.entries.contains_key(&key) {
            soft.usage.collisions += 1;
            return Err(IrError::Exists(format!("{table}[{key}]")));
        }
        if let Some(ptr) = chains {
            match self.mod_refs.get_mut(&ptr) {
                Some(refs) => *refs += 1,
                None => {
                    soft.usage.dangling += 1;
                    return Err(IrError::InvalidArg(format!(
                        "{table}[{key}] chains unprogrammed pointer {ptr}"
                    )));
                }
            }
        }
        if let Some(ptr) = programs {
            self.mod_refs.insert(ptr, 0);
        }

        soft.entries.insert(key, Entry { priority, action });
        soft.usage.occupancy += 1;
        soft.usage.inserts += 1;
        Ok(())
    }

    fn remove(&mut self, table: TableType, key: &MatchData) -> IrResult<()> {
        let programs = programmed_ptr(table, key)?;
        let soft = self.tables.entry(table).or_default();

        let Some(entry) = soft.entries.get(key) else {
            soft.usage.delete_misses += 1;
            return Err(IrError::Missing(format!("{table}[{key}]")));
        };
        if let Some(ptr) = programs {
            let refs = self.mod_refs.get(&ptr).copied().unwrap_or(0);
            if refs > 0 {
                soft.usage.dangling += 1;
                return Err(IrError::InvalidArg(format!(
                    "pointer {ptr} in {table} is still chained by {refs} \
                     entries"
                )));
            }
            self.mod_refs.remove(&ptr);
        }
        if let Some(ptr) = chained_ptr(entry.action.as_ref()) {
            if let Some(refs) = self.mod_refs.get_mut(&ptr) {
                *refs = refs.saturating_sub(1);
            }
        }

        soft.entries.remove(key);
        soft.usage.occupancy -= 1;
        soft.usage.deletes += 1;
        Ok(())
    }
}

impl TableWriter for SoftTables {
    fn apply(&mut self, op: &TableOperation) -> IrResult<()> {
        let table = TableType::try_from(op.table.as_str())
            .map_err(|e| IrError::InvalidArg(e.to_string()))?;
        let result = match &op.action {
            Some(_) => self.insert(
                table,
                op.key.clone(),
                op.priority,
                op.action.clone(),
            ),
            None => self.remove(table, &op.key),
        };
        match &result {
            Ok(()) => debug!(self.log, "applied"; "op" => %op),
            Err(e) => warn!(self.log, "rejected"; "op" => %op, "error" => %e),
        }
        result
    }
}
