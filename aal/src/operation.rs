// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::fmt;

use serde::Serialize;

use crate::ActionData;
use crate::ActionParse;
use crate::IrResult;
use crate::MatchData;
use crate::MatchParse;

/// A single mutation of a pipeline table.  This is the unit handed to the
/// protocol client: an operation carrying an action installs (or replaces) the
/// entry matching `key`, while an operation without one removes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableOperation {
    /// Fully qualified name of the table
    pub table: String,
    /// The entry's match key
    pub key: MatchData,
    /// Match priority.  Only meaningful for tables with lpm or ternary keys,
    /// where a lower value wins.
    pub priority: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionData>,
}

/// Is an operation installing or removing an entry?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Add,
    Delete,
}

impl TableOperation {
    /// Build an operation installing an entry
    pub fn add<M, A>(
        table: &str,
        key: &M,
        priority: i32,
        action: &A,
    ) -> IrResult<Self>
    where
        M: MatchParse,
        A: ActionParse,
    {
        Ok(TableOperation {
            table: table.to_string(),
            key: key.key_to_ir()?,
            priority,
            action: Some(action.action_to_ir()?),
        })
    }

    /// Build an operation removing an entry
    pub fn delete<M: MatchParse>(
        table: &str,
        key: &M,
        priority: i32,
    ) -> IrResult<Self> {
        Ok(TableOperation {
            table: table.to_string(),
            key: key.key_to_ir()?,
            priority,
            action: None,
        })
    }

    pub fn kind(&self) -> OpKind {
        match self.action {
            Some(_) => OpKind::Add,
            None => OpKind::Delete,
        }
    }

    pub fn is_delete(&self) -> bool {
        self.kind() == OpKind::Delete
    }
}

impl fmt::Display for TableOperation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.action {
            Some(a) => {
                let args: Vec<String> = a
                    .args
                    .iter()
                    .map(|arg| format!("{}={}", arg.name, arg.value))
                    .collect();
                write!(
                    f,
                    "add {}[{}] prio {} -> {}({})",
                    self.table,
                    self.key,
                    self.priority,
                    a.action,
                    args.join(",")
                )
            }
            None => write!(
                f,
                "del {}[{}] prio {}",
                self.table, self.key, self.priority
            ),
        }
    }
}

/// The TableWriter trait is the seam toward the protocol client that delivers
/// operations to the dataplane.  Operations must be applied in the order they
/// were produced.
pub trait TableWriter {
    fn apply(&mut self, op: &TableOperation) -> IrResult<()>;

    fn apply_all(&mut self, ops: &[TableOperation]) -> IrResult<()> {
        ops.iter().try_for_each(|op| self.apply(op))
    }
}
