// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Rollback of pool changes made during a single translation.
//!
//! Every reference a translation takes or drops is recorded along with the
//! step needed to undo it.  If the translation fails before it is committed,
//! dropping the Txn replays those steps in reverse order, leaving the pools
//! exactly as they were when the translation started.

use std::fmt;

use aal::OpKind;
use aal::TableOperation;
use slog::debug;
use slog::error;
use slog::info;

use crate::idpool::Holder;
use crate::idpool::IndexPool;
use crate::idpool::RefChange;
use crate::table::OpList;
use crate::types::XlateError;
use crate::types::XlateResult;

type Undo<'a> = Box<dyn FnOnce() + 'a>;

pub(crate) struct Txn<'a> {
    log: slog::Logger,
    undo: Vec<Undo<'a>>,
    committed: bool,
}

impl<'a> Txn<'a> {
    pub(crate) fn new(log: &slog::Logger) -> Self {
        Txn {
            log: log.clone(),
            undo: Vec::new(),
            committed: false,
        }
    }

    /// Take (when adding) or drop (when deleting) an anonymous reference to
    /// `key`.
    pub(crate) fn bind<K, R>(
        &mut self,
        kind: OpKind,
        pool: &'a IndexPool<K, R>,
        key: &K,
    ) -> XlateResult<RefChange>
    where
        K: Ord + Clone + fmt::Debug + 'a,
        R: Ord + Clone + fmt::Debug + 'a,
    {
        self.hold(kind, pool, key, Holder::Anon)
    }

    /// Take or drop `subkey`'s reference to `key`
    pub(crate) fn bind_with_ref<K, R>(
        &mut self,
        kind: OpKind,
        pool: &'a IndexPool<K, R>,
        key: &K,
        subkey: &R,
    ) -> XlateResult<RefChange>
    where
        K: Ord + Clone + fmt::Debug + 'a,
        R: Ord + Clone + fmt::Debug + 'a,
    {
        self.hold(kind, pool, key, Holder::Named(subkey.clone()))
    }

    fn hold<K, R>(
        &mut self,
        kind: OpKind,
        pool: &'a IndexPool<K, R>,
        key: &K,
        holder: Holder<R>,
    ) -> XlateResult<RefChange>
    where
        K: Ord + Clone + fmt::Debug + 'a,
        R: Ord + Clone + fmt::Debug + 'a,
    {
        let change = match kind {
            OpKind::Add => pool.acquire(key, &holder)?,
            OpKind::Delete => pool.relinquish(key, &holder)?,
        };
        if change.changed {
            let key = key.clone();
            let id = change.id;
            let undo: Undo<'a> = match kind {
                OpKind::Add => Box::new(move || pool.revoke(&key, &holder)),
                OpKind::Delete => {
                    Box::new(move || pool.reinstate(&key, &holder, id))
                }
            };
            self.undo.push(undo);
        }
        Ok(change)
    }

    /// Keep every change made through this Txn
    pub(crate) fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Txn<'_> {
    fn drop(&mut self) {
        if self.committed || self.undo.is_empty() {
            return;
        }
        debug!(self.log, "rolling back pool changes";
            "changes" => self.undo.len());
        while let Some(undo) = self.undo.pop() {
            undo();
        }
    }
}

/// Run a single translation.  The operations are returned only if `build`
/// succeeds; otherwise every pool change it made is rolled back.  A
/// translation waiting on an unresolved dependency produces no operations.
pub(crate) fn atomically<'a, F>(
    log: &slog::Logger,
    kind: OpKind,
    object: &dyn fmt::Display,
    build: F,
) -> XlateResult<Vec<TableOperation>>
where
    F: FnOnce(&mut Txn<'a>, &mut OpList) -> XlateResult<()>,
{
    let mut txn = Txn::new(log);
    let mut ops = OpList::new(kind);
    match build(&mut txn, &mut ops) {
        Ok(()) => {
            txn.commit();
            let ops = ops.finish();
            debug!(log, "translated";
                "object" => %object,
                "kind" => ?kind,
                "ops" => ops.len());
            Ok(ops)
        }
        Err(XlateError::Unresolved(what)) => {
            info!(log, "skipping translation";
                "object" => %object,
                "kind" => ?kind,
                "unresolved" => what);
            Ok(Vec::new())
        }
        Err(e) => {
            error!(log, "translation failed";
                "object" => %object,
                "kind" => ?kind,
                "error" => %e);
            Err(e)
        }
    }
}

/// Treat an unresolved dependency as "nothing to program yet".  Used where
/// one translation is assembled from several independent parts.
pub(crate) fn skip_unresolved(
    log: &slog::Logger,
    result: XlateResult<()>,
) -> XlateResult<()> {
    match result {
        Err(XlateError::Unresolved(what)) => {
            info!(log, "skipping unresolved part"; "unresolved" => what);
            Ok(())
        }
        r => r,
    }
}

impl RefChange {
    /// Is this the first reference taken, or the last one dropped?  Entries
    /// shared by every holder of a key are only programmed or removed at
    /// those transitions.
    pub fn is_edge(&self, kind: OpKind) -> bool {
        self.changed
            && match kind {
                OpKind::Add => self.refcount == 1,
                OpKind::Delete => self.refcount == 0,
            }
    }
}
