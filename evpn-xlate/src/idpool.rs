// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Reference-counted allocation of hardware indices.
//!
//! An IndexPool hands out integers from a fixed range `[min, max)` and binds
//! each one to a key.  Asking for the same key again returns the same id and
//! bumps its reference count; the id only goes back into the pool when the
//! last reference is dropped.  Holders of a key are either anonymous, or are
//! named by a subkey.  A named holder is counted once, no matter how many
//! times it registers.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use parking_lot::Mutex;
use slog::debug;
use slog::error;

use crate::types::XlateError;
use crate::types::XlateResult;

/// Identifies one holder of a key's reference
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Holder<R> {
    Anon,
    Named(R),
}

/// The outcome of taking or dropping a reference
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RefChange {
    /// The id bound to the key
    pub id: u32,
    /// The key's reference count after the change
    pub refcount: u32,
    /// Did the call change the pool?  Re-registering a named holder, or
    /// releasing one that was never registered, leaves it untouched.
    pub changed: bool,
}

// A single key's binding
#[derive(Debug)]
struct Binding<R> {
    id: u32,
    anon: u32,
    named: BTreeSet<R>,
}

impl<R> Binding<R> {
    fn new(id: u32) -> Self {
        Binding {
            id,
            anon: 0,
            named: BTreeSet::new(),
        }
    }

    fn refcount(&self) -> u32 {
        self.anon + self.named.len() as u32
    }
}

#[derive(Debug)]
struct PoolState<K, R> {
    keys: BTreeMap<K, Binding<R>>,
    // Released ids below `next`
    freed: BTreeSet<u32>,
    // Lowest id that has never been handed out
    next: u32,
}

impl<K, R> PoolState<K, R> {
    // Take the lowest free id
    fn alloc(&mut self, max: u32) -> Option<u32> {
        if let Some(id) = self.freed.pop_first() {
            Some(id)
        } else if self.next < max {
            self.next += 1;
            Some(self.next - 1)
        } else {
            None
        }
    }

    // Return an id to the pool.  Freed ids at the top of the allocated range
    // are folded back into `next`, so the state only depends on which ids are
    // bound.
    fn free(&mut self, id: u32) {
        self.freed.insert(id);
        while self.next > 0 && self.freed.remove(&(self.next - 1)) {
            self.next -= 1;
        }
    }

    // Mark a specific id as bound again
    fn claim(&mut self, id: u32) {
        if id >= self.next {
            self.freed.extend(self.next..id);
            self.next = id + 1;
        } else {
            self.freed.remove(&id);
        }
    }
}

pub struct IndexPool<K, R = ()> {
    name: String,
    log: slog::Logger,
    min: u32,
    max: u32,
    state: Mutex<PoolState<K, R>>,
}

impl<K, R> IndexPool<K, R>
where
    K: Ord + Clone + fmt::Debug,
    R: Ord + Clone + fmt::Debug,
{
    /// Create a pool handing out ids in `[min, max)`
    pub fn new(
        log: &slog::Logger,
        name: impl ToString,
        min: u32,
        max: u32,
    ) -> XlateResult<Self> {
        let name = name.to_string();
        if min >= max {
            return Err(XlateError::InvalidConfiguration(format!(
                "pool {name}: empty range [{min}, {max})"
            )));
        }
        let log = log.new(slog::o!("unit" => format!("idpool_{name}")));
        debug!(log, "created new index pool"; "min" => min, "max" => max);
        Ok(IndexPool {
            name,
            log,
            min,
            max,
            state: Mutex::new(PoolState {
                keys: BTreeMap::new(),
                freed: BTreeSet::new(),
                next: min,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of ids the pool can hand out
    pub fn capacity(&self) -> u32 {
        self.max - self.min
    }

    /// Number of ids currently bound to a key
    pub fn in_use(&self) -> usize {
        self.state.lock().keys.len()
    }

    /// Return the id bound to `key`, allocating one if needed, and take an
    /// anonymous reference to it.
    pub fn get(&self, key: &K) -> XlateResult<u32> {
        self.acquire(key, &Holder::Anon).map(|c| c.id)
    }

    /// Return the id bound to `key` and register `subkey` as one of its
    /// holders.  Returns the id and the key's resulting reference count.
    pub fn get_with_ref(&self, key: &K, subkey: &R) -> XlateResult<(u32, u32)> {
        self.acquire(key, &Holder::Named(subkey.clone()))
            .map(|c| (c.id, c.refcount))
    }

    /// Drop an anonymous reference to `key`, returning the id it was bound
    /// to.  The id is freed when no references remain.
    pub fn release(&self, key: &K) -> XlateResult<u32> {
        self.relinquish(key, &Holder::Anon).map(|c| c.id)
    }

    /// Drop `subkey`'s reference to `key`.  Returns the id and the key's
    /// remaining reference count.
    pub fn release_with_ref(
        &self,
        key: &K,
        subkey: &R,
    ) -> XlateResult<(u32, u32)> {
        self.relinquish(key, &Holder::Named(subkey.clone()))
            .map(|c| (c.id, c.refcount))
    }

    /// Return the id bound to `key` without changing anything
    pub fn lookup(&self, key: &K) -> Option<u32> {
        self.state.lock().keys.get(key).map(|b| b.id)
    }

    /// Current number of references to `key`
    pub fn refcount(&self, key: &K) -> u32 {
        self.state.lock().keys.get(key).map_or(0, |b| b.refcount())
    }

    pub(crate) fn acquire(
        &self,
        key: &K,
        holder: &Holder<R>,
    ) -> XlateResult<RefChange> {
        let mut state = self.state.lock();

        let bound = state.keys.get(key).map(|b| b.id);
        let (id, new) = match bound {
            Some(id) => (id, false),
            None => match state.alloc(self.max) {
                Some(id) => (id, true),
                None => {
                    return Err(XlateError::ResourceExhausted(format!(
                        "pool {} has no free ids for {key:?}",
                        self.name
                    )))
                }
            },
        };
        let binding = state.keys.entry(key.clone()).or_insert(Binding::new(id));
        let changed = match holder {
            Holder::Anon => {
                binding.anon += 1;
                true
            }
            Holder::Named(r) => binding.named.insert(r.clone()),
        };
        let refcount = binding.refcount();
        if new {
            debug!(self.log, "allocated id";
                "key" => ?key,
                "id" => id);
        }
        Ok(RefChange {
            id,
            refcount,
            changed,
        })
    }

    pub(crate) fn relinquish(
        &self,
        key: &K,
        holder: &Holder<R>,
    ) -> XlateResult<RefChange> {
        let mut state = self.state.lock();

        let binding = state.keys.get_mut(key).ok_or_else(|| {
            XlateError::NotFound(format!(
                "pool {}: no id bound to {key:?}",
                self.name
            ))
        })?;
        let held = match holder {
            Holder::Anon if binding.anon > 0 => {
                binding.anon -= 1;
                true
            }
            Holder::Anon => false,
            Holder::Named(r) => binding.named.remove(r),
        };
        if !held {
            return Err(XlateError::NotFound(format!(
                "pool {}: {key:?} is not held by {holder:?}",
                self.name
            )));
        }

        let id = binding.id;
        let refcount = binding.refcount();
        if refcount == 0 {
            state.keys.remove(key);
            state.free(id);
            debug!(self.log, "freed id";
                "key" => ?key,
                "id" => id);
        }
        Ok(RefChange {
            id,
            refcount,
            changed: true,
        })
    }

    // Put back a reference dropped by relinquish(), binding the key to the
    // same id it had before.
    pub(crate) fn reinstate(&self, key: &K, holder: &Holder<R>, id: u32) {
        let mut state = self.state.lock();

        if !state.keys.contains_key(key) {
            state.claim(id);
            state.keys.insert(key.clone(), Binding::new(id));
        }
        if let Some(binding) = state.keys.get_mut(key) {
            if binding.id != id {
                error!(self.log, "reinstated key bound to a different id";
                    "key" => ?key,
                    "id" => id,
                    "bound" => binding.id);
            }
            match holder {
                Holder::Anon => binding.anon += 1,
                Holder::Named(r) => {
                    binding.named.insert(r.clone());
                }
            }
        }
    }

    // Drop a reference taken by acquire()
    pub(crate) fn revoke(&self, key: &K, holder: &Holder<R>) {
        if let Err(e) = self.relinquish(key, holder) {
            error!(self.log, "failed to roll back reference";
                "key" => ?key,
                "error" => %e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn new_pool<R>(min: u32, max: u32) -> IndexPool<String, R>
    where
        R: Ord + Clone + fmt::Debug,
    {
        IndexPool::new(&crate::test_logger(), "test", min, max).unwrap()
    }

    fn key(s: &str) -> String {
        s.to_string()
    }

    // Test simple allocation
    #[test]
    fn test_basic() -> anyhow::Result<()> {
        let pool = new_pool::<()>(2, 10);

        assert_eq!(pool.get(&key("a"))?, 2);
        assert_eq!(pool.get(&key("b"))?, 3);
        assert_eq!(pool.lookup(&key("a")), Some(2));
        assert_eq!(pool.lookup(&key("c")), None);
        assert_eq!(pool.in_use(), 2);
        Ok(())
    }

    // Repeated requests for the same key share one id
    #[test]
    fn test_idempotent() -> anyhow::Result<()> {
        let pool = new_pool::<()>(1, 10);

        let a = pool.get(&key("a"))?;
        assert_eq!(pool.get(&key("a"))?, a);
        assert_eq!(pool.refcount(&key("a")), 2);

        assert_eq!(pool.release(&key("a"))?, a);
        assert_eq!(pool.lookup(&key("a")), Some(a));
        assert_eq!(pool.release(&key("a"))?, a);
        assert_eq!(pool.lookup(&key("a")), None);
        assert_eq!(pool.in_use(), 0);
        Ok(())
    }

    // A freed id is the first one handed out again
    #[test]
    fn test_reuse_lowest() -> anyhow::Result<()> {
        let pool = new_pool::<()>(1, 10);

        pool.get(&key("a"))?;
        let b = pool.get(&key("b"))?;
        pool.get(&key("c"))?;
        pool.release(&key("b"))?;
        assert_eq!(pool.get(&key("d"))?, b);
        Ok(())
    }

    #[test]
    fn test_exhaustion() -> anyhow::Result<()> {
        let pool = new_pool::<()>(5, 9);

        for i in 0..pool.capacity() {
            pool.get(&format!("key{i}"))?;
        }
        assert!(matches!(
            pool.get(&key("extra")),
            Err(XlateError::ResourceExhausted(_))
        ));

        // Releasing one key makes room for exactly one more
        pool.release(&key("key2"))?;
        assert_eq!(pool.get(&key("extra"))?, 7);
        assert!(matches!(
            pool.get(&key("another")),
            Err(XlateError::ResourceExhausted(_))
        ));
        Ok(())
    }

    #[test]
    fn test_release_missing() -> anyhow::Result<()> {
        let pool = new_pool::<u32>(1, 4);

        assert!(matches!(
            pool.release(&key("a")),
            Err(XlateError::NotFound(_))
        ));

        // A key held only by named references has no anonymous holder
        pool.get_with_ref(&key("a"), &1)?;
        assert!(matches!(
            pool.release(&key("a")),
            Err(XlateError::NotFound(_))
        ));
        assert!(matches!(
            pool.release_with_ref(&key("a"), &2),
            Err(XlateError::NotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn test_named_refs() -> anyhow::Result<()> {
        let pool = new_pool::<u32>(1, 4);

        assert_eq!(pool.get_with_ref(&key("a"), &10)?, (1, 1));
        // The same holder only counts once
        assert_eq!(pool.get_with_ref(&key("a"), &10)?, (1, 1));
        assert_eq!(pool.get_with_ref(&key("a"), &11)?, (1, 2));

        assert_eq!(pool.release_with_ref(&key("a"), &10)?, (1, 1));
        assert_eq!(pool.release_with_ref(&key("a"), &11)?, (1, 0));
        assert_eq!(pool.lookup(&key("a")), None);
        Ok(())
    }

    // Undoing a release puts the key back on its old id
    #[test]
    fn test_reinstate() -> anyhow::Result<()> {
        let pool = new_pool::<u32>(1, 8);

        pool.get(&key("a"))?;
        let b = pool.get(&key("b"))?;
        pool.release(&key("b"))?;
        pool.reinstate(&key("b"), &Holder::Anon, b);
        assert_eq!(pool.lookup(&key("b")), Some(b));
        assert_eq!(pool.get(&key("c"))?, b + 1);

        pool.release_with_ref(&key("d"), &1).unwrap_err();
        let (d, _) = pool.get_with_ref(&key("d"), &1)?;
        pool.release_with_ref(&key("d"), &1)?;
        pool.reinstate(&key("d"), &Holder::Named(1), d);
        assert_eq!(pool.get_with_ref(&key("d"), &2)?, (d, 2));
        Ok(())
    }
}
