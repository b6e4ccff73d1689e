// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Weighted spreading of a route's traffic across its nexthops.
//!
//! An ECMP group owns a fixed set of hash slots.  Slots are handed out to
//! the members with the Sainte-Laguë (Webster) divisor method: every member
//! starts with a divisor of 1, and each slot goes to the member with the
//! largest weight/divisor quotient, whose divisor then grows by 2.  Ties go
//! to the member listed first.

use std::cmp::Ordering;

use crate::nexthop::group_p4_id;
use crate::nexthop::Direction;
use crate::nexthop::Directions;
use crate::nexthop::Nexthop;
use crate::types::XlateError;
use crate::types::XlateResult;

/// Number of hash slots in every ECMP group
pub const ECMP_SLOTS: usize = 16;

// weight / divisor, kept as a fraction so comparisons are exact
#[derive(Clone, Copy, Debug)]
struct Quotient {
    weight: u64,
    divisor: u64,
}

impl Quotient {
    fn cmp(&self, other: &Quotient) -> Ordering {
        (self.weight * other.divisor).cmp(&(other.weight * self.divisor))
    }
}

/// Assign each of `slots` slots to one of the weighted members.  The result
/// holds, for each slot in order, the index of the member that owns it.
pub fn apportion(weights: &[u32], slots: usize) -> Vec<usize> {
    let mut quotients: Vec<Quotient> = weights
        .iter()
        .map(|w| Quotient {
            weight: u64::from(*w),
            divisor: 1,
        })
        .collect();
    let mut assigned = Vec::with_capacity(slots);
    if quotients.is_empty() {
        return assigned;
    }

    for _ in 0..slots {
        let mut best = 0;
        for (idx, q) in quotients.iter().enumerate().skip(1) {
            if q.cmp(&quotients[best]) == Ordering::Greater {
                best = idx;
            }
        }
        assigned.push(best);
        quotients[best].divisor += 2;
    }
    assigned
}

/// The nexthops of a multipath route, treated as a single neighbor
#[derive(Debug)]
pub struct EcmpGroup<'a> {
    members: &'a [Nexthop],
    direction: Direction,
}

impl<'a> EcmpGroup<'a> {
    /// Build a group from its members.  Every member must forward in the same
    /// direction; a member covering both directions counts as tx.
    pub fn new(members: &'a [Nexthop]) -> XlateResult<Self> {
        let rx = members
            .iter()
            .filter(|nh| nh.direction == Directions::Rx)
            .count();
        let direction = if rx == members.len() {
            Direction::Rx
        } else if rx == 0 {
            Direction::Tx
        } else {
            let ids: Vec<u32> = members.iter().map(|nh| nh.id).collect();
            return Err(XlateError::InvalidConfiguration(format!(
                "ecmp group {ids:?} mixes rx-only and tx members"
            )));
        };
        Ok(EcmpGroup { members, direction })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The ordered member ids, which identify the group in the ecmp pool
    pub fn signature(&self) -> Vec<u32> {
        self.members.iter().map(|nh| nh.id).collect()
    }

    /// The neighbor id of the group itself, for an entry programmed for `dir`
    pub fn p4_id(&self, group_id: u32, dir: Direction) -> XlateResult<u16> {
        group_p4_id(group_id, self.direction, dir)
    }

    /// The directions the group's selection entries are programmed for
    pub fn selection_directions(&self) -> &'static [Direction] {
        match self.direction {
            Direction::Rx => &[Direction::Rx],
            Direction::Tx => &[Direction::Rx, Direction::Tx],
        }
    }

    /// The member owning each hash slot
    pub fn slots(&self) -> Vec<&'a Nexthop> {
        let weights: Vec<u32> =
            self.members.iter().map(|nh| nh.weight).collect();
        apportion(&weights, ECMP_SLOTS)
            .into_iter()
            .map(|idx| &self.members[idx])
            .collect()
    }
}
