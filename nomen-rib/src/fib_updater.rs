//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;

use nomen_utils::ibus::FibUpdate;
use nomen_utils::name::Name;
use tracing::trace;

use crate::rib::Rib;
use crate::update::{
    RibUpdate, RibUpdateAction, RibUpdateBatch, Route,
};

/// The projection of a RIB update batch: the FIB next-hop mutations to
/// issue, and the inherited-route cache updates to apply to the RIB once
/// the batch succeeds.
#[derive(Clone, Debug, Default)]
pub struct FibUpdaterOutput {
    pub fib_updates: Vec<FibUpdate>,
    pub inherited_updates: Vec<RibUpdate>,
}

/// Computes the exact FIB update sequence for a RIB update batch.
///
/// The batch is applied to a scratch copy of the RIB; the effective
/// next-hops of every prefix in the affected subtrees are compared before
/// and after, yielding the minimal add/remove set in deterministic order
/// (name, face, cost, action).
pub fn compute_updates(rib: &Rib, batch: &RibUpdateBatch) -> FibUpdaterOutput {
    let mut after = rib.clone();
    for update in &batch.updates {
        match update.action {
            RibUpdateAction::Register => {
                after.insert(&update.name, update.route);
            }
            RibUpdateAction::Unregister | RibUpdateAction::RemoveFace => {
                after.erase(&update.name, &update.route);
            }
        }
    }

    // Inheritance can only change at the updated prefixes and below.
    let mut affected: BTreeSet<Name> = BTreeSet::new();
    for update in &batch.updates {
        affected.insert(update.name.clone());
        for (name, _) in rib.descendants(&update.name) {
            affected.insert(name.clone());
        }
        for (name, _) in after.descendants(&update.name) {
            affected.insert(name.clone());
        }
    }

    let mut output = FibUpdaterOutput::default();
    for name in &affected {
        let before_hops = rib.effective_nexthops(name);
        let after_hops = after.effective_nexthops(name);

        for (face_id, cost) in &after_hops {
            if before_hops.get(face_id) != Some(cost) {
                output.fib_updates.push(FibUpdate::add_nexthop(
                    name.clone(),
                    *face_id,
                    *cost,
                ));
            }
        }
        for face_id in before_hops.keys() {
            if !after_hops.contains_key(face_id) {
                output
                    .fib_updates
                    .push(FibUpdate::remove_nexthop(name.clone(), *face_id));
            }
        }

        diff_inherited(rib, &after, name, &mut output.inherited_updates);
    }

    output.fib_updates.sort();
    trace!(
        n_fib = output.fib_updates.len(),
        n_inherited = output.inherited_updates.len(),
        "computed FIB updates"
    );
    output
}

// Diffs the cached inherited-route set of `name` against the ancestor
// routes it will have once the batch is applied.
fn diff_inherited(
    before: &Rib,
    after: &Rib,
    name: &Name,
    inherited_updates: &mut Vec<RibUpdate>,
) {
    let new_inherited = match after.entry(name) {
        Some(_) => after.ancestor_routes(name),
        // The entry disappears with the batch; its cache goes with it.
        None => return,
    };
    let old_inherited: Vec<Route> = before
        .entry(name)
        .map(|entry| entry.inherited_routes().to_vec())
        .unwrap_or_default();

    let same_identity = |a: &Route, b: &Route| {
        a.face_id == b.face_id && a.origin == b.origin
    };
    for route in &new_inherited {
        if !old_inherited.iter().any(|old| old == route) {
            inherited_updates.push(RibUpdate::new(
                RibUpdateAction::Register,
                name.clone(),
                *route,
            ));
        }
    }
    for route in &old_inherited {
        if !new_inherited.iter().any(|new| same_identity(new, route)) {
            inherited_updates.push(RibUpdate::new(
                RibUpdateAction::Unregister,
                name.clone(),
                *route,
            ));
        }
    }
}
