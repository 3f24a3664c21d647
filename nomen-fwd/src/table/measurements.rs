//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use nomen_utils::name::Name;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

use crate::name_tree::{EntryIndex, NameTree};
use crate::table::strategy_info::StrategyInfoHost;
use crate::tasks::{self, FwMsg};

/// A Measurements entry, created on demand by strategies and self-deleting
/// when its lifetime expires.
#[derive(Debug)]
pub struct Entry {
    name: Name,
    expiry: Instant,
    cleanup: Option<nomen_utils::task::TimeoutTask>,
    pub strategy_info: StrategyInfoHost,
}

/// The Measurements table: per-prefix state slots for strategies.
#[derive(Debug)]
pub struct Measurements {
    n_items: usize,
    fw_msgp: UnboundedSender<FwMsg>,
}

// ===== impl Entry =====

impl Entry {
    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn expiry(&self) -> Instant {
        self.expiry
    }
}

// ===== impl Measurements =====

impl Measurements {
    /// Lifetime granted to a new entry and the minimum extension unit.
    pub const INITIAL_LIFETIME: Duration = Duration::from_secs(4);

    pub fn new(fw_msgp: UnboundedSender<FwMsg>) -> Measurements {
        Measurements { n_items: 0, fw_msgp }
    }

    pub fn size(&self) -> usize {
        self.n_items
    }

    /// Finds or creates the Measurements entry for `name`.
    pub fn get(&mut self, tree: &mut NameTree, name: &Name) -> EntryIndex {
        let nte = tree.lookup(name);
        self.get_at(tree, nte)
    }

    /// Finds or creates the Measurements entry on an existing name tree
    /// entry.
    pub fn get_at(
        &mut self,
        tree: &mut NameTree,
        nte: EntryIndex,
    ) -> EntryIndex {
        let host = tree.entry_mut(nte);
        if host.measurements.is_none() {
            let name = host.name().clone();
            host.measurements = Some(Entry {
                name,
                expiry: Instant::now() + Measurements::INITIAL_LIFETIME,
                cleanup: Some(tasks::measurements_cleanup_timer(
                    nte,
                    Measurements::INITIAL_LIFETIME,
                    &self.fw_msgp,
                )),
                strategy_info: StrategyInfoHost::default(),
            });
            self.n_items += 1;
        }
        nte
    }

    pub fn entry<'a>(
        &self,
        tree: &'a NameTree,
        nte: EntryIndex,
    ) -> Option<&'a Entry> {
        tree.get_entry(nte).and_then(|host| host.measurements.as_ref())
    }

    pub fn entry_mut<'a>(
        &self,
        tree: &'a mut NameTree,
        nte: EntryIndex,
    ) -> Option<&'a mut Entry> {
        tree.get_entry_mut(nte)
            .and_then(|host| host.measurements.as_mut())
    }

    /// Pushes the entry expiry later, never earlier.
    pub fn extend_lifetime(
        &mut self,
        tree: &mut NameTree,
        nte: EntryIndex,
        lifetime: Duration,
    ) {
        let Some(entry) =
            tree.get_entry_mut(nte).and_then(|host| host.measurements.as_mut())
        else {
            // Dangling handle, the entry is already gone.
            return;
        };

        let expiry = Instant::now() + lifetime;
        if entry.expiry >= expiry {
            // Has a longer lifetime already, not extending.
            return;
        }
        entry.expiry = expiry;
        if let Some(cleanup) = entry.cleanup.as_mut() {
            cleanup.reset(Some(lifetime));
        }
    }

    /// Longest-prefix match over entries satisfying `predicate`.
    pub fn find_longest_prefix_match(
        &self,
        tree: &NameTree,
        name: &Name,
        predicate: impl Fn(&Entry) -> bool,
    ) -> Option<EntryIndex> {
        tree.find_longest_prefix_match(name, |host| {
            host.measurements.as_ref().is_some_and(&predicate)
        })
    }

    /// Removes an expired entry and tries to empty its name tree entry.
    /// Called from the forwarder loop when the cleanup timer fires.
    pub fn cleanup(&mut self, tree: &mut NameTree, nte: EntryIndex) {
        let Some(host) = tree.get_entry_mut(nte) else {
            return;
        };
        let Some(entry) = host.measurements.as_ref() else {
            return;
        };
        if entry.expiry > Instant::now() {
            // Lifetime was extended after the timer fired.
            return;
        }
        host.measurements = None;
        self.n_items -= 1;
        tree.erase_if_empty(nte);
    }
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::name_tree::HashtableOptions;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    fn fixture() -> (NameTree, Measurements) {
        let (tx, _rx) = mpsc::unbounded_channel();
        (NameTree::new(HashtableOptions::new(16)), Measurements::new(tx))
    }

    #[tokio::test(start_paused = true)]
    async fn get_is_idempotent() {
        let (mut tree, mut measurements) = fixture();
        let first = measurements.get(&mut tree, &name("/A"));
        let second = measurements.get(&mut tree, &name("/A"));
        assert_eq!(first, second);
        assert_eq!(measurements.size(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lifetime_extension_is_monotone() {
        let (mut tree, mut measurements) = fixture();
        let nte = measurements.get(&mut tree, &name("/A"));

        measurements.extend_lifetime(
            &mut tree,
            nte,
            Duration::from_secs(60),
        );
        let expiry = measurements.entry(&tree, nte).unwrap().expiry();

        // A shorter extension leaves the expiry unchanged.
        measurements.extend_lifetime(&mut tree, nte, Duration::from_secs(1));
        assert_eq!(measurements.entry(&tree, nte).unwrap().expiry(), expiry);

        // A longer one pushes it later.
        measurements.extend_lifetime(
            &mut tree,
            nte,
            Duration::from_secs(120),
        );
        assert!(measurements.entry(&tree, nte).unwrap().expiry() > expiry);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_releases_entry() {
        let (mut tree, mut measurements) = fixture();
        let nte = measurements.get(&mut tree, &name("/A/B"));

        // Not yet expired: cleanup is a no-op.
        measurements.cleanup(&mut tree, nte);
        assert_eq!(measurements.size(), 1);

        tokio::time::advance(Measurements::INITIAL_LIFETIME).await;
        measurements.cleanup(&mut tree, nte);
        assert_eq!(measurements.size(), 0);
        assert_eq!(tree.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn lpm_with_predicate() {
        let (mut tree, mut measurements) = fixture();
        let a = measurements.get(&mut tree, &name("/A"));
        measurements.get(&mut tree, &name("/A/B"));

        let found = measurements
            .find_longest_prefix_match(&tree, &name("/A/B/C"), |_| true)
            .unwrap();
        assert_eq!(tree.entry(found).name(), &name("/A/B"));

        let found = measurements
            .find_longest_prefix_match(&tree, &name("/A/B/C"), |entry| {
                entry.name().len() < 2
            })
            .unwrap();
        assert_eq!(found, a);
    }
}
