//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use derive_new::new;
use nomen_utils::face::FaceId;
use nomen_utils::name::Name;

use crate::name_tree::{EntryIndex, NameTree};

/// One FIB next-hop.
#[derive(Clone, Copy, Debug, Eq, PartialEq, new)]
pub struct NextHop {
    pub face: FaceId,
    pub cost: u64,
}

/// A FIB entry: a name prefix and its next-hops, sorted by ascending cost
/// with at most one next-hop per face.
#[derive(Clone, Debug)]
pub struct Entry {
    prefix: Name,
    nexthops: Vec<NextHop>,
}

/// The Forwarding Information Base: a thin index over NameTree entries.
///
/// Lookups that find nothing return a shared empty sentinel entry rather
/// than an option, which simplifies strategies.
#[derive(Debug)]
pub struct Fib {
    n_items: usize,
    empty_entry: Entry,
}

// ===== impl Entry =====

impl Entry {
    pub fn new(prefix: Name) -> Entry {
        Entry {
            prefix,
            nexthops: Vec::new(),
        }
    }

    pub fn prefix(&self) -> &Name {
        &self.prefix
    }

    pub fn next_hops(&self) -> &[NextHop] {
        &self.nexthops
    }

    pub fn has_next_hops(&self) -> bool {
        !self.nexthops.is_empty()
    }

    pub fn next_hop_of(&self, face: FaceId) -> Option<&NextHop> {
        self.nexthops.iter().find(|nexthop| nexthop.face == face)
    }

    /// Inserts or updates the next-hop for `face`, keeping the list sorted
    /// by ascending cost. An update of an existing face keeps insertion
    /// stability among equal costs.
    pub fn add_or_update_next_hop(&mut self, face: FaceId, cost: u64) {
        self.nexthops.retain(|nexthop| nexthop.face != face);
        let position = self
            .nexthops
            .iter()
            .position(|nexthop| nexthop.cost > cost)
            .unwrap_or(self.nexthops.len());
        self.nexthops.insert(position, NextHop::new(face, cost));
    }

    /// Removes the next-hop for `face`, if present. Returns whether a
    /// next-hop was removed.
    pub fn remove_next_hop(&mut self, face: FaceId) -> bool {
        let before = self.nexthops.len();
        self.nexthops.retain(|nexthop| nexthop.face != face);
        self.nexthops.len() != before
    }
}

// ===== impl Fib =====

impl Fib {
    pub fn new() -> Fib {
        Fib {
            n_items: 0,
            empty_entry: Entry::new(Name::root()),
        }
    }

    pub fn size(&self) -> usize {
        self.n_items
    }

    /// Finds or creates the FIB entry for `prefix`. Returns the hosting
    /// name tree entry and whether the FIB entry is new.
    pub fn insert(
        &mut self,
        tree: &mut NameTree,
        prefix: &Name,
    ) -> (EntryIndex, bool) {
        let nte = tree.lookup(prefix);
        let entry = tree.entry_mut(nte);
        if entry.fib.is_some() {
            return (nte, false);
        }
        entry.fib = Some(Entry::new(prefix.clone()));
        self.n_items += 1;
        (nte, true)
    }

    pub fn find_exact<'a>(
        &self,
        tree: &'a NameTree,
        prefix: &Name,
    ) -> Option<&'a Entry> {
        tree.find_exact(prefix)
            .and_then(|nte| tree.entry(nte).fib.as_ref())
    }

    /// Longest-prefix-match lookup. Returns the empty sentinel entry when
    /// no FIB entry covers `name`.
    pub fn find_longest_prefix_match<'a>(
        &'a self,
        tree: &'a NameTree,
        name: &Name,
    ) -> &'a Entry {
        tree.find_longest_prefix_match(name, |entry| entry.fib.is_some())
            .and_then(|nte| tree.entry(nte).fib.as_ref())
            .unwrap_or(&self.empty_entry)
    }

    /// Longest-prefix-match starting from an existing name tree entry,
    /// walking parents toward the root.
    pub fn find_longest_prefix_match_at<'a>(
        &'a self,
        tree: &'a NameTree,
        nte: EntryIndex,
    ) -> &'a Entry {
        tree.ancestors(nte)
            .find_map(|(_, entry)| entry.fib.as_ref())
            .unwrap_or(&self.empty_entry)
    }

    pub fn erase(&mut self, tree: &mut NameTree, prefix: &Name) {
        if let Some(nte) = tree.find_exact(prefix) {
            self.erase_at(tree, nte);
        }
    }

    fn erase_at(&mut self, tree: &mut NameTree, nte: EntryIndex) {
        if tree.entry_mut(nte).fib.take().is_some() {
            self.n_items -= 1;
        }
        tree.erase_if_empty(nte);
    }

    /// Removes the next-hop for `face` from the entry at `nte`, erasing
    /// the entry if its next-hop list becomes empty.
    pub fn remove_next_hop(
        &mut self,
        tree: &mut NameTree,
        nte: EntryIndex,
        face: FaceId,
    ) {
        let Some(fib_entry) = tree.entry_mut(nte).fib.as_mut() else {
            return;
        };
        fib_entry.remove_next_hop(face);
        if !fib_entry.has_next_hops() {
            self.erase_at(tree, nte);
        }
    }

    /// Bulk cleanup used when a face is destroyed.
    pub fn remove_next_hop_from_all_entries(
        &mut self,
        tree: &mut NameTree,
        face: FaceId,
    ) {
        // Erasure would invalidate the enumeration, so affected entries
        // are collected first.
        let affected: Vec<_> = tree
            .full_enumerate(|entry| {
                entry
                    .fib
                    .as_ref()
                    .is_some_and(|fib| fib.next_hop_of(face).is_some())
            })
            .map(|(nte, _)| nte)
            .collect();
        for nte in affected {
            self.remove_next_hop(tree, nte, face);
        }
    }

    /// Snapshot of every FIB entry, sorted by prefix. Used by the
    /// management dataset publisher.
    pub fn list<'a>(&self, tree: &'a NameTree) -> Vec<&'a Entry> {
        let mut entries: Vec<_> = tree
            .full_enumerate(|entry| entry.fib.is_some())
            .filter_map(|(_, entry)| entry.fib.as_ref())
            .collect();
        entries.sort_by(|a, b| a.prefix.cmp(&b.prefix));
        entries
    }
}

impl Default for Fib {
    fn default() -> Fib {
        Fib::new()
    }
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name_tree::HashtableOptions;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    #[test]
    fn insert_is_idempotent() {
        let mut tree = NameTree::new(HashtableOptions::new(16));
        let mut fib = Fib::new();

        let (nte, is_new) = fib.insert(&mut tree, &name("/A"));
        assert!(is_new);
        let (again, is_new) = fib.insert(&mut tree, &name("/A"));
        assert!(!is_new);
        assert_eq!(nte, again);
        assert_eq!(fib.size(), 1);
    }

    #[test]
    fn nexthops_sorted_and_unique_per_face() {
        let mut entry = Entry::new(name("/A"));
        entry.add_or_update_next_hop(1, 30);
        entry.add_or_update_next_hop(2, 10);
        entry.add_or_update_next_hop(3, 20);
        let costs: Vec<_> =
            entry.next_hops().iter().map(|nh| (nh.face, nh.cost)).collect();
        assert_eq!(costs, [(2, 10), (3, 20), (1, 30)]);

        // Updating an existing face re-sorts rather than duplicating.
        entry.add_or_update_next_hop(1, 5);
        let costs: Vec<_> =
            entry.next_hops().iter().map(|nh| (nh.face, nh.cost)).collect();
        assert_eq!(costs, [(1, 5), (2, 10), (3, 20)]);
    }

    #[test]
    fn lpm_returns_sentinel_when_empty() {
        let mut tree = NameTree::new(HashtableOptions::new(16));
        let mut fib = Fib::new();

        let found = fib.find_longest_prefix_match(&tree, &name("/A/B"));
        assert!(!found.has_next_hops());

        let (nte, _) = fib.insert(&mut tree, &name("/A"));
        tree.entry_mut(nte)
            .fib
            .as_mut()
            .unwrap()
            .add_or_update_next_hop(1, 10);
        let found = fib.find_longest_prefix_match(&tree, &name("/A/B"));
        assert_eq!(found.prefix(), &name("/A"));
    }

    #[test]
    fn empty_nexthop_list_erases_entry() {
        let mut tree = NameTree::new(HashtableOptions::new(16));
        let mut fib = Fib::new();

        let (nte, _) = fib.insert(&mut tree, &name("/A/B"));
        tree.entry_mut(nte)
            .fib
            .as_mut()
            .unwrap()
            .add_or_update_next_hop(1, 10);
        fib.remove_next_hop(&mut tree, nte, 1);
        assert_eq!(fib.size(), 0);
        assert_eq!(tree.size(), 0);
    }

    #[test]
    fn face_destruction_cleans_all_entries() {
        let mut tree = NameTree::new(HashtableOptions::new(16));
        let mut fib = Fib::new();

        for prefix in ["/A", "/A/B", "/C"] {
            let (nte, _) = fib.insert(&mut tree, &name(prefix));
            let entry = tree.entry_mut(nte).fib.as_mut().unwrap();
            entry.add_or_update_next_hop(1, 10);
            if prefix == "/C" {
                entry.add_or_update_next_hop(2, 20);
            }
        }

        fib.remove_next_hop_from_all_entries(&mut tree, 1);
        assert_eq!(fib.size(), 1);
        let remaining = fib.find_exact(&tree, &name("/C")).unwrap();
        assert_eq!(remaining.next_hops().len(), 1);
        assert!(fib.find_exact(&tree, &name("/A")).is_none());
    }
}
