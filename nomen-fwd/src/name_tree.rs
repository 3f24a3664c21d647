//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use generational_arena::{Arena, Index};
use nomen_utils::name::{HashValue, Name};
use tracing::{debug, trace};

use crate::table::pit::PitIndex;
use crate::table::{fib, measurements, strategy_choice};

/// Stable handle to a name tree entry. Handles remain valid across
/// hashtable resizes; a handle to an erased entry is detected by the
/// arena's generation check.
pub type EntryIndex = Index;

/// Hashtable sizing parameters.
///
/// The table expands when `size > n_buckets * expand_load_factor` and
/// shrinks when `size < n_buckets * shrink_load_factor`, never below
/// `min_size`.
#[derive(Clone, Copy, Debug)]
pub struct HashtableOptions {
    pub initial_size: usize,
    pub min_size: usize,
    pub expand_load_factor: f64,
    pub expand_factor: f64,
    pub shrink_load_factor: f64,
    pub shrink_factor: f64,
}

/// An entry in the name tree.
///
/// Each entry hosts at most one FIB entry, one Measurements entry, one
/// StrategyChoice entry, and a list of PIT entries sharing its name.
#[derive(Debug)]
pub struct Entry {
    name: Name,
    hash: HashValue,
    // Intrusive bucket chain links.
    prev: Option<EntryIndex>,
    next: Option<EntryIndex>,
    parent: Option<EntryIndex>,
    children: Vec<EntryIndex>,
    pub fib: Option<fib::Entry>,
    pub pit_entries: Vec<PitIndex>,
    pub measurements: Option<measurements::Entry>,
    pub strategy_choice: Option<strategy_choice::Entry>,
}

/// The shared index of all currently meaningful names.
///
/// A single hashtable keyed by name-prefix hash, with parent/child
/// pointers maintained lazily by [`NameTree::lookup`] and unwound by
/// [`NameTree::erase_if_empty`].
#[derive(Debug)]
pub struct NameTree {
    arena: Arena<Entry>,
    buckets: Vec<Option<EntryIndex>>,
    size: usize,
    options: HashtableOptions,
    expand_threshold: usize,
    shrink_threshold: usize,
}

// ===== impl HashtableOptions =====

impl HashtableOptions {
    pub fn new(size: usize) -> HashtableOptions {
        HashtableOptions {
            initial_size: size,
            min_size: size,
            ..Default::default()
        }
    }
}

impl Default for HashtableOptions {
    fn default() -> HashtableOptions {
        HashtableOptions {
            initial_size: 1024,
            min_size: 1024,
            expand_load_factor: 0.5,
            expand_factor: 2.0,
            shrink_load_factor: 0.1,
            shrink_factor: 0.5,
        }
    }
}

// ===== impl Entry =====

impl Entry {
    fn new(name: Name, hash: HashValue) -> Entry {
        Entry {
            name,
            hash,
            prev: None,
            next: None,
            parent: None,
            children: Vec::new(),
            fib: None,
            pit_entries: Vec::new(),
            measurements: None,
            strategy_choice: None,
        }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn parent(&self) -> Option<EntryIndex> {
        self.parent
    }

    /// Child order is unspecified and must not be relied on.
    pub fn children(&self) -> &[EntryIndex] {
        &self.children
    }

    pub fn has_table_entries(&self) -> bool {
        self.fib.is_some()
            || !self.pit_entries.is_empty()
            || self.measurements.is_some()
            || self.strategy_choice.is_some()
    }

    /// An empty entry has no children and no attached table entries; it is
    /// eligible for eager erasure.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && !self.has_table_entries()
    }
}

// ===== impl NameTree =====

impl NameTree {
    pub fn new(options: HashtableOptions) -> NameTree {
        assert!(options.min_size > 0);
        assert!(options.initial_size >= options.min_size);
        let mut tree = NameTree {
            arena: Arena::new(),
            buckets: vec![None; options.initial_size],
            size: 0,
            options,
            expand_threshold: 0,
            shrink_threshold: 0,
        };
        tree.compute_thresholds();
        tree
    }

    /// Number of entries.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn n_buckets(&self) -> usize {
        self.buckets.len()
    }

    pub fn entry(&self, index: EntryIndex) -> &Entry {
        &self.arena[index]
    }

    pub fn entry_mut(&mut self, index: EntryIndex) -> &mut Entry {
        &mut self.arena[index]
    }

    pub fn get_entry(&self, index: EntryIndex) -> Option<&Entry> {
        self.arena.get(index)
    }

    pub fn get_entry_mut(&mut self, index: EntryIndex) -> Option<&mut Entry> {
        self.arena.get_mut(index)
    }

    /// Finds or inserts the entry for `name`, creating and linking any
    /// missing ancestors up to the root.
    pub fn lookup(&mut self, name: &Name) -> EntryIndex {
        let hashes = name.prefix_hashes(name.len());
        let mut parent: Option<EntryIndex> = None;
        for prefix_len in 0..=name.len() {
            let (index, inserted) =
                self.find_or_insert(name, prefix_len, hashes[prefix_len]);
            if inserted && let Some(parent) = parent {
                self.arena[index].parent = Some(parent);
                self.arena[parent].children.push(index);
            }
            parent = Some(index);
        }
        parent.unwrap()
    }

    /// Exact-match lookup; does not insert.
    pub fn find_exact(&self, name: &Name) -> Option<EntryIndex> {
        self.find(name, name.len(), name.prefix_hash(name.len()))
    }

    /// Longest-prefix match over entries satisfying `predicate`, walking
    /// from the full name down to the root.
    pub fn find_longest_prefix_match(
        &self,
        name: &Name,
        predicate: impl Fn(&Entry) -> bool,
    ) -> Option<EntryIndex> {
        let hashes = name.prefix_hashes(name.len());
        for prefix_len in (0..=name.len()).rev() {
            if let Some(index) = self.find(name, prefix_len, hashes[prefix_len])
                && predicate(&self.arena[index])
            {
                return Some(index);
            }
        }
        None
    }

    /// All entries whose name is a prefix of `name` (including the exact
    /// match) satisfying `predicate`, in ascending prefix length.
    pub fn find_all_matches(
        &self,
        name: &Name,
        predicate: impl Fn(&Entry) -> bool,
    ) -> Vec<EntryIndex> {
        let hashes = name.prefix_hashes(name.len());
        (0..=name.len())
            .filter_map(|prefix_len| {
                self.find(name, prefix_len, hashes[prefix_len])
            })
            .filter(|index| predicate(&self.arena[*index]))
            .collect()
    }

    /// If the entry is empty, unlinks it from the hashtable and its parent
    /// and recursively tries to erase the parent. Must be called after
    /// every table detachment.
    pub fn erase_if_empty(&mut self, index: EntryIndex) {
        let mut current = index;
        loop {
            let Some(entry) = self.arena.get(current) else {
                return;
            };
            if !entry.is_empty() {
                return;
            }
            let parent = entry.parent;
            let bucket = self.bucket_index(entry.hash);
            self.detach(bucket, current);
            let entry = self.arena.remove(current).unwrap();
            trace!(name = %entry.name, "name tree entry erased");
            self.size -= 1;
            if let Some(parent) = parent {
                let children = &mut self.arena[parent].children;
                children.retain(|child| *child != current);
            }
            if self.size < self.shrink_threshold {
                let new_n_buckets = usize::max(
                    self.options.min_size,
                    (self.options.shrink_factor * self.n_buckets() as f64)
                        as usize,
                );
                self.resize(new_n_buckets);
            }
            match parent {
                Some(parent) => current = parent,
                None => return,
            }
        }
    }

    /// Every entry satisfying `predicate`. Iteration order is unspecified;
    /// the iterator is invalidated by any mutation of the tree.
    pub fn full_enumerate<'a>(
        &'a self,
        predicate: impl Fn(&Entry) -> bool + 'a,
    ) -> impl Iterator<Item = (EntryIndex, &'a Entry)> {
        self.arena
            .iter()
            .filter(move |(_, entry)| predicate(entry))
    }

    /// Pre-order DFS over the subtree rooted at `prefix`. For each visited
    /// entry the selector returns (accept, descend-into-children).
    pub fn partial_enumerate<'a, F>(
        &'a self,
        prefix: &Name,
        selector: F,
    ) -> PartialEnumerator<'a, F>
    where
        F: FnMut(&Entry) -> (bool, bool),
    {
        let stack = match self.find_exact(prefix) {
            Some(root) => vec![root],
            None => Vec::new(),
        };
        PartialEnumerator {
            tree: self,
            stack,
            selector,
        }
    }

    /// Walks from `index` toward the root, yielding every entry on the way
    /// (including `index` itself).
    pub fn ancestors(
        &self,
        index: EntryIndex,
    ) -> impl Iterator<Item = (EntryIndex, &Entry)> {
        let mut cursor = Some(index);
        std::iter::from_fn(move || {
            let index = cursor?;
            let entry = &self.arena[index];
            cursor = entry.parent;
            Some((index, entry))
        })
    }

    // ===== hashtable internals =====

    fn bucket_index(&self, hash: HashValue) -> usize {
        (hash as usize) % self.buckets.len()
    }

    fn find(
        &self,
        name: &Name,
        prefix_len: usize,
        hash: HashValue,
    ) -> Option<EntryIndex> {
        let mut cursor = self.buckets[self.bucket_index(hash)];
        while let Some(index) = cursor {
            let entry = &self.arena[index];
            if entry.hash == hash && prefix_eq(name, prefix_len, &entry.name) {
                return Some(index);
            }
            cursor = entry.next;
        }
        None
    }

    fn find_or_insert(
        &mut self,
        name: &Name,
        prefix_len: usize,
        hash: HashValue,
    ) -> (EntryIndex, bool) {
        if let Some(index) = self.find(name, prefix_len, hash) {
            return (index, false);
        }

        let entry = Entry::new(name.get_prefix(prefix_len), hash);
        let index = self.arena.insert(entry);
        let bucket = self.bucket_index(hash);
        self.attach(bucket, index);
        self.size += 1;
        trace!(name = %self.arena[index].name, hash, "name tree entry inserted");

        if self.size > self.expand_threshold {
            let new_n_buckets = (self.options.expand_factor
                * self.n_buckets() as f64) as usize;
            self.resize(new_n_buckets);
        }
        (index, true)
    }

    fn attach(&mut self, bucket: usize, index: EntryIndex) {
        let head = self.buckets[bucket];
        {
            let entry = &mut self.arena[index];
            entry.prev = None;
            entry.next = head;
        }
        if let Some(head) = head {
            self.arena[head].prev = Some(index);
        }
        self.buckets[bucket] = Some(index);
    }

    fn detach(&mut self, bucket: usize, index: EntryIndex) {
        let (prev, next) = {
            let entry = &mut self.arena[index];
            let links = (entry.prev, entry.next);
            entry.prev = None;
            entry.next = None;
            links
        };
        match prev {
            Some(prev) => self.arena[prev].next = next,
            None => self.buckets[bucket] = next,
        }
        if let Some(next) = next {
            self.arena[next].prev = prev;
        }
    }

    // Rehashes every entry into a new bucket vector. Entries are relinked
    // in place; no entry moves, so indices held by other tables stay valid.
    fn resize(&mut self, new_n_buckets: usize) {
        if self.n_buckets() == new_n_buckets || new_n_buckets == 0 {
            return;
        }
        debug!(
            from = self.n_buckets(),
            to = new_n_buckets,
            "name tree hashtable resize"
        );

        self.buckets = vec![None; new_n_buckets];
        let indices: Vec<_> =
            self.arena.iter().map(|(index, _)| index).collect();
        for index in indices {
            let hash = self.arena[index].hash;
            let bucket = self.bucket_index(hash);
            self.attach(bucket, index);
        }
        self.compute_thresholds();
    }

    fn compute_thresholds(&mut self) {
        self.expand_threshold = (self.options.expand_load_factor
            * self.n_buckets() as f64) as usize;
        self.shrink_threshold = (self.options.shrink_load_factor
            * self.n_buckets() as f64) as usize;
    }
}

impl Default for NameTree {
    fn default() -> NameTree {
        NameTree::new(HashtableOptions::default())
    }
}

/// Lazy pre-order DFS over a subtree, controlled by a selector returning
/// (accept-self, descend-into-children) per visited entry.
pub struct PartialEnumerator<'a, F> {
    tree: &'a NameTree,
    stack: Vec<EntryIndex>,
    selector: F,
}

impl<'a, F> Iterator for PartialEnumerator<'a, F>
where
    F: FnMut(&Entry) -> (bool, bool),
{
    type Item = (EntryIndex, &'a Entry);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(index) = self.stack.pop() {
            let entry = &self.tree.arena[index];
            let (accept, descend) = (self.selector)(entry);
            if descend {
                self.stack.extend(entry.children.iter().rev());
            }
            if accept {
                return Some((index, entry));
            }
        }
        None
    }
}

// ===== global functions =====

// Compares `candidate` against the first `prefix_len` components of `name`
// without materializing the prefix.
fn prefix_eq(name: &Name, prefix_len: usize, candidate: &Name) -> bool {
    candidate.len() == prefix_len
        && (0..prefix_len).all(|i| name.get(i) == candidate.get(i))
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    fn tree() -> NameTree {
        NameTree::new(HashtableOptions::new(16))
    }

    #[test]
    fn lookup_creates_ancestors() {
        let mut tree = tree();
        let abc = tree.lookup(&name("/A/B/C"));
        assert_eq!(tree.size(), 4);
        assert_eq!(tree.entry(abc).name(), &name("/A/B/C"));

        let ab = tree.find_exact(&name("/A/B")).unwrap();
        let a = tree.find_exact(&name("/A")).unwrap();
        let root = tree.find_exact(&Name::root()).unwrap();
        assert_eq!(tree.entry(abc).parent(), Some(ab));
        assert_eq!(tree.entry(ab).parent(), Some(a));
        assert_eq!(tree.entry(a).parent(), Some(root));
        assert_eq!(tree.entry(root).parent(), None);
        assert!(tree.entry(a).children().contains(&ab));

        // Idempotent.
        assert_eq!(tree.lookup(&name("/A/B/C")), abc);
        assert_eq!(tree.size(), 4);
    }

    #[test]
    fn find_exact_misses() {
        let mut tree = tree();
        tree.lookup(&name("/A/B"));
        assert!(tree.find_exact(&name("/A/C")).is_none());
        assert!(tree.find_exact(&name("/A/B/C")).is_none());
        assert!(tree.find_exact(&name("/A")).is_some());
    }

    #[test]
    fn longest_prefix_match_with_predicate() {
        let mut tree = tree();
        let a = tree.lookup(&name("/A"));
        tree.lookup(&name("/A/B/C"));
        tree.entry_mut(a).fib = Some(fib::Entry::new(name("/A")));

        let found = tree
            .find_longest_prefix_match(&name("/A/B/C/D"), |e| e.fib.is_some())
            .unwrap();
        assert_eq!(found, a);
        assert!(
            tree.find_longest_prefix_match(&name("/Z"), |e| e.fib.is_some())
                .is_none()
        );
        // Without the predicate restriction the deepest entry wins.
        let deepest = tree
            .find_longest_prefix_match(&name("/A/B/C/D"), |_| true)
            .unwrap();
        assert_eq!(tree.entry(deepest).name(), &name("/A/B/C"));
    }

    #[test]
    fn find_all_matches_ascending() {
        let mut tree = tree();
        tree.lookup(&name("/A/B"));
        tree.lookup(&name("/A/C"));
        let matches = tree.find_all_matches(&name("/A/B/X"), |_| true);
        let names: Vec<_> = matches
            .iter()
            .map(|index| tree.entry(*index).name().to_string())
            .collect();
        assert_eq!(names, ["/", "/A", "/A/B"]);
    }

    #[test]
    fn erase_if_empty_unwinds_bottom_up() {
        let mut tree = tree();
        let a = tree.lookup(&name("/A"));
        let abc = tree.lookup(&name("/A/B/C"));
        tree.entry_mut(a).fib = Some(fib::Entry::new(name("/A")));
        assert_eq!(tree.size(), 4);

        // /A/B/C and /A/B are empty; /A carries a FIB entry and stays,
        // and so do its ancestors.
        tree.erase_if_empty(abc);
        assert_eq!(tree.size(), 2);
        assert!(tree.find_exact(&name("/A/B")).is_none());
        assert!(tree.find_exact(&name("/A")).is_some());

        // Detaching the FIB entry empties the rest of the chain.
        tree.entry_mut(a).fib = None;
        tree.erase_if_empty(a);
        assert_eq!(tree.size(), 0);
    }

    #[test]
    fn erase_if_empty_keeps_occupied_entries() {
        let mut tree = tree();
        let ab = tree.lookup(&name("/A/B"));
        tree.entry_mut(ab).fib = Some(fib::Entry::new(name("/A/B")));
        tree.erase_if_empty(ab);
        assert_eq!(tree.size(), 3);
    }

    #[test]
    fn resize_preserves_entries() {
        let mut tree = NameTree::new(HashtableOptions::new(4));
        let mut indices = Vec::new();
        for i in 0..64 {
            indices.push((i, tree.lookup(&name(&format!("/P{i}")))));
        }
        assert!(tree.n_buckets() > 4);
        for (i, index) in &indices {
            assert_eq!(tree.find_exact(&name(&format!("/P{i}"))), Some(*index));
        }

        // Shrink back down, but never below the minimum size. Integer
        // threshold truncation may leave the table one halving short.
        for (_, index) in indices {
            tree.erase_if_empty(index);
        }
        assert_eq!(tree.size(), 0);
        assert!(tree.n_buckets() >= 4);
        assert!(tree.n_buckets() <= 8);
    }

    #[test]
    fn partial_enumerate_preorder_with_descend_control() {
        let mut tree = tree();
        tree.lookup(&name("/A/B/C"));
        tree.lookup(&name("/A/D"));
        tree.lookup(&name("/E"));

        let visited: Vec<_> = tree
            .partial_enumerate(&name("/A"), |_| (true, true))
            .map(|(_, entry)| entry.name().to_string())
            .collect();
        assert_eq!(visited.len(), 4);
        assert_eq!(visited[0], "/A");
        // Pre-order: a child appears after its parent.
        let pos =
            |n: &str| visited.iter().position(|v| v == n).unwrap();
        assert!(pos("/A/B") < pos("/A/B/C"));

        // Stopping descent prunes the subtree below /A/B.
        let visited: Vec<_> = tree
            .partial_enumerate(&name("/A"), |entry| {
                (true, entry.name() != &name("/A/B"))
            })
            .map(|(_, entry)| entry.name().to_string())
            .collect();
        assert!(!visited.contains(&"/A/B/C".to_owned()));
        assert!(visited.contains(&"/A/B".to_owned()));
    }

    #[test]
    fn ancestors_walk() {
        let mut tree = tree();
        let abc = tree.lookup(&name("/A/B/C"));
        let names: Vec<_> = tree
            .ancestors(abc)
            .map(|(_, entry)| entry.name().to_string())
            .collect();
        assert_eq!(names, ["/A/B/C", "/A/B", "/A", "/"]);
    }
}
