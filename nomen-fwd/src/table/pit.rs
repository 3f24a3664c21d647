//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use generational_arena::{Arena, Index};
use nomen_utils::face::FaceId;
use nomen_utils::name::Name;
use nomen_utils::packet::{Data, Interest, Nack, NackReason, Nonce, Selectors};
use nomen_utils::task::TimeoutTask;
use smallvec::SmallVec;
use tokio::time::Instant;

use crate::name_tree::{EntryIndex, NameTree};
use crate::table::strategy_info::StrategyInfoHost;

/// Stable handle to a PIT entry.
pub type PitIndex = Index;

/// Per-face record of an Interest exchange. In-records never carry an
/// incoming Nack; out-records may.
#[derive(Debug)]
pub struct FaceRecord {
    pub face: FaceId,
    pub last_nonce: Nonce,
    pub last_renewed: Instant,
    pub expiry: Instant,
    pub incoming_nack: Option<NackReason>,
    pub strategy_info: StrategyInfoHost,
}

/// A PIT entry: an Interest awaiting Data, with its per-face in-records
/// and out-records and the timers that bound its lifetime.
#[derive(Debug)]
pub struct Entry {
    interest: Interest,
    nte: EntryIndex,
    // Most entries see a single downstream and a single upstream.
    in_records: SmallVec<[FaceRecord; 1]>,
    out_records: SmallVec<[FaceRecord; 1]>,
    pub unsatisfy_timer: Option<TimeoutTask>,
    pub straggler_timer: Option<TimeoutTask>,
    pub strategy_info: StrategyInfoHost,
}

/// The Pending Interest Table.
///
/// Entries are stored in an arena; NameTree entries reference them by
/// index. Multiple entries may share a NameTree entry when Interests
/// carry the same Name but distinct selector sets.
#[derive(Debug, Default)]
pub struct Pit {
    arena: Arena<Entry>,
}

// ===== impl FaceRecord =====

impl FaceRecord {
    fn new(face: FaceId) -> FaceRecord {
        let now = Instant::now();
        FaceRecord {
            face,
            last_nonce: 0,
            last_renewed: now,
            expiry: now,
            incoming_nack: None,
            strategy_info: StrategyInfoHost::default(),
        }
    }

    /// Refreshes the record from a newly received copy of the Interest.
    pub fn update(&mut self, interest: &Interest) {
        let now = Instant::now();
        self.last_nonce = interest.nonce.unwrap_or(0);
        self.last_renewed = now;
        self.expiry = now + interest.lifetime_or_default();
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expiry <= now
    }

    /// Attaches an incoming Nack. Rejected if the Nack does not answer
    /// the nonce most recently sent on this record.
    pub fn set_incoming_nack(&mut self, nack: &Nack) -> bool {
        if nack.interest.nonce != Some(self.last_nonce) {
            return false;
        }
        self.incoming_nack = Some(nack.reason);
        true
    }
}

// ===== impl Entry =====

impl Entry {
    fn new(interest: Interest, nte: EntryIndex) -> Entry {
        Entry {
            interest,
            nte,
            in_records: SmallVec::new(),
            out_records: SmallVec::new(),
            unsatisfy_timer: None,
            straggler_timer: None,
            strategy_info: StrategyInfoHost::default(),
        }
    }

    pub fn interest(&self) -> &Interest {
        &self.interest
    }

    pub fn name(&self) -> &Name {
        &self.interest.name
    }

    /// The hosting name tree entry.
    pub fn nte(&self) -> EntryIndex {
        self.nte
    }

    pub fn in_records(&self) -> &[FaceRecord] {
        &self.in_records
    }

    pub fn out_records(&self) -> &[FaceRecord] {
        &self.out_records
    }

    pub fn in_record(&self, face: FaceId) -> Option<&FaceRecord> {
        self.in_records.iter().find(|record| record.face == face)
    }

    pub fn out_record(&self, face: FaceId) -> Option<&FaceRecord> {
        self.out_records.iter().find(|record| record.face == face)
    }

    pub fn out_record_mut(&mut self, face: FaceId) -> Option<&mut FaceRecord> {
        self.out_records.iter_mut().find(|record| record.face == face)
    }

    pub fn insert_or_update_in_record(
        &mut self,
        face: FaceId,
        interest: &Interest,
    ) -> &mut FaceRecord {
        let position = self
            .in_records
            .iter()
            .position(|record| record.face == face)
            .unwrap_or_else(|| {
                self.in_records.push(FaceRecord::new(face));
                self.in_records.len() - 1
            });
        let record = &mut self.in_records[position];
        record.update(interest);
        record
    }

    pub fn insert_or_update_out_record(
        &mut self,
        face: FaceId,
        interest: &Interest,
    ) -> &mut FaceRecord {
        let position = self
            .out_records
            .iter()
            .position(|record| record.face == face)
            .unwrap_or_else(|| {
                self.out_records.push(FaceRecord::new(face));
                self.out_records.len() - 1
            });
        let record = &mut self.out_records[position];
        record.incoming_nack = None;
        record.update(interest);
        record
    }

    pub fn delete_in_record(&mut self, face: FaceId) {
        self.in_records.retain(|record| record.face != face);
    }

    pub fn delete_out_record(&mut self, face: FaceId) {
        self.out_records.retain(|record| record.face != face);
    }

    pub fn clear_in_records(&mut self) {
        self.in_records.clear();
    }

    /// Latest in-record expiry, bounding the unsatisfy timer.
    pub fn last_in_expiry(&self) -> Option<Instant> {
        self.in_records.iter().map(|record| record.expiry).max()
    }

    pub fn clear_strategy_info(&mut self) {
        self.strategy_info.clear();
        for record in &mut self.in_records {
            record.strategy_info.clear();
        }
        for record in &mut self.out_records {
            record.strategy_info.clear();
        }
    }
}

// ===== impl Pit =====

impl Pit {
    pub fn new() -> Pit {
        Pit::default()
    }

    pub fn size(&self) -> usize {
        self.arena.len()
    }

    pub fn entry(&self, index: PitIndex) -> &Entry {
        &self.arena[index]
    }

    pub fn entry_mut(&mut self, index: PitIndex) -> &mut Entry {
        &mut self.arena[index]
    }

    pub fn get(&self, index: PitIndex) -> Option<&Entry> {
        self.arena.get(index)
    }

    pub fn get_mut(&mut self, index: PitIndex) -> Option<&mut Entry> {
        self.arena.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PitIndex, &Entry)> {
        self.arena.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PitIndex, &mut Entry)> {
        self.arena.iter_mut()
    }

    /// Finds or creates the PIT entry for `interest`. Entries collapse on
    /// (Name, full selector set).
    pub fn insert(
        &mut self,
        tree: &mut NameTree,
        interest: &Interest,
    ) -> (PitIndex, bool) {
        let nte = tree.lookup(&interest.name);
        if let Some(existing) = tree
            .entry(nte)
            .pit_entries
            .iter()
            .copied()
            .find(|index| {
                self.arena[*index].interest.selectors == interest.selectors
            })
        {
            return (existing, false);
        }

        let index = self.arena.insert(Entry::new(interest.clone(), nte));
        tree.entry_mut(nte).pit_entries.push(index);
        (index, true)
    }

    /// Locates an existing PIT entry by (Name, selectors) without
    /// inserting. Used by the Nack pipeline.
    pub fn find(
        &self,
        tree: &NameTree,
        name: &Name,
        selectors: &Selectors,
    ) -> Option<PitIndex> {
        let nte = tree.find_exact(name)?;
        tree.entry(nte)
            .pit_entries
            .iter()
            .copied()
            .find(|index| &self.arena[*index].interest.selectors == selectors)
    }

    /// Every PIT entry whose Interest is satisfied by `data`, across all
    /// NameTree entries whose name is a prefix of the Data full name.
    /// The result order is unspecified.
    pub fn find_all_data_matches(
        &self,
        tree: &NameTree,
        data: &Data,
    ) -> Vec<PitIndex> {
        let full_name = data.full_name();
        tree.find_all_matches(&full_name, |entry| !entry.pit_entries.is_empty())
            .into_iter()
            .flat_map(|nte| tree.entry(nte).pit_entries.iter().copied())
            .filter(|index| self.arena[*index].interest.matches_data(data))
            .collect()
    }

    /// Detaches the entry from its NameTree entry and releases it. Timers
    /// owned by the entry are cancelled by the drop.
    pub fn erase(&mut self, tree: &mut NameTree, index: PitIndex) {
        let Some(entry) = self.arena.remove(index) else {
            return;
        };
        let nte = entry.nte;
        if let Some(host) = tree.get_entry_mut(nte) {
            host.pit_entries.retain(|pit| *pit != index);
        }
        tree.erase_if_empty(nte);
    }

    /// Drops every in-record and out-record referring to a destroyed face.
    /// Entries stay pending until their natural expiry.
    pub fn delete_face_records(&mut self, face: FaceId) {
        for (_, entry) in self.arena.iter_mut() {
            entry.delete_in_record(face);
            entry.delete_out_record(face);
        }
    }
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::name_tree::HashtableOptions;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    fn interest(uri: &str, nonce: Nonce) -> Interest {
        Interest::new(name(uri)).with_nonce(nonce)
    }

    fn fixture() -> (NameTree, Pit) {
        (NameTree::new(HashtableOptions::new(16)), Pit::new())
    }

    #[test]
    fn insert_collapses_on_name_and_selectors() {
        let (mut tree, mut pit) = fixture();

        let (first, is_new) = pit.insert(&mut tree, &interest("/A/B", 1));
        assert!(is_new);
        // Same name and selectors, different nonce: same entry.
        let (second, is_new) = pit.insert(&mut tree, &interest("/A/B", 2));
        assert!(!is_new);
        assert_eq!(first, second);
        assert_eq!(pit.size(), 1);

        // Distinct selectors share the NameTree entry but not the PIT
        // entry.
        let mut fresh = interest("/A/B", 3);
        fresh.selectors.must_be_fresh = true;
        let (third, is_new) = pit.insert(&mut tree, &fresh);
        assert!(is_new);
        assert_ne!(first, third);
        assert_eq!(pit.entry(first).nte(), pit.entry(third).nte());
        assert_eq!(pit.size(), 2);
    }

    #[test]
    fn records_are_unique_per_face() {
        let (mut tree, mut pit) = fixture();
        let (index, _) = pit.insert(&mut tree, &interest("/A", 1));
        let entry = pit.entry_mut(index);

        entry.insert_or_update_in_record(1, &interest("/A", 1));
        entry.insert_or_update_in_record(1, &interest("/A", 7));
        entry.insert_or_update_out_record(2, &interest("/A", 7));
        entry.insert_or_update_out_record(2, &interest("/A", 8));

        assert_eq!(entry.in_records().len(), 1);
        assert_eq!(entry.out_records().len(), 1);
        assert_eq!(entry.in_record(1).unwrap().last_nonce, 7);
        assert_eq!(entry.out_record(2).unwrap().last_nonce, 8);
    }

    #[test]
    fn stale_nack_is_rejected() {
        let (mut tree, mut pit) = fixture();
        let (index, _) = pit.insert(&mut tree, &interest("/A", 1));
        let entry = pit.entry_mut(index);
        entry.insert_or_update_out_record(2, &interest("/A", 7));

        let stale = Nack::new(NackReason::NoRoute, interest("/A", 6));
        let record = entry.out_record_mut(2).unwrap();
        assert!(!record.set_incoming_nack(&stale));
        assert_eq!(record.incoming_nack, None);

        let current = Nack::new(NackReason::NoRoute, interest("/A", 7));
        assert!(record.set_incoming_nack(&current));
        assert_eq!(record.incoming_nack, Some(NackReason::NoRoute));
    }

    #[test]
    fn data_matches_all_prefix_entries() {
        let (mut tree, mut pit) = fixture();
        let (short, _) = pit.insert(&mut tree, &interest("/A", 1));
        let (exact, _) = pit.insert(&mut tree, &interest("/A/B", 2));
        let (other, _) = pit.insert(&mut tree, &interest("/A/C", 3));

        let data = Data::new(name("/A/B"), Bytes::from_static(b"x"), None);
        let matches = pit.find_all_data_matches(&tree, &data);
        assert!(matches.contains(&short));
        assert!(matches.contains(&exact));
        assert!(!matches.contains(&other));
    }

    #[test]
    fn erase_releases_name_tree_entry() {
        let (mut tree, mut pit) = fixture();
        let (index, _) = pit.insert(&mut tree, &interest("/A/B", 1));
        assert_eq!(tree.size(), 3);

        pit.erase(&mut tree, index);
        assert_eq!(pit.size(), 0);
        assert_eq!(tree.size(), 0);

        // Erasing a stale handle is harmless.
        pit.erase(&mut tree, index);
    }
}
