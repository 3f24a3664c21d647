//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, VecDeque};
use std::str::FromStr;

use nomen_utils::name::Name;
use nomen_utils::packet::{ChildSelector, Data, Interest};
use tokio::time::Instant;

/// Admission policy for Data that matched no PIT entry.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum UnsolicitedDataPolicy {
    #[default]
    DropAll,
    AdmitAll,
}

#[derive(Debug)]
struct CsEntry {
    data: Data,
    stale_at: Option<Instant>,
}

/// The Content Store front: exact lookup-and-insert keyed by Data full
/// name, bounded by a packet count with FIFO fallback eviction. The
/// replacement policy proper is outside the forwarding core.
#[derive(Debug)]
pub struct ContentStore {
    limit: usize,
    entries: BTreeMap<Name, CsEntry>,
    queue: VecDeque<Name>,
}

// ===== impl UnsolicitedDataPolicy =====

impl UnsolicitedDataPolicy {
    pub fn admits(self) -> bool {
        self == UnsolicitedDataPolicy::AdmitAll
    }
}

impl FromStr for UnsolicitedDataPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<UnsolicitedDataPolicy, String> {
        match s {
            "drop-all" => Ok(UnsolicitedDataPolicy::DropAll),
            "admit-all" => Ok(UnsolicitedDataPolicy::AdmitAll),
            _ => Err(format!("unknown unsolicited data policy: {s}")),
        }
    }
}

// ===== impl ContentStore =====

impl ContentStore {
    pub const DEFAULT_MAX_PACKETS: usize = 65536;

    pub fn new(limit: usize) -> ContentStore {
        ContentStore {
            limit,
            entries: BTreeMap::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
        self.evict();
    }

    pub fn insert(&mut self, data: Data) {
        if self.limit == 0 {
            return;
        }
        let full_name = data.full_name();
        let stale_at = data
            .freshness_period
            .map(|freshness| Instant::now() + freshness);
        if self
            .entries
            .insert(full_name.clone(), CsEntry { data, stale_at })
            .is_none()
        {
            self.queue.push_back(full_name);
        }
        self.evict();
    }

    /// Finds cached Data satisfying `interest`, or `None` (a miss).
    pub fn find(&self, interest: &Interest) -> Option<&Data> {
        let now = Instant::now();
        let mut found = None;
        for (full_name, entry) in self.entries.range(interest.name.clone()..) {
            if !interest.name.is_prefix_of(full_name) {
                break;
            }
            if !self.admits_match(interest, full_name, entry, now) {
                continue;
            }
            match interest.selectors.child_selector {
                Some(ChildSelector::Rightmost) => found = Some(&entry.data),
                _ => return Some(&entry.data),
            }
        }
        found
    }

    fn admits_match(
        &self,
        interest: &Interest,
        full_name: &Name,
        entry: &CsEntry,
        now: Instant,
    ) -> bool {
        let suffix_len = full_name.len() - interest.name.len();
        if let Some(min) = interest.selectors.min_suffix_components
            && suffix_len < min
        {
            return false;
        }
        if let Some(max) = interest.selectors.max_suffix_components
            && suffix_len > max
        {
            return false;
        }
        if interest.selectors.must_be_fresh
            && !entry.stale_at.is_some_and(|stale_at| stale_at > now)
        {
            return false;
        }
        true
    }

    fn evict(&mut self) {
        while self.entries.len() > self.limit {
            let Some(victim) = self.queue.pop_front() else {
                return;
            };
            self.entries.remove(&victim);
        }
    }
}

impl Default for ContentStore {
    fn default() -> ContentStore {
        ContentStore::new(ContentStore::DEFAULT_MAX_PACKETS)
    }
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;

    fn data(uri: &str, content: &'static [u8]) -> Data {
        Data::new(uri.parse().unwrap(), Bytes::from_static(content), None)
    }

    fn interest(uri: &str) -> Interest {
        Interest::new(uri.parse().unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn exact_and_prefix_lookup() {
        let mut cs = ContentStore::new(16);
        cs.insert(data("/A/B", b"x"));

        assert!(cs.find(&interest("/A/B")).is_some());
        assert!(cs.find(&interest("/A")).is_some());
        assert!(cs.find(&interest("/A/C")).is_none());
        assert!(cs.find(&interest("/A/B/C")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn must_be_fresh_rejects_stale() {
        let mut cs = ContentStore::new(16);
        let mut fresh = data("/A", b"x");
        fresh.freshness_period = Some(Duration::from_secs(1));
        cs.insert(fresh);

        let mut want_fresh = interest("/A");
        want_fresh.selectors.must_be_fresh = true;
        assert!(cs.find(&want_fresh).is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cs.find(&want_fresh).is_none());
        // Staleness only matters to MustBeFresh consumers.
        assert!(cs.find(&interest("/A")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn rightmost_child_selector() {
        let mut cs = ContentStore::new(16);
        cs.insert(data("/E/1", b"a"));
        cs.insert(data("/E/2", b"b"));

        let mut rightmost = interest("/E");
        rightmost.selectors.child_selector = Some(ChildSelector::Rightmost);
        let found = cs.find(&rightmost).unwrap();
        assert_eq!(found.name, "/E/2".parse().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn fifo_eviction_bounds_size() {
        let mut cs = ContentStore::new(2);
        cs.insert(data("/A", b"a"));
        cs.insert(data("/B", b"b"));
        cs.insert(data("/C", b"c"));
        assert_eq!(cs.size(), 2);
        assert!(cs.find(&interest("/A")).is_none());
        assert!(cs.find(&interest("/C")).is_some());
    }
}
