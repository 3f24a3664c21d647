//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::time::Duration;

use nomen_utils::face::FaceId;
use nomen_utils::name::Name;
use nomen_utils::packet::{Data, Interest, Nack, NackReason};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::counters::ForwarderCounters;
use crate::face::{Face, FaceTable};
use crate::fw::algorithm;
use crate::name_tree::EntryIndex;
use crate::table::pit::PitIndex;
use crate::table::{Tables, fib, pit};
use crate::tasks::{self, FwMsg};

/// Window during which a satisfied or rejected PIT entry lingers to absorb
/// late duplicates from downstream.
pub const STRAGGLER_TIMEOUT: Duration = Duration::from_millis(100);

/// A pluggable forwarding strategy.
///
/// The callbacks are the strategy's whole view of the world; the
/// [`StrategyCtx`] outbound primitives are its only legal actions.
/// Strategies never mutate tables directly.
pub trait Strategy: Send {
    /// The versioned instance name of this strategy.
    fn name(&self) -> &Name;

    fn after_receive_interest(
        &mut self,
        ctx: &mut StrategyCtx<'_>,
        ingress: FaceId,
        interest: &Interest,
        pit: PitIndex,
    );

    fn after_content_store_hit(
        &mut self,
        ctx: &mut StrategyCtx<'_>,
        pit: PitIndex,
        ingress: FaceId,
        data: &Data,
    ) {
        ctx.send_data(pit, data, ingress);
    }

    fn after_receive_data(
        &mut self,
        _ctx: &mut StrategyCtx<'_>,
        _pit: PitIndex,
        _ingress: FaceId,
        _data: &Data,
    ) {
    }

    fn after_receive_nack(
        &mut self,
        _ctx: &mut StrategyCtx<'_>,
        _ingress: FaceId,
        _nack: &Nack,
        _pit: PitIndex,
    ) {
    }

    /// Measurement hook invoked before a PIT entry is satisfied.
    fn before_satisfy_interest(
        &mut self,
        _ctx: &mut StrategyCtx<'_>,
        _pit: PitIndex,
        _ingress: FaceId,
        _data: &Data,
    ) {
    }

    /// Hook invoked before a PIT entry expires unsatisfied.
    fn before_expire_pending_interest(
        &mut self,
        _ctx: &mut StrategyCtx<'_>,
        _pit: PitIndex,
    ) {
    }
}

pub type StrategyFactory = Box<dyn Fn() -> Box<dyn Strategy> + Send>;

/// Registry of installable strategies, keyed by versioned strategy name.
#[derive(Default)]
pub struct StrategyRegistry {
    factories: BTreeMap<Name, StrategyFactory>,
}

/// The forwarder-provided execution context handed to strategy callbacks:
/// read access to the tables and the outbound action primitives.
pub struct StrategyCtx<'a> {
    pub(crate) tables: &'a mut Tables,
    pub(crate) faces: &'a FaceTable,
    pub(crate) counters: &'a mut ForwarderCounters,
    pub(crate) fw_msgp: &'a UnboundedSender<FwMsg>,
}

// ===== impl StrategyRegistry =====

impl StrategyRegistry {
    /// Registers a strategy factory under its versioned name. Duplicate
    /// installs are rejected.
    pub fn install(&mut self, name: Name, factory: StrategyFactory) -> bool {
        if self.factories.contains_key(&name) {
            warn!(strategy = %name, "duplicate strategy install");
            return false;
        }
        self.factories.insert(name, factory);
        true
    }

    /// Resolves a strategy name to its versioned form. An unversioned name
    /// matches the latest installed version.
    pub fn resolve(&self, name: &Name) -> Option<&Name> {
        let mut candidate = None;
        for installed in self.factories.range(name.clone()..).map(|(n, _)| n) {
            if !name.is_prefix_of(installed) {
                break;
            }
            match installed.len() - name.len() {
                // Exact match.
                0 => return Some(installed),
                // Unversioned name matching a versioned strategy; the last
                // candidate in range order is the latest version.
                1 => candidate = Some(installed),
                _ => (),
            }
        }
        candidate
    }

    pub fn has_strategy(&self, name: &Name, exact: bool) -> bool {
        if exact {
            self.factories.contains_key(name)
        } else {
            self.resolve(name).is_some()
        }
    }

    /// Instantiates the strategy identified by `name` (possibly
    /// unversioned). Returns the versioned name with the instance.
    pub fn make_instance(
        &self,
        name: &Name,
    ) -> Option<(Name, Box<dyn Strategy>)> {
        let versioned = self.resolve(name)?.clone();
        let instance = (self.factories[&versioned])();
        Some((versioned, instance))
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.factories.keys())
            .finish()
    }
}

// ===== impl StrategyCtx =====

impl<'a> StrategyCtx<'a> {
    pub(crate) fn new(
        tables: &'a mut Tables,
        faces: &'a FaceTable,
        counters: &'a mut ForwarderCounters,
        fw_msgp: &'a UnboundedSender<FwMsg>,
    ) -> StrategyCtx<'a> {
        StrategyCtx { tables, faces, counters, fw_msgp }
    }

    pub fn now(&self) -> Instant {
        Instant::now()
    }

    pub fn pit(&self, pit: PitIndex) -> &pit::Entry {
        self.tables.pit.entry(pit)
    }

    /// Mutable access to a PIT entry, intended for strategy-info slots.
    pub fn pit_mut(&mut self, pit: PitIndex) -> &mut pit::Entry {
        self.tables.pit.entry_mut(pit)
    }

    pub fn face(&self, id: FaceId) -> Option<&Face> {
        self.faces.get(id)
    }

    /// The FIB entry covering the pending Interest (longest prefix match;
    /// the empty sentinel when no entry covers it).
    pub fn lookup_fib(&self, pit: PitIndex) -> &fib::Entry {
        let nte = self.tables.pit.entry(pit).nte();
        self.tables
            .fib
            .find_longest_prefix_match_at(&self.tables.name_tree, nte)
    }

    /// Whether forwarding the pending Interest on `out_face` would violate
    /// scope.
    pub fn violates_scope(&self, pit: PitIndex, out_face: FaceId) -> bool {
        let Some(face) = self.faces.get(out_face) else {
            return true;
        };
        algorithm::violates_scope(self.tables.pit.entry(pit), face, self.faces)
    }

    /// Finds or creates the Measurements entry for `name`.
    pub fn measurements_get(&mut self, name: &Name) -> EntryIndex {
        self.tables
            .measurements
            .get(&mut self.tables.name_tree, name)
    }

    pub fn measurements_entry_mut(
        &mut self,
        nte: EntryIndex,
    ) -> Option<&mut crate::table::measurements::Entry> {
        self.tables
            .measurements
            .entry_mut(&mut self.tables.name_tree, nte)
    }

    pub fn measurements_extend_lifetime(
        &mut self,
        nte: EntryIndex,
        lifetime: Duration,
    ) {
        self.tables.measurements.extend_lifetime(
            &mut self.tables.name_tree,
            nte,
            lifetime,
        );
    }

    /// Outgoing Interest pipeline: records the upstream and sends the
    /// pending Interest on `out_face`.
    pub fn send_interest(&mut self, pit: PitIndex, out_face: FaceId) {
        let Some(face) = self.faces.get(out_face) else {
            warn!(face = out_face, "outgoing Interest to unknown face");
            return;
        };
        if algorithm::violates_scope(
            self.tables.pit.entry(pit),
            face,
            self.faces,
        ) {
            debug!(face = out_face, "outgoing Interest violates scope");
            return;
        }

        let entry = self.tables.pit.entry_mut(pit);
        let interest = entry.interest().clone();
        entry.insert_or_update_out_record(out_face, &interest);
        reset_unsatisfy_timer(entry, pit, self.fw_msgp);

        self.counters.n_out_interests += 1;
        face.send_interest(&interest);
    }

    /// Sends Data on `out_face`.
    pub fn send_data(&mut self, pit: PitIndex, data: &Data, out_face: FaceId) {
        let Some(face) = self.faces.get(out_face) else {
            warn!(face = out_face, "outgoing Data to unknown face");
            return;
        };
        self.tables.pit.entry_mut(pit).delete_in_record(out_face);
        self.counters.n_out_data += 1;
        face.send_data(data);
    }

    /// Sends a Nack to one downstream. Requires an in-record on that face;
    /// the in-record is consumed.
    pub fn send_nack(
        &mut self,
        pit: PitIndex,
        downstream: FaceId,
        reason: NackReason,
    ) {
        let entry = self.tables.pit.entry_mut(pit);
        let Some(record) = entry.in_record(downstream) else {
            debug!(face = downstream, "no in-record, Nack not sent");
            return;
        };
        let mut interest = entry.interest().clone();
        interest.nonce = Some(record.last_nonce);
        entry.delete_in_record(downstream);

        let Some(face) = self.faces.get(downstream) else {
            return;
        };
        self.counters.n_out_nacks += 1;
        face.send_nack(&Nack::new(reason, interest));
    }

    /// Sends a Nack to every downstream.
    pub fn send_nacks(&mut self, pit: PitIndex, reason: NackReason) {
        let downstreams: Vec<_> = self
            .tables
            .pit
            .entry(pit)
            .in_records()
            .iter()
            .map(|record| record.face)
            .collect();
        for downstream in downstreams {
            self.send_nack(pit, downstream, reason);
        }
    }

    /// Gives up on the pending Interest: removes the in-records so no Data
    /// will ever be returned downstream, and schedules straggler cleanup.
    pub fn reject_pending_interest(&mut self, pit: PitIndex) {
        let entry = self.tables.pit.entry_mut(pit);
        entry.clear_in_records();
        entry.unsatisfy_timer = None;
        entry.straggler_timer = Some(tasks::pit_straggler_timer(
            pit,
            STRAGGLER_TIMEOUT,
            self.fw_msgp,
        ));
    }
}

// ===== global functions =====

// Cancels and reschedules the unsatisfy timer at the latest in-record
// expiry (or the Interest lifetime when no in-record exists yet).
pub(crate) fn reset_unsatisfy_timer(
    entry: &mut pit::Entry,
    pit: PitIndex,
    fw_msgp: &UnboundedSender<FwMsg>,
) {
    let now = Instant::now();
    let lifetime = entry.interest().lifetime_or_default();
    let timeout = entry
        .last_in_expiry()
        .map(|expiry| expiry.saturating_duration_since(now))
        .unwrap_or(lifetime)
        .max(lifetime);
    entry.unsatisfy_timer =
        Some(tasks::pit_unsatisfy_timer(pit, timeout, fw_msgp));
}
