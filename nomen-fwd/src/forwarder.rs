//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use nomen_utils::face::{
    FACEID_CONTENT_STORE, FaceEventKind, FaceId, FaceScope, LinkType,
};
use nomen_utils::ibus::{
    FaceEventMsg, FibAction, FibBatchOutcome, FibUpdateBatch, IbusMsg,
    IbusReceiver, IbusSender,
};
use nomen_utils::name::Name;
use nomen_utils::packet::{Data, Interest, Nack, NackReason};
use nomen_utils::uri::FaceUri;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{Instrument, debug, debug_span, warn};

use crate::counters::ForwarderCounters;
use crate::face::{FaceTable, FaceTx};
use crate::fw::strategy::{self, Strategy, StrategyCtx};
use crate::fw::{algorithm, best_route};
use crate::mgmt::{
    ControlCommand, ControlParameters, ControlResponse, FibRecord,
};
use crate::name_tree::{EntryIndex, HashtableOptions};
use crate::table::Tables;
use crate::table::cs::{ContentStore, UnsolicitedDataPolicy};
use crate::table::pit::PitIndex;
use crate::tasks::{self, FwMsg, Packet};

/// The forwarding plane: faces, tables, Content Store, and the
/// Interest/Data/Nack pipelines, driven by a single-threaded message loop.
pub struct Forwarder {
    tables: Tables,
    faces: FaceTable,
    cs: ContentStore,
    counters: ForwarderCounters,
    unsolicited_policy: UnsolicitedDataPolicy,
    fw_msgp: UnboundedSender<FwMsg>,
    ibus_tx: Option<IbusSender>,
    face_event_tx: Option<UnboundedSender<FaceEventMsg>>,
}

// ===== impl Forwarder =====

impl Forwarder {
    pub fn new(
        options: HashtableOptions,
        fw_msgp: UnboundedSender<FwMsg>,
    ) -> Forwarder {
        let mut tables = Tables::new(options, fw_msgp.clone());
        tables.strategy_choice.install(
            best_route::STRATEGY_NAME.clone(),
            Box::new(best_route::BestRouteStrategy::factory),
        );
        tables
            .strategy_choice
            .set_default(&mut tables.name_tree, &best_route::STRATEGY_NAME);

        Forwarder {
            tables,
            faces: FaceTable::new(),
            cs: ContentStore::default(),
            counters: ForwarderCounters::default(),
            unsolicited_policy: UnsolicitedDataPolicy::default(),
            fw_msgp,
            ibus_tx: None,
            face_event_tx: None,
        }
    }

    pub fn set_ibus_tx(&mut self, ibus_tx: IbusSender) {
        self.ibus_tx = Some(ibus_tx);
    }

    pub fn set_face_event_tx(&mut self, tx: UnboundedSender<FaceEventMsg>) {
        self.face_event_tx = Some(tx);
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    pub fn tables_mut(&mut self) -> &mut Tables {
        &mut self.tables
    }

    pub fn faces(&self) -> &FaceTable {
        &self.faces
    }

    pub fn faces_mut(&mut self) -> &mut FaceTable {
        &mut self.faces
    }

    pub fn content_store_mut(&mut self) -> &mut ContentStore {
        &mut self.cs
    }

    pub fn counters(&self) -> &ForwarderCounters {
        &self.counters
    }

    pub fn set_unsolicited_policy(&mut self, policy: UnsolicitedDataPolicy) {
        self.unsolicited_policy = policy;
    }

    /// Applies a `strategy_choice` configuration item.
    pub fn set_strategy_choice(
        &mut self,
        prefix: &Name,
        strategy_name: &Name,
    ) -> bool {
        self.tables.strategy_choice.insert(
            &mut self.tables.name_tree,
            &mut self.tables.pit,
            prefix,
            strategy_name,
        )
    }

    /// Registers a face and announces it.
    pub fn add_face(
        &mut self,
        scope: FaceScope,
        link_type: LinkType,
        uri: Option<FaceUri>,
        tx: UnboundedSender<FaceTx>,
    ) -> FaceId {
        let id = self.faces.add(scope, link_type, uri.clone(), tx);
        self.emit_face_event(id, FaceEventKind::Created, uri);
        id
    }

    /// Destroys a face: FIB next-hops and PIT records referring to it are
    /// dropped, and the RIB loop is notified so routes follow.
    pub fn remove_face(&mut self, id: FaceId) {
        if self.faces.remove(id).is_none() {
            return;
        }
        self.tables
            .fib
            .remove_next_hop_from_all_entries(&mut self.tables.name_tree, id);
        self.tables.pit.delete_face_records(id);
        self.emit_face_event(id, FaceEventKind::Destroyed, None);
    }

    fn emit_face_event(
        &self,
        face_id: FaceId,
        kind: FaceEventKind,
        uri: Option<FaceUri>,
    ) {
        let event = FaceEventMsg { face_id, kind, uri };
        if let Some(tx) = &self.face_event_tx {
            let _ = tx.send(event.clone());
        }
        if let Some(ibus_tx) = &self.ibus_tx {
            let _ = ibus_tx.send(IbusMsg::FaceEvent(event));
        }
    }

    // ===== Interest pipeline =====

    pub fn on_interest(&mut self, in_face: FaceId, mut interest: Interest) {
        self.counters.n_in_interests += 1;
        let Some(face) = self.faces.get(in_face) else {
            debug!(face = in_face, "Interest from unknown face, dropped");
            return;
        };

        // /localhost scope from a non-local face.
        if !face.is_local() && algorithm::LOCALHOST.is_prefix_of(&interest.name)
        {
            debug!(name = %interest.name, face = in_face, "localhost scope violation, dropped");
            return;
        }

        let nonce = interest.ensure_nonce();
        let (pit, _is_new) =
            self.tables.pit.insert(&mut self.tables.name_tree, &interest);

        // Duplicate-nonce check against the entry's records. A duplicate
        // on the same in-record is a retransmission; anything else is a
        // loop.
        let dnw = algorithm::find_duplicate_nonce(
            self.tables.pit.entry(pit),
            nonce,
            in_face,
        );
        if dnw.is_loop() {
            debug!(name = %interest.name, face = in_face, nonce, "duplicate nonce, loop");
            self.counters.n_out_nacks += 1;
            face.send_nack(&Nack::new(NackReason::Duplicate, interest));
            return;
        }

        strategy::reset_unsatisfy_timer(
            self.tables.pit.entry_mut(pit),
            pit,
            &self.fw_msgp,
        );

        // Content Store lookup.
        if let Some(data) = self.cs.find(&interest).cloned() {
            self.counters.n_cs_hits += 1;
            debug!(name = %interest.name, face = in_face, "content store hit");
            self.tables
                .pit
                .entry_mut(pit)
                .insert_or_update_in_record(in_face, &interest);
            self.dispatch(pit, |strategy, ctx| {
                strategy.before_satisfy_interest(
                    ctx,
                    pit,
                    FACEID_CONTENT_STORE,
                    &data,
                );
                strategy.after_content_store_hit(ctx, pit, in_face, &data);
            });
            self.finalize_satisfy(pit);
            return;
        }
        self.counters.n_cs_misses += 1;

        self.tables
            .pit
            .entry_mut(pit)
            .insert_or_update_in_record(in_face, &interest);

        self.dispatch(pit, |strategy, ctx| {
            strategy.after_receive_interest(ctx, in_face, &interest, pit);
        });
    }

    // ===== Data pipeline =====

    pub fn on_data(&mut self, in_face: FaceId, data: Data) {
        self.counters.n_in_data += 1;
        let Some(face) = self.faces.get(in_face) else {
            debug!(face = in_face, "Data from unknown face, dropped");
            return;
        };
        if !face.is_local() && algorithm::LOCALHOST.is_prefix_of(&data.name) {
            debug!(name = %data.name, face = in_face, "localhost scope violation, dropped");
            return;
        }

        let matches = self
            .tables
            .pit
            .find_all_data_matches(&self.tables.name_tree, &data);
        if matches.is_empty() {
            if self.unsolicited_policy.admits() {
                debug!(name = %data.name, "unsolicited Data admitted");
                self.cs.insert(data);
            } else {
                debug!(name = %data.name, "unsolicited Data dropped");
            }
            return;
        }

        self.cs.insert(data.clone());

        for pit in matches {
            // Stop the entry's clocks before satisfying it.
            {
                let entry = self.tables.pit.entry_mut(pit);
                entry.unsatisfy_timer = None;
                entry.straggler_timer = None;
            }

            self.dispatch(pit, |strategy, ctx| {
                strategy.before_satisfy_interest(ctx, pit, in_face, &data);
                strategy.after_receive_data(ctx, pit, in_face, &data);
            });

            // Return the Data to every downstream except the one it came
            // from.
            let downstreams: Vec<_> = self
                .tables
                .pit
                .entry(pit)
                .in_records()
                .iter()
                .map(|record| record.face)
                .filter(|downstream| *downstream != in_face)
                .collect();
            for downstream in downstreams {
                if let Some(out_face) = self.faces.get(downstream) {
                    self.counters.n_out_data += 1;
                    out_face.send_data(&data);
                }
            }

            self.counters.n_satisfied_interests += 1;
            self.finalize_satisfy(pit);
        }
    }

    // Clears in-records and leaves the satisfied entry behind a straggler
    // window absorbing late duplicates, after which it is erased.
    fn finalize_satisfy(&mut self, pit: PitIndex) {
        let entry = self.tables.pit.entry_mut(pit);
        entry.clear_in_records();
        entry.unsatisfy_timer = None;
        entry.straggler_timer = Some(tasks::pit_straggler_timer(
            pit,
            strategy::STRAGGLER_TIMEOUT,
            &self.fw_msgp,
        ));
    }

    // ===== Nack pipeline =====

    pub fn on_nack(&mut self, in_face: FaceId, nack: Nack) {
        self.counters.n_in_nacks += 1;
        let Some(pit) = self.tables.pit.find(
            &self.tables.name_tree,
            &nack.interest.name,
            &nack.interest.selectors,
        ) else {
            debug!(name = %nack.interest.name, "Nack without PIT entry, dropped");
            return;
        };

        let entry = self.tables.pit.entry_mut(pit);
        let Some(record) = entry.out_record_mut(in_face) else {
            debug!(name = %nack.interest.name, face = in_face, "Nack without out-record, dropped");
            return;
        };
        if !record.set_incoming_nack(&nack) {
            debug!(name = %nack.interest.name, face = in_face, "stale Nack, dropped");
            return;
        }

        self.dispatch(pit, |strategy, ctx| {
            strategy.after_receive_nack(ctx, in_face, &nack, pit);
        });
    }

    // ===== timer events =====

    fn on_pit_unsatisfied(&mut self, pit: PitIndex) {
        if self.tables.pit.get(pit).is_none() {
            return;
        }
        debug!(name = %self.tables.pit.entry(pit).name(), "Interest unsatisfied");
        self.dispatch(pit, |strategy, ctx| {
            strategy.before_expire_pending_interest(ctx, pit);
        });
        self.counters.n_unsatisfied_interests += 1;
        self.tables.pit.erase(&mut self.tables.name_tree, pit);
    }

    fn on_pit_straggler(&mut self, pit: PitIndex) {
        self.tables.pit.erase(&mut self.tables.name_tree, pit);
    }

    fn on_measurements_expire(&mut self, nte: EntryIndex) {
        self.tables
            .measurements
            .cleanup(&mut self.tables.name_tree, nte);
    }

    // ===== strategy dispatch =====

    // Runs a strategy callback with the effective strategy for the PIT
    // entry. The instance is taken out of its choice entry for the
    // duration of the call; strategies cannot mutate the choice table, so
    // the slot is guaranteed to still exist afterwards.
    fn dispatch<R>(
        &mut self,
        pit: PitIndex,
        f: impl FnOnce(&mut dyn Strategy, &mut StrategyCtx<'_>) -> R,
    ) -> R {
        let nte = self.tables.pit.entry(pit).nte();
        let choice_nte = self
            .tables
            .strategy_choice
            .find_effective_strategy_at(&self.tables.name_tree, nte);
        let mut instance = self
            .tables
            .strategy_choice
            .take_instance(&mut self.tables.name_tree, choice_nte);
        let mut ctx = StrategyCtx::new(
            &mut self.tables,
            &self.faces,
            &mut self.counters,
            &self.fw_msgp,
        );
        let result = f(instance.as_mut(), &mut ctx);
        self.tables.strategy_choice.put_instance(
            &mut self.tables.name_tree,
            choice_nte,
            instance,
        );
        result
    }

    // ===== FIB updates and management =====

    /// Applies a FIB update batch atomically: the batch is validated in
    /// full before any change is made.
    pub fn apply_fib_batch(&mut self, batch: &FibUpdateBatch) -> FibBatchOutcome {
        for update in &batch.updates {
            if update.action == FibAction::AddNexthop
                && self.faces.get(update.face_id).is_none()
            {
                warn!(face = update.face_id, "FIB update batch references unknown face");
                return FibBatchOutcome {
                    id: batch.id,
                    code: ControlResponse::FACE_NOT_FOUND,
                    error: Some(format!("face {} not found", update.face_id)),
                };
            }
        }

        for update in &batch.updates {
            debug!(%update, "applying FIB update");
            match update.action {
                FibAction::AddNexthop => {
                    let (nte, _) = self
                        .tables
                        .fib
                        .insert(&mut self.tables.name_tree, &update.name);
                    self.tables
                        .name_tree
                        .entry_mut(nte)
                        .fib
                        .as_mut()
                        .unwrap()
                        .add_or_update_next_hop(update.face_id, update.cost);
                }
                FibAction::RemoveNexthop => {
                    if let Some(nte) =
                        self.tables.name_tree.find_exact(&update.name)
                    {
                        self.tables.fib.remove_next_hop(
                            &mut self.tables.name_tree,
                            nte,
                            update.face_id,
                        );
                    }
                }
            }
        }
        FibBatchOutcome { id: batch.id, code: ControlResponse::OK, error: None }
    }

    fn on_control(
        &mut self,
        ingress: FaceId,
        command: ControlCommand,
    ) -> ControlResponse {
        match command {
            ControlCommand::FibAddNexthop(params) => {
                let face_id = resolve_face_id(&params, ingress);
                if self.faces.get(face_id).is_none() {
                    return ControlResponse::face_not_found();
                }
                let (nte, _) = self
                    .tables
                    .fib
                    .insert(&mut self.tables.name_tree, &params.name);
                self.tables
                    .name_tree
                    .entry_mut(nte)
                    .fib
                    .as_mut()
                    .unwrap()
                    .add_or_update_next_hop(face_id, params.cost.unwrap_or(0));
                ControlResponse::ok()
            }
            ControlCommand::FibRemoveNexthop(params) => {
                let face_id = resolve_face_id(&params, ingress);
                if let Some(nte) =
                    self.tables.name_tree.find_exact(&params.name)
                {
                    self.tables.fib.remove_next_hop(
                        &mut self.tables.name_tree,
                        nte,
                        face_id,
                    );
                }
                ControlResponse::ok()
            }
        }
    }

    fn fib_dataset(&self) -> Vec<FibRecord> {
        self.tables
            .fib
            .list(&self.tables.name_tree)
            .into_iter()
            .map(|entry| FibRecord {
                prefix: entry.prefix().clone(),
                nexthops: entry
                    .next_hops()
                    .iter()
                    .map(|nexthop| (nexthop.face, nexthop.cost))
                    .collect(),
            })
            .collect()
    }

    // ===== message processing =====

    pub fn process_msg(&mut self, msg: FwMsg) {
        match msg {
            FwMsg::Packet { face, packet } => match packet {
                Packet::Interest(interest) => self.on_interest(face, interest),
                Packet::Data(data) => self.on_data(face, data),
                Packet::Nack(nack) => self.on_nack(face, nack),
            },
            FwMsg::FaceAdd { scope, link_type, uri, tx, reply } => {
                let id = self.add_face(scope, link_type, uri, tx);
                let _ = reply.send(id);
            }
            FwMsg::FaceRemove(face) => self.remove_face(face),
            FwMsg::PitUnsatisfied(pit) => self.on_pit_unsatisfied(pit),
            FwMsg::PitStraggler(pit) => self.on_pit_straggler(pit),
            FwMsg::MeasurementsExpire(nte) => self.on_measurements_expire(nte),
            FwMsg::Ibus(msg) => self.process_ibus_msg(msg),
            FwMsg::Control { ingress, command, reply } => {
                let response = self.on_control(ingress, command);
                let _ = reply.send(response);
            }
            FwMsg::FibDataset { reply } => {
                let _ = reply.send(self.fib_dataset());
            }
        }
    }

    fn process_ibus_msg(&mut self, msg: IbusMsg) {
        match msg {
            IbusMsg::FibUpdateBatch(batch) => {
                let outcome = self.apply_fib_batch(&batch);
                if let Some(ibus_tx) = &self.ibus_tx {
                    let _ = ibus_tx.send(IbusMsg::FibBatchOutcome(outcome));
                }
            }
            // Outcomes and face events flow the other way.
            IbusMsg::FibBatchOutcome(_) | IbusMsg::FaceEvent(_) => (),
        }
    }

    /// The main loop: packets, timers, management, and cross-loop
    /// messages, processed one at a time.
    pub async fn run(
        mut self,
        mut fw_msgc: UnboundedReceiver<FwMsg>,
        mut ibus_rx: IbusReceiver,
    ) {
        let span = debug_span!("forwarder");
        async move {
            loop {
                tokio::select! {
                    Some(msg) = fw_msgc.recv() => {
                        self.process_msg(msg);
                    }
                    Some(msg) = ibus_rx.recv() => {
                        self.process_ibus_msg(msg);
                    }
                    else => break,
                }
            }
        }
        .instrument(span)
        .await
    }
}

// ===== global functions =====

// A face_id of 0 (or none) in command parameters selects the ingress face
// of the command.
fn resolve_face_id(params: &ControlParameters, ingress: FaceId) -> FaceId {
    match params.face_id {
        None | Some(0) => ingress,
        Some(face_id) => face_id,
    }
}

/// Spawns the forwarder on its own task.
pub fn start(
    forwarder: Forwarder,
    fw_msgc: UnboundedReceiver<FwMsg>,
    ibus_rx: IbusReceiver,
) -> nomen_utils::task::Task<()> {
    nomen_utils::task::Task::spawn(forwarder.run(fw_msgc, ibus_rx))
}
