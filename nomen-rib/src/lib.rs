//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![cfg_attr(
    feature = "testing",
    allow(dead_code, unused_variables, unused_imports)
)]

pub mod error;
pub mod fib_updater;
pub mod rib;
pub mod update;

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use nomen_utils::face::{FaceEventKind, FaceId};
use nomen_utils::ibus::{
    FibUpdateBatch, IbusMsg, IbusReceiver, IbusSender,
};
use nomen_utils::name::Name;
use nomen_utils::task::{Task, TimeoutTask};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{Instrument, debug, debug_span};

use crate::error::Error;
use crate::fib_updater::FibUpdaterOutput;
use crate::rib::Rib;
use crate::update::{
    RibUpdate, RibUpdateAction, RibUpdateBatch, Route, RouteOrigin,
};

/// Messages processed by the RIB loop.
#[derive(Debug)]
pub enum RibMsg {
    /// Register a route.
    Register { name: Name, route: Route },
    /// Unregister a route.
    Unregister { name: Name, route: Route },
    /// A route's validity period elapsed.
    RouteExpired { name: Name, route: Route },
    /// Retry the batch that previously failed.
    RetryBatch,
}

// A batch sent to the forwarder, awaiting its outcome.
#[derive(Debug)]
struct InFlight {
    batch_id: u64,
    rib_batch: RibUpdateBatch,
    inherited_updates: Vec<RibUpdate>,
}

/// The RIB loop master: owns the RIB and the FIB updater, and talks to
/// the forwarding loop exclusively over the ibus.
pub struct Master {
    rib: Rib,
    // Ibus Tx channel (to the main loop).
    ibus_tx: IbusSender,
    // Self channel, used by timers.
    rib_msgp: UnboundedSender<RibMsg>,
    update_queue: VecDeque<RibUpdateBatch>,
    in_flight: Option<InFlight>,
    next_batch_id: u64,
    retry_delay: Duration,
    retry_timer: Option<TimeoutTask>,
    expiration_timers: HashMap<(Name, FaceId, RouteOrigin), TimeoutTask>,
}

// ===== impl Master =====

impl Master {
    /// Retry back-off bounds for failed FIB update batches.
    const RETRY_INITIAL: Duration = Duration::from_secs(50);
    const RETRY_MAX: Duration = Duration::from_secs(3600);
    const RETRY_JITTER: Duration = Duration::from_millis(5);

    pub fn new(
        ibus_tx: IbusSender,
        rib_msgp: UnboundedSender<RibMsg>,
    ) -> Master {
        Master {
            rib: Rib::new(),
            ibus_tx,
            rib_msgp,
            update_queue: VecDeque::new(),
            in_flight: None,
            next_batch_id: 1,
            retry_delay: Master::RETRY_INITIAL,
            retry_timer: None,
            expiration_timers: HashMap::new(),
        }
    }

    pub fn rib(&self) -> &Rib {
        &self.rib
    }

    /// Queues one route registration or unregistration. Each queued batch
    /// carries exactly one update; face removals are the only multi-update
    /// batches.
    pub fn begin_apply_update(&mut self, update: RibUpdate) {
        let mut batch = RibUpdateBatch::new(update.route.face_id);
        batch.add(update);
        self.update_queue.push_back(batch);
        self.send_batch_from_queue();
    }

    /// Queues the unregistration of every route on a destroyed face,
    /// coalesced into a single batch.
    pub fn begin_remove_face(&mut self, face_id: FaceId) {
        let routes = self.rib.routes_with_face(face_id);
        if routes.is_empty() {
            return;
        }
        let mut batch = RibUpdateBatch::new(face_id);
        for (name, route) in routes {
            batch.add(RibUpdate::new(
                RibUpdateAction::RemoveFace,
                name,
                route,
            ));
        }
        self.update_queue.push_back(batch);
        self.send_batch_from_queue();
    }

    // Issues the next queued batch, unless one is already in flight.
    fn send_batch_from_queue(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        let Some(rib_batch) = self.update_queue.pop_front() else {
            return;
        };

        let FibUpdaterOutput { fib_updates, inherited_updates } =
            fib_updater::compute_updates(&self.rib, &rib_batch);

        if fib_updates.is_empty() {
            // Nothing to tell the forwarder; the RIB change applies
            // directly.
            self.apply_batch(&rib_batch, &inherited_updates);
            self.send_batch_from_queue();
            return;
        }

        let batch_id = self.next_batch_id;
        self.next_batch_id += 1;
        debug!(batch_id, n_updates = fib_updates.len(), "sending FIB update batch");
        let _ = self.ibus_tx.send(IbusMsg::FibUpdateBatch(FibUpdateBatch {
            id: batch_id,
            face_id: rib_batch.face_id,
            updates: fib_updates,
        }));
        self.in_flight =
            Some(InFlight { batch_id, rib_batch, inherited_updates });
    }

    // Success path: materialize the batch into the RIB.
    fn apply_batch(
        &mut self,
        batch: &RibUpdateBatch,
        inherited_updates: &[RibUpdate],
    ) {
        for update in &batch.updates {
            match update.action {
                RibUpdateAction::Register => {
                    self.rib.insert(&update.name, update.route);
                    self.schedule_expiration(&update.name, &update.route);
                }
                RibUpdateAction::Unregister | RibUpdateAction::RemoveFace => {
                    self.rib.erase(&update.name, &update.route);
                    self.expiration_timers.remove(&(
                        update.name.clone(),
                        update.route.face_id,
                        update.route.origin,
                    ));
                }
            }
        }
        self.rib.modify_inherited_routes(inherited_updates);
    }

    fn schedule_expiration(&mut self, name: &Name, route: &Route) {
        let key = (name.clone(), route.face_id, route.origin);
        match route.expires {
            Some(expires) => {
                let rib_msgp = self.rib_msgp.clone();
                let name = name.clone();
                let route = *route;
                // Replacing the slot cancels any previous timer.
                self.expiration_timers.insert(
                    key,
                    TimeoutTask::new(expires, move || async move {
                        let _ = rib_msgp
                            .send(RibMsg::RouteExpired { name, route });
                    }),
                );
            }
            None => {
                self.expiration_timers.remove(&key);
            }
        }
    }

    fn on_batch_outcome(&mut self, id: u64, code: u32, error: Option<String>) {
        let Some(in_flight) = self.in_flight.take() else {
            Error::UnknownBatchOutcome(id).log();
            return;
        };
        if in_flight.batch_id != id {
            Error::UnknownBatchOutcome(id).log();
            self.in_flight = Some(in_flight);
            return;
        }

        if code == 200 {
            self.apply_batch(
                &in_flight.rib_batch,
                &in_flight.inherited_updates,
            );
            self.retry_delay = Master::RETRY_INITIAL;
            self.send_batch_from_queue();
            return;
        }

        // Failure: the batch goes back to the head of the queue and is
        // recomputed after an exponentially backed-off, jittered delay.
        Error::FibUpdateFailed(id, code, error).log();
        self.update_queue.push_front(in_flight.rib_batch);
        let jitter_us = Master::RETRY_JITTER.as_micros() as i64;
        let jitter = rand::rng().random_range(-jitter_us..=jitter_us);
        let delay_us = self.retry_delay.as_micros() as i64 + jitter;
        let delay = Duration::from_micros(delay_us.max(0) as u64);
        self.retry_delay =
            Duration::min(self.retry_delay * 2, Master::RETRY_MAX);
        let rib_msgp = self.rib_msgp.clone();
        self.retry_timer = Some(TimeoutTask::new(delay, move || async move {
            let _ = rib_msgp.send(RibMsg::RetryBatch);
        }));
    }

    pub fn process_msg(&mut self, msg: RibMsg) {
        match msg {
            RibMsg::Register { name, route } => {
                self.begin_apply_update(RibUpdate::new(
                    RibUpdateAction::Register,
                    name,
                    route,
                ));
            }
            RibMsg::Unregister { name, route } => {
                self.begin_apply_update(RibUpdate::new(
                    RibUpdateAction::Unregister,
                    name,
                    route,
                ));
            }
            RibMsg::RouteExpired { name, route } => {
                debug!(%name, %route, "route expired");
                self.begin_apply_update(RibUpdate::new(
                    RibUpdateAction::Unregister,
                    name,
                    route,
                ));
            }
            RibMsg::RetryBatch => {
                self.retry_timer = None;
                self.send_batch_from_queue();
            }
        }
    }

    pub fn process_ibus_msg(&mut self, msg: IbusMsg) {
        match msg {
            IbusMsg::FibBatchOutcome(outcome) => {
                self.on_batch_outcome(outcome.id, outcome.code, outcome.error);
            }
            IbusMsg::FaceEvent(event) => {
                if event.kind == FaceEventKind::Destroyed {
                    self.begin_remove_face(event.face_id);
                }
            }
            // Update batches flow the other way.
            IbusMsg::FibUpdateBatch(_) => (),
        }
    }

    async fn run(
        mut self,
        mut rib_msgc: UnboundedReceiver<RibMsg>,
        mut ibus_rx: IbusReceiver,
    ) {
        loop {
            tokio::select! {
                Some(msg) = rib_msgc.recv() => {
                    self.process_msg(msg);
                }
                Some(msg) = ibus_rx.recv() => {
                    self.process_ibus_msg(msg);
                }
                else => break,
            }
        }
    }
}

// ===== global functions =====

/// Spawns the RIB loop, returning its message sender.
pub fn start(
    ibus_tx: IbusSender,
    ibus_rx: IbusReceiver,
) -> (UnboundedSender<RibMsg>, Task<()>) {
    let (rib_msgp, rib_msgc) = mpsc::unbounded_channel();
    let master = Master::new(ibus_tx, rib_msgp.clone());
    let span = debug_span!("rib");
    let task =
        Task::spawn(master.run(rib_msgc, ibus_rx).instrument(span));
    (rib_msgp, task)
}
