//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use nomen_fwd::forwarder::Forwarder;
use nomen_fwd::name_tree::HashtableOptions;
use nomen_rib::update::{Route, RouteFlags};
use nomen_rib::{Master, RibMsg};
use nomen_utils::face::{FaceEventKind, FaceId, FaceScope, LinkType};
use nomen_utils::ibus::{FaceEventMsg, FibAction, IbusMsg, IbusReceiver};
use nomen_utils::name::Name;
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedReceiver;

//
// Helper functions.
//

fn name(uri: &str) -> Name {
    uri.parse().unwrap()
}

fn route(face_id: FaceId, cost: u64, flags: RouteFlags) -> Route {
    Route::new(face_id, 0, cost, flags, None)
}

// A RIB master wired back-to-back with a real forwarder: every batch the
// master emits is applied to the forwarder's FIB and acknowledged.
struct Fixture {
    master: Master,
    forwarder: Forwarder,
    ibus_rx: IbusReceiver,
    rib_msgc: UnboundedReceiver<RibMsg>,
}

impl Fixture {
    fn new() -> Fixture {
        let (ibus_tx, ibus_rx) = mpsc::unbounded_channel();
        let (rib_msgp, rib_msgc) = mpsc::unbounded_channel();
        let (fw_msgp, _fw_msgc) = mpsc::unbounded_channel();
        Fixture {
            master: Master::new(ibus_tx, rib_msgp),
            forwarder: Forwarder::new(HashtableOptions::new(16), fw_msgp),
            ibus_rx,
            rib_msgc,
        }
    }

    fn add_face(&mut self) -> FaceId {
        let (tx, _rx) = mpsc::unbounded_channel();
        self.forwarder
            .add_face(FaceScope::NonLocal, LinkType::PointToPoint, None, tx)
    }

    // Relays pending batches to the forwarder and their outcomes back,
    // until the bus is quiet.
    fn pump(&mut self) {
        while let Ok(msg) = self.ibus_rx.try_recv() {
            if let IbusMsg::FibUpdateBatch(batch) = msg {
                let outcome = self.forwarder.apply_fib_batch(&batch);
                self.master
                    .process_ibus_msg(IbusMsg::FibBatchOutcome(outcome));
            }
        }
    }

    fn register(&mut self, prefix: &str, route: Route) {
        self.master.process_msg(RibMsg::Register {
            name: name(prefix),
            route,
        });
        self.pump();
    }

    fn unregister(&mut self, prefix: &str, route: Route) {
        self.master.process_msg(RibMsg::Unregister {
            name: name(prefix),
            route,
        });
        self.pump();
    }

    fn fib_nexthops(&self, prefix: &str) -> Option<Vec<(FaceId, u64)>> {
        let tables = self.forwarder.tables();
        tables.fib.find_exact(&tables.name_tree, &name(prefix)).map(|entry| {
            entry
                .next_hops()
                .iter()
                .map(|nexthop| (nexthop.face, nexthop.cost))
                .collect()
        })
    }

    // The cached inherited routes must always equal the recomputed
    // ancestor set.
    fn assert_inherited_invariant(&self) {
        let rib = self.master.rib();
        for (entry_name, entry) in rib.entries() {
            let mut cached: Vec<_> = entry
                .inherited_routes()
                .iter()
                .map(|route| (route.face_id, route.origin))
                .collect();
            let mut computed: Vec<_> = rib
                .ancestor_routes(entry_name)
                .iter()
                .map(|route| (route.face_id, route.origin))
                .collect();
            cached.sort();
            computed.sort();
            assert_eq!(cached, computed, "inherited cache of {entry_name}");
        }
    }
}

//
// Tests.
//

// Child-inherit projection and its undoing.
#[tokio::test(start_paused = true)]
async fn child_inherit_projection() {
    let mut fixture = Fixture::new();
    let face1 = fixture.add_face();
    let face2 = fixture.add_face();

    fixture.register("/A", route(face1, 10, RouteFlags::CHILD_INHERIT));
    assert_eq!(fixture.fib_nexthops("/A"), Some(vec![(face1, 10)]));

    fixture.register("/A/B", route(face2, 5, RouteFlags::empty()));
    assert_eq!(
        fixture.fib_nexthops("/A/B"),
        Some(vec![(face2, 5), (face1, 10)])
    );
    fixture.assert_inherited_invariant();

    fixture.unregister("/A", route(face1, 10, RouteFlags::CHILD_INHERIT));
    assert_eq!(fixture.fib_nexthops("/A"), None);
    assert_eq!(fixture.fib_nexthops("/A/B"), Some(vec![(face2, 5)]));
    fixture.assert_inherited_invariant();
}

// Capture blocks ancestor inheritance and projects its own route into
// the captured namespace.
#[tokio::test(start_paused = true)]
async fn capture_blocks_inheritance() {
    let mut fixture = Fixture::new();
    let face10 = fixture.add_face();
    let face20 = fixture.add_face();
    let face30 = fixture.add_face();

    fixture.register("/", route(face10, 1, RouteFlags::CHILD_INHERIT));
    fixture.register("/A", route(face20, 1, RouteFlags::CAPTURE));
    fixture.register("/A/B", route(face30, 1, RouteFlags::empty()));

    assert_eq!(fixture.fib_nexthops("/"), Some(vec![(face10, 1)]));
    // No face10 below the capture point.
    assert_eq!(fixture.fib_nexthops("/A"), Some(vec![(face20, 1)]));
    let mut below = fixture.fib_nexthops("/A/B").unwrap();
    below.sort();
    let mut expected = vec![(face30, 1), (face20, 1)];
    expected.sort();
    assert_eq!(below, expected);
    fixture.assert_inherited_invariant();
}

// Removing a capture uncovers the previously masked ancestor routes.
#[tokio::test(start_paused = true)]
async fn unregister_uncovers_masked_routes() {
    let mut fixture = Fixture::new();
    let face10 = fixture.add_face();
    let face20 = fixture.add_face();
    let face30 = fixture.add_face();

    fixture.register("/", route(face10, 1, RouteFlags::CHILD_INHERIT));
    fixture.register("/A", route(face20, 1, RouteFlags::CAPTURE));
    fixture.register("/A/B", route(face30, 1, RouteFlags::empty()));

    fixture.unregister("/A", route(face20, 1, RouteFlags::CAPTURE));
    assert_eq!(fixture.fib_nexthops("/A"), None);
    let mut below = fixture.fib_nexthops("/A/B").unwrap();
    below.sort();
    let mut expected = vec![(face30, 1), (face10, 1)];
    expected.sort();
    assert_eq!(below, expected);
    fixture.assert_inherited_invariant();
}

// A new namespace inherits from its closest ancestor at creation.
#[tokio::test(start_paused = true)]
async fn new_namespace_materializes_inheritance() {
    let mut fixture = Fixture::new();
    let face1 = fixture.add_face();
    let face2 = fixture.add_face();
    let face3 = fixture.add_face();

    fixture.register("/a", route(face2, 70, RouteFlags::CHILD_INHERIT));
    fixture.register("/a", route(face3, 30, RouteFlags::CHILD_INHERIT));
    fixture.register("/a/b", route(face1, 10, RouteFlags::empty()));

    let mut nexthops = fixture.fib_nexthops("/a/b").unwrap();
    nexthops.sort();
    let mut expected = vec![(face1, 10), (face2, 70), (face3, 30)];
    expected.sort();
    assert_eq!(nexthops, expected);
    fixture.assert_inherited_invariant();
}

// Updates inside a batch come out in deterministic order.
#[tokio::test(start_paused = true)]
async fn updates_are_deterministically_ordered() {
    let mut fixture = Fixture::new();
    let face1 = fixture.add_face();
    let face2 = fixture.add_face();
    fixture.register("/a/c", route(face2, 1, RouteFlags::empty()));
    fixture.register("/a/b", route(face2, 1, RouteFlags::empty()));

    // This single registration fans out over both children.
    fixture.master.process_msg(RibMsg::Register {
        name: name("/a"),
        route: route(face1, 7, RouteFlags::CHILD_INHERIT),
    });
    let IbusMsg::FibUpdateBatch(batch) = fixture.ibus_rx.try_recv().unwrap()
    else {
        panic!("expected a batch");
    };
    let mut sorted = batch.updates.clone();
    sorted.sort();
    assert_eq!(batch.updates, sorted);
    assert_eq!(batch.updates.len(), 3);
    assert!(
        batch
            .updates
            .iter()
            .all(|update| update.action == FibAction::AddNexthop)
    );

    let outcome = fixture.forwarder.apply_fib_batch(&batch);
    fixture
        .master
        .process_ibus_msg(IbusMsg::FibBatchOutcome(outcome));
    fixture.assert_inherited_invariant();
}

// Face destruction unregisters every route of the face in one batch.
#[tokio::test(start_paused = true)]
async fn face_removal_coalesces_into_one_batch() {
    let mut fixture = Fixture::new();
    let doomed = fixture.add_face();
    let survivor = fixture.add_face();

    fixture.register("/A", route(doomed, 10, RouteFlags::empty()));
    fixture.register("/B", route(doomed, 10, RouteFlags::empty()));
    fixture.register("/B", route(survivor, 20, RouteFlags::empty()));

    fixture.master.process_ibus_msg(IbusMsg::FaceEvent(FaceEventMsg {
        face_id: doomed,
        kind: FaceEventKind::Destroyed,
        uri: None,
    }));
    let IbusMsg::FibUpdateBatch(batch) = fixture.ibus_rx.try_recv().unwrap()
    else {
        panic!("expected a batch");
    };
    assert_eq!(batch.face_id, doomed);
    assert_eq!(batch.updates.len(), 2);
    assert!(fixture.ibus_rx.try_recv().is_err(), "exactly one batch");

    let outcome = fixture.forwarder.apply_fib_batch(&batch);
    fixture
        .master
        .process_ibus_msg(IbusMsg::FibBatchOutcome(outcome));
    assert!(fixture.master.rib().routes_with_face(doomed).is_empty());
    assert_eq!(fixture.fib_nexthops("/A"), None);
    assert_eq!(fixture.fib_nexthops("/B"), Some(vec![(survivor, 20)]));
}

// A failed batch is retried after the back-off delay without being lost.
#[tokio::test(start_paused = true)]
async fn failed_batch_is_retried() {
    let mut fixture = Fixture::new();
    let face1 = fixture.add_face();

    fixture.master.process_msg(RibMsg::Register {
        name: name("/A"),
        route: route(face1, 10, RouteFlags::empty()),
    });
    let IbusMsg::FibUpdateBatch(batch) = fixture.ibus_rx.try_recv().unwrap()
    else {
        panic!("expected a batch");
    };

    // Refuse it.
    fixture.master.process_ibus_msg(IbusMsg::FibBatchOutcome(
        nomen_utils::ibus::FibBatchOutcome {
            id: batch.id,
            code: 410,
            error: Some("face not found".to_owned()),
        },
    ));
    assert!(fixture.master.rib().entry(&name("/A")).is_none());

    // After the initial 50 s back-off (plus jitter) the retry fires.
    // Yield first so the freshly spawned timer task registers its sleep.
    tokio::task::yield_now().await;
    tokio::time::advance(Duration::from_secs(51)).await;
    tokio::task::yield_now().await;
    let msg = fixture.rib_msgc.try_recv().unwrap();
    assert!(matches!(msg, RibMsg::RetryBatch));
    fixture.master.process_msg(msg);
    fixture.pump();
    assert_eq!(fixture.fib_nexthops("/A"), Some(vec![(face1, 10)]));
}

// An expiring route unregisters itself.
#[tokio::test(start_paused = true)]
async fn route_expiration_unregisters() {
    let mut fixture = Fixture::new();
    let face1 = fixture.add_face();

    let mut expiring = route(face1, 10, RouteFlags::empty());
    expiring.expires = Some(Duration::from_secs(30));
    fixture.register("/A", expiring);
    assert_eq!(fixture.fib_nexthops("/A"), Some(vec![(face1, 10)]));

    tokio::task::yield_now().await;
    tokio::time::advance(Duration::from_secs(31)).await;
    tokio::task::yield_now().await;
    let msg = fixture.rib_msgc.try_recv().unwrap();
    assert!(matches!(msg, RibMsg::RouteExpired { .. }));
    fixture.master.process_msg(msg);
    fixture.pump();
    assert_eq!(fixture.fib_nexthops("/A"), None);
    assert!(fixture.master.rib().entry(&name("/A")).is_none());
}
