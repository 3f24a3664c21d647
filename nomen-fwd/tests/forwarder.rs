//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use bytes::Bytes;
use nomen_fwd::face::FaceTx;
use nomen_fwd::forwarder::Forwarder;
use nomen_fwd::name_tree::HashtableOptions;
use nomen_fwd::tasks::FwMsg;
use nomen_utils::face::{FaceId, FaceScope, LinkType};
use nomen_utils::ibus::{FibUpdate, FibUpdateBatch};
use nomen_utils::name::Name;
use nomen_utils::packet::{Data, Interest, Nack, NackReason};
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedReceiver;

//
// Helper functions.
//

fn name(uri: &str) -> Name {
    uri.parse().unwrap()
}

fn interest(uri: &str, nonce: u32) -> Interest {
    Interest::new(name(uri)).with_nonce(nonce)
}

fn data(uri: &str) -> Data {
    Data::new(name(uri), Bytes::from_static(b"payload"), None)
}

struct Fixture {
    forwarder: Forwarder,
    _fw_msgc: UnboundedReceiver<FwMsg>,
}

impl Fixture {
    fn new() -> Fixture {
        let (fw_msgp, fw_msgc) = mpsc::unbounded_channel();
        Fixture {
            forwarder: Forwarder::new(HashtableOptions::new(16), fw_msgp),
            _fw_msgc: fw_msgc,
        }
    }

    fn add_face(&mut self, scope: FaceScope) -> (FaceId, UnboundedReceiver<FaceTx>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id =
            self.forwarder.add_face(scope, LinkType::PointToPoint, None, tx);
        (id, rx)
    }

    fn add_route(&mut self, prefix: &str, face: FaceId, cost: u64) {
        let batch = FibUpdateBatch {
            id: 0,
            face_id: face,
            updates: vec![FibUpdate::add_nexthop(name(prefix), face, cost)],
        };
        let outcome = self.forwarder.apply_fib_batch(&batch);
        assert_eq!(outcome.code, 200);
    }
}

fn sent_interests(rx: &mut UnboundedReceiver<FaceTx>) -> Vec<Interest> {
    let mut interests = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let FaceTx::Interest(interest) = msg {
            interests.push(interest);
        }
    }
    interests
}

fn sent_data(rx: &mut UnboundedReceiver<FaceTx>) -> Vec<Data> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let FaceTx::Data(data) = msg {
            out.push(data);
        }
    }
    out
}

fn sent_nacks(rx: &mut UnboundedReceiver<FaceTx>) -> Vec<Nack> {
    let mut nacks = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let FaceTx::Nack(nack) = msg {
            nacks.push(nack);
        }
    }
    nacks
}

//
// Tests.
//

// Basic forward: one next-hop, one downstream, one copy upstream.
#[tokio::test(start_paused = true)]
async fn basic_forward() {
    let mut fixture = Fixture::new();
    let (face1, mut rx1) = fixture.add_face(FaceScope::NonLocal);
    let (face2, mut rx2) = fixture.add_face(FaceScope::NonLocal);
    fixture.add_route("/A", face2, 10);

    fixture.forwarder.on_interest(face1, interest("/A/B", 1));

    let forwarded = sent_interests(&mut rx2);
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].name, name("/A/B"));
    assert!(sent_nacks(&mut rx1).is_empty());

    let tables = fixture.forwarder.tables();
    let entries: Vec<_> = tables.pit.iter().collect();
    assert_eq!(entries.len(), 1);
    let (_, entry) = &entries[0];
    assert_eq!(entry.in_records().len(), 1);
    assert_eq!(entry.in_records()[0].face, face1);
    assert_eq!(entry.out_records().len(), 1);
    assert_eq!(entry.out_records()[0].face, face2);
}

// No route: Nack NoRoute to the downstream and a rejected PIT entry.
#[tokio::test(start_paused = true)]
async fn no_route_nack() {
    let mut fixture = Fixture::new();
    let (face1, mut rx1) = fixture.add_face(FaceScope::NonLocal);

    fixture.forwarder.on_interest(face1, interest("/X", 1));

    let nacks = sent_nacks(&mut rx1);
    assert_eq!(nacks.len(), 1);
    assert_eq!(nacks[0].reason, NackReason::NoRoute);

    let tables = fixture.forwarder.tables();
    let (_, entry) = tables.pit.iter().next().unwrap();
    assert!(entry.in_records().is_empty());
    assert_eq!(tables.fib.size(), 0);
}

// Retransmission suppression follows the exponential schedule.
#[tokio::test(start_paused = true)]
async fn retransmission_suppression() {
    let mut fixture = Fixture::new();
    let (face1, _rx1) = fixture.add_face(FaceScope::NonLocal);
    let (face2, mut rx2) = fixture.add_face(FaceScope::NonLocal);
    fixture.add_route("/A", face2, 10);

    // t = 0: forwarded.
    fixture.forwarder.on_interest(face1, interest("/A/B", 1));
    assert_eq!(sent_interests(&mut rx2).len(), 1);

    // t = 5 ms: within the initial 10 ms window, suppressed.
    tokio::time::advance(Duration::from_millis(5)).await;
    fixture.forwarder.on_interest(face1, interest("/A/B", 2));
    assert_eq!(sent_interests(&mut rx2).len(), 0);

    // t = 15 ms: past the window, forwarded again.
    tokio::time::advance(Duration::from_millis(10)).await;
    fixture.forwarder.on_interest(face1, interest("/A/B", 3));
    assert_eq!(sent_interests(&mut rx2).len(), 1);

    // t = 16 ms: the window doubled to 20 ms, suppressed.
    tokio::time::advance(Duration::from_millis(1)).await;
    fixture.forwarder.on_interest(face1, interest("/A/B", 4));
    assert_eq!(sent_interests(&mut rx2).len(), 0);
}

// Duplicate nonce from another face is answered with Nack Duplicate and
// leaves no trace in the PIT entry.
#[tokio::test(start_paused = true)]
async fn duplicate_nonce_loop() {
    let mut fixture = Fixture::new();
    let (face1, _rx1) = fixture.add_face(FaceScope::NonLocal);
    let (face2, mut rx2) = fixture.add_face(FaceScope::NonLocal);
    let (face3, mut rx3) = fixture.add_face(FaceScope::NonLocal);
    fixture.add_route("/A", face2, 10);

    fixture.forwarder.on_interest(face1, interest("/A", 42));
    assert_eq!(sent_interests(&mut rx2).len(), 1);

    tokio::time::advance(Duration::from_millis(1)).await;
    fixture.forwarder.on_interest(face3, interest("/A", 42));

    let nacks = sent_nacks(&mut rx3);
    assert_eq!(nacks.len(), 1);
    assert_eq!(nacks[0].reason, NackReason::Duplicate);
    // No second copy upstream.
    assert_eq!(sent_interests(&mut rx2).len(), 0);

    let tables = fixture.forwarder.tables();
    let (_, entry) = tables.pit.iter().next().unwrap();
    let downstreams: Vec<_> =
        entry.in_records().iter().map(|r| r.face).collect();
    assert_eq!(downstreams, vec![face1]);
}

// Data satisfies the entry: fan-out to downstreams except the ingress,
// and the entry lingers only for the straggler window.
#[tokio::test(start_paused = true)]
async fn data_satisfies_all_downstreams() {
    let mut fixture = Fixture::new();
    let (face1, mut rx1) = fixture.add_face(FaceScope::NonLocal);
    let (face2, mut rx2) = fixture.add_face(FaceScope::NonLocal);
    let (face3, mut rx3) = fixture.add_face(FaceScope::NonLocal);
    fixture.add_route("/A", face3, 10);

    fixture.forwarder.on_interest(face1, interest("/A/B", 1));
    tokio::time::advance(Duration::from_millis(20)).await;
    fixture.forwarder.on_interest(face2, interest("/A/B", 2));
    sent_interests(&mut rx3);

    fixture.forwarder.on_data(face3, data("/A/B"));
    assert_eq!(sent_data(&mut rx1).len(), 1);
    assert_eq!(sent_data(&mut rx2).len(), 1);
    assert!(sent_data(&mut rx3).is_empty());

    let (_, entry) = fixture.forwarder.tables().pit.iter().next().unwrap();
    assert!(entry.in_records().is_empty());
    assert_eq!(fixture.forwarder.counters().n_satisfied_interests, 1);
}

// A later Interest for the same content is answered from the Content
// Store without consulting the FIB.
#[tokio::test(start_paused = true)]
async fn content_store_hit() {
    let mut fixture = Fixture::new();
    let (face1, _rx1) = fixture.add_face(FaceScope::NonLocal);
    let (face2, mut rx2) = fixture.add_face(FaceScope::NonLocal);
    let (face3, mut rx3) = fixture.add_face(FaceScope::NonLocal);
    fixture.add_route("/A", face2, 10);

    fixture.forwarder.on_interest(face1, interest("/A/B", 1));
    sent_interests(&mut rx2);
    fixture.forwarder.on_data(face2, data("/A/B"));

    fixture.forwarder.on_interest(face3, interest("/A/B", 9));
    assert_eq!(sent_data(&mut rx3).len(), 1);
    assert_eq!(sent_interests(&mut rx2).len(), 0);
    assert_eq!(fixture.forwarder.counters().n_cs_hits, 1);
}

// All upstreams Nacked: the least severe reason propagates to every
// downstream and the entry is rejected.
#[tokio::test(start_paused = true)]
async fn nack_aggregation() {
    let mut fixture = Fixture::new();
    let (face1, mut rx1) = fixture.add_face(FaceScope::NonLocal);
    let (face2, mut rx2) = fixture.add_face(FaceScope::NonLocal);
    let (face3, mut rx3) = fixture.add_face(FaceScope::NonLocal);
    fixture.add_route("/A", face2, 10);
    fixture.add_route("/A", face3, 20);

    // The Interest goes to the lowest-cost upstream first; the
    // retransmission reaches the second upstream.
    fixture.forwarder.on_interest(face1, interest("/A", 1));
    let first = sent_interests(&mut rx2);
    assert_eq!(first.len(), 1);
    tokio::time::advance(Duration::from_millis(20)).await;
    fixture.forwarder.on_interest(face1, interest("/A", 2));
    let second = sent_interests(&mut rx3);
    assert_eq!(second.len(), 1);

    // First upstream Nacks: one upstream still pending, stay quiet.
    fixture.forwarder.on_nack(
        face2,
        Nack::new(NackReason::Congestion, first[0].clone()),
    );
    assert!(sent_nacks(&mut rx1).is_empty());

    // Second upstream Nacks too: give up with the least severe reason.
    fixture.forwarder.on_nack(
        face3,
        Nack::new(NackReason::NoRoute, second[0].clone()),
    );
    let nacks = sent_nacks(&mut rx1);
    assert_eq!(nacks.len(), 1);
    assert_eq!(nacks[0].reason, NackReason::Congestion);

    let (_, entry) = fixture.forwarder.tables().pit.iter().next().unwrap();
    assert!(entry.in_records().is_empty());
}

// A stale Nack (older nonce than the out-record) is ignored.
#[tokio::test(start_paused = true)]
async fn stale_nack_dropped() {
    let mut fixture = Fixture::new();
    let (face1, mut rx1) = fixture.add_face(FaceScope::NonLocal);
    let (face2, mut rx2) = fixture.add_face(FaceScope::NonLocal);
    fixture.add_route("/A", face2, 10);

    fixture.forwarder.on_interest(face1, interest("/A", 5));
    let forwarded = sent_interests(&mut rx2);

    let mut stale = forwarded[0].clone();
    stale.nonce = Some(4);
    fixture
        .forwarder
        .on_nack(face2, Nack::new(NackReason::NoRoute, stale));
    assert!(sent_nacks(&mut rx1).is_empty());

    let (_, entry) = fixture.forwarder.tables().pit.iter().next().unwrap();
    assert_eq!(entry.out_records()[0].incoming_nack, None);
}

// Scope: /localhost Interests are never forwarded to non-local faces.
#[tokio::test(start_paused = true)]
async fn localhost_scope_enforced() {
    let mut fixture = Fixture::new();
    let (local, mut local_rx) = fixture.add_face(FaceScope::Local);
    let (remote, mut remote_rx) = fixture.add_face(FaceScope::NonLocal);
    let (upstream_local, mut up_local_rx) = fixture.add_face(FaceScope::Local);
    fixture.add_route("/localhost/svc", remote, 5);
    fixture.add_route("/localhost/svc", upstream_local, 10);

    // From a non-local face the Interest is dropped outright.
    fixture
        .forwarder
        .on_interest(remote, interest("/localhost/svc/op", 1));
    assert_eq!(fixture.forwarder.tables().pit.size(), 0);

    // From a local face it may only go to local next-hops.
    fixture
        .forwarder
        .on_interest(local, interest("/localhost/svc/op", 2));
    assert!(sent_interests(&mut remote_rx).is_empty());
    assert_eq!(sent_interests(&mut up_local_rx).len(), 1);
    assert!(sent_nacks(&mut local_rx).is_empty());
}

// Face destruction cleans the FIB and strips PIT records, leaving the
// entries to expire naturally.
#[tokio::test(start_paused = true)]
async fn face_removal_cleanup() {
    let mut fixture = Fixture::new();
    let (downstream, _rx) = fixture.add_face(FaceScope::NonLocal);
    let (doomed, _doomed_rx) = fixture.add_face(FaceScope::NonLocal);

    for i in 0..300 {
        let prefix = format!("/P{i}");
        fixture.add_route(&prefix, doomed, 10);
        fixture
            .forwarder
            .on_interest(downstream, interest(&format!("/P{i}/x"), i));
    }
    assert_eq!(fixture.forwarder.tables().fib.size(), 300);
    assert_eq!(fixture.forwarder.tables().pit.size(), 300);

    // Records of the destroyed face must be gone everywhere; the
    // downstream in-records survive.
    fixture.forwarder.remove_face(doomed);
    let tables = fixture.forwarder.tables();
    assert_eq!(tables.fib.size(), 0);
    assert_eq!(tables.pit.size(), 300);
    for (_, entry) in tables.pit.iter() {
        assert!(entry.out_records().is_empty());
        assert_eq!(entry.in_records().len(), 1);
        assert_eq!(entry.in_records()[0].face, downstream);
    }
}
