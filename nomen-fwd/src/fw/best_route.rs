//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::LazyLock;

use nomen_utils::face::FaceId;
use nomen_utils::name::Name;
use nomen_utils::packet::{Interest, Nack, NackReason};
use tokio::time::Instant;
use tracing::debug;

use crate::fw::retx_suppression::{
    RetxSuppressionExponential, RetxSuppressionResult,
};
use crate::fw::strategy::{Strategy, StrategyCtx};
use crate::table::fib::NextHop;
use crate::table::pit::PitIndex;

/// Versioned name of the best-route strategy.
pub static STRATEGY_NAME: LazyLock<Name> =
    LazyLock::new(|| "/localhost/nfd/strategy/best-route/%FD%04".parse().unwrap());

/// Best-route forwarding: always prefer the lowest-cost eligible next-hop,
/// suppress bursty retransmissions with an exponential window, and
/// aggregate upstream Nacks before answering downstream.
pub struct BestRouteStrategy {
    retx_suppression: RetxSuppressionExponential,
}

// ===== impl BestRouteStrategy =====

impl BestRouteStrategy {
    pub fn new() -> BestRouteStrategy {
        BestRouteStrategy {
            retx_suppression: RetxSuppressionExponential::default(),
        }
    }

    pub fn factory() -> Box<dyn Strategy> {
        Box::new(BestRouteStrategy::new())
    }
}

impl Default for BestRouteStrategy {
    fn default() -> BestRouteStrategy {
        BestRouteStrategy::new()
    }
}

impl Strategy for BestRouteStrategy {
    fn name(&self) -> &Name {
        &STRATEGY_NAME
    }

    fn after_receive_interest(
        &mut self,
        ctx: &mut StrategyCtx<'_>,
        ingress: FaceId,
        interest: &Interest,
        pit: PitIndex,
    ) {
        let decision = self.retx_suppression.decide(ctx.pit_mut(pit));
        if decision == RetxSuppressionResult::Suppress {
            debug!(name = %interest.name, from = ingress, "suppressed");
            return;
        }

        let now = Instant::now();
        let nexthops = ctx.lookup_fib(pit).next_hops().to_vec();

        if decision == RetxSuppressionResult::New {
            // Forward to the lowest-cost next-hop except the downstream.
            let found = nexthops.iter().find(|nexthop| {
                next_hop_eligible(ctx, pit, nexthop, ingress, false, now)
            });
            let Some(nexthop) = found else {
                debug!(name = %interest.name, from = ingress, "no next hop");
                ctx.send_nack(pit, ingress, NackReason::NoRoute);
                ctx.reject_pending_interest(pit);
                return;
            };
            debug!(
                name = %interest.name,
                from = ingress,
                to = nexthop.face,
                "forwarding"
            );
            ctx.send_interest(pit, nexthop.face);
            return;
        }

        // Retransmission: prefer an unused upstream with lowest cost.
        if let Some(nexthop) = nexthops.iter().find(|nexthop| {
            next_hop_eligible(ctx, pit, nexthop, ingress, true, now)
        }) {
            debug!(
                name = %interest.name,
                from = ingress,
                to = nexthop.face,
                "retransmitting to unused next hop"
            );
            ctx.send_interest(pit, nexthop.face);
            return;
        }

        // Else retry the least recently tried eligible upstream.
        match find_eligible_with_earliest_out_record(
            ctx, pit, &nexthops, ingress,
        ) {
            Some(nexthop) => {
                debug!(
                    name = %interest.name,
                    from = ingress,
                    to = nexthop.face,
                    "retransmitting to earliest tried next hop"
                );
                ctx.send_interest(pit, nexthop.face);
            }
            None => {
                debug!(name = %interest.name, from = ingress, "retransmission has no next hop");
            }
        }
    }

    fn after_receive_nack(
        &mut self,
        ctx: &mut StrategyCtx<'_>,
        ingress: FaceId,
        nack: &Nack,
        pit: PitIndex,
    ) {
        let mut n_out_records_not_nacked = 0;
        let mut last_face_not_nacked = None;
        let mut least_severe = NackReason::None;
        for record in ctx.pit(pit).out_records() {
            match record.incoming_nack {
                None => {
                    n_out_records_not_nacked += 1;
                    last_face_not_nacked = Some(record.face);
                }
                Some(reason) => {
                    least_severe =
                        NackReason::least_severe(least_severe, reason);
                }
            }
        }

        if n_out_records_not_nacked == 1
            && let Some(bidirectional) = last_face_not_nacked
            && ctx.pit(pit).in_record(bidirectional).is_some()
        {
            // The one upstream still pending is also a downstream; answer
            // it and keep waiting for its own response.
            debug!(
                name = %nack.interest.name,
                from = ingress,
                to = bidirectional,
                reason = %least_severe,
                "nack to bidirectional face"
            );
            ctx.send_nack(pit, bidirectional, least_severe);
            return;
        }

        if n_out_records_not_nacked > 0 {
            debug!(
                name = %nack.interest.name,
                from = ingress,
                waiting = n_out_records_not_nacked,
                "waiting for remaining upstreams"
            );
            return;
        }

        // Every upstream Nacked: give up and propagate downstream.
        debug!(
            name = %nack.interest.name,
            from = ingress,
            reason = %least_severe,
            "nack to all downstreams"
        );
        ctx.send_nacks(pit, least_severe);
        ctx.reject_pending_interest(pit);
    }
}

// ===== global functions =====

// Whether a next-hop may carry the pending Interest: the upstream must
// differ from the current downstream, scope must allow it, and with
// `want_unused` its out-record must be absent or expired.
fn next_hop_eligible(
    ctx: &StrategyCtx<'_>,
    pit: PitIndex,
    nexthop: &NextHop,
    current_downstream: FaceId,
    want_unused: bool,
    now: Instant,
) -> bool {
    if nexthop.face == current_downstream {
        return false;
    }
    if ctx.violates_scope(pit, nexthop.face) {
        return false;
    }
    if want_unused
        && let Some(record) = ctx.pit(pit).out_record(nexthop.face)
        && record.expiry > now
    {
        return false;
    }
    true
}

// Picks the eligible next-hop whose out-record was renewed the longest
// ago. Next-hops without an out-record are not considered.
fn find_eligible_with_earliest_out_record<'a>(
    ctx: &StrategyCtx<'_>,
    pit: PitIndex,
    nexthops: &'a [NextHop],
    current_downstream: FaceId,
) -> Option<&'a NextHop> {
    let now = Instant::now();
    nexthops
        .iter()
        .filter(|nexthop| {
            next_hop_eligible(ctx, pit, nexthop, current_downstream, false, now)
        })
        .filter_map(|nexthop| {
            ctx.pit(pit)
                .out_record(nexthop.face)
                .map(|record| (record.last_renewed, nexthop))
        })
        .min_by_key(|(last_renewed, _)| *last_renewed)
        .map(|(_, nexthop)| nexthop)
}
