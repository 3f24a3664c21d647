//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use tokio::time::Instant;

use crate::fw::algorithm;
use crate::table::pit;

/// Classification of an incoming Interest relative to the suppression
/// window of its PIT entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetxSuppressionResult {
    /// First copy: the entry has no pending upstream yet.
    New,
    /// A legitimate retransmission past the suppression window.
    Forward,
    /// Within the suppression window; drop silently.
    Suppress,
}

/// Per-entry suppression state, stored in a strategy-info slot.
#[derive(Debug)]
struct PitInfo {
    suppression_interval: Duration,
}

/// Retransmission suppression with exponential back-off: each forwarded
/// retransmission widens the window by `multiplier` up to `max_interval`.
#[derive(Clone, Copy, Debug)]
pub struct RetxSuppressionExponential {
    initial_interval: Duration,
    multiplier: f64,
    max_interval: Duration,
}

// ===== impl RetxSuppressionExponential =====

impl RetxSuppressionExponential {
    pub const DEFAULT_INITIAL: Duration = Duration::from_millis(10);
    pub const DEFAULT_MULTIPLIER: f64 = 2.0;
    pub const DEFAULT_MAX: Duration = Duration::from_millis(250);

    pub fn new(
        initial_interval: Duration,
        multiplier: f64,
        max_interval: Duration,
    ) -> RetxSuppressionExponential {
        RetxSuppressionExponential {
            initial_interval,
            multiplier,
            max_interval,
        }
    }

    pub fn decide(&self, entry: &mut pit::Entry) -> RetxSuppressionResult {
        let now = Instant::now();
        if !algorithm::has_pending_out_records(entry, now) {
            return RetxSuppressionResult::New;
        }

        // Time since the Interest was last forwarded upstream.
        let last_outgoing = entry
            .out_records()
            .iter()
            .map(|record| record.last_renewed)
            .max()
            .unwrap();
        let since_last_outgoing = now.saturating_duration_since(last_outgoing);

        let initial_interval = self.initial_interval;
        let info = entry.strategy_info.get_or_insert_with(|| PitInfo {
            suppression_interval: initial_interval,
        });
        if since_last_outgoing < info.suppression_interval {
            return RetxSuppressionResult::Suppress;
        }

        // Forwarding this retransmission widens the window.
        info.suppression_interval = Duration::min(
            self.max_interval,
            info.suppression_interval.mul_f64(self.multiplier),
        );
        RetxSuppressionResult::Forward
    }
}

impl Default for RetxSuppressionExponential {
    fn default() -> RetxSuppressionExponential {
        RetxSuppressionExponential::new(
            RetxSuppressionExponential::DEFAULT_INITIAL,
            RetxSuppressionExponential::DEFAULT_MULTIPLIER,
            RetxSuppressionExponential::DEFAULT_MAX,
        )
    }
}

// ===== tests =====
