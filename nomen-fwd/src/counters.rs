//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::Serialize;

/// Monotone forwarder counters, published by the status surface.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ForwarderCounters {
    pub n_in_interests: u64,
    pub n_out_interests: u64,
    pub n_in_data: u64,
    pub n_out_data: u64,
    pub n_in_nacks: u64,
    pub n_out_nacks: u64,
    pub n_cs_hits: u64,
    pub n_cs_misses: u64,
    pub n_satisfied_interests: u64,
    pub n_unsatisfied_interests: u64,
}
