//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::LazyLock;

use bitflags::bitflags;
use nomen_utils::name::Name;
use nomen_utils::packet::Nonce;
use tokio::time::Instant;

use crate::face::{Face, FaceTable};
use crate::table::pit;

/// Names under this prefix must never leave the host.
pub static LOCALHOST: LazyLock<Name> =
    LazyLock::new(|| "/localhost".parse().unwrap());

/// Names under this prefix may travel one hop from a local originator.
pub static LOCALHOP: LazyLock<Name> =
    LazyLock::new(|| "/localhop".parse().unwrap());

bitflags! {
    /// Where a duplicate nonce was found in a PIT entry.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct DuplicateNonceWhere: u8 {
        /// In-record of the same face: a retransmission.
        const IN_SAME = 1 << 0;
        /// In-record of another face: a loop.
        const IN_OTHER = 1 << 1;
        /// Out-record of the same face: a loop.
        const OUT_SAME = 1 << 2;
        /// Out-record of another face: a loop.
        const OUT_OTHER = 1 << 3;
    }
}

// ===== impl DuplicateNonceWhere =====

impl DuplicateNonceWhere {
    /// Whether the observation indicates a forwarding loop rather than a
    /// legitimate retransmission by the same consumer.
    pub fn is_loop(self) -> bool {
        self.intersects(
            DuplicateNonceWhere::IN_OTHER
                | DuplicateNonceWhere::OUT_SAME
                | DuplicateNonceWhere::OUT_OTHER,
        )
    }
}

// ===== global functions =====

/// Determines where `nonce` has already been seen on `entry`, relative to
/// the face it is now arriving from.
pub fn find_duplicate_nonce(
    entry: &pit::Entry,
    nonce: Nonce,
    face: nomen_utils::face::FaceId,
) -> DuplicateNonceWhere {
    let mut dnw = DuplicateNonceWhere::empty();
    for record in entry.in_records() {
        if record.last_nonce == nonce {
            dnw |= if record.face == face {
                DuplicateNonceWhere::IN_SAME
            } else {
                DuplicateNonceWhere::IN_OTHER
            };
        }
    }
    for record in entry.out_records() {
        if record.last_nonce == nonce {
            dnw |= if record.face == face {
                DuplicateNonceWhere::OUT_SAME
            } else {
                DuplicateNonceWhere::OUT_OTHER
            };
        }
    }
    dnw
}

/// Whether forwarding the pending Interest on `out_face` would violate the
/// scope of its Name.
pub fn violates_scope(
    entry: &pit::Entry,
    out_face: &Face,
    faces: &FaceTable,
) -> bool {
    if out_face.is_local() {
        return false;
    }

    if LOCALHOST.is_prefix_of(entry.name()) {
        // Face is non-local, violates localhost scope.
        return true;
    }

    if LOCALHOP.is_prefix_of(entry.name()) {
        // Face is non-local, violates localhop scope unless the entry has
        // an in-record from a local face.
        return !entry.in_records().iter().any(|record| {
            faces
                .get(record.face)
                .is_some_and(|in_face| in_face.is_local())
        });
    }

    // Name is not subject to scope control.
    false
}

/// Whether the entry still awaits a response on some upstream: an
/// unexpired out-record that has not been Nacked.
pub fn has_pending_out_records(entry: &pit::Entry, now: Instant) -> bool {
    entry
        .out_records()
        .iter()
        .any(|record| record.expiry >= now && record.incoming_nack.is_none())
}

// ===== tests =====
