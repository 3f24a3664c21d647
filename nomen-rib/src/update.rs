//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use bitflags::bitflags;
use derive_new::new;
use nomen_utils::face::FaceId;
use nomen_utils::name::Name;
use serde::{Deserialize, Serialize};

/// Origin tag of a route, identifying who registered it.
pub type RouteOrigin = u64;

pub const ORIGIN_APP: RouteOrigin = 0;
pub const ORIGIN_STATIC: RouteOrigin = 255;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub struct RouteFlags: u8 {
        /// The route projects into the descendant namespace.
        const CHILD_INHERIT = 0x01;
        /// The route shields its namespace from ancestor routes.
        const CAPTURE = 0x02;
    }
}

/// An administrative route. Identity within a RIB entry is
/// (face_id, origin); cost, flags, and expiration are attributes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct Route {
    pub face_id: FaceId,
    pub origin: RouteOrigin,
    pub cost: u64,
    pub flags: RouteFlags,
    /// Remaining validity; `None` means the route does not expire.
    pub expires: Option<Duration>,
}

/// One RIB mutation.
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct RibUpdate {
    pub action: RibUpdateAction,
    pub name: Name,
    pub route: Route,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum RibUpdateAction {
    Register,
    Unregister,
    /// Unregistration caused by face destruction; coalesced into a single
    /// batch per face.
    RemoveFace,
}

/// A batch of RIB updates, all referring to the same face.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RibUpdateBatch {
    pub face_id: FaceId,
    pub updates: Vec<RibUpdate>,
}

// ===== impl Route =====

impl Route {
    pub fn is_child_inherit(&self) -> bool {
        self.flags.contains(RouteFlags::CHILD_INHERIT)
    }

    pub fn is_capture(&self) -> bool {
        self.flags.contains(RouteFlags::CAPTURE)
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "route(face={} origin={} cost={} flags={:?})",
            self.face_id, self.origin, self.cost, self.flags
        )
    }
}

// ===== impl RibUpdateBatch =====

impl RibUpdateBatch {
    pub fn new(face_id: FaceId) -> RibUpdateBatch {
        RibUpdateBatch { face_id, updates: Vec::new() }
    }

    pub fn add(&mut self, update: RibUpdate) {
        debug_assert_eq!(update.route.face_id, self.face_id);
        self.updates.push(update);
    }
}
