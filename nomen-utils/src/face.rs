//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

/// 64-bit face identifier.
pub type FaceId = u64;

/// 64-bit sub-address distinguishing remote peers on a multi-access link.
pub type EndpointId = u64;

/// Reserved face identifiers, honored at startup.
pub const FACEID_INVALID: FaceId = 0;
/// The internal management face.
pub const FACEID_INTERNAL: FaceId = 1;
/// Pseudo-face representing the content store as a Data source.
pub const FACEID_CONTENT_STORE: FaceId = 254;
/// The null face; packets sent here are dropped.
pub const FACEID_NULL: FaceId = 255;
/// Identifiers up to and including this value are reserved.
pub const FACEID_RESERVED_MAX: FaceId = 255;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum FaceScope {
    Local,
    NonLocal,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LinkType {
    PointToPoint,
    MultiAccess,
    AdHoc,
}

/// Face lifecycle notifications published on the `faces/events` stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum FaceEventKind {
    Created,
    Destroyed,
    Up,
    Down,
}

// ===== impl FaceScope =====

impl FaceScope {
    pub fn is_local(self) -> bool {
        self == FaceScope::Local
    }
}

impl std::fmt::Display for FaceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaceScope::Local => write!(f, "local"),
            FaceScope::NonLocal => write!(f, "non-local"),
        }
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkType::PointToPoint => write!(f, "point-to-point"),
            LinkType::MultiAccess => write!(f, "multi-access"),
            LinkType::AdHoc => write!(f, "ad-hoc"),
        }
    }
}
