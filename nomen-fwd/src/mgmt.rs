//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use derive_new::new;
use nomen_utils::face::FaceId;
use nomen_utils::name::Name;
use serde::{Deserialize, Serialize};

/// Decoded body of a signed management command. Wire decoding is the
/// encoding library's concern; the forwarder sees plain parameters.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct ControlParameters {
    pub name: Name,
    /// 0 selects the ingress face of the command.
    pub face_id: Option<FaceId>,
    pub cost: Option<u64>,
}

/// Management commands executed on the forwarder loop.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ControlCommand {
    FibAddNexthop(ControlParameters),
    FibRemoveNexthop(ControlParameters),
}

/// Response to a management command or readvertise request.
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct ControlResponse {
    pub code: u32,
    pub text: String,
}

/// One record of the segmented FIB dataset.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct FibRecord {
    pub prefix: Name,
    pub nexthops: Vec<(FaceId, u64)>,
}

// ===== impl ControlResponse =====

impl ControlResponse {
    pub const OK: u32 = 200;
    pub const MALFORMED: u32 = 400;
    pub const SIGNATURE_REQUIRED: u32 = 401;
    pub const UNAUTHORIZED: u32 = 403;
    pub const FACE_NOT_FOUND: u32 = 410;
    pub const NOT_SUPPORTED: u32 = 501;

    pub fn ok() -> ControlResponse {
        ControlResponse::new(ControlResponse::OK, "OK".to_owned())
    }

    pub fn face_not_found() -> ControlResponse {
        ControlResponse::new(
            ControlResponse::FACE_NOT_FOUND,
            "face not found".to_owned(),
        )
    }

    pub fn malformed(text: impl Into<String>) -> ControlResponse {
        ControlResponse::new(ControlResponse::MALFORMED, text.into())
    }

    pub fn not_supported() -> ControlResponse {
        ControlResponse::new(
            ControlResponse::NOT_SUPPORTED,
            "unsupported command verb".to_owned(),
        )
    }

    pub fn is_ok(&self) -> bool {
        self.code == ControlResponse::OK
    }
}
