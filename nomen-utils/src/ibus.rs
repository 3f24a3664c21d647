//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::face::{FaceEventKind, FaceId};
use crate::name::Name;
use crate::uri::FaceUri;

// Useful type definition(s).
pub type IbusReceiver = UnboundedReceiver<IbusMsg>;
pub type IbusSender = UnboundedSender<IbusMsg>;

/// Ibus message for communication between the main (forwarding) loop and
/// the RIB loop. Only plain data crosses the loop boundary.
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub enum IbusMsg {
    /// A batch of FIB updates computed by the RIB loop. The main loop
    /// applies the batch atomically and answers with `FibBatchOutcome`.
    FibUpdateBatch(FibUpdateBatch),
    /// Outcome of a previously issued FIB update batch.
    FibBatchOutcome(FibBatchOutcome),
    /// A face was created on the main loop.
    FaceEvent(FaceEventMsg),
}

/// One FIB next-hop mutation.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct FibUpdate {
    pub name: Name,
    pub face_id: FaceId,
    pub cost: u64,
    pub action: FibAction,
}

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum FibAction {
    AddNexthop,
    RemoveNexthop,
}

/// A batch of FIB updates, all referring to the same face. Applied
/// atomically: either every update takes effect or none does.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct FibUpdateBatch {
    pub id: u64,
    pub face_id: FaceId,
    pub updates: Vec<FibUpdate>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct FibBatchOutcome {
    pub id: u64,
    /// Response code: 200 on success (see the management response codes).
    pub code: u32,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct FaceEventMsg {
    pub face_id: FaceId,
    pub kind: FaceEventKind,
    pub uri: Option<FaceUri>,
}

// ===== impl FibUpdate =====

impl FibUpdate {
    pub fn add_nexthop(name: Name, face_id: FaceId, cost: u64) -> FibUpdate {
        FibUpdate {
            name,
            face_id,
            cost,
            action: FibAction::AddNexthop,
        }
    }

    pub fn remove_nexthop(name: Name, face_id: FaceId) -> FibUpdate {
        FibUpdate {
            name,
            face_id,
            cost: 0,
            action: FibAction::RemoveNexthop,
        }
    }
}

impl std::fmt::Display for FibUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.action {
            FibAction::AddNexthop => write!(
                f,
                "add-nexthop {} face={} cost={}",
                self.name, self.face_id, self.cost
            ),
            FibAction::RemoveNexthop => write!(
                f,
                "remove-nexthop {} face={}",
                self.name, self.face_id
            ),
        }
    }
}
