//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use enum_as_inner::EnumAsInner;
use nomen_utils::face::{FaceId, FaceScope, LinkType};
use nomen_utils::ibus::IbusMsg;
use nomen_utils::packet::{Data, Interest, Nack};
use nomen_utils::task::TimeoutTask;
use nomen_utils::uri::FaceUri;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;

use crate::face::FaceTx;
use crate::mgmt::{ControlCommand, ControlResponse, FibRecord};
use crate::name_tree::EntryIndex;
use crate::table::pit::PitIndex;

//
// Forwarder tasks diagram:
//
//                              +--------------+
//                   faces ->   |              |
//          unsatisfy (Nx) ->   |              |
//          straggler (Nx) ->   |  forwarder   | -> (Nx) face tx
//    measurements exp (Nx) ->  |              |
//         management (1x) ->  |              |
//                              +--------------+
//                       ibus (1x) | ^ (1x) ibus
//                                 V |
//                              +--------------+
//                              |   RIB loop   |
//                              +--------------+
//

/// A packet arriving from a face.
#[derive(Clone, Debug, EnumAsInner)]
pub enum Packet {
    Interest(Interest),
    Data(Data),
    Nack(Nack),
}

/// Input messages processed by the forwarder (main) loop.
#[derive(Debug)]
pub enum FwMsg {
    /// Packet received on a face.
    Packet { face: FaceId, packet: Packet },
    /// Register a new face and reply with its identifier.
    FaceAdd {
        scope: FaceScope,
        link_type: LinkType,
        uri: Option<FaceUri>,
        tx: UnboundedSender<FaceTx>,
        reply: oneshot::Sender<FaceId>,
    },
    /// A face disappeared; clean up FIB next-hops and PIT records.
    FaceRemove(FaceId),
    /// A PIT entry's unsatisfy timer expired.
    PitUnsatisfied(PitIndex),
    /// A satisfied or rejected PIT entry's straggler window elapsed.
    PitStraggler(PitIndex),
    /// A Measurements entry's lifetime expired.
    MeasurementsExpire(EntryIndex),
    /// Cross-loop message from the RIB loop.
    Ibus(IbusMsg),
    /// Management command accepted on the internal face.
    Control {
        ingress: FaceId,
        command: ControlCommand,
        reply: oneshot::Sender<ControlResponse>,
    },
    /// Management FIB dataset request.
    FibDataset { reply: oneshot::Sender<Vec<FibRecord>> },
}

// ===== forwarder timers =====

// PIT unsatisfy timer.
pub(crate) fn pit_unsatisfy_timer(
    pit: PitIndex,
    timeout: Duration,
    fw_msgp: &UnboundedSender<FwMsg>,
) -> TimeoutTask {
    let fw_msgp = fw_msgp.clone();
    TimeoutTask::new(timeout, move || async move {
        let _ = fw_msgp.send(FwMsg::PitUnsatisfied(pit));
    })
}

// PIT straggler timer, absorbing late duplicates of a satisfied Interest.
pub(crate) fn pit_straggler_timer(
    pit: PitIndex,
    timeout: Duration,
    fw_msgp: &UnboundedSender<FwMsg>,
) -> TimeoutTask {
    let fw_msgp = fw_msgp.clone();
    TimeoutTask::new(timeout, move || async move {
        let _ = fw_msgp.send(FwMsg::PitStraggler(pit));
    })
}

// Measurements entry cleanup timer.
pub(crate) fn measurements_cleanup_timer(
    nte: EntryIndex,
    timeout: Duration,
    fw_msgp: &UnboundedSender<FwMsg>,
) -> TimeoutTask {
    let fw_msgp = fw_msgp.clone();
    TimeoutTask::new(timeout, move || async move {
        let _ = fw_msgp.send(FwMsg::MeasurementsExpire(nte));
    })
}
