//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::VecDeque;
use std::time::Duration;

use nomen_fwd::mgmt::{
    ControlCommand, ControlParameters, ControlResponse, FibRecord,
};
use nomen_fwd::tasks::FwMsg;
use nomen_utils::face::{FACEID_INTERNAL, FaceId};
use nomen_utils::ibus::FaceEventMsg;
use nomen_utils::packet::Interest;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tracing::debug;

/// Validates signed management commands. The validation itself is a
/// collaborator; the dispatcher only consumes its verdict.
pub trait CommandAuthenticator: Send + Sync {
    /// `Err` carries the response code to answer with (401 when a
    /// signature is required, 403 when it does not authorize the
    /// command).
    fn authenticate(&self, interest: &Interest) -> Result<(), u32>;
}

/// Accepts every command; used when the key chain collaborator is not
/// wired in.
pub struct AcceptAll;

/// Routes decoded management commands from the internal face onto the
/// forwarder loop and shapes the responses.
pub struct Dispatcher {
    fw_msgp: UnboundedSender<FwMsg>,
    authenticator: Box<dyn CommandAuthenticator>,
}

/// One segment of the published FIB dataset.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FibDatasetSegment {
    pub segment: u64,
    pub records: Vec<FibRecord>,
    pub is_final: bool,
}

/// The `faces/events` notification stream: sequence-numbered face events
/// served as freshness-bounded segments. Clients long-poll with the
/// rightmost child selector and re-issue with `segment = last_seen + 1`.
#[derive(Debug)]
pub struct FaceEventStream {
    events: VecDeque<(u64, FaceEventMsg)>,
    next_seq: u64,
    capacity: usize,
}

// ===== impl AcceptAll =====

impl CommandAuthenticator for AcceptAll {
    fn authenticate(&self, _interest: &Interest) -> Result<(), u32> {
        Ok(())
    }
}

// ===== impl Dispatcher =====

impl Dispatcher {
    /// Records per published FIB dataset segment.
    pub const FIB_SEGMENT_SIZE: usize = 64;

    pub fn new(
        fw_msgp: UnboundedSender<FwMsg>,
        authenticator: Box<dyn CommandAuthenticator>,
    ) -> Dispatcher {
        Dispatcher { fw_msgp, authenticator }
    }

    /// Executes one signed management command. The Interest is already
    /// decoded; `params` carries its control parameters when present.
    pub async fn dispatch(
        &self,
        ingress: FaceId,
        interest: &Interest,
        params: Option<ControlParameters>,
    ) -> ControlResponse {
        // Commands are accepted on the internal face only.
        if ingress != FACEID_INTERNAL {
            return ControlResponse::new(
                ControlResponse::UNAUTHORIZED,
                "commands are accepted on the internal face only".to_owned(),
            );
        }
        if let Err(code) = self.authenticator.authenticate(interest) {
            let text = match code {
                ControlResponse::SIGNATURE_REQUIRED => "signature required",
                _ => "unauthorized",
            };
            return ControlResponse::new(code, text.to_owned());
        }

        // Command names read /localhost/nfd/<module>/<verb>.
        let module = component_str(interest, 2);
        let verb = component_str(interest, 3);
        debug!(?module, ?verb, "management command");
        let command = match (module.as_deref(), verb.as_deref()) {
            (Some("fib"), Some("add-nexthop")) => {
                let Some(params) = params else {
                    return ControlResponse::malformed(
                        "missing control parameters",
                    );
                };
                ControlCommand::FibAddNexthop(params)
            }
            (Some("fib"), Some("remove-nexthop")) => {
                let Some(params) = params else {
                    return ControlResponse::malformed(
                        "missing control parameters",
                    );
                };
                ControlCommand::FibRemoveNexthop(params)
            }
            _ => return ControlResponse::not_supported(),
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .fw_msgp
            .send(FwMsg::Control { ingress, command, reply: reply_tx })
            .is_err()
        {
            return ControlResponse::new(
                ControlResponse::NOT_SUPPORTED,
                "forwarder is gone".to_owned(),
            );
        }
        reply_rx.await.unwrap_or_else(|_| {
            ControlResponse::new(
                ControlResponse::NOT_SUPPORTED,
                "forwarder dropped the command".to_owned(),
            )
        })
    }

    /// Publishes the FIB dataset as numbered segments.
    pub async fn fib_dataset(&self) -> Vec<FibDatasetSegment> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.fw_msgp.send(FwMsg::FibDataset { reply: reply_tx }).is_err() {
            return Vec::new();
        }
        let records = reply_rx.await.unwrap_or_default();
        segment_records(records, Dispatcher::FIB_SEGMENT_SIZE)
    }
}

// ===== impl FaceEventStream =====

impl FaceEventStream {
    /// Freshness of a published event segment.
    pub const FRESHNESS: Duration = Duration::from_secs(60);

    pub fn new(capacity: usize) -> FaceEventStream {
        FaceEventStream {
            events: VecDeque::new(),
            next_seq: 0,
            capacity,
        }
    }

    /// Records an event under the next sequence number.
    pub fn push(&mut self, event: FaceEventMsg) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push_back((seq, event));
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }
        seq
    }

    /// Serves the event with the given sequence number, if still held.
    pub fn get(&self, seq: u64) -> Option<&FaceEventMsg> {
        self.events
            .iter()
            .find(|(candidate, _)| *candidate == seq)
            .map(|(_, event)| event)
    }

    /// The most recent sequence number, answering rightmost-child
    /// long-polls.
    pub fn latest_seq(&self) -> Option<u64> {
        self.events.back().map(|(seq, _)| *seq)
    }
}

// ===== global functions =====

fn component_str(interest: &Interest, index: usize) -> Option<String> {
    interest
        .name
        .get(index)
        .and_then(|component| {
            std::str::from_utf8(component.as_bytes()).ok()
        })
        .map(|component| component.to_owned())
}

fn segment_records(
    records: Vec<FibRecord>,
    segment_size: usize,
) -> Vec<FibDatasetSegment> {
    if records.is_empty() {
        return vec![FibDatasetSegment {
            segment: 0,
            records: Vec::new(),
            is_final: true,
        }];
    }
    let n_segments = records.len().div_ceil(segment_size);
    records
        .chunks(segment_size)
        .enumerate()
        .map(|(segment, chunk)| FibDatasetSegment {
            segment: segment as u64,
            records: chunk.to_vec(),
            is_final: segment == n_segments - 1,
        })
        .collect()
}

// ===== tests =====
