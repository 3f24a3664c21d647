//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;

use enum_as_inner::EnumAsInner;
use nomen_utils::face::{
    FACEID_NULL, FACEID_RESERVED_MAX, FaceId, FaceScope, LinkType,
};
use nomen_utils::packet::{Data, Interest, Nack};
use nomen_utils::uri::FaceUri;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

/// Egress messages handed to a face's link service.
#[derive(Clone, Debug, EnumAsInner)]
pub enum FaceTx {
    Interest(Interest),
    Data(Data),
    Nack(Nack),
}

/// The forwarder's view of a link endpoint. The link service itself lives
/// behind the egress channel; ingress arrives as forwarder messages.
#[derive(Debug)]
pub struct Face {
    id: FaceId,
    scope: FaceScope,
    link_type: LinkType,
    uri: Option<FaceUri>,
    tx: Option<UnboundedSender<FaceTx>>,
}

/// The face table. Identifiers at or below [`FACEID_RESERVED_MAX`] are
/// reserved and only assigned explicitly.
#[derive(Debug)]
pub struct FaceTable {
    faces: BTreeMap<FaceId, Face>,
    next_id: FaceId,
}

// ===== impl Face =====

impl Face {
    pub fn id(&self) -> FaceId {
        self.id
    }

    pub fn scope(&self) -> FaceScope {
        self.scope
    }

    pub fn is_local(&self) -> bool {
        self.scope.is_local()
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    pub fn uri(&self) -> Option<&FaceUri> {
        self.uri.as_ref()
    }

    fn send(&self, msg: FaceTx) {
        match &self.tx {
            Some(tx) => {
                if tx.send(msg).is_err() {
                    trace!(face = self.id, "link service is gone, packet dropped");
                }
            }
            // The null face silently drops everything sent to it.
            None => trace!(face = self.id, "packet dropped"),
        }
    }

    pub fn send_interest(&self, interest: &Interest) {
        self.send(FaceTx::Interest(interest.clone()));
    }

    pub fn send_data(&self, data: &Data) {
        self.send(FaceTx::Data(data.clone()));
    }

    pub fn send_nack(&self, nack: &Nack) {
        self.send(FaceTx::Nack(nack.clone()));
    }
}

// ===== impl FaceTable =====

impl FaceTable {
    pub fn new() -> FaceTable {
        let mut table = FaceTable {
            faces: BTreeMap::new(),
            next_id: FACEID_RESERVED_MAX + 1,
        };
        // The null face exists from startup; packets sent there vanish.
        table.add_reserved(
            FACEID_NULL,
            FaceScope::Local,
            LinkType::PointToPoint,
            None,
            None,
        );
        table
    }

    /// Registers a face under a reserved identifier.
    pub fn add_reserved(
        &mut self,
        id: FaceId,
        scope: FaceScope,
        link_type: LinkType,
        uri: Option<FaceUri>,
        tx: Option<UnboundedSender<FaceTx>>,
    ) -> FaceId {
        debug_assert!(id <= FACEID_RESERVED_MAX);
        self.faces.insert(id, Face { id, scope, link_type, uri, tx });
        id
    }

    /// Registers a new face and assigns it the next free identifier.
    pub fn add(
        &mut self,
        scope: FaceScope,
        link_type: LinkType,
        uri: Option<FaceUri>,
        tx: UnboundedSender<FaceTx>,
    ) -> FaceId {
        let id = self.next_id;
        self.next_id += 1;
        self.faces.insert(
            id,
            Face {
                id,
                scope,
                link_type,
                uri,
                tx: Some(tx),
            },
        );
        id
    }

    pub fn get(&self, id: FaceId) -> Option<&Face> {
        self.faces.get(&id)
    }

    pub fn remove(&mut self, id: FaceId) -> Option<Face> {
        self.faces.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Face> {
        self.faces.values()
    }
}

impl Default for FaceTable {
    fn default() -> FaceTable {
        FaceTable::new()
    }
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use nomen_utils::face::FACEID_INTERNAL;
    use tokio::sync::mpsc;

    #[test]
    fn ids_start_past_reserved_range() {
        let mut table = FaceTable::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id =
            table.add(FaceScope::NonLocal, LinkType::PointToPoint, None, tx);
        assert_eq!(id, FACEID_RESERVED_MAX + 1);
        assert!(table.get(FACEID_NULL).is_some());
        assert!(table.get(FACEID_INTERNAL).is_none());
    }

    #[test]
    fn null_face_drops_silently() {
        let table = FaceTable::new();
        let null = table.get(FACEID_NULL).unwrap();
        null.send_interest(&Interest::new("/A".parse().unwrap()));
    }
}
