//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;

use nomen_utils::face::FaceId;
use nomen_utils::name::Name;
use tracing::debug;

use crate::update::{RibUpdate, RibUpdateAction, Route};

/// An administrative RIB entry: the routes registered on a prefix plus
/// the cached set of ancestor routes currently projected onto it.
#[derive(Clone, Debug, Default)]
pub struct RibEntry {
    routes: Vec<Route>,
    inherited_routes: Vec<Route>,
}

/// The Routing Information Base: a name-keyed tree of administrative
/// routes, projected into the FIB by the updater.
///
/// Parent/child relations follow name prefixes over the present entries;
/// they are derived from the ordered map rather than stored.
#[derive(Clone, Debug, Default)]
pub struct Rib {
    entries: BTreeMap<Name, RibEntry>,
    n_routes: usize,
}

// ===== impl RibEntry =====

impl RibEntry {
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn inherited_routes(&self) -> &[Route] {
        &self.inherited_routes
    }

    pub fn find_route(&self, route: &Route) -> Option<&Route> {
        self.routes.iter().find(|candidate| {
            candidate.face_id == route.face_id
                && candidate.origin == route.origin
        })
    }

    /// Whether any route on this entry carries the capture flag.
    pub fn has_capture(&self) -> bool {
        self.routes.iter().any(|route| route.is_capture())
    }

    pub fn has_face(&self, face_id: FaceId) -> bool {
        self.routes.iter().any(|route| route.face_id == face_id)
    }
}

// ===== impl Rib =====

impl Rib {
    pub fn new() -> Rib {
        Rib::default()
    }

    /// Number of routes across all entries.
    pub fn size(&self) -> usize {
        self.n_routes
    }

    pub fn entry(&self, name: &Name) -> Option<&RibEntry> {
        self.entries.get(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Name, &RibEntry)> {
        self.entries.iter()
    }

    pub fn find_route(&self, name: &Name, route: &Route) -> Option<&Route> {
        self.entries.get(name).and_then(|entry| entry.find_route(route))
    }

    /// Inserts or updates a route. Route identity is (face_id, origin);
    /// an update refreshes cost, flags, and expiration.
    pub fn insert(&mut self, name: &Name, route: Route) {
        let entry = self.entries.entry(name.clone()).or_default();
        match entry
            .routes
            .iter_mut()
            .find(|candidate| {
                candidate.face_id == route.face_id
                    && candidate.origin == route.origin
            }) {
            Some(existing) => {
                existing.cost = route.cost;
                existing.flags = route.flags;
                existing.expires = route.expires;
            }
            None => {
                entry.routes.push(route);
                self.n_routes += 1;
            }
        }
        debug!(%name, %route, "route inserted");
    }

    /// Erases a route; an entry left without routes is removed from the
    /// tree.
    pub fn erase(&mut self, name: &Name, route: &Route) {
        let Some(entry) = self.entries.get_mut(name) else {
            return;
        };
        let before = entry.routes.len();
        entry.routes.retain(|candidate| {
            candidate.face_id != route.face_id
                || candidate.origin != route.origin
        });
        if entry.routes.len() != before {
            self.n_routes -= 1;
            debug!(%name, %route, "route erased");
        }
        if entry.routes.is_empty() {
            self.entries.remove(name);
        }
    }

    /// The closest existing proper ancestor of `name`.
    pub fn find_parent(&self, name: &Name) -> Option<&Name> {
        (0..name.len()).rev().find_map(|len| {
            let prefix = name.get_prefix(len);
            self.entries.get_key_value(&prefix).map(|(key, _)| key)
        })
    }

    /// Entries at or below `name`, in ascending name order.
    pub fn descendants<'a>(
        &'a self,
        name: &'a Name,
    ) -> impl Iterator<Item = (&'a Name, &'a RibEntry)> {
        self.entries
            .range(name.clone()..)
            .take_while(move |(candidate, _)| name.is_prefix_of(candidate))
    }

    /// The ancestor routes projected onto `name`: walking from the parent
    /// toward the root, each ancestor contributes its child-inherit
    /// routes; the first capturing ancestor also contributes its capture
    /// routes and terminates the walk. An entry that itself captures
    /// receives nothing from above.
    pub fn ancestor_routes(&self, name: &Name) -> Vec<Route> {
        if self
            .entries
            .get(name)
            .is_some_and(|entry| entry.has_capture())
        {
            return Vec::new();
        }

        let mut routes: Vec<Route> = Vec::new();
        let mut cursor = self.find_parent(name);
        while let Some(ancestor_name) = cursor {
            let ancestor = &self.entries[ancestor_name];
            for route in &ancestor.routes {
                let projected = route.is_child_inherit()
                    || (ancestor.has_capture() && route.is_capture());
                if projected
                    && !routes.iter().any(|seen| {
                        seen.face_id == route.face_id
                            && seen.origin == route.origin
                    })
                {
                    routes.push(*route);
                }
            }
            if ancestor.has_capture() {
                break;
            }
            cursor = self.find_parent(ancestor_name);
        }
        routes
    }

    /// The effective next-hops for `name`: own routes united with the
    /// ancestor routes, deduplicated per face keeping the minimum cost.
    /// Only names with a RIB entry have effective next-hops.
    pub fn effective_nexthops(&self, name: &Name) -> BTreeMap<FaceId, u64> {
        let Some(entry) = self.entries.get(name) else {
            return BTreeMap::new();
        };
        let mut nexthops = BTreeMap::new();
        for route in entry.routes.iter().chain(self.ancestor_routes(name).iter())
        {
            nexthops
                .entry(route.face_id)
                .and_modify(|cost: &mut u64| *cost = (*cost).min(route.cost))
                .or_insert(route.cost);
        }
        nexthops
    }

    /// Applies the precalculated inherited-route updates produced by the
    /// FIB updater once a batch has been applied.
    pub fn modify_inherited_routes(&mut self, updates: &[RibUpdate]) {
        for update in updates {
            let Some(entry) = self.entries.get_mut(&update.name) else {
                continue;
            };
            match update.action {
                RibUpdateAction::Register => {
                    entry.inherited_routes.retain(|route| {
                        route.face_id != update.route.face_id
                            || route.origin != update.route.origin
                    });
                    entry.inherited_routes.push(update.route);
                }
                RibUpdateAction::Unregister
                | RibUpdateAction::RemoveFace => {
                    entry.inherited_routes.retain(|route| {
                        route.face_id != update.route.face_id
                            || route.origin != update.route.origin
                    });
                }
            }
        }
    }

    /// Every (name, route) pair referring to `face_id`, used when the
    /// face disappears.
    pub fn routes_with_face(&self, face_id: FaceId) -> Vec<(Name, Route)> {
        self.entries
            .iter()
            .flat_map(|(name, entry)| {
                entry
                    .routes
                    .iter()
                    .filter(|route| route.face_id == face_id)
                    .map(|route| (name.clone(), *route))
            })
            .collect()
    }
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::RouteFlags;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    fn route(face_id: FaceId, cost: u64, flags: RouteFlags) -> Route {
        Route::new(face_id, 0, cost, flags, None)
    }

    #[test]
    fn insert_updates_in_place() {
        let mut rib = Rib::new();
        rib.insert(&name("/A"), route(1, 10, RouteFlags::empty()));
        rib.insert(&name("/A"), route(1, 20, RouteFlags::CHILD_INHERIT));
        assert_eq!(rib.size(), 1);
        let entry = rib.entry(&name("/A")).unwrap();
        assert_eq!(entry.routes()[0].cost, 20);
        assert!(entry.routes()[0].is_child_inherit());

        // Distinct origin is a distinct route.
        rib.insert(&name("/A"), Route::new(1, 255, 5, RouteFlags::empty(), None));
        assert_eq!(rib.size(), 2);
    }

    #[test]
    fn erase_removes_empty_entries() {
        let mut rib = Rib::new();
        let r = route(1, 10, RouteFlags::empty());
        rib.insert(&name("/A"), r);
        rib.erase(&name("/A"), &r);
        assert_eq!(rib.size(), 0);
        assert!(rib.entry(&name("/A")).is_none());
    }

    #[test]
    fn parent_and_descendants() {
        let mut rib = Rib::new();
        rib.insert(&name("/A"), route(1, 10, RouteFlags::empty()));
        rib.insert(&name("/A/B/C"), route(2, 10, RouteFlags::empty()));
        rib.insert(&name("/AB"), route(3, 10, RouteFlags::empty()));

        assert_eq!(rib.find_parent(&name("/A/B/C")), Some(&name("/A")));
        assert_eq!(rib.find_parent(&name("/A")), None);

        let below_a: Vec<_> = rib
            .descendants(&name("/A"))
            .map(|(name, _)| name.to_string())
            .collect();
        assert_eq!(below_a, ["/A", "/A/B/C"]);
    }

    #[test]
    fn ancestor_routes_follow_child_inherit() {
        let mut rib = Rib::new();
        rib.insert(&name("/A"), route(1, 10, RouteFlags::CHILD_INHERIT));
        rib.insert(&name("/A"), route(9, 10, RouteFlags::empty()));
        rib.insert(&name("/A/B"), route(2, 5, RouteFlags::empty()));

        let inherited = rib.ancestor_routes(&name("/A/B"));
        assert_eq!(inherited.len(), 1);
        assert_eq!(inherited[0].face_id, 1);

        let nexthops = rib.effective_nexthops(&name("/A/B"));
        assert_eq!(nexthops.len(), 2);
        assert_eq!(nexthops[&1], 10);
        assert_eq!(nexthops[&2], 5);
    }

    #[test]
    fn capture_blocks_and_projects() {
        let mut rib = Rib::new();
        rib.insert(&Name::root(), route(10, 1, RouteFlags::CHILD_INHERIT));
        rib.insert(&name("/A"), route(20, 1, RouteFlags::CAPTURE));
        rib.insert(&name("/A/B"), route(30, 1, RouteFlags::empty()));

        // The capturing entry itself inherits nothing.
        assert!(rib.ancestor_routes(&name("/A")).is_empty());
        let nexthops = rib.effective_nexthops(&name("/A"));
        assert_eq!(nexthops.len(), 1);
        assert!(nexthops.contains_key(&20));

        // Below the capture, the capture route shadows the root's.
        let inherited = rib.ancestor_routes(&name("/A/B"));
        assert_eq!(inherited.len(), 1);
        assert_eq!(inherited[0].face_id, 20);
        let nexthops = rib.effective_nexthops(&name("/A/B"));
        assert_eq!(nexthops.len(), 2);
        assert!(nexthops.contains_key(&30));
        assert!(nexthops.contains_key(&20));
        assert!(!nexthops.contains_key(&10));
    }

    #[test]
    fn routes_with_face_enumerates_everywhere() {
        let mut rib = Rib::new();
        rib.insert(&name("/A"), route(7, 10, RouteFlags::empty()));
        rib.insert(&name("/B"), route(7, 20, RouteFlags::empty()));
        rib.insert(&name("/B"), route(8, 20, RouteFlags::empty()));
        let found = rib.routes_with_face(7);
        assert_eq!(found.len(), 2);
    }
}
