//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::any::{Any, TypeId};
use std::collections::HashMap;

/// Type-indexed heterogeneous storage for per-strategy state.
///
/// Carried by PIT entries, their face records, and Measurements entries.
/// Values are owned by the host entry and destroyed with it; a strategy
/// change clears the whole map on affected entries.
#[derive(Default)]
pub struct StrategyInfoHost {
    slots: HashMap<TypeId, Box<dyn Any + Send>>,
}

// ===== impl StrategyInfoHost =====

impl StrategyInfoHost {
    pub fn get<T: Any + Send>(&self) -> Option<&T> {
        self.slots
            .get(&TypeId::of::<T>())
            .and_then(|slot| slot.downcast_ref())
    }

    pub fn get_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.slots
            .get_mut(&TypeId::of::<T>())
            .and_then(|slot| slot.downcast_mut())
    }

    /// Inserts `value`, replacing any existing slot of the same type.
    pub fn insert<T: Any + Send>(&mut self, value: T) -> &mut T {
        self.slots.insert(TypeId::of::<T>(), Box::new(value));
        self.get_mut().unwrap()
    }

    /// Returns the slot of type `T`, creating it with `init` if absent.
    pub fn get_or_insert_with<T: Any + Send>(
        &mut self,
        init: impl FnOnce() -> T,
    ) -> &mut T {
        self.slots
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(init()))
            .downcast_mut()
            .unwrap()
    }

    pub fn erase<T: Any + Send>(&mut self) -> bool {
        self.slots.remove(&TypeId::of::<T>()).is_some()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl std::fmt::Debug for StrategyInfoHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyInfoHost")
            .field("slots", &self.slots.len())
            .finish()
    }
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Eq, PartialEq)]
    struct Alpha(u32);
    #[derive(Debug, Eq, PartialEq)]
    struct Beta(&'static str);

    #[test]
    fn typed_slots() {
        let mut host = StrategyInfoHost::default();
        assert!(host.get::<Alpha>().is_none());

        host.insert(Alpha(1));
        host.insert(Beta("x"));
        assert_eq!(host.get::<Alpha>(), Some(&Alpha(1)));
        assert_eq!(host.get::<Beta>(), Some(&Beta("x")));

        // Insert replaces.
        host.insert(Alpha(2));
        assert_eq!(host.get::<Alpha>(), Some(&Alpha(2)));

        let slot = host.get_or_insert_with(|| Alpha(9));
        assert_eq!(*slot, Alpha(2));

        assert!(host.erase::<Alpha>());
        assert!(!host.erase::<Alpha>());
        assert_eq!(host.get_or_insert_with(|| Alpha(9)), &Alpha(9));

        host.clear();
        assert!(host.is_empty());
    }
}
