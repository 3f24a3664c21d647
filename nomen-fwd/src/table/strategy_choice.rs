//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use nomen_utils::name::Name;
use tracing::{debug, error, info};

use crate::fw::strategy::{Strategy, StrategyFactory, StrategyRegistry};
use crate::name_tree::{EntryIndex, NameTree};
use crate::table::pit::Pit;

/// A per-prefix strategy choice. The entry owns its strategy instance.
pub struct Entry {
    prefix: Name,
    strategy_name: Name,
    // None only while the instance is temporarily taken out for dispatch.
    instance: Option<Box<dyn Strategy>>,
}

/// The Strategy Choice table: which strategy governs which namespace.
///
/// The root prefix always carries a choice (the default strategy), so
/// [`StrategyChoice::find_effective_strategy`] is total.
#[derive(Debug)]
pub struct StrategyChoice {
    registry: StrategyRegistry,
    n_items: usize,
}

// ===== impl Entry =====

impl Entry {
    pub fn prefix(&self) -> &Name {
        &self.prefix
    }

    /// The versioned name of the chosen strategy.
    pub fn strategy_name(&self) -> &Name {
        &self.strategy_name
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("prefix", &self.prefix)
            .field("strategy_name", &self.strategy_name)
            .finish()
    }
}

// ===== impl StrategyChoice =====

impl StrategyChoice {
    pub fn new() -> StrategyChoice {
        StrategyChoice {
            registry: StrategyRegistry::default(),
            n_items: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.n_items
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Registers a strategy factory under its versioned name.
    pub fn install(&mut self, name: Name, factory: StrategyFactory) -> bool {
        self.registry.install(name, factory)
    }

    /// Populates the root entry with the default strategy. The strategy
    /// must have been installed beforehand.
    pub fn set_default(
        &mut self,
        tree: &mut NameTree,
        strategy_name: &Name,
    ) -> bool {
        let Some((versioned, instance)) =
            self.registry.make_instance(strategy_name)
        else {
            error!(strategy = %strategy_name, "default strategy not installed");
            return false;
        };
        // The root entry is set directly: an effective-strategy lookup at
        // this point would find nothing to fall back to.
        let nte = tree.lookup(&Name::root());
        tree.entry_mut(nte).strategy_choice = Some(Entry {
            prefix: Name::root(),
            strategy_name: versioned.clone(),
            instance: Some(instance),
        });
        self.n_items += 1;
        info!(strategy = %versioned, "default strategy set");
        true
    }

    /// Sets the strategy for `prefix`, replacing any existing choice.
    /// Strategy-info on the covered subtree is cleared when the effective
    /// strategy changes.
    pub fn insert(
        &mut self,
        tree: &mut NameTree,
        pit: &mut Pit,
        prefix: &Name,
        strategy_name: &Name,
    ) -> bool {
        let Some((versioned, instance)) =
            self.registry.make_instance(strategy_name)
        else {
            error!(%prefix, strategy = %strategy_name, "strategy not installed");
            return false;
        };

        let nte = tree.lookup(prefix);
        let old_name = match &tree.entry(nte).strategy_choice {
            Some(entry) => {
                if entry.strategy_name == versioned {
                    debug!(%prefix, strategy = %versioned, "strategy unchanged");
                    return true;
                }
                entry.strategy_name.clone()
            }
            None => {
                let effective = self.find_effective_strategy(tree, prefix);
                let entry =
                    tree.entry(effective).strategy_choice.as_ref().unwrap();
                entry.strategy_name.clone()
            }
        };

        if tree.entry(nte).strategy_choice.is_none() {
            self.n_items += 1;
        }
        info!(%prefix, from = %old_name, to = %versioned, "strategy changed");
        tree.entry_mut(nte).strategy_choice = Some(Entry {
            prefix: prefix.clone(),
            strategy_name: versioned.clone(),
            instance: Some(instance),
        });
        if old_name != versioned {
            self.clear_strategy_info_subtree(tree, pit, nte);
        }
        true
    }

    /// Removes the choice on `prefix`, reverting the subtree to the
    /// parent's effective strategy. The root choice cannot be erased.
    pub fn erase(&mut self, tree: &mut NameTree, pit: &mut Pit, prefix: &Name) {
        if prefix.is_empty() {
            error!("cannot erase the default strategy choice");
            return;
        }
        let Some(nte) = tree.find_exact(prefix) else {
            return;
        };
        let Some(entry) = tree.entry(nte).strategy_choice.as_ref() else {
            return;
        };
        let old_name = entry.strategy_name.clone();

        let parent_prefix = prefix.parent().unwrap_or_default();
        let parent_effective =
            self.find_effective_strategy(tree, &parent_prefix);
        let new_name = tree
            .entry(parent_effective)
            .strategy_choice
            .as_ref()
            .unwrap()
            .strategy_name
            .clone();

        if old_name != new_name {
            self.clear_strategy_info_subtree(tree, pit, nte);
        }
        tree.entry_mut(nte).strategy_choice = None;
        self.n_items -= 1;
        tree.erase_if_empty(nte);
    }

    /// The exact choice on `prefix`, if any.
    pub fn get<'a>(
        &self,
        tree: &'a NameTree,
        prefix: &Name,
    ) -> Option<&'a Name> {
        tree.find_exact(prefix)
            .and_then(|nte| tree.entry(nte).strategy_choice.as_ref())
            .map(|entry| entry.strategy_name())
    }

    /// Longest-prefix match over entries carrying a strategy choice.
    /// The root default guarantees a result.
    pub fn find_effective_strategy(
        &self,
        tree: &NameTree,
        name: &Name,
    ) -> EntryIndex {
        tree.find_longest_prefix_match(name, |entry| {
            entry.strategy_choice.is_some()
        })
        .expect("root strategy choice must exist")
    }

    /// As [`Self::find_effective_strategy`], walking up from an existing
    /// name tree entry.
    pub fn find_effective_strategy_at(
        &self,
        tree: &NameTree,
        nte: EntryIndex,
    ) -> EntryIndex {
        tree.ancestors(nte)
            .find(|(_, entry)| entry.strategy_choice.is_some())
            .map(|(index, _)| index)
            .expect("root strategy choice must exist")
    }

    /// Temporarily removes the strategy instance at `nte` for dispatch.
    pub(crate) fn take_instance(
        &mut self,
        tree: &mut NameTree,
        nte: EntryIndex,
    ) -> Box<dyn Strategy> {
        tree.entry_mut(nte)
            .strategy_choice
            .as_mut()
            .and_then(|entry| entry.instance.take())
            .expect("strategy instance must be present")
    }

    /// Returns a strategy instance taken with
    /// [`Self::take_instance`]. The choice entry is guaranteed to still
    /// exist: dispatched strategies cannot mutate this table.
    pub(crate) fn put_instance(
        &mut self,
        tree: &mut NameTree,
        nte: EntryIndex,
        instance: Box<dyn Strategy>,
    ) {
        let entry = tree
            .entry_mut(nte)
            .strategy_choice
            .as_mut()
            .expect("strategy choice entry must be present");
        entry.instance = Some(instance);
    }

    // Clears StrategyInfo on the subtree whose effective strategy is
    // covered by the changing choice entry: descent stops at any other
    // StrategyChoice entry.
    fn clear_strategy_info_subtree(
        &mut self,
        tree: &mut NameTree,
        pit: &mut Pit,
        root: EntryIndex,
    ) {
        let root_prefix = tree.entry(root).name().clone();
        let covered: Vec<EntryIndex> = tree
            .partial_enumerate(&root_prefix, |entry| {
                if entry.name() == &root_prefix {
                    (true, true)
                } else if entry.strategy_choice.is_some() {
                    (false, false)
                } else {
                    (true, true)
                }
            })
            .map(|(index, _)| index)
            .collect();

        for nte in covered {
            debug!(name = %tree.entry(nte).name(), "clearing strategy info");
            let pit_entries = tree.entry(nte).pit_entries.clone();
            for pit_index in pit_entries {
                pit.entry_mut(pit_index).clear_strategy_info();
            }
            if let Some(measurements) =
                tree.entry_mut(nte).measurements.as_mut()
            {
                measurements.strategy_info.clear();
            }
        }
    }
}

impl Default for StrategyChoice {
    fn default() -> StrategyChoice {
        StrategyChoice::new()
    }
}

// ===== tests =====
