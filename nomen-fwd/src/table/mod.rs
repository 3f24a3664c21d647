//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod cs;
pub mod fib;
pub mod measurements;
pub mod pit;
pub mod strategy_choice;
pub mod strategy_info;

use tokio::sync::mpsc::UnboundedSender;

use crate::name_tree::{HashtableOptions, NameTree};
use crate::tasks::FwMsg;

/// The four name-indexed tables and the NameTree they hang off.
#[derive(Debug)]
pub struct Tables {
    pub name_tree: NameTree,
    pub fib: fib::Fib,
    pub pit: pit::Pit,
    pub measurements: measurements::Measurements,
    pub strategy_choice: strategy_choice::StrategyChoice,
}

// ===== impl Tables =====

impl Tables {
    pub fn new(
        options: HashtableOptions,
        fw_msgp: UnboundedSender<FwMsg>,
    ) -> Tables {
        Tables {
            name_tree: NameTree::new(options),
            fib: fib::Fib::new(),
            pit: pit::Pit::new(),
            measurements: measurements::Measurements::new(fw_msgp),
            strategy_choice: strategy_choice::StrategyChoice::new(),
        }
    }
}
