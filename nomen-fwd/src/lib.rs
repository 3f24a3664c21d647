//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![cfg_attr(
    feature = "testing",
    allow(dead_code, unused_variables, unused_imports)
)]

pub mod counters;
pub mod face;
pub mod forwarder;
pub mod fw;
pub mod mgmt;
pub mod name_tree;
pub mod table;
pub mod tasks;
