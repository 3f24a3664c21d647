//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![cfg_attr(
    feature = "testing",
    allow(dead_code, unused_variables, unused_imports)
)]

pub mod face;
pub mod ibus;
pub mod mac_addr;
pub mod name;
pub mod packet;
pub mod task;
pub mod udp;
pub mod uri;
