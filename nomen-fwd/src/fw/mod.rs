//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod algorithm;
pub mod best_route;
pub mod retx_suppression;
pub mod strategy;
