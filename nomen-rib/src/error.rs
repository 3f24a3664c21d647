//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::warn;

// RIB errors.
#[derive(Debug)]
pub enum Error {
    FibUpdateFailed(u64, u32, Option<String>),
    UnknownBatchOutcome(u64),
}

// ===== impl Error =====

impl Error {
    pub(crate) fn log(&self) {
        match self {
            Error::FibUpdateFailed(batch_id, code, error) => {
                let error = error.as_deref().unwrap_or("-");
                warn!(%batch_id, %code, %error, "{}", self);
            }
            Error::UnknownBatchOutcome(batch_id) => {
                warn!(%batch_id, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::FibUpdateFailed(..) => {
                write!(f, "FIB update batch failed")
            }
            Error::UnknownBatchOutcome(..) => {
                write!(f, "outcome for a batch that is not in flight")
            }
        }
    }
}

impl std::error::Error for Error {}
