//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use bytes::Bytes;
use derive_new::new;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::name::{Name, NameComponent};

/// Consumer-chosen 32-bit loop-detection tag.
pub type Nonce = u32;

/// Optional Interest fields restricting which Data satisfies it.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Selectors {
    pub min_suffix_components: Option<usize>,
    pub max_suffix_components: Option<usize>,
    pub child_selector: Option<ChildSelector>,
    pub must_be_fresh: bool,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum ChildSelector {
    Leftmost,
    Rightmost,
}

/// Request packet carrying a hierarchical Name, selectors, a nonce, and a
/// lifetime.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Interest {
    pub name: Name,
    pub selectors: Selectors,
    pub nonce: Option<Nonce>,
    pub lifetime: Option<Duration>,
}

/// Response packet carrying a Name and content. The full name additionally
/// carries the implicit digest component.
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct Data {
    pub name: Name,
    pub content: Bytes,
    pub freshness_period: Option<Duration>,
}

/// Negative acknowledgment for a previously sent Interest.
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct Nack {
    pub reason: NackReason,
    pub interest: Interest,
}

/// Nack reason code. Among the real reasons the numerically smaller value
/// is less severe; `None` is a sentinel treated as most severe.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum NackReason {
    None,
    Congestion,
    Duplicate,
    NoRoute,
}

// ===== impl Interest =====

impl Interest {
    /// Lifetime applied when the packet does not carry one.
    pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(4);

    pub fn new(name: Name) -> Interest {
        Interest {
            name,
            selectors: Default::default(),
            nonce: None,
            lifetime: None,
        }
    }

    pub fn with_nonce(mut self, nonce: Nonce) -> Interest {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Interest {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn lifetime_or_default(&self) -> Duration {
        self.lifetime.unwrap_or(Interest::DEFAULT_LIFETIME)
    }

    /// Returns the carried nonce, generating and recording a fresh one if
    /// the consumer did not set it.
    pub fn ensure_nonce(&mut self) -> Nonce {
        *self
            .nonce
            .get_or_insert_with(|| rand::rng().random::<Nonce>())
    }

    /// Whether `data` satisfies this Interest. The Interest name must be a
    /// prefix of the Data full name (which includes the implicit digest
    /// component), and the suffix length must satisfy the selectors.
    /// Freshness is the Content Store's concern, not part of the match.
    pub fn matches_data(&self, data: &Data) -> bool {
        let full_name = data.full_name();
        if !self.name.is_prefix_of(&full_name) {
            return false;
        }
        let suffix_len = full_name.len() - self.name.len();
        if let Some(min) = self.selectors.min_suffix_components
            && suffix_len < min
        {
            return false;
        }
        if let Some(max) = self.selectors.max_suffix_components
            && suffix_len > max
        {
            return false;
        }
        true
    }
}

// ===== impl Data =====

impl Data {
    /// The Data name extended with the implicit digest component, derived
    /// deterministically from the canonical form of the packet.
    pub fn full_name(&self) -> Name {
        let mut hasher = Sha256::new();
        for component in self.name.components() {
            hasher.update((component.len() as u64).to_be_bytes());
            hasher.update(component.as_bytes());
        }
        hasher.update(&self.content);
        let digest = hasher.finalize();
        self.name
            .appending(NameComponent::new(Bytes::copy_from_slice(&digest)))
    }
}

// ===== impl NackReason =====

impl NackReason {
    fn value(self) -> u32 {
        match self {
            NackReason::None => 0,
            NackReason::Congestion => 50,
            NackReason::Duplicate => 100,
            NackReason::NoRoute => 150,
        }
    }

    /// Returns the less severe of two reasons. `None` is most severe.
    pub fn least_severe(x: NackReason, y: NackReason) -> NackReason {
        match (x, y) {
            (NackReason::None, y) => y,
            (x, NackReason::None) => x,
            (x, y) if x.value() <= y.value() => x,
            (_, y) => y,
        }
    }
}

impl std::fmt::Display for NackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NackReason::None => write!(f, "None"),
            NackReason::Congestion => write!(f, "Congestion"),
            NackReason::Duplicate => write!(f, "Duplicate"),
            NackReason::NoRoute => write!(f, "NoRoute"),
        }
    }
}

// ===== tests =====
