//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::fmt::Write as _;
use std::hash::{DefaultHasher, Hasher};
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A single opaque component of a hierarchical [`Name`].
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct NameComponent(Bytes);

/// A hierarchical NDN name: an ordered sequence of opaque byte-string
/// components.
///
/// The empty name (zero components) is the root of the name hierarchy and
/// prints as `/`.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct Name {
    components: Vec<NameComponent>,
}

/// 64-bit hash of a name prefix, XOR-combined from per-component hashes.
pub type HashValue = u64;

/// Hashes of every prefix of a name, from `get_prefix(0)` (always 0) to the
/// full name. Computing the whole sequence costs a single pass over the
/// components.
pub type HashSequence = Vec<HashValue>;

#[derive(Debug, Eq, PartialEq)]
pub enum NameParseError {
    InvalidEscape(String),
}

// ===== impl NameComponent =====

impl NameComponent {
    pub fn new(bytes: impl Into<Bytes>) -> NameComponent {
        NameComponent(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stable 64-bit hash of the component contents.
    pub fn hash_value(&self) -> HashValue {
        // DefaultHasher with the default keys is deterministic for the
        // lifetime of the process, which is all the name tree requires.
        let mut hasher = DefaultHasher::new();
        hasher.write(&self.0);
        hasher.finish()
    }

    fn is_unescaped(b: u8) -> bool {
        b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
    }
}

impl std::fmt::Display for NameComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &b in self.0.iter() {
            if NameComponent::is_unescaped(b) {
                f.write_char(b as char)?;
            } else {
                write!(f, "%{:02X}", b)?;
            }
        }
        Ok(())
    }
}

impl From<&str> for NameComponent {
    fn from(s: &str) -> NameComponent {
        NameComponent(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<&[u8]> for NameComponent {
    fn from(bytes: &[u8]) -> NameComponent {
        NameComponent(Bytes::copy_from_slice(bytes))
    }
}

// ===== impl Name =====

impl Name {
    /// The root name, with zero components.
    pub fn root() -> Name {
        Name::default()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&NameComponent> {
        self.components.get(index)
    }

    pub fn components(&self) -> impl Iterator<Item = &NameComponent> {
        self.components.iter()
    }

    /// Returns the prefix consisting of the first `len` components. `len`
    /// is clamped to the name length.
    pub fn get_prefix(&self, len: usize) -> Name {
        let len = len.min(self.components.len());
        Name {
            components: self.components[..len].to_vec(),
        }
    }

    /// Returns the name with the last component removed, or `None` for the
    /// root name.
    pub fn parent(&self) -> Option<Name> {
        match self.components.len() {
            0 => None,
            len => Some(self.get_prefix(len - 1)),
        }
    }

    pub fn append(&mut self, component: NameComponent) {
        self.components.push(component);
    }

    pub fn appending(&self, component: NameComponent) -> Name {
        let mut name = self.clone();
        name.append(component);
        name
    }

    pub fn is_prefix_of(&self, other: &Name) -> bool {
        other.components.len() >= self.components.len()
            && self.components[..] == other.components[..self.components.len()]
    }

    /// Number of leading components shared with `other`.
    pub fn longest_common_prefix(&self, other: &Name) -> usize {
        self.components
            .iter()
            .zip(other.components.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Hash of the prefix consisting of the first `len` components.
    pub fn prefix_hash(&self, len: usize) -> HashValue {
        let len = len.min(self.components.len());
        self.components[..len]
            .iter()
            .fold(0, |h, comp| h ^ comp.hash_value())
    }

    /// Hashes of every prefix up to `len` components, in one pass.
    /// `result[k]` is the hash of `get_prefix(k)`; `result[0]` is 0.
    pub fn prefix_hashes(&self, len: usize) -> HashSequence {
        let len = len.min(self.components.len());
        let mut seq = Vec::with_capacity(len + 1);
        let mut h: HashValue = 0;
        seq.push(h);
        for comp in &self.components[..len] {
            h ^= comp.hash_value();
            seq.push(h);
        }
        seq
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.components.is_empty() {
            return f.write_char('/');
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl FromStr for Name {
    type Err = NameParseError;

    fn from_str(s: &str) -> Result<Name, NameParseError> {
        let s = s.strip_prefix("ndn:").unwrap_or(s);
        let mut components = Vec::new();
        for segment in s.split('/') {
            if segment.is_empty() {
                continue;
            }
            components.push(parse_component(segment)?);
        }
        Ok(Name { components })
    }
}

impl<const N: usize> From<[&str; N]> for Name {
    fn from(components: [&str; N]) -> Name {
        Name {
            components: components
                .into_iter()
                .map(NameComponent::from)
                .collect(),
        }
    }
}

// ===== impl NameParseError =====

impl std::fmt::Display for NameParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NameParseError::InvalidEscape(segment) => {
                write!(f, "invalid percent-escape in name component: {segment}")
            }
        }
    }
}

impl std::error::Error for NameParseError {}

// ===== global functions =====

fn parse_component(segment: &str) -> Result<NameComponent, NameParseError> {
    let raw = segment.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut iter = raw.iter().copied();
    while let Some(b) = iter.next() {
        if b != b'%' {
            bytes.push(b);
            continue;
        }
        let hi = iter.next().and_then(hex_digit);
        let lo = iter.next().and_then(hex_digit);
        match (hi, lo) {
            (Some(hi), Some(lo)) => bytes.push(hi << 4 | lo),
            _ => {
                return Err(NameParseError::InvalidEscape(segment.to_owned()));
            }
        }
    }
    Ok(NameComponent(Bytes::from(bytes)))
}

fn hex_digit(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

// ===== tests =====
