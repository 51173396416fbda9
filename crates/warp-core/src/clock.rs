// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Version vectors.
//!
//! A [`VersionVector`] maps each writer to the greatest counter observed
//! from it. Absent writers have an implied count of 0. The merge is the
//! pointwise max, which makes the vector a join-semilattice — the shape
//! every piece of warp state leans on for order-independence.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::dot::{Dot, WriterId};

/// Per-writer high-water counters.
///
/// Zero entries are never stored — "counter 0" and "absent" are the same
/// observation, and canonical encodings must not distinguish them.
#[derive(Clone, Default, PartialEq, Eq, Debug, Serialize)]
#[serde(transparent)]
pub struct VersionVector(BTreeMap<WriterId, u64>);

impl<'de> Deserialize<'de> for VersionVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<WriterId, u64>::deserialize(deserializer)?;
        Ok(raw.into_iter().collect())
    }
}

impl VersionVector {
    /// Creates an empty vector (every writer implicitly at 0).
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded counter for `writer`, 0 when absent.
    pub fn get(&self, writer: &WriterId) -> u64 {
        self.0.get(writer).copied().unwrap_or(0)
    }

    /// Bumps `writer` by one and returns the new counter.
    pub fn increment(&mut self, writer: &WriterId) -> u64 {
        let next = self.get(writer) + 1;
        self.0.insert(writer.clone(), next);
        next
    }

    /// Raises `writer` to `counter` if it is higher than the current value.
    pub fn observe(&mut self, dot: &Dot) {
        let entry = self.0.entry(dot.writer().clone()).or_insert(0);
        *entry = (*entry).max(dot.counter());
    }

    /// Pointwise max with `other`.
    pub fn merge(&mut self, other: &Self) {
        for (writer, counter) in &other.0 {
            if *counter == 0 {
                continue;
            }
            let entry = self.0.entry(writer.clone()).or_insert(0);
            *entry = (*entry).max(*counter);
        }
    }

    /// `true` iff this vector has seen `dot`.
    pub fn covers(&self, dot: &Dot) -> bool {
        self.get(dot.writer()) >= dot.counter()
    }

    /// `true` iff every entry of `other` is covered by this vector.
    pub fn dominates(&self, other: &Self) -> bool {
        other
            .0
            .iter()
            .all(|(writer, counter)| self.get(writer) >= *counter)
    }

    /// Number of writers with a non-zero counter.
    pub fn writer_count(&self) -> usize {
        self.0.len()
    }

    /// `true` when no writer has been observed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates `(writer, counter)` in writer order.
    pub fn iter(&self) -> impl Iterator<Item = (&WriterId, u64)> {
        self.0.iter().map(|(writer, counter)| (writer, *counter))
    }
}

impl FromIterator<(WriterId, u64)> for VersionVector {
    fn from_iter<T: IntoIterator<Item = (WriterId, u64)>>(iter: T) -> Self {
        Self(iter.into_iter().filter(|(_, c)| *c > 0).collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn writer(id: &str) -> WriterId {
        WriterId::new(id).unwrap()
    }

    #[test]
    fn increment_and_covers() {
        let mut vv = VersionVector::new();
        assert_eq!(vv.increment(&writer("a")), 1);
        assert_eq!(vv.increment(&writer("a")), 2);
        assert!(vv.covers(&Dot::parse("a:2").unwrap()));
        assert!(!vv.covers(&Dot::parse("a:3").unwrap()));
        assert!(!vv.covers(&Dot::parse("b:1").unwrap()));
    }

    #[test]
    fn merge_is_pointwise_max() {
        let mut a: VersionVector = [(writer("a"), 3), (writer("b"), 1)].into_iter().collect();
        let b: VersionVector = [(writer("a"), 1), (writer("c"), 5)].into_iter().collect();
        a.merge(&b);
        assert_eq!(a.get(&writer("a")), 3);
        assert_eq!(a.get(&writer("b")), 1);
        assert_eq!(a.get(&writer("c")), 5);
    }

    #[test]
    fn dominates_requires_every_entry() {
        let big: VersionVector = [(writer("a"), 3), (writer("b"), 2)].into_iter().collect();
        let small: VersionVector = [(writer("a"), 2)].into_iter().collect();
        assert!(big.dominates(&small));
        assert!(!small.dominates(&big));
        assert!(big.dominates(&VersionVector::new()));
    }
}
