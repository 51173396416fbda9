// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Event identity and last-writer-wins registers.
//!
//! Concurrent property writes resolve by the total order on [`EventId`]:
//! `(lamport, writer, patch digest, op index)` compared lexicographically.
//! Every component is derived from the containing patch, so two replicas
//! folding the same patches agree on every tie-break without coordination.

use serde::{Deserialize, Serialize};
use warp_store::Oid;

use crate::dot::WriterId;

/// Total-order key for LWW tie-breaking.
///
/// Field order matters: the derived `Ord` is exactly the lexicographic
/// `(lamport, writer, patch_sha, op_index)` wire order.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct EventId {
    /// Lamport timestamp of the containing patch.
    pub lamport: u64,
    /// Writer that produced the patch.
    pub writer: WriterId,
    /// Digest of the patch blob.
    pub patch_sha: Oid,
    /// Index of the operation within the patch's op list.
    pub op_index: u32,
}

/// Last-writer-wins register keyed by [`EventId`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LwwRegister<V> {
    /// Current winning value.
    pub value: V,
    /// Event that wrote it.
    pub event: EventId,
}

impl<V> LwwRegister<V> {
    /// Creates a register holding `value` written at `event`.
    pub fn new(value: V, event: EventId) -> Self {
        Self { value, event }
    }

    /// Keeps whichever write has the greater event id.
    ///
    /// Event ids are unique (the patch digest and op index disambiguate), so
    /// there is no tie to break.
    pub fn join(&mut self, other: Self) {
        if other.event > self.event {
            *self = other;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn event(lamport: u64, writer: &str, sha: &str, op: u32) -> EventId {
        EventId {
            lamport,
            writer: WriterId::new(writer).unwrap(),
            patch_sha: Oid::new(sha).unwrap(),
            op_index: op,
        }
    }

    #[test]
    fn order_is_lexicographic_on_the_four_tuple() {
        assert!(event(1, "z", "aa", 9) < event(2, "a", "aa", 0));
        assert!(event(1, "a", "aa", 0) < event(1, "b", "aa", 0));
        assert!(event(1, "a", "aa", 0) < event(1, "a", "ab", 0));
        assert!(event(1, "a", "aa", 0) < event(1, "a", "aa", 1));
    }

    #[test]
    fn join_keeps_greater_event() {
        let mut reg = LwwRegister::new("old", event(1, "a", "aa", 0));
        reg.join(LwwRegister::new("new", event(2, "a", "aa", 0)));
        assert_eq!(reg.value, "new");
        // A smaller event never wins, in either application order.
        reg.join(LwwRegister::new("stale", event(1, "z", "ff", 3)));
        assert_eq!(reg.value, "new");
    }
}
