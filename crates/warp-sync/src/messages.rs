// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Sync wire messages.
//!
//! JSON, `application/json`, canonical form via `warp_core::to_canonical_json`.
//! The `type` tag discriminates requests from responses so a transport can
//! route on the parsed value alone.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use warp_core::{Patch, WriterId};
use warp_store::Oid;

/// Per-writer tips: `writer → latest commit digest on that writer's chain`.
#[derive(Clone, Default, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frontier(BTreeMap<WriterId, Oid>);

impl Frontier {
    /// Creates an empty frontier.
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded tip for `writer`, if any.
    pub fn get(&self, writer: &WriterId) -> Option<&Oid> {
        self.0.get(writer)
    }

    /// Records (or replaces) `writer`'s tip.
    pub fn insert(&mut self, writer: WriterId, tip: Oid) {
        self.0.insert(writer, tip);
    }

    /// Iterates `(writer, tip)` in writer order.
    pub fn iter(&self) -> impl Iterator<Item = (&WriterId, &Oid)> {
        self.0.iter()
    }

    /// Number of writers with a tip.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` when no writer has a tip.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `true` if any of `other`'s tips differ from (or are missing in)
    /// this frontier — i.e. a sync would transfer something.
    pub fn lags_behind(&self, other: &Self) -> bool {
        other
            .0
            .iter()
            .any(|(writer, tip)| self.0.get(writer) != Some(tip))
    }
}

impl FromIterator<(WriterId, Oid)> for Frontier {
    fn from_iter<T: IntoIterator<Item = (WriterId, Oid)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One patch in flight: the producing writer, the canonical blob digest,
/// and the decoded patch itself.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct PatchTransfer {
    /// Producing writer.
    pub writer: WriterId,
    /// Digest of the canonical patch blob.
    pub sha: Oid,
    /// The patch.
    pub patch: Patch,
}

/// A sync protocol message.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SyncMessage {
    /// Client → server: "here is everything I have".
    SyncRequest {
        /// The client's frontier.
        frontier: Frontier,
    },
    /// Server → client: the server's frontier plus whatever the client is
    /// missing, ordered by `(writer, lamport)`.
    SyncResponse {
        /// The server's frontier.
        frontier: Frontier,
        /// Missing patches in canonical transfer order.
        patches: Vec<PatchTransfer>,
    },
}

/// Sorts transfers into canonical response order: writer (lexicographic),
/// then lamport.
pub(crate) fn sort_transfers(patches: &mut [PatchTransfer]) {
    patches.sort_by(|a, b| {
        a.writer
            .cmp(&b.writer)
            .then_with(|| a.patch.lamport.cmp(&b.patch.lamport))
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use warp_core::{to_canonical_json, VersionVector, PATCH_SCHEMA_VERSION};

    fn transfer(writer: &str, lamport: u64) -> PatchTransfer {
        let writer = WriterId::new(writer).unwrap();
        PatchTransfer {
            writer: writer.clone(),
            sha: Oid::new("aa").unwrap(),
            patch: Patch {
                base_checkpoint: None,
                context: VersionVector::new(),
                lamport,
                ops: vec![],
                schema: PATCH_SCHEMA_VERSION,
                writer,
            },
        }
    }

    #[test]
    fn wire_type_tags() {
        let request = SyncMessage::SyncRequest {
            frontier: Frontier::new(),
        };
        let json = String::from_utf8(to_canonical_json(&request).unwrap()).unwrap();
        assert_eq!(json, r#"{"frontier":{},"type":"sync-request"}"#);

        let parsed: SyncMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn response_order_is_writer_then_lamport() {
        let mut patches = vec![transfer("b", 1), transfer("a", 2), transfer("a", 1)];
        sort_transfers(&mut patches);
        let order: Vec<(String, u64)> = patches
            .iter()
            .map(|t| (t.writer.as_str().to_owned(), t.patch.lamport))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a".to_owned(), 1),
                ("a".to_owned(), 2),
                ("b".to_owned(), 1)
            ]
        );
    }

    #[test]
    fn frontier_lag_detection() {
        let writer = WriterId::new("w").unwrap();
        let mut mine = Frontier::new();
        let mut theirs = Frontier::new();
        assert!(!mine.lags_behind(&theirs));

        theirs.insert(writer.clone(), Oid::new("aa").unwrap());
        assert!(mine.lags_behind(&theirs));

        mine.insert(writer, Oid::new("aa").unwrap());
        assert!(!mine.lags_behind(&theirs));
    }
}
