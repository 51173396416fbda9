// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared fixtures for warp-core integration tests.
#![allow(clippy::unwrap_used, dead_code)]

use warp_core::{
    Dot, EdgeKey, EdgeLabel, NodeId, Op, Patch, PropKey, PropValue, Scalar, VersionVector,
    WriterId, PATCH_SCHEMA_VERSION,
};
use warp_store::Oid;

pub fn writer(id: &str) -> WriterId {
    WriterId::new(id).unwrap()
}

pub fn node(id: &str) -> NodeId {
    NodeId::new(id).unwrap()
}

pub fn edge(from: &str, to: &str, label: &str) -> EdgeKey {
    EdgeKey::new(
        node(from),
        node(to),
        EdgeLabel::new(label).unwrap(),
    )
}

pub fn dot(text: &str) -> Dot {
    Dot::parse(text).unwrap()
}

pub fn prop_key(key: &str) -> PropKey {
    PropKey::new(key).unwrap()
}

pub fn inline_str(value: &str) -> PropValue {
    PropValue::inline(Scalar::Str(value.to_owned()))
}

/// A patch with no context and no base checkpoint.
pub fn patch(writer_id: &str, lamport: u64, ops: Vec<Op>) -> Patch {
    Patch {
        base_checkpoint: None,
        context: VersionVector::new(),
        lamport,
        ops,
        schema: PATCH_SCHEMA_VERSION,
        writer: writer(writer_id),
    }
}

/// Deterministic per-patch digest for tests that never touch a store: the
/// digest of the canonical patch bytes, exactly like the real commit path.
pub fn patch_sha(p: &Patch) -> Oid {
    use sha2::{Digest, Sha256};
    let digest = hex::encode(Sha256::digest(p.encode_canonical()));
    Oid::new(digest).unwrap()
}

pub fn node_add(n: &str, d: &str) -> Op {
    Op::NodeAdd {
        node: node(n),
        dot: dot(d),
    }
}

pub fn node_remove(observed: &[&str]) -> Op {
    Op::NodeRemove {
        observed: observed.iter().map(|d| dot(d)).collect(),
    }
}

pub fn edge_add(from: &str, to: &str, label: &str, d: &str) -> Op {
    Op::EdgeAdd {
        from: node(from),
        to: node(to),
        label: EdgeLabel::new(label).unwrap(),
        dot: dot(d),
    }
}

pub fn prop_set(n: &str, key: &str, value: PropValue) -> Op {
    Op::PropSet {
        node: node(n),
        key: prop_key(key),
        value,
    }
}
