// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Canonical state codec: golden vectors, round-trips, and compaction
//! safety of the state hash.
#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::{
    edge_add, inline_str, node_add, node_remove, patch, patch_sha, prop_set, writer,
};
use warp_core::{
    decode_state, encode_state, reduce, state_hash, Patch, VersionVector, WarpState,
};
use warp_store::Oid;

fn reduce_all(patches: &[&Patch]) -> WarpState {
    let keyed: Vec<(Oid, &Patch)> = patches.iter().map(|p| (patch_sha(p), *p)).collect();
    reduce(keyed.iter().map(|(sha, p)| (sha, *p)), WarpState::new())
        .unwrap_or_else(|err| panic!("reduce failed: {err}"))
}

fn populated_state() -> WarpState {
    let p1 = patch(
        "A",
        1,
        vec![
            node_add("x", "A:1"),
            node_add("y", "A:2"),
            edge_add("x", "y", "link", "A:3"),
            prop_set("x", "color", inline_str("teal")),
        ],
    );
    let p2 = patch("B", 2, vec![node_add("z", "B:1"), node_remove(&["A:2"])]);
    reduce_all(&[&p1, &p2])
}

// ── Golden vector: the empty state hash is pinned ───────────────────────
//
// If this changes, the canonical wire format changed and needs a version
// bump, not a test update.

#[test]
fn empty_state_hash_golden_vector() {
    let expected = "67233d732df3020bd31f1c3d7139a51c577e88700f2339773c138f32f2f74557";
    assert_eq!(hex::encode(state_hash(&WarpState::new())), expected);
}

// ── Round-trip: decode(encode(s)) is observably s ───────────────────────

#[test]
fn encode_decode_round_trip_preserves_bytes() {
    let state = populated_state();
    let bytes = encode_state(&state);
    let decoded = decode_state(&bytes).unwrap();
    assert_eq!(encode_state(&decoded), bytes);
    assert_eq!(state_hash(&decoded), state_hash(&state));
}

#[test]
fn round_trip_preserves_projection() {
    let state = populated_state();
    let decoded = decode_state(&encode_state(&state)).unwrap();
    let original_nodes: Vec<_> = state.visible_nodes().cloned().collect();
    let decoded_nodes: Vec<_> = decoded.visible_nodes().cloned().collect();
    assert_eq!(original_nodes, decoded_nodes);
    assert_eq!(decoded.frontier(), state.frontier());
}

// ── Invariant 3: compaction never changes the hash ──────────────────────

#[test]
fn compaction_preserves_state_hash() {
    let mut state = populated_state();
    let before = state_hash(&state);
    assert!(state.node_alive().tombstone_count() > 0);

    let vv = state.frontier().clone();
    let removed = state.compact(&vv);
    assert!(removed > 0);
    assert_eq!(state_hash(&state), before);
}

#[test]
fn compaction_with_a_dominating_vector_preserves_hash() {
    let mut state = populated_state();
    let before = state_hash(&state);

    // A vector strictly above the frontier — still only cancels tombstones.
    let mut vv: VersionVector = VersionVector::new();
    vv.merge(state.frontier());
    for _ in 0..10 {
        vv.increment(&writer("A"));
        vv.increment(&writer("B"));
        vv.increment(&writer("never-seen"));
    }
    state.compact(&vv);
    assert_eq!(state_hash(&state), before);
}

// ── Hash reflects observable content, not history ───────────────────────

#[test]
fn states_with_different_content_hash_differently() {
    let a = reduce_all(&[&patch("A", 1, vec![node_add("x", "A:1")])]);
    let b = reduce_all(&[&patch("A", 1, vec![node_add("y", "A:1")])]);
    assert_ne!(state_hash(&a), state_hash(&b));
}

#[test]
fn tombstoned_then_compacted_equals_never_added() {
    // Add-then-remove-then-compact and a state where the element's dots
    // never existed at all differ only in frontier; align the frontiers
    // and the hashes must agree.
    let add = patch("A", 1, vec![node_add("x", "A:1")]);
    let rm = patch("B", 2, vec![node_remove(&["A:1"])]);
    let mut removed = reduce_all(&[&add, &rm]);
    let vv = removed.frontier().clone();
    removed.compact(&vv);

    // Same frontier as the removed state, no elements: an empty patch
    // whose context carries the frontier.
    let mut ctx_patch = patch("A", 3, vec![]);
    ctx_patch.context = vv;
    let pristine =
        reduce([(&patch_sha(&ctx_patch), &ctx_patch)], WarpState::new()).unwrap();

    assert_eq!(state_hash(&removed), state_hash(&pristine));
}

// ── The persisted checkpoint name is pinned ─────────────────────────────

#[test]
fn state_blob_name_is_stable() {
    assert_eq!(warp_core::STATE_BLOB_NAME, "state.v5");
}
