// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! End-to-end reducer scenarios: permutation invariance, add-wins
//! resurrection, and endpoint-removal projection.
#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::{dot, edge, edge_add, node, node_add, node_remove, patch, patch_sha};
use warp_core::{reduce, state_hash, Op, Patch, WarpState};
use warp_store::Oid;

fn reduce_all(patches: &[&Patch]) -> WarpState {
    let keyed: Vec<(Oid, &Patch)> = patches.iter().map(|p| (patch_sha(p), *p)).collect();
    reduce(keyed.iter().map(|(sha, p)| (sha, *p)), WarpState::new())
        .unwrap_or_else(|err| panic!("reduce failed: {err}"))
}

// ── S1: three writers, all six orderings agree ──────────────────────────

#[test]
fn three_writer_permutations_converge() {
    let p1 = patch("A", 1, vec![node_add("x", "A:1")]);
    let p2 = patch("B", 2, vec![node_add("y", "B:1")]);
    let p3 = patch("C", 3, vec![edge_add("x", "y", "link", "C:1")]);

    let orders: [[&Patch; 3]; 6] = [
        [&p1, &p2, &p3],
        [&p1, &p3, &p2],
        [&p2, &p1, &p3],
        [&p2, &p3, &p1],
        [&p3, &p1, &p2],
        [&p3, &p2, &p1],
    ];

    let reference = reduce_all(&orders[0]);
    let reference_hash = state_hash(&reference);
    for order in &orders[1..] {
        assert_eq!(state_hash(&reduce_all(order)), reference_hash);
    }

    assert!(reference.node_visible(&node("x")));
    assert!(reference.node_visible(&node("y")));
    assert!(reference.edge_visible(&edge("x", "y", "link")));
    assert_eq!(reference.visible_nodes().count(), 2);
}

// ── S2: a remove that observed nothing removes nothing ──────────────────

#[test]
fn blind_remove_cannot_beat_concurrent_add() {
    let pa = patch("A", 1, vec![node_add("z", "A:1")]);
    let pb = patch("B", 1, vec![node_remove(&[])]);

    let forward = reduce_all(&[&pa, &pb]);
    let backward = reduce_all(&[&pb, &pa]);

    assert!(forward.node_visible(&node("z")));
    assert!(backward.node_visible(&node("z")));
    assert_eq!(state_hash(&forward), state_hash(&backward));
}

// ── S3: removing an endpoint hides the edge but keeps its element ───────

#[test]
fn endpoint_removal_hides_edge_without_deleting_it() {
    let p1 = patch(
        "W",
        1,
        vec![
            node_add("a", "W:1"),
            node_add("b", "W:2"),
            edge_add("a", "b", "l", "W:3"),
        ],
    );
    let p2 = patch("X", 2, vec![node_remove(&["W:1"])]);

    let state = reduce_all(&[&p1, &p2]);
    assert!(!state.node_visible(&node("a")));
    assert!(state.node_visible(&node("b")));
    assert!(!state.edge_visible(&edge("a", "b", "l")));
    // The edge's own dot is live; only the projection hides it.
    assert!(state.edge_alive().contains(&edge("a", "b", "l")));
}

// ── Idempotence: the same patch twice is the same patch once ────────────

#[test]
fn applying_a_patch_twice_changes_nothing() {
    let p = patch(
        "A",
        1,
        vec![node_add("x", "A:1"), node_add("y", "A:2")],
    );
    let once = reduce_all(&[&p]);
    let twice = reduce_all(&[&p, &p]);
    assert_eq!(state_hash(&once), state_hash(&twice));
}

// ── A remove citing a dot the writer actually observed works ────────────

#[test]
fn observed_remove_strikes_cited_dots() {
    let add = patch("A", 1, vec![node_add("x", "A:1")]);
    let rm = patch("B", 2, vec![node_remove(&["A:1"])]);
    let state = reduce_all(&[&add, &rm]);
    assert!(!state.node_visible(&node("x")));

    // Re-adding under a fresh dot resurrects the node.
    let readd = patch("A", 3, vec![node_add("x", "A:2")]);
    let state = reduce_all(&[&add, &rm, &readd]);
    assert!(state.node_visible(&node("x")));
}

// ── join() on forked states matches reducing the union ──────────────────

#[test]
fn forked_state_join_is_symmetric() {
    let base = patch("A", 1, vec![node_add("root", "A:1")]);
    let x = patch("B", 2, vec![node_add("left", "B:1")]);
    let y = patch("C", 2, vec![Op::NodeRemove {
        observed: vec![dot("A:1")],
    }]);

    let s0 = reduce_all(&[&base]);

    let mut fork_x = s0.clone();
    fork_x = reduce(
        [(&patch_sha(&x), &x)],
        fork_x,
    )
    .unwrap_or_else(|err| panic!("reduce failed: {err}"));

    let mut fork_y = s0.clone();
    fork_y = reduce(
        [(&patch_sha(&y), &y)],
        fork_y,
    )
    .unwrap_or_else(|err| panic!("reduce failed: {err}"));

    let mut xy = fork_x.clone();
    xy.join(&fork_y);
    let mut yx = fork_y;
    yx.join(&fork_x);

    assert_eq!(state_hash(&xy), state_hash(&yx));
    assert_eq!(state_hash(&xy), state_hash(&reduce_all(&[&base, &x, &y])));
    assert!(!xy.node_visible(&node("root")));
    assert!(xy.node_visible(&node("left")));
}
