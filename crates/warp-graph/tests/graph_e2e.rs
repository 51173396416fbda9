// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! End-to-end facade tests: commit, materialize, checkpoint, cursor,
//! temporal queries, GC, doctor.
#![allow(clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;

use warp_core::{state_hash, EdgeKey, EdgeLabel, NodeId, PropKey, Scalar, WriterId};
use warp_graph::{
    CachedStateInfo, Doctor, HandleState, Health, MaterializeOpts, WarpGraph, WarpGraphConfig,
};
use warp_store::{MemoryStore, ObjectStore};

fn node(id: &str) -> NodeId {
    NodeId::new(id).unwrap()
}

fn label(id: &str) -> EdgeLabel {
    EdgeLabel::new(id).unwrap()
}

fn key(id: &str) -> PropKey {
    PropKey::new(id).unwrap()
}

async fn open(store: &Arc<MemoryStore>, writer: &str) -> WarpGraph {
    let store: Arc<dyn ObjectStore> = store.clone();
    WarpGraph::open(WarpGraphConfig::new(
        store,
        "demo",
        WriterId::new(writer).unwrap(),
    ))
    .await
    .unwrap()
}

// ── commit + materialize across two handles ─────────────────────────────

#[tokio::test]
async fn two_writers_converge_through_the_store() {
    let store = Arc::new(MemoryStore::new());
    let mut alice = open(&store, "alice").await;
    let mut bob = open(&store, "bob").await;

    let mut patch = alice.create_patch();
    patch
        .add_node(node("x"))
        .set_property(node("x"), key("color"), Scalar::Str("teal".to_owned()));
    alice.commit(patch).await.unwrap();
    assert_eq!(alice.lifecycle(), HandleState::Dirty);

    let mut patch = bob.create_patch();
    patch
        .add_node(node("y"))
        .add_edge(node("x"), node("y"), label("link"));
    bob.commit(patch).await.unwrap();

    let state_a = alice.materialize(MaterializeOpts::default()).await.unwrap();
    let hash_a = state_hash(state_a);
    assert!(state_a.node_visible(&node("x")));
    assert!(state_a.node_visible(&node("y")));
    assert!(state_a.edge_visible(&EdgeKey::new(node("x"), node("y"), label("link"))));

    let state_b = bob.materialize(MaterializeOpts::default()).await.unwrap();
    assert_eq!(state_hash(state_b), hash_a);
    assert_eq!(alice.lifecycle(), HandleState::Clean);
}

// ── remove cites observed dots; resurrection by fresh add ───────────────

#[tokio::test]
async fn remove_then_concurrent_readd() {
    let store = Arc::new(MemoryStore::new());
    let mut alice = open(&store, "alice").await;

    let mut patch = alice.create_patch();
    patch.add_node(node("z"));
    alice.commit(patch).await.unwrap();

    let mut patch = alice.create_patch();
    patch.remove_node(node("z"));
    alice.commit(patch).await.unwrap();
    let state = alice.materialize(MaterializeOpts::default()).await.unwrap();
    assert!(!state.node_visible(&node("z")));

    let mut patch = alice.create_patch();
    patch.add_node(node("z"));
    alice.commit(patch).await.unwrap();
    let state = alice.materialize(MaterializeOpts::default()).await.unwrap();
    assert!(state.node_visible(&node("z")));
}

// ── checkpoint shortcut is observably identical to full replay ──────────

#[tokio::test]
async fn checkpoint_shortcut_matches_full_replay() {
    let store = Arc::new(MemoryStore::new());
    let mut alice = open(&store, "alice").await;

    for index in 0..4 {
        let mut patch = alice.create_patch();
        patch.add_node(node(&format!("n{index}")));
        alice.commit(patch).await.unwrap();
    }
    alice.materialize(MaterializeOpts::default()).await.unwrap();
    let info = alice.create_checkpoint().await.unwrap();
    assert_eq!(info.meta.max_lamport, 4);

    // More patches after the checkpoint.
    let mut patch = alice.create_patch();
    patch
        .add_node(node("late"))
        .remove_node(node("n0"));
    alice.commit(patch).await.unwrap();

    // A fresh handle starts from the checkpoint and folds only the tail.
    let mut reader = open(&store, "reader").await;
    let state = reader.materialize(MaterializeOpts::default()).await.unwrap();
    assert!(state.node_visible(&node("late")));
    assert!(!state.node_visible(&node("n0")));
    assert!(state.node_visible(&node("n3")));

    let full = alice.materialize(MaterializeOpts::default()).await.unwrap();
    let fresh = reader.materialize(MaterializeOpts::default()).await.unwrap();
    assert_eq!(state_hash(full), state_hash(fresh));

    // Every writer tip is an ancestor of the checkpoint commit... for the
    // tips that existed when it was cut.
    let tip = store
        .read_ref("refs/warp/demo/writers/alice")
        .await
        .unwrap();
    assert!(tip.is_some());
}

// ── coverage: pre-checkpoint tips are ancestors of the anchor ───────────

#[tokio::test]
async fn checkpoint_covers_existing_tips() {
    let store = Arc::new(MemoryStore::new());
    let mut alice = open(&store, "alice").await;

    let mut patch = alice.create_patch();
    patch.add_node(node("a"));
    alice.commit(patch).await.unwrap();
    let covered_tip = store
        .read_ref("refs/warp/demo/writers/alice")
        .await
        .unwrap()
        .unwrap();

    alice.create_checkpoint().await.unwrap();
    assert!(alice.is_tip_covered(&covered_tip).await.unwrap());

    let mut patch = alice.create_patch();
    patch.add_node(node("b"));
    alice.commit(patch).await.unwrap();
    let new_tip = store
        .read_ref("refs/warp/demo/writers/alice")
        .await
        .unwrap()
        .unwrap();
    assert!(!alice.is_tip_covered(&new_tip).await.unwrap());
}

// ── monotone coverage: each checkpoint dominates its predecessor ────────

#[tokio::test]
async fn successive_checkpoints_are_monotone() {
    let store = Arc::new(MemoryStore::new());
    let mut alice = open(&store, "alice").await;

    let mut patch = alice.create_patch();
    patch.add_node(node("one"));
    alice.commit(patch).await.unwrap();
    let first = alice.create_checkpoint().await.unwrap();

    let mut patch = alice.create_patch();
    patch.add_node(node("two"));
    alice.commit(patch).await.unwrap();
    let second = alice.create_checkpoint().await.unwrap();

    // The new checkpoint descends from the previous one, and its folded
    // lamport strictly advances.
    assert!(store
        .is_ancestor(&first.commit, &second.commit)
        .await
        .unwrap());
    assert!(second.meta.max_lamport > first.meta.max_lamport);

    // A checkpoint is trivially an ancestor of itself.
    assert!(store
        .is_ancestor(&second.commit, &second.commit)
        .await
        .unwrap());
}

// ── a writer with no patches never appears in the frontier ──────────────

#[tokio::test]
async fn silent_writers_have_no_frontier_entry() {
    let store = Arc::new(MemoryStore::new());
    let alice = open(&store, "alice").await;
    assert!(alice.frontier().await.unwrap().is_empty());

    let mut bob = open(&store, "bob").await;
    let mut patch = bob.create_patch();
    patch.add_node(node("n"));
    bob.commit(patch).await.unwrap();

    let frontier = alice.frontier().await.unwrap();
    assert_eq!(frontier.len(), 1);
    assert!(frontier.get(&WriterId::new("alice").unwrap()).is_none());
    assert!(frontier.get(&WriterId::new("bob").unwrap()).is_some());
}

// ── status and GC ───────────────────────────────────────────────────────

#[tokio::test]
async fn status_and_gc() {
    let store = Arc::new(MemoryStore::new());
    let mut alice = open(&store, "alice").await;

    assert!(matches!(
        alice.run_gc(),
        Err(err) if err.code() == "E_NO_STATE"
    ));

    let mut patch = alice.create_patch();
    patch.add_node(node("gone"));
    alice.commit(patch).await.unwrap();
    let mut patch = alice.create_patch();
    patch.remove_node(node("gone"));
    alice.commit(patch).await.unwrap();

    let status = alice.status().await.unwrap();
    assert_eq!(status.cached_state, CachedStateInfo::Stale);
    assert_eq!(status.writer_count, 1);
    assert_eq!(status.patches_since_checkpoint, 2);

    alice.materialize(MaterializeOpts::default()).await.unwrap();
    let status = alice.status().await.unwrap();
    assert_eq!(status.cached_state, CachedStateInfo::Fresh);
    assert!(status.tombstone_ratio > 0.0);

    let removed = alice.run_gc().unwrap();
    assert_eq!(removed, 1);
    let status = alice.status().await.unwrap();
    assert!((status.tombstone_ratio - 0.0).abs() < f64::EPSILON);
}

// ── ticks, cursor, temporal ─────────────────────────────────────────────

#[tokio::test]
async fn cursor_pins_materialization_to_a_tick() {
    let store = Arc::new(MemoryStore::new());
    let mut alice = open(&store, "alice").await;

    let mut patch = alice.create_patch();
    patch.add_node(node("first"));
    alice.commit(patch).await.unwrap();
    let mut patch = alice.create_patch();
    patch.add_node(node("second"));
    alice.commit(patch).await.unwrap();

    let ticks = alice.discover_ticks().await.unwrap();
    assert_eq!(ticks.ticks, vec![1, 2]);
    let alice_shas = &ticks.tick_shas[&WriterId::new("alice").unwrap()];
    assert_eq!(alice_shas.len(), 2);

    let cursor = alice.seek(1).await.unwrap();
    assert_eq!(cursor.nodes, 1);
    let state = alice.materialize(MaterializeOpts::default()).await.unwrap();
    assert!(state.node_visible(&node("first")));
    assert!(!state.node_visible(&node("second")));

    // Committing under a cursor stays legal; the patch lands above every
    // observed tick and stays invisible until the cursor clears.
    let mut patch = alice.create_patch();
    patch.add_node(node("third"));
    alice.commit(patch).await.unwrap();
    let state = alice.materialize(MaterializeOpts::default()).await.unwrap();
    assert!(!state.node_visible(&node("third")));

    alice.save_cursor("pin").await.unwrap();
    alice.seek_latest().await.unwrap();
    let state = alice.materialize(MaterializeOpts::default()).await.unwrap();
    assert!(state.node_visible(&node("second")));
    assert!(state.node_visible(&node("third")));

    let saved = alice.list_cursors().await.unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].name, "pin");
    let restored = alice.load_cursor("pin").await.unwrap();
    assert_eq!(restored.tick, 1);
    let state = alice.materialize(MaterializeOpts::default()).await.unwrap();
    assert!(!state.node_visible(&node("second")));

    alice.seek_latest().await.unwrap();
    alice.drop_cursor("pin").await.unwrap();
    assert!(alice.list_cursors().await.unwrap().is_empty());
}

#[tokio::test]
async fn temporal_always_and_eventually() {
    let store = Arc::new(MemoryStore::new());
    let mut alice = open(&store, "alice").await;

    let mut patch = alice.create_patch();
    patch
        .add_node(node("job"))
        .set_property(node("job"), key("state"), Scalar::Str("pending".to_owned()));
    alice.commit(patch).await.unwrap();

    let mut patch = alice.create_patch();
    patch.set_property(node("job"), key("state"), Scalar::Str("done".to_owned()));
    alice.commit(patch).await.unwrap();

    // The job existed at every tick that touched it.
    assert!(alice
        .always(&node("job"), |snapshot| snapshot.exists, None)
        .await
        .unwrap());

    // Eventually it reached "done"...
    assert!(alice
        .eventually(
            &node("job"),
            |snapshot| {
                snapshot.props.get(&key("state")).is_some_and(|value| {
                    *value == warp_core::PropValue::inline(Scalar::Str("done".to_owned()))
                })
            },
            None
        )
        .await
        .unwrap());

    // ...but it was not always "done".
    assert!(!alice
        .always(
            &node("job"),
            |snapshot| {
                snapshot.props.get(&key("state")).is_some_and(|value| {
                    *value == warp_core::PropValue::inline(Scalar::Str("done".to_owned()))
                })
            },
            None
        )
        .await
        .unwrap());

    // Restricting the window to the final tick flips `always`.
    assert!(alice
        .always(
            &node("job"),
            |snapshot| {
                snapshot.props.get(&key("state")).is_some_and(|value| {
                    *value == warp_core::PropValue::inline(Scalar::Str("done".to_owned()))
                })
            },
            Some(2)
        )
        .await
        .unwrap());

    // No tick touches a ghost node: `always` is false.
    assert!(!alice
        .always(&node("ghost"), |_| true, None)
        .await
        .unwrap());
}

// ── attach_content stores bytes out of band ─────────────────────────────

#[tokio::test]
async fn attached_content_becomes_a_blob_prop() {
    let store = Arc::new(MemoryStore::new());
    let mut alice = open(&store, "alice").await;

    let mut patch = alice.create_patch();
    patch
        .add_node(node("doc"))
        .attach_content(node("doc"), b"big payload".to_vec());
    alice.commit(patch).await.unwrap();

    let state = alice.materialize(MaterializeOpts::default()).await.unwrap();
    let value = state.prop(&node("doc"), &key("content")).unwrap();
    let warp_core::PropValue::Blob { oid } = value else {
        panic!("expected a blob property, got {value:?}");
    };
    let bytes = store.read_blob(oid).await.unwrap();
    assert_eq!(bytes, b"big payload");
}

// ── doctor ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn doctor_reports_and_orders_findings() {
    let store = Arc::new(MemoryStore::new());
    let mut alice = open(&store, "alice").await;
    let mut patch = alice.create_patch();
    patch.add_node(node("x"));
    alice.commit(patch).await.unwrap();

    let report = Doctor::new().run(&mut alice).await;
    // No checkpoint and no trust record: degraded, not failed.
    assert_eq!(report.health, Health::Degraded);
    assert_eq!(report.exit_code(false), 3);
    assert_eq!(report.exit_code(true), 4);
    assert!(report
        .findings
        .iter()
        .any(|finding| finding.code == "CHECKPOINT_MISSING"));
    assert!(report
        .findings
        .iter()
        .any(|finding| finding.code == "TRUST_REF_MISSING"));

    // Sorted: every warn precedes every ok.
    let first_ok = report
        .findings
        .iter()
        .position(|f| f.status == warp_graph::CheckStatus::Ok)
        .unwrap();
    assert!(report.findings[..first_ok]
        .iter()
        .all(|f| f.status != warp_graph::CheckStatus::Ok));

    // After checkpointing, coverage goes green and health improves once a
    // trust record exists too.
    alice.materialize(MaterializeOpts::default()).await.unwrap();
    alice.create_checkpoint().await.unwrap();
    let report = Doctor::new().run(&mut alice).await;
    assert!(report
        .findings
        .iter()
        .any(|finding| finding.code == "CHECKPOINT_COVERS_TIPS"));
}

#[tokio::test]
async fn doctor_deadline_skips_remaining_checks() {
    let store = Arc::new(MemoryStore::new());
    let mut alice = open(&store, "alice").await;

    // Deadline in the past: every check is skipped.
    let report = Doctor::new().with_deadline_ms(-1).run(&mut alice).await;
    assert!(report
        .findings
        .iter()
        .all(|finding| finding.code == "CHECK_SKIPPED_BUDGET_EXHAUSTED"));
    assert_eq!(report.health, Health::Degraded);
}
