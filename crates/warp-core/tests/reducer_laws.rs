// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Property tests for the reducer's lattice laws.
//!
//! Patches are generated over a tiny alphabet of writers, nodes, and labels
//! so that adds, removes, and property writes actually collide. Dots are
//! kept per-writer monotonic by construction, matching what the patch
//! builder enforces in production.
#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use std::collections::BTreeMap;

use common::patch_sha;
use proptest::prelude::*;
use warp_core::{
    reduce, state_hash, Dot, EdgeLabel, NodeId, Op, Patch, PropKey, PropValue, Scalar,
    VersionVector, WarpState, WriterId, PATCH_SCHEMA_VERSION,
};
use warp_store::Oid;

const WRITERS: [&str; 3] = ["alpha", "beta", "gamma"];
const NODES: [&str; 4] = ["n0", "n1", "n2", "n3"];
const LABELS: [&str; 2] = ["link", "ref"];

#[derive(Debug, Clone)]
enum OpShape {
    NodeAdd(usize),
    NodeRemove(Vec<(usize, u64)>),
    EdgeAdd(usize, usize, usize),
    EdgeRemove(Vec<(usize, u64)>),
    PropSet(usize, i64),
}

fn arb_op() -> impl Strategy<Value = OpShape> {
    prop_oneof![
        (0..NODES.len()).prop_map(OpShape::NodeAdd),
        proptest::collection::vec(((0..WRITERS.len()), 1u64..6), 0..3)
            .prop_map(OpShape::NodeRemove),
        ((0..NODES.len()), (0..NODES.len()), (0..LABELS.len()))
            .prop_map(|(f, t, l)| OpShape::EdgeAdd(f, t, l)),
        proptest::collection::vec(((0..WRITERS.len()), 1u64..6), 0..3)
            .prop_map(OpShape::EdgeRemove),
        ((0..NODES.len()), any::<i64>()).prop_map(|(n, v)| OpShape::PropSet(n, v)),
    ]
}

/// Builds concrete patches from op shapes, minting per-writer monotonic
/// dots and lamports exactly like the production patch builder.
fn build_patches(shapes: Vec<(usize, Vec<OpShape>)>) -> Vec<(Oid, Patch)> {
    let mut counters: BTreeMap<&str, u64> = BTreeMap::new();
    let mut lamport = 0u64;
    let mut out = Vec::new();
    for (writer_index, ops) in shapes {
        let writer_name = WRITERS[writer_index % WRITERS.len()];
        let writer = WriterId::new(writer_name).unwrap();
        lamport += 1;
        let mut concrete = Vec::new();
        for shape in ops {
            match shape {
                OpShape::NodeAdd(n) => {
                    let counter = counters.entry(writer_name).or_insert(0);
                    *counter += 1;
                    concrete.push(Op::NodeAdd {
                        node: NodeId::new(NODES[n]).unwrap(),
                        dot: Dot::new(writer.clone(), *counter).unwrap(),
                    });
                }
                OpShape::EdgeAdd(f, t, l) => {
                    let counter = counters.entry(writer_name).or_insert(0);
                    *counter += 1;
                    concrete.push(Op::EdgeAdd {
                        from: NodeId::new(NODES[f]).unwrap(),
                        to: NodeId::new(NODES[t]).unwrap(),
                        label: EdgeLabel::new(LABELS[l]).unwrap(),
                        dot: Dot::new(writer.clone(), *counter).unwrap(),
                    });
                }
                OpShape::NodeRemove(cites) => {
                    concrete.push(Op::NodeRemove {
                        observed: cites
                            .into_iter()
                            .map(|(w, c)| {
                                Dot::new(WriterId::new(WRITERS[w]).unwrap(), c).unwrap()
                            })
                            .collect(),
                    });
                }
                OpShape::EdgeRemove(cites) => {
                    concrete.push(Op::EdgeRemove {
                        observed: cites
                            .into_iter()
                            .map(|(w, c)| {
                                Dot::new(WriterId::new(WRITERS[w]).unwrap(), c).unwrap()
                            })
                            .collect(),
                    });
                }
                OpShape::PropSet(n, v) => {
                    concrete.push(Op::PropSet {
                        node: NodeId::new(NODES[n]).unwrap(),
                        key: PropKey::new("k").unwrap(),
                        value: PropValue::inline(Scalar::Int(v)),
                    });
                }
            }
        }
        let patch = Patch {
            base_checkpoint: None,
            context: VersionVector::new(),
            lamport,
            ops: concrete,
            schema: PATCH_SCHEMA_VERSION,
            writer,
        };
        let sha = patch_sha(&patch);
        out.push((sha, patch));
    }
    out
}

fn arb_patches(max: usize) -> impl Strategy<Value = Vec<(Oid, Patch)>> {
    proptest::collection::vec(
        ((0..WRITERS.len()), proptest::collection::vec(arb_op(), 0..4)),
        0..max,
    )
    .prop_map(build_patches)
}

fn fold(patches: &[(Oid, Patch)], initial: WarpState) -> WarpState {
    reduce(patches.iter().map(|(sha, p)| (sha, p)), initial)
        .unwrap_or_else(|err| panic!("generated patches must validate: {err}"))
}

proptest! {
    // Invariant 1: permutation invariance of the state hash.
    #[test]
    fn permutation_invariance(
        patches in arb_patches(8),
        seed in any::<u64>(),
    ) {
        let reference = state_hash(&fold(&patches, WarpState::new()));

        // Deterministic Fisher-Yates driven by the seed.
        let mut shuffled = patches;
        let mut rng = seed;
        for i in (1..shuffled.len()).rev() {
            rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            #[allow(clippy::cast_possible_truncation)]
            let j = (rng % (i as u64 + 1)) as usize;
            shuffled.swap(i, j);
        }

        prop_assert_eq!(state_hash(&fold(&shuffled, WarpState::new())), reference);
    }

    // Invariant 2: diamond confluence — two disjoint batches applied to a
    // common base converge under join, in either order.
    #[test]
    fn diamond_confluence(
        base in arb_patches(4),
        x in arb_patches(4),
        y in arb_patches(4),
    ) {
        let s0 = fold(&base, WarpState::new());
        let sx = fold(&x, s0.clone());
        let sy = fold(&y, s0);

        let mut xy = sx.clone();
        xy.join(&sy);
        let mut yx = sy;
        yx.join(&sx);

        prop_assert_eq!(state_hash(&xy), state_hash(&yx));
    }

    // Invariant 6: idempotence over the multiset.
    #[test]
    fn double_application_is_idempotent(patches in arb_patches(6)) {
        let once = fold(&patches, WarpState::new());
        let twice = fold(&patches, once.clone());
        prop_assert_eq!(state_hash(&once), state_hash(&twice));
    }

    // Invariant 4 (frontier form): every live dot is covered by the frontier.
    #[test]
    fn frontier_covers_every_live_dot(patches in arb_patches(8)) {
        let state = fold(&patches, WarpState::new());
        for node in state.visible_nodes() {
            for dot in state.node_alive().live_dots(node) {
                prop_assert!(state.frontier().covers(&dot));
            }
        }
    }
}
