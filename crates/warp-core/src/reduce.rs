// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The join reducer.
//!
//! `reduce` folds a batch of patches into a [`WarpState`]. Every op maps to
//! a semilattice operation (OR-set add/remove, LWW register join, frontier
//! max), so the fold commutes: any permutation of the same patch multiset
//! produces a state with the same canonical hash. Op order *within* a patch
//! matters only through the `op_index` component of the LWW event id, which
//! is itself part of the total order — never through application order.

use std::collections::BTreeSet;

use tracing::debug;
use warp_store::Oid;

use crate::event::{EventId, LwwRegister};
use crate::patch::{Op, Patch, PatchError};
use crate::state::{EdgeKey, PropRef, WarpState};

/// Reducer failures. All of them abort the whole batch.
#[derive(Debug, thiserror::Error)]
pub enum ReduceError {
    /// A patch failed schema-2 validation.
    #[error("patch {sha}: {source}")]
    InvalidPatch {
        /// Digest of the offending patch.
        sha: Oid,
        /// The underlying validation failure.
        source: PatchError,
    },
}

/// Applies one validated patch to `state`.
///
/// `sha` is the patch blob digest; it seeds LWW event ids, so it must be
/// the digest of the exact canonical bytes this patch decoded from.
pub fn apply_patch(state: &mut WarpState, sha: &Oid, patch: &Patch) {
    for (op_index, op) in patch.ops.iter().enumerate() {
        match op {
            Op::NodeAdd { node, dot } => {
                state.observed_frontier.observe(dot);
                state.node_alive.add(node.clone(), dot.clone());
            }
            Op::NodeRemove { observed } => {
                let observed: BTreeSet<_> = observed.iter().cloned().collect();
                state.node_alive.remove_dots(&observed);
            }
            Op::EdgeAdd {
                from,
                to,
                label,
                dot,
            } => {
                state.observed_frontier.observe(dot);
                state.edge_alive.add(
                    EdgeKey::new(from.clone(), to.clone(), label.clone()),
                    dot.clone(),
                );
            }
            Op::EdgeRemove { observed } => {
                let observed: BTreeSet<_> = observed.iter().cloned().collect();
                state.edge_alive.remove_dots(&observed);
            }
            Op::PropSet { node, key, value } => {
                // Op lists are bounded far below u32::MAX by blob size.
                let op_index = u32::try_from(op_index).unwrap_or(u32::MAX);
                let event = EventId {
                    lamport: patch.lamport,
                    writer: patch.writer.clone(),
                    patch_sha: sha.clone(),
                    op_index,
                };
                let incoming = LwwRegister::new(value.clone(), event);
                let prop = PropRef::new(node.clone(), key.clone());
                match state.props.get_mut(&prop) {
                    Some(register) => register.join(incoming),
                    None => {
                        state.props.insert(prop, incoming);
                    }
                }
            }
        }
    }
    state.observed_frontier.merge(&patch.context);
}

/// Folds `patches` into `initial`, validating each patch first.
///
/// # Errors
/// [`ReduceError::InvalidPatch`] if any patch fails schema-2 validation;
/// the batch is rejected wholesale and `initial` is returned untouched in
/// the error path (the caller keeps its original state).
pub fn reduce<'a, I>(patches: I, initial: WarpState) -> Result<WarpState, ReduceError>
where
    I: IntoIterator<Item = (&'a Oid, &'a Patch)>,
{
    let mut state = initial;
    let mut count = 0usize;
    for (sha, patch) in patches {
        patch.validate().map_err(|source| ReduceError::InvalidPatch {
            sha: sha.clone(),
            source,
        })?;
        apply_patch(&mut state, sha, patch);
        count += 1;
    }
    debug!(patches = count, "reduced patch batch");
    Ok(state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dot::{Dot, WriterId};
    use crate::patch::PATCH_SCHEMA_VERSION;
    use crate::state::{NodeId, PropKey};
    use crate::value::{PropValue, Scalar};
    use crate::VersionVector;

    fn patch(writer: &str, lamport: u64, ops: Vec<Op>) -> Patch {
        Patch {
            base_checkpoint: None,
            context: VersionVector::new(),
            lamport,
            ops,
            schema: PATCH_SCHEMA_VERSION,
            writer: WriterId::new(writer).unwrap(),
        }
    }

    fn oid(hex: &str) -> Oid {
        Oid::new(hex).unwrap()
    }

    #[test]
    fn frontier_tracks_dots_and_context() {
        let mut p = patch(
            "a",
            1,
            vec![Op::NodeAdd {
                node: NodeId::new("x").unwrap(),
                dot: Dot::parse("a:4").unwrap(),
            }],
        );
        p.context = [(WriterId::new("b").unwrap(), 7)].into_iter().collect();

        let state = reduce([(&oid("aa"), &p)], WarpState::new()).unwrap();
        assert_eq!(state.frontier().get(&WriterId::new("a").unwrap()), 4);
        assert_eq!(state.frontier().get(&WriterId::new("b").unwrap()), 7);
    }

    #[test]
    fn lww_resolves_by_event_id_not_arrival() {
        let node = NodeId::new("n").unwrap();
        let key = PropKey::new("k").unwrap();
        let early = patch(
            "a",
            1,
            vec![Op::PropSet {
                node: node.clone(),
                key: key.clone(),
                value: PropValue::inline(Scalar::Str("early".to_owned())),
            }],
        );
        let late = patch(
            "b",
            2,
            vec![
                Op::NodeAdd {
                    node: node.clone(),
                    dot: Dot::parse("b:1").unwrap(),
                },
                Op::PropSet {
                    node: node.clone(),
                    key: key.clone(),
                    value: PropValue::inline(Scalar::Str("late".to_owned())),
                },
            ],
        );

        let forward = reduce(
            [(&oid("aa"), &early), (&oid("bb"), &late)],
            WarpState::new(),
        )
        .unwrap();
        let backward = reduce(
            [(&oid("bb"), &late), (&oid("aa"), &early)],
            WarpState::new(),
        )
        .unwrap();

        for state in [&forward, &backward] {
            assert_eq!(
                state.prop(&node, &key),
                Some(&PropValue::inline(Scalar::Str("late".to_owned())))
            );
        }
    }

    #[test]
    fn invalid_patch_rejects_the_batch() {
        let mut bad = patch("a", 1, vec![]);
        bad.schema = 1;
        let err = reduce([(&oid("aa"), &bad)], WarpState::new()).unwrap_err();
        assert!(err.to_string().contains("E_SCHEMA_MISMATCH"));
    }
}
