// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Temporal queries: `always` and `eventually` over a node's history.
//!
//! The walk advances one state *incrementally* through the ordered
//! `(lamport, sha)` patch sequence — the reducer's monotonicity makes a
//! snapshot at tick `t` equal to "snapshot at `t-1` plus the patches of
//! `t`", so no tick is ever materialized from scratch. The predicate is
//! evaluated only at ticks whose patches touch the queried node.

use std::collections::BTreeMap;

use warp_core::{apply_patch, NodeId, Op, Patch, PropKey, PropValue, WarpState};

use crate::error::WarpError;
use crate::handle::WarpGraph;

/// What the predicate sees at one tick.
#[derive(Clone, PartialEq, Debug)]
pub struct NodeSnapshot {
    /// The queried node.
    pub id: NodeId,
    /// Whether the node is visible at this tick.
    pub exists: bool,
    /// The node's visible properties at this tick.
    pub props: BTreeMap<PropKey, PropValue>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TemporalMode {
    Always,
    Eventually,
}

fn patch_touches(patch: &Patch, node: &NodeId) -> bool {
    patch.ops.iter().any(|op| match op {
        Op::NodeAdd { node: n, .. } | Op::PropSet { node: n, .. } => n == node,
        Op::EdgeAdd { from, to, .. } => from == node || to == node,
        // A citation may strike this node's dots; deciding exactly would
        // need the pre-tick state, so removes are counted conservatively.
        Op::NodeRemove { observed } | Op::EdgeRemove { observed } => !observed.is_empty(),
    })
}

fn snapshot(state: &WarpState, node: &NodeId) -> NodeSnapshot {
    NodeSnapshot {
        id: node.clone(),
        exists: state.node_visible(node),
        props: state
            .props_of(node)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    }
}

impl WarpGraph {
    /// `true` iff `predicate` holds at *every* tick ≥ `since` that touches
    /// `node`. `false` when no such tick exists.
    ///
    /// # Errors
    /// Store and decode failures.
    pub async fn always<F>(
        &self,
        node: &NodeId,
        predicate: F,
        since: Option<u64>,
    ) -> Result<bool, WarpError>
    where
        F: Fn(&NodeSnapshot) -> bool,
    {
        self.temporal_walk(node, predicate, since, TemporalMode::Always)
            .await
    }

    /// `true` iff `predicate` holds at *some* tick ≥ `since` that touches
    /// `node` (short-circuits on the first success).
    ///
    /// # Errors
    /// Store and decode failures.
    pub async fn eventually<F>(
        &self,
        node: &NodeId,
        predicate: F,
        since: Option<u64>,
    ) -> Result<bool, WarpError>
    where
        F: Fn(&NodeSnapshot) -> bool,
    {
        self.temporal_walk(node, predicate, since, TemporalMode::Eventually)
            .await
    }

    async fn temporal_walk<F>(
        &self,
        node: &NodeId,
        predicate: F,
        since: Option<u64>,
        mode: TemporalMode,
    ) -> Result<bool, WarpError>
    where
        F: Fn(&NodeSnapshot) -> bool,
    {
        self.ensure_open()?;
        let since = since.unwrap_or(0);
        let entries = self.all_entries().await?;

        let mut state = WarpState::new();
        let mut any_tick = false;
        let mut index = 0;

        while index < entries.len() {
            let tick = entries[index].1.patch.lamport;
            let mut touches = false;

            // Fold the whole tick before evaluating: a tick is atomic from
            // the query's point of view.
            while index < entries.len() && entries[index].1.patch.lamport == tick {
                let entry = &entries[index].1;
                entry.patch.validate()?;
                apply_patch(&mut state, &entry.sha, &entry.patch);
                touches |= patch_touches(&entry.patch, node);
                index += 1;
            }

            if tick < since || !touches {
                continue;
            }
            any_tick = true;
            let holds = predicate(&snapshot(&state, node));
            match mode {
                TemporalMode::Always if !holds => return Ok(false),
                TemporalMode::Eventually if holds => return Ok(true),
                TemporalMode::Always | TemporalMode::Eventually => {}
            }
        }

        Ok(match mode {
            TemporalMode::Always => any_tick,
            TemporalMode::Eventually => false,
        })
    }
}
