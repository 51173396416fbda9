// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Materialized graph state.
//!
//! [`WarpState`] is the value the reducer folds patches into: an OR-set of
//! nodes, an OR-set of `(from, to, label)` edges, a map of LWW property
//! registers, and the observed frontier. All four components are
//! join-semilattices, so `join` on whole states is, too.
//!
//! Visibility is a *projection*, not a mutation: an edge whose endpoint was
//! removed stays in `edge_alive` (its dots are live) but is projected as
//! invisible, and springs back if the endpoint is concurrently re-added.

use std::fmt;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clock::VersionVector;
use crate::dot::IdError;
use crate::event::LwwRegister;
use crate::orset::OrSet;
use crate::value::PropValue;

/// Delimiter for canonical tuple encodings. NUL is rejected by every
/// identifier validator, so joined encodings are unambiguous.
pub(crate) const TUPLE_DELIMITER: char = '\0';

fn validate_ident(id: &str) -> Result<(), IdError> {
    if id.is_empty() || id.contains(TUPLE_DELIMITER) {
        return Err(IdError::InvalidIdent(id.to_owned()));
    }
    Ok(())
}

macro_rules! opaque_ident {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Validates and wraps the identifier.
            ///
            /// # Errors
            /// [`IdError::InvalidIdent`] if empty or containing NUL.
            pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
                let id = id.into();
                validate_ident(&id)?;
                Ok(Self(id))
            }

            /// View as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_ident!(
    /// Opaque node identifier.
    NodeId
);
opaque_ident!(
    /// Opaque edge label.
    EdgeLabel
);
opaque_ident!(
    /// Opaque property key.
    PropKey
);

/// Canonical edge identity: `(from, to, label)`.
///
/// The derived tuple `Ord` matches the byte-lexicographic order of the
/// NUL-joined canonical encoding (NUL sorts below every identifier byte),
/// so `BTreeMap<EdgeKey, _>` iterates in canonical order.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct EdgeKey {
    /// Source node.
    pub from: NodeId,
    /// Target node.
    pub to: NodeId,
    /// Edge label.
    pub label: EdgeLabel,
}

impl EdgeKey {
    /// Builds an edge key.
    pub fn new(from: NodeId, to: NodeId, label: EdgeLabel) -> Self {
        Self { from, to, label }
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -[{}]-> {}", self.from, self.label, self.to)
    }
}

/// Property register address: `(node, key)`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct PropRef {
    /// Node the property hangs off.
    pub node: NodeId,
    /// Property key.
    pub key: PropKey,
}

impl PropRef {
    /// Builds a property address.
    pub fn new(node: NodeId, key: PropKey) -> Self {
        Self { node, key }
    }
}

/// The materialized schema-2 state (`WarpStateV5` on the wire).
#[derive(Clone, Default, PartialEq, Debug)]
pub struct WarpState {
    pub(crate) node_alive: OrSet<NodeId>,
    pub(crate) edge_alive: OrSet<EdgeKey>,
    pub(crate) props: BTreeMap<PropRef, LwwRegister<PropValue>>,
    pub(crate) observed_frontier: VersionVector,
}

impl WarpState {
    /// Creates the empty state: no elements, no props, empty frontier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lattice join with `other`: elementwise OR-set joins, per-register
    /// LWW joins, pointwise-max frontier merge.
    pub fn join(&mut self, other: &Self) {
        self.node_alive.join(&other.node_alive);
        self.edge_alive.join(&other.edge_alive);
        for (prop, register) in &other.props {
            match self.props.get_mut(prop) {
                Some(mine) => mine.join(register.clone()),
                None => {
                    self.props.insert(prop.clone(), register.clone());
                }
            }
        }
        self.observed_frontier.merge(&other.observed_frontier);
    }

    /// `true` while the node has a live dot.
    pub fn node_visible(&self, node: &NodeId) -> bool {
        self.node_alive.contains(node)
    }

    /// `true` while the edge has a live dot *and* both endpoints are
    /// visible. The edge element itself may outlive its endpoints; the
    /// projection hides it.
    pub fn edge_visible(&self, edge: &EdgeKey) -> bool {
        self.edge_alive.contains(edge)
            && self.node_visible(&edge.from)
            && self.node_visible(&edge.to)
    }

    /// Resolves a property, projected through node visibility.
    pub fn prop(&self, node: &NodeId, key: &PropKey) -> Option<&PropValue> {
        if !self.node_visible(node) {
            return None;
        }
        self.props
            .get(&PropRef::new(node.clone(), key.clone()))
            .map(|register| &register.value)
    }

    /// Iterates the visible properties of `node` in key order.
    pub fn props_of<'a>(
        &'a self,
        node: &'a NodeId,
    ) -> impl Iterator<Item = (&'a PropKey, &'a PropValue)> + 'a {
        let visible = self.node_visible(node);
        self.props
            .iter()
            .filter(move |(prop, _)| visible && &prop.node == node)
            .map(|(prop, register)| (&prop.key, &register.value))
    }

    /// Iterates visible nodes in id order.
    pub fn visible_nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.node_alive.iter_visible()
    }

    /// Iterates visible edges in canonical order.
    pub fn visible_edges(&self) -> impl Iterator<Item = &EdgeKey> + '_ {
        self.edge_alive
            .iter_visible()
            .filter(|edge| self.node_visible(&edge.from) && self.node_visible(&edge.to))
    }

    /// Visible outbound edges of `node`.
    pub fn edges_from<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a EdgeKey> + 'a {
        self.visible_edges().filter(move |edge| &edge.from == node)
    }

    /// Visible nodes reachable from `start` along visible edges, in BFS
    /// order. `start` itself leads the result when visible; an invisible
    /// start reaches nothing.
    pub fn reachable_from(&self, start: &NodeId) -> Vec<NodeId> {
        use std::collections::{BTreeSet, VecDeque};

        let mut out = Vec::new();
        if !self.node_visible(start) {
            return out;
        }
        let mut seen: BTreeSet<NodeId> = BTreeSet::new();
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        seen.insert(start.clone());
        queue.push_back(start.clone());
        while let Some(current) = queue.pop_front() {
            out.push(current.clone());
            for edge in self.edges_from(&current) {
                if seen.insert(edge.to.clone()) {
                    queue.push_back(edge.to.clone());
                }
            }
        }
        out
    }

    /// The observed frontier: pointwise max over every dot and every patch
    /// context folded in so far.
    pub fn frontier(&self) -> &VersionVector {
        &self.observed_frontier
    }

    /// Direct access to the node OR-set.
    pub fn node_alive(&self) -> &OrSet<NodeId> {
        &self.node_alive
    }

    /// Direct access to the edge OR-set.
    pub fn edge_alive(&self) -> &OrSet<EdgeKey> {
        &self.edge_alive
    }

    /// Tombstoned dots as a share of all recorded dots. 0 for empty states.
    #[allow(clippy::cast_precision_loss)]
    pub fn tombstone_ratio(&self) -> f64 {
        let dots = self.node_alive.dot_count() + self.edge_alive.dot_count();
        let tombstones = self.node_alive.tombstone_count() + self.edge_alive.tombstone_count();
        if dots == 0 {
            0.0
        } else {
            tombstones as f64 / dots as f64
        }
    }

    /// Compacts both OR-sets against `vv`, returning dropped-dot count.
    pub fn compact(&mut self, vv: &VersionVector) -> usize {
        self.node_alive.compact(vv) + self.edge_alive.compact(vv)
    }
}
