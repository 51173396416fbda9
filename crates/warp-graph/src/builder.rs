// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The patch builder.
//!
//! Callers stack up *intents* (add this node, remove that edge, attach
//! these bytes); the handle resolves them into concrete schema-2 ops at
//! commit time — minting fresh dots, citing the dots currently visible for
//! removes, and writing attached content as blobs. Resolution is re-run on
//! every CAS retry so a rebased commit cites up-to-date observations.

use warp_core::{Dot, EdgeKey, EdgeLabel, NodeId, Op, PropKey, PropValue, Scalar, WarpState, WriterId};
use warp_store::ObjectStore;

use crate::error::WarpError;

/// Default property key used by [`PatchBuilder::attach_content`].
const CONTENT_KEY: &str = "content";

#[derive(Clone, Debug)]
enum Intent {
    AddNode(NodeId),
    RemoveNode(NodeId),
    AddEdge(NodeId, NodeId, EdgeLabel),
    RemoveEdge(NodeId, NodeId, EdgeLabel),
    SetProp(NodeId, PropKey, PropValue),
    AttachContent(NodeId, PropKey, Vec<u8>),
}

/// Accumulates mutations for one patch.
#[derive(Clone, Default, Debug)]
pub struct PatchBuilder {
    intents: Vec<Intent>,
}

impl PatchBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when nothing has been queued.
    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    /// Number of queued mutations.
    pub fn len(&self) -> usize {
        self.intents.len()
    }

    /// Queues a node assertion.
    pub fn add_node(&mut self, node: NodeId) -> &mut Self {
        self.intents.push(Intent::AddNode(node));
        self
    }

    /// Queues a node removal citing whatever dots are visible at commit
    /// time.
    pub fn remove_node(&mut self, node: NodeId) -> &mut Self {
        self.intents.push(Intent::RemoveNode(node));
        self
    }

    /// Queues an edge assertion.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, label: EdgeLabel) -> &mut Self {
        self.intents.push(Intent::AddEdge(from, to, label));
        self
    }

    /// Queues an edge removal citing whatever dots are visible at commit
    /// time.
    pub fn remove_edge(&mut self, from: NodeId, to: NodeId, label: EdgeLabel) -> &mut Self {
        self.intents.push(Intent::RemoveEdge(from, to, label));
        self
    }

    /// Queues a property write.
    pub fn set_property(&mut self, node: NodeId, key: PropKey, value: Scalar) -> &mut Self {
        self.intents
            .push(Intent::SetProp(node, key, PropValue::inline(value)));
        self
    }

    /// Queues a property write with an explicit [`PropValue`].
    pub fn set_property_value(
        &mut self,
        node: NodeId,
        key: PropKey,
        value: PropValue,
    ) -> &mut Self {
        self.intents.push(Intent::SetProp(node, key, value));
        self
    }

    /// Queues content attachment under the default `content` key: the
    /// bytes become a blob, the patch carries only the digest.
    pub fn attach_content(&mut self, node: NodeId, bytes: Vec<u8>) -> &mut Self {
        // CONTENT_KEY is a valid identifier by construction.
        if let Ok(key) = PropKey::new(CONTENT_KEY) {
            self.intents.push(Intent::AttachContent(node, key, bytes));
        }
        self
    }

    /// Queues content attachment under an explicit key.
    pub fn attach_content_as(&mut self, node: NodeId, key: PropKey, bytes: Vec<u8>) -> &mut Self {
        self.intents.push(Intent::AttachContent(node, key, bytes));
        self
    }

    /// Resolves intents into concrete ops.
    ///
    /// `counter_base` is the writer's current dot high-water; minted dots
    /// continue strictly above it. `state` supplies the observations that
    /// removes cite; a remove with nothing visible resolves to an empty
    /// citation (a no-op op, kept for audit visibility).
    pub(crate) async fn resolve(
        &self,
        store: &dyn ObjectStore,
        writer: &WriterId,
        counter_base: u64,
        state: Option<&WarpState>,
    ) -> Result<Vec<Op>, WarpError> {
        let mut counter = counter_base;
        let mint = |counter: &mut u64| -> Result<Dot, WarpError> {
            *counter += 1;
            Dot::new(writer.clone(), *counter)
                .map_err(|err| WarpError::Internal(err.to_string()))
        };

        let mut ops = Vec::with_capacity(self.intents.len());
        for intent in &self.intents {
            match intent {
                Intent::AddNode(node) => {
                    ops.push(Op::NodeAdd {
                        node: node.clone(),
                        dot: mint(&mut counter)?,
                    });
                }
                Intent::RemoveNode(node) => {
                    let observed = state
                        .map(|state| state.node_alive().live_dots(node))
                        .unwrap_or_default();
                    ops.push(Op::NodeRemove { observed });
                }
                Intent::AddEdge(from, to, label) => {
                    ops.push(Op::EdgeAdd {
                        from: from.clone(),
                        to: to.clone(),
                        label: label.clone(),
                        dot: mint(&mut counter)?,
                    });
                }
                Intent::RemoveEdge(from, to, label) => {
                    let key = EdgeKey::new(from.clone(), to.clone(), label.clone());
                    let observed = state
                        .map(|state| state.edge_alive().live_dots(&key))
                        .unwrap_or_default();
                    ops.push(Op::EdgeRemove { observed });
                }
                Intent::SetProp(node, key, value) => {
                    ops.push(Op::PropSet {
                        node: node.clone(),
                        key: key.clone(),
                        value: value.clone(),
                    });
                }
                Intent::AttachContent(node, key, bytes) => {
                    let oid = store.write_blob(bytes).await?;
                    ops.push(Op::PropSet {
                        node: node.clone(),
                        key: key.clone(),
                        value: PropValue::blob(oid),
                    });
                }
            }
        }
        Ok(ops)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use warp_store::MemoryStore;

    fn node(id: &str) -> NodeId {
        NodeId::new(id).unwrap()
    }

    #[tokio::test]
    async fn resolution_mints_monotonic_dots_and_writes_blobs() {
        let store = MemoryStore::new();
        let writer = WriterId::new("w").unwrap();
        let mut builder = PatchBuilder::new();
        builder
            .add_node(node("a"))
            .add_edge(node("a"), node("b"), EdgeLabel::new("l").unwrap())
            .attach_content(node("a"), b"payload".to_vec());

        let ops = builder.resolve(&store, &writer, 7, None).await.unwrap();
        assert_eq!(ops.len(), 3);
        match &ops[0] {
            Op::NodeAdd { dot, .. } => assert_eq!(dot.counter(), 8),
            other => unreachable!("unexpected op {other:?}"),
        }
        match &ops[1] {
            Op::EdgeAdd { dot, .. } => assert_eq!(dot.counter(), 9),
            other => unreachable!("unexpected op {other:?}"),
        }
        match &ops[2] {
            Op::PropSet { value, .. } => {
                assert!(matches!(value, PropValue::Blob { .. }));
            }
            other => unreachable!("unexpected op {other:?}"),
        }
    }

    #[tokio::test]
    async fn removes_cite_nothing_without_a_state() {
        let store = MemoryStore::new();
        let writer = WriterId::new("w").unwrap();
        let mut builder = PatchBuilder::new();
        builder.remove_node(node("ghost"));
        let ops = builder.resolve(&store, &writer, 0, None).await.unwrap();
        assert_eq!(ops, vec![Op::NodeRemove { observed: vec![] }]);
    }
}
