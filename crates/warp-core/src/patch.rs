// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Patch envelopes and the canonical patch codec.
//!
//! A patch is one writer's ordered batch of graph mutations: the writer id,
//! a Lamport timestamp, the context version vector the writer had observed,
//! the op list, and an optional base-checkpoint pin. On disk a patch is a
//! canonical-JSON blob; the blob's digest is the patch's identity and feeds
//! every LWW tie-break.
//!
//! Decoding validates the schema-2 shape. Validation failures are fatal for
//! the whole batch being reduced — a malformed patch means a broken writer
//! or tampering, never something to skip over.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use warp_store::Oid;

use crate::canonical::to_canonical_json;
use crate::clock::VersionVector;
use crate::dot::{Dot, WriterId};
use crate::state::{EdgeLabel, NodeId, PropKey};
use crate::value::PropValue;

/// The only schema this crate reduces. Schema-1 data is migration-only.
pub const PATCH_SCHEMA_VERSION: u32 = 2;

/// One graph mutation.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Op {
    /// Assert a node, tagged with a fresh dot of the patch writer.
    NodeAdd {
        /// Node being asserted.
        node: NodeId,
        /// Fresh dot tagging this assertion.
        dot: Dot,
    },
    /// Strike the cited node dots. Citing nothing is a no-op; concurrent
    /// adds whose dots are not cited survive.
    NodeRemove {
        /// Dots the remover observed.
        observed: Vec<Dot>,
    },
    /// Assert an edge, tagged with a fresh dot of the patch writer.
    EdgeAdd {
        /// Source node.
        from: NodeId,
        /// Target node.
        to: NodeId,
        /// Edge label.
        label: EdgeLabel,
        /// Fresh dot tagging this assertion.
        dot: Dot,
    },
    /// Strike the cited edge dots.
    EdgeRemove {
        /// Dots the remover observed.
        observed: Vec<Dot>,
    },
    /// Write a property register (LWW, keyed by the derived event id).
    PropSet {
        /// Node the property hangs off.
        node: NodeId,
        /// Property key.
        key: PropKey,
        /// Inline scalar or blob reference.
        value: PropValue,
    },
}

impl Op {
    /// The fresh dot this op mints, if it is an add.
    pub fn minted_dot(&self) -> Option<&Dot> {
        match self {
            Self::NodeAdd { dot, .. } | Self::EdgeAdd { dot, .. } => Some(dot),
            Self::NodeRemove { .. } | Self::EdgeRemove { .. } | Self::PropSet { .. } => None,
        }
    }
}

/// A writer's patch (schema 2).
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    /// Checkpoint the writer built on, when it pinned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_checkpoint: Option<Oid>,
    /// Version vector the writer had observed when committing.
    pub context: VersionVector,
    /// Lamport timestamp; strictly increasing along the writer's chain.
    pub lamport: u64,
    /// Ordered operations.
    pub ops: Vec<Op>,
    /// Schema version; must be [`PATCH_SCHEMA_VERSION`].
    pub schema: u32,
    /// Producing writer.
    pub writer: WriterId,
}

/// Patch codec and validation failures.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// The blob was not valid JSON for the patch shape (unknown op types
    /// land here too — serde rejects unrecognized `type` tags).
    #[error("[E_SCHEMA_MISMATCH] undecodable patch blob: {0}")]
    Undecodable(#[from] serde_json::Error),

    /// The patch declared a schema other than 2.
    #[error("[E_SCHEMA_MISMATCH] patch declares schema {found}, expected {PATCH_SCHEMA_VERSION}")]
    SchemaVersion {
        /// Schema the patch declared.
        found: u32,
    },

    /// An add op minted a dot for a different writer than the patch's.
    #[error("[E_SCHEMA_MISMATCH] op {op_index} mints dot {dot} but the patch writer is {writer}")]
    ForeignDot {
        /// Index of the offending op.
        op_index: usize,
        /// The foreign dot.
        dot: Dot,
        /// The patch writer.
        writer: WriterId,
    },

    /// Minted dot counters must strictly increase through the op list.
    #[error("[E_SCHEMA_MISMATCH] op {op_index} mints counter {counter}, not above {previous}")]
    NonMonotonicDot {
        /// Index of the offending op.
        op_index: usize,
        /// Counter the op minted.
        counter: u64,
        /// Highest counter minted before it.
        previous: u64,
    },

    /// Inline floats must be finite to survive the JSON round-trip.
    #[error("[E_SCHEMA_MISMATCH] op {op_index} carries a non-finite number")]
    NonFiniteNumber {
        /// Index of the offending op.
        op_index: usize,
    },
}

impl Patch {
    /// Encodes the patch as canonical JSON. Decoding these bytes and
    /// re-encoding them reproduces them exactly.
    pub fn encode_canonical(&self) -> Vec<u8> {
        // Canonical encoding of a validated patch cannot fail: keys are
        // strings and floats are finite.
        to_canonical_json(self).unwrap_or_default()
    }

    /// Decodes and validates a patch blob.
    ///
    /// # Errors
    /// Any [`PatchError`]; all of them are fatal for the containing batch.
    pub fn decode(bytes: &[u8]) -> Result<Self, PatchError> {
        let patch: Self = serde_json::from_slice(bytes)?;
        patch.validate()?;
        Ok(patch)
    }

    /// Validates the schema-2 shape (see [`PatchError`] for the rules).
    pub fn validate(&self) -> Result<(), PatchError> {
        if self.schema != PATCH_SCHEMA_VERSION {
            return Err(PatchError::SchemaVersion {
                found: self.schema,
            });
        }
        let mut previous = 0u64;
        for (op_index, op) in self.ops.iter().enumerate() {
            if let Some(dot) = op.minted_dot() {
                if dot.writer() != &self.writer {
                    return Err(PatchError::ForeignDot {
                        op_index,
                        dot: dot.clone(),
                        writer: self.writer.clone(),
                    });
                }
                if dot.counter() <= previous {
                    return Err(PatchError::NonMonotonicDot {
                        op_index,
                        counter: dot.counter(),
                        previous,
                    });
                }
                previous = dot.counter();
            }
            if let Op::PropSet { value, .. } = op {
                if let PropValue::Inline { value } = value {
                    if value.is_non_finite() {
                        return Err(PatchError::NonFiniteNumber { op_index });
                    }
                }
            }
        }
        Ok(())
    }

    /// The dots this patch mints, in op order.
    pub fn minted_dots(&self) -> Vec<&Dot> {
        self.ops.iter().filter_map(Op::minted_dot).collect()
    }

    /// Every dot the patch cites in removes.
    pub fn cited_dots(&self) -> BTreeSet<&Dot> {
        let mut out = BTreeSet::new();
        for op in &self.ops {
            if let Op::NodeRemove { observed } | Op::EdgeRemove { observed } = op {
                out.extend(observed.iter());
            }
        }
        out
    }
}
