// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Canonical state encoding and the permutation-invariant state hash.
//!
//! The canonical encoding covers the *observable* projection of a state:
//! per element, only the live dots (`entries \ tombstones`), elements with
//! none omitted; every property register; the observed frontier. Two
//! consequences fall out of that choice:
//!
//! 1. Any two mathematically equal states encode to identical bytes,
//!    regardless of insertion order — every map and dot set is visited in
//!    sorted order with length-prefixed fields and little-endian integers.
//! 2. `state_hash(compact(s, vv)) == state_hash(s)` for any `vv` that only
//!    cancels tombstoned dots: compaction removes exactly the dot pairs the
//!    encoding already leaves out.
//!
//! These same bytes are the checkpoint blob (`state.v5`): the hash input
//! *is* the persisted form, so a checkpoint's identity is its state hash.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};
use warp_store::Oid;

use crate::dot::{Dot, WriterId};
use crate::event::{EventId, LwwRegister};
use crate::orset::OrSet;
use crate::state::{EdgeKey, EdgeLabel, NodeId, PropKey, PropRef, WarpState};
use crate::value::{PropValue, Scalar};

/// Domain-separation prefix for every state encoding.
const STATE_DOMAIN: &[u8] = b"warp-v5:state\0";

/// File name of the state blob inside a checkpoint tree.
pub const STATE_BLOB_NAME: &str = "state.v5";

const VALUE_TAG_INLINE: u8 = 1;
const VALUE_TAG_BLOB: u8 = 2;
const SCALAR_TAG_NULL: u8 = 0;
const SCALAR_TAG_BOOL: u8 = 1;
const SCALAR_TAG_INT: u8 = 2;
const SCALAR_TAG_FLOAT: u8 = 3;
const SCALAR_TAG_STR: u8 = 4;

/// Failures while decoding canonical state bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateCodecError {
    /// The blob did not start with the `warp-v5:state\0` domain prefix.
    #[error("[E_SCHEMA_MISMATCH] state blob has a foreign domain prefix")]
    BadDomain,

    /// The blob ended mid-field.
    #[error("[E_SCHEMA_MISMATCH] truncated state blob at byte {offset}")]
    Truncated {
        /// Byte offset where input ran out.
        offset: usize,
    },

    /// An unknown tag byte appeared in a value position.
    #[error("[E_SCHEMA_MISMATCH] unknown tag {tag} at byte {offset}")]
    BadTag {
        /// The unexpected tag byte.
        tag: u8,
        /// Byte offset of the tag.
        offset: usize,
    },

    /// A string field held invalid UTF-8 or failed identifier validation.
    #[error("[E_SCHEMA_MISMATCH] invalid identifier in state blob at byte {offset}")]
    BadIdent {
        /// Byte offset of the field.
        offset: usize,
    },

    /// Trailing bytes followed the final section.
    #[error("[E_SCHEMA_MISMATCH] {extra} trailing bytes after state sections")]
    TrailingBytes {
        /// Number of unread bytes.
        extra: usize,
    },
}

// ── encoding ────────────────────────────────────────────────────────────

fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_str(out: &mut Vec<u8>, value: &str) {
    put_u64(out, value.len() as u64);
    out.extend_from_slice(value.as_bytes());
}

fn put_dots(out: &mut Vec<u8>, dots: &[Dot]) {
    put_u64(out, dots.len() as u64);
    for dot in dots {
        put_str(out, dot.writer().as_str());
        put_u64(out, dot.counter());
    }
}

fn put_value(out: &mut Vec<u8>, value: &PropValue) {
    match value {
        PropValue::Inline { value } => {
            out.push(VALUE_TAG_INLINE);
            match value {
                Scalar::Null => out.push(SCALAR_TAG_NULL),
                Scalar::Bool(b) => {
                    out.push(SCALAR_TAG_BOOL);
                    out.push(u8::from(*b));
                }
                Scalar::Int(i) => {
                    out.push(SCALAR_TAG_INT);
                    out.extend_from_slice(&i.to_le_bytes());
                }
                Scalar::Float(f) => {
                    out.push(SCALAR_TAG_FLOAT);
                    out.extend_from_slice(&f.to_le_bytes());
                }
                Scalar::Str(s) => {
                    out.push(SCALAR_TAG_STR);
                    put_str(out, s);
                }
            }
        }
        PropValue::Blob { oid } => {
            out.push(VALUE_TAG_BLOB);
            put_str(out, oid.as_str());
        }
    }
}

fn put_event(out: &mut Vec<u8>, event: &EventId) {
    put_u64(out, event.lamport);
    put_str(out, event.writer.as_str());
    put_str(out, event.patch_sha.as_str());
    out.extend_from_slice(&event.op_index.to_le_bytes());
}

fn live_elements<E: Ord + Clone>(set: &OrSet<E>) -> Vec<(&E, Vec<Dot>)> {
    set.elems
        .iter()
        .filter_map(|(elem, entries)| {
            let live: Vec<Dot> = entries
                .iter()
                .filter(|dot| !set.struck.contains(*dot))
                .cloned()
                .collect();
            if live.is_empty() {
                None
            } else {
                Some((elem, live))
            }
        })
        .collect()
}

/// Encodes `state` into its canonical bytes (the `state.v5` blob form).
///
/// Per element only the live dots are emitted — a cancelled add/strike
/// pair carries no information a checkpoint needs — but *unmatched*
/// strikes are kept in their own section: their add may still be in
/// flight, and dropping them would let it resurrect.
pub fn encode_state(state: &WarpState) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(STATE_DOMAIN);

    // Nodes: sorted by id, live dots only, then unmatched strikes.
    let nodes = live_elements(&state.node_alive);
    put_u64(&mut out, nodes.len() as u64);
    for (node, live) in nodes {
        put_str(&mut out, node.as_str());
        put_dots(&mut out, &live);
    }
    put_dots(&mut out, &state.node_alive.orphan_strikes());

    // Edges: sorted by (from, to, label) — the tuple order matches the
    // byte-lex order of the NUL-joined canonical encoding.
    let edges = live_elements(&state.edge_alive);
    put_u64(&mut out, edges.len() as u64);
    for (edge, live) in edges {
        put_str(&mut out, edge.from.as_str());
        put_str(&mut out, edge.to.as_str());
        put_str(&mut out, edge.label.as_str());
        put_dots(&mut out, &live);
    }
    put_dots(&mut out, &state.edge_alive.orphan_strikes());

    // Props: every register, visible or not — a re-added node resurfaces
    // its properties, so the registers are real state.
    put_u64(&mut out, state.props.len() as u64);
    for (prop, register) in &state.props {
        put_str(&mut out, prop.node.as_str());
        put_str(&mut out, prop.key.as_str());
        put_event(&mut out, &register.event);
        put_value(&mut out, &register.value);
    }

    // Frontier.
    put_u64(&mut out, state.observed_frontier.writer_count() as u64);
    for (writer, counter) in state.observed_frontier.iter() {
        put_str(&mut out, writer.as_str());
        put_u64(&mut out, counter);
    }

    out
}

/// SHA-256 of the canonical encoding.
pub fn state_hash(state: &WarpState) -> [u8; 32] {
    let digest = Sha256::digest(encode_state(state));
    digest.into()
}

// ── decoding ────────────────────────────────────────────────────────────

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], StateCodecError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(StateCodecError::Truncated {
                offset: self.offset,
            })?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, StateCodecError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, StateCodecError> {
        let raw = self.take(4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(raw);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64, StateCodecError> {
        let raw = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(raw);
        Ok(u64::from_le_bytes(buf))
    }

    fn i64(&mut self) -> Result<i64, StateCodecError> {
        let raw = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(raw);
        Ok(i64::from_le_bytes(buf))
    }

    fn f64(&mut self) -> Result<f64, StateCodecError> {
        let raw = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(raw);
        Ok(f64::from_le_bytes(buf))
    }

    fn count(&mut self) -> Result<usize, StateCodecError> {
        let offset = self.offset;
        usize::try_from(self.u64()?).map_err(|_| StateCodecError::Truncated { offset })
    }

    fn str(&mut self) -> Result<String, StateCodecError> {
        let offset = self.offset;
        let len = self.count()?;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| StateCodecError::BadIdent { offset })
    }

    fn dot(&mut self) -> Result<Dot, StateCodecError> {
        let offset = self.offset;
        let writer = self.str()?;
        let counter = self.u64()?;
        let writer =
            WriterId::new(writer).map_err(|_| StateCodecError::BadIdent { offset })?;
        Dot::new(writer, counter).map_err(|_| StateCodecError::BadIdent { offset })
    }

    fn dots(&mut self) -> Result<BTreeSet<Dot>, StateCodecError> {
        let count = self.count()?;
        let mut out = BTreeSet::new();
        for _ in 0..count {
            out.insert(self.dot()?);
        }
        Ok(out)
    }

    fn value(&mut self) -> Result<PropValue, StateCodecError> {
        let offset = self.offset;
        match self.u8()? {
            VALUE_TAG_INLINE => {
                let scalar_offset = self.offset;
                let scalar = match self.u8()? {
                    SCALAR_TAG_NULL => Scalar::Null,
                    SCALAR_TAG_BOOL => Scalar::Bool(self.u8()? != 0),
                    SCALAR_TAG_INT => Scalar::Int(self.i64()?),
                    SCALAR_TAG_FLOAT => Scalar::Float(self.f64()?),
                    SCALAR_TAG_STR => Scalar::Str(self.str()?),
                    tag => {
                        return Err(StateCodecError::BadTag {
                            tag,
                            offset: scalar_offset,
                        })
                    }
                };
                Ok(PropValue::Inline { value: scalar })
            }
            VALUE_TAG_BLOB => {
                let oid_offset = self.offset;
                let oid = Oid::new(self.str()?)
                    .map_err(|_| StateCodecError::BadIdent { offset: oid_offset })?;
                Ok(PropValue::Blob { oid })
            }
            tag => Err(StateCodecError::BadTag { tag, offset }),
        }
    }

    fn event(&mut self) -> Result<EventId, StateCodecError> {
        let offset = self.offset;
        let lamport = self.u64()?;
        let writer = WriterId::new(self.str()?)
            .map_err(|_| StateCodecError::BadIdent { offset })?;
        let patch_sha =
            Oid::new(self.str()?).map_err(|_| StateCodecError::BadIdent { offset })?;
        let op_index = self.u32()?;
        Ok(EventId {
            lamport,
            writer,
            patch_sha,
            op_index,
        })
    }
}

/// Decodes canonical state bytes back into a [`WarpState`].
///
/// Matched add/strike pairs are not part of the canonical form, so the
/// decoded state carries only live entry dots plus the unmatched strikes;
/// it is observably equal to the encoded state and re-encodes to the
/// identical bytes.
///
/// # Errors
/// Any [`StateCodecError`] on malformed input.
pub fn decode_state(bytes: &[u8]) -> Result<WarpState, StateCodecError> {
    if bytes.len() < STATE_DOMAIN.len() || &bytes[..STATE_DOMAIN.len()] != STATE_DOMAIN {
        return Err(StateCodecError::BadDomain);
    }
    let mut reader = Reader {
        bytes,
        offset: STATE_DOMAIN.len(),
    };
    let mut state = WarpState::new();

    let node_count = reader.count()?;
    for _ in 0..node_count {
        let offset = reader.offset;
        let node = NodeId::new(reader.str()?)
            .map_err(|_| StateCodecError::BadIdent { offset })?;
        for dot in reader.dots()? {
            state.node_alive.add(node.clone(), dot);
        }
    }
    state.node_alive.struck = reader.dots()?;

    let edge_count = reader.count()?;
    for _ in 0..edge_count {
        let offset = reader.offset;
        let from = NodeId::new(reader.str()?)
            .map_err(|_| StateCodecError::BadIdent { offset })?;
        let to = NodeId::new(reader.str()?)
            .map_err(|_| StateCodecError::BadIdent { offset })?;
        let label = EdgeLabel::new(reader.str()?)
            .map_err(|_| StateCodecError::BadIdent { offset })?;
        let key = EdgeKey::new(from, to, label);
        for dot in reader.dots()? {
            state.edge_alive.add(key.clone(), dot);
        }
    }
    state.edge_alive.struck = reader.dots()?;

    let prop_count = reader.count()?;
    for _ in 0..prop_count {
        let offset = reader.offset;
        let node = NodeId::new(reader.str()?)
            .map_err(|_| StateCodecError::BadIdent { offset })?;
        let key = PropKey::new(reader.str()?)
            .map_err(|_| StateCodecError::BadIdent { offset })?;
        let event = reader.event()?;
        let value = reader.value()?;
        state
            .props
            .insert(PropRef::new(node, key), LwwRegister::new(value, event));
    }

    let frontier_count = reader.count()?;
    for _ in 0..frontier_count {
        let offset = reader.offset;
        let writer = WriterId::new(reader.str()?)
            .map_err(|_| StateCodecError::BadIdent { offset })?;
        let counter = reader.u64()?;
        if counter > 0 {
            let dot = Dot::new(writer, counter)
                .map_err(|_| StateCodecError::BadIdent { offset })?;
            state.observed_frontier.observe(&dot);
        }
    }

    if reader.offset != bytes.len() {
        return Err(StateCodecError::TrailingBytes {
            extra: bytes.len() - reader.offset,
        });
    }
    Ok(state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_state_is_domain_plus_empty_sections() {
        let bytes = encode_state(&WarpState::new());
        let mut expected = STATE_DOMAIN.to_vec();
        // nodes, node strikes, edges, edge strikes, props, frontier —
        // all six counts zero.
        expected.extend_from_slice(&[0u8; 48]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn decode_rejects_foreign_domain() {
        assert_eq!(
            decode_state(b"not-a-state"),
            Err(StateCodecError::BadDomain)
        );
    }

    #[test]
    fn decode_rejects_truncation_and_trailing_bytes() {
        let bytes = encode_state(&WarpState::new());
        assert!(matches!(
            decode_state(&bytes[..bytes.len() - 1]),
            Err(StateCodecError::Truncated { .. })
        ));
        let mut padded = bytes;
        padded.push(0);
        assert!(matches!(
            decode_state(&padded),
            Err(StateCodecError::TrailingBytes { extra: 1 })
        ));
    }
}
