// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! warp-core: the schema-2 CRDT graph model and its deterministic reducer.
//!
//! A warp graph is materialized by folding every writer's patch chain into a
//! [`WarpState`]: two observed-remove sets (nodes and edges), a map of
//! last-writer-wins property registers, and the observed version-vector
//! frontier. The fold is commutative, associative, and idempotent over the
//! patch multiset, so every observer computes the same state — and the same
//! [`state_hash`] — no matter in which order patches arrived.
//!
//! Determinism contract:
//! - All maps and dot sets are `BTreeMap`/`BTreeSet` for stable iteration.
//! - The canonical state encoding visits everything in sorted order with
//!   length-prefixed fields and little-endian integers, behind the
//!   domain-separation prefix `"warp-v5:state\0"`.
//! - The encoding covers the *observable* projection (live dots only), which
//!   is exactly what makes `state_hash` invariant under tombstone compaction.
//!
//! Nothing in this crate performs I/O. Patch chains, checkpoints, and sync
//! live in `warp-graph`; this crate is pure data and pure functions.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::use_self
)]

mod canonical;
mod clock;
mod dot;
mod event;
mod hash;
mod migrate;
mod orset;
mod patch;
mod reduce;
mod state;
mod value;

/// Canonical JSON helpers shared by every wire-visible blob format.
pub use canonical::to_canonical_json;
/// Version vectors: per-writer high-water counters.
pub use clock::VersionVector;
/// Writer identity and write-event dots.
pub use dot::{Dot, IdError, WriterId};
/// LWW tie-breaking: total event order and registers.
pub use event::{EventId, LwwRegister};
/// Canonical state encoding and the permutation-invariant state hash.
pub use hash::{decode_state, encode_state, state_hash, StateCodecError, STATE_BLOB_NAME};
/// One-way schema-1 → schema-2 migration.
pub use migrate::{migrate, LegacyState, MigrateError};
/// Add-wins observed-remove sets with cite-the-dots removal.
pub use orset::OrSet;
/// Patch envelopes, operation variants, and the canonical patch codec.
pub use patch::{Op, Patch, PatchError, PATCH_SCHEMA_VERSION};
/// Deterministic fold of patches into state.
pub use reduce::{apply_patch, reduce, ReduceError};
/// Materialized graph state, identifiers, and visibility projection.
pub use state::{EdgeKey, EdgeLabel, NodeId, PropKey, PropRef, WarpState};
/// Property values: inline scalars or content-addressed blobs.
pub use value::{PropValue, Scalar};
