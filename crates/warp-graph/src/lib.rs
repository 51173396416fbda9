// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! warp-graph: the per-writer facade over a warp graph.
//!
//! A [`WarpGraph`] handle binds one writer identity to one graph inside a
//! content-addressed repository. Through it a writer builds and commits
//! patches, materializes the folded state, snapshots checkpoints, syncs
//! with peers, time-travels with cursors, runs temporal queries, and asks
//! the doctor for a health verdict.
//!
//! Concurrency model: one handle is a single logical actor — every method
//! takes `&mut self` and no state is shared between handles except the
//! object store, which serializes all cross-handle mutation through
//! fast-forward-only pointer CAS. A lost CAS is recoverable: re-read,
//! rebase, retry (bounded, then `E_REF_CONFLICT`).

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

mod builder;
mod checkpoint;
mod cursor;
mod doctor;
mod error;
mod handle;
mod refs;
mod sync;
mod temporal;
mod ticks;

pub use builder::PatchBuilder;
pub use checkpoint::{CheckpointInfo, CheckpointMeta, CHECKPOINT_META_NAME};
pub use cursor::{CursorState, SavedCursor, CURSOR_MODE_TICK};
pub use doctor::{
    CheckStatus, Doctor, DoctorCheck, DoctorReport, Finding, Health, Impact,
    DEFAULT_DOCTOR_DEADLINE_MS,
};
pub use error::{CancelToken, WarpError};
pub use handle::{
    CachedStateInfo, GraphStatus, HandleState, MaterializeOpts, WarpGraph, WarpGraphConfig,
};
pub use sync::SyncOutcome;
pub use ticks::DiscoveredTicks;
pub use temporal::NodeSnapshot;
