// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! warp-sync: frontier exchange and the authenticated transport envelope.
//!
//! Sync between two warp repositories is a stateless request/response
//! exchange of [`Frontier`]s — per-writer tip digests — followed by a
//! transfer of the patches one side is missing. Every piece is idempotent:
//! re-sending a response re-applies nothing, and a partially applied
//! response leaves the client strictly closer to the server.
//!
//! Transport security is an HMAC-SHA-256 envelope over a canonical payload
//! string, with a timestamp window, single-use v4-UUID nonces held in an
//! LRU replay cache, and an optional writer allowlist. Verification runs a
//! fixed pipeline (version, presence, shape, freshness, key, signature,
//! replay) and *only claims the nonce after the signature checks out* — a
//! forged request can never burn a legitimate nonce.

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

mod allowlist;
mod chain;
mod collect;
mod envelope;
mod messages;
mod replay;

pub use allowlist::{AllowlistMode, WriterAllowlist};
pub use chain::{read_patch, walk_chain, write_patch, ChainEntry, PatchCommit, PATCH_BLOB_NAME};
pub use collect::collect_patches;
pub use envelope::{
    canonical_payload, sign_request, AuthError, AuthHeaders, KeyTable, RequestContext, Verifier,
    HEADER_KEY_ID, HEADER_NONCE, HEADER_SIGNATURE, HEADER_SIG_VERSION, HEADER_TIMESTAMP,
    MAX_CLOCK_SKEW_MS, SIG_VERSION,
};
pub use messages::{Frontier, PatchTransfer, SyncMessage};
pub use replay::NonceCache;

use warp_core::PatchError;
use warp_store::{Oid, StoreError};

/// Failures while reading, writing, or transferring patch chains.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The object store failed underneath the protocol.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A patch blob failed to decode or validate.
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// A patch commit's tree had no patch blob entry.
    #[error("[E_NOT_FOUND] commit {commit} carries no {PATCH_BLOB_NAME} entry")]
    MissingPatchBlob {
        /// The malformed commit.
        commit: Oid,
    },

    /// A transferred patch's canonical bytes did not match its declared
    /// digest.
    #[error("[E_SCHEMA_MISMATCH] patch digest mismatch: declared {declared}, computed {computed}")]
    ShaMismatch {
        /// Digest the sender declared.
        declared: Oid,
        /// Digest of the canonical bytes actually received.
        computed: Oid,
    },
}
