// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! warp-trust: tamper-evident writer identity for warp graphs.
//!
//! Two chains live here, both fast-forward-only commit chains under
//! dedicated pointers:
//!
//! - The **trust record** (`refs/warp/<g>/trust/root`): one canonical
//!   `trust.json` per commit declaring the trusted-writer list, the policy,
//!   and a monotonically non-decreasing epoch. Updates CAS onto the current
//!   tip; a lost race is `E_TRUST_REF_CONFLICT`, an epoch that moves
//!   backwards is `E_TRUST_EPOCH_REGRESSION`.
//! - **Audit receipts** (`refs/warp/<g>/audit/<writer>`): per-writer
//!   attestations, each binding a patch digest to the writer under an HMAC
//!   signature and linking to the previous receipt. The verifier walks a
//!   chain tip→genesis and grades it `VALID`, `PARTIAL`, or `INVALID`.

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

mod audit;
mod config;
mod evaluate;
mod service;

pub use audit::{
    verify_graph, verify_writer, AuditReceipt, AuditSummary, AuditVerifier, ChainReport,
    ChainStatus, RECEIPT_BLOB_NAME,
};
pub use config::{
    parse_epoch, TrustConfig, POLICY_ALLOWLIST, POLICY_ALL_WRITERS_MUST_BE_TRUSTED, POLICY_ANY,
    RESERVED_POLICIES, TRUST_BLOB_NAME, TRUST_SCHEMA_VERSION,
};
pub use evaluate::{evaluate_writers, WriterEvaluation, WriterVerdict};
pub use service::{
    trust_ref, TrustDiagnostic, TrustHistoryEntry, TrustReceipt, TrustService,
};

use warp_store::{Oid, StoreError};

/// Trust-chain failures.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    /// The trust document failed schema validation.
    #[error("[E_TRUST_SCHEMA_INVALID] {reason}")]
    SchemaInvalid {
        /// What was wrong with the document.
        reason: String,
    },

    /// The policy value is reserved for a future schema version.
    #[error("[E_TRUST_POLICY_RESERVED] policy {policy:?} is reserved")]
    PolicyReserved {
        /// The reserved policy value.
        policy: String,
    },

    /// The proposed epoch is older than the current one.
    #[error("[E_TRUST_EPOCH_REGRESSION] epoch {proposed:?} regresses from {current:?}")]
    EpochRegression {
        /// Epoch currently recorded at the tip.
        current: String,
        /// Epoch the update proposed.
        proposed: String,
    },

    /// A CAS on the trust pointer lost its race (or init found an existing
    /// chain).
    #[error("[E_TRUST_REF_CONFLICT] trust pointer moved underneath the update")]
    RefConflict,

    /// A pinned commit did not resolve to a readable trust document.
    #[error("[E_TRUST_PIN_INVALID] pin {pin} does not resolve to a trust record")]
    PinInvalid {
        /// The rejected pin.
        pin: Oid,
    },

    /// No trust record exists for this graph.
    #[error("[E_TRUST_NOT_FOUND] no trust record initialized")]
    NotFound,

    /// The object store failed underneath the service.
    #[error(transparent)]
    Store(#[from] StoreError),
}
