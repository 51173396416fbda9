// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Object-store and crypto ports for warp graphs.
//!
//! `warp-store` defines the two host seams every other warp crate builds on:
//!
//! - [`ObjectStore`]: content-addressed blobs, trees, and commits plus mutable
//!   named pointers with compare-and-swap. This is the *only* shared mutable
//!   resource in the system; everything above it coordinates through pointer
//!   CAS, never through locks.
//! - [`CryptoPort`]: digest, HMAC, and constant-time comparison. Injected so
//!   hosts can route through their own crypto stack.
//!
//! [`MemoryStore`] is the reference [`ObjectStore`] implementation. It is
//! fully deterministic: object ids are SHA-256 over git-shaped headers, ref
//! listings are sorted, and commit metadata defaults to a fixed epoch date so
//! identical content always produces identical ids.
//!
//! # Absence Semantics
//!
//! [`read_ref`](ObjectStore::read_ref) returns `None` for a missing pointer —
//! that is not an error. Error variants are reserved for CAS conflicts,
//! missing *objects* (a dangling digest is a corruption signal, unlike a
//! missing ref), and malformed inputs.
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
    clippy::module_name_repetitions,
    clippy::use_self
)]

mod clock;
mod crypto;
mod memory;

pub use clock::{ClockPort, ManualClock, SystemClock};
pub use crypto::{CryptoPort, DefaultCrypto, HashAlgorithm};
pub use memory::MemoryStore;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;

/// A content-address: lowercase hex digest of an object's canonical bytes.
///
/// Thin newtype over `String` following the `BlobHash` pattern. The store
/// decides the digest width (the in-memory store emits 64-char SHA-256 hex;
/// a git-backed store would emit 40-char SHA-1 hex). Consumers treat the
/// value as opaque.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Oid(String);

impl Oid {
    /// Wraps a lowercase hex digest string.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidOid`] if `hex` is empty or contains a
    /// non-hex or uppercase character.
    pub fn new(hex: impl Into<String>) -> Result<Self, StoreError> {
        let hex = hex.into();
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(StoreError::InvalidOid { oid: hex });
        }
        Ok(Self(hex))
    }

    /// View the digest as a hex string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wraps hex output the store just produced itself.
    pub(crate) fn from_hex_unchecked(hex: String) -> Self {
        Self(hex)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of a tree object: `"<mode> blob <oid>\t<path>"`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TreeEntry {
    /// File mode, normally [`TreeEntry::MODE_BLOB`].
    pub mode: &'static str,
    /// Path of the entry within the tree.
    pub path: String,
    /// Digest of the blob the entry points at.
    pub oid: Oid,
}

impl TreeEntry {
    /// Regular-file mode for blob entries.
    pub const MODE_BLOB: &'static str = "100644";

    /// Creates a blob entry at `path`.
    pub fn blob(path: impl Into<String>, oid: Oid) -> Self {
        Self {
            mode: Self::MODE_BLOB,
            path: path.into(),
            oid,
        }
    }
}

impl fmt::Display for TreeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} blob {}\t{}", self.mode, self.oid, self.path)
    }
}

/// Commit metadata returned by [`ObjectStore::get_node_info`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CommitInfo {
    /// Digest of the commit itself.
    pub sha: Oid,
    /// Commit message.
    pub message: String,
    /// Author string.
    pub author: String,
    /// ISO-8601 commit date.
    pub date: String,
    /// Parent commit digests, in recorded order.
    pub parents: Vec<Oid>,
}

/// Errors surfaced by [`ObjectStore`] implementations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A compare-and-swap lost a race: the pointer did not hold the expected
    /// value. Recoverable — re-read, rebase, retry.
    #[error("[E_REF_CONFLICT] ref {name:?} expected {expected:?}, found {actual:?}")]
    RefConflict {
        /// Pointer name that was being advanced.
        name: String,
        /// Value the caller expected the pointer to hold.
        expected: Option<Oid>,
        /// Value the pointer actually held.
        actual: Option<Oid>,
    },

    /// A digest referenced an object the store does not have.
    #[error("[E_NOT_FOUND] object {oid} is not present in the store")]
    ObjectMissing {
        /// The dangling digest.
        oid: Oid,
    },

    /// An object existed but was not of the expected kind.
    #[error("[E_INTERNAL] object {oid} is a {actual}, expected {expected}")]
    WrongKind {
        /// Digest of the offending object.
        oid: Oid,
        /// Kind the caller required (`"blob"`, `"tree"`, `"commit"`).
        expected: &'static str,
        /// Kind actually stored.
        actual: &'static str,
    },

    /// A digest string was not lowercase hex.
    #[error("[E_USAGE] invalid object id {oid:?}")]
    InvalidOid {
        /// The rejected digest string.
        oid: String,
    },

    /// A ref name was empty or contained forbidden characters.
    #[error("[E_USAGE] invalid ref name {name:?}")]
    InvalidRefName {
        /// The rejected pointer name.
        name: String,
    },
}

/// Content-addressed repository port.
///
/// The trait mirrors the narrow surface a source-control object database
/// exposes: immutable objects addressed by digest, plus mutable named
/// pointers. All methods may suspend; implementations must be safe to share
/// across handles (`&self` receivers, interior synchronization).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Resolves a named pointer, `None` if it does not exist.
    async fn read_ref(&self, name: &str) -> Result<Option<Oid>, StoreError>;

    /// Lists pointer names starting with `prefix`, sorted bytewise.
    async fn list_refs(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Unconditionally points `name` at `new`.
    async fn update_ref(&self, name: &str, new: &Oid) -> Result<(), StoreError>;

    /// Atomically points `name` at `new` iff it currently holds `expected`
    /// (`None` = the pointer must not exist yet).
    ///
    /// # Errors
    /// [`StoreError::RefConflict`] when the current value differs from
    /// `expected`; the pointer is left untouched.
    async fn compare_and_swap_ref(
        &self,
        name: &str,
        new: &Oid,
        expected: Option<&Oid>,
    ) -> Result<(), StoreError>;

    /// Deletes a pointer. Deleting a missing pointer is a no-op.
    async fn delete_ref(&self, name: &str) -> Result<(), StoreError>;

    /// Reads a blob's bytes.
    async fn read_blob(&self, oid: &Oid) -> Result<Vec<u8>, StoreError>;

    /// Writes a blob and returns its digest.
    async fn write_blob(&self, bytes: &[u8]) -> Result<Oid, StoreError>;

    /// Writes a tree from `entries` and returns its digest.
    async fn write_tree(&self, entries: &[TreeEntry]) -> Result<Oid, StoreError>;

    /// Reads a tree as a `path → blob digest` mapping.
    async fn read_tree_oids(&self, tree: &Oid) -> Result<BTreeMap<String, Oid>, StoreError>;

    /// Resolves the tree digest of a commit.
    async fn get_commit_tree(&self, commit: &Oid) -> Result<Oid, StoreError>;

    /// Writes a commit pointing at `tree` with the given parents and message.
    async fn commit_node_with_tree(
        &self,
        tree: &Oid,
        parents: &[Oid],
        message: &str,
    ) -> Result<Oid, StoreError>;

    /// Returns whether the store holds an object with this digest.
    async fn node_exists(&self, oid: &Oid) -> Result<bool, StoreError>;

    /// Returns whether `ancestor` is reachable from `descendant` through
    /// parent links. A commit is an ancestor of itself.
    async fn is_ancestor(&self, ancestor: &Oid, descendant: &Oid) -> Result<bool, StoreError>;

    /// Reads commit metadata.
    async fn get_node_info(&self, oid: &Oid) -> Result<CommitInfo, StoreError>;

    /// Liveness probe.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn oid_rejects_non_hex() {
        assert!(Oid::new("abc123").is_ok());
        assert!(Oid::new("").is_err());
        assert!(Oid::new("xyz").is_err());
        assert!(Oid::new("ABC123").is_err());
    }

    #[test]
    fn tree_entry_renders_git_shape() {
        let entry = TreeEntry::blob("state.v5", Oid::new("ab12").unwrap());
        assert_eq!(entry.to_string(), "100644 blob ab12\tstate.v5");
    }
}
