// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Patch-chain plumbing.
//!
//! A writer's history is a linear commit chain: each commit's tree holds a
//! single `patch.json` blob (canonical patch bytes), and its first parent
//! is the writer's previous patch commit. The blob digest — not the commit
//! digest — is the patch's identity; it seeds LWW event ids and the sync
//! transfer format.

use warp_core::Patch;
use warp_store::{ObjectStore, Oid, TreeEntry};

use crate::SyncError;

/// File name of the patch blob inside a patch commit's tree.
pub const PATCH_BLOB_NAME: &str = "patch.json";

/// Result of persisting a patch: its blob identity and its chain commit.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PatchCommit {
    /// Digest of the canonical patch blob (the patch id).
    pub sha: Oid,
    /// The chain commit wrapping it.
    pub commit: Oid,
}

/// One link of a walked chain, oldest-first.
#[derive(Clone, PartialEq, Debug)]
pub struct ChainEntry {
    /// The chain commit.
    pub commit: Oid,
    /// The patch blob digest.
    pub sha: Oid,
    /// The decoded, validated patch.
    pub patch: Patch,
}

/// Writes `patch` as a blob + tree + commit with `parent` as the previous
/// chain tip. The caller advances the writer pointer afterwards (CAS).
///
/// # Errors
/// Store failures bubble up; the patch is assumed validated.
pub async fn write_patch(
    store: &dyn ObjectStore,
    patch: &Patch,
    parent: Option<&Oid>,
) -> Result<PatchCommit, SyncError> {
    let blob = store.write_blob(&patch.encode_canonical()).await?;
    let tree = store
        .write_tree(&[TreeEntry::blob(PATCH_BLOB_NAME, blob.clone())])
        .await?;
    let parents: Vec<Oid> = parent.cloned().into_iter().collect();
    let message = format!(
        "warp: patch {} lamport {}",
        patch.writer.as_str(),
        patch.lamport
    );
    let commit = store
        .commit_node_with_tree(&tree, &parents, &message)
        .await?;
    Ok(PatchCommit { sha: blob, commit })
}

/// Reads and validates the patch stored at a chain commit.
///
/// # Errors
/// [`SyncError::MissingPatchBlob`] when the tree has no patch entry;
/// decode/validation failures and store errors otherwise.
pub async fn read_patch(
    store: &dyn ObjectStore,
    commit: &Oid,
) -> Result<(Oid, Patch), SyncError> {
    let tree = store.get_commit_tree(commit).await?;
    let entries = store.read_tree_oids(&tree).await?;
    let blob = entries
        .get(PATCH_BLOB_NAME)
        .ok_or_else(|| SyncError::MissingPatchBlob {
            commit: commit.clone(),
        })?;
    let bytes = store.read_blob(blob).await?;
    let patch = Patch::decode(&bytes)?;
    Ok((blob.clone(), patch))
}

/// Walks a chain from `tip` back to `stop` (exclusive) or genesis,
/// returning entries oldest-first.
///
/// Only the first parent is followed; writer chains are linear by
/// construction (every commit is CAS'd onto the previous tip).
///
/// # Errors
/// Store and decode failures bubble up.
pub async fn walk_chain(
    store: &dyn ObjectStore,
    tip: &Oid,
    stop: Option<&Oid>,
) -> Result<Vec<ChainEntry>, SyncError> {
    let mut out = Vec::new();
    let mut cursor = Some(tip.clone());
    while let Some(commit) = cursor {
        if stop == Some(&commit) {
            break;
        }
        let (sha, patch) = read_patch(store, &commit).await?;
        let info = store.get_node_info(&commit).await?;
        out.push(ChainEntry { commit, sha, patch });
        cursor = info.parents.first().cloned();
    }
    out.reverse();
    Ok(out)
}
