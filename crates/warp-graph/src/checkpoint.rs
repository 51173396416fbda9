// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Checkpoints: materialized-state snapshots as tree commits.
//!
//! A checkpoint commit's tree holds two blobs: `state.v5` (the canonical
//! state bytes — the same bytes the state hash covers) and
//! `checkpoint.json` (the max folded lamport plus the writer tips folded
//! in). Its parents are the previous checkpoint followed by every writer
//! tip, which is what makes coverage an *ancestry* question: a writer tip
//! is covered iff it is an ancestor of the checkpoint commit. The coverage
//! anchor pointer tracks the latest checkpoint for exactly that query.

use serde::{Deserialize, Serialize};
use tracing::info;
use warp_core::{decode_state, encode_state, state_hash, WarpState, STATE_BLOB_NAME};
use warp_store::{Oid, StoreError, TreeEntry};
use warp_sync::Frontier;

use crate::error::WarpError;
use crate::handle::WarpGraph;
use crate::refs;

/// File name of the checkpoint metadata blob.
pub const CHECKPOINT_META_NAME: &str = "checkpoint.json";

/// Checkpoint metadata: what the snapshot folded in.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointMeta {
    /// Greatest lamport folded into the snapshot.
    pub max_lamport: u64,
    /// Writer tips folded into the snapshot; materialization walks each
    /// chain back to these and stops.
    pub tips: Frontier,
    /// Hex state hash of the snapshot (diagnostic; the blob is canonical).
    pub state_hash: String,
}

/// A resolved checkpoint: its commit and metadata.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CheckpointInfo {
    /// The checkpoint commit.
    pub commit: Oid,
    /// Decoded metadata.
    pub meta: CheckpointMeta,
}

impl WarpGraph {
    /// Serializes the current full state into a checkpoint commit and
    /// fast-forwards the checkpoint and coverage pointers.
    ///
    /// Tombstones dominated by the included frontier are compacted
    /// opportunistically before serialization — the state hash is
    /// invariant under that, so the recorded hash still matches any
    /// uncompacted replica.
    ///
    /// # Errors
    /// `E_REF_CONFLICT` if another handle checkpointed concurrently;
    /// store failures otherwise.
    pub async fn create_checkpoint(&mut self) -> Result<CheckpointInfo, WarpError> {
        self.ensure_open()?;
        self.materialize_internal(None, None).await?;
        let tips = self.frontier().await?;
        let previous = self
            .store
            .read_ref(&refs::checkpoint_ref(&self.graph))
            .await?;

        let max_lamport = self.max_lamport_of(&tips).await?;
        let (bytes, meta) = {
            let cached = self
                .cached
                .as_mut()
                .ok_or_else(|| WarpError::Internal("checkpoint without state".to_owned()))?;
            let included_vv = cached.state.frontier().clone();
            cached.state.compact(&included_vv);

            let meta = CheckpointMeta {
                max_lamport,
                tips: tips.clone(),
                state_hash: hex::encode(state_hash(&cached.state)),
            };
            (encode_state(&cached.state), meta)
        };

        let state_blob = self.store.write_blob(&bytes).await?;
        let meta_blob = self
            .store
            .write_blob(&warp_core::to_canonical_json(&meta).unwrap_or_default())
            .await?;
        let tree = self
            .store
            .write_tree(&[
                TreeEntry::blob(CHECKPOINT_META_NAME, meta_blob),
                TreeEntry::blob(STATE_BLOB_NAME, state_blob),
            ])
            .await?;

        // Parents: previous checkpoint first, then every covered writer tip
        // in writer order. Ancestry from any covered tip therefore reaches
        // this commit.
        let mut parents: Vec<Oid> = previous.clone().into_iter().collect();
        for (_, tip) in meta.tips.iter() {
            parents.push(tip.clone());
        }
        let commit = self
            .store
            .commit_node_with_tree(&tree, &parents, "warp: checkpoint")
            .await?;

        let checkpoint_ref = refs::checkpoint_ref(&self.graph);
        match self
            .store
            .compare_and_swap_ref(&checkpoint_ref, &commit, previous.as_ref())
            .await
        {
            Ok(()) => {}
            Err(StoreError::RefConflict { .. }) => {
                return Err(WarpError::RefConflict {
                    name: checkpoint_ref,
                })
            }
            Err(err) => return Err(err.into()),
        }
        // Coverage anchor follows unconditionally: it mirrors the head.
        self.store
            .update_ref(&refs::coverage_ref(&self.graph), &commit)
            .await?;

        info!(commit = %commit, max_lamport = meta.max_lamport, "checkpoint created");
        Ok(CheckpointInfo { commit, meta })
    }

    /// Seeds the graph with an externally produced state — the schema-1
    /// migration boundary. The state becomes checkpoint zero: no writer
    /// tips are recorded, so every schema-2 patch committed afterwards
    /// folds on top of it.
    ///
    /// # Errors
    /// `E_REF_CONFLICT` when the graph already has a checkpoint (a
    /// migrated graph must start from one snapshot, not two).
    pub async fn import_state(&mut self, state: WarpState) -> Result<CheckpointInfo, WarpError> {
        self.ensure_open()?;
        let meta = CheckpointMeta {
            max_lamport: 0,
            tips: Frontier::new(),
            state_hash: hex::encode(state_hash(&state)),
        };
        let state_blob = self.store.write_blob(&encode_state(&state)).await?;
        let meta_blob = self
            .store
            .write_blob(&warp_core::to_canonical_json(&meta).unwrap_or_default())
            .await?;
        let tree = self
            .store
            .write_tree(&[
                TreeEntry::blob(CHECKPOINT_META_NAME, meta_blob),
                TreeEntry::blob(STATE_BLOB_NAME, state_blob),
            ])
            .await?;
        let commit = self
            .store
            .commit_node_with_tree(&tree, &[], "warp: migrated state import")
            .await?;

        let checkpoint_ref = refs::checkpoint_ref(&self.graph);
        match self
            .store
            .compare_and_swap_ref(&checkpoint_ref, &commit, None)
            .await
        {
            Ok(()) => {}
            Err(StoreError::RefConflict { .. }) => {
                return Err(WarpError::RefConflict {
                    name: checkpoint_ref,
                })
            }
            Err(err) => return Err(err.into()),
        }
        self.store
            .update_ref(&refs::coverage_ref(&self.graph), &commit)
            .await?;
        self.cached = None;
        info!(commit = %commit, "migrated state imported as checkpoint zero");
        Ok(CheckpointInfo { commit, meta })
    }

    /// `true` iff `tip` is covered by the latest checkpoint (an ancestor
    /// of the coverage anchor).
    ///
    /// # Errors
    /// Store failures.
    pub async fn is_tip_covered(&self, tip: &Oid) -> Result<bool, WarpError> {
        let Some(anchor) = self
            .store
            .read_ref(&refs::coverage_ref(&self.graph))
            .await?
        else {
            return Ok(false);
        };
        Ok(self.store.is_ancestor(tip, &anchor).await?)
    }

    /// Resolves the latest checkpoint's commit and metadata, if any.
    pub(crate) async fn load_checkpoint_info(
        &self,
    ) -> Result<Option<CheckpointInfo>, WarpError> {
        let Some(commit) = self
            .store
            .read_ref(&refs::checkpoint_ref(&self.graph))
            .await?
        else {
            return Ok(None);
        };
        let tree = self.store.get_commit_tree(&commit).await?;
        let entries = self.store.read_tree_oids(&tree).await?;
        let meta_blob = entries.get(CHECKPOINT_META_NAME).ok_or_else(|| {
            WarpError::SchemaMismatch {
                reason: format!("checkpoint {commit} has no {CHECKPOINT_META_NAME}"),
            }
        })?;
        let bytes = self.store.read_blob(meta_blob).await?;
        let meta: CheckpointMeta =
            serde_json::from_slice(&bytes).map_err(|err| WarpError::SchemaMismatch {
                reason: format!("undecodable checkpoint metadata: {err}"),
            })?;
        Ok(Some(CheckpointInfo { commit, meta }))
    }

    /// Loads the canonical state blob of a checkpoint.
    pub(crate) async fn load_checkpoint_state(
        &self,
        info: &CheckpointInfo,
    ) -> Result<WarpState, WarpError> {
        let tree = self.store.get_commit_tree(&info.commit).await?;
        let entries = self.store.read_tree_oids(&tree).await?;
        let blob = entries.get(STATE_BLOB_NAME).ok_or_else(|| {
            WarpError::SchemaMismatch {
                reason: format!("checkpoint {} has no {STATE_BLOB_NAME}", info.commit),
            }
        })?;
        let bytes = self.store.read_blob(blob).await?;
        Ok(decode_state(&bytes)?)
    }

    async fn max_lamport_of(&self, tips: &Frontier) -> Result<u64, WarpError> {
        let mut max = 0;
        for (_, tip) in tips.iter() {
            let (_, patch) = warp_sync::read_patch(self.store.as_ref(), tip).await?;
            max = max.max(patch.lamport);
        }
        Ok(max)
    }
}
