// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Facade-side sync: request, serve, apply, loop.
//!
//! Each round is independent and idempotent. Applying a response writes
//! the missing patch blobs and commits locally (the canonical codec makes
//! the rebuilt objects digest-identical to the peer's), fast-forwards the
//! writer pointers, and marks the cache dirty. A lost pointer CAS aborts
//! just that patch — the next round picks it up again — so the `applied`
//! counter always reports true partial progress.

use tracing::{debug, info};
use warp_sync::{collect_patches, read_patch, write_patch, Frontier, SyncError, SyncMessage};

use crate::error::{check_cancel, CancelToken, WarpError};
use crate::handle::{HandleState, WarpGraph};
use crate::refs;

/// What a [`WarpGraph::sync_with`] loop accomplished.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct SyncOutcome {
    /// Patches integrated locally.
    pub applied: usize,
    /// Request/response rounds performed.
    pub rounds: usize,
}

impl WarpGraph {
    /// Builds a sync request carrying this repository's frontier.
    ///
    /// # Errors
    /// Store failures.
    pub async fn create_sync_request(&self) -> Result<SyncMessage, WarpError> {
        Ok(SyncMessage::SyncRequest {
            frontier: self.frontier().await?,
        })
    }

    /// Serves a sync request: respond with our frontier and whatever the
    /// client is missing.
    ///
    /// # Errors
    /// `E_USAGE` when handed a response instead of a request; store and
    /// decode failures otherwise.
    pub async fn process_sync_request(
        &self,
        request: &SyncMessage,
    ) -> Result<SyncMessage, WarpError> {
        self.ensure_open()?;
        let SyncMessage::SyncRequest { frontier: client } = request else {
            return Err(WarpError::Usage(
                "process_sync_request expects a sync-request".to_owned(),
            ));
        };
        let server = self.frontier().await?;
        let patches = collect_patches(self.store.as_ref(), &server, client).await?;
        debug!(patches = patches.len(), "serving sync request");
        Ok(SyncMessage::SyncResponse {
            frontier: server,
            patches,
        })
    }

    /// Integrates a sync response. Returns the number of patches applied.
    ///
    /// # Errors
    /// `E_USAGE` for a non-response message, allowlist rejections in
    /// enforce mode, digest mismatches, and store failures. A CAS conflict
    /// on a writer pointer is *not* an error — that patch is skipped and
    /// the next round retries it.
    pub async fn apply_sync_response(
        &mut self,
        response: &SyncMessage,
        cancel: Option<&CancelToken>,
    ) -> Result<usize, WarpError> {
        self.ensure_open()?;
        let SyncMessage::SyncResponse { patches, .. } = response else {
            return Err(WarpError::Usage(
                "apply_sync_response expects a sync-response".to_owned(),
            ));
        };

        let mut applied = 0usize;
        for transfer in patches {
            check_cancel(cancel)?;
            self.allowlist.check(&transfer.writer)?;

            let ref_name = refs::writer_ref(&self.graph, &transfer.writer);
            let tip = self.store.read_ref(&ref_name).await?;

            // Skip patches we already integrated (stale responses).
            if let Some(tip) = &tip {
                let (_, tip_patch) = read_patch(self.store.as_ref(), tip).await?;
                if transfer.patch.lamport <= tip_patch.lamport {
                    continue;
                }
            }

            transfer.patch.validate()?;
            let written =
                write_patch(self.store.as_ref(), &transfer.patch, tip.as_ref()).await?;
            if written.sha != transfer.sha {
                return Err(SyncError::ShaMismatch {
                    declared: transfer.sha.clone(),
                    computed: written.sha,
                }
                .into());
            }

            match self
                .store
                .compare_and_swap_ref(&ref_name, &written.commit, tip.as_ref())
                .await
            {
                Ok(()) => applied += 1,
                Err(warp_store::StoreError::RefConflict { .. }) => {
                    debug!(writer = transfer.writer.as_str(), "pointer raced; patch deferred");
                }
                Err(err) => return Err(err.into()),
            }
        }

        if applied > 0 {
            self.lifecycle = HandleState::Dirty;
        }
        info!(applied, "sync response integrated");
        Ok(applied)
    }

    /// `true` if `remote_frontier` has tips this repository lacks.
    ///
    /// # Errors
    /// Store failures.
    pub async fn sync_needed(&self, remote_frontier: &Frontier) -> Result<bool, WarpError> {
        Ok(self.frontier().await?.lags_behind(remote_frontier))
    }

    /// Pulls from `peer` until nothing new arrives.
    ///
    /// # Errors
    /// `E_CANCELED` between rounds; any per-round failure.
    pub async fn sync_with(
        &mut self,
        peer: &WarpGraph,
        cancel: Option<&CancelToken>,
    ) -> Result<SyncOutcome, WarpError> {
        let mut outcome = SyncOutcome::default();
        loop {
            check_cancel(cancel)?;
            let request = self.create_sync_request().await?;
            let response = peer.process_sync_request(&request).await?;
            let applied = self.apply_sync_response(&response, cancel).await?;
            outcome.applied += applied;
            outcome.rounds += 1;

            let SyncMessage::SyncResponse { frontier: remote, .. } = &response else {
                return Err(WarpError::Internal(
                    "peer answered a request with a request".to_owned(),
                ));
            };
            if applied == 0 || !self.sync_needed(remote).await? {
                break;
            }
        }
        Ok(outcome)
    }
}
