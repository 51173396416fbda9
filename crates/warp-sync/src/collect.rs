// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Server-side patch collection.
//!
//! Given the server's frontier and the client's, decide which patches the
//! client is missing. The rules:
//!
//! - Writer unknown to the client → ship the whole chain.
//! - Tips equal → nothing.
//! - Client tip is an ancestor of the server tip → ship `(clientTip,
//!   serverTip]`.
//! - Anything else (client ahead, or diverged) → nothing; the client will
//!   serve *us* those patches when the roles flip.

use tracing::debug;
use warp_store::ObjectStore;

use crate::chain::walk_chain;
use crate::messages::{sort_transfers, Frontier, PatchTransfer};
use crate::SyncError;

/// Collects the transfers a client with `client_frontier` is missing,
/// ordered by `(writer, lamport)`.
///
/// # Errors
/// Store and decode failures bubble up; a partially collected response is
/// never returned.
pub async fn collect_patches(
    store: &dyn ObjectStore,
    server_frontier: &Frontier,
    client_frontier: &Frontier,
) -> Result<Vec<PatchTransfer>, SyncError> {
    let mut out = Vec::new();
    for (writer, server_tip) in server_frontier.iter() {
        let stop = match client_frontier.get(writer) {
            Some(client_tip) if client_tip == server_tip => continue,
            Some(client_tip) => {
                if !store.is_ancestor(client_tip, server_tip).await? {
                    debug!(writer = writer.as_str(), "client tip not behind ours; skipping");
                    continue;
                }
                Some(client_tip.clone())
            }
            None => None,
        };
        for entry in walk_chain(store, server_tip, stop.as_ref()).await? {
            out.push(PatchTransfer {
                writer: writer.clone(),
                sha: entry.sha,
                patch: entry.patch,
            });
        }
    }
    sort_transfers(&mut out);
    Ok(out)
}
