// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Tick discovery: every `(writer, lamport)` pair in the graph.

use std::collections::{BTreeMap, BTreeSet};

use warp_core::WriterId;
use warp_store::Oid;
use warp_sync::{walk_chain, ChainEntry};

use crate::error::WarpError;
use crate::handle::WarpGraph;

/// Every tick in the graph, plus per-writer patch digests.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct DiscoveredTicks {
    /// Sorted unique lamport values across all writers.
    pub ticks: Vec<u64>,
    /// Per writer: `lamport → patch blob digest`.
    pub tick_shas: BTreeMap<WriterId, BTreeMap<u64, Oid>>,
}

impl WarpGraph {
    /// Enumerates every tick by walking each writer's full chain.
    ///
    /// # Errors
    /// Store and decode failures.
    pub async fn discover_ticks(&self) -> Result<DiscoveredTicks, WarpError> {
        self.ensure_open()?;
        let mut ticks: BTreeSet<u64> = BTreeSet::new();
        let mut tick_shas: BTreeMap<WriterId, BTreeMap<u64, Oid>> = BTreeMap::new();

        for (writer, entry) in self.all_entries().await? {
            ticks.insert(entry.patch.lamport);
            tick_shas
                .entry(writer)
                .or_default()
                .insert(entry.patch.lamport, entry.sha);
        }

        Ok(DiscoveredTicks {
            ticks: ticks.into_iter().collect(),
            tick_shas,
        })
    }

    /// Every chain entry of every writer, sorted by `(lamport, sha)` so
    /// temporal walks advance deterministically.
    pub(crate) async fn all_entries(&self) -> Result<Vec<(WriterId, ChainEntry)>, WarpError> {
        let frontier = self.frontier().await?;
        let mut out = Vec::new();
        for (writer, tip) in frontier.iter() {
            for entry in walk_chain(self.store.as_ref(), tip, None).await? {
                out.push((writer.clone(), entry));
            }
        }
        out.sort_by(|a, b| {
            a.1.patch
                .lamport
                .cmp(&b.1.patch.lamport)
                .then_with(|| a.1.sha.cmp(&b.1.sha))
        });
        Ok(out)
    }
}
