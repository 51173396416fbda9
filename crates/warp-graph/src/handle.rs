// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The `WarpGraph` handle: open, materialize, commit, status, GC.

use std::sync::Arc;

use tokio::time::{sleep, Duration};
use tracing::{debug, info};
use warp_core::{reduce, Patch, VersionVector, WarpState, WriterId, PATCH_SCHEMA_VERSION};
use warp_store::{
    ClockPort, CryptoPort, DefaultCrypto, ObjectStore, Oid, StoreError, SystemClock,
};
use warp_sync::{read_patch, walk_chain, write_patch, Frontier, PatchCommit, WriterAllowlist};

use crate::builder::PatchBuilder;
use crate::error::{check_cancel, CancelToken, WarpError};
use crate::refs;

/// Bounded CAS retry policy: 5 attempts, exponential backoff from 10 ms.
const CAS_ATTEMPTS: u32 = 5;
const CAS_BACKOFF_BASE_MS: u64 = 10;

/// Handle lifecycle.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HandleState {
    /// Opened, nothing materialized yet.
    Open,
    /// A materialization is in flight.
    Materializing,
    /// The cached state reflects everything this handle knows about.
    Clean,
    /// A local commit or applied sync response outdated the cache.
    Dirty,
    /// Released; every operation fails.
    Closed,
}

/// Options for [`WarpGraph::materialize`].
#[derive(Clone, Default, Debug)]
pub struct MaterializeOpts {
    /// Apply only patches with `lamport <= ceiling`. When absent, the
    /// active time-travel cursor's tick (if any) is used.
    pub ceiling: Option<u64>,
    /// Cooperative cancellation.
    pub cancel: Option<CancelToken>,
}

/// Freshness of the cached state, as reported by [`WarpGraph::status`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CachedStateInfo {
    /// Nothing materialized yet.
    None,
    /// Cache reflects the latest known patches.
    Fresh,
    /// A commit or sync happened after the last materialization.
    Stale,
}

/// Snapshot of handle health returned by [`WarpGraph::status`].
#[derive(Clone, Debug)]
pub struct GraphStatus {
    /// Cache freshness.
    pub cached_state: CachedStateInfo,
    /// Patches committed after the latest checkpoint, across all writers.
    pub patches_since_checkpoint: usize,
    /// Tombstoned dots as a share of all dots in the cached state.
    pub tombstone_ratio: f64,
    /// Writers with at least one patch.
    pub writer_count: usize,
    /// Per-writer tips.
    pub frontier: Frontier,
}

/// Configuration for [`WarpGraph::open`].
pub struct WarpGraphConfig {
    /// The content-addressed repository.
    pub store: Arc<dyn ObjectStore>,
    /// Graph name; becomes part of every pointer name.
    pub graph: String,
    /// This handle's writer identity.
    pub writer: WriterId,
    /// Crypto port (HMAC envelope, audit receipts).
    pub crypto: Arc<dyn CryptoPort>,
    /// Clock port (auth windows, doctor deadline).
    pub clock: Arc<dyn ClockPort>,
    /// Writer allowlist applied when integrating sync responses.
    pub allowlist: WriterAllowlist,
}

impl WarpGraphConfig {
    /// Configuration with the default crypto, system clock, and an
    /// unrestricted allowlist.
    pub fn new(store: Arc<dyn ObjectStore>, graph: impl Into<String>, writer: WriterId) -> Self {
        Self {
            store,
            graph: graph.into(),
            writer,
            crypto: Arc::new(DefaultCrypto),
            clock: Arc::new(SystemClock),
            allowlist: WriterAllowlist::allow_all(),
        }
    }
}

pub(crate) struct Cached {
    pub(crate) state: WarpState,
    pub(crate) ceiling: Option<u64>,
}

/// A per-writer handle onto one warp graph.
pub struct WarpGraph {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) graph: String,
    pub(crate) writer: WriterId,
    pub(crate) crypto: Arc<dyn CryptoPort>,
    pub(crate) clock: Arc<dyn ClockPort>,
    pub(crate) allowlist: WriterAllowlist,
    pub(crate) cached: Option<Cached>,
    pub(crate) lifecycle: HandleState,
}

impl std::fmt::Debug for WarpGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarpGraph")
            .field("graph", &self.graph)
            .field("writer", &self.writer)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

impl WarpGraph {
    /// Opens a handle, probing the store and rejecting unmigrated schema-1
    /// graphs.
    ///
    /// # Errors
    /// `E_USAGE` for a malformed graph name, `E_SCHEMA_MISMATCH` when the
    /// latest checkpoint carries schema-1 state, store errors otherwise.
    pub async fn open(config: WarpGraphConfig) -> Result<Self, WarpError> {
        if config.graph.is_empty()
            || !config
                .graph
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
        {
            return Err(WarpError::Usage(format!(
                "graph name {:?} must be non-empty [A-Za-z0-9._-]",
                config.graph
            )));
        }
        config.store.ping().await?;

        let handle = Self {
            store: config.store,
            graph: config.graph,
            writer: config.writer,
            crypto: config.crypto,
            clock: config.clock,
            allowlist: config.allowlist,
            cached: None,
            lifecycle: HandleState::Open,
        };
        handle.reject_legacy_checkpoint().await?;
        info!(
            graph = handle.graph.as_str(),
            writer = handle.writer.as_str(),
            "graph opened"
        );
        Ok(handle)
    }

    /// Releases the handle. Underlying objects persist.
    pub fn close(&mut self) {
        self.cached = None;
        self.lifecycle = HandleState::Closed;
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> HandleState {
        self.lifecycle
    }

    /// This handle's writer identity.
    pub fn writer(&self) -> &WriterId {
        &self.writer
    }

    /// The graph name.
    pub fn graph_name(&self) -> &str {
        &self.graph
    }

    /// The injected crypto port, shared with envelope signing and audit
    /// receipt production.
    pub fn crypto(&self) -> Arc<dyn CryptoPort> {
        self.crypto.clone()
    }

    /// The injected clock port.
    pub fn clock(&self) -> Arc<dyn ClockPort> {
        self.clock.clone()
    }

    /// Starts an empty patch builder.
    pub fn create_patch(&self) -> PatchBuilder {
        PatchBuilder::new()
    }

    /// Per-writer tips discovered from the writers pointer prefix.
    ///
    /// # Errors
    /// Store failures.
    pub async fn frontier(&self) -> Result<Frontier, WarpError> {
        let prefix = refs::writers_prefix(&self.graph);
        let mut frontier = Frontier::new();
        for name in self.store.list_refs(&prefix).await? {
            let Some(raw) = name.strip_prefix(&prefix) else {
                continue;
            };
            let Ok(writer) = WriterId::new(raw) else {
                continue;
            };
            if let Some(tip) = self.store.read_ref(&name).await? {
                frontier.insert(writer, tip);
            }
        }
        Ok(frontier)
    }

    /// Folds every writer's chain (bounded by the ceiling, starting from
    /// the latest usable checkpoint) into the cached state and returns it.
    ///
    /// # Errors
    /// `E_CANCELED` at a suspension point; store, decode, and reducer
    /// failures otherwise.
    pub async fn materialize(&mut self, opts: MaterializeOpts) -> Result<&WarpState, WarpError> {
        self.ensure_open()?;
        let ceiling = match opts.ceiling {
            Some(tick) => Some(tick),
            None => self.active_cursor().await?.map(|cursor| cursor.tick),
        };
        self.materialize_internal(ceiling, opts.cancel.as_ref())
            .await?;
        self.cached
            .as_ref()
            .map(|cached| &cached.state)
            .ok_or_else(|| WarpError::Internal("materialize left no cached state".to_owned()))
    }

    /// Commits a patch built from `builder`, advancing this writer's chain
    /// with a bounded CAS retry loop.
    ///
    /// # Errors
    /// `E_REF_CONFLICT` once retries are exhausted; patch validation and
    /// store failures otherwise.
    pub async fn commit(&mut self, builder: PatchBuilder) -> Result<PatchCommit, WarpError> {
        self.ensure_open()?;
        let ref_name = refs::writer_ref(&self.graph, &self.writer);

        for attempt in 0..CAS_ATTEMPTS {
            let tip = self.store.read_ref(&ref_name).await?;
            let patch = self.build_patch(&builder, tip.as_ref()).await?;
            patch.validate()?;

            let written = write_patch(self.store.as_ref(), &patch, tip.as_ref()).await?;
            match self
                .store
                .compare_and_swap_ref(&ref_name, &written.commit, tip.as_ref())
                .await
            {
                Ok(()) => {
                    self.lifecycle = HandleState::Dirty;
                    debug!(
                        writer = self.writer.as_str(),
                        lamport = patch.lamport,
                        sha = %written.sha,
                        "patch committed"
                    );
                    return Ok(written);
                }
                Err(StoreError::RefConflict { .. }) => {
                    let backoff = CAS_BACKOFF_BASE_MS << attempt;
                    debug!(attempt, backoff_ms = backoff, "writer pointer moved; rebasing");
                    sleep(Duration::from_millis(backoff)).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(WarpError::RefConflict { name: ref_name })
    }

    /// Reports cache freshness, checkpoint lag, tombstone pressure, and
    /// the frontier.
    ///
    /// # Errors
    /// Store failures.
    pub async fn status(&mut self) -> Result<GraphStatus, WarpError> {
        self.ensure_open()?;
        let frontier = self.frontier().await?;
        let checkpoint = self.load_checkpoint_info().await?;

        let mut patches_since_checkpoint = 0usize;
        for (writer, tip) in frontier.iter() {
            let stop = checkpoint
                .as_ref()
                .and_then(|info| info.meta.tips.get(writer).cloned());
            patches_since_checkpoint +=
                walk_chain(self.store.as_ref(), tip, stop.as_ref()).await?.len();
        }

        let cached_state = match (&self.cached, self.lifecycle) {
            (None, _) => CachedStateInfo::None,
            (Some(_), HandleState::Clean) => CachedStateInfo::Fresh,
            (Some(_), _) => CachedStateInfo::Stale,
        };
        let tombstone_ratio = self
            .cached
            .as_ref()
            .map_or(0.0, |cached| cached.state.tombstone_ratio());

        Ok(GraphStatus {
            cached_state,
            patches_since_checkpoint,
            tombstone_ratio,
            writer_count: frontier.len(),
            frontier,
        })
    }

    /// Compacts the cached state's tombstones against its own frontier.
    /// Returns the number of dots dropped.
    ///
    /// # Errors
    /// `E_NO_STATE` when nothing has been materialized yet.
    pub fn run_gc(&mut self) -> Result<usize, WarpError> {
        let cached = self.cached.as_mut().ok_or(WarpError::NoState)?;
        let vv = cached.state.frontier().clone();
        let removed = cached.state.compact(&vv);
        debug!(removed, "tombstone compaction");
        Ok(removed)
    }

    /// The cached state, if one exists.
    pub fn cached_state(&self) -> Option<&WarpState> {
        self.cached.as_ref().map(|cached| &cached.state)
    }

    // ── internals ───────────────────────────────────────────────────────

    pub(crate) fn ensure_open(&self) -> Result<(), WarpError> {
        if self.lifecycle == HandleState::Closed {
            return Err(WarpError::Usage("handle is closed".to_owned()));
        }
        Ok(())
    }

    /// Materializes into the cache unless the cache already matches.
    pub(crate) async fn materialize_internal(
        &mut self,
        ceiling: Option<u64>,
        cancel: Option<&CancelToken>,
    ) -> Result<(), WarpError> {
        if self.lifecycle == HandleState::Clean {
            if let Some(cached) = &self.cached {
                if cached.ceiling == ceiling {
                    return Ok(());
                }
            }
        }
        self.lifecycle = HandleState::Materializing;

        let checkpoint = self.load_checkpoint_info().await?;
        // A checkpoint above the ceiling already folded patches the ceiling
        // must exclude; fall back to a genesis walk.
        let usable = checkpoint.filter(|info| {
            ceiling.is_none_or(|ceiling| info.meta.max_lamport <= ceiling)
        });

        let (mut state, stops) = match &usable {
            Some(info) => (
                self.load_checkpoint_state(info).await?,
                Some(info.meta.tips.clone()),
            ),
            None => (WarpState::new(), None),
        };

        let frontier = self.frontier().await?;
        for (writer, tip) in frontier.iter() {
            check_cancel(cancel)?;
            let stop = stops
                .as_ref()
                .and_then(|tips| tips.get(writer).cloned());
            let entries = walk_chain(self.store.as_ref(), tip, stop.as_ref()).await?;
            // A base-checkpoint pin that resolves to nothing is tampering
            // or corruption, and fatal for the whole batch.
            for entry in &entries {
                if let Some(base) = &entry.patch.base_checkpoint {
                    if !self.store.node_exists(base).await? {
                        return Err(WarpError::SchemaMismatch {
                            reason: format!(
                                "patch {} pins unknown checkpoint {base}",
                                entry.sha
                            ),
                        });
                    }
                }
            }
            let batch: Vec<_> = entries
                .iter()
                .filter(|entry| ceiling.is_none_or(|ceiling| entry.patch.lamport <= ceiling))
                .map(|entry| (&entry.sha, &entry.patch))
                .collect();
            state = reduce(batch, state)?;
        }

        self.cached = Some(Cached { state, ceiling });
        self.lifecycle = HandleState::Clean;
        Ok(())
    }

    /// Builds a concrete patch from the builder against the current tip.
    async fn build_patch(
        &mut self,
        builder: &PatchBuilder,
        tip: Option<&Oid>,
    ) -> Result<Patch, WarpError> {
        // Writer-local dot counter base: the tip patch's own high-water.
        let (own_lamport, counter_base) = match tip {
            Some(tip) => {
                let (_, tip_patch) = read_patch(self.store.as_ref(), tip).await?;
                let minted_max = tip_patch
                    .minted_dots()
                    .iter()
                    .map(|dot| dot.counter())
                    .max()
                    .unwrap_or(0);
                let context_own = tip_patch.context.get(&self.writer);
                (tip_patch.lamport, minted_max.max(context_own))
            }
            None => (0, 0),
        };

        // Lamport: above everything observed anywhere, cursor or not.
        let mut lamport = own_lamport;
        let frontier = self.frontier().await?;
        for (_, writer_tip) in frontier.iter() {
            let (_, tip_patch) = read_patch(self.store.as_ref(), writer_tip).await?;
            lamport = lamport.max(tip_patch.lamport);
        }
        let lamport = lamport + 1;

        // Context: the full observed frontier, never the cursor ceiling.
        self.materialize_internal(None, None).await?;
        let context: VersionVector = self
            .cached
            .as_ref()
            .map(|cached| cached.state.frontier().clone())
            .unwrap_or_default();

        let ops = builder
            .resolve(
                self.store.as_ref(),
                &self.writer,
                counter_base,
                self.cached.as_ref().map(|cached| &cached.state),
            )
            .await?;

        let base_checkpoint = self
            .store
            .read_ref(&refs::checkpoint_ref(&self.graph))
            .await?;

        Ok(Patch {
            base_checkpoint,
            context,
            lamport,
            ops,
            schema: PATCH_SCHEMA_VERSION,
            writer: self.writer.clone(),
        })
    }

    async fn reject_legacy_checkpoint(&self) -> Result<(), WarpError> {
        let Some(commit) = self
            .store
            .read_ref(&refs::checkpoint_ref(&self.graph))
            .await?
        else {
            return Ok(());
        };
        let tree = self.store.get_commit_tree(&commit).await?;
        let entries = self.store.read_tree_oids(&tree).await?;
        if entries.contains_key("state.v1") {
            return Err(WarpError::SchemaMismatch {
                reason: "checkpoint holds schema-1 state; run the migration first".to_owned(),
            });
        }
        if !entries.contains_key(warp_core::STATE_BLOB_NAME) {
            return Err(WarpError::SchemaMismatch {
                reason: format!("checkpoint {commit} carries no state.v5 blob"),
            });
        }
        Ok(())
    }
}
