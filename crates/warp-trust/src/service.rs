// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The trust record service: a fast-forward-only commit chain per graph.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::info;
use warp_core::WriterId;
use warp_store::{ObjectStore, Oid, StoreError, TreeEntry};

use crate::config::{parse_epoch, TrustConfig, TRUST_BLOB_NAME};
use crate::TrustError;

/// Pointer name of a graph's trust chain.
pub fn trust_ref(graph: &str) -> String {
    format!("refs/warp/{graph}/trust/root")
}

/// Receipt returned by genesis and update operations.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TrustReceipt {
    /// The new chain tip.
    pub commit: Oid,
    /// Digest of the canonical `trust.json` blob.
    pub snapshot_digest: Oid,
    /// Writers added relative to the previous record.
    pub added: Vec<WriterId>,
    /// Writers removed relative to the previous record.
    pub removed: Vec<WriterId>,
    /// Epoch recorded in the new document.
    pub epoch: String,
}

/// One link of the trust history, tip-first.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TrustHistoryEntry {
    /// The chain commit.
    pub commit: Oid,
    /// The document at that commit.
    pub config: TrustConfig,
    /// Commit message (records the acting principal).
    pub message: String,
}

/// One diagnose finding.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TrustDiagnostic {
    /// Stable finding code.
    pub code: &'static str,
    /// Human explanation.
    pub message: String,
}

/// Trust record operations over one graph's chain.
pub struct TrustService {
    store: Arc<dyn ObjectStore>,
    ref_name: String,
}

impl TrustService {
    /// Binds the service to `graph` on `store`.
    pub fn new(store: Arc<dyn ObjectStore>, graph: &str) -> Self {
        Self {
            store,
            ref_name: trust_ref(graph),
        }
    }

    /// Creates the genesis trust record. The pointer must not exist yet.
    ///
    /// # Errors
    /// [`TrustError::RefConflict`] when a chain already exists or the
    /// create CAS loses; schema errors from validation.
    pub async fn init_trust(&self, config: TrustConfig) -> Result<TrustReceipt, TrustError> {
        let config = config.normalized();
        config.validate()?;
        if self.store.read_ref(&self.ref_name).await?.is_some() {
            return Err(TrustError::RefConflict);
        }
        let (commit, snapshot_digest) = self
            .write_record(&config, None, "warp: trust genesis")
            .await?;
        self.cas(&commit, None).await?;
        info!(commit = %commit, "trust chain initialized");
        Ok(TrustReceipt {
            commit,
            snapshot_digest,
            added: config.trusted_writers.clone(),
            removed: Vec::new(),
            epoch: config.epoch,
        })
    }

    /// Appends an updated record. Epochs must not regress.
    ///
    /// # Errors
    /// [`TrustError::EpochRegression`] when the proposed epoch is older,
    /// [`TrustError::RefConflict`] on a lost CAS, schema errors otherwise.
    pub async fn update_trust(
        &self,
        config: TrustConfig,
        actor: &str,
    ) -> Result<TrustReceipt, TrustError> {
        let config = config.normalized();
        config.validate()?;
        let (current, tip) = self.read_trust_config().await?;

        let current_epoch = parse_epoch(&current.epoch);
        let proposed_epoch = parse_epoch(&config.epoch);
        if proposed_epoch < current_epoch {
            return Err(TrustError::EpochRegression {
                current: current.epoch,
                proposed: config.epoch,
            });
        }

        let message = format!("warp: trust update by {actor}");
        let (commit, snapshot_digest) = self
            .write_record(&config, Some(&tip), &message)
            .await?;
        self.cas(&commit, Some(&tip)).await?;

        let before: BTreeSet<&WriterId> = current.trusted_writers.iter().collect();
        let after: BTreeSet<&WriterId> = config.trusted_writers.iter().collect();
        let added = after.difference(&before).map(|w| (*w).clone()).collect();
        let removed = before.difference(&after).map(|w| (*w).clone()).collect();
        info!(commit = %commit, actor, "trust chain advanced");
        Ok(TrustReceipt {
            commit,
            snapshot_digest,
            added,
            removed,
            epoch: config.epoch,
        })
    }

    /// Reads the live document and the tip it came from.
    ///
    /// # Errors
    /// [`TrustError::NotFound`] when no chain exists.
    pub async fn read_trust_config(&self) -> Result<(TrustConfig, Oid), TrustError> {
        let tip = self
            .store
            .read_ref(&self.ref_name)
            .await?
            .ok_or(TrustError::NotFound)?;
        let config = self.read_trust_config_at_commit(&tip).await?;
        Ok((config, tip))
    }

    /// Reads the document pinned at `commit`.
    ///
    /// # Errors
    /// [`TrustError::PinInvalid`] when the commit does not resolve to a
    /// readable, valid trust record.
    pub async fn read_trust_config_at_commit(
        &self,
        commit: &Oid,
    ) -> Result<TrustConfig, TrustError> {
        let invalid = || TrustError::PinInvalid {
            pin: commit.clone(),
        };
        let tree = self
            .store
            .get_commit_tree(commit)
            .await
            .map_err(|_| invalid())?;
        let entries = self.store.read_tree_oids(&tree).await.map_err(|_| invalid())?;
        let blob = entries.get(TRUST_BLOB_NAME).ok_or_else(invalid)?;
        let bytes = self.store.read_blob(blob).await.map_err(|_| invalid())?;
        TrustConfig::decode(&bytes).map_err(|_| invalid())
    }

    /// Walks the chain tip→genesis, bounded by `max_walk` (default 1000).
    ///
    /// # Errors
    /// [`TrustError::NotFound`] when no chain exists; store errors
    /// otherwise.
    pub async fn get_trust_history(
        &self,
        max_walk: Option<usize>,
    ) -> Result<Vec<TrustHistoryEntry>, TrustError> {
        let budget = max_walk.unwrap_or(1000);
        let (_, tip) = self.read_trust_config().await?;
        let mut out = Vec::new();
        let mut cursor = Some(tip);
        while let Some(commit) = cursor {
            if out.len() >= budget {
                break;
            }
            let config = self.read_trust_config_at_commit(&commit).await?;
            let info = self.store.get_node_info(&commit).await?;
            cursor = info.parents.first().cloned();
            out.push(TrustHistoryEntry {
                commit,
                config,
                message: info.message,
            });
        }
        Ok(out)
    }

    /// Reports configuration problems without failing.
    pub async fn diagnose(&self, pin: Option<&Oid>) -> Vec<TrustDiagnostic> {
        let mut findings = Vec::new();
        match self.read_trust_config().await {
            Err(TrustError::NotFound) => {
                findings.push(TrustDiagnostic {
                    code: "TRUST_REF_MISSING",
                    message: format!("no trust record at {}", self.ref_name),
                });
                return findings;
            }
            Err(err) => {
                findings.push(TrustDiagnostic {
                    code: "TRUST_RECORD_UNREADABLE",
                    message: err.to_string(),
                });
                return findings;
            }
            Ok((config, _)) => {
                if config.trusted_writers.is_empty() {
                    findings.push(TrustDiagnostic {
                        code: "TRUST_WRITERS_EMPTY",
                        message: "trusted writer list is empty".to_owned(),
                    });
                }
            }
        }
        if let Some(pin) = pin {
            if let Err(err) = self.read_trust_config_at_commit(pin).await {
                findings.push(TrustDiagnostic {
                    code: "TRUST_PIN_INVALID",
                    message: err.to_string(),
                });
            }
        }
        findings
    }

    async fn write_record(
        &self,
        config: &TrustConfig,
        parent: Option<&Oid>,
        message: &str,
    ) -> Result<(Oid, Oid), TrustError> {
        let blob = self.store.write_blob(&config.canonical_json()).await?;
        let tree = self
            .store
            .write_tree(&[TreeEntry::blob(TRUST_BLOB_NAME, blob.clone())])
            .await?;
        let parents: Vec<Oid> = parent.cloned().into_iter().collect();
        let commit = self
            .store
            .commit_node_with_tree(&tree, &parents, message)
            .await?;
        Ok((commit, blob))
    }

    async fn cas(&self, new: &Oid, expected: Option<&Oid>) -> Result<(), TrustError> {
        match self
            .store
            .compare_and_swap_ref(&self.ref_name, new, expected)
            .await
        {
            Ok(()) => Ok(()),
            Err(StoreError::RefConflict { .. }) => Err(TrustError::RefConflict),
            Err(err) => Err(TrustError::Store(err)),
        }
    }
}
