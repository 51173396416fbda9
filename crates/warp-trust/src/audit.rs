// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Audit receipt chains.
//!
//! Each writer keeps a chain of receipts under
//! `refs/warp/<g>/audit/<writer>`: one commit per attested patch, the
//! commit's tree holding a canonical `receipt.json`. A receipt binds the
//! patch blob digest to the writer under an HMAC-SHA-256 signature and
//! names the previous receipt commit, so the verifier can confirm both the
//! signature and the linkage while walking tip→genesis.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use warp_core::{to_canonical_json, WriterId};
use warp_store::{CryptoPort, HashAlgorithm, ObjectStore, Oid, TreeEntry};

use crate::TrustError;

/// File name of the receipt blob inside an audit commit's tree.
pub const RECEIPT_BLOB_NAME: &str = "receipt.json";

/// Signing domain for receipt payloads.
const RECEIPT_DOMAIN: &str = "warp-audit-v1";

/// Pointer name of a writer's audit chain.
fn audit_ref(graph: &str, writer: &WriterId) -> String {
    format!("refs/warp/{graph}/audit/{}", writer.as_str())
}

/// Pointer prefix under which every audit chain of a graph lives.
fn audit_prefix(graph: &str) -> String {
    format!("refs/warp/{graph}/audit/")
}

/// A signed attestation linking one patch to its producing writer.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReceipt {
    /// Key id the signature was produced under.
    pub key_id: String,
    /// Digest of the attested patch blob.
    pub patch_sha: Oid,
    /// Previous receipt commit, `None` for the chain genesis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_receipt: Option<Oid>,
    /// Lowercase-hex HMAC-SHA-256 over the canonical payload.
    pub signature: String,
    /// Trust-chain commit the receipt was issued under, when pinned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_commit: Option<Oid>,
    /// Attesting writer.
    pub writer: WriterId,
}

impl AuditReceipt {
    fn payload(&self) -> String {
        format!(
            "{RECEIPT_DOMAIN}|{}|{}|{}|{}",
            self.writer.as_str(),
            self.patch_sha,
            self.prev_receipt
                .as_ref()
                .map_or("genesis", Oid::as_str),
            self.trust_commit.as_ref().map_or("live", Oid::as_str),
        )
    }
}

/// Chain verdicts, worst-first in the summary ordering.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ChainStatus {
    /// Every link verified down to genesis.
    Valid,
    /// At least one link verified, but the walk could not finish.
    Partial,
    /// A link failed verification.
    Invalid,
}

/// Verification report for one writer's chain.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ChainReport {
    /// The writer whose chain was walked.
    pub writer: WriterId,
    /// Overall verdict.
    pub status: ChainStatus,
    /// Number of receipts that verified.
    pub verified: usize,
    /// Accumulated per-link errors.
    pub errors: Vec<String>,
}

/// Whole-graph verification summary.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AuditSummary {
    /// Chains inspected.
    pub total: usize,
    /// Chains fully valid.
    pub valid: usize,
    /// Chains partially valid.
    pub partial: usize,
    /// Chains with verification failures.
    pub invalid: usize,
    /// Per-chain reports in writer order.
    pub chains: Vec<ChainReport>,
}

/// Audit receipt producer + verifier bound to one graph.
pub struct AuditVerifier {
    store: Arc<dyn ObjectStore>,
    crypto: Arc<dyn CryptoPort>,
    graph: String,
    /// `key-id → key bytes` for signature verification.
    keys: BTreeMap<String, Vec<u8>>,
    /// Walk budget per chain.
    max_walk: usize,
}

impl AuditVerifier {
    /// Binds a verifier to `graph`.
    pub fn new(store: Arc<dyn ObjectStore>, crypto: Arc<dyn CryptoPort>, graph: &str) -> Self {
        Self {
            store,
            crypto,
            graph: graph.to_owned(),
            keys: BTreeMap::new(),
            max_walk: 1000,
        }
    }

    /// Registers a verification key.
    pub fn add_key(&mut self, key_id: impl Into<String>, key: impl Into<Vec<u8>>) {
        self.keys.insert(key_id.into(), key.into());
    }

    /// Caps the per-chain walk.
    pub fn with_max_walk(mut self, max_walk: usize) -> Self {
        self.max_walk = max_walk;
        self
    }

    /// Appends a signed receipt for `patch_sha` to `writer`'s chain.
    ///
    /// # Errors
    /// Store failures; [`TrustError::RefConflict`] on a lost CAS.
    pub async fn append_receipt(
        &self,
        writer: &WriterId,
        patch_sha: &Oid,
        key_id: &str,
        key: &[u8],
        trust_commit: Option<&Oid>,
    ) -> Result<Oid, TrustError> {
        let ref_name = audit_ref(&self.graph, writer);
        let prev = self.store.read_ref(&ref_name).await?;
        let mut receipt = AuditReceipt {
            key_id: key_id.to_owned(),
            patch_sha: patch_sha.clone(),
            prev_receipt: prev.clone(),
            signature: String::new(),
            trust_commit: trust_commit.cloned(),
            writer: writer.clone(),
        };
        receipt.signature = hex::encode(self.crypto.hmac(
            HashAlgorithm::Sha256,
            key,
            receipt.payload().as_bytes(),
        ));

        let blob = self
            .store
            .write_blob(&to_canonical_json(&receipt).unwrap_or_default())
            .await?;
        let tree = self
            .store
            .write_tree(&[TreeEntry::blob(RECEIPT_BLOB_NAME, blob)])
            .await?;
        let parents: Vec<Oid> = prev.clone().into_iter().collect();
        let commit = self
            .store
            .commit_node_with_tree(&tree, &parents, "warp: audit receipt")
            .await?;
        match self
            .store
            .compare_and_swap_ref(&ref_name, &commit, prev.as_ref())
            .await
        {
            Ok(()) => Ok(commit),
            Err(warp_store::StoreError::RefConflict { .. }) => Err(TrustError::RefConflict),
            Err(err) => Err(TrustError::Store(err)),
        }
    }

    /// Walks and verifies one writer's chain.
    ///
    /// # Errors
    /// Store failures on the initial pointer read only; verification
    /// problems are reported in the [`ChainReport`], not as errors.
    pub async fn verify_writer(&self, writer: &WriterId) -> Result<ChainReport, TrustError> {
        let ref_name = audit_ref(&self.graph, writer);
        let Some(tip) = self.store.read_ref(&ref_name).await? else {
            return Ok(ChainReport {
                writer: writer.clone(),
                status: ChainStatus::Invalid,
                verified: 0,
                errors: vec![format!("no audit chain at {ref_name}")],
            });
        };

        let mut verified = 0usize;
        let mut errors = Vec::new();
        let mut truncated = false;
        let mut cursor = Some(tip);
        let mut walked = 0usize;

        while let Some(commit) = cursor.take() {
            if walked >= self.max_walk {
                truncated = true;
                errors.push(format!("walk budget {} exhausted", self.max_walk));
                break;
            }
            walked += 1;

            let receipt = match self.read_receipt(&commit).await {
                Ok(receipt) => receipt,
                Err(err) => {
                    truncated = true;
                    errors.push(format!("receipt at {commit} unreadable: {err}"));
                    break;
                }
            };

            if let Err(reason) = self.check_receipt(writer, &commit, &receipt).await {
                errors.push(reason);
                return Ok(ChainReport {
                    writer: writer.clone(),
                    status: ChainStatus::Invalid,
                    verified,
                    errors,
                });
            }
            verified += 1;
            cursor = receipt.prev_receipt;
        }

        let status = if truncated {
            if verified > 0 {
                ChainStatus::Partial
            } else {
                ChainStatus::Invalid
            }
        } else {
            ChainStatus::Valid
        };
        debug!(writer = writer.as_str(), verified, ?status, "audit chain walked");
        Ok(ChainReport {
            writer: writer.clone(),
            status,
            verified,
            errors,
        })
    }

    /// Verifies every audit chain of the graph.
    ///
    /// # Errors
    /// Store failures while listing pointers.
    pub async fn verify_graph(&self) -> Result<AuditSummary, TrustError> {
        let prefix = audit_prefix(&self.graph);
        let refs = self.store.list_refs(&prefix).await?;
        let mut chains = Vec::new();
        for name in refs {
            let Some(raw) = name.strip_prefix(&prefix) else {
                continue;
            };
            let Ok(writer) = WriterId::new(raw) else {
                continue;
            };
            chains.push(self.verify_writer(&writer).await?);
        }
        let valid = chains
            .iter()
            .filter(|c| c.status == ChainStatus::Valid)
            .count();
        let partial = chains
            .iter()
            .filter(|c| c.status == ChainStatus::Partial)
            .count();
        let invalid = chains
            .iter()
            .filter(|c| c.status == ChainStatus::Invalid)
            .count();
        Ok(AuditSummary {
            total: chains.len(),
            valid,
            partial,
            invalid,
            chains,
        })
    }

    async fn read_receipt(&self, commit: &Oid) -> Result<AuditReceipt, TrustError> {
        let tree = self.store.get_commit_tree(commit).await?;
        let entries = self.store.read_tree_oids(&tree).await?;
        let blob = entries
            .get(RECEIPT_BLOB_NAME)
            .ok_or_else(|| TrustError::PinInvalid { pin: commit.clone() })?;
        let bytes = self.store.read_blob(blob).await?;
        serde_json::from_slice(&bytes).map_err(|err| TrustError::SchemaInvalid {
            reason: format!("undecodable receipt: {err}"),
        })
    }

    async fn check_receipt(
        &self,
        writer: &WriterId,
        commit: &Oid,
        receipt: &AuditReceipt,
    ) -> Result<(), String> {
        // 1. The receipt must belong to the chain's writer.
        if &receipt.writer != writer {
            return Err(format!(
                "receipt at {commit} names writer {:?}, chain belongs to {:?}",
                receipt.writer.as_str(),
                writer.as_str()
            ));
        }

        // 2. The linkage must match the commit's parent.
        let info = self
            .store
            .get_node_info(commit)
            .await
            .map_err(|err| format!("commit {commit} unreadable: {err}"))?;
        if info.parents.first() != receipt.prev_receipt.as_ref() {
            return Err(format!(
                "receipt at {commit} links {:?} but the commit's parent is {:?}",
                receipt.prev_receipt, info.parents
            ));
        }

        // 3. The attested patch must exist.
        let exists = self
            .store
            .node_exists(&receipt.patch_sha)
            .await
            .map_err(|err| err.to_string())?;
        if !exists {
            return Err(format!(
                "receipt at {commit} attests missing patch {}",
                receipt.patch_sha
            ));
        }

        // 4. The signature must verify under the named key.
        let Some(key) = self.keys.get(&receipt.key_id) else {
            return Err(format!(
                "receipt at {commit} signed under unknown key id {:?}",
                receipt.key_id
            ));
        };
        let expected = hex::encode(self.crypto.hmac(
            HashAlgorithm::Sha256,
            key,
            receipt.payload().as_bytes(),
        ));
        if !self
            .crypto
            .timing_safe_equal(expected.as_bytes(), receipt.signature.as_bytes())
        {
            return Err(format!("receipt at {commit} carries a bad signature"));
        }
        Ok(())
    }
}

/// Convenience: verify a single writer's chain with an ad-hoc key table.
///
/// # Errors
/// Store failures on the pointer read.
pub async fn verify_writer(
    store: Arc<dyn ObjectStore>,
    crypto: Arc<dyn CryptoPort>,
    graph: &str,
    writer: &WriterId,
    keys: &BTreeMap<String, Vec<u8>>,
) -> Result<ChainReport, TrustError> {
    let mut verifier = AuditVerifier::new(store, crypto, graph);
    for (key_id, key) in keys {
        verifier.add_key(key_id.clone(), key.clone());
    }
    verifier.verify_writer(writer).await
}

/// Convenience: verify every chain with an ad-hoc key table.
///
/// # Errors
/// Store failures while listing pointers.
pub async fn verify_graph(
    store: Arc<dyn ObjectStore>,
    crypto: Arc<dyn CryptoPort>,
    graph: &str,
    keys: &BTreeMap<String, Vec<u8>>,
) -> Result<AuditSummary, TrustError> {
    let mut verifier = AuditVerifier::new(store, crypto, graph);
    for (key_id, key) in keys {
        verifier.add_key(key_id.clone(), key.clone());
    }
    verifier.verify_graph().await
}
