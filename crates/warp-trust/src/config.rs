// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The trust document: schema, validation, canonical form.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use warp_core::{to_canonical_json, WriterId};

use crate::TrustError;

/// File name of the trust blob inside a trust commit's tree.
pub const TRUST_BLOB_NAME: &str = "trust.json";

/// The only supported trust schema version.
pub const TRUST_SCHEMA_VERSION: u32 = 1;

/// Permit every writer; absence from the list is noted, not fatal.
pub const POLICY_ANY: &str = "any";

/// Reject any writer absent from the trusted list.
pub const POLICY_ALL_WRITERS_MUST_BE_TRUSTED: &str = "all_writers_must_be_trusted";

/// Policies this schema version accepts.
pub const POLICY_ALLOWLIST: [&str; 2] = [POLICY_ANY, POLICY_ALL_WRITERS_MUST_BE_TRUSTED];

/// Policy names parked for future schema versions. Using one is a distinct
/// error from an arbitrary typo, so tooling can suggest an upgrade.
pub const RESERVED_POLICIES: [&str; 2] = ["quorum", "threshold"];

/// A validated trust document (`trust.json`).
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustConfig {
    /// Path to the allowed-signers file consumed by signature tooling.
    pub allowed_signers_path: String,
    /// ISO-8601 epoch; must never move backwards along the chain.
    pub epoch: String,
    /// Trust policy; see [`POLICY_ALLOWLIST`].
    pub policy: String,
    /// Signatures required per receipt.
    pub required_signatures: u32,
    /// Sorted, deduplicated, trimmed writer list.
    pub trusted_writers: Vec<WriterId>,
    /// Schema version; must be [`TRUST_SCHEMA_VERSION`].
    pub version: u32,
}

impl TrustConfig {
    /// Returns a copy with the writer list trimmed, sorted, and deduplicated.
    pub fn normalized(mut self) -> Self {
        let mut writers: Vec<WriterId> = self
            .trusted_writers
            .iter()
            .filter_map(|writer| WriterId::new(writer.as_str().trim()).ok())
            .collect();
        writers.sort();
        writers.dedup();
        self.trusted_writers = writers;
        self
    }

    /// Validates the document against the schema rules.
    ///
    /// # Errors
    /// [`TrustError::PolicyReserved`] for parked policy names,
    /// [`TrustError::SchemaInvalid`] for everything else.
    pub fn validate(&self) -> Result<(), TrustError> {
        if self.version != TRUST_SCHEMA_VERSION {
            return Err(TrustError::SchemaInvalid {
                reason: format!(
                    "version must be exactly {TRUST_SCHEMA_VERSION}, got {}",
                    self.version
                ),
            });
        }
        if RESERVED_POLICIES.contains(&self.policy.as_str()) {
            return Err(TrustError::PolicyReserved {
                policy: self.policy.clone(),
            });
        }
        if !POLICY_ALLOWLIST.contains(&self.policy.as_str()) {
            return Err(TrustError::SchemaInvalid {
                reason: format!("unknown policy {:?}", self.policy),
            });
        }
        if self.epoch.trim().is_empty() {
            return Err(TrustError::SchemaInvalid {
                reason: "epoch must be non-empty".to_owned(),
            });
        }
        if parse_epoch(&self.epoch).is_none() {
            return Err(TrustError::SchemaInvalid {
                reason: format!("epoch {:?} is not ISO-8601", self.epoch),
            });
        }
        let mut previous: Option<&WriterId> = None;
        for writer in &self.trusted_writers {
            if writer.as_str().trim() != writer.as_str() {
                return Err(TrustError::SchemaInvalid {
                    reason: format!("writer {:?} is not trimmed", writer.as_str()),
                });
            }
            if let Some(prev) = previous {
                if prev >= writer {
                    return Err(TrustError::SchemaInvalid {
                        reason: "trustedWriters must be sorted and unique".to_owned(),
                    });
                }
            }
            previous = Some(writer);
        }
        Ok(())
    }

    /// Canonical JSON bytes — the exact blob content on disk.
    pub fn canonical_json(&self) -> Vec<u8> {
        to_canonical_json(self).unwrap_or_default()
    }

    /// Parses and validates a trust blob.
    ///
    /// # Errors
    /// [`TrustError::SchemaInvalid`] for undecodable JSON; validation
    /// errors otherwise.
    pub fn decode(bytes: &[u8]) -> Result<Self, TrustError> {
        let config: Self =
            serde_json::from_slice(bytes).map_err(|err| TrustError::SchemaInvalid {
                reason: format!("undecodable trust.json: {err}"),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// `true` if `writer` is on the trusted list.
    pub fn is_trusted(&self, writer: &WriterId) -> bool {
        self.trusted_writers.binary_search(writer).is_ok()
    }
}

/// Parses an ISO-8601 epoch: RFC 3339, or a bare `YYYY-MM-DD` date (taken
/// as midnight UTC). Returns `None` when neither form parses.
pub fn parse_epoch(epoch: &str) -> Option<DateTime<Utc>> {
    if let Ok(stamp) = DateTime::parse_from_rfc3339(epoch) {
        return Some(stamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(epoch, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
