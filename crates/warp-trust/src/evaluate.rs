// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Pure writer evaluation under a trust policy.

use std::collections::BTreeMap;

use warp_core::WriterId;

use crate::config::{TrustConfig, POLICY_ALL_WRITERS_MUST_BE_TRUSTED};

/// Outcome for a single writer.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WriterVerdict {
    /// On the trusted list.
    Trusted,
    /// Absent from the list, permitted by policy `any`.
    PermittedUntrusted,
    /// Absent from the list, rejected by the policy.
    Rejected,
}

/// Result of evaluating a set of writers against a config.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct WriterEvaluation {
    /// Every evaluated writer, sorted and deduplicated.
    pub evaluated_writers: Vec<WriterId>,
    /// Writers absent from the trusted list, sorted.
    pub untrusted_writers: Vec<WriterId>,
    /// Per-writer verdicts with human-readable reasons.
    pub explanations: BTreeMap<WriterId, (WriterVerdict, String)>,
    /// `false` iff any writer was rejected.
    pub policy_satisfied: bool,
}

/// Evaluates `writer_ids` against `config`. Pure — no I/O, no clock.
pub fn evaluate_writers(writer_ids: &[WriterId], config: &TrustConfig) -> WriterEvaluation {
    let mut evaluated: Vec<WriterId> = writer_ids.to_vec();
    evaluated.sort();
    evaluated.dedup();

    let strict = config.policy == POLICY_ALL_WRITERS_MUST_BE_TRUSTED;
    let mut untrusted = Vec::new();
    let mut explanations = BTreeMap::new();
    let mut policy_satisfied = true;

    for writer in &evaluated {
        if config.is_trusted(writer) {
            explanations.insert(
                writer.clone(),
                (WriterVerdict::Trusted, "on the trusted list".to_owned()),
            );
            continue;
        }
        untrusted.push(writer.clone());
        if strict {
            policy_satisfied = false;
            explanations.insert(
                writer.clone(),
                (
                    WriterVerdict::Rejected,
                    format!(
                        "not on the trusted list; policy {:?} rejects unlisted writers",
                        config.policy
                    ),
                ),
            );
        } else {
            explanations.insert(
                writer.clone(),
                (
                    WriterVerdict::PermittedUntrusted,
                    format!(
                        "not on the trusted list; policy {:?} permits every writer",
                        config.policy
                    ),
                ),
            );
        }
    }

    WriterEvaluation {
        evaluated_writers: evaluated,
        untrusted_writers: untrusted,
        explanations,
        policy_satisfied,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{POLICY_ANY, TRUST_SCHEMA_VERSION};

    fn writer(id: &str) -> WriterId {
        WriterId::new(id).unwrap()
    }

    fn config(policy: &str, writers: &[&str]) -> TrustConfig {
        TrustConfig {
            allowed_signers_path: String::new(),
            epoch: "2025-01-01".to_owned(),
            policy: policy.to_owned(),
            required_signatures: 1,
            trusted_writers: writers.iter().map(|w| writer(w)).collect(),
            version: TRUST_SCHEMA_VERSION,
        }
    }

    #[test]
    fn any_policy_permits_but_marks_unlisted_writers() {
        let result = evaluate_writers(
            &[writer("mallory"), writer("alice"), writer("mallory")],
            &config(POLICY_ANY, &["alice"]),
        );
        assert_eq!(
            result.evaluated_writers,
            vec![writer("alice"), writer("mallory")]
        );
        assert_eq!(result.untrusted_writers, vec![writer("mallory")]);
        assert!(result.policy_satisfied);
        assert_eq!(
            result.explanations[&writer("mallory")].0,
            WriterVerdict::PermittedUntrusted
        );
    }

    #[test]
    fn strict_policy_rejects_unlisted_writers() {
        let result = evaluate_writers(
            &[writer("alice"), writer("mallory")],
            &config(POLICY_ALL_WRITERS_MUST_BE_TRUSTED, &["alice"]),
        );
        assert!(!result.policy_satisfied);
        assert_eq!(
            result.explanations[&writer("mallory")].0,
            WriterVerdict::Rejected
        );
        assert_eq!(
            result.explanations[&writer("alice")].0,
            WriterVerdict::Trusted
        );
    }

    #[test]
    fn empty_input_is_trivially_satisfied() {
        let result = evaluate_writers(&[], &config(POLICY_ALL_WRITERS_MUST_BE_TRUSTED, &[]));
        assert!(result.evaluated_writers.is_empty());
        assert!(result.policy_satisfied);
    }
}
