// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The doctor: composable, bounded diagnostic checks.
//!
//! A [`Doctor`] runs an ordered list of checks against one handle under a
//! global deadline measured on the handle's injected clock. Checks past
//! the deadline are not run; each emits a `CHECK_SKIPPED_BUDGET_EXHAUSTED`
//! warning instead. A check that errors internally becomes a
//! `CHECK_INTERNAL_ERROR` finding with `data_integrity` impact — the
//! doctor itself never fails.
//!
//! Output ordering is stable: status (fail < warn < ok), then impact
//! (data integrity < security < operability < hygiene), then id.

use async_trait::async_trait;
use tracing::debug;
use warp_trust::TrustService;

use crate::error::WarpError;
use crate::handle::{MaterializeOpts, WarpGraph};

/// Default global deadline for a doctor run.
pub const DEFAULT_DOCTOR_DEADLINE_MS: i64 = 10_000;

/// Severity of a finding. Variant order *is* the report sort order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum CheckStatus {
    /// Something is broken.
    Fail,
    /// Something deserves attention.
    Warn,
    /// All good.
    Ok,
}

/// What a finding threatens. Variant order *is* the report sort order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Impact {
    /// Data could be wrong or lost.
    DataIntegrity,
    /// Trust or authentication is degraded.
    Security,
    /// Operations are impaired.
    Operability,
    /// Housekeeping.
    Hygiene,
}

/// Overall graph health derived from the findings.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Health {
    /// No warnings, no failures.
    Ok,
    /// Warnings only.
    Degraded,
    /// At least one failure.
    Failed,
}

/// One diagnostic result.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Finding {
    /// Check id the finding came from.
    pub id: String,
    /// Severity.
    pub status: CheckStatus,
    /// Stable machine code.
    pub code: String,
    /// What the finding threatens.
    pub impact: Impact,
    /// Human explanation.
    pub message: String,
    /// Suggested remediation, when one exists.
    pub fix: Option<String>,
    /// Supporting detail.
    pub evidence: Option<String>,
    /// Time the producing check took.
    pub duration_ms: u64,
}

impl Finding {
    fn ok(id: &str, code: &str, impact: Impact, message: impl Into<String>) -> Self {
        Self {
            id: id.to_owned(),
            status: CheckStatus::Ok,
            code: code.to_owned(),
            impact,
            message: message.into(),
            fix: None,
            evidence: None,
            duration_ms: 0,
        }
    }

    fn warn(id: &str, code: &str, impact: Impact, message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Warn,
            ..Self::ok(id, code, impact, message)
        }
    }

    fn fail(id: &str, code: &str, impact: Impact, message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Fail,
            ..Self::ok(id, code, impact, message)
        }
    }

    /// Attaches a remediation hint.
    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }

    /// Attaches supporting evidence.
    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }
}

/// One diagnostic check.
#[async_trait]
pub trait DoctorCheck: Send + Sync {
    /// Stable check id (also the finding id).
    fn id(&self) -> &'static str;

    /// Runs the check. Returning an error is legal; the doctor converts
    /// it into a `CHECK_INTERNAL_ERROR` finding.
    async fn run(&self, graph: &mut WarpGraph) -> Result<Vec<Finding>, WarpError>;
}

/// A doctor run's sorted findings and derived health.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DoctorReport {
    /// Findings in canonical order.
    pub findings: Vec<Finding>,
    /// Derived health.
    pub health: Health,
}

impl DoctorReport {
    /// Exit code policy: `ok` → 0; otherwise 3, or 4 under `strict`.
    pub fn exit_code(&self, strict: bool) -> i32 {
        match self.health {
            Health::Ok => 0,
            Health::Degraded | Health::Failed => {
                if strict {
                    4
                } else {
                    3
                }
            }
        }
    }
}

/// An ordered list of checks bounded by a global deadline.
pub struct Doctor {
    checks: Vec<Box<dyn DoctorCheck>>,
    deadline_ms: i64,
}

impl Doctor {
    /// The stock check list: store ping, writer chains, checkpoint
    /// coverage, trust record, tombstone hygiene.
    pub fn new() -> Self {
        Self {
            checks: vec![
                Box::new(StorePingCheck),
                Box::new(WriterChainsCheck),
                Box::new(CheckpointCoverageCheck),
                Box::new(TrustRecordCheck),
                Box::new(TombstoneHygieneCheck),
            ],
            deadline_ms: DEFAULT_DOCTOR_DEADLINE_MS,
        }
    }

    /// No checks; compose with [`Doctor::push`].
    pub fn empty() -> Self {
        Self {
            checks: Vec::new(),
            deadline_ms: DEFAULT_DOCTOR_DEADLINE_MS,
        }
    }

    /// Appends a check to the ordered list.
    pub fn push(&mut self, check: Box<dyn DoctorCheck>) -> &mut Self {
        self.checks.push(check);
        self
    }

    /// Overrides the global deadline.
    pub fn with_deadline_ms(mut self, deadline_ms: i64) -> Self {
        self.deadline_ms = deadline_ms;
        self
    }

    /// Runs every check (deadline permitting) and assembles the report.
    pub async fn run(&self, graph: &mut WarpGraph) -> DoctorReport {
        let clock = graph.clock.clone();
        let started = clock.now_ms();
        let mut findings: Vec<Finding> = Vec::new();

        for check in &self.checks {
            let elapsed = clock.now_ms() - started;
            if elapsed > self.deadline_ms {
                findings.push(Finding::warn(
                    check.id(),
                    "CHECK_SKIPPED_BUDGET_EXHAUSTED",
                    Impact::Operability,
                    format!("skipped after {elapsed} ms (deadline {} ms)", self.deadline_ms),
                ));
                continue;
            }

            let check_started = clock.now_ms();
            let mut produced = match check.run(graph).await {
                Ok(produced) => produced,
                Err(err) => vec![Finding::fail(
                    check.id(),
                    "CHECK_INTERNAL_ERROR",
                    Impact::DataIntegrity,
                    format!("check failed internally: {err}"),
                )],
            };
            let duration_ms = u64::try_from(clock.now_ms() - check_started).unwrap_or(0);
            for finding in &mut produced {
                finding.duration_ms = duration_ms;
            }
            findings.append(&mut produced);
        }

        findings.sort_by(|a, b| {
            a.status
                .cmp(&b.status)
                .then_with(|| a.impact.cmp(&b.impact))
                .then_with(|| a.id.cmp(&b.id))
        });
        let health = if findings.iter().any(|f| f.status == CheckStatus::Fail) {
            Health::Failed
        } else if findings.iter().any(|f| f.status == CheckStatus::Warn) {
            Health::Degraded
        } else {
            Health::Ok
        };
        debug!(?health, findings = findings.len(), "doctor run complete");
        DoctorReport { findings, health }
    }
}

impl Default for Doctor {
    fn default() -> Self {
        Self::new()
    }
}

// ── stock checks ────────────────────────────────────────────────────────

struct StorePingCheck;

#[async_trait]
impl DoctorCheck for StorePingCheck {
    fn id(&self) -> &'static str {
        "store.ping"
    }

    async fn run(&self, graph: &mut WarpGraph) -> Result<Vec<Finding>, WarpError> {
        Ok(match graph.store.ping().await {
            Ok(()) => vec![Finding::ok(
                self.id(),
                "STORE_REACHABLE",
                Impact::Operability,
                "object store answers",
            )],
            Err(err) => vec![Finding::fail(
                self.id(),
                "STORE_UNREACHABLE",
                Impact::Operability,
                format!("object store did not answer: {err}"),
            )],
        })
    }
}

struct WriterChainsCheck;

#[async_trait]
impl DoctorCheck for WriterChainsCheck {
    fn id(&self) -> &'static str {
        "writers.chains"
    }

    async fn run(&self, graph: &mut WarpGraph) -> Result<Vec<Finding>, WarpError> {
        let frontier = graph.frontier().await?;
        let mut findings = Vec::new();
        for (writer, tip) in frontier.iter() {
            if let Err(err) = warp_sync::read_patch(graph.store.as_ref(), tip).await {
                findings.push(
                    Finding::fail(
                        self.id(),
                        "WRITER_TIP_UNREADABLE",
                        Impact::DataIntegrity,
                        format!("tip of writer {:?} does not decode: {err}", writer.as_str()),
                    )
                    .with_evidence(tip.to_string()),
                );
            }
        }
        if findings.is_empty() {
            findings.push(Finding::ok(
                self.id(),
                "WRITER_CHAINS_READABLE",
                Impact::DataIntegrity,
                format!("{} writer tip(s) decode cleanly", frontier.len()),
            ));
        }
        Ok(findings)
    }
}

struct CheckpointCoverageCheck;

#[async_trait]
impl DoctorCheck for CheckpointCoverageCheck {
    fn id(&self) -> &'static str {
        "checkpoint.coverage"
    }

    async fn run(&self, graph: &mut WarpGraph) -> Result<Vec<Finding>, WarpError> {
        if graph.load_checkpoint_info().await?.is_none() {
            return Ok(vec![Finding::warn(
                self.id(),
                "CHECKPOINT_MISSING",
                Impact::Operability,
                "no checkpoint exists; materialization always replays from genesis",
            )
            .with_fix("run create_checkpoint()")]);
        }

        let frontier = graph.frontier().await?;
        let mut uncovered = Vec::new();
        for (writer, tip) in frontier.iter() {
            if !graph.is_tip_covered(tip).await? {
                uncovered.push(writer.as_str().to_owned());
            }
        }
        Ok(if uncovered.is_empty() {
            vec![Finding::ok(
                self.id(),
                "CHECKPOINT_COVERS_TIPS",
                Impact::Operability,
                "every writer tip is covered by the latest checkpoint",
            )]
        } else {
            vec![Finding::warn(
                self.id(),
                "CHECKPOINT_BEHIND",
                Impact::Operability,
                format!("{} writer tip(s) not covered by the checkpoint", uncovered.len()),
            )
            .with_evidence(uncovered.join(", "))
            .with_fix("run create_checkpoint()")]
        })
    }
}

struct TrustRecordCheck;

#[async_trait]
impl DoctorCheck for TrustRecordCheck {
    fn id(&self) -> &'static str {
        "trust.record"
    }

    async fn run(&self, graph: &mut WarpGraph) -> Result<Vec<Finding>, WarpError> {
        let service = TrustService::new(graph.store.clone(), &graph.graph);
        let diagnostics = service.diagnose(None).await;
        if diagnostics.is_empty() {
            return Ok(vec![Finding::ok(
                self.id(),
                "TRUST_RECORD_OK",
                Impact::Security,
                "trust record present and well-formed",
            )]);
        }
        Ok(diagnostics
            .into_iter()
            .map(|diagnostic| {
                let status = if diagnostic.code == "TRUST_RECORD_UNREADABLE" {
                    CheckStatus::Fail
                } else {
                    CheckStatus::Warn
                };
                Finding {
                    id: self.id().to_owned(),
                    status,
                    code: diagnostic.code.to_owned(),
                    impact: Impact::Security,
                    message: diagnostic.message,
                    fix: None,
                    evidence: None,
                    duration_ms: 0,
                }
            })
            .collect())
    }
}

struct TombstoneHygieneCheck;

#[async_trait]
impl DoctorCheck for TombstoneHygieneCheck {
    fn id(&self) -> &'static str {
        "state.tombstones"
    }

    async fn run(&self, graph: &mut WarpGraph) -> Result<Vec<Finding>, WarpError> {
        graph.materialize(MaterializeOpts::default()).await?;
        let ratio = graph
            .cached_state()
            .map_or(0.0, warp_core::WarpState::tombstone_ratio);
        Ok(if ratio > 0.5 {
            vec![Finding::warn(
                self.id(),
                "TOMBSTONE_PRESSURE",
                Impact::Hygiene,
                format!("{:.0}% of dots are tombstoned", ratio * 100.0),
            )
            .with_fix("run run_gc() or create_checkpoint()")]
        } else {
            vec![Finding::ok(
                self.id(),
                "TOMBSTONES_BOUNDED",
                Impact::Hygiene,
                format!("tombstone ratio {ratio:.2}"),
            )]
        })
    }
}
