// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Writer allowlist.
//!
//! When configured, every writer appearing in a sync payload is checked
//! against the list. Enforce mode rejects with `FORBIDDEN_WRITER`; log-only
//! mode lets the patch through but counts and logs the violation, which is
//! how operators stage a rollout before flipping enforcement on.

use std::collections::BTreeSet;

use tracing::warn;
use warp_core::WriterId;

use crate::envelope::AuthError;
use crate::messages::PatchTransfer;

/// What to do with an unlisted writer.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AllowlistMode {
    /// Reject the request.
    Enforce,
    /// Let it pass; count and log.
    LogOnly,
}

/// Optional writer allowlist with a violation counter.
#[derive(Clone, Debug)]
pub struct WriterAllowlist {
    allowed: Option<BTreeSet<WriterId>>,
    mode: AllowlistMode,
    violations: u64,
}

impl WriterAllowlist {
    /// No list configured: every writer passes, nothing is counted.
    pub fn allow_all() -> Self {
        Self {
            allowed: None,
            mode: AllowlistMode::Enforce,
            violations: 0,
        }
    }

    /// Configures a list with the given mode.
    pub fn new(writers: impl IntoIterator<Item = WriterId>, mode: AllowlistMode) -> Self {
        Self {
            allowed: Some(writers.into_iter().collect()),
            mode,
            violations: 0,
        }
    }

    /// Checks a single writer.
    ///
    /// # Errors
    /// [`AuthError::ForbiddenWriter`] in enforce mode for unlisted writers.
    pub fn check(&mut self, writer: &WriterId) -> Result<(), AuthError> {
        let Some(allowed) = &self.allowed else {
            return Ok(());
        };
        if allowed.contains(writer) {
            return Ok(());
        }
        self.violations += 1;
        match self.mode {
            AllowlistMode::Enforce => Err(AuthError::ForbiddenWriter {
                writer: writer.as_str().to_owned(),
            }),
            AllowlistMode::LogOnly => {
                warn!(writer = writer.as_str(), "unlisted writer passed (log-only)");
                Ok(())
            }
        }
    }

    /// Checks every writer in a transfer batch.
    ///
    /// # Errors
    /// First [`AuthError::ForbiddenWriter`] in enforce mode.
    pub fn check_transfers(&mut self, patches: &[PatchTransfer]) -> Result<(), AuthError> {
        for transfer in patches {
            self.check(&transfer.writer)?;
        }
        Ok(())
    }

    /// Unlisted-writer sightings so far (both modes).
    pub fn violations(&self) -> u64 {
        self.violations
    }
}
