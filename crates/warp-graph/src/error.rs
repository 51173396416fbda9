// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Facade error taxonomy and cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use warp_core::{PatchError, ReduceError, StateCodecError};
use warp_store::StoreError;
use warp_sync::{AuthError, SyncError};
use warp_trust::TrustError;

/// Cooperative cancellation signal.
///
/// Long operations check the token at suspension points and stop with
/// [`WarpError::Canceled`]. Whole pointer advances that already completed
/// stay completed; nothing else is persisted.
#[derive(Clone, Default, Debug)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a live (not yet canceled) token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// `true` once cancellation has been requested.
    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Errors with [`WarpError::Canceled`] once canceled.
    pub(crate) fn check(&self) -> Result<(), WarpError> {
        if self.is_canceled() {
            return Err(WarpError::Canceled);
        }
        Ok(())
    }
}

/// Checks an optional token.
pub(crate) fn check_cancel(token: Option<&CancelToken>) -> Result<(), WarpError> {
    token.map_or(Ok(()), CancelToken::check)
}

/// Everything a facade operation can fail with.
#[derive(Debug, thiserror::Error)]
pub enum WarpError {
    /// Caller handed the facade something unusable.
    #[error("[E_USAGE] {0}")]
    Usage(String),

    /// A named entity does not exist.
    #[error("[E_NOT_FOUND] {what}")]
    NotFound {
        /// What was missing.
        what: String,
    },

    /// A queried node does not exist in the materialized state.
    #[error("[E_NODE_NOT_FOUND] node {node:?} is not visible")]
    NodeNotFound {
        /// The missing node id.
        node: String,
    },

    /// The on-disk data is from an incompatible schema.
    #[error("[E_SCHEMA_MISMATCH] {reason}")]
    SchemaMismatch {
        /// What did not line up.
        reason: String,
    },

    /// A pointer CAS lost repeatedly and the retry budget ran out.
    #[error("[E_REF_CONFLICT] pointer {name} kept moving; retries exhausted")]
    RefConflict {
        /// The contested pointer.
        name: String,
    },

    /// The operation needs a materialized state first.
    #[error("[E_NO_STATE] materialize() the graph before this operation")]
    NoState,

    /// The operation was canceled at a suspension point.
    #[error("[E_CANCELED] operation canceled")]
    Canceled,

    /// Invariant breach that should never happen; always a bug.
    #[error("[E_INTERNAL] {0}")]
    Internal(String),

    /// Object-store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Patch decode/validation failure.
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// Reducer batch rejection.
    #[error(transparent)]
    Reduce(#[from] ReduceError),

    /// Canonical state codec failure.
    #[error(transparent)]
    Codec(#[from] StateCodecError),

    /// Sync chain/transfer failure.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Transport auth rejection.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Trust chain failure.
    #[error(transparent)]
    Trust(#[from] TrustError),
}

impl WarpError {
    /// The stable error code embedded in the message, e.g. `E_REF_CONFLICT`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Usage(_) => "E_USAGE",
            Self::NotFound { .. } => "E_NOT_FOUND",
            Self::NodeNotFound { .. } => "E_NODE_NOT_FOUND",
            Self::SchemaMismatch { .. } => "E_SCHEMA_MISMATCH",
            Self::RefConflict { .. } => "E_REF_CONFLICT",
            Self::NoState => "E_NO_STATE",
            Self::Canceled => "E_CANCELED",
            Self::Internal(_) => "E_INTERNAL",
            Self::Store(_) => "E_STORE",
            Self::Patch(_) | Self::Codec(_) => "E_SCHEMA_MISMATCH",
            Self::Reduce(_) => "E_SCHEMA_MISMATCH",
            Self::Sync(_) => "E_SYNC",
            Self::Auth(_) => "E_AUTH",
            Self::Trust(_) => "E_TRUST",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_trips_once() {
        let token = CancelToken::new();
        assert!(token.check().is_ok());
        token.cancel();
        assert!(matches!(token.check(), Err(WarpError::Canceled)));
        // Clones share the flag.
        let clone = token.clone();
        assert!(clone.is_canceled());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(WarpError::NoState.code(), "E_NO_STATE");
        assert_eq!(
            WarpError::RefConflict {
                name: "refs/warp/g/writers/w".to_owned()
            }
            .code(),
            "E_REF_CONFLICT"
        );
    }
}
