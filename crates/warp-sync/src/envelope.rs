// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! HMAC authentication envelope.
//!
//! Every sync request carries five headers: `sig-version`, `key-id`,
//! `timestamp` (ms since epoch), `nonce` (v4 UUID), and `signature`
//! (lowercase hex HMAC-SHA-256). The signed payload is
//!
//! ```text
//! warp-v1|<keyId>|<method>|<path>|<ts>|<nonce>|<content-type>|<sha256(body)>
//! ```
//!
//! Verification is a fixed pipeline: version → presence → header shapes →
//! timestamp window → key lookup → constant-time signature compare →
//! nonce claim. The nonce is claimed **last**: a request that fails any
//! earlier step never consumes it, so an attacker replaying garbage cannot
//! invalidate the legitimate request carrying the same nonce.

use std::collections::BTreeMap;

use tracing::warn;
use uuid::Uuid;
use warp_store::{ClockPort, CryptoPort, HashAlgorithm};

use crate::replay::NonceCache;

/// The only supported envelope version.
pub const SIG_VERSION: &str = "1";
/// Envelope version header.
pub const HEADER_SIG_VERSION: &str = "sig-version";
/// Key identifier header.
pub const HEADER_KEY_ID: &str = "key-id";
/// Millisecond timestamp header.
pub const HEADER_TIMESTAMP: &str = "timestamp";
/// v4 UUID nonce header.
pub const HEADER_NONCE: &str = "nonce";
/// Lowercase-hex HMAC-SHA-256 header.
pub const HEADER_SIGNATURE: &str = "signature";
/// Accepted clock skew, inclusive at the boundary.
pub const MAX_CLOCK_SKEW_MS: i64 = 300_000;

/// The five auth headers as they travel on the wire.
pub type AuthHeaders = BTreeMap<String, String>;

/// The request attributes bound into the signature.
#[derive(Clone, Copy, Debug)]
pub struct RequestContext<'a> {
    /// HTTP-ish method (`"POST"` for sync).
    pub method: &'a str,
    /// Request path (`"/warp/sync"` by convention).
    pub path: &'a str,
    /// Content type (`"application/json"`).
    pub content_type: &'a str,
    /// Raw request body.
    pub body: &'a [u8],
}

/// Envelope rejections, in pipeline order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// `sig-version` present but not `"1"`.
    #[error("[400 INVALID_VERSION] unsupported envelope version {found:?}")]
    InvalidVersion {
        /// The version the request declared.
        found: String,
    },

    /// One or more of the five auth headers is missing.
    #[error("[401 MISSING_AUTH] missing auth header {header}")]
    MissingAuth {
        /// First missing header name.
        header: &'static str,
    },

    /// `timestamp` is not an integer string.
    #[error("[400 MALFORMED_TIMESTAMP] timestamp is not an integer")]
    MalformedTimestamp,

    /// `nonce` is not a v4 UUID.
    #[error("[400 MALFORMED_NONCE] nonce is not a v4 uuid")]
    MalformedNonce,

    /// `signature` is not 64 lowercase hex characters.
    #[error("[400 MALFORMED_SIGNATURE] signature is not 64 hex chars")]
    MalformedSignature,

    /// Timestamp outside the ±300 000 ms window.
    #[error("[403 EXPIRED] timestamp skew {skew_ms} ms exceeds the window")]
    Expired {
        /// Observed |now − ts|.
        skew_ms: i64,
    },

    /// `key-id` is not in the key table.
    #[error("[401 UNKNOWN_KEY_ID] unknown key id {key_id:?}")]
    UnknownKeyId {
        /// The unrecognized key id.
        key_id: String,
    },

    /// Signature did not match.
    #[error("[401 INVALID_SIGNATURE] signature mismatch")]
    InvalidSignature,

    /// Nonce already claimed.
    #[error("[403 REPLAY] nonce already used")]
    Replay,

    /// A patch writer is not on the configured allowlist.
    #[error("[403 FORBIDDEN_WRITER] writer {writer:?} is not allowlisted")]
    ForbiddenWriter {
        /// The unlisted writer.
        writer: String,
    },
}

impl AuthError {
    /// Stable machine code for metrics and clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidVersion { .. } => "INVALID_VERSION",
            Self::MissingAuth { .. } => "MISSING_AUTH",
            Self::MalformedTimestamp => "MALFORMED_TIMESTAMP",
            Self::MalformedNonce => "MALFORMED_NONCE",
            Self::MalformedSignature => "MALFORMED_SIGNATURE",
            Self::Expired { .. } => "EXPIRED",
            Self::UnknownKeyId { .. } => "UNKNOWN_KEY_ID",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::Replay => "REPLAY",
            Self::ForbiddenWriter { .. } => "FORBIDDEN_WRITER",
        }
    }

    /// HTTP status the transport should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidVersion { .. }
            | Self::MalformedTimestamp
            | Self::MalformedNonce
            | Self::MalformedSignature => 400,
            Self::MissingAuth { .. } | Self::UnknownKeyId { .. } | Self::InvalidSignature => 401,
            Self::Expired { .. } | Self::Replay | Self::ForbiddenWriter { .. } => 403,
        }
    }
}

/// Builds the canonical signing payload.
pub fn canonical_payload(
    crypto: &dyn CryptoPort,
    key_id: &str,
    ctx: &RequestContext<'_>,
    timestamp_ms: i64,
    nonce: &str,
) -> String {
    let body_digest = crypto.hash_hex(HashAlgorithm::Sha256, ctx.body);
    format!(
        "warp-v1|{key_id}|{method}|{path}|{timestamp_ms}|{nonce}|{content_type}|{body_digest}",
        method = ctx.method,
        path = ctx.path,
        content_type = ctx.content_type,
    )
}

fn signature_hex(crypto: &dyn CryptoPort, key: &[u8], payload: &str) -> String {
    hex::encode(crypto.hmac(HashAlgorithm::Sha256, key, payload.as_bytes()))
}

/// Signs a request, minting a fresh v4 nonce and stamping `clock`'s now.
pub fn sign_request(
    crypto: &dyn CryptoPort,
    clock: &dyn ClockPort,
    key_id: &str,
    key: &[u8],
    ctx: &RequestContext<'_>,
) -> AuthHeaders {
    let timestamp_ms = clock.now_ms();
    let nonce = Uuid::new_v4().to_string();
    let payload = canonical_payload(crypto, key_id, ctx, timestamp_ms, &nonce);
    let signature = signature_hex(crypto, key, &payload);

    let mut headers = AuthHeaders::new();
    headers.insert(HEADER_SIG_VERSION.to_owned(), SIG_VERSION.to_owned());
    headers.insert(HEADER_KEY_ID.to_owned(), key_id.to_owned());
    headers.insert(HEADER_TIMESTAMP.to_owned(), timestamp_ms.to_string());
    headers.insert(HEADER_NONCE.to_owned(), nonce);
    headers.insert(HEADER_SIGNATURE.to_owned(), signature);
    headers
}

/// Shared-secret table: `key-id → key bytes`.
#[derive(Clone, Default, Debug)]
pub struct KeyTable(BTreeMap<String, Vec<u8>>);

impl KeyTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a key.
    pub fn insert(&mut self, key_id: impl Into<String>, key: impl Into<Vec<u8>>) {
        self.0.insert(key_id.into(), key.into());
    }

    fn get(&self, key_id: &str) -> Option<&[u8]> {
        self.0.get(key_id).map(Vec::as_slice)
    }
}

/// Server-side envelope verifier with replay cache and rejection counters.
pub struct Verifier {
    keys: KeyTable,
    nonces: NonceCache,
    rejections: BTreeMap<&'static str, u64>,
}

impl Verifier {
    /// Creates a verifier with the default nonce-cache capacity.
    pub fn new(keys: KeyTable) -> Self {
        Self {
            keys,
            nonces: NonceCache::default(),
            rejections: BTreeMap::new(),
        }
    }

    /// Creates a verifier with an explicit nonce-cache capacity.
    pub fn with_nonce_capacity(keys: KeyTable, capacity: usize) -> Self {
        Self {
            keys,
            nonces: NonceCache::new(capacity),
            rejections: BTreeMap::new(),
        }
    }

    /// Runs the verification pipeline over `headers` and `ctx`.
    ///
    /// # Errors
    /// The first failing step's [`AuthError`]. The nonce is claimed only
    /// when every step passes.
    pub fn verify(
        &mut self,
        crypto: &dyn CryptoPort,
        clock: &dyn ClockPort,
        headers: &AuthHeaders,
        ctx: &RequestContext<'_>,
    ) -> Result<(), AuthError> {
        self.verify_inner(crypto, clock, headers, ctx)
            .inspect_err(|err| {
                *self.rejections.entry(err.code()).or_insert(0) += 1;
                warn!(code = err.code(), status = err.http_status(), "sync auth rejected");
            })
    }

    fn verify_inner(
        &mut self,
        crypto: &dyn CryptoPort,
        clock: &dyn ClockPort,
        headers: &AuthHeaders,
        ctx: &RequestContext<'_>,
    ) -> Result<(), AuthError> {
        // 1. Version, when declared, must be exactly "1".
        if let Some(version) = headers.get(HEADER_SIG_VERSION) {
            if version != SIG_VERSION {
                return Err(AuthError::InvalidVersion {
                    found: version.clone(),
                });
            }
        }

        // 2. All five headers must be present.
        for header in [
            HEADER_SIG_VERSION,
            HEADER_KEY_ID,
            HEADER_TIMESTAMP,
            HEADER_NONCE,
            HEADER_SIGNATURE,
        ] {
            if !headers.contains_key(header) {
                return Err(AuthError::MissingAuth { header });
            }
        }
        let key_id = &headers[HEADER_KEY_ID];
        let timestamp = &headers[HEADER_TIMESTAMP];
        let nonce = &headers[HEADER_NONCE];
        let signature = &headers[HEADER_SIGNATURE];

        // 3. Header shapes.
        let timestamp_ms: i64 = timestamp
            .parse()
            .map_err(|_| AuthError::MalformedTimestamp)?;
        let is_v4 = Uuid::parse_str(nonce)
            .map(|u| u.get_version_num() == 4)
            .unwrap_or(false);
        if !is_v4 {
            return Err(AuthError::MalformedNonce);
        }
        let hex_shaped = signature.len() == 64
            && signature
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !hex_shaped {
            return Err(AuthError::MalformedSignature);
        }

        // 4. Freshness: the boundary itself is accepted.
        let skew_ms = (clock.now_ms() - timestamp_ms).abs();
        if skew_ms > MAX_CLOCK_SKEW_MS {
            return Err(AuthError::Expired { skew_ms });
        }

        // 5. Key lookup.
        let key = self.keys.get(key_id).ok_or_else(|| AuthError::UnknownKeyId {
            key_id: key_id.clone(),
        })?;

        // 6. Constant-time signature compare.
        let payload = canonical_payload(crypto, key_id, ctx, timestamp_ms, nonce);
        let expected = signature_hex(crypto, key, &payload);
        if !crypto.timing_safe_equal(expected.as_bytes(), signature.as_bytes()) {
            return Err(AuthError::InvalidSignature);
        }

        // 7. Claim the nonce — only now, so failures above never burn it.
        if !self.nonces.claim(nonce) {
            return Err(AuthError::Replay);
        }
        Ok(())
    }

    /// Rejections recorded for `code` so far.
    pub fn rejection_count(&self, code: &str) -> u64 {
        self.rejections.get(code).copied().unwrap_or(0)
    }

    /// Nonces evicted from the replay cache so far.
    pub fn nonce_evictions(&self) -> u64 {
        self.nonces.evictions()
    }
}
