// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Canonical JSON.
//!
//! Every wire-visible JSON blob (patches, trust records, cursors, sync
//! messages) is emitted in canonical form: object keys sorted bytewise,
//! compact separators, stable number formatting. `serde_json`'s default
//! `Map` is a `BTreeMap`, so routing a value through [`serde_json::Value`]
//! sorts every object level; compact `to_vec` does the rest.
//!
//! The canonical bytes are the identity of the blob — the object store
//! digests exactly what this module produces.

use serde::Serialize;

/// Serializes `value` as canonical JSON bytes.
///
/// # Errors
/// Propagates `serde_json` failures (non-string map keys, non-finite
/// floats). Callers validate values before encoding, so an error here is a
/// programming bug, not bad data.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    serde_json::to_vec(&value)
}
