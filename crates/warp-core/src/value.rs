// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Property values.
//!
//! A property holds either an inline scalar or a reference to a
//! content-addressed blob written separately (see `attach_content` on the
//! patch builder). Blob payloads never travel inside patches; only their
//! digests do.

use serde::{Deserialize, Serialize};
use warp_store::Oid;

/// An inline scalar, mirroring the JSON value space minus containers.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// JSON `null`.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON integer (64-bit signed).
    Int(i64),
    /// JSON number with a fractional part. Must be finite; NaN and the
    /// infinities are rejected at patch validation.
    Float(f64),
    /// JSON string.
    Str(String),
}

impl Scalar {
    /// `true` for floats that JSON cannot represent.
    pub fn is_non_finite(&self) -> bool {
        matches!(self, Self::Float(f) if !f.is_finite())
    }
}

/// A property value: inline scalar or blob reference.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PropValue {
    /// Scalar stored directly in the patch.
    Inline {
        /// The scalar payload.
        value: Scalar,
    },
    /// Content-addressed blob stored in the object store.
    Blob {
        /// Digest of the blob.
        oid: Oid,
    },
}

impl PropValue {
    /// Convenience constructor for inline scalars.
    pub fn inline(value: Scalar) -> Self {
        Self::Inline { value }
    }

    /// Convenience constructor for blob references.
    pub fn blob(oid: Oid) -> Self {
        Self::Blob { oid }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape() {
        let inline = PropValue::inline(Scalar::Int(42));
        assert_eq!(
            serde_json::to_string(&inline).unwrap(),
            r#"{"kind":"inline","value":42}"#
        );
        let blob = PropValue::blob(Oid::new("ab12").unwrap());
        assert_eq!(
            serde_json::to_string(&blob).unwrap(),
            r#"{"kind":"blob","oid":"ab12"}"#
        );
    }

    #[test]
    fn integers_stay_integers_through_json() {
        let round: PropValue =
            serde_json::from_str(r#"{"kind":"inline","value":7}"#).unwrap();
        assert_eq!(round, PropValue::inline(Scalar::Int(7)));
        let round: PropValue =
            serde_json::from_str(r#"{"kind":"inline","value":7.5}"#).unwrap();
        assert_eq!(round, PropValue::inline(Scalar::Float(7.5)));
    }
}
