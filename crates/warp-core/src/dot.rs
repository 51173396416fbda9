// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Writer identity and dots.
//!
//! A [`Dot`] is a writer-local version marker: `(writer, counter)` with the
//! counter strictly increasing along that writer's patch chain. Dots tag
//! every add operation, which is what lets a remove cite *exactly* the adds
//! it observed and leave concurrent adds untouched.
//!
//! Canonical form is `"writer:counter"`, base-10, no padding. The writer id
//! may itself contain `:`; parsing splits at the last colon.

use std::fmt;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors raised when constructing identifiers from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// Writer ids must be non-empty and free of path separators and NUL.
    #[error("[E_USAGE] invalid writer id {0:?}")]
    InvalidWriter(String),

    /// Dot counters start at 1.
    #[error("[E_USAGE] dot counter must be >= 1 (writer {0:?})")]
    ZeroCounter(String),

    /// A canonical dot string did not have the `writer:counter` shape.
    #[error("[E_USAGE] malformed dot {0:?}")]
    MalformedDot(String),

    /// Node ids, edge labels, and property keys must be non-empty and free
    /// of NUL (NUL is the canonical tuple delimiter).
    #[error("[E_USAGE] invalid identifier {0:?}")]
    InvalidIdent(String),
}

/// Opaque writer identity.
///
/// Used in dots, version vectors, and pointer names
/// (`refs/warp/<g>/writers/<writer>`), which is why path separators are
/// rejected up front.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WriterId(String);

impl WriterId {
    /// Validates and wraps a writer id.
    ///
    /// # Errors
    /// [`IdError::InvalidWriter`] if the id is empty or contains `/`, `\`,
    /// or NUL.
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        if id.is_empty() || id.contains(['/', '\\', '\0']) {
            return Err(IdError::InvalidWriter(id));
        }
        Ok(Self(id))
    }

    /// View as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WriterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A writer-local write-event marker.
///
/// Ordering is `(writer, counter)` lexicographic, matching the canonical
/// sorted-dot-set encoding.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Dot {
    writer: WriterId,
    counter: u64,
}

impl Dot {
    /// Builds a dot, rejecting the never-issued counter 0.
    ///
    /// # Errors
    /// [`IdError::ZeroCounter`] when `counter == 0`.
    pub fn new(writer: WriterId, counter: u64) -> Result<Self, IdError> {
        if counter == 0 {
            return Err(IdError::ZeroCounter(writer.0));
        }
        Ok(Self { writer, counter })
    }

    /// Parses the canonical `"writer:counter"` form.
    ///
    /// # Errors
    /// [`IdError::MalformedDot`] when the colon or counter is missing or the
    /// counter fails to parse; [`IdError`] variants from the component
    /// validators otherwise.
    pub fn parse(text: &str) -> Result<Self, IdError> {
        let (writer, counter) = text
            .rsplit_once(':')
            .ok_or_else(|| IdError::MalformedDot(text.to_owned()))?;
        let counter: u64 = counter
            .parse()
            .map_err(|_| IdError::MalformedDot(text.to_owned()))?;
        Self::new(WriterId::new(writer)?, counter)
    }

    /// The writer that issued this dot.
    pub fn writer(&self) -> &WriterId {
        &self.writer
    }

    /// The writer-local counter (always ≥ 1).
    pub fn counter(&self) -> u64 {
        self.counter
    }
}

impl fmt::Display for Dot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.writer, self.counter)
    }
}

impl Serialize for Dot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Dot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(D::Error::custom)
    }
}
