// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! One-way migration from the legacy schema-1 model.
//!
//! Schema 1 kept liveness in LWW boolean registers — no dots, no
//! observed-remove semantics. Migration mints synthetic dots from a single
//! migration writer, one per live element, and sets the frontier to the
//! final migration vector. The boundary is strictly one-way: schema-1
//! patches are never fed through the schema-2 reducer, and a migrated graph
//! only ever appends schema-2 patches.

use std::collections::BTreeMap;

use crate::clock::VersionVector;
use crate::dot::{Dot, IdError, WriterId};
use crate::event::LwwRegister;
use crate::state::{EdgeKey, EdgeLabel, NodeId, PropKey, PropRef, WarpState, TUPLE_DELIMITER};
use crate::value::PropValue;

/// A legacy (schema 1) materialized state.
///
/// Keys are the raw legacy encodings: node ids verbatim, edges and props as
/// NUL-joined tuples (`from\0to\0label`, `node\0key`).
#[derive(Clone, Default, PartialEq, Debug)]
pub struct LegacyState {
    /// Node liveness registers; `true` means alive.
    pub node_alive: BTreeMap<String, LwwRegister<bool>>,
    /// Edge liveness registers keyed `from\0to\0label`.
    pub edge_alive: BTreeMap<String, LwwRegister<bool>>,
    /// Property registers keyed `node\0key`.
    pub props: BTreeMap<String, LwwRegister<PropValue>>,
}

/// Migration failures — all of them mean corrupt legacy data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MigrateError {
    /// An edge key did not split into exactly three parts.
    #[error("[E_SCHEMA_MISMATCH] malformed legacy edge key {key:?}")]
    MalformedEdgeKey {
        /// The offending raw key.
        key: String,
    },

    /// A prop key did not split into exactly two parts.
    #[error("[E_SCHEMA_MISMATCH] malformed legacy prop key {key:?}")]
    MalformedPropKey {
        /// The offending raw key.
        key: String,
    },

    /// A legacy identifier failed schema-2 validation.
    #[error("[E_SCHEMA_MISMATCH] legacy identifier rejected: {0}")]
    InvalidIdent(#[from] IdError),
}

/// Converts a legacy state into a fresh schema-2 state.
///
/// Only elements whose legacy register holds `true` survive; properties
/// survive only when their node does (dangling props are dropped). Element
/// iteration is over sorted maps and the migration writer's counter
/// increments once per surviving element, so the output — including its
/// synthetic dots — is deterministic.
///
/// # Errors
/// [`MigrateError`] when a legacy key or identifier is malformed.
pub fn migrate(legacy: &LegacyState, migration_writer: &WriterId) -> Result<WarpState, MigrateError> {
    let mut state = WarpState::new();
    let mut vv = VersionVector::new();

    for (raw, register) in &legacy.node_alive {
        if !register.value {
            continue;
        }
        let node = NodeId::new(raw.clone())?;
        let dot = mint(&mut vv, migration_writer)?;
        state.node_alive.add(node, dot);
    }

    for (raw, register) in &legacy.edge_alive {
        if !register.value {
            continue;
        }
        let mut parts = raw.split(TUPLE_DELIMITER);
        let key = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(from), Some(to), Some(label), None) => EdgeKey::new(
                NodeId::new(from)?,
                NodeId::new(to)?,
                EdgeLabel::new(label)?,
            ),
            _ => {
                return Err(MigrateError::MalformedEdgeKey { key: raw.clone() });
            }
        };
        let dot = mint(&mut vv, migration_writer)?;
        state.edge_alive.add(key, dot);
    }

    for (raw, register) in &legacy.props {
        let Some((node, key)) = raw.split_once(TUPLE_DELIMITER) else {
            return Err(MigrateError::MalformedPropKey { key: raw.clone() });
        };
        let alive = legacy
            .node_alive
            .get(node)
            .is_some_and(|register| register.value);
        if !alive {
            continue;
        }
        state.props.insert(
            PropRef::new(NodeId::new(node)?, PropKey::new(key)?),
            register.clone(),
        );
    }

    state.observed_frontier = vv;
    Ok(state)
}

fn mint(vv: &mut VersionVector, writer: &WriterId) -> Result<Dot, MigrateError> {
    let counter = vv.increment(writer);
    Ok(Dot::new(writer.clone(), counter)?)
}
