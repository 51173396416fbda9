// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Time-travel cursors.
//!
//! A cursor is a small canonical-JSON blob referenced from a named pointer
//! — `cursor/active` for the live one, `cursor/saved/<name>` for
//! bookmarks. While an active cursor exists, `materialize()` caps the fold
//! at the cursor's tick. Committing stays legal: new patches land with a
//! lamport above every observed tick, so they are simply invisible until
//! the cursor is cleared.

use serde::{Deserialize, Serialize};
use tracing::debug;
use warp_core::{state_hash, to_canonical_json};

use crate::error::WarpError;
use crate::handle::{MaterializeOpts, WarpGraph};
use crate::refs;

/// The only cursor mode this version writes.
pub const CURSOR_MODE_TICK: &str = "tick";

/// The persisted cursor document.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorState {
    /// Number of visible edges at the tick.
    pub edges: u64,
    /// Hex state hash of the materialized snapshot at the tick.
    pub frontier_hash: String,
    /// Cursor mode; see [`CURSOR_MODE_TICK`].
    pub mode: String,
    /// Number of visible nodes at the tick.
    pub nodes: u64,
    /// The addressed tick (lamport ceiling).
    pub tick: u64,
}

/// A saved cursor and its name.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SavedCursor {
    /// Bookmark name (the pointer suffix).
    pub name: String,
    /// The cursor document.
    pub state: CursorState,
}

fn validate_cursor_name(name: &str) -> Result<(), WarpError> {
    if name.is_empty() || name.contains(['/', '\\', '\0']) {
        return Err(WarpError::Usage(format!(
            "cursor name {name:?} must be non-empty and free of path separators"
        )));
    }
    Ok(())
}

impl WarpGraph {
    /// Sets the active cursor to `tick`, materializing the snapshot it
    /// addresses and recording its shape in the cursor blob.
    ///
    /// # Errors
    /// Store, decode, and reducer failures.
    pub async fn seek(&mut self, tick: u64) -> Result<CursorState, WarpError> {
        self.ensure_open()?;
        let state = self
            .materialize(MaterializeOpts {
                ceiling: Some(tick),
                cancel: None,
            })
            .await?;

        let cursor = CursorState {
            edges: state.visible_edges().count() as u64,
            frontier_hash: hex::encode(state_hash(state)),
            mode: CURSOR_MODE_TICK.to_owned(),
            nodes: state.visible_nodes().count() as u64,
            tick,
        };
        self.write_cursor(&refs::cursor_active_ref(&self.graph), &cursor)
            .await?;
        debug!(tick, "cursor set");
        Ok(cursor)
    }

    /// Clears the active cursor; the next materialization sees the full
    /// history again.
    ///
    /// # Errors
    /// Store failures.
    pub async fn seek_latest(&mut self) -> Result<(), WarpError> {
        self.ensure_open()?;
        self.store
            .delete_ref(&refs::cursor_active_ref(&self.graph))
            .await?;
        debug!("cursor cleared");
        Ok(())
    }

    /// Bookmarks the active cursor under `name`.
    ///
    /// # Errors
    /// `E_NOT_FOUND` when no cursor is active.
    pub async fn save_cursor(&self, name: &str) -> Result<(), WarpError> {
        validate_cursor_name(name)?;
        let blob = self
            .store
            .read_ref(&refs::cursor_active_ref(&self.graph))
            .await?
            .ok_or_else(|| WarpError::NotFound {
                what: "active cursor".to_owned(),
            })?;
        self.store
            .update_ref(&refs::cursor_saved_ref(&self.graph, name), &blob)
            .await?;
        Ok(())
    }

    /// Restores a bookmarked cursor as the active one.
    ///
    /// # Errors
    /// `E_NOT_FOUND` for an unknown bookmark.
    pub async fn load_cursor(&mut self, name: &str) -> Result<CursorState, WarpError> {
        validate_cursor_name(name)?;
        let ref_name = refs::cursor_saved_ref(&self.graph, name);
        let blob = self
            .store
            .read_ref(&ref_name)
            .await?
            .ok_or_else(|| WarpError::NotFound {
                what: format!("saved cursor {name:?}"),
            })?;
        let cursor = self.read_cursor_blob(&blob).await?;
        self.store
            .update_ref(&refs::cursor_active_ref(&self.graph), &blob)
            .await?;
        Ok(cursor)
    }

    /// Deletes a bookmark. Unknown names are a no-op.
    ///
    /// # Errors
    /// Store failures.
    pub async fn drop_cursor(&self, name: &str) -> Result<(), WarpError> {
        validate_cursor_name(name)?;
        self.store
            .delete_ref(&refs::cursor_saved_ref(&self.graph, name))
            .await?;
        Ok(())
    }

    /// Lists bookmarks in name order.
    ///
    /// # Errors
    /// Store failures.
    pub async fn list_cursors(&self) -> Result<Vec<SavedCursor>, WarpError> {
        let prefix = refs::cursor_saved_prefix(&self.graph);
        let mut out = Vec::new();
        for ref_name in self.store.list_refs(&prefix).await? {
            let Some(name) = ref_name.strip_prefix(&prefix) else {
                continue;
            };
            if let Some(blob) = self.store.read_ref(&ref_name).await? {
                out.push(SavedCursor {
                    name: name.to_owned(),
                    state: self.read_cursor_blob(&blob).await?,
                });
            }
        }
        Ok(out)
    }

    /// Reads the active cursor, if one is set.
    pub(crate) async fn active_cursor(&self) -> Result<Option<CursorState>, WarpError> {
        let Some(blob) = self
            .store
            .read_ref(&refs::cursor_active_ref(&self.graph))
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(self.read_cursor_blob(&blob).await?))
    }

    async fn read_cursor_blob(
        &self,
        blob: &warp_store::Oid,
    ) -> Result<CursorState, WarpError> {
        let bytes = self.store.read_blob(blob).await?;
        serde_json::from_slice(&bytes).map_err(|err| WarpError::SchemaMismatch {
            reason: format!("undecodable cursor blob: {err}"),
        })
    }

    async fn write_cursor(&self, ref_name: &str, cursor: &CursorState) -> Result<(), WarpError> {
        let blob = self
            .store
            .write_blob(&to_canonical_json(cursor).unwrap_or_default())
            .await?;
        self.store.update_ref(ref_name, &blob).await?;
        Ok(())
    }
}
