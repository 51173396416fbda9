// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Pointer layout.
//!
//! All of a graph's mutable state hangs off `refs/warp/<graph>/…`. The
//! writer id appears verbatim in pointer names, which is why `WriterId`
//! rejects path separators at construction.

use warp_core::WriterId;

/// `refs/warp/<g>/writers/<writer>` — tip of a writer's patch chain.
pub(crate) fn writer_ref(graph: &str, writer: &WriterId) -> String {
    format!("refs/warp/{graph}/writers/{}", writer.as_str())
}

/// Prefix under which every writer pointer of a graph lives.
pub(crate) fn writers_prefix(graph: &str) -> String {
    format!("refs/warp/{graph}/writers/")
}

/// `refs/warp/<g>/checkpoints/head` — latest checkpoint commit.
pub(crate) fn checkpoint_ref(graph: &str) -> String {
    format!("refs/warp/{graph}/checkpoints/head")
}

/// `refs/warp/<g>/coverage/head` — coverage anchor.
pub(crate) fn coverage_ref(graph: &str) -> String {
    format!("refs/warp/{graph}/coverage/head")
}

/// `refs/warp/<g>/cursor/active` — active time-travel cursor blob.
pub(crate) fn cursor_active_ref(graph: &str) -> String {
    format!("refs/warp/{graph}/cursor/active")
}

/// `refs/warp/<g>/cursor/saved/<name>` — a saved cursor blob.
pub(crate) fn cursor_saved_ref(graph: &str, name: &str) -> String {
    format!("refs/warp/{graph}/cursor/saved/{name}")
}

/// Prefix under which saved cursors live.
pub(crate) fn cursor_saved_prefix(graph: &str) -> String {
    format!("refs/warp/{graph}/cursor/saved/")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_the_wire_contract() {
        let w = WriterId::new("alice").unwrap();
        assert_eq!(writer_ref("g", &w), "refs/warp/g/writers/alice");
        assert_eq!(checkpoint_ref("g"), "refs/warp/g/checkpoints/head");
        assert_eq!(coverage_ref("g"), "refs/warp/g/coverage/head");
        assert_eq!(cursor_active_ref("g"), "refs/warp/g/cursor/active");
        assert_eq!(cursor_saved_ref("g", "pin"), "refs/warp/g/cursor/saved/pin");
        assert!(writer_ref("g", &w).starts_with(&writers_prefix("g")));
        assert!(cursor_saved_ref("g", "pin").starts_with(&cursor_saved_prefix("g")));
    }
}
