// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Add-wins observed-remove sets.
//!
//! Every add is tagged with a globally unique dot; a remove *cites* the
//! dots it observed. The set keeps per-element entry dots plus one struck
//! set shared by the whole OR-set, and an element is visible while it has
//! at least one entry dot that is not struck. Citing nothing removes
//! nothing, which is exactly the add-wins guarantee: a concurrent add
//! whose dot the remover never saw survives.
//!
//! A cited dot is recorded even when its add has not arrived yet — the
//! strike simply waits for the entry it cancels. That (plus set unions for
//! `join`) keeps the structure a join-semilattice: application order and
//! arrival order can never change the result.
//!
//! `compact` drops a dot only once it is struck, covered by the supplied
//! version vector, *and* matched by its entry. Live dots are never
//! touched, and unmatched strikes are kept (their add may still be in
//! flight), so compaction can never change visibility — or the state hash.

use std::collections::{BTreeMap, BTreeSet};

use crate::clock::VersionVector;
use crate::dot::Dot;

/// Observed-remove set keyed by `E`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct OrSet<E: Ord + Clone> {
    pub(crate) elems: BTreeMap<E, BTreeSet<Dot>>,
    pub(crate) struck: BTreeSet<Dot>,
}

impl<E: Ord + Clone> Default for OrSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Ord + Clone> OrSet<E> {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self {
            elems: BTreeMap::new(),
            struck: BTreeSet::new(),
        }
    }

    /// Records an add of `elem` tagged with `dot`.
    pub fn add(&mut self, elem: E, dot: Dot) {
        self.elems.entry(elem).or_default().insert(dot);
    }

    /// Strikes the cited dots, wherever their adds land. An empty citation
    /// is a no-op.
    pub fn remove_dots(&mut self, observed: &BTreeSet<Dot>) {
        self.struck.extend(observed.iter().cloned());
    }

    /// `true` while `elem` has at least one live (un-struck) dot.
    pub fn contains(&self, elem: &E) -> bool {
        self.elems
            .get(elem)
            .is_some_and(|entries| entries.iter().any(|dot| !self.struck.contains(dot)))
    }

    /// The live dots currently asserting `elem`, in canonical order.
    pub fn live_dots(&self, elem: &E) -> Vec<Dot> {
        self.elems.get(elem).map_or_else(Vec::new, |entries| {
            entries
                .iter()
                .filter(|dot| !self.struck.contains(*dot))
                .cloned()
                .collect()
        })
    }

    /// Lattice join: elementwise union of entries, union of strikes.
    pub fn join(&mut self, other: &Self) {
        for (elem, entries) in &other.elems {
            self.elems
                .entry(elem.clone())
                .or_default()
                .extend(entries.iter().cloned());
        }
        self.struck.extend(other.struck.iter().cloned());
    }

    /// Drops every entry dot that is struck *and* covered by `vv`, then
    /// drops elements with no remaining entries. Matched strikes go with
    /// their entries; unmatched strikes stay (their add may still arrive).
    /// Returns the number of dots dropped.
    pub fn compact(&mut self, vv: &VersionVector) -> usize {
        let mut removed = 0;
        let struck = &mut self.struck;
        self.elems.retain(|_, entries| {
            let dead: Vec<Dot> = entries
                .iter()
                .filter(|dot| struck.contains(*dot) && vv.covers(dot))
                .cloned()
                .collect();
            for dot in &dead {
                entries.remove(dot);
                struck.remove(dot);
                removed += 1;
            }
            !entries.is_empty()
        });
        removed
    }

    /// Iterates the visible elements in key order.
    pub fn iter_visible(&self) -> impl Iterator<Item = &E> {
        self.elems
            .iter()
            .filter(|(_, entries)| entries.iter().any(|dot| !self.struck.contains(dot)))
            .map(|(elem, _)| elem)
    }

    /// Number of visible elements.
    pub fn visible_count(&self) -> usize {
        self.iter_visible().count()
    }

    /// Total entry dots recorded across all elements.
    pub fn dot_count(&self) -> usize {
        self.elems.values().map(BTreeSet::len).sum()
    }

    /// Entry dots cancelled by a strike (the compactable ones).
    pub fn tombstone_count(&self) -> usize {
        self.elems
            .values()
            .flat_map(|entries| entries.iter())
            .filter(|dot| self.struck.contains(*dot))
            .count()
    }

    /// `true` when the set holds neither elements nor strikes.
    pub fn is_empty(&self) -> bool {
        self.elems.is_empty() && self.struck.is_empty()
    }

    /// Strikes whose add has not been folded in yet.
    pub(crate) fn orphan_strikes(&self) -> Vec<Dot> {
        let entry_dots: BTreeSet<&Dot> = self
            .elems
            .values()
            .flat_map(|entries| entries.iter())
            .collect();
        self.struck
            .iter()
            .filter(|dot| !entry_dots.contains(*dot))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dot::WriterId;

    fn dot(text: &str) -> Dot {
        Dot::parse(text).unwrap()
    }

    fn dots(texts: &[&str]) -> BTreeSet<Dot> {
        texts.iter().map(|t| dot(t)).collect()
    }

    #[test]
    fn add_then_remove_cited_dot() {
        let mut set = OrSet::new();
        set.add("x", dot("a:1"));
        assert!(set.contains(&"x"));
        set.remove_dots(&dots(&["a:1"]));
        assert!(!set.contains(&"x"));
    }

    #[test]
    fn empty_citation_is_noop() {
        let mut set = OrSet::new();
        set.add("x", dot("a:1"));
        set.remove_dots(&BTreeSet::new());
        assert!(set.contains(&"x"));
    }

    #[test]
    fn concurrent_add_survives_remove() {
        // Remover observed a:1 only; the concurrent b:1 add must survive.
        let mut set = OrSet::new();
        set.add("x", dot("a:1"));
        set.add("x", dot("b:1"));
        set.remove_dots(&dots(&["a:1"]));
        assert!(set.contains(&"x"));
        assert_eq!(set.live_dots(&"x"), vec![dot("b:1")]);
    }

    #[test]
    fn remove_before_add_still_removes() {
        // The strike arrives first; the add it cancels lands afterwards.
        let mut set = OrSet::new();
        set.remove_dots(&dots(&["a:1"]));
        set.add("x", dot("a:1"));
        assert!(!set.contains(&"x"));

        // And the reverse order agrees.
        let mut other = OrSet::new();
        other.add("x", dot("a:1"));
        other.remove_dots(&dots(&["a:1"]));
        assert_eq!(set, other);
    }

    #[test]
    fn join_is_commutative_and_idempotent() {
        let mut a = OrSet::new();
        a.add("x", dot("a:1"));
        a.remove_dots(&dots(&["a:1", "c:9"]));
        let mut b = OrSet::new();
        b.add("x", dot("b:1"));
        b.add("y", dot("b:2"));

        let mut ab = a.clone();
        ab.join(&b);
        let mut ba = b.clone();
        ba.join(&a);
        assert_eq!(ab, ba);

        let mut twice = ab.clone();
        twice.join(&b);
        assert_eq!(twice, ab);
    }

    #[test]
    fn compact_drops_only_covered_matched_strikes() {
        let mut set = OrSet::new();
        set.add("x", dot("a:1"));
        set.add("x", dot("b:5"));
        set.remove_dots(&dots(&["a:1", "b:5"]));

        // VV covers a:1 but not b:5.
        let vv: VersionVector = [
            (WriterId::new("a").unwrap(), 1),
            (WriterId::new("b").unwrap(), 4),
        ]
        .into_iter()
        .collect();

        let removed = set.compact(&vv);
        assert_eq!(removed, 1);
        assert_eq!(set.tombstone_count(), 1);
        assert!(!set.contains(&"x"));
    }

    #[test]
    fn compact_drops_fully_dead_elements_but_keeps_orphans() {
        let mut set = OrSet::new();
        set.add("x", dot("a:1"));
        set.remove_dots(&dots(&["a:1", "z:3"]));
        let vv: VersionVector = [
            (WriterId::new("a").unwrap(), 1),
            (WriterId::new("z").unwrap(), 9),
        ]
        .into_iter()
        .collect();
        set.compact(&vv);
        assert!(set.elems.is_empty());
        // The z:3 strike has no matching add yet; it must survive so the
        // in-flight add cannot resurrect.
        assert_eq!(set.orphan_strikes(), vec![dot("z:3")]);
        set.add("q", dot("z:3"));
        assert!(!set.contains(&"q"));
    }

    #[test]
    fn compact_never_touches_live_dots() {
        let mut set = OrSet::new();
        set.add("x", dot("a:1"));
        let vv: VersionVector = [(WriterId::new("a").unwrap(), 9)].into_iter().collect();
        assert_eq!(set.compact(&vv), 0);
        assert!(set.contains(&"x"));
    }
}
