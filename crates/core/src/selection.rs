//! Selection Model.
//!
//! A [`SelectionSet`] records which resources of one kind are selected across an arbitrarily
//! large, paginated collection. Membership is global: it never depends on which page is on
//! screen, so navigating away from a page and back leaves the page exactly as it was.
//!
//! Ids that are not on any loaded page may be selected or deselected freely; they simply have no
//! visible effect until their page is shown.

use clinsync_types::ResourceKind;
use serde::Serialize;
use std::collections::HashMap;

/// Page-level selection state, as shown by a page header checkbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageState {
    /// Every id on a non-empty page is selected.
    All,
    /// At least one, but not every, id on the page is selected.
    Some,
    /// No id on the page is selected, or the page is empty.
    None,
}

/// The set of selected resource ids for one batch-operation session.
#[derive(Clone, Debug)]
pub struct SelectionSet {
    kind: ResourceKind,
    // id -> sequence number of the selection that added it
    members: HashMap<String, u64>,
    next_seq: u64,
}

impl SelectionSet {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            members: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Resource kind this selection belongs to.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.members.contains_key(id)
    }

    /// Add `id`. Selecting an already-selected id keeps its original position.
    pub fn select(&mut self, id: impl Into<String>) {
        let seq = self.next_seq;
        if let std::collections::hash_map::Entry::Vacant(slot) = self.members.entry(id.into()) {
            slot.insert(seq);
            self.next_seq += 1;
        }
    }

    pub fn deselect(&mut self, id: &str) {
        self.members.remove(id);
    }

    /// Flip membership of `id` and return whether it is now selected.
    pub fn toggle(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.members.remove(&id).is_some() {
            false
        } else {
            self.select(id);
            true
        }
    }

    /// Select every id in `ids`, leaving other selections untouched.
    pub fn select_all<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in ids {
            self.select(id);
        }
    }

    /// Deselect every id in `ids`, leaving other selections untouched.
    pub fn deselect_all<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for id in ids {
            self.deselect(id.as_ref());
        }
    }

    /// Header checkbox behaviour: a fully selected page is deselected, anything else is fully
    /// selected. Returns the resulting page state.
    pub fn toggle_page<S: AsRef<str>>(&mut self, page_ids: &[S]) -> PageState {
        if self.page_state(page_ids) == PageState::All {
            self.deselect_all(page_ids);
        } else {
            self.select_all(page_ids.iter().map(|id| id.as_ref().to_string()));
        }
        self.page_state(page_ids)
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }

    /// Tri-state for the page currently displayed, computed from the global selection.
    pub fn page_state<S: AsRef<str>>(&self, page_ids: &[S]) -> PageState {
        let selected = page_ids
            .iter()
            .filter(|id| self.is_selected(id.as_ref()))
            .count();
        if selected == 0 {
            PageState::None
        } else if selected == page_ids.len() {
            PageState::All
        } else {
            PageState::Some
        }
    }

    /// Selected ids in the order they were first selected.
    pub fn targets(&self) -> Vec<String> {
        let mut ordered: Vec<(&String, &u64)> = self.members.iter().collect();
        ordered.sort_by_key(|(_, seq)| **seq);
        ordered.into_iter().map(|(id, _)| id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages() -> Vec<Vec<String>> {
        (0..3)
            .map(|p| (0..4).map(|i| format!("o-{}", p * 4 + i)).collect())
            .collect()
    }

    #[test]
    fn selection_survives_page_navigation() {
        let pages = pages();
        let mut selection = SelectionSet::new(ResourceKind::Order);
        selection.select_all(pages[0].iter().cloned());
        selection.toggle("o-5");

        // Page 1 is shown, then page 2, then page 0 again; only the view window changes.
        assert_eq!(selection.page_state(&pages[1]), PageState::Some);
        assert_eq!(selection.page_state(&pages[2]), PageState::None);
        assert_eq!(selection.page_state(&pages[0]), PageState::All);
        assert!(selection.is_selected("o-5"));
        assert_eq!(selection.len(), 5);
    }

    #[test]
    fn tri_state_matches_membership() {
        let page = vec!["a", "b", "c"];
        let mut selection = SelectionSet::new(ResourceKind::Task);
        assert_eq!(selection.page_state(&page), PageState::None);
        selection.toggle("b");
        assert_eq!(selection.page_state(&page), PageState::Some);
        selection.select_all(["a", "c"]);
        assert_eq!(selection.page_state(&page), PageState::All);
        selection.toggle("a");
        assert_eq!(selection.page_state(&page), PageState::Some);
    }

    #[test]
    fn empty_page_is_none() {
        let mut selection = SelectionSet::new(ResourceKind::Task);
        selection.select("x");
        let empty: [&str; 0] = [];
        assert_eq!(selection.page_state(&empty), PageState::None);
    }

    #[test]
    fn ids_off_page_are_legal() {
        let mut selection = SelectionSet::new(ResourceKind::Document);
        selection.toggle("not-loaded");
        assert_eq!(selection.page_state(&["d-1", "d-2"]), PageState::None);
        assert!(selection.is_selected("not-loaded"));
        selection.deselect("never-selected");
        assert_eq!(selection.len(), 1);
    }

    #[test]
    fn toggle_page_selects_then_deselects() {
        let mut selection = SelectionSet::new(ResourceKind::Message);
        selection.select("m-9");
        selection.select("m-2");
        let page = ["m-1", "m-2", "m-3"];
        assert_eq!(selection.toggle_page(&page), PageState::All);
        assert_eq!(selection.toggle_page(&page), PageState::None);
        assert!(selection.is_selected("m-9"));
        assert_eq!(selection.len(), 1);
    }

    #[test]
    fn targets_follow_first_selection_order() {
        let mut selection = SelectionSet::new(ResourceKind::Order);
        selection.select_all(["c", "a", "b"]);
        selection.select("a");
        assert_eq!(selection.targets(), vec!["c", "a", "b"]);
        selection.toggle("c");
        selection.toggle("c");
        assert_eq!(selection.targets(), vec!["a", "b", "c"]);
        selection.clear();
        assert!(selection.is_empty());
    }
}
