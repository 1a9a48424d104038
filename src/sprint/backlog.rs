//! Product backlog collaborator for the sprint fixture.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A user story. Optional classification fields (`priority`, `tags`,
/// `domain`, `team_type_hint`) feed the story distributor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub story_points: u32,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_type_hint: Option<String>,
}

impl Story {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Ordered story list with selected/returned bookkeeping.
///
/// Selection happens during planning; `mark_returned` removes a story from
/// the sprint without deleting it from the product backlog.
#[derive(Debug, Clone, Default)]
pub struct Backlog {
    product_name: String,
    stories: Vec<Story>,
    selected_ids: BTreeSet<String>,
    returned_ids: BTreeSet<String>,
}

impl Backlog {
    /// Build a backlog from pre-generated stories.
    pub fn from_stories(stories: Vec<Story>, product_name: impl Into<String>) -> Self {
        Self {
            product_name: product_name.into(),
            stories,
            selected_ids: BTreeSet::new(),
            returned_ids: BTreeSet::new(),
        }
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn stories(&self) -> &[Story] {
        &self.stories
    }

    /// Append a story to the backlog.
    pub fn add_story(&mut self, story: Story) {
        self.stories.push(story);
    }

    /// Mark a story as returned to the product backlog. Also deselects it.
    pub fn mark_returned(&mut self, story_id: &str) {
        self.selected_ids.remove(story_id);
        self.returned_ids.insert(story_id.to_string());
    }

    /// Mark a story as selected for the current sprint.
    pub fn mark_selected(&mut self, story_id: &str) {
        self.selected_ids.insert(story_id.to_string());
    }

    /// IDs of stories selected for the current sprint.
    pub fn selected_ids(&self) -> &BTreeSet<String> {
        &self.selected_ids
    }

    /// Replace the selected-ids set. Used by checkpoint restore.
    pub fn set_selected_ids(&mut self, ids: BTreeSet<String>) {
        self.selected_ids = ids;
    }

    /// Stories that are neither selected nor returned, in backlog order.
    pub fn unselected(&self) -> Vec<&Story> {
        self.stories
            .iter()
            .filter(|s| !self.selected_ids.contains(&s.id) && !self.returned_ids.contains(&s.id))
            .collect()
    }

    /// Count of stories still available for selection.
    pub fn remaining(&self) -> usize {
        self.unselected().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn backlog() -> Backlog {
        Backlog::from_stories(
            vec![Story::new("US-1", "Login"), Story::new("US-2", "Logout")],
            "demo",
        )
    }

    #[test]
    fn selection_reduces_remaining() {
        let mut b = backlog();
        assert_eq!(b.remaining(), 2);
        b.mark_selected("US-1");
        assert_eq!(b.remaining(), 1);
        assert!(b.selected_ids().contains("US-1"));
    }

    #[test]
    fn returned_stories_leave_the_sprint() {
        let mut b = backlog();
        b.mark_selected("US-1");
        b.mark_returned("US-1");
        assert!(!b.selected_ids().contains("US-1"));
        // Returned stories are not selectable again.
        assert_eq!(b.remaining(), 1);
    }

    #[test]
    fn added_stories_become_available() {
        let mut b = backlog();
        b.add_story(Story::new("INJECTED-1", "Injected"));
        assert_eq!(b.remaining(), 3);
        assert_eq!(b.stories().last().unwrap().id, "INJECTED-1");
    }
}
