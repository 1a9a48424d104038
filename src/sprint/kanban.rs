//! Kanban board view and the in-memory shared-context database.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::MetaLearning;
use crate::error::{Error, Result};

/// Snapshot of the board: column name → cards, in column order.
pub type KanbanSnapshot = BTreeMap<String, Vec<KanbanCard>>;

/// Board columns, in flow order.
pub const KANBAN_COLUMNS: [&str; 4] = ["todo", "in_progress", "done", "approved"];

/// A card on the board, one per selected story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KanbanCard {
    pub id: String,
    pub title: String,
    pub status: String,
    #[serde(default)]
    pub story_points: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
}

/// Mock shared-context database. Holds the card list and meta-learnings in
/// memory; only `mock://` URLs are supported by the episode fixture.
#[derive(Debug, Clone)]
pub struct SharedContextDb {
    url: String,
    initialized: bool,
    cards: Vec<KanbanCard>,
    meta_learnings: Vec<MetaLearning>,
}

impl SharedContextDb {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            initialized: false,
            cards: Vec::new(),
            meta_learnings: Vec::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_mock(&self) -> bool {
        self.url.starts_with("mock")
    }

    /// Prepare the database for use. Non-mock URLs are rejected here; real
    /// database backends live outside this crate.
    pub async fn initialize(&mut self) -> Result<()> {
        if !self.is_mock() {
            return Err(Error::Validation(format!(
                "Unsupported database url: {:?}. The episode fixture supports mock:// only",
                self.url
            )));
        }
        self.initialized = true;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn cards(&self) -> &[KanbanCard] {
        &self.cards
    }

    pub fn cards_mut(&mut self) -> &mut Vec<KanbanCard> {
        &mut self.cards
    }

    pub async fn add_card(&mut self, card: KanbanCard) {
        self.cards.push(card);
    }

    /// Move a card to a new column. Returns false if the card is unknown.
    pub async fn set_card_status(&mut self, card_id: &str, status: &str) -> bool {
        match self.cards.iter_mut().find(|c| c.id == card_id) {
            Some(card) => {
                card.status = status.to_string();
                true
            }
            None => false,
        }
    }

    /// IDs of cards currently in the given column.
    pub fn card_ids_in(&self, status: &str) -> Vec<String> {
        self.cards
            .iter()
            .filter(|c| c.status == status)
            .map(|c| c.id.clone())
            .collect()
    }

    pub fn meta_learnings(&self) -> &[MetaLearning] {
        &self.meta_learnings
    }

    pub fn meta_learnings_mut(&mut self) -> &mut Vec<MetaLearning> {
        &mut self.meta_learnings
    }

    pub async fn add_meta_learning(&mut self, learning: MetaLearning) {
        self.meta_learnings.push(learning);
    }
}

/// Board-level view over the database's card list, plus WIP limits the
/// action executor can adjust mid-episode.
#[derive(Debug, Clone)]
pub struct Kanban {
    pub wip_limits: BTreeMap<String, u32>,
}

impl Default for Kanban {
    fn default() -> Self {
        let mut wip_limits = BTreeMap::new();
        wip_limits.insert("in_progress".to_string(), 4);
        Self { wip_limits }
    }
}

impl Kanban {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the board: every standard column is present, cards grouped
    /// by status. Cards with non-standard statuses get their own column.
    pub async fn snapshot(&self, db: &SharedContextDb) -> KanbanSnapshot {
        let mut snapshot: KanbanSnapshot = KANBAN_COLUMNS
            .iter()
            .map(|c| (c.to_string(), Vec::new()))
            .collect();
        for card in db.cards() {
            snapshot
                .entry(card.status.clone())
                .or_default()
                .push(card.clone());
        }
        snapshot
    }
}
