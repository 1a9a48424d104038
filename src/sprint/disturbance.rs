//! Collaborator seams the fixture consumes but does not implement.

use async_trait::async_trait;
use serde_json::Value;

use super::agent::SprintAgent;
use super::kanban::{Kanban, SharedContextDb};
use crate::error::Result;

/// Injects mid-sprint disturbances (flaky tests, incidents, scope creep).
///
/// Implementations live outside this crate; the fixture only routes
/// [`InjectDisturbance`](crate::action::Action::InjectDisturbance) actions
/// here and reads the active set for observations.
#[async_trait]
pub trait DisturbanceEngine: Send + Sync {
    /// Apply a disturbance of the given type to the live team and board.
    async fn apply(
        &mut self,
        disturbance_type: &str,
        agents: &mut [SprintAgent],
        kanban: &mut Kanban,
        db: &mut SharedContextDb,
    ) -> Result<Value>;

    /// Names of the disturbances fired most recently.
    fn active(&self) -> Vec<String>;
}

/// Answers whether an agent is still in its onboarding window.
pub trait OnboardingManager: Send + Sync {
    fn is_onboarding(&self, agent_id: &str) -> bool;
}
