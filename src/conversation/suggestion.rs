//! Suggestion lifecycle — Proposed → Accepted | Snoozed, one shot per
//! suggestion instance.

use serde::{Deserialize, Serialize};

use super::model::MessageId;
use crate::error::LifecycleError;
use crate::providers::SuggestedTask;

/// Where a single proactive suggestion is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionState {
    /// Buttons are showing; waiting for the user.
    Proposed,
    /// User asked for directions.
    Accepted,
    /// User put it off.
    Snoozed,
}

impl SuggestionState {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: SuggestionState) -> bool {
        use SuggestionState::*;
        matches!((self, target), (Proposed, Accepted) | (Proposed, Snoozed))
    }

    /// Whether the suggestion has been resolved.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Snoozed)
    }
}

impl std::fmt::Display for SuggestionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Proposed => "proposed",
            Self::Accepted => "accepted",
            Self::Snoozed => "snoozed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
struct Entry {
    id: MessageId,
    state: SuggestionState,
    task: SuggestedTask,
}

/// Lifecycle state for every suggestion shown in a session, keyed by the
/// id of the message that carries it.
#[derive(Debug, Clone, Default)]
pub struct SuggestionTracker {
    entries: Vec<Entry>,
}

impl SuggestionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly shown suggestion in the `Proposed` state.
    pub fn propose(&mut self, id: MessageId, task: SuggestedTask) {
        self.entries.push(Entry {
            id,
            state: SuggestionState::Proposed,
            task,
        });
    }

    pub fn state(&self, id: MessageId) -> Option<SuggestionState> {
        self.entries.iter().find(|e| e.id == id).map(|e| e.state)
    }

    /// Most recent suggestion still waiting for the user.
    pub fn latest_proposed(&self) -> Option<MessageId> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.state == SuggestionState::Proposed)
            .map(|e| e.id)
    }

    /// Move a proposed suggestion to `target`, returning its task.
    pub fn resolve(
        &mut self,
        id: MessageId,
        target: SuggestionState,
    ) -> Result<SuggestedTask, LifecycleError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(LifecycleError::UnknownSuggestion(id))?;

        if !entry.state.can_transition_to(target) {
            return Err(LifecycleError::AlreadyResolved {
                id,
                state: entry.state,
            });
        }

        entry.state = target;
        Ok(entry.task.clone())
    }

    /// `(message id, state)` pairs in the order the suggestions were shown.
    pub fn states(&self) -> Vec<(MessageId, SuggestionState)> {
        self.entries.iter().map(|e| (e.id, e.state)).collect()
    }
}
