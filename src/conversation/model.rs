//! Conversation data model — messages, attachments, and the events and
//! snapshots the presentation layer reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::suggestion::SuggestionState;
use crate::permissions::{Capability, PermissionRegistry, PermissionStatus};
use crate::providers::{Coordinates, DocumentReview, SuggestedTask};

/// Unique message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MessageId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Assistant,
    User,
    System,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Assistant => write!(f, "assistant"),
            Self::User => write!(f, "user"),
            Self::System => write!(f, "system"),
        }
    }
}

/// A source a message was grounded on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub uri: String,
    pub title: String,
}

/// Renderable payload attached to a message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attachment {
    #[default]
    None,
    /// Buttons for each capability, bound to the live permission registry.
    PermissionPrompt,
    /// Accept ("walk me there") / snooze buttons for a proactive suggestion.
    SuggestionCard { task: SuggestedTask },
    /// Walking directions to an accepted suggestion.
    DirectionsCard { task: SuggestedTask, url: String },
    /// Summary and suggested edits for a reviewed document.
    ReviewCard { review: DocumentReview },
}

impl Attachment {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// One chat turn. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub origin: Origin,
    #[serde(default, skip_serializing_if = "Attachment::is_none")]
    pub attachment: Attachment,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(text: impl Into<String>, origin: Origin) -> Self {
        Self {
            id: MessageId::new(),
            text: text.into(),
            origin,
            attachment: Attachment::None,
            citations: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(text, Origin::Assistant)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, Origin::User)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(text, Origin::System)
    }

    /// Set the attachment.
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = attachment;
        self
    }

    /// Set the citation list.
    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = citations;
        self
    }

    /// Whether this message shows a proactive suggestion or its directions.
    pub fn is_suggestion_or_directions(&self) -> bool {
        matches!(
            self.attachment,
            Attachment::SuggestionCard { .. } | Attachment::DirectionsCard { .. }
        )
    }
}

/// Changes pushed to subscribers as they happen.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A message was appended to the log.
    MessageAppended { message: Message },
    /// A capability's status changed.
    PermissionChanged {
        capability: Capability,
        status: PermissionStatus,
    },
    /// A suggestion left the proposed state; its buttons should disappear.
    SuggestionResolved { id: MessageId, state: SuggestionState },
    /// The foreground busy flag flipped.
    BusyChanged { busy: bool },
}

/// Point-in-time view of the whole session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub messages: Vec<Message>,
    pub permissions: PermissionRegistry,
    pub coordinates: Option<Coordinates>,
    pub busy: bool,
    /// Lifecycle state for every suggestion message, keyed by message id.
    pub suggestions: Vec<(MessageId, SuggestionState)>,
}

impl SessionSnapshot {
    /// Lifecycle state of the suggestion attached to `id`, if any.
    pub fn suggestion_state(&self, id: MessageId) -> Option<SuggestionState> {
        self.suggestions
            .iter()
            .find(|(m, _)| *m == id)
            .map(|(_, s)| *s)
    }

    /// Whether the accept/snooze buttons for `message` should be rendered.
    pub fn shows_suggestion_actions(&self, message: &Message) -> bool {
        matches!(message.attachment, Attachment::SuggestionCard { .. })
            && self.suggestion_state(message.id) == Some(SuggestionState::Proposed)
    }
}
