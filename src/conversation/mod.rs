//! Conversation — the message log, intent routing, suggestion lifecycle,
//! and the engine that ties them together.

pub mod engine;
pub mod log;
pub mod model;
pub mod router;
pub mod suggestion;

pub use engine::{ConversationEngine, EngineDeps, Gate, Operation, walking_directions_url};
pub use log::MessageLog;
pub use model::{Attachment, Citation, Message, MessageId, Origin, SessionEvent, SessionSnapshot};
pub use router::{Intent, IntentClassifier, KeywordClassifier, extract_document_id};
pub use suggestion::{SuggestionState, SuggestionTracker};
