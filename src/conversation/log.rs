//! Ordered message log.

use std::collections::VecDeque;

use tracing::debug;

use super::model::{Message, MessageId};

/// Append-only message log; insertion order is display order.
///
/// With a history cap, the oldest messages are dropped once the cap is hit.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: VecDeque<Message>,
    max_history: Option<usize>,
}

impl MessageLog {
    pub fn new(max_history: Option<usize>) -> Self {
        Self {
            messages: VecDeque::new(),
            max_history,
        }
    }

    /// Append at the tail. Always succeeds.
    pub fn push(&mut self, message: Message) -> MessageId {
        let id = message.id;
        self.messages.push_back(message);

        if let Some(max) = self.max_history {
            while self.messages.len() > max {
                if let Some(dropped) = self.messages.pop_front() {
                    debug!(message_id = %dropped.id, "Dropped message past history cap");
                }
            }
        }

        id
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn to_vec(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether a proactive suggestion (or the directions that follow one)
    /// is anywhere in the log.
    pub fn has_suggestion_or_directions(&self) -> bool {
        self.messages.iter().any(Message::is_suggestion_or_directions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::model::Attachment;
    use crate::providers::SuggestedTask;

    #[test]
    fn preserves_insertion_order() {
        let mut log = MessageLog::default();
        assert!(log.is_empty());
        let first = log.push(Message::assistant("one"));
        log.push(Message::user("two"));
        log.push(Message::system("three"));

        let texts: Vec<&str> = log.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["one", "two", "three"]);
        assert_eq!(log.get(first).unwrap().text, "one");
    }

    #[test]
    fn cap_drops_oldest() {
        let mut log = MessageLog::new(Some(2));
        let first = log.push(Message::system("a"));
        log.push(Message::system("b"));
        log.push(Message::system("c"));

        assert_eq!(log.len(), 2);
        assert!(log.get(first).is_none());
        let texts: Vec<String> = log.to_vec().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, ["b", "c"]);
    }

    #[test]
    fn suggestion_scan() {
        let mut log = MessageLog::default();
        log.push(Message::assistant("hi").with_attachment(Attachment::PermissionPrompt));
        assert!(!log.has_suggestion_or_directions());

        log.push(Message::assistant("go").with_attachment(Attachment::SuggestionCard {
            task: SuggestedTask {
                name: "Sparkle Cleaners".into(),
                address: "150 Geary St".into(),
            },
        }));
        assert!(log.has_suggestion_or_directions());
        // Stable across repeated evaluation
        assert!(log.has_suggestion_or_directions());
    }
}
