//! Collaborator contracts — suggestion generation, document review,
//! geolocation, and the document store reviews read from.
//!
//! The conversation engine only depends on the traits here. Concrete
//! implementations:
//! - `gemini` — Gemini `generateContent` with Maps grounding / function calling
//! - `fixtures` — deterministic offline data and providers

pub mod fixtures;
pub mod gemini;
pub mod prompts;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::model::Citation;
use crate::error::{LocationError, ProviderError};

/// WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Where a task can be done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLocation {
    pub name: String,
    pub address: String,
}

/// A task from the user's GTD list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GtdTask {
    pub id: String,
    pub name: String,
    /// GTD context tag, e.g. "@errands".
    pub context: String,
    pub location: Option<TaskLocation>,
}

impl GtdTask {
    /// The accept/snooze target for this task, if it can be walked to.
    pub fn suggested_task(&self) -> Option<SuggestedTask> {
        self.location.as_ref().map(|loc| SuggestedTask {
            name: loc.name.clone(),
            address: loc.address.clone(),
        })
    }
}

/// A calendar entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// The place a proactive suggestion points the user at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedTask {
    pub name: String,
    pub address: String,
}

/// One candidate next action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProactiveSuggestion {
    pub text: String,
    pub task: SuggestedTask,
}

/// A suggestion plus the sources the generator grounded it on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionOutcome {
    pub suggestion: ProactiveSuggestion,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

/// A single proposed edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEdit {
    pub original_text: String,
    pub suggested_change: String,
    pub comment: String,
}

/// Summary and proposed edits for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReview {
    pub summary: String,
    #[serde(default)]
    pub edits: Vec<DocumentEdit>,
}

/// A review plus the intermediate progress lines produced while making it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewOutcome {
    pub review: DocumentReview,
    pub status_messages: Vec<String>,
}

/// Everything a proactive suggestion is generated from.
#[derive(Debug, Clone)]
pub struct SuggestionRequest<'a> {
    pub user_name: &'a str,
    pub coordinates: Coordinates,
    pub tasks: &'a [GtdTask],
    pub calendar: &'a [CalendarEvent],
}

/// Produces a proactive next-action suggestion from the user's context.
#[async_trait]
pub trait ProactiveSuggestionProvider: Send + Sync {
    async fn suggest(
        &self,
        request: SuggestionRequest<'_>,
    ) -> Result<SuggestionOutcome, ProviderError>;
}

/// Produces a document review for a free-text document query.
#[async_trait]
pub trait DocumentReviewProvider: Send + Sync {
    async fn review(&self, query: &str) -> Result<ReviewOutcome, ProviderError>;
}

/// One-shot position capture.
#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn capture(&self) -> Result<Coordinates, LocationError>;
}

/// Metadata for a document found by a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub id: String,
    pub title: String,
    pub owner: String,
}

/// Read access to the user's documents.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Find the best match for a query (title, keywords, or owner).
    async fn find(&self, query: &str) -> Option<DocumentMeta>;
    /// Full text of a document by id.
    async fn read(&self, id: &str) -> Option<String>;
}

/// Geolocator that reports a fixed position, or fails when none is configured.
#[derive(Debug, Clone, Default)]
pub struct StaticGeolocator {
    position: Option<Coordinates>,
}

impl StaticGeolocator {
    pub fn new(position: Option<Coordinates>) -> Self {
        Self { position }
    }
}

#[async_trait]
impl Geolocator for StaticGeolocator {
    async fn capture(&self) -> Result<Coordinates, LocationError> {
        self.position.ok_or_else(|| {
            LocationError::Unavailable("no position configured for this device".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggested_task_needs_location() {
        let task = GtdTask {
            id: "t5".into(),
            name: "Call Mom".into(),
            context: "@home".into(),
            location: None,
        };
        assert!(task.suggested_task().is_none());

        let task = GtdTask {
            location: Some(TaskLocation {
                name: "Sparkle Cleaners".into(),
                address: "150 Geary St".into(),
            }),
            ..task
        };
        let suggested = task.suggested_task().unwrap();
        assert_eq!(suggested.name, "Sparkle Cleaners");
        assert_eq!(suggested.address, "150 Geary St");
    }

    #[test]
    fn review_edits_default_to_empty() {
        let review: DocumentReview = serde_json::from_str(r#"{"summary": "ok"}"#).unwrap();
        assert!(review.edits.is_empty());
    }

    #[tokio::test]
    async fn static_geolocator_without_position_fails() {
        let geo = StaticGeolocator::default();
        assert!(matches!(
            geo.capture().await,
            Err(LocationError::Unavailable(_))
        ));

        let here = Coordinates {
            latitude: 37.7879,
            longitude: -122.4075,
        };
        let geo = StaticGeolocator::new(Some(here));
        assert_eq!(geo.capture().await.unwrap(), here);
    }
}
