//! Offline fixtures — a mock user's tasks, calendar and documents, plus
//! deterministic providers built on them for running without an API key.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::{
    CalendarEvent, DocumentEdit, DocumentMeta, DocumentReview, DocumentReviewProvider,
    DocumentSource, GtdTask, ProactiveSuggestion, ProactiveSuggestionProvider, ReviewOutcome,
    SuggestionOutcome, SuggestionRequest, TaskLocation,
};
use crate::conversation::model::Citation;
use crate::error::ProviderError;

/// Default user name for the single-user session.
pub const DEFAULT_USER_NAME: &str = "Katie";

fn located(id: &str, name: &str, place: &str, address: &str) -> GtdTask {
    GtdTask {
        id: id.to_string(),
        name: name.to_string(),
        context: "@errands".to_string(),
        location: Some(TaskLocation {
            name: place.to_string(),
            address: address.to_string(),
        }),
    }
}

/// The mock task list.
pub fn sample_tasks() -> Vec<GtdTask> {
    vec![
        located(
            "t1",
            "Pick up dry cleaning",
            "Sparkle Cleaners",
            "150 Geary St, San Francisco, CA 94108",
        ),
        located(
            "t2",
            "Buy groceries for dinner party",
            "Whole Foods Market",
            "2001 Market St, San Francisco, CA 94114",
        ),
        located(
            "t3",
            "Return library books",
            "SF Public Library - Main Branch",
            "100 Larkin St, San Francisco, CA 94102",
        ),
        GtdTask {
            id: "t4".to_string(),
            name: "Finalize pitch deck slides".to_string(),
            context: "@work".to_string(),
            location: None,
        },
        GtdTask {
            id: "t5".to_string(),
            name: "Call Mom".to_string(),
            context: "@home".to_string(),
            location: None,
        },
    ]
}

/// The mock calendar, relative to `now`.
pub fn sample_calendar(now: DateTime<Utc>) -> Vec<CalendarEvent> {
    let event = |id: &str, title: &str, start_h: i64, end_h: i64| CalendarEvent {
        id: id.to_string(),
        title: title.to_string(),
        start: now + Duration::hours(start_h),
        end: now + Duration::hours(end_h),
    };
    vec![
        event("c1", "Team Sync", -2, -1),
        event("c2", "Design Review", 1, 2),
        event("c3", "Focus Time: Pitch Deck", 4, 5),
    ]
}

/// A stored document together with the review the offline provider returns for it.
#[derive(Debug, Clone)]
pub struct FixtureDocument {
    pub meta: DocumentMeta,
    pub content: String,
    pub review: DocumentReview,
}

/// The mock document library.
pub fn sample_documents() -> Vec<FixtureDocument> {
    vec![FixtureDocument {
        meta: DocumentMeta {
            id: "doc-q3-budget".to_string(),
            title: "Q3 Budget Proposal".to_string(),
            owner: "katie@example.com".to_string(),
        },
        content: "Q3 Budget Proposal\n\n\
                  We propose to increase the marketing budget by 15% to support the product launch. \
                  Engineering headcount stays flat. Travel spend will be reduced alot compared to Q2. \
                  The total budget is $1.2M, which is in line with last quarter."
            .to_string(),
        review: DocumentReview {
            summary: "Proposes a 15% marketing increase for the launch, flat engineering headcount, \
                      and lower travel spend, for a $1.2M total."
                .to_string(),
            edits: vec![
                DocumentEdit {
                    original_text: "reduced alot compared to Q2".to_string(),
                    suggested_change: "reduced by 30% compared to Q2".to_string(),
                    comment: "Fix the typo and quantify the reduction.".to_string(),
                },
                DocumentEdit {
                    original_text: "which is in line with last quarter".to_string(),
                    suggested_change: "a 4% increase over Q2's $1.15M".to_string(),
                    comment: "A 15% marketing increase can't leave the total unchanged; state the delta."
                        .to_string(),
                },
            ],
        },
    }]
}

/// In-memory document store over the fixture library.
#[derive(Debug, Clone)]
pub struct FixtureDocuments {
    documents: Vec<FixtureDocument>,
}

impl FixtureDocuments {
    pub fn new(documents: Vec<FixtureDocument>) -> Self {
        Self { documents }
    }

    /// Case-insensitive title match in either direction, so both
    /// "q3 budget" and "please review the Q3 Budget Proposal" hit.
    fn lookup(&self, query: &str) -> Option<&FixtureDocument> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return None;
        }
        self.documents.iter().find(|d| {
            let title = d.meta.title.to_lowercase();
            title.contains(&query) || query.contains(&title)
        })
    }
}

impl Default for FixtureDocuments {
    fn default() -> Self {
        Self::new(sample_documents())
    }
}

#[async_trait]
impl DocumentSource for FixtureDocuments {
    async fn find(&self, query: &str) -> Option<DocumentMeta> {
        self.lookup(query).map(|d| d.meta.clone())
    }

    async fn read(&self, id: &str) -> Option<String> {
        self.documents
            .iter()
            .find(|d| d.meta.id == id)
            .map(|d| d.content.clone())
    }
}

#[async_trait]
impl DocumentReviewProvider for FixtureDocuments {
    async fn review(&self, query: &str) -> Result<ReviewOutcome, ProviderError> {
        let doc = self.lookup(query).ok_or_else(|| ProviderError::NotFound {
            what: format!("document matching \"{query}\""),
        })?;
        debug!(document = %doc.meta.id, "Serving fixture review");
        Ok(ReviewOutcome {
            review: doc.review.clone(),
            status_messages: vec![
                format!("Searching Google Drive for \"{query}\"..."),
                format!("Reading \"{}\"...", doc.meta.title),
                "Drafting suggested edits...".to_string(),
            ],
        })
    }
}

/// Suggests the first located task, without calling out to a model.
#[derive(Debug, Clone, Default)]
pub struct FixtureSuggestions;

#[async_trait]
impl ProactiveSuggestionProvider for FixtureSuggestions {
    async fn suggest(
        &self,
        request: SuggestionRequest<'_>,
    ) -> Result<SuggestionOutcome, ProviderError> {
        let (task, target) = request
            .tasks
            .iter()
            .find_map(|t| t.suggested_task().map(|s| (t, s)))
            .ok_or_else(|| ProviderError::NotFound {
                what: "a task with a location".to_string(),
            })?;

        let next_event = request
            .calendar
            .iter()
            .filter(|e| e.start > Utc::now())
            .min_by_key(|e| e.start);
        let schedule = match next_event {
            Some(e) => format!(" before \"{}\"", e.title),
            None => String::new(),
        };

        let text = format!(
            "Hi {}! You have some free time{}. {} is nearby, so this would be a great moment to {}.",
            request.user_name,
            schedule,
            target.name,
            task.name.to_lowercase(),
        );
        let citation = Citation {
            uri: maps_search_url(&target.address),
            title: target.name.clone(),
        };

        Ok(SuggestionOutcome {
            suggestion: ProactiveSuggestion { text, task: target },
            citations: vec![citation],
        })
    }
}

fn maps_search_url(address: &str) -> String {
    url::Url::parse_with_params(
        "https://www.google.com/maps/search/",
        &[("api", "1"), ("query", address)],
    )
    .map(|u| u.to_string())
    .unwrap_or_else(|_| "#".to_string())
}
