//! Prompts for the generative providers and parsing of the markers they
//! are asked to emit.

use chrono::{DateTime, Local, TimeZone, Utc};

use super::{CalendarEvent, GtdTask, SuggestionRequest};

/// Marker the model appends to name the task it picked, e.g. `[TASK: t1]`.
const TASK_MARKER: &str = "[TASK:";

/// Tasks worth suggesting proactively: only those with a location.
pub fn located_tasks(tasks: &[GtdTask]) -> Vec<&GtdTask> {
    tasks.iter().filter(|t| t.location.is_some()).collect()
}

/// Events starting on the same local calendar day as `now`.
pub fn todays_events<'a, Tz: TimeZone>(
    events: &'a [CalendarEvent],
    now: &DateTime<Tz>,
) -> Vec<&'a CalendarEvent> {
    let today = now.date_naive();
    events
        .iter()
        .filter(|e| e.start.with_timezone(&now.timezone()).date_naive() == today)
        .collect()
}

/// Build the proactive suggestion prompt.
pub fn proactive_suggestion_prompt(request: &SuggestionRequest<'_>, now: DateTime<Utc>) -> String {
    let local = now.with_timezone(&Local);
    let name = request.user_name;
    let tasks = serde_json::to_string_pretty(&located_tasks(request.tasks))
        .unwrap_or_else(|_| "[]".to_string());
    let events = serde_json::to_string_pretty(&todays_events(request.calendar, &local))
        .unwrap_or_else(|_| "[]".to_string());

    format!(
        "\
You are a proactive, helpful GTD (Getting Things Done) assistant. Your goal is to help the user, \
{name}, be more productive by suggesting the best \"next action\" based on their current context.

**Current Context:**
- User's Name: {name}
- Current Time: {time}
- Current Location: Latitude {lat}, Longitude {lng}

**User's Data:**
- Tasks (only tasks with a location are listed):
{tasks}

- Calendar (today's events):
{events}

**Your Task:**
Analyze all the provided context. Find the single most logical and helpful location-based task \
for {name} to do right now or in the immediate future. Consider any free time between calendar \
appointments. Use your knowledge of maps to determine if a task is realistically nearby.

**Response Requirements:**
1. Start with a friendly and direct suggestion. For example: \"Hi {name}! Now would be a great time to...\"
2. Briefly explain your reasoning, mentioning the user's location, proximity to the task, and their schedule.
3. Include an estimated time to complete the task, including travel.
4. Be concise, encouraging, and conversational.
5. On the very last line, write {TASK_MARKER} <id>] with the id of the task you picked. The user will NOT see this line.",
        time = local.format("%-I:%M %p"),
        lat = request.coordinates.latitude,
        lng = request.coordinates.longitude,
    )
}

/// Build the document review prompt.
pub fn document_review_prompt(query: &str) -> String {
    format!(
        "\
The user asked: \"{query}\"

Find the document they mean with get_drive_file_metadata, read it with read_document_content, \
then call suggest_document_edits with a concise summary and specific, actionable edits. \
Each edit must quote the original text exactly."
    )
}

/// Result of stripping the task marker from a model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSuggestion {
    /// Display text with the marker line removed.
    pub cleaned: String,
    /// Task id named by the marker, if any.
    pub task_id: Option<String>,
}

/// Parse a proactive suggestion response for the `[TASK: <id>]` marker.
pub fn parse_suggestion_response(response: &str) -> ParsedSuggestion {
    let task_id = response
        .lines()
        .find(|line| line.trim().starts_with(TASK_MARKER))
        .and_then(|line| {
            let trimmed = line.trim();
            let start = TASK_MARKER.len();
            let end = trimmed.rfind(']')?;
            if end <= start {
                return None;
            }
            let id = trimmed[start..end].trim();
            if id.is_empty() {
                None
            } else {
                Some(id.to_string())
            }
        });

    let cleaned = response
        .lines()
        .filter(|line| !line.trim().starts_with(TASK_MARKER))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    ParsedSuggestion { cleaned, task_id }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Coordinates, TaskLocation};
    use chrono::Duration;

    fn task(id: &str, located: bool) -> GtdTask {
        GtdTask {
            id: id.into(),
            name: format!("task {id}"),
            context: "@errands".into(),
            location: located.then(|| TaskLocation {
                name: format!("place {id}"),
                address: format!("{id} Market St"),
            }),
        }
    }

    #[test]
    fn only_located_tasks_are_listed() {
        let tasks = vec![task("t1", true), task("t2", false), task("t3", true)];
        let ids: Vec<&str> = located_tasks(&tasks).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["t1", "t3"]);
    }

    #[test]
    fn todays_events_filters_other_days() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let event = |id: &str, start: DateTime<Utc>| CalendarEvent {
            id: id.into(),
            title: id.into(),
            start,
            end: start + Duration::hours(1),
        };
        let events = vec![
            event("earlier", now - Duration::hours(2)),
            event("later", now + Duration::hours(4)),
            event("tomorrow", now + Duration::days(1)),
            event("yesterday", now - Duration::days(1)),
        ];
        let ids: Vec<&str> = todays_events(&events, &now)
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, ["earlier", "later"]);
    }

    #[test]
    fn prompt_mentions_context() {
        let tasks = vec![task("t1", true), task("t2", false)];
        let request = SuggestionRequest {
            user_name: "Katie",
            coordinates: Coordinates {
                latitude: 37.78,
                longitude: -122.41,
            },
            tasks: &tasks,
            calendar: &[],
        };
        let prompt = proactive_suggestion_prompt(&request, Utc::now());
        assert!(prompt.contains("Hi Katie!"));
        assert!(prompt.contains("Latitude 37.78, Longitude -122.41"));
        assert!(prompt.contains("place t1"));
        assert!(!prompt.contains("task t2"));
        assert!(prompt.contains("[TASK: <id>]"));
    }

    #[test]
    fn parse_marker_and_clean() {
        let parsed = parse_suggestion_response(
            "Hi Katie! Grab your dry cleaning.\nIt takes 15 minutes.\n[TASK: t1]",
        );
        assert_eq!(parsed.task_id.as_deref(), Some("t1"));
        assert_eq!(parsed.cleaned, "Hi Katie! Grab your dry cleaning.\nIt takes 15 minutes.");
    }

    #[test]
    fn parse_without_marker() {
        let parsed = parse_suggestion_response("  Just go for a walk.  ");
        assert_eq!(parsed.task_id, None);
        assert_eq!(parsed.cleaned, "Just go for a walk.");
    }

    #[test]
    fn parse_empty_marker() {
        let parsed = parse_suggestion_response("Go.\n[TASK: ]");
        assert_eq!(parsed.task_id, None);
        assert_eq!(parsed.cleaned, "Go.");
    }

    #[test]
    fn review_prompt_quotes_query() {
        let prompt = document_review_prompt("Please review 'Q3 Budget Proposal'");
        assert!(prompt.contains("\"Please review 'Q3 Budget Proposal'\""));
        assert!(prompt.contains("suggest_document_edits"));
    }
}
