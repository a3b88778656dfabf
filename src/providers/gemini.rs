//! Gemini provider — proactive suggestions grounded with Google Maps, and
//! document reviews driven by function calling.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::prompts::{document_review_prompt, parse_suggestion_response, proactive_suggestion_prompt};
use super::{
    DocumentReview, DocumentReviewProvider, DocumentSource, ProactiveSuggestion,
    ProactiveSuggestionProvider, ReviewOutcome, SuggestionOutcome, SuggestionRequest,
};
use crate::config::GeminiConfig;
use crate::conversation::model::Citation;
use crate::error::ProviderError;

const PROVIDER: &str = "gemini";

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    fn function_response(name: impl Into<String>, response: Value) -> Self {
        Self {
            function_response: Some(FunctionResponse {
                name: name.into(),
                response,
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GroundingChunk {
    maps: Option<MapsChunk>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MapsChunk {
    uri: Option<String>,
    title: Option<String>,
}

impl GenerateResponse {
    fn first_content(&self) -> Option<&Content> {
        self.candidates.first()?.content.as_ref()
    }

    /// Concatenated text parts of the first candidate.
    fn text(&self) -> String {
        self.first_content()
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }

    /// Maps grounding chunks as citations.
    fn citations(&self) -> Vec<Citation> {
        self.candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|g| {
                g.grounding_chunks
                    .iter()
                    .map(|chunk| {
                        let maps = chunk.maps.clone().unwrap_or_default();
                        Citation {
                            uri: maps.uri.unwrap_or_else(|| "#".to_string()),
                            title: maps.title.unwrap_or_else(|| "Location Details".to_string()),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ── Tool declarations ───────────────────────────────────────────────

fn document_review_tools() -> Value {
    json!({
        "functionDeclarations": [
            {
                "name": "get_drive_file_metadata",
                "description": "Finds the target document for review in Google Drive based on a search query.",
                "parameters": {
                    "type": "OBJECT",
                    "properties": {
                        "query": {
                            "type": "STRING",
                            "description": "The search query to find the file, such as the file name, keywords, or owner."
                        }
                    },
                    "required": ["query"]
                }
            },
            {
                "name": "read_document_content",
                "description": "Retrieves the text content of a specific Google Drive document for analysis.",
                "parameters": {
                    "type": "OBJECT",
                    "properties": {
                        "fileId": {
                            "type": "STRING",
                            "description": "The unique ID of the Google Drive file."
                        }
                    },
                    "required": ["fileId"]
                }
            },
            {
                "name": "suggest_document_edits",
                "description": "Prompts the user with a summary and suggested edits for the provided document content.",
                "parameters": {
                    "type": "OBJECT",
                    "properties": {
                        "summary": {
                            "type": "STRING",
                            "description": "A concise summary of the document's content."
                        },
                        "edits": {
                            "type": "ARRAY",
                            "description": "A list of specific edits to suggest to the user.",
                            "items": {
                                "type": "OBJECT",
                                "properties": {
                                    "original_text": { "type": "STRING", "description": "The segment of original text to be replaced." },
                                    "suggested_change": { "type": "STRING", "description": "The new text to replace the original segment." },
                                    "comment": { "type": "STRING", "description": "An explanation for why the edit is being suggested." }
                                },
                                "required": ["original_text", "suggested_change", "comment"]
                            }
                        }
                    },
                    "required": ["summary", "edits"]
                }
            }
        ]
    })
}

fn proactive_request(request: &SuggestionRequest<'_>) -> GenerateRequest {
    let prompt = proactive_suggestion_prompt(request, Utc::now());
    GenerateRequest {
        contents: vec![Content::user(vec![Part::text(prompt)])],
        tools: vec![json!({ "googleMaps": {} })],
        tool_config: Some(json!({
            "retrievalConfig": {
                "latLng": {
                    "latitude": request.coordinates.latitude,
                    "longitude": request.coordinates.longitude,
                }
            }
        })),
    }
}

fn review_request(contents: Vec<Content>) -> GenerateRequest {
    GenerateRequest {
        contents,
        tools: vec![document_review_tools()],
        tool_config: Some(json!({ "functionCallingConfig": { "mode": "ANY" } })),
    }
}

// ── Review tool loop ────────────────────────────────────────────────

/// What to do after answering one function call.
enum Step {
    Respond(Part),
    Done(DocumentReview),
}

/// Per-review state for the function-calling loop.
struct ReviewSession<'a> {
    documents: &'a dyn DocumentSource,
    status_messages: Vec<String>,
    titles: HashMap<String, String>,
}

impl<'a> ReviewSession<'a> {
    fn new(documents: &'a dyn DocumentSource) -> Self {
        Self {
            documents,
            status_messages: Vec::new(),
            titles: HashMap::new(),
        }
    }

    async fn handle(&mut self, call: FunctionCall) -> Result<Step, ProviderError> {
        let arg = |key: &str| {
            call.args
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        match call.name.as_str() {
            "get_drive_file_metadata" => {
                let query = arg("query");
                self.status_messages
                    .push(format!("Searching Google Drive for \"{query}\"..."));
                let response = match self.documents.find(&query).await {
                    Some(meta) => {
                        self.titles.insert(meta.id.clone(), meta.title.clone());
                        serde_json::to_value(meta)?
                    }
                    None => json!({ "error": format!("no file matches \"{query}\"") }),
                };
                Ok(Step::Respond(Part::function_response(
                    "get_drive_file_metadata",
                    response,
                )))
            }
            "read_document_content" => {
                let id = arg("fileId");
                let title = self.titles.get(&id).cloned().unwrap_or_else(|| id.clone());
                self.status_messages.push(format!("Reading \"{title}\"..."));
                let response = match self.documents.read(&id).await {
                    Some(content) => json!({ "fileId": id, "content": content }),
                    None => json!({ "error": format!("file {id} not found") }),
                };
                Ok(Step::Respond(Part::function_response(
                    "read_document_content",
                    response,
                )))
            }
            "suggest_document_edits" => {
                self.status_messages
                    .push("Drafting suggested edits...".to_string());
                let review: DocumentReview = serde_json::from_value(call.args)?;
                Ok(Step::Done(review))
            }
            other => {
                warn!(function = other, "Model called an undeclared function");
                Ok(Step::Respond(Part::function_response(
                    other,
                    json!({ "error": "unknown function" }),
                )))
            }
        }
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// Gemini `generateContent` client implementing both provider contracts.
pub struct GeminiProvider {
    client: reqwest::Client,
    config: GeminiConfig,
    documents: Arc<dyn DocumentSource>,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig, documents: Arc<dyn DocumentSource>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            documents,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    async fn generate(&self, body: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.config.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(ProviderError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("HTTP {status}: {}", detail.chars().take(300).collect::<String>()),
            });
        }

        resp.json::<GenerateResponse>()
            .await
            .map_err(|e| ProviderError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Turn a model response into a suggestion, resolving the task marker
/// against the request's tasks.
fn suggestion_from_response(
    response: &GenerateResponse,
    request: &SuggestionRequest<'_>,
) -> Result<SuggestionOutcome, ProviderError> {
    let parsed = parse_suggestion_response(&response.text());
    if parsed.cleaned.is_empty() {
        return Err(ProviderError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: "empty suggestion text".to_string(),
        });
    }

    let picked = parsed
        .task_id
        .as_deref()
        .and_then(|id| request.tasks.iter().find(|t| t.id == id))
        .and_then(|t| t.suggested_task());
    let task = match picked {
        Some(task) => task,
        None => {
            debug!(marker = ?parsed.task_id, "Task marker unresolved, using first located task");
            request
                .tasks
                .iter()
                .find_map(|t| t.suggested_task())
                .ok_or_else(|| ProviderError::NotFound {
                    what: "a task with a location".to_string(),
                })?
        }
    };

    Ok(SuggestionOutcome {
        suggestion: ProactiveSuggestion {
            text: parsed.cleaned,
            task,
        },
        citations: response.citations(),
    })
}

#[async_trait]
impl ProactiveSuggestionProvider for GeminiProvider {
    async fn suggest(
        &self,
        request: SuggestionRequest<'_>,
    ) -> Result<SuggestionOutcome, ProviderError> {
        info!(model = %self.config.model, user = request.user_name, "Requesting proactive suggestion");
        let response = self.generate(&proactive_request(&request)).await?;
        suggestion_from_response(&response, &request)
    }
}

#[async_trait]
impl DocumentReviewProvider for GeminiProvider {
    async fn review(&self, query: &str) -> Result<ReviewOutcome, ProviderError> {
        info!(model = %self.config.model, query, "Requesting document review");
        let mut contents = vec![Content::user(vec![Part::text(document_review_prompt(query))])];
        let mut session = ReviewSession::new(self.documents.as_ref());

        for turn in 0..self.config.max_tool_turns {
            let response = self.generate(&review_request(contents.clone())).await?;
            let content = response
                .first_content()
                .cloned()
                .ok_or_else(|| ProviderError::InvalidResponse {
                    provider: PROVIDER.to_string(),
                    reason: "response has no candidates".to_string(),
                })?;

            let calls: Vec<FunctionCall> = content
                .parts
                .iter()
                .filter_map(|p| p.function_call.clone())
                .collect();
            if calls.is_empty() {
                return Err(ProviderError::InvalidResponse {
                    provider: PROVIDER.to_string(),
                    reason: "model answered without suggesting edits".to_string(),
                });
            }
            debug!(turn, calls = calls.len(), "Review tool turn");

            contents.push(Content {
                role: Some("model".to_string()),
                parts: content.parts,
            });

            let mut replies = Vec::with_capacity(calls.len());
            for call in calls {
                match session.handle(call).await? {
                    Step::Respond(part) => replies.push(part),
                    Step::Done(review) => {
                        return Ok(ReviewOutcome {
                            review,
                            status_messages: session.status_messages,
                        });
                    }
                }
            }
            contents.push(Content::user(replies));
        }

        Err(ProviderError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: format!("no review after {} tool turns", self.config.max_tool_turns),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::fixtures::{FixtureDocuments, sample_tasks};
    use crate::providers::Coordinates;

    fn request(tasks: &[crate::providers::GtdTask]) -> SuggestionRequest<'_> {
        SuggestionRequest {
            user_name: "Katie",
            coordinates: Coordinates {
                latitude: 37.7879,
                longitude: -122.4075,
            },
            tasks,
            calendar: &[],
        }
    }

    #[test]
    fn proactive_request_carries_maps_grounding() {
        let tasks = sample_tasks();
        let body = serde_json::to_value(proactive_request(&request(&tasks))).unwrap();
        assert_eq!(body["tools"][0], json!({ "googleMaps": {} }));
        assert_eq!(
            body["toolConfig"]["retrievalConfig"]["latLng"]["latitude"],
            json!(37.7879)
        );
        assert_eq!(body["contents"][0]["role"], "user");
        assert!(body["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Katie"));
    }

    #[test]
    fn review_tools_declare_three_functions() {
        let tools = document_review_tools();
        let names: Vec<&str> = tools["functionDeclarations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            ["get_drive_file_metadata", "read_document_content", "suggest_document_edits"]
        );
    }

    #[test]
    fn citations_default_missing_fields() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Hi" }] },
                "groundingMetadata": {
                    "groundingChunks": [
                        { "maps": { "uri": "https://maps.google.com/?cid=1", "title": "Sparkle Cleaners" } },
                        { "maps": {} },
                        { "web": { "uri": "https://example.com" } }
                    ]
                }
            }]
        }))
        .unwrap();

        let citations = response.citations();
        assert_eq!(citations.len(), 3);
        assert_eq!(citations[0].title, "Sparkle Cleaners");
        assert_eq!(citations[1].uri, "#");
        assert_eq!(citations[1].title, "Location Details");
        assert_eq!(citations[2].uri, "#");
    }

    #[test]
    fn suggestion_resolves_task_marker() {
        let tasks = sample_tasks();
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "Hi Katie! Return your library books now.\n" },
                    { "text": "[TASK: t3]" }
                ] }
            }]
        }))
        .unwrap();

        let outcome = suggestion_from_response(&response, &request(&tasks)).unwrap();
        assert_eq!(outcome.suggestion.text, "Hi Katie! Return your library books now.");
        assert_eq!(outcome.suggestion.task.name, "SF Public Library - Main Branch");
        assert!(outcome.citations.is_empty());
    }

    #[test]
    fn suggestion_falls_back_to_first_located_task() {
        let tasks = sample_tasks();
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": "Hi! Go now.\n[TASK: t5]" }] } }]
        }))
        .unwrap();

        // t5 has no location
        let outcome = suggestion_from_response(&response, &request(&tasks)).unwrap();
        assert_eq!(outcome.suggestion.task.name, "Sparkle Cleaners");
    }

    #[test]
    fn empty_response_is_invalid() {
        let tasks = sample_tasks();
        let response = GenerateResponse::default();
        assert!(matches!(
            suggestion_from_response(&response, &request(&tasks)),
            Err(ProviderError::InvalidResponse { .. })
        ));
    }

    #[tokio::test]
    async fn review_session_walks_the_tool_chain() {
        let docs = FixtureDocuments::default();
        let mut session = ReviewSession::new(&docs);

        let step = session
            .handle(FunctionCall {
                name: "get_drive_file_metadata".into(),
                args: json!({ "query": "Q3 Budget Proposal" }),
            })
            .await
            .unwrap();
        match step {
            Step::Respond(part) => {
                let resp = part.function_response.unwrap();
                assert_eq!(resp.response["id"], "doc-q3-budget");
            }
            Step::Done(_) => panic!("Expected a function response"),
        }

        let step = session
            .handle(FunctionCall {
                name: "read_document_content".into(),
                args: json!({ "fileId": "doc-q3-budget" }),
            })
            .await
            .unwrap();
        match step {
            Step::Respond(part) => {
                let resp = part.function_response.unwrap();
                assert!(resp.response["content"].as_str().unwrap().contains("marketing"));
            }
            Step::Done(_) => panic!("Expected a function response"),
        }

        let step = session
            .handle(FunctionCall {
                name: "suggest_document_edits".into(),
                args: json!({
                    "summary": "A budget.",
                    "edits": [{ "original_text": "alot", "suggested_change": "a lot", "comment": "Typo." }]
                }),
            })
            .await
            .unwrap();
        match step {
            Step::Done(review) => {
                assert_eq!(review.summary, "A budget.");
                assert_eq!(review.edits[0].suggested_change, "a lot");
            }
            Step::Respond(_) => panic!("Expected the review"),
        }

        assert_eq!(
            session.status_messages,
            [
                "Searching Google Drive for \"Q3 Budget Proposal\"...",
                "Reading \"Q3 Budget Proposal\"...",
                "Drafting suggested edits...",
            ]
        );
    }

    #[tokio::test]
    async fn review_session_reports_missing_files() {
        let docs = FixtureDocuments::default();
        let mut session = ReviewSession::new(&docs);
        let step = session
            .handle(FunctionCall {
                name: "get_drive_file_metadata".into(),
                args: json!({ "query": "Holiday Plans" }),
            })
            .await
            .unwrap();
        match step {
            Step::Respond(part) => {
                assert!(part.function_response.unwrap().response.get("error").is_some());
            }
            Step::Done(_) => panic!("Expected a function response"),
        }
    }

    #[tokio::test]
    async fn malformed_edits_are_an_error() {
        let docs = FixtureDocuments::default();
        let mut session = ReviewSession::new(&docs);
        let result = session
            .handle(FunctionCall {
                name: "suggest_document_edits".into(),
                args: json!({ "edits": "not a list" }),
            })
            .await;
        assert!(matches!(result, Err(ProviderError::Json(_))));
    }
}
