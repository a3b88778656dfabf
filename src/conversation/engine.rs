//! Conversation engine — owns the message log and permission registry,
//! routes user input, and drives proactive suggestions and document reviews.
//!
//! All mutation goes through the engine. Work that waits on a collaborator
//! (suggestion/review providers, geolocation, scripted delays) never holds
//! the state lock across the await, so the log only changes between
//! suspension points.
//!
//! One foreground operation (a user turn or a proactive fetch) runs at a
//! time; the `Gate` tracks it. Input arriving while the gate is busy is
//! rejected with `InputRejected::Busy` instead of being queued.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::log::MessageLog;
use super::model::{Attachment, Message, MessageId, SessionEvent, SessionSnapshot};
use super::router::{Intent, IntentClassifier};
use super::suggestion::{SuggestionState, SuggestionTracker};
use crate::config::SessionConfig;
use crate::error::{InputRejected, LifecycleError, ProviderError, SessionError};
use crate::permissions::{Capability, PermissionRegistry, PermissionStatus};
use crate::providers::{
    CalendarEvent, Coordinates, DocumentReviewProvider, Geolocator, GtdTask,
    ProactiveSuggestionProvider, SuggestionRequest,
};

const CAPABILITIES: &str = "I can suggest what to do next based on your tasks, calendar, and \
                            location, and I can review documents for you. Try \"Review 'Q3 Budget Proposal'\".";
const CHECKING_DATA: &str =
    "Checking your tasks, calendar, and location to find your next best action...";
const SUGGESTION_APOLOGY: &str =
    "Sorry, I had trouble coming up with a suggestion. Please try again later.";
const REVIEW_APOLOGY: &str =
    "Sorry, I couldn't review that document right now. Please try again later.";
const LOCATION_NEEDED: &str =
    "I need your location before I can suggest something nearby. Please allow location access.";
const FINDING_YOU: &str = "Location access granted. Finding where you are...";
const LOCATION_FOUND: &str = "I've got your location!";
const LOCATION_FAILED: &str =
    "There was an issue getting your location. Please ensure location services are enabled.";
const NOTIFICATIONS_ON: &str = "I'll be able to \"tap\" you with suggestions now.";
const SNOOZE_ACK: &str = "No problem, I'll hold off on that one for now.";

/// The foreground operation currently in flight, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Idle,
    Busy(Operation),
}

/// Kinds of foreground operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    UserTurn,
    ProactiveFetch,
}

/// Collaborators and input fixtures the engine works with.
pub struct EngineDeps {
    pub suggestions: Arc<dyn ProactiveSuggestionProvider>,
    pub reviews: Arc<dyn DocumentReviewProvider>,
    pub geolocator: Arc<dyn Geolocator>,
    pub classifier: Arc<dyn IntentClassifier>,
    /// The user's task list.
    pub tasks: Vec<GtdTask>,
    /// The user's calendar.
    pub calendar: Vec<CalendarEvent>,
}

/// Everything the engine mutates, behind one lock.
struct SessionState {
    log: MessageLog,
    permissions: PermissionRegistry,
    coordinates: Option<Coordinates>,
    gate: Gate,
    suggestions: SuggestionTracker,
    /// Set once the automatic first suggestion has been attempted.
    auto_fetch_attempted: bool,
    onboarded: bool,
    closed: bool,
}

impl SessionState {
    fn new(config: &SessionConfig) -> Self {
        Self {
            log: MessageLog::new(config.max_history),
            permissions: PermissionRegistry::new(),
            coordinates: None,
            gate: Gate::Idle,
            suggestions: SuggestionTracker::new(),
            auto_fetch_attempted: false,
            onboarded: false,
            closed: false,
        }
    }

    /// Coordinates to fetch with if the automatic first suggestion should
    /// fire now: every permission granted, position captured, nothing in
    /// flight, and no suggestion or directions shown yet.
    fn auto_fetch_ready(&self) -> Option<Coordinates> {
        if self.closed
            || self.auto_fetch_attempted
            || self.gate != Gate::Idle
            || !self.permissions.all_granted()
            || self.log.has_suggestion_or_directions()
        {
            return None;
        }
        self.coordinates
    }
}

struct Inner {
    config: SessionConfig,
    deps: EngineDeps,
    state: RwLock<SessionState>,
    tx: broadcast::Sender<SessionEvent>,
}

/// Handle to a conversation session. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConversationEngine {
    inner: Arc<Inner>,
}

impl ConversationEngine {
    pub fn new(config: SessionConfig, deps: EngineDeps) -> Self {
        let (tx, _rx) = broadcast::channel(config.event_capacity.max(1));
        let state = RwLock::new(SessionState::new(&config));
        Self {
            inner: Arc::new(Inner {
                config,
                deps,
                state,
                tx,
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Subscribe to session events as they happen.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.tx.subscribe()
    }

    /// Read-only view of the whole session.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.state.read().await;
        SessionSnapshot {
            messages: state.log.to_vec(),
            permissions: state.permissions,
            coordinates: state.coordinates,
            busy: state.gate != Gate::Idle,
            suggestions: state.suggestions.states(),
        }
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.inner.state.read().await.log.to_vec()
    }

    pub async fn permissions(&self) -> PermissionRegistry {
        self.inner.state.read().await.permissions
    }

    pub async fn coordinates(&self) -> Option<Coordinates> {
        self.inner.state.read().await.coordinates
    }

    pub async fn is_busy(&self) -> bool {
        self.inner.state.read().await.gate != Gate::Idle
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.state.read().await.closed
    }

    pub async fn suggestion_state(&self, id: MessageId) -> Option<SuggestionState> {
        self.inner.state.read().await.suggestions.state(id)
    }

    /// Most recent suggestion whose buttons are still showing.
    pub async fn latest_proposed_suggestion(&self) -> Option<MessageId> {
        self.inner.state.read().await.suggestions.latest_proposed()
    }

    /// Whether the automatic first suggestion would fire right now.
    pub async fn auto_fetch_ready(&self) -> bool {
        self.inner.state.read().await.auto_fetch_ready().is_some()
    }

    // ── Log ─────────────────────────────────────────────────────────

    /// Append a message at the tail of the log.
    pub async fn append_message(&self, message: Message) -> MessageId {
        let id = self.emit(message).await;
        self.evaluate_auto_fetch().await;
        id
    }

    async fn emit(&self, message: Message) -> MessageId {
        let mut state = self.inner.state.write().await;
        self.emit_locked(&mut state, message)
    }

    fn emit_locked(&self, state: &mut SessionState, message: Message) -> MessageId {
        if state.closed {
            debug!(message_id = %message.id, "Discarding message for closed session");
            return message.id;
        }
        debug!(message_id = %message.id, origin = %message.origin, "Message appended");
        let event = SessionEvent::MessageAppended {
            message: message.clone(),
        };
        let id = state.log.push(message);
        // Ok if no receivers are listening yet
        let _ = self.inner.tx.send(event);
        id
    }

    fn set_gate_locked(&self, state: &mut SessionState, gate: Gate) {
        if state.gate == gate {
            return;
        }
        debug!(from = ?state.gate, to = ?gate, "Busy gate changed");
        let was_busy = state.gate != Gate::Idle;
        state.gate = gate;
        let busy = gate != Gate::Idle;
        if was_busy != busy {
            let _ = self.inner.tx.send(SessionEvent::BusyChanged { busy });
        }
    }

    async fn release_gate(&self) {
        let mut state = self.inner.state.write().await;
        self.set_gate_locked(&mut state, Gate::Idle);
    }

    // ── Onboarding / teardown ───────────────────────────────────────

    /// Claim the session's one-shot onboarding slot.
    pub async fn begin_onboarding(&self) -> Result<(), SessionError> {
        let mut state = self.inner.state.write().await;
        if state.closed {
            return Err(SessionError::Closed);
        }
        if state.onboarded {
            return Err(SessionError::AlreadyBootstrapped);
        }
        state.onboarded = true;
        Ok(())
    }

    /// Tear the session down. Operations still in flight run to completion
    /// but their messages are discarded.
    pub async fn close(&self) {
        let mut state = self.inner.state.write().await;
        if !state.closed {
            state.closed = true;
            info!(messages = state.log.len(), "Session closed");
        }
    }

    // ── User input ──────────────────────────────────────────────────

    /// Handle one line of user input and wait for every message it
    /// produces.
    ///
    /// The input is echoed before any provider is called. Blank input, or
    /// input arriving while another operation is in flight, is rejected and
    /// leaves the log untouched.
    pub async fn handle_user_input(&self, text: &str) -> Result<(), InputRejected> {
        let intent = self.begin_user_turn(text).await?;
        self.run_user_turn(intent).await;
        self.evaluate_auto_fetch().await;
        Ok(())
    }

    /// Like [`handle_user_input`](Self::handle_user_input), but returns as
    /// soon as the input is echoed; the rest runs on a background task.
    pub async fn submit_user_text(&self, text: &str) -> Result<JoinHandle<()>, InputRejected> {
        let intent = self.begin_user_turn(text).await?;
        let engine = self.clone();
        Ok(tokio::spawn(async move {
            engine.run_user_turn(intent).await;
            engine.evaluate_auto_fetch().await;
        }))
    }

    /// Validate, echo, take the gate, and classify.
    async fn begin_user_turn(&self, text: &str) -> Result<Intent, InputRejected> {
        if text.trim().is_empty() {
            debug!("Ignoring blank input");
            return Err(InputRejected::Blank);
        }

        let mut state = self.inner.state.write().await;
        if state.closed {
            return Err(InputRejected::Closed);
        }
        if state.gate != Gate::Idle {
            debug!(gate = ?state.gate, "Dropping input while busy");
            return Err(InputRejected::Busy);
        }

        self.emit_locked(&mut state, Message::user(text));
        self.set_gate_locked(&mut state, Gate::Busy(Operation::UserTurn));
        drop(state);

        let intent = self.inner.deps.classifier.classify(text);
        info!(intent = ?intent, "Routed user input");
        Ok(intent)
    }

    async fn run_user_turn(&self, intent: Intent) {
        match intent {
            Intent::DocumentReview { document } => self.review_document(&document).await,
            Intent::ProactiveSuggestion => {
                let coordinates = self.coordinates().await;
                match coordinates {
                    Some(coordinates) => self.fetch_proactive_suggestion(coordinates).await,
                    None => {
                        self.emit(Message::system(LOCATION_NEEDED)).await;
                    }
                }
            }
            Intent::Fallback => {
                tokio::time::sleep(self.inner.config.fallback_delay).await;
                self.emit(Message::assistant(CAPABILITIES)).await;
            }
        }
        self.release_gate().await;
    }

    /// Ask the review provider, replay its progress, then show the result.
    async fn review_document(&self, document: &str) {
        info!(document, "Reviewing document");
        let config = &self.inner.config;

        match guarded(self.inner.deps.reviews.review(document)).await {
            Ok(outcome) => {
                for (i, status) in outcome.status_messages.into_iter().enumerate() {
                    if i > 0 {
                        tokio::time::sleep(config.status_delay).await;
                    }
                    self.emit(Message::system(status)).await;
                }
                tokio::time::sleep(config.review_result_delay).await;
                let message = Message::assistant(format!("Here's my review of \"{document}\"."))
                    .with_attachment(Attachment::ReviewCard {
                        review: outcome.review,
                    });
                self.emit(message).await;
            }
            Err(e) => {
                warn!(document, error = %e, "Document review failed");
                self.emit(Message::assistant(REVIEW_APOLOGY)).await;
            }
        }
    }

    // ── Proactive suggestions ───────────────────────────────────────

    /// Fire the automatic first suggestion if its conditions hold.
    /// Returns whether a fetch ran.
    pub async fn evaluate_auto_fetch(&self) -> bool {
        let coordinates = {
            let mut state = self.inner.state.write().await;
            let Some(coordinates) = state.auto_fetch_ready() else {
                return false;
            };
            state.auto_fetch_attempted = true;
            self.set_gate_locked(&mut state, Gate::Busy(Operation::ProactiveFetch));
            coordinates
        };

        info!("All permissions granted, fetching first suggestion");
        self.fetch_proactive_suggestion(coordinates).await;
        self.release_gate().await;
        true
    }

    /// Generate a suggestion for `coordinates`. The caller holds the gate.
    async fn fetch_proactive_suggestion(&self, coordinates: Coordinates) {
        self.emit(Message::system(CHECKING_DATA)).await;

        let request = SuggestionRequest {
            user_name: &self.inner.config.user_name,
            coordinates,
            tasks: &self.inner.deps.tasks,
            calendar: &self.inner.deps.calendar,
        };

        match guarded(self.inner.deps.suggestions.suggest(request)).await {
            Ok(outcome) => {
                let task = outcome.suggestion.task;
                let message = Message::assistant(outcome.suggestion.text)
                    .with_attachment(Attachment::SuggestionCard { task: task.clone() })
                    .with_citations(outcome.citations);

                let mut state = self.inner.state.write().await;
                let id = self.emit_locked(&mut state, message);
                state.suggestions.propose(id, task);
                info!(message_id = %id, "Suggestion proposed");
            }
            Err(e) => {
                warn!(error = %e, "Proactive suggestion failed");
                self.emit(Message::assistant(SUGGESTION_APOLOGY)).await;
            }
        }
    }

    /// Accept a proposed suggestion: retire its buttons and show walking
    /// directions.
    pub async fn accept_suggestion(&self, id: MessageId) -> Result<MessageId, LifecycleError> {
        self.resolve_suggestion(id, SuggestionState::Accepted).await
    }

    /// Snooze a proposed suggestion: retire its buttons and acknowledge.
    pub async fn snooze_suggestion(&self, id: MessageId) -> Result<MessageId, LifecycleError> {
        self.resolve_suggestion(id, SuggestionState::Snoozed).await
    }

    async fn resolve_suggestion(
        &self,
        id: MessageId,
        target: SuggestionState,
    ) -> Result<MessageId, LifecycleError> {
        if !target.is_terminal() {
            return Err(LifecycleError::InvalidTarget(target));
        }

        let follow_up = {
            let mut state = self.inner.state.write().await;
            if state.closed {
                debug!(message_id = %id, "Ignoring suggestion action for closed session");
                return Err(LifecycleError::Closed);
            }
            let task = state.suggestions.resolve(id, target)?;
            let _ = self.inner.tx.send(SessionEvent::SuggestionResolved { id, state: target });
            info!(message_id = %id, state = %target, task = %task.name, "Suggestion resolved");

            let message = match target {
                SuggestionState::Accepted => {
                    let url = walking_directions_url(&task.address);
                    Message::assistant(format!("Great! Here are walking directions to {}.", task.name))
                        .with_attachment(Attachment::DirectionsCard { task, url })
                }
                SuggestionState::Snoozed => Message::assistant(SNOOZE_ACK),
                SuggestionState::Proposed => unreachable!("rejected above"),
            };
            self.emit_locked(&mut state, message)
        };

        self.evaluate_auto_fetch().await;
        Ok(follow_up)
    }

    // ── Permissions ─────────────────────────────────────────────────

    /// Record a permission status change and react to it.
    ///
    /// Granting location triggers a position capture; if that capture fails
    /// the location permission is set back to `Denied`.
    pub async fn handle_permission_update(
        &self,
        capability: Capability,
        status: PermissionStatus,
    ) {
        let previous = {
            let mut state = self.inner.state.write().await;
            if state.closed {
                debug!(%capability, %status, "Ignoring permission update for closed session");
                return;
            }
            self.write_permission_locked(&mut state, capability, status)
        };

        if previous != status && !previous.can_transition_to(status) {
            debug!(%capability, from = %previous, to = %status, "Out-of-order permission transition");
        }

        match (status, capability) {
            (PermissionStatus::Granted, Capability::AccountLink) => {
                let text = format!(
                    "Great! I've connected to your Google account, {}.",
                    self.inner.config.user_name
                );
                self.emit(Message::system(text)).await;
            }
            (PermissionStatus::Granted, Capability::Location) => {
                self.emit(Message::system(FINDING_YOU)).await;
                self.capture_location().await;
            }
            (PermissionStatus::Granted, Capability::Notifications) => {
                self.emit(Message::system(NOTIFICATIONS_ON)).await;
            }
            (PermissionStatus::Denied, capability) => {
                let text = format!(
                    "I'll need {} access to be most helpful. You can grant it in your settings later.",
                    capability.label()
                );
                self.emit(Message::system(text)).await;
            }
            (PermissionStatus::Pending | PermissionStatus::Idle, _) => {}
        }

        self.evaluate_auto_fetch().await;
    }

    /// Like [`handle_permission_update`](Self::handle_permission_update),
    /// on a background task.
    pub fn update_permission(
        &self,
        capability: Capability,
        status: PermissionStatus,
    ) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move { engine.handle_permission_update(capability, status).await })
    }

    fn write_permission_locked(
        &self,
        state: &mut SessionState,
        capability: Capability,
        status: PermissionStatus,
    ) -> PermissionStatus {
        let previous = state.permissions.update(capability, status);
        info!(%capability, from = %previous, to = %status, "Permission updated");
        let _ = self
            .inner
            .tx
            .send(SessionEvent::PermissionChanged { capability, status });
        previous
    }

    /// Capture the device position once; on failure downgrade location to
    /// `Denied`.
    async fn capture_location(&self) {
        if self.coordinates().await.is_some() {
            debug!("Position already captured");
            self.emit(Message::system(LOCATION_FOUND)).await;
            return;
        }

        match self.inner.deps.geolocator.capture().await {
            Ok(coordinates) => {
                let mut state = self.inner.state.write().await;
                if state.closed {
                    debug!("Discarding position captured after close");
                    return;
                }
                if state.coordinates.is_none() {
                    state.coordinates = Some(coordinates);
                    info!(
                        latitude = coordinates.latitude,
                        longitude = coordinates.longitude,
                        "Position captured"
                    );
                }
                self.emit_locked(&mut state, Message::system(LOCATION_FOUND));
            }
            Err(e) => {
                warn!(error = %e, "Geolocation failed, revoking location permission");
                let mut state = self.inner.state.write().await;
                if !state.closed {
                    self.write_permission_locked(
                        &mut state,
                        Capability::Location,
                        PermissionStatus::Denied,
                    );
                }
                self.emit_locked(&mut state, Message::system(LOCATION_FAILED));
            }
        }
    }
}

/// Google Maps walking directions to `address`.
pub fn walking_directions_url(address: &str) -> String {
    url::Url::parse_with_params(
        "https://www.google.com/maps/dir/",
        &[
            ("api", "1"),
            ("destination", address),
            ("travelmode", "walking"),
        ],
    )
    .map(|u| u.to_string())
    .unwrap_or_else(|_| "https://www.google.com/maps".to_string())
}

/// Await a provider call, turning a panic inside it into a `ProviderError`
/// so the gate is always released.
async fn guarded<T, F>(call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::RequestFailed {
            provider: "collaborator".to_string(),
            reason: "provider panicked".to_string(),
        }),
    }
}
