//! Session bootstrap — plays the onboarding script into a fresh
//! conversation exactly once.

pub mod script;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::conversation::ConversationEngine;
use crate::conversation::model::MessageId;
use crate::error::SessionError;

pub use script::{GREETING, OnboardingScript, PERMISSION_PROMPT, ScriptStep};

/// Emits the onboarding script into an engine.
#[derive(Debug, Clone)]
pub struct SessionBootstrapper {
    script: OnboardingScript,
}

impl SessionBootstrapper {
    pub fn new(script: OnboardingScript) -> Self {
        Self { script }
    }

    /// Bootstrapper for the standard greeting and permission prompt,
    /// timed from the engine's config.
    pub fn standard(engine: &ConversationEngine) -> Self {
        Self::new(OnboardingScript::standard(engine.config()))
    }

    /// Play every step, waiting each step's delay first.
    ///
    /// Fails without emitting anything if this engine was already
    /// bootstrapped or is closed. A session closed mid-script stops
    /// emitting.
    pub async fn run(&self, engine: &ConversationEngine) -> Result<Vec<MessageId>, SessionError> {
        engine.begin_onboarding().await?;
        info!(steps = self.script.steps().len(), "Starting onboarding");

        let mut ids = Vec::with_capacity(self.script.steps().len());
        for step in self.script.steps() {
            tokio::time::sleep(step.delay).await;
            if engine.is_closed().await {
                debug!("Session closed during onboarding");
                return Err(SessionError::Closed);
            }
            ids.push(engine.append_message(step.to_message()).await);
        }
        Ok(ids)
    }

    /// Run on a background task.
    pub fn spawn(
        self,
        engine: ConversationEngine,
    ) -> JoinHandle<Result<Vec<MessageId>, SessionError>> {
        tokio::spawn(async move { self.run(&engine).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::SessionConfig;
    use crate::conversation::model::Attachment;
    use crate::conversation::{EngineDeps, KeywordClassifier};
    use crate::providers::StaticGeolocator;
    use crate::providers::fixtures::{FixtureDocuments, FixtureSuggestions};

    fn engine(config: SessionConfig) -> ConversationEngine {
        ConversationEngine::new(
            config,
            EngineDeps {
                suggestions: Arc::new(FixtureSuggestions),
                reviews: Arc::new(FixtureDocuments::default()),
                geolocator: Arc::new(StaticGeolocator::default()),
                classifier: Arc::new(KeywordClassifier),
                tasks: Vec::new(),
                calendar: Vec::new(),
            },
        )
    }

    #[tokio::test]
    async fn emits_greeting_then_prompt() {
        let engine = engine(SessionConfig::without_delays());
        let ids = SessionBootstrapper::standard(&engine)
            .run(&engine)
            .await
            .unwrap();

        let messages = engine.messages().await;
        assert_eq!(ids.len(), 2);
        assert_eq!(messages[0].text, GREETING);
        assert_eq!(messages[1].text, PERMISSION_PROMPT);
        assert_eq!(messages[1].attachment, Attachment::PermissionPrompt);
        assert_eq!(messages[1].id, ids[1]);
    }

    #[tokio::test]
    async fn runs_once_per_session() {
        let engine = engine(SessionConfig::without_delays());
        let bootstrapper = SessionBootstrapper::standard(&engine);
        bootstrapper.run(&engine).await.unwrap();
        assert_eq!(
            bootstrapper.run(&engine).await,
            Err(SessionError::AlreadyBootstrapped)
        );
        assert_eq!(engine.messages().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn honors_scripted_delays() {
        let engine = engine(SessionConfig::default());
        let handle = SessionBootstrapper::standard(&engine).spawn(engine.clone());

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert!(engine.messages().await.is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(engine.messages().await.len(), 1);

        tokio::time::sleep(Duration::from_millis(1499)).await;
        assert_eq!(engine.messages().await.len(), 1);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(engine.messages().await.len(), 2);
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn close_mid_script_stops_emitting() {
        let engine = engine(SessionConfig::default());
        let handle = SessionBootstrapper::standard(&engine).spawn(engine.clone());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        engine.close().await;

        assert_eq!(handle.await.unwrap(), Err(SessionError::Closed));
        let messages = engine.messages().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, GREETING);
    }
}
