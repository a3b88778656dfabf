//! The scripted opening of a session: a greeting, then the permission
//! prompt.

use std::time::Duration;

use crate::config::SessionConfig;
use crate::conversation::model::{Attachment, Message, Origin};

pub const GREETING: &str =
    "Hi, I'm your proactive GTD assistant, ready to help you get things done.";
pub const PERMISSION_PROMPT: &str = "To suggest relevant tasks, I need to connect to a few \
                                     things. This will allow me to understand when you have free time and where you are.";

/// One scripted message, shown `delay` after the previous step.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptStep {
    pub delay: Duration,
    pub text: String,
    pub origin: Origin,
    pub attachment: Attachment,
}

impl ScriptStep {
    pub fn new(delay: Duration, text: impl Into<String>) -> Self {
        Self {
            delay,
            text: text.into(),
            origin: Origin::Assistant,
            attachment: Attachment::None,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = attachment;
        self
    }

    pub fn to_message(&self) -> Message {
        Message::new(self.text.clone(), self.origin).with_attachment(self.attachment.clone())
    }
}

/// Ordered onboarding steps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OnboardingScript {
    steps: Vec<ScriptStep>,
}

impl OnboardingScript {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self { steps }
    }

    /// Greeting after `greeting_delay`, permission prompt after
    /// `permission_prompt_delay` more.
    pub fn standard(config: &SessionConfig) -> Self {
        Self::new(vec![
            ScriptStep::new(config.greeting_delay, GREETING),
            ScriptStep::new(config.permission_prompt_delay, PERMISSION_PROMPT)
                .with_attachment(Attachment::PermissionPrompt),
        ])
    }

    pub fn steps(&self) -> &[ScriptStep] {
        &self.steps
    }

    /// Time from session start until the last step is shown.
    pub fn total_delay(&self) -> Duration {
        self.steps.iter().map(|s| s.delay).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_script_order_and_timing() {
        let script = OnboardingScript::standard(&SessionConfig::default());
        let steps = script.steps();
        assert_eq!(steps.len(), 2);

        assert_eq!(steps[0].text, GREETING);
        assert_eq!(steps[0].delay, Duration::from_millis(1000));
        assert!(steps[0].attachment.is_none());

        assert_eq!(steps[1].text, PERMISSION_PROMPT);
        assert_eq!(steps[1].delay, Duration::from_millis(1500));
        assert_eq!(steps[1].attachment, Attachment::PermissionPrompt);

        assert_eq!(script.total_delay(), Duration::from_millis(2500));
    }

    #[test]
    fn steps_are_assistant_messages() {
        let script = OnboardingScript::standard(&SessionConfig::without_delays());
        for step in script.steps() {
            let msg = step.to_message();
            assert_eq!(msg.origin, Origin::Assistant);
            assert_eq!(msg.text, step.text);
        }
        assert_eq!(script.total_delay(), Duration::ZERO);
    }
}
