//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::{ConfigError, Result};
use crate::providers::Coordinates;
use crate::providers::fixtures::DEFAULT_USER_NAME;

/// Session configuration: who the user is and how the scripted parts of
/// the conversation are paced.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// First name used in greetings and suggestions.
    pub user_name: String,
    /// Delay before the onboarding greeting.
    pub greeting_delay: Duration,
    /// Further delay before the permission prompt.
    pub permission_prompt_delay: Duration,
    /// Delay before the capability description for unrouted input.
    pub fallback_delay: Duration,
    /// Delay between replayed review status messages.
    pub status_delay: Duration,
    /// Delay between the last status message and the review result.
    pub review_result_delay: Duration,
    /// Maximum messages retained in the log (`None` = unbounded).
    pub max_history: Option<usize>,
    /// Capacity of the session event broadcast channel.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_name: DEFAULT_USER_NAME.to_string(),
            greeting_delay: Duration::from_millis(1000),
            permission_prompt_delay: Duration::from_millis(1500),
            fallback_delay: Duration::from_millis(1000),
            status_delay: Duration::from_millis(900),
            review_result_delay: Duration::from_millis(600),
            max_history: None,
            event_capacity: 256,
        }
    }
}

impl SessionConfig {
    /// Same as the default configuration but with every scripted delay zeroed.
    pub fn without_delays() -> Self {
        Self {
            greeting_delay: Duration::ZERO,
            permission_prompt_delay: Duration::ZERO,
            fallback_delay: Duration::ZERO,
            status_delay: Duration::ZERO,
            review_result_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Build config from `GTD_ASSIST_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> std::result::Result<Self, ConfigError> {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| -> std::result::Result<Duration, ConfigError> {
            match lookup(key) {
                Some(raw) => parse_number::<u64>(key, &raw).map(Duration::from_millis),
                None => Ok(default),
            }
        };

        let max_history = match lookup("GTD_ASSIST_MAX_HISTORY") {
            Some(raw) => match parse_number::<usize>("GTD_ASSIST_MAX_HISTORY", &raw)? {
                0 => None,
                n => Some(n),
            },
            None => defaults.max_history,
        };

        Ok(Self {
            user_name: lookup("GTD_ASSIST_USER_NAME")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.user_name),
            greeting_delay: millis("GTD_ASSIST_GREETING_DELAY_MS", defaults.greeting_delay)?,
            permission_prompt_delay: millis(
                "GTD_ASSIST_PROMPT_DELAY_MS",
                defaults.permission_prompt_delay,
            )?,
            fallback_delay: millis("GTD_ASSIST_FALLBACK_DELAY_MS", defaults.fallback_delay)?,
            status_delay: millis("GTD_ASSIST_STATUS_DELAY_MS", defaults.status_delay)?,
            review_result_delay: millis(
                "GTD_ASSIST_RESULT_DELAY_MS",
                defaults.review_result_delay,
            )?,
            max_history,
            event_capacity: defaults.event_capacity,
        })
    }
}

/// Gemini provider configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
    /// Maximum function-calling rounds for one document review.
    pub max_tool_turns: usize,
}

impl GeminiConfig {
    /// Build config from environment variables.
    /// Returns `None` if `GEMINI_API_KEY` is not set (offline mode).
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let api_key = lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty())?;

        let model = lookup("GTD_ASSIST_MODEL").unwrap_or_else(|| "gemini-2.5-pro".to_string());

        let base_url = lookup("GTD_ASSIST_GEMINI_URL")
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string());

        let max_tool_turns: usize = lookup("GTD_ASSIST_MAX_TOOL_TURNS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(6);

        Some(Self {
            api_key: SecretString::from(api_key),
            model,
            base_url,
            max_tool_turns,
        })
    }
}

/// Everything the terminal front end needs to start a session.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub session: SessionConfig,
    /// `None` runs against the offline fixtures.
    pub gemini: Option<GeminiConfig>,
    pub position: Option<Coordinates>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            session: SessionConfig::from_lookup(&lookup)?,
            gemini: GeminiConfig::from_lookup(&lookup),
            position: position_from_lookup(&lookup)?,
        })
    }
}

/// Device position from `GTD_ASSIST_LATITUDE` and `GTD_ASSIST_LONGITUDE`.
/// `Ok(None)` when neither is set.
fn position_from_lookup(
    lookup: impl Fn(&str) -> Option<String>,
) -> std::result::Result<Option<Coordinates>, ConfigError> {
    match (lookup("GTD_ASSIST_LATITUDE"), lookup("GTD_ASSIST_LONGITUDE")) {
        (None, None) => Ok(None),
        (Some(lat), Some(lng)) => {
            let latitude: f64 = parse_number("GTD_ASSIST_LATITUDE", &lat)?;
            let longitude: f64 = parse_number("GTD_ASSIST_LONGITUDE", &lng)?;
            if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
                return Err(ConfigError::InvalidValue {
                    key: "GTD_ASSIST_LATITUDE/GTD_ASSIST_LONGITUDE".to_string(),
                    message: format!("({latitude}, {longitude}) is outside WGS84 range"),
                });
            }
            Ok(Some(Coordinates {
                latitude,
                longitude,
            }))
        }
        (Some(_), None) => Err(ConfigError::MissingEnvVar("GTD_ASSIST_LONGITUDE".to_string())),
        (None, Some(_)) => Err(ConfigError::MissingEnvVar("GTD_ASSIST_LATITUDE".to_string())),
    }
}

fn parse_number<T>(key: &str, raw: &str) -> std::result::Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?}: {e}"),
    })
}
