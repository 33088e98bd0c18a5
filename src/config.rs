//! Client configuration.

use std::time::Duration;

/// Fallback mode id used when the backend reports nothing usable.
pub const DEFAULT_MODE_ID: &str = "agent-full";

/// Fallback model id used for session initialization only; the real list is
/// backend-reported.
pub const DEFAULT_MODEL_ID: &str = "gpt-5.2-high";

/// Built-in slash commands, used until the backend announces its own set.
pub const DEFAULT_SLASH_COMMANDS: &[&str] = &[
    "review",
    "review-branch",
    "review-commit",
    "init",
    "compact",
    "undo",
    "logout",
];

const DEFAULT_ENHANCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Instruction prepended to prompt-enhancement requests.
pub const ENHANCE_SYSTEM_PROMPT: &str = "\
You are a prompt optimization assistant for an AI coding agent. Rewrite the \
user's request into a precise, actionable prompt: clarify the core task and \
scope, add inferable technical constraints (language, error handling, edge \
cases), and keep the user's voice and language. Output ONLY the improved \
prompt, with no preamble and no explanation.";

/// Tunables for one [`crate::Client`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub default_mode_id: String,
    pub default_model_id: String,
    pub default_cwd: String,
    pub enhance_timeout: Duration,
    pub enhance_system_prompt: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_mode_id: DEFAULT_MODE_ID.to_string(),
            default_model_id: DEFAULT_MODEL_ID.to_string(),
            default_cwd: ".".to_string(),
            enhance_timeout: DEFAULT_ENHANCE_TIMEOUT,
            enhance_system_prompt: ENHANCE_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn with_default_mode(mut self, mode_id: impl Into<String>) -> Self {
        self.default_mode_id = mode_id.into();
        self
    }

    #[must_use]
    pub fn with_default_model(mut self, model_id: impl Into<String>) -> Self {
        self.default_model_id = model_id.into();
        self
    }

    #[must_use]
    pub fn with_default_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.default_cwd = cwd.into();
        self
    }

    #[must_use]
    pub fn with_enhance_timeout(mut self, timeout: Duration) -> Self {
        self.enhance_timeout = timeout;
        self
    }
}
