//! Contract between the client core and the native agent backend.
//!
//! The backend is a black box reached through two surfaces: awaited
//! request/response calls ([`BackendClient`]) and asynchronously delivered
//! event channels ([`BackendEvent`]). This crate defines only those surfaces;
//! transport, process management, and protocol details belong to backend
//! implementations.
//!
//! Loose payload portions (tool calls, option lists, config updates) are
//! carried as raw `serde_json::Value` on purpose: `agent_events` is the
//! single place that interprets them.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// Backend-owned, connection-scoped session identifier.
pub type BackendSessionId = String;

/// Error surfaced by a backend call.
///
/// Call failures are session-scoped notices at the client layer, never
/// process-fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("backend transport failed: {0}")]
    Transport(String),

    #[error("backend rejected the request: {0}")]
    Rejected(String),

    #[error("backend call timed out")]
    Timeout,

    #[error("backend connection closed")]
    Closed,
}

impl BackendError {
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}

/// Result of `initialize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeOutcome {
    pub agent_info: Value,
    pub auth_methods: Vec<Value>,
    pub protocol_version: Value,
}

/// Result of `create_session`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionOutcome {
    pub session_id: BackendSessionId,
    /// Raw mode descriptor (`currentModeId` / `availableModes`), when sent.
    pub modes: Option<Value>,
    /// Raw model descriptor (`currentModelId` / `availableModels`), when sent.
    pub models: Option<Value>,
    /// Raw config-option list, when sent.
    pub config_options: Option<Value>,
}

impl NewSessionOutcome {
    #[must_use]
    pub fn new(session_id: impl Into<BackendSessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            modes: None,
            models: None,
            config_options: None,
        }
    }
}

/// Result of `send_prompt`: the backend's stop reason for the turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptOutcome {
    pub stop_reason: Value,
}

/// One event delivered on the backend's event channels.
///
/// Events for a given session arrive in backend-delivery order; events for
/// different sessions may interleave arbitrarily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum BackendEvent {
    /// Streamed assistant answer text.
    MessageChunk {
        session_id: BackendSessionId,
        text: String,
    },
    /// Streamed reasoning text, distinct from the final answer.
    ThoughtChunk {
        session_id: BackendSessionId,
        text: String,
    },
    /// User prompt replayed from history (session resume).
    UserMessage {
        session_id: BackendSessionId,
        text: String,
    },
    /// A tool call was created or re-announced.
    ToolCall {
        session_id: BackendSessionId,
        tool_call: Value,
    },
    /// Partial patch for an already-announced tool call.
    ToolCallUpdate {
        session_id: BackendSessionId,
        update: Value,
    },
    /// The backend needs user permission before continuing.
    ApprovalRequest {
        session_id: BackendSessionId,
        request_id: String,
        tool_call: Value,
        options: Vec<Value>,
    },
    /// Plan/checklist snapshot from the planning tool.
    Plan {
        session_id: BackendSessionId,
        plan: Value,
    },
    /// Slash-command inventory changed.
    AvailableCommands {
        session_id: BackendSessionId,
        update: Value,
    },
    /// The backend switched modes on its own.
    CurrentMode {
        session_id: BackendSessionId,
        update: Value,
    },
    /// Config options (including mode/model lists) changed.
    ConfigOptionUpdate {
        session_id: BackendSessionId,
        update: Value,
    },
    /// Context-window usage report.
    TokenUsage {
        session_id: BackendSessionId,
        percent_remaining: Option<f64>,
    },
    /// The turn finished; all streaming state for the session should seal.
    TurnComplete {
        session_id: BackendSessionId,
        stop_reason: Value,
    },
    /// The backend reported an error. `session_id` is absent for
    /// process-level errors.
    Error {
        session_id: Option<BackendSessionId>,
        message: String,
    },
}

impl BackendEvent {
    /// Returns the backend session this event belongs to, when it names one.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::MessageChunk { session_id, .. }
            | Self::ThoughtChunk { session_id, .. }
            | Self::UserMessage { session_id, .. }
            | Self::ToolCall { session_id, .. }
            | Self::ToolCallUpdate { session_id, .. }
            | Self::ApprovalRequest { session_id, .. }
            | Self::Plan { session_id, .. }
            | Self::AvailableCommands { session_id, .. }
            | Self::CurrentMode { session_id, .. }
            | Self::ConfigOptionUpdate { session_id, .. }
            | Self::TokenUsage { session_id, .. }
            | Self::TurnComplete { session_id, .. } => Some(session_id),
            Self::Error { session_id, .. } => session_id.as_deref(),
        }
    }
}

impl fmt::Display for BackendEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MessageChunk { .. } => "message-chunk",
            Self::ThoughtChunk { .. } => "thought-chunk",
            Self::UserMessage { .. } => "user-message",
            Self::ToolCall { .. } => "tool-call",
            Self::ToolCallUpdate { .. } => "tool-call-update",
            Self::ApprovalRequest { .. } => "approval-request",
            Self::Plan { .. } => "plan",
            Self::AvailableCommands { .. } => "available-commands",
            Self::CurrentMode { .. } => "current-mode",
            Self::ConfigOptionUpdate { .. } => "config-option-update",
            Self::TokenUsage { .. } => "token-usage",
            Self::TurnComplete { .. } => "turn-complete",
            Self::Error { .. } => "error",
        };
        f.write_str(name)
    }
}

/// Asynchronous request/response surface of the agent backend.
///
/// Every method is awaited from the client's single event loop; a slow call
/// for one session must never block event handling for another, so
/// implementations are expected to be genuinely asynchronous.
#[async_trait]
pub trait BackendClient: Send + Sync + 'static {
    /// Performs one-time process initialization.
    async fn initialize(&self) -> Result<InitializeOutcome, BackendError>;

    /// Creates a backend session rooted at `cwd`.
    async fn create_session(&self, cwd: &str) -> Result<NewSessionOutcome, BackendError>;

    /// Sends one user prompt; resolves when the turn is accepted.
    async fn send_prompt(
        &self,
        session_id: &str,
        content: &str,
    ) -> Result<PromptOutcome, BackendError>;

    /// Requests cancellation of the in-flight turn. Finalization still
    /// arrives through the session's own turn-complete/error event.
    async fn cancel(&self, session_id: &str) -> Result<(), BackendError>;

    /// Switches the session's mode.
    async fn set_mode(&self, session_id: &str, mode_id: &str) -> Result<(), BackendError>;

    /// Switches the session's model.
    async fn set_model(&self, session_id: &str, model_id: &str) -> Result<(), BackendError>;

    /// Sets an arbitrary config option.
    async fn set_config_option(
        &self,
        session_id: &str,
        option_id: &str,
        value: &Value,
    ) -> Result<(), BackendError>;

    /// Answers an approval request with the chosen option.
    async fn approve(
        &self,
        session_id: &str,
        request_id: &str,
        option_id: Option<&str>,
    ) -> Result<(), BackendError>;

    /// Subscribes to the backend event channels.
    ///
    /// Each call returns an independent receiver; subscribers that fall
    /// behind observe `Lagged` and continue from the oldest retained event.
    fn subscribe(&self) -> broadcast::Receiver<BackendEvent>;
}
