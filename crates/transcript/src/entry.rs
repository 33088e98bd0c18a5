//! Conversation entries: one slot each in a session's ordered transcript.

use agent_events::{PlanStep, ToolCallRecord};
use serde::{Deserialize, Serialize};

/// Who produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Thought,
    Tool,
}

/// Phase of a thinking sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingPhase {
    Working,
    Thinking,
    Done,
}

/// Reasoning text attached to a `thought` or `assistant` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingData {
    pub content: String,
    pub is_streaming: bool,
    pub phase: ThinkingPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
    /// Final thinking duration in seconds, set when the sidecar closes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// One entry in a session transcript.
///
/// Entries are append-only in position. `timestamp` is stamped once the
/// entry stops streaming; its absence marks an entry as still open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plan_steps: Vec<PlanStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
    pub is_streaming: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl Entry {
    #[must_use]
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            content: String::new(),
            thinking: None,
            plan_steps: Vec::new(),
            tool_calls: Vec::new(),
            is_streaming: false,
            timestamp: None,
        }
    }

    /// True when the entry carries activity the grouping engine extracts
    /// into a working group (thinking sidecar or tool calls).
    #[must_use]
    pub fn has_working_activity(&self) -> bool {
        self.thinking.is_some() || !self.tool_calls.is_empty()
    }
}
