use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use transcript::{Entry, ThinkingPhase};
use uuid::Uuid;

use crate::error::StoreError;

pub const STORE_VERSION: u32 = 1;

/// One persisted chat session (a sidebar tab).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    pub created_at: String,
}

impl ChatSession {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        created_at: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            cwd: None,
            mode_id: None,
            model_id: None,
            created_at: created_at.into(),
        }
    }

    /// Creates a fresh session with a generated id and the current UTC time.
    pub fn create(title: impl Into<String>) -> Result<Self, StoreError> {
        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(StoreError::ClockFormat)?;
        Ok(Self::new(Uuid::new_v4().to_string(), title, created_at))
    }
}

/// The full persisted state: sessions, selection, and transcripts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub sessions: Vec<ChatSession>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_session_id: Option<String>,
    #[serde(default)]
    pub entries_by_session: HashMap<String, Vec<Entry>>,
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STORE_VERSION,
            sessions: Vec::new(),
            selected_session_id: None,
            entries_by_session: HashMap::new(),
        }
    }

    /// Seals every entry: a restored transcript never claims to still be
    /// streaming.
    pub fn seal_streaming(&mut self) {
        for entries in self.entries_by_session.values_mut() {
            for entry in entries.iter_mut() {
                entry.is_streaming = false;
                if let Some(thinking) = entry.thinking.as_mut() {
                    thinking.is_streaming = false;
                    thinking.phase = ThinkingPhase::Done;
                }
            }
        }
    }

    /// Drops transcripts that no longer have a session, and empties the
    /// selection when the selected session is gone.
    pub fn reconcile(&mut self) {
        let known: Vec<&str> = self.sessions.iter().map(|session| session.id.as_str()).collect();
        self.entries_by_session
            .retain(|session_id, _| known.contains(&session_id.as_str()));

        if let Some(selected) = &self.selected_session_id {
            if !known.contains(&selected.as_str()) {
                self.selected_session_id = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use transcript::{Role, ThinkingData};

    use super::*;

    #[test]
    fn seal_streaming_closes_entries_and_sidecars() {
        let mut entry = Entry::new("entry-1", Role::Assistant);
        entry.is_streaming = true;
        entry.thinking = Some(ThinkingData {
            content: "…".to_string(),
            is_streaming: true,
            phase: ThinkingPhase::Thinking,
            start_time: Some(1),
            duration: None,
        });

        let mut snapshot = StoreSnapshot::new();
        snapshot
            .entries_by_session
            .insert("chat-1".to_string(), vec![entry]);
        snapshot.seal_streaming();

        let sealed = &snapshot.entries_by_session["chat-1"][0];
        assert!(!sealed.is_streaming);
        let thinking = sealed.thinking.as_ref().expect("sidecar kept");
        assert!(!thinking.is_streaming);
        assert_eq!(thinking.phase, ThinkingPhase::Done);
    }

    #[test]
    fn reconcile_drops_orphaned_transcripts_and_stale_selection() {
        let mut snapshot = StoreSnapshot::new();
        snapshot.sessions.push(ChatSession::new(
            "chat-1",
            "First",
            "2026-08-06T00:00:00Z",
        ));
        snapshot
            .entries_by_session
            .insert("chat-1".to_string(), Vec::new());
        snapshot
            .entries_by_session
            .insert("deleted".to_string(), Vec::new());
        snapshot.selected_session_id = Some("deleted".to_string());

        snapshot.reconcile();

        assert!(snapshot.entries_by_session.contains_key("chat-1"));
        assert!(!snapshot.entries_by_session.contains_key("deleted"));
        assert_eq!(snapshot.selected_session_id, None);
    }
}
