//! The per-session streaming state machine.
//!
//! Each session tracks an ordered entry list plus a [`StreamPhase`] that
//! makes the open/close/reopen rules explicit:
//!
//! - a thought chunk appends to an open thought or opens a new one;
//! - an assistant chunk always terminates an in-flight thought, then appends
//!   to the open assistant entry, reopens a just-closed one inside the grace
//!   window, or opens a new one;
//! - an unseen tool call interrupts any open prose before appending;
//! - turn completion seals every streaming entry and arms the grace window
//!   when the transcript ends in an assistant entry.

use std::collections::HashMap;
use std::sync::Arc;

use agent_events::{PlanStep, ToolCallRecord};
use serde_json::Value;

use crate::clock::Clock;
use crate::entry::{Entry, Role, ThinkingData, ThinkingPhase};

/// How long after closing an assistant entry a late chunk still merges into
/// it instead of opening a new entry.
///
/// This compensates for the backend emitting a final chunk fractionally
/// after marking turn state; the real fix is a well-ordered completion
/// signal upstream.
pub const ASSISTANT_APPEND_GRACE_MS: u64 = 1_500;

/// Streaming state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPhase {
    #[default]
    Idle,
    /// A thought entry is open at the tail of the transcript.
    ThoughtOpen,
    /// An assistant entry is open at the tail of the transcript.
    AssistantOpen,
    /// The tail assistant entry closed at `closed_at`; late chunks may still
    /// reopen it within [`ASSISTANT_APPEND_GRACE_MS`].
    AssistantGrace { closed_at: u64 },
    /// The tail entry is a tool entry with outstanding work.
    ToolActive,
}

#[derive(Debug, Default)]
struct SessionState {
    entries: Vec<Entry>,
    phase: StreamPhase,
}

/// All sessions' transcripts, keyed by chat-session id.
///
/// Every operation is scoped to one session; no operation reads or writes
/// another session's entries.
pub struct Transcripts {
    clock: Arc<dyn Clock>,
    sessions: HashMap<String, SessionState>,
    next_entry_id: u64,
}

impl Transcripts {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            sessions: HashMap::new(),
            next_entry_id: 0,
        }
    }

    /// Returns the session's entries in insertion order.
    #[must_use]
    pub fn entries(&self, session_id: &str) -> &[Entry] {
        self.sessions
            .get(session_id)
            .map(|state| state.entries.as_slice())
            .unwrap_or_default()
    }

    /// Returns the session's current streaming phase.
    #[must_use]
    pub fn phase(&self, session_id: &str) -> StreamPhase {
        self.sessions
            .get(session_id)
            .map(|state| state.phase)
            .unwrap_or_default()
    }

    /// Drops all state for a session.
    pub fn remove_session(&mut self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    /// Replaces a session's entries wholesale (history restore). All entries
    /// are sealed; the phase resets to idle.
    pub fn restore_session(&mut self, session_id: &str, entries: Vec<Entry>) {
        let state = self.sessions.entry(session_id.to_string()).or_default();
        state.entries = entries;
        state.phase = StreamPhase::Idle;
    }

    fn next_id(&mut self) -> String {
        self.next_entry_id += 1;
        format!("entry-{}", self.next_entry_id)
    }

    fn state_mut(&mut self, session_id: &str) -> &mut SessionState {
        self.sessions.entry(session_id.to_string()).or_default()
    }

    /// Appends a finalized user entry. User entries never stream.
    pub fn push_user(&mut self, session_id: &str, text: &str) -> &Entry {
        let now = self.clock.now_ms();
        let id = self.next_id();
        let state = self.state_mut(session_id);

        let mut entry = Entry::new(id, Role::User);
        entry.content = text.to_string();
        entry.timestamp = Some(now);
        state.entries.push(entry);
        state.phase = StreamPhase::Idle;
        state.entries.last().expect("entry just pushed")
    }

    /// Appends reasoning text to the open thought entry, or opens one.
    pub fn append_thought(&mut self, session_id: &str, text: &str) {
        let now = self.clock.now_ms();
        let open = self.phase(session_id) == StreamPhase::ThoughtOpen;
        let id = if open { None } else { Some(self.next_id()) };
        let state = self.state_mut(session_id);

        if open {
            if let Some(entry) = state
                .entries
                .iter_mut()
                .rev()
                .find(|entry| entry.role == Role::Thought && entry.is_streaming)
            {
                entry.content.push_str(text);
                if let Some(thinking) = entry.thinking.as_mut() {
                    thinking.content.push_str(text);
                } else {
                    entry.thinking = Some(ThinkingData {
                        content: entry.content.clone(),
                        is_streaming: true,
                        phase: ThinkingPhase::Thinking,
                        start_time: Some(now),
                        duration: None,
                    });
                }
                return;
            }
        }

        let mut entry = Entry::new(id.unwrap_or_else(|| format!("entry-{now}")), Role::Thought);
        entry.content = text.to_string();
        entry.is_streaming = true;
        entry.thinking = Some(ThinkingData {
            content: text.to_string(),
            is_streaming: true,
            phase: ThinkingPhase::Thinking,
            start_time: Some(now),
            duration: None,
        });
        state.entries.push(entry);
        state.phase = StreamPhase::ThoughtOpen;
    }

    /// Appends answer text. Terminates an in-flight thought, then appends to
    /// the open assistant entry, reopens one inside the grace window, or
    /// opens a new entry.
    pub fn append_assistant(&mut self, session_id: &str, text: &str) {
        let now = self.clock.now_ms();
        let mut phase = self.phase(session_id);
        let id = self.next_id();
        let state = self.state_mut(session_id);

        if phase == StreamPhase::ThoughtOpen {
            close_active_thought(&mut state.entries, now);
            phase = StreamPhase::Idle;
        }

        let reopen_within_grace = matches!(
            phase,
            StreamPhase::AssistantGrace { closed_at }
                if now.saturating_sub(closed_at) <= ASSISTANT_APPEND_GRACE_MS
        );

        if phase == StreamPhase::AssistantOpen || reopen_within_grace {
            if let Some(entry) = state
                .entries
                .iter_mut()
                .rev()
                .find(|entry| entry.role == Role::Assistant)
            {
                entry.content.push_str(text);
                if reopen_within_grace {
                    entry.is_streaming = true;
                    entry.timestamp = None;
                }
                state.phase = StreamPhase::AssistantOpen;
                return;
            }
        }

        let mut entry = Entry::new(id, Role::Assistant);
        entry.content = text.to_string();
        entry.is_streaming = true;
        state.entries.push(entry);
        state.phase = StreamPhase::AssistantOpen;
    }

    /// Inserts a new tool entry for an unseen call, or replaces the matching
    /// record in place.
    pub fn upsert_tool_call(&mut self, session_id: &str, record: ToolCallRecord) {
        let now = self.clock.now_ms();
        let state = self.state_mut(session_id);

        let streaming = record.status.is_active();
        if replace_tool_call(&mut state.entries, record.clone(), now) {
            return;
        }

        close_active_thought(&mut state.entries, now);
        close_active_assistant(&mut state.entries, now);

        let mut entry = Entry::new(record.tool_call_id.clone(), Role::Tool);
        entry.is_streaming = streaming;
        entry.timestamp = (!streaming).then_some(now);
        entry.tool_calls = vec![record];
        state.entries.push(entry);
        state.phase = if streaming {
            StreamPhase::ToolActive
        } else {
            StreamPhase::Idle
        };
    }

    /// Merges a partial tool-call update onto the matching record, creating
    /// a tool entry when the call was never announced.
    pub fn apply_tool_call_update(&mut self, session_id: &str, update: &Value) {
        let Some(id) = agent_events::tool_call_id(update) else {
            return;
        };
        let now = self.clock.now_ms();
        let state = self.state_mut(session_id);

        let existing = state.entries.iter().find_map(|entry| {
            entry
                .tool_calls
                .iter()
                .find(|call| call.tool_call_id == id)
        });

        let next = agent_events::apply_tool_call_update(existing, update, now);
        let streaming = next.status.is_active();

        if replace_tool_call(&mut state.entries, next.clone(), now) {
            return;
        }

        close_active_thought(&mut state.entries, now);
        close_active_assistant(&mut state.entries, now);

        let mut entry = Entry::new(next.tool_call_id.clone(), Role::Tool);
        entry.is_streaming = streaming;
        entry.timestamp = (!streaming).then_some(now);
        entry.tool_calls = vec![next];
        state.entries.push(entry);
        state.phase = if streaming {
            StreamPhase::ToolActive
        } else {
            StreamPhase::Idle
        };
    }

    /// Attaches a plan snapshot to the latest assistant entry, opening one
    /// when the transcript does not end in an assistant entry.
    pub fn update_plan(&mut self, session_id: &str, steps: Vec<PlanStep>) {
        let id = self.next_id();
        let state = self.state_mut(session_id);

        if let Some(entry) = state
            .entries
            .last_mut()
            .filter(|entry| entry.role == Role::Assistant)
        {
            entry.plan_steps = steps;
            return;
        }

        let mut entry = Entry::new(id, Role::Assistant);
        entry.is_streaming = true;
        entry.plan_steps = steps;
        state.entries.push(entry);
        state.phase = StreamPhase::AssistantOpen;
    }

    /// Appends a finalized assistant entry (error text, rollback notices).
    ///
    /// The grace window arms afterwards, matching how a turn-completed
    /// assistant entry behaves.
    pub fn push_assistant_notice(&mut self, session_id: &str, text: &str) {
        let now = self.clock.now_ms();
        let id = self.next_id();
        let state = self.state_mut(session_id);

        let mut entry = Entry::new(id, Role::Assistant);
        entry.content = text.to_string();
        entry.timestamp = Some(now);
        state.entries.push(entry);
        state.phase = StreamPhase::AssistantGrace { closed_at: now };
    }

    /// Seals every streaming entry for the session: flips streaming off,
    /// stamps missing timestamps, finishes thinking sidecars.
    pub fn finalize(&mut self, session_id: &str) {
        let now = self.clock.now_ms();
        let state = self.state_mut(session_id);

        for entry in state.entries.iter_mut() {
            if entry.role == Role::User || !entry.is_streaming {
                continue;
            }

            entry.is_streaming = false;
            entry.timestamp.get_or_insert(now);
            if let Some(thinking) = entry.thinking.as_mut() {
                finish_thinking(thinking, now);
            }
        }

        state.phase = match state.entries.last() {
            Some(entry) if entry.role == Role::Assistant => {
                StreamPhase::AssistantGrace { closed_at: now }
            }
            _ => StreamPhase::Idle,
        };
    }
}

fn finish_thinking(thinking: &mut ThinkingData, now: u64) {
    if let Some(start) = thinking.start_time {
        thinking.duration = Some(now.saturating_sub(start) as f64 / 1000.0);
    }
    thinking.phase = ThinkingPhase::Done;
    thinking.is_streaming = false;
}

/// Closes the most recent streaming thought entry, if any.
fn close_active_thought(entries: &mut [Entry], now: u64) {
    let Some(entry) = entries
        .iter_mut()
        .rev()
        .find(|entry| entry.role == Role::Thought && entry.is_streaming)
    else {
        return;
    };

    entry.is_streaming = false;
    entry.timestamp.get_or_insert(now);
    match entry.thinking.as_mut() {
        Some(thinking) => finish_thinking(thinking, now),
        None => {
            entry.thinking = Some(ThinkingData {
                content: entry.content.clone(),
                is_streaming: false,
                phase: ThinkingPhase::Done,
                start_time: None,
                duration: None,
            });
        }
    }
}

/// Closes the most recent streaming assistant entry, if any.
fn close_active_assistant(entries: &mut [Entry], now: u64) {
    let Some(entry) = entries
        .iter_mut()
        .rev()
        .find(|entry| entry.role == Role::Assistant && entry.is_streaming)
    else {
        return;
    };

    entry.is_streaming = false;
    entry.timestamp.get_or_insert(now);
    if let Some(thinking) = entry.thinking.as_mut() {
        finish_thinking(thinking, now);
    }
}

/// Replaces the record matching `record.tool_call_id` in place, recomputing
/// the owning entry's streaming flag. Returns false when no entry holds the
/// call.
fn replace_tool_call(entries: &mut [Entry], record: ToolCallRecord, now: u64) -> bool {
    for entry in entries.iter_mut() {
        let Some(index) = entry
            .tool_calls
            .iter()
            .position(|call| call.tool_call_id == record.tool_call_id)
        else {
            continue;
        };

        entry.tool_calls[index] = record;
        let streaming = entry
            .tool_calls
            .iter()
            .any(|call| call.status.is_active());
        entry.is_streaming = streaming;
        if !streaming {
            entry.timestamp.get_or_insert(now);
        }
        return true;
    }

    false
}
