//! Shared client state: everything the UI reads, mutated only from the
//! single event loop.

use std::collections::HashMap;
use std::sync::Arc;

use agent_events::{ApprovalCard, SelectOption};
use session_router::{SessionBootstrap, SessionPrefs, SyncOutcome};
use session_store::{ChatSession, StoreSnapshot};
use transcript::{build_chat_groups, ChatGroup, Clock, Entry, Transcripts};

use crate::approvals::ApprovalState;
use crate::config::ClientConfig;
use crate::notice::SessionNotice;
use crate::queue::{PromptQueue, QueuedPrompt};

/// Longest derived tab title, in characters, before truncation.
const TITLE_PREFIX_CHARS: usize = 20;

pub(crate) struct ClientState {
    clock: Arc<dyn Clock>,
    pub(crate) transcripts: Transcripts,
    pub(crate) approvals: ApprovalState,
    pub(crate) queue: PromptQueue,
    sessions: Vec<ChatSession>,
    selected_session_id: Option<String>,
    generating: HashMap<String, bool>,
    notices: HashMap<String, SessionNotice>,
    slash_commands: HashMap<String, Vec<String>>,
    mode_options: HashMap<String, Vec<SelectOption>>,
    model_options: HashMap<String, Vec<SelectOption>>,
    context_remaining: HashMap<String, f64>,
}

impl ClientState {
    pub(crate) fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            transcripts: Transcripts::new(Arc::clone(&clock)),
            clock,
            approvals: ApprovalState::default(),
            queue: PromptQueue::default(),
            sessions: Vec::new(),
            selected_session_id: None,
            generating: HashMap::new(),
            notices: HashMap::new(),
            slash_commands: HashMap::new(),
            mode_options: HashMap::new(),
            model_options: HashMap::new(),
            context_remaining: HashMap::new(),
        }
    }

    pub(crate) fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // --- sessions -------------------------------------------------------

    pub(crate) fn add_session(&mut self, session: ChatSession) {
        self.selected_session_id = Some(session.id.clone());
        self.sessions.push(session);
    }

    pub(crate) fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub(crate) fn session(&self, chat_session_id: &str) -> Option<&ChatSession> {
        self.sessions
            .iter()
            .find(|session| session.id == chat_session_id)
    }

    pub(crate) fn session_mut(&mut self, chat_session_id: &str) -> Option<&mut ChatSession> {
        self.sessions
            .iter_mut()
            .find(|session| session.id == chat_session_id)
    }

    pub(crate) fn selected_session_id(&self) -> Option<&str> {
        self.selected_session_id.as_deref()
    }

    pub(crate) fn select_session(&mut self, chat_session_id: &str) -> bool {
        if self.session(chat_session_id).is_some() {
            self.selected_session_id = Some(chat_session_id.to_string());
            true
        } else {
            false
        }
    }

    pub(crate) fn remove_session(&mut self, chat_session_id: &str) {
        self.sessions.retain(|session| session.id != chat_session_id);
        self.transcripts.remove_session(chat_session_id);
        self.generating.remove(chat_session_id);
        self.notices.remove(chat_session_id);
        self.slash_commands.remove(chat_session_id);
        self.mode_options.remove(chat_session_id);
        self.model_options.remove(chat_session_id);
        self.context_remaining.remove(chat_session_id);
        self.queue.clear(chat_session_id);
        self.approvals.remove_for_chat(chat_session_id);

        if self.selected_session_id.as_deref() == Some(chat_session_id) {
            self.selected_session_id = self.sessions.first().map(|session| session.id.clone());
        }
    }

    pub(crate) fn session_prefs(&self, chat_session_id: &str, config: &ClientConfig) -> SessionPrefs {
        let session = self.session(chat_session_id);
        SessionPrefs {
            cwd: session
                .and_then(|session| session.cwd.clone())
                .unwrap_or_else(|| config.default_cwd.clone()),
            mode_id: session.and_then(|session| session.mode_id.clone()),
            model_id: session.and_then(|session| session.model_id.clone()),
        }
    }

    // --- generating flag ------------------------------------------------

    pub(crate) fn is_generating(&self, chat_session_id: &str) -> bool {
        self.generating.get(chat_session_id).copied().unwrap_or(false)
    }

    pub(crate) fn set_generating(&mut self, chat_session_id: &str, generating: bool) {
        self.generating
            .insert(chat_session_id.to_string(), generating);
    }

    // --- notices --------------------------------------------------------

    pub(crate) fn notice(&self, chat_session_id: &str) -> Option<&SessionNotice> {
        self.notices.get(chat_session_id)
    }

    pub(crate) fn set_notice(&mut self, chat_session_id: &str, notice: SessionNotice) {
        self.notices.insert(chat_session_id.to_string(), notice);
    }

    pub(crate) fn clear_notice(&mut self, chat_session_id: &str) {
        self.notices.remove(chat_session_id);
    }

    // --- per-session option state --------------------------------------

    pub(crate) fn slash_commands(&self, chat_session_id: &str) -> &[String] {
        self.slash_commands
            .get(chat_session_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub(crate) fn set_slash_commands(&mut self, chat_session_id: &str, commands: Vec<String>) {
        self.slash_commands
            .insert(chat_session_id.to_string(), commands);
    }

    pub(crate) fn mode_options(&self, chat_session_id: &str) -> &[SelectOption] {
        self.mode_options
            .get(chat_session_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub(crate) fn set_mode_options(&mut self, chat_session_id: &str, options: Vec<SelectOption>) {
        self.mode_options
            .insert(chat_session_id.to_string(), options);
    }

    pub(crate) fn model_options(&self, chat_session_id: &str) -> &[SelectOption] {
        self.model_options
            .get(chat_session_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub(crate) fn set_model_options(&mut self, chat_session_id: &str, options: Vec<SelectOption>) {
        self.model_options
            .insert(chat_session_id.to_string(), options);
    }

    pub(crate) fn context_remaining(&self, chat_session_id: &str) -> Option<f64> {
        self.context_remaining.get(chat_session_id).copied()
    }

    pub(crate) fn set_context_remaining(
        &mut self,
        chat_session_id: &str,
        percent: Option<f64>,
    ) {
        match percent {
            Some(percent) => {
                self.context_remaining
                    .insert(chat_session_id.to_string(), percent);
            }
            None => {
                self.context_remaining.remove(chat_session_id);
            }
        }
    }

    // --- turn lifecycle -------------------------------------------------

    /// Records a submitted prompt: appends the user entry, derives a tab
    /// title from the first prompt, marks the session generating, and clears
    /// any stale notice.
    pub(crate) fn begin_turn(&mut self, chat_session_id: &str, text: &str) {
        let first_prompt = self.transcripts.entries(chat_session_id).is_empty();
        self.transcripts.push_user(chat_session_id, text);

        if first_prompt {
            let title = derive_title(text);
            if let Some(session) = self.session_mut(chat_session_id) {
                session.title = title;
            }
        }

        self.set_generating(chat_session_id, true);
        self.clear_notice(chat_session_id);
    }

    /// Ends a turn that never reached the backend: the formatted error joins
    /// the transcript and the generating flag clears.
    pub(crate) fn fail_turn(&mut self, chat_session_id: &str, message: &str) {
        self.transcripts
            .push_assistant_notice(chat_session_id, message);
        self.set_generating(chat_session_id, false);
    }

    /// Applies what session creation learned: reconciled mode/model values
    /// and the backend-reported option lists. Sync failures surface as a
    /// session notice.
    pub(crate) fn apply_bootstrap(&mut self, chat_session_id: &str, bootstrap: &SessionBootstrap) {
        self.apply_sync_outcome(chat_session_id, &bootstrap.mode, OptionSlot::Mode);
        self.apply_sync_outcome(chat_session_id, &bootstrap.model, OptionSlot::Model);
    }

    fn apply_sync_outcome(
        &mut self,
        chat_session_id: &str,
        outcome: &SyncOutcome,
        slot: OptionSlot,
    ) {
        if !outcome.options.is_empty() {
            match slot {
                OptionSlot::Mode => {
                    self.set_mode_options(chat_session_id, outcome.options.clone());
                }
                OptionSlot::Model => {
                    self.set_model_options(chat_session_id, outcome.options.clone());
                }
            }
        }

        if let Some(selected) = &outcome.selected {
            if let Some(session) = self.session_mut(chat_session_id) {
                match slot {
                    OptionSlot::Mode => session.mode_id = Some(selected.clone()),
                    OptionSlot::Model => session.model_id = Some(selected.clone()),
                }
            }
        }

        if let Some(error) = &outcome.error {
            let what = match slot {
                OptionSlot::Mode => "mode",
                OptionSlot::Model => "model",
            };
            self.set_notice(
                chat_session_id,
                SessionNotice::error(format!("Failed to set {what}: {error}")),
            );
        }
    }

    // --- derived views --------------------------------------------------

    pub(crate) fn entries(&self, chat_session_id: &str) -> &[Entry] {
        self.transcripts.entries(chat_session_id)
    }

    pub(crate) fn approval_cards(&self, chat_session_id: &str) -> Vec<ApprovalCard> {
        self.approvals.cards_for_chat(chat_session_id)
    }

    pub(crate) fn chat_groups(&self, chat_session_id: &str) -> Vec<ChatGroup> {
        build_chat_groups(
            self.transcripts.entries(chat_session_id),
            &self.approvals.cards_for_chat(chat_session_id),
            self.is_generating(chat_session_id),
            self.clock.now_ms(),
        )
    }

    pub(crate) fn queued_prompts(&self, chat_session_id: &str) -> Vec<QueuedPrompt> {
        self.queue.queued(chat_session_id)
    }

    // --- persistence ----------------------------------------------------

    pub(crate) fn snapshot(&self) -> StoreSnapshot {
        let mut snapshot = StoreSnapshot::new();
        snapshot.sessions = self.sessions.clone();
        snapshot.selected_session_id = self.selected_session_id.clone();
        for session in &self.sessions {
            snapshot.entries_by_session.insert(
                session.id.clone(),
                self.transcripts.entries(&session.id).to_vec(),
            );
        }
        snapshot
    }

    pub(crate) fn restore(&mut self, mut snapshot: StoreSnapshot) {
        snapshot.seal_streaming();
        let StoreSnapshot {
            sessions,
            selected_session_id,
            entries_by_session,
            ..
        } = snapshot;

        for (session_id, entries) in entries_by_session {
            self.transcripts.restore_session(&session_id, entries);
        }
        self.selected_session_id =
            selected_session_id.or_else(|| sessions.first().map(|session| session.id.clone()));
        self.sessions = sessions;
    }
}

#[derive(Clone, Copy)]
enum OptionSlot {
    Mode,
    Model,
}

fn derive_title(text: &str) -> String {
    let prefix: String = text.chars().take(TITLE_PREFIX_CHARS).collect();
    if text.chars().count() > TITLE_PREFIX_CHARS {
        format!("{prefix}...")
    } else {
        prefix
    }
}
