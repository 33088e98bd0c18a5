//! Client facade: composes the transcript reducer, session router, approval
//! state, prompt queue, and event pump over one backend connection.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use agent_events::{
    approval_status_from_kind, extract_slash_commands, parse_plan_steps, parse_tool_call,
    resolve_mode_options, resolve_model_options, ApprovalCard, ApprovalStatus,
    PermissionOptionKind, SelectOption,
};
use backend_bridge::{BackendClient, BackendEvent};
use serde_json::Value;
use session_router::{EnsureOutcome, SessionDefaults, SessionRouter};
use session_store::{ChatSession, StoreSnapshot};
use transcript::{ChatGroup, Clock, Entry, SystemClock};

use crate::config::ClientConfig;
use crate::enhance;
use crate::error::ClientError;
use crate::notice::SessionNotice;
use crate::pump::EventPump;
use crate::queue::QueuedPrompt;
use crate::state::ClientState;

/// How long a decided approval card stays visible before it is removed.
const APPROVAL_CLEAR_DELAY: Duration = Duration::from_millis(900);

/// The client core. Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    backend: Arc<dyn BackendClient>,
    router: SessionRouter,
    config: ClientConfig,
    state: Mutex<ClientState>,
    pump: EventPump,
}

impl Client {
    #[must_use]
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        Self::with_config(backend, ClientConfig::default())
    }

    #[must_use]
    pub fn with_config(backend: Arc<dyn BackendClient>, config: ClientConfig) -> Self {
        Self::with_clock(backend, config, Arc::new(SystemClock))
    }

    /// Builds a client with an injected clock. Production code wants
    /// [`Client::with_config`]; tests drive time through this seam.
    #[must_use]
    pub fn with_clock(
        backend: Arc<dyn BackendClient>,
        config: ClientConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let router = SessionRouter::new(
            Arc::clone(&backend),
            SessionDefaults {
                mode_id: config.default_mode_id.clone(),
                model_id: config.default_model_id.clone(),
            },
        );
        Self {
            inner: Arc::new(ClientInner {
                backend,
                router,
                config,
                state: Mutex::new(ClientState::new(clock)),
                pump: EventPump::new(),
            }),
        }
    }

    /// Initializes the backend and starts draining its event channels.
    /// Calling `start` again tears the previous subscription down first.
    pub async fn start(&self) -> Result<(), ClientError> {
        self.inner.backend.initialize().await?;
        self.inner.pump.start(&self.inner);
        Ok(())
    }

    /// Stops event delivery. In-flight deliveries are discarded.
    pub fn stop(&self) {
        self.inner.pump.stop();
    }

    // --- sessions -------------------------------------------------------

    /// Creates a chat session and selects it.
    pub fn create_session(
        &self,
        title: &str,
        cwd: Option<&str>,
    ) -> Result<ChatSession, ClientError> {
        let mut session = ChatSession::create(title)?;
        session.cwd = cwd.map(str::to_string);
        self.inner.lock_state().add_session(session.clone());
        Ok(session)
    }

    #[must_use]
    pub fn sessions(&self) -> Vec<ChatSession> {
        self.inner.lock_state().sessions().to_vec()
    }

    #[must_use]
    pub fn selected_session_id(&self) -> Option<String> {
        self.inner
            .lock_state()
            .selected_session_id()
            .map(str::to_string)
    }

    pub fn select_session(&self, chat_session_id: &str) -> bool {
        self.inner.lock_state().select_session(chat_session_id)
    }

    /// Deletes a chat session: routing, transcript, queue, approvals, and
    /// per-session option state all go with it.
    pub fn delete_session(&self, chat_session_id: &str) {
        self.inner.router.clear(chat_session_id);
        self.inner.lock_state().remove_session(chat_session_id);
    }

    /// Backend session currently routed to this chat session, if any.
    #[must_use]
    pub fn backend_session_id(&self, chat_session_id: &str) -> Option<String> {
        self.inner.router.backend_session_id(chat_session_id)
    }

    // --- turn lifecycle -------------------------------------------------

    /// Submits a prompt. While the session is generating the prompt queues
    /// and is sent automatically when the current turn completes.
    pub async fn submit_prompt(
        &self,
        chat_session_id: &str,
        text: &str,
    ) -> Result<(), ClientError> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Ok(());
        }

        {
            let mut state = self.inner.lock_state();
            if state.session(chat_session_id).is_none() {
                return Err(ClientError::UnknownSession(chat_session_id.to_string()));
            }
            if state.is_generating(chat_session_id) {
                let now = state.now_ms();
                state.queue.enqueue(chat_session_id, &text, now);
                return Ok(());
            }
        }

        self.inner.send_now(chat_session_id, &text).await
    }

    /// Requests cancellation of the in-flight turn. The generating flag
    /// clears immediately; transcript finalization waits for the backend's
    /// own turn-complete or error signal.
    pub async fn stop_generation(&self, chat_session_id: &str) -> Result<(), ClientError> {
        self.inner
            .lock_state()
            .set_generating(chat_session_id, false);

        let Some(backend_id) = self.inner.router.backend_session_id(chat_session_id) else {
            return Ok(());
        };
        self.inner.backend.cancel(&backend_id).await?;
        Ok(())
    }

    // --- mode / model / config -----------------------------------------

    /// Switches the session's mode optimistically, rolling back on backend
    /// failure.
    pub async fn set_mode(
        &self,
        chat_session_id: &str,
        mode_id: &str,
    ) -> Result<(), ClientError> {
        self.inner
            .set_option(chat_session_id, mode_id, OptionAxis::Mode)
            .await
    }

    /// Switches the session's model optimistically, rolling back on backend
    /// failure.
    pub async fn set_model(
        &self,
        chat_session_id: &str,
        model_id: &str,
    ) -> Result<(), ClientError> {
        self.inner
            .set_option(chat_session_id, model_id, OptionAxis::Model)
            .await
    }

    /// Sets an arbitrary backend config option on the live session.
    pub async fn set_config_option(
        &self,
        chat_session_id: &str,
        option_id: &str,
        value: &Value,
    ) -> Result<(), ClientError> {
        let Some(backend_id) = self.inner.router.backend_session_id(chat_session_id) else {
            return Err(ClientError::UnknownSession(chat_session_id.to_string()));
        };

        match self
            .inner
            .backend
            .set_config_option(&backend_id, option_id, value)
            .await
        {
            Ok(()) => Ok(()),
            Err(error) => {
                self.inner.lock_state().set_notice(
                    chat_session_id,
                    SessionNotice::error(format!("Failed to set {option_id}: {error}")),
                );
                Err(error.into())
            }
        }
    }

    // --- approvals ------------------------------------------------------

    /// Answers an approval request with one of its options.
    ///
    /// The card's status flips optimistically; on backend success the card
    /// is removed after a short display grace, on failure it reverts to
    /// pending and the session gets an error notice.
    pub async fn select_approval(
        &self,
        chat_session_id: &str,
        request_id: &str,
        option_id: &str,
    ) -> Result<(), ClientError> {
        let backend_id = {
            let mut state = self.inner.lock_state();
            let Some(record) = state
                .approvals
                .record_for_chat(chat_session_id, request_id)
            else {
                return Err(ClientError::UnknownApproval(request_id.to_string()));
            };
            let backend_id = record.backend_session_id.clone();
            // Unknown options still act: the permissive default mirrors the
            // kind normalization.
            let kind = state
                .approvals
                .option(&backend_id, request_id, option_id)
                .map(|option| option.kind)
                .unwrap_or(PermissionOptionKind::AllowOnce);

            state
                .approvals
                .set_loading(&backend_id, request_id, true);
            state.approvals.set_status(
                &backend_id,
                request_id,
                approval_status_from_kind(kind),
            );
            backend_id
        };

        match self
            .inner
            .backend
            .approve(&backend_id, request_id, Some(option_id))
            .await
        {
            Ok(()) => {
                self.inner
                    .lock_state()
                    .approvals
                    .set_loading(&backend_id, request_id, false);

                let inner = Arc::clone(&self.inner);
                let backend_id = backend_id.clone();
                let request_id = request_id.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(APPROVAL_CLEAR_DELAY).await;
                    inner
                        .lock_state()
                        .approvals
                        .remove(&backend_id, &request_id);
                });
                Ok(())
            }
            Err(error) => {
                let mut state = self.inner.lock_state();
                state
                    .approvals
                    .set_status(&backend_id, request_id, ApprovalStatus::Pending);
                state
                    .approvals
                    .set_loading(&backend_id, request_id, false);
                state.set_notice(
                    chat_session_id,
                    SessionNotice::error(format!("Approval failed: {error}")),
                );
                Err(error.into())
            }
        }
    }

    // --- prompt enhancement ---------------------------------------------

    /// Rewrites a prompt through a one-shot ephemeral backend session.
    /// Bounded by the configured timeout; the ephemeral session is always
    /// cleaned up.
    pub async fn enhance_prompt(&self, prompt: &str) -> Result<Option<String>, ClientError> {
        enhance::enhance_prompt(
            &self.inner.backend,
            &self.inner.config.default_cwd,
            &self.inner.config.enhance_system_prompt,
            prompt,
            self.inner.config.enhance_timeout,
        )
        .await
    }

    // --- derived views --------------------------------------------------

    #[must_use]
    pub fn entries(&self, chat_session_id: &str) -> Vec<Entry> {
        self.inner.lock_state().entries(chat_session_id).to_vec()
    }

    #[must_use]
    pub fn chat_groups(&self, chat_session_id: &str) -> Vec<ChatGroup> {
        self.inner.lock_state().chat_groups(chat_session_id)
    }

    #[must_use]
    pub fn approval_cards(&self, chat_session_id: &str) -> Vec<ApprovalCard> {
        self.inner.lock_state().approval_cards(chat_session_id)
    }

    #[must_use]
    pub fn is_generating(&self, chat_session_id: &str) -> bool {
        self.inner.lock_state().is_generating(chat_session_id)
    }

    #[must_use]
    pub fn notice(&self, chat_session_id: &str) -> Option<SessionNotice> {
        self.inner.lock_state().notice(chat_session_id).cloned()
    }

    /// Slash commands for the session: the backend-announced set, or the
    /// built-in defaults until one arrives.
    #[must_use]
    pub fn slash_commands(&self, chat_session_id: &str) -> Vec<String> {
        let stored = self
            .inner
            .lock_state()
            .slash_commands(chat_session_id)
            .to_vec();
        if stored.is_empty() {
            crate::config::DEFAULT_SLASH_COMMANDS
                .iter()
                .map(|command| command.to_string())
                .collect()
        } else {
            stored
        }
    }

    #[must_use]
    pub fn mode_options(&self, chat_session_id: &str) -> Vec<SelectOption> {
        self.inner
            .lock_state()
            .mode_options(chat_session_id)
            .to_vec()
    }

    #[must_use]
    pub fn model_options(&self, chat_session_id: &str) -> Vec<SelectOption> {
        self.inner
            .lock_state()
            .model_options(chat_session_id)
            .to_vec()
    }

    #[must_use]
    pub fn context_remaining(&self, chat_session_id: &str) -> Option<f64> {
        self.inner.lock_state().context_remaining(chat_session_id)
    }

    #[must_use]
    pub fn queued_prompts(&self, chat_session_id: &str) -> Vec<QueuedPrompt> {
        self.inner.lock_state().queued_prompts(chat_session_id)
    }

    pub fn remove_queued_prompt(&self, chat_session_id: &str, prompt_id: &str) -> bool {
        self.inner
            .lock_state()
            .queue
            .remove(chat_session_id, prompt_id)
    }

    // --- persistence ----------------------------------------------------

    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        self.inner.lock_state().snapshot()
    }

    pub fn restore(&self, snapshot: StoreSnapshot) {
        self.inner.lock_state().restore(snapshot);
    }

    // --- headless event application -------------------------------------

    /// Applies one backend event synchronously.
    ///
    /// The running [`Client::start`] pump normally does this; call it
    /// directly in headless environments (or tests) that never start the
    /// pump and need queued event effects applied deterministically.
    pub fn apply_event(&self, event: BackendEvent) {
        self.inner.handle_event(event);
    }
}

#[derive(Debug, Clone, Copy)]
enum OptionAxis {
    Mode,
    Model,
}

impl ClientInner {
    pub(crate) fn backend(&self) -> &Arc<dyn BackendClient> {
        &self.backend
    }

    pub(crate) fn pump(&self) -> &EventPump {
        &self.pump
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, ClientState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Sends one prompt now: user entry + generating flag first, then the
    /// backend session (created lazily) and the prompt call. Failures land
    /// in the transcript and clear the flag.
    async fn send_now(self: &Arc<Self>, chat_session_id: &str, text: &str) -> Result<(), ClientError> {
        let prefs = {
            let mut state = self.lock_state();
            state.begin_turn(chat_session_id, text);
            state.session_prefs(chat_session_id, &self.config)
        };

        let backend_id = match self.router.ensure_session(chat_session_id, &prefs).await {
            Ok(outcome) => {
                if let EnsureOutcome::Created(bootstrap) = &outcome {
                    self.lock_state().apply_bootstrap(chat_session_id, bootstrap);
                }
                outcome.backend_session_id().to_string()
            }
            Err(error) => {
                self.lock_state()
                    .fail_turn(chat_session_id, &format!("Request failed: {error}"));
                return Err(error.into());
            }
        };

        match self.backend.send_prompt(&backend_id, text).await {
            Ok(_) => Ok(()),
            Err(error) => {
                self.lock_state()
                    .fail_turn(chat_session_id, &format!("Request failed: {error}"));
                Err(error.into())
            }
        }
    }

    async fn set_option(
        self: &Arc<Self>,
        chat_session_id: &str,
        value: &str,
        axis: OptionAxis,
    ) -> Result<(), ClientError> {
        let previous = {
            let mut state = self.lock_state();
            let Some(session) = state.session_mut(chat_session_id) else {
                return Err(ClientError::UnknownSession(chat_session_id.to_string()));
            };
            let slot = match axis {
                OptionAxis::Mode => &mut session.mode_id,
                OptionAxis::Model => &mut session.model_id,
            };
            if slot.as_deref() == Some(value) {
                return Ok(());
            }
            let previous = slot.clone();
            *slot = Some(value.to_string());
            state.clear_notice(chat_session_id);
            previous
        };

        // Without a live backend session this is a metadata-only change; it
        // syncs later during session creation.
        let Some(backend_id) = self.router.backend_session_id(chat_session_id) else {
            return Ok(());
        };

        let result = match axis {
            OptionAxis::Mode => self.backend.set_mode(&backend_id, value).await,
            OptionAxis::Model => self.backend.set_model(&backend_id, value).await,
        };

        match result {
            Ok(()) => Ok(()),
            Err(error) => {
                let mut state = self.lock_state();
                if let Some(session) = state.session_mut(chat_session_id) {
                    match axis {
                        OptionAxis::Mode => session.mode_id = previous,
                        OptionAxis::Model => session.model_id = previous,
                    }
                }
                let what = match axis {
                    OptionAxis::Mode => "mode",
                    OptionAxis::Model => "model",
                };
                state.set_notice(
                    chat_session_id,
                    SessionNotice::error(format!("Failed to switch {what}: {error}")),
                );
                Err(error.into())
            }
        }
    }

    fn resolve(&self, backend_session_id: &str) -> Option<String> {
        let chat = self.router.resolve_chat_session_id(backend_session_id);
        if chat.is_none() {
            tracing::trace!(backend_session_id, "dropping event for unknown session");
        }
        chat
    }

    /// Applies one backend event. Events for unknown backend sessions are
    /// dropped silently: the chat session may have been deleted while the
    /// event was in flight.
    pub(crate) fn handle_event(self: &Arc<Self>, event: BackendEvent) {
        tracing::trace!(event = %event, "backend event");
        match event {
            BackendEvent::MessageChunk { session_id, text } => {
                if let Some(chat) = self.resolve(&session_id) {
                    self.lock_state().transcripts.append_assistant(&chat, &text);
                }
            }
            BackendEvent::ThoughtChunk { session_id, text } => {
                if let Some(chat) = self.resolve(&session_id) {
                    self.lock_state().transcripts.append_thought(&chat, &text);
                }
            }
            BackendEvent::UserMessage { session_id, text } => {
                if let Some(chat) = self.resolve(&session_id) {
                    self.lock_state().transcripts.push_user(&chat, &text);
                }
            }
            BackendEvent::ToolCall {
                session_id,
                tool_call,
            } => {
                if let Some(chat) = self.resolve(&session_id) {
                    let mut state = self.lock_state();
                    let now = state.now_ms();
                    let record = parse_tool_call(&tool_call, now);
                    state.transcripts.upsert_tool_call(&chat, record);
                }
            }
            BackendEvent::ToolCallUpdate { session_id, update } => {
                if let Some(chat) = self.resolve(&session_id) {
                    self.lock_state()
                        .transcripts
                        .apply_tool_call_update(&chat, &update);
                }
            }
            BackendEvent::Plan { session_id, plan } => {
                if let Some(chat) = self.resolve(&session_id) {
                    let steps = parse_plan_steps(&plan);
                    if !steps.is_empty() {
                        self.lock_state().transcripts.update_plan(&chat, steps);
                    }
                }
            }
            BackendEvent::ApprovalRequest {
                session_id,
                request_id,
                tool_call,
                options,
            } => {
                if let Some(chat) = self.resolve(&session_id) {
                    self.lock_state().approvals.register(
                        &chat,
                        &session_id,
                        &request_id,
                        tool_call,
                        options,
                    );
                }
            }
            BackendEvent::AvailableCommands { session_id, update } => {
                if let Some(chat) = self.resolve(&session_id) {
                    let commands = extract_slash_commands(&update);
                    if !commands.is_empty() {
                        self.lock_state().set_slash_commands(&chat, commands);
                    }
                }
            }
            BackendEvent::CurrentMode { session_id, update } => {
                if let Some(chat) = self.resolve(&session_id) {
                    self.on_current_mode(&chat, &update);
                }
            }
            BackendEvent::ConfigOptionUpdate { session_id, update } => {
                if let Some(chat) = self.resolve(&session_id) {
                    self.on_config_option_update(&chat, &update);
                }
            }
            BackendEvent::TokenUsage {
                session_id,
                percent_remaining,
            } => {
                if let Some(chat) = self.resolve(&session_id) {
                    self.lock_state()
                        .set_context_remaining(&chat, percent_remaining);
                }
            }
            BackendEvent::TurnComplete { session_id, .. } => {
                if let Some(chat) = self.resolve(&session_id) {
                    self.on_turn_complete(&chat);
                }
            }
            BackendEvent::Error {
                session_id,
                message,
            } => {
                self.on_error(session_id.as_deref(), &message);
            }
        }
    }

    fn on_current_mode(&self, chat_session_id: &str, update: &Value) {
        let Some(record) = agent_events::payload::as_record(update) else {
            return;
        };
        let Some(mode_id) =
            agent_events::payload::string_field(record, &["currentModeId", "current_mode_id"])
        else {
            return;
        };

        let mut state = self.lock_state();
        if let Some(session) = state.session_mut(chat_session_id) {
            session.mode_id = Some(mode_id.to_string());
        }
    }

    fn on_config_option_update(&self, chat_session_id: &str, update: &Value) {
        let Some(record) = agent_events::payload::as_record(update) else {
            return;
        };
        let Some(config_options) = agent_events::payload::field(
            record,
            &["configOptions", "config_options", "configOption"],
        ) else {
            return;
        };

        let mut state = self.lock_state();

        if let Some(mode_state) = resolve_mode_options(None, Some(config_options)) {
            if !mode_state.options.is_empty() {
                state.set_mode_options(chat_session_id, mode_state.options);
            }
            if let Some(current) = mode_state.current_id {
                if let Some(session) = state.session_mut(chat_session_id) {
                    session.mode_id = Some(current);
                }
            }
        }

        if let Some(model_state) = resolve_model_options(None, Some(config_options)) {
            if !model_state.options.is_empty() {
                state.set_model_options(chat_session_id, model_state.options);
            }
            if let Some(current) = model_state.current_id {
                if let Some(session) = state.session_mut(chat_session_id) {
                    session.model_id = Some(current);
                }
            }
        }
    }

    /// Seals the turn and, when prompts queued up meanwhile, sends the next
    /// one.
    fn on_turn_complete(self: &Arc<Self>, chat_session_id: &str) {
        let next = {
            let mut state = self.lock_state();
            state.transcripts.finalize(chat_session_id);
            state.set_generating(chat_session_id, false);
            state.queue.dequeue(chat_session_id)
        };

        if let Some(queued) = next {
            let inner = Arc::clone(self);
            let chat = chat_session_id.to_string();
            tokio::spawn(async move {
                if let Err(error) = inner.send_now(&chat, &queued.content).await {
                    tracing::debug!(chat_session_id = %chat, %error, "queued prompt failed");
                }
            });
        }
    }

    fn on_error(&self, backend_session_id: Option<&str>, message: &str) {
        let chat = match backend_session_id {
            Some(backend_id) => self.resolve(backend_id),
            None => self.lock_state().selected_session_id().map(str::to_string),
        };
        let Some(chat) = chat else {
            tracing::warn!(message, "backend error with no routable session");
            return;
        };

        let mut state = self.lock_state();
        state.transcripts.finalize(&chat);
        state
            .transcripts
            .push_assistant_notice(&chat, &format!("Error: {message}"));
        state.set_generating(&chat, false);
    }
}
