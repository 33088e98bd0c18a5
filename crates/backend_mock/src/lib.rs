//! Deterministic scripted backend for tests.
//!
//! `MockBackend` implements the `backend_bridge` contract entirely in
//! memory: request/response calls consume scripted outcomes (falling back to
//! sensible defaults), every call is recorded for assertions, and tests push
//! events through [`MockBackend::emit`] to simulate the backend's channels.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use backend_bridge::{
    BackendClient, BackendError, BackendEvent, InitializeOutcome, NewSessionOutcome,
    PromptOutcome,
};
use serde_json::{json, Value};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One recorded request/response call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallRecord {
    Initialize,
    CreateSession {
        cwd: String,
    },
    SendPrompt {
        session_id: String,
        content: String,
    },
    Cancel {
        session_id: String,
    },
    SetMode {
        session_id: String,
        mode_id: String,
    },
    SetModel {
        session_id: String,
        model_id: String,
    },
    SetConfigOption {
        session_id: String,
        option_id: String,
        value: Value,
    },
    Approve {
        session_id: String,
        request_id: String,
        option_id: Option<String>,
    },
}

#[derive(Default)]
struct Script {
    create_session: VecDeque<Result<NewSessionOutcome, BackendError>>,
    send_prompt: VecDeque<Result<PromptOutcome, BackendError>>,
    cancel: VecDeque<Result<(), BackendError>>,
    set_mode: VecDeque<Result<(), BackendError>>,
    set_model: VecDeque<Result<(), BackendError>>,
    set_config_option: VecDeque<Result<(), BackendError>>,
    approve: VecDeque<Result<(), BackendError>>,
}

struct MockState {
    script: Script,
    calls: Vec<CallRecord>,
    next_session: u64,
    create_delay: Option<Duration>,
}

/// Scripted in-memory backend.
pub struct MockBackend {
    events: broadcast::Sender<BackendEvent>,
    state: Mutex<MockState>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            events,
            state: Mutex::new(MockState {
                script: Script::default(),
                calls: Vec::new(),
                next_session: 0,
                create_delay: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Delivers an event to all subscribers. Events emitted with no live
    /// subscriber are dropped, as with a real disconnected channel.
    pub fn emit(&self, event: BackendEvent) {
        let _ = self.events.send(event);
    }

    /// Scripts the next `create_session` outcome.
    pub fn push_create_session(&self, outcome: Result<NewSessionOutcome, BackendError>) {
        self.lock().script.create_session.push_back(outcome);
    }

    /// Scripts the next `send_prompt` outcome.
    pub fn push_send_prompt(&self, outcome: Result<PromptOutcome, BackendError>) {
        self.lock().script.send_prompt.push_back(outcome);
    }

    /// Scripts the next `cancel` outcome.
    pub fn push_cancel(&self, outcome: Result<(), BackendError>) {
        self.lock().script.cancel.push_back(outcome);
    }

    /// Scripts the next `set_mode` outcome.
    pub fn push_set_mode(&self, outcome: Result<(), BackendError>) {
        self.lock().script.set_mode.push_back(outcome);
    }

    /// Scripts the next `set_model` outcome.
    pub fn push_set_model(&self, outcome: Result<(), BackendError>) {
        self.lock().script.set_model.push_back(outcome);
    }

    /// Scripts the next `set_config_option` outcome.
    pub fn push_set_config_option(&self, outcome: Result<(), BackendError>) {
        self.lock().script.set_config_option.push_back(outcome);
    }

    /// Scripts the next `approve` outcome.
    pub fn push_approve(&self, outcome: Result<(), BackendError>) {
        self.lock().script.approve.push_back(outcome);
    }

    /// Makes `create_session` take `delay` before resolving, so tests can
    /// overlap concurrent callers.
    pub fn set_create_delay(&self, delay: Duration) {
        self.lock().create_delay = Some(delay);
    }

    /// All calls recorded so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<CallRecord> {
        self.lock().calls.clone()
    }

    /// Number of `create_session` calls observed.
    #[must_use]
    pub fn create_session_calls(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, CallRecord::CreateSession { .. }))
            .count()
    }
}

#[async_trait]
impl BackendClient for MockBackend {
    async fn initialize(&self) -> Result<InitializeOutcome, BackendError> {
        self.lock().calls.push(CallRecord::Initialize);
        Ok(InitializeOutcome {
            agent_info: json!({ "name": "mock-backend" }),
            auth_methods: Vec::new(),
            protocol_version: json!(1),
        })
    }

    async fn create_session(&self, cwd: &str) -> Result<NewSessionOutcome, BackendError> {
        let (outcome, delay) = {
            let mut state = self.lock();
            state.calls.push(CallRecord::CreateSession {
                cwd: cwd.to_string(),
            });
            let outcome = state.script.create_session.pop_front().unwrap_or_else(|| {
                state.next_session += 1;
                Ok(NewSessionOutcome::new(format!(
                    "backend-{}",
                    state.next_session
                )))
            });
            (outcome, state.create_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        outcome
    }

    async fn send_prompt(
        &self,
        session_id: &str,
        content: &str,
    ) -> Result<PromptOutcome, BackendError> {
        let mut state = self.lock();
        state.calls.push(CallRecord::SendPrompt {
            session_id: session_id.to_string(),
            content: content.to_string(),
        });
        state.script.send_prompt.pop_front().unwrap_or_else(|| {
            Ok(PromptOutcome {
                stop_reason: json!("end_turn"),
            })
        })
    }

    async fn cancel(&self, session_id: &str) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.calls.push(CallRecord::Cancel {
            session_id: session_id.to_string(),
        });
        state.script.cancel.pop_front().unwrap_or(Ok(()))
    }

    async fn set_mode(&self, session_id: &str, mode_id: &str) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.calls.push(CallRecord::SetMode {
            session_id: session_id.to_string(),
            mode_id: mode_id.to_string(),
        });
        state.script.set_mode.pop_front().unwrap_or(Ok(()))
    }

    async fn set_model(&self, session_id: &str, model_id: &str) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.calls.push(CallRecord::SetModel {
            session_id: session_id.to_string(),
            model_id: model_id.to_string(),
        });
        state.script.set_model.pop_front().unwrap_or(Ok(()))
    }

    async fn set_config_option(
        &self,
        session_id: &str,
        option_id: &str,
        value: &Value,
    ) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.calls.push(CallRecord::SetConfigOption {
            session_id: session_id.to_string(),
            option_id: option_id.to_string(),
            value: value.clone(),
        });
        state.script.set_config_option.pop_front().unwrap_or(Ok(()))
    }

    async fn approve(
        &self,
        session_id: &str,
        request_id: &str,
        option_id: Option<&str>,
    ) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.calls.push(CallRecord::Approve {
            session_id: session_id.to_string(),
            request_id: request_id.to_string(),
            option_id: option_id.map(str::to_string),
        });
        state.script.approve.pop_front().unwrap_or(Ok(()))
    }

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.events.subscribe()
    }
}
