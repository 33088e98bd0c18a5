//! Mapping between stable chat-session ids and ephemeral backend sessions.
//!
//! The frontend owns long-lived chat sessions (tabs); the backend issues
//! connection-scoped session ids lazily. The router keeps the bidirectional
//! map consistent — both directions are always written together — and
//! guarantees single-flight creation: concurrent `ensure_session` calls for
//! one chat session join the same in-flight backend call instead of creating
//! two backend sessions for one tab.
//!
//! On creation the router also reconciles the chat session's desired mode
//! and model with what the new backend session reports, issuing a sync call
//! only when the desired value differs and is actually offered.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use agent_events::{
    resolve_mode_options, resolve_model_options, resolve_option_id, should_sync_option,
    ResolvedOptions, SelectOption,
};
use backend_bridge::{BackendClient, BackendError};
use thiserror::Error;

/// Router failure: session creation could not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("backend session creation failed: {0}")]
    Create(#[source] BackendError),
}

/// Fallback mode/model ids used when the backend offers nothing better.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDefaults {
    pub mode_id: String,
    pub model_id: String,
}

/// The chat session's wishes for a new backend session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPrefs {
    pub cwd: String,
    pub mode_id: Option<String>,
    pub model_id: Option<String>,
}

/// Result of reconciling one option axis (mode or model) on creation.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    /// Options the backend reported for this axis.
    pub options: Vec<SelectOption>,
    /// Value the chat session should now record.
    pub selected: Option<String>,
    /// Sync failure to surface as a session notice, if any.
    pub error: Option<BackendError>,
}

impl SyncOutcome {
    fn empty() -> Self {
        Self {
            options: Vec::new(),
            selected: None,
            error: None,
        }
    }
}

/// What `ensure_session` learned while creating a backend session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionBootstrap {
    pub backend_session_id: String,
    pub mode: SyncOutcome,
    pub model: SyncOutcome,
}

/// Result of `ensure_session`.
#[derive(Debug, Clone, PartialEq)]
pub enum EnsureOutcome {
    /// A live backend session already existed (or another caller just
    /// finished creating one).
    Existing(String),
    /// This call created the backend session and reconciled options.
    Created(SessionBootstrap),
}

impl EnsureOutcome {
    /// The live backend session id either way.
    #[must_use]
    pub fn backend_session_id(&self) -> &str {
        match self {
            Self::Existing(id) => id,
            Self::Created(bootstrap) => &bootstrap.backend_session_id,
        }
    }
}

#[derive(Default)]
struct RouteMaps {
    by_chat: HashMap<String, String>,
    by_backend: HashMap<String, String>,
}

/// Chat ↔ backend session router.
pub struct SessionRouter {
    backend: Arc<dyn BackendClient>,
    defaults: SessionDefaults,
    maps: Mutex<RouteMaps>,
    creation_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionRouter {
    #[must_use]
    pub fn new(backend: Arc<dyn BackendClient>, defaults: SessionDefaults) -> Self {
        Self {
            backend,
            defaults,
            maps: Mutex::new(RouteMaps::default()),
            creation_locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_maps(&self) -> MutexGuard<'_, RouteMaps> {
        match self.maps.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn creation_lock(&self, chat_session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.creation_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            locks
                .entry(chat_session_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Looks up the live backend session for a chat session, if any.
    #[must_use]
    pub fn backend_session_id(&self, chat_session_id: &str) -> Option<String> {
        self.lock_maps().by_chat.get(chat_session_id).cloned()
    }

    /// Routes an inbound event's backend session id to its chat session.
    /// Unknown ids yield `None`; the caller drops the event silently, since
    /// the chat session may have been deleted concurrently.
    #[must_use]
    pub fn resolve_chat_session_id(&self, backend_session_id: &str) -> Option<String> {
        self.lock_maps().by_backend.get(backend_session_id).cloned()
    }

    /// Removes both directions of the mapping. Must be called on chat
    /// session deletion to prevent stale event routing.
    pub fn clear(&self, chat_session_id: &str) {
        let mut maps = self.lock_maps();
        if let Some(backend_id) = maps.by_chat.remove(chat_session_id) {
            maps.by_backend.remove(&backend_id);
        }
        drop(maps);

        let mut locks = match self.creation_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.remove(chat_session_id);
    }

    fn register(&self, chat_session_id: &str, backend_session_id: &str) {
        let mut maps = self.lock_maps();
        maps.by_chat
            .insert(chat_session_id.to_string(), backend_session_id.to_string());
        maps.by_backend
            .insert(backend_session_id.to_string(), chat_session_id.to_string());
    }

    /// Returns the live backend session id for a chat session, creating one
    /// when none exists.
    ///
    /// Single-flight: concurrent callers for the same chat session await the
    /// same in-flight creation. Exactly one `create_session` call reaches
    /// the backend.
    pub async fn ensure_session(
        &self,
        chat_session_id: &str,
        prefs: &SessionPrefs,
    ) -> Result<EnsureOutcome, RouterError> {
        if let Some(existing) = self.backend_session_id(chat_session_id) {
            return Ok(EnsureOutcome::Existing(existing));
        }

        let creation_lock = self.creation_lock(chat_session_id);
        let _guard = creation_lock.lock().await;

        // Another caller may have finished creating while we waited.
        if let Some(existing) = self.backend_session_id(chat_session_id) {
            return Ok(EnsureOutcome::Existing(existing));
        }

        let cwd = if prefs.cwd.trim().is_empty() {
            "."
        } else {
            prefs.cwd.as_str()
        };
        tracing::debug!(chat_session_id, cwd, "creating backend session");
        let outcome = self
            .backend
            .create_session(cwd)
            .await
            .map_err(RouterError::Create)?;
        self.register(chat_session_id, &outcome.session_id);

        let mode_state = resolve_mode_options(outcome.modes.as_ref(), outcome.config_options.as_ref());
        let model_state =
            resolve_model_options(outcome.models.as_ref(), outcome.config_options.as_ref());

        let mode = self
            .reconcile_option(
                &outcome.session_id,
                mode_state,
                prefs.mode_id.as_deref(),
                &self.defaults.mode_id,
                OptionAxis::Mode,
            )
            .await;
        let model = self
            .reconcile_option(
                &outcome.session_id,
                model_state,
                prefs.model_id.as_deref(),
                &self.defaults.model_id,
                OptionAxis::Model,
            )
            .await;

        Ok(EnsureOutcome::Created(SessionBootstrap {
            backend_session_id: outcome.session_id,
            mode,
            model,
        }))
    }

    async fn reconcile_option(
        &self,
        backend_session_id: &str,
        state: Option<ResolvedOptions>,
        preferred: Option<&str>,
        default_id: &str,
        axis: OptionAxis,
    ) -> SyncOutcome {
        let Some(state) = state else {
            return SyncOutcome::empty();
        };

        let first = state.options.first().map(|option| option.value.clone());
        let desired = resolve_option_id(
            preferred,
            &state.options,
            &[state.current_id.as_deref(), first.as_deref()],
            default_id,
        );

        if !should_sync_option(Some(&desired), state.current_id.as_deref(), &state.options) {
            return SyncOutcome {
                options: state.options,
                selected: Some(desired),
                error: None,
            };
        }

        let result = match axis {
            OptionAxis::Mode => self.backend.set_mode(backend_session_id, &desired).await,
            OptionAxis::Model => self.backend.set_model(backend_session_id, &desired).await,
        };

        match result {
            Ok(()) => SyncOutcome {
                options: state.options,
                selected: Some(desired),
                error: None,
            },
            Err(error) => {
                tracing::warn!(backend_session_id, ?axis, %error, "option sync failed");
                // Fall back to what the backend already runs with.
                let fallback = state
                    .current_id
                    .clone()
                    .or(first)
                    .unwrap_or_else(|| default_id.to_string());
                SyncOutcome {
                    options: state.options,
                    selected: Some(fallback),
                    error: Some(error),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum OptionAxis {
    Mode,
    Model,
}
