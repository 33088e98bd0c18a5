//! Client core for desktop chat apps driving Codex-style coding agents.
//!
//! The library owns everything between the raw backend event stream and the
//! display-ready conversation model:
//!
//! - [`transcript`]: streaming message assembly — per-session entry lists,
//!   the open/close/reopen state machine, turn finalization, and the pure
//!   message/working grouping.
//! - [`agent_events`]: the single tolerant boundary over loosely-typed
//!   backend payloads (tool calls, permissions, plans, option lists).
//! - [`session_router`]: stable chat-session ids mapped to ephemeral
//!   backend sessions, with single-flight creation and mode/model sync.
//! - [`session_store`]: versioned snapshot persistence of sessions and
//!   transcripts.
//! - [`backend_bridge`]: the request/response + event-channel contract a
//!   backend implementation fulfills.
//!
//! [`Client`] composes those pieces over one backend connection: an event
//! pump with generation-token teardown, per-session generating flags and
//! notices, approval cards with optimistic selection, a prompt queue, and a
//! timeout-bounded prompt-enhancement helper.
//!
//! Rendering is out of scope; the crate produces data for a view layer, it
//! does not draw.

mod approvals;
mod client;
mod config;
mod enhance;
mod error;
mod notice;
mod pump;
mod queue;
mod state;

pub use client::Client;
pub use config::{
    ClientConfig, DEFAULT_MODEL_ID, DEFAULT_MODE_ID, DEFAULT_SLASH_COMMANDS,
    ENHANCE_SYSTEM_PROMPT,
};
pub use error::ClientError;
pub use notice::{NoticeKind, SessionNotice};
pub use queue::QueuedPrompt;

pub use agent_events;
pub use backend_bridge;
pub use session_router;
pub use session_store;
pub use transcript;
