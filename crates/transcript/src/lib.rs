//! Streaming transcript assembly for agent chat sessions.
//!
//! The backend streams a session as an interleaved sequence of thought
//! chunks, answer chunks, tool-call lifecycle updates, plan snapshots, and a
//! terminal turn-complete or error signal. This crate reduces that stream
//! into an ordered, append-only list of conversation entries per session
//! ([`Transcripts`]), and derives the display-ready grouping of finalized
//! messages and collapsible working activity ([`groups::build_chat_groups`]).
//!
//! Entries are never reordered: events either append a new entry or mutate
//! one in place. Each session's open/close/reopen decisions run through an
//! explicit [`reducer::StreamPhase`] state machine so the interruption and
//! grace-window rules stay auditable.

pub mod clock;
pub mod entry;
pub mod groups;
pub mod reducer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{Entry, Role, ThinkingData, ThinkingPhase};
pub use groups::{build_chat_groups, ChatGroup, ThinkingItem, WorkingItem};
pub use reducer::{StreamPhase, Transcripts, ASSISTANT_APPEND_GRACE_MS};
