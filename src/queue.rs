//! Per-session prompt queue.
//!
//! Prompts submitted while a session is still generating wait here and are
//! sent one at a time as turns complete.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One queued prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedPrompt {
    pub id: String,
    pub content: String,
    pub queued_at: u64,
}

#[derive(Debug, Default)]
pub(crate) struct PromptQueue {
    queues: HashMap<String, Vec<QueuedPrompt>>,
    next_id: u64,
}

impl PromptQueue {
    pub(crate) fn enqueue(&mut self, session_id: &str, content: &str, now_ms: u64) -> String {
        self.next_id += 1;
        let id = format!("queued-{}", self.next_id);
        self.queues
            .entry(session_id.to_string())
            .or_default()
            .push(QueuedPrompt {
                id: id.clone(),
                content: content.to_string(),
                queued_at: now_ms,
            });
        id
    }

    pub(crate) fn dequeue(&mut self, session_id: &str) -> Option<QueuedPrompt> {
        let queue = self.queues.get_mut(session_id)?;
        if queue.is_empty() {
            return None;
        }
        Some(queue.remove(0))
    }

    pub(crate) fn remove(&mut self, session_id: &str, prompt_id: &str) -> bool {
        let Some(queue) = self.queues.get_mut(session_id) else {
            return false;
        };
        let before = queue.len();
        queue.retain(|prompt| prompt.id != prompt_id);
        queue.len() != before
    }

    pub(crate) fn clear(&mut self, session_id: &str) {
        self.queues.remove(session_id);
    }

    pub(crate) fn queued(&self, session_id: &str) -> Vec<QueuedPrompt> {
        self.queues.get(session_id).cloned().unwrap_or_default()
    }
}
