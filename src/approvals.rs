//! Pending approval requests and their user-facing status.
//!
//! Records are keyed by `backend session id : request id`. Registration
//! dedupes on that key; selection is optimistic (status flips before the
//! backend confirms) and rolled back by the client on backend failure.

use agent_events::{build_approval_card, ApprovalCard, ApprovalOption, ApprovalStatus};
use serde_json::Value;

#[derive(Debug, Clone)]
pub(crate) struct ApprovalRecord {
    pub chat_session_id: String,
    pub backend_session_id: String,
    pub request_id: String,
    pub tool_call: Value,
    pub options: Vec<Value>,
    pub status: ApprovalStatus,
    pub loading: bool,
}

impl ApprovalRecord {
    fn matches(&self, backend_session_id: &str, request_id: &str) -> bool {
        self.backend_session_id == backend_session_id && self.request_id == request_id
    }
}

/// All outstanding approval requests, in arrival order.
#[derive(Debug, Default)]
pub(crate) struct ApprovalState {
    records: Vec<ApprovalRecord>,
}

impl ApprovalState {
    /// Registers a request, replacing any prior entry for the same key.
    pub(crate) fn register(
        &mut self,
        chat_session_id: &str,
        backend_session_id: &str,
        request_id: &str,
        tool_call: Value,
        options: Vec<Value>,
    ) {
        self.records
            .retain(|record| !record.matches(backend_session_id, request_id));
        self.records.push(ApprovalRecord {
            chat_session_id: chat_session_id.to_string(),
            backend_session_id: backend_session_id.to_string(),
            request_id: request_id.to_string(),
            tool_call,
            options,
            status: ApprovalStatus::Pending,
            loading: false,
        });
    }

    pub(crate) fn record(
        &self,
        backend_session_id: &str,
        request_id: &str,
    ) -> Option<&ApprovalRecord> {
        self.records
            .iter()
            .find(|record| record.matches(backend_session_id, request_id))
    }

    /// Finds a chat session's request by id alone; request ids are unique
    /// per backend session, and one chat session maps to at most one.
    pub(crate) fn record_for_chat(
        &self,
        chat_session_id: &str,
        request_id: &str,
    ) -> Option<&ApprovalRecord> {
        self.records.iter().find(|record| {
            record.chat_session_id == chat_session_id && record.request_id == request_id
        })
    }

    /// Looks up the kind of one clickable option on a pending request.
    pub(crate) fn option(
        &self,
        backend_session_id: &str,
        request_id: &str,
        option_id: &str,
    ) -> Option<ApprovalOption> {
        let record = self.record(backend_session_id, request_id)?;
        agent_events::map_approval_options(&record.options)
            .into_iter()
            .find(|option| option.id == option_id)
    }

    pub(crate) fn set_status(
        &mut self,
        backend_session_id: &str,
        request_id: &str,
        status: ApprovalStatus,
    ) {
        if let Some(record) = self
            .records
            .iter_mut()
            .find(|record| record.matches(backend_session_id, request_id))
        {
            record.status = status;
        }
    }

    pub(crate) fn set_loading(
        &mut self,
        backend_session_id: &str,
        request_id: &str,
        loading: bool,
    ) {
        if let Some(record) = self
            .records
            .iter_mut()
            .find(|record| record.matches(backend_session_id, request_id))
        {
            record.loading = loading;
        }
    }

    /// Removes one request entirely (post-selection display grace elapsed).
    pub(crate) fn remove(&mut self, backend_session_id: &str, request_id: &str) {
        self.records
            .retain(|record| !record.matches(backend_session_id, request_id));
    }

    /// Drops every request routed to a chat session (session deletion).
    pub(crate) fn remove_for_chat(&mut self, chat_session_id: &str) {
        self.records
            .retain(|record| record.chat_session_id != chat_session_id);
    }

    /// Builds display cards for one chat session's outstanding requests.
    pub(crate) fn cards_for_chat(&self, chat_session_id: &str) -> Vec<ApprovalCard> {
        self.records
            .iter()
            .filter(|record| record.chat_session_id == chat_session_id)
            .map(|record| {
                build_approval_card(
                    &record.request_id,
                    &record.tool_call,
                    &record.options,
                    record.status,
                    record.loading,
                )
            })
            .collect()
    }
}
