//! Display grouping: collapsible "working" clusters interleaved with
//! finalized messages.
//!
//! `build_chat_groups` is a pure function of the entry list, the pending
//! approval cards, and the generating flag; it is recomputed from scratch on
//! every relevant change. Group identifiers are stable for groups anchored
//! to the same user turn so collapsed/expanded UI state survives
//! recomputation.

use std::collections::HashMap;

use agent_events::{ApprovalCard, ToolCallRecord};
use serde::{Deserialize, Serialize};

use crate::entry::{Entry, Role, ThinkingPhase};

/// Thinking activity shown inside a working group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingItem {
    pub content: String,
    pub is_streaming: bool,
    pub phase: ThinkingPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// One item inside a working group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkingItem {
    Thinking(ThinkingItem),
    #[serde(rename = "toolcall")]
    ToolCall(ToolCallRecord),
    Approval(ApprovalCard),
}

impl WorkingItem {
    fn is_active(&self) -> bool {
        match self {
            Self::Thinking(item) => {
                item.is_streaming
                    || matches!(item.phase, ThinkingPhase::Thinking | ThinkingPhase::Working)
            }
            Self::ToolCall(call) => call.status.is_active(),
            Self::Approval(card) => card.is_active(),
        }
    }
}

/// One display group: a standalone message or a working cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatGroup {
    Message {
        id: String,
        entry: Entry,
    },
    Working {
        id: String,
        items: Vec<WorkingItem>,
        is_active: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        start_time: Option<u64>,
    },
}

impl ChatGroup {
    /// Group identifier, stable across recomputation.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Message { id, .. } | Self::Working { id, .. } => id,
        }
    }
}

fn thinking_item(entry: &Entry) -> ThinkingItem {
    match entry.thinking.as_ref() {
        Some(thinking) => ThinkingItem {
            content: thinking.content.clone(),
            is_streaming: thinking.is_streaming,
            phase: thinking.phase,
            start_time: thinking.start_time,
            duration: thinking.duration,
        },
        None => ThinkingItem {
            content: entry.content.clone(),
            is_streaming: entry.is_streaming,
            phase: if entry.is_streaming {
                ThinkingPhase::Thinking
            } else {
                ThinkingPhase::Done
            },
            start_time: None,
            duration: None,
        },
    }
}

struct GroupBuilder {
    groups: Vec<ChatGroup>,
    current_working: Option<usize>,
    last_user_id: Option<String>,
    last_user_time: Option<u64>,
    counts: HashMap<String, usize>,
    now_ms: u64,
}

impl GroupBuilder {
    fn new(now_ms: u64) -> Self {
        Self {
            groups: Vec::new(),
            current_working: None,
            last_user_id: None,
            last_user_time: None,
            counts: HashMap::new(),
            now_ms,
        }
    }

    fn working_group_id(&mut self, fallback_id: &str) -> String {
        let base = match &self.last_user_id {
            Some(user_id) => format!("user-{user_id}"),
            None => format!("fallback-{fallback_id}"),
        };
        let count = self.counts.entry(base.clone()).or_insert(0);
        let id = if *count == 0 {
            format!("working-{base}")
        } else {
            format!("working-{base}-{count}")
        };
        *count += 1;
        id
    }

    fn push_working_item(&mut self, item: WorkingItem, item_id: &str) {
        let index = match self.current_working {
            Some(index) => index,
            None => {
                let id = self.working_group_id(item_id);
                self.groups.push(ChatGroup::Working {
                    id,
                    items: Vec::new(),
                    is_active: false,
                    start_time: self.last_user_time.or(Some(self.now_ms)),
                });
                let index = self.groups.len() - 1;
                self.current_working = Some(index);
                index
            }
        };

        let active = item.is_active();
        if let ChatGroup::Working {
            items, is_active, ..
        } = &mut self.groups[index]
        {
            items.push(item);
            if active {
                *is_active = true;
            }
        }
    }

    fn close_working_group(&mut self) {
        self.current_working = None;
    }
}

/// True when `group_id` is anchored to the user turn `user_id` (the base id
/// or one of its disambiguated `-n` suffixes).
fn anchored_to_user(group_id: &str, user_id: &str) -> bool {
    let base = format!("working-user-{user_id}");
    group_id == base
        || group_id
            .strip_prefix(&base)
            .is_some_and(|rest| rest.starts_with('-'))
}

/// Derives the display groups for one session.
///
/// `now_ms` anchors the synthetic placeholder group inserted while
/// generation is active and no real activity has arrived yet.
#[must_use]
pub fn build_chat_groups(
    entries: &[Entry],
    approvals: &[ApprovalCard],
    is_generating: bool,
    now_ms: u64,
) -> Vec<ChatGroup> {
    let mut builder = GroupBuilder::new(now_ms);

    for entry in entries {
        if entry.role == Role::User {
            builder.last_user_id = Some(entry.id.clone());
            builder.last_user_time = entry.timestamp.or(Some(now_ms));
        }

        match entry.role {
            Role::Thought => {
                let item_id = format!("thought-{}", entry.id);
                builder.push_working_item(WorkingItem::Thinking(thinking_item(entry)), &item_id);
                continue;
            }
            Role::Tool => {
                for call in &entry.tool_calls {
                    let item_id = format!("toolcall-{}", call.tool_call_id);
                    builder.push_working_item(WorkingItem::ToolCall(call.clone()), &item_id);
                }
                continue;
            }
            Role::User | Role::Assistant => {}
        }

        let mut extracted = false;
        if entry.thinking.is_some() {
            let item_id = format!("thinking-{}", entry.id);
            builder.push_working_item(WorkingItem::Thinking(thinking_item(entry)), &item_id);
            extracted = true;
        }
        for call in &entry.tool_calls {
            let item_id = format!("toolcall-{}", call.tool_call_id);
            builder.push_working_item(WorkingItem::ToolCall(call.clone()), &item_id);
            extracted = true;
        }

        // The same activity must never render twice: once extracted into the
        // working group, it is stripped from the re-emitted message.
        let display = if extracted {
            let mut display = entry.clone();
            display.thinking = None;
            display.tool_calls = Vec::new();
            display
        } else {
            entry.clone()
        };

        builder.groups.push(ChatGroup::Message {
            id: entry.id.clone(),
            entry: display,
        });
        builder.close_working_group();
    }

    for card in approvals {
        let item_id = format!("approval-{}", card.call_id);
        builder.push_working_item(WorkingItem::Approval(card.clone()), &item_id);
    }

    let GroupBuilder {
        mut groups,
        last_user_id,
        last_user_time,
        mut counts,
        ..
    } = builder;

    let last_user_group_index = groups.iter().rposition(|group| {
        matches!(group, ChatGroup::Message { entry, .. } if entry.role == Role::User)
    });
    let last_working_index = groups
        .iter()
        .rposition(|group| matches!(group, ChatGroup::Working { .. }));
    let mut current_working_index = last_user_id.as_ref().and_then(|user_id| {
        groups.iter().rposition(|group| {
            matches!(group, ChatGroup::Working { id, .. } if anchored_to_user(id, user_id))
        })
    });

    let should_insert_placeholder = is_generating
        && match &last_user_id {
            Some(_) => current_working_index.is_none(),
            None => last_working_index.is_none(),
        };

    if should_insert_placeholder {
        let start_time = last_user_time.unwrap_or(now_ms);
        let base = match &last_user_id {
            Some(user_id) => format!("user-{user_id}"),
            None => format!("fallback-{start_time}"),
        };
        let count = counts.entry(base.clone()).or_insert(0);
        let id = if *count == 0 {
            format!("working-{base}")
        } else {
            format!("working-{base}-{count}")
        };
        *count += 1;

        let placeholder = ChatGroup::Working {
            id,
            items: vec![WorkingItem::Thinking(ThinkingItem {
                content: String::new(),
                is_streaming: true,
                phase: ThinkingPhase::Working,
                start_time: Some(start_time),
                duration: None,
            })],
            is_active: true,
            start_time: Some(start_time),
        };

        let insert_at = match last_user_group_index {
            Some(index) if index < groups.len() - 1 => index + 1,
            _ => groups.len(),
        };
        groups.insert(insert_at, placeholder);
        current_working_index = Some(insert_at);
    }

    if is_generating {
        let active_index = current_working_index.or(match last_user_id {
            None => last_working_index,
            Some(_) => None,
        });
        if let Some(index) = active_index {
            if let ChatGroup::Working { is_active, .. } = &mut groups[index] {
                *is_active = true;
            }
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use agent_events::{
        ApprovalDisplayKind, ApprovalStatus, PlanStep, ToolCallStatus, ToolKind,
    };
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::entry::ThinkingData;

    const NOW: u64 = 50_000;

    fn user(id: &str, text: &str) -> Entry {
        let mut entry = Entry::new(id, Role::User);
        entry.content = text.to_string();
        entry.timestamp = Some(1_000);
        entry
    }

    fn tool_call(id: &str, status: ToolCallStatus) -> ToolCallRecord {
        ToolCallRecord {
            tool_call_id: id.to_string(),
            title: "Read file".to_string(),
            kind: Some(ToolKind::Read),
            status,
            content: Vec::new(),
            locations: Vec::new(),
            raw_input: None,
            raw_output: None,
            start_time: None,
            duration: None,
        }
    }

    fn approval(call_id: &str, status: ApprovalStatus) -> ApprovalCard {
        ApprovalCard {
            call_id: call_id.to_string(),
            kind: ApprovalDisplayKind::Exec,
            title: "Approve command".to_string(),
            status,
            description: None,
            command: None,
            diffs: Vec::new(),
            options: Vec::new(),
            loading: false,
        }
    }

    #[test]
    fn extracts_working_activity_between_user_and_assistant() {
        let mut assistant = Entry::new("a1", Role::Assistant);
        assistant.content = "ok".to_string();
        assistant.thinking = Some(ThinkingData {
            content: "thinking".to_string(),
            is_streaming: true,
            phase: ThinkingPhase::Thinking,
            start_time: None,
            duration: None,
        });
        assistant.tool_calls = vec![tool_call("tool-1", ToolCallStatus::Pending)];

        let groups = build_chat_groups(&[user("u1", "hi"), assistant], &[], false, NOW);

        assert_eq!(groups.len(), 3);
        let ChatGroup::Message { entry, .. } = &groups[0] else {
            panic!("expected user message group");
        };
        assert_eq!(entry.role, Role::User);

        let ChatGroup::Working {
            items, is_active, ..
        } = &groups[1]
        else {
            panic!("expected working group");
        };
        assert_eq!(items.len(), 2);
        assert!(*is_active);

        let ChatGroup::Message { entry, .. } = &groups[2] else {
            panic!("expected assistant message group");
        };
        assert_eq!(entry.role, Role::Assistant);
        assert!(entry.thinking.is_none(), "thinking stripped from message");
        assert!(entry.tool_calls.is_empty(), "tool calls stripped from message");
    }

    #[test]
    fn thought_and_tool_entries_never_become_message_groups() {
        let mut thought = Entry::new("t1", Role::Thought);
        thought.content = "pondering".to_string();
        thought.is_streaming = true;

        let mut tool = Entry::new("tool-1", Role::Tool);
        tool.tool_calls = vec![tool_call("tool-1", ToolCallStatus::InProgress)];
        tool.is_streaming = true;

        let groups = build_chat_groups(&[user("u1", "go"), thought, tool], &[], false, NOW);

        assert_eq!(groups.len(), 2);
        let ChatGroup::Working { items, id, .. } = &groups[1] else {
            panic!("expected working group");
        };
        assert_eq!(items.len(), 2);
        assert_eq!(id, "working-user-u1");
    }

    #[test]
    fn emitted_assistant_text_splits_working_groups_within_one_turn() {
        let mut thought_a = Entry::new("t1", Role::Thought);
        thought_a.content = "first".to_string();

        let mut assistant = Entry::new("a1", Role::Assistant);
        assistant.content = "partial answer".to_string();

        let mut thought_b = Entry::new("t2", Role::Thought);
        thought_b.content = "second".to_string();

        let groups = build_chat_groups(
            &[user("u1", "go"), thought_a, assistant, thought_b],
            &[],
            false,
            NOW,
        );

        assert_eq!(groups.len(), 4);
        assert_eq!(groups[1].id(), "working-user-u1");
        assert_eq!(groups[3].id(), "working-user-u1-1");
    }

    #[test]
    fn group_ids_are_stable_across_recomputation() {
        let mut thought = Entry::new("t1", Role::Thought);
        thought.content = "hm".to_string();
        let entries = [user("u1", "go"), thought];

        let first = build_chat_groups(&entries, &[], false, NOW);
        let second = build_chat_groups(&entries, &[], false, NOW + 10_000);

        assert_eq!(
            first.iter().map(ChatGroup::id).collect::<Vec<_>>(),
            second.iter().map(ChatGroup::id).collect::<Vec<_>>()
        );
    }

    #[test]
    fn placeholder_appears_while_generating_with_no_activity() {
        let groups = build_chat_groups(&[], &[], true, NOW);

        assert_eq!(groups.len(), 1);
        let ChatGroup::Working {
            items, is_active, ..
        } = &groups[0]
        else {
            panic!("expected working group");
        };
        assert!(*is_active);
        assert_eq!(items.len(), 1);
        let WorkingItem::Thinking(thinking) = &items[0] else {
            panic!("expected thinking item");
        };
        assert_eq!(thinking.content, "");
        assert_eq!(thinking.phase, ThinkingPhase::Working);
        assert!(thinking.is_streaming);
    }

    #[test]
    fn placeholder_slots_in_directly_after_the_last_user_message() {
        let mut old_assistant = Entry::new("a0", Role::Assistant);
        old_assistant.content = "earlier answer".to_string();
        old_assistant.timestamp = Some(500);

        let entries = [
            user("u1", "first"),
            old_assistant,
            user("u2", "second question"),
        ];
        let groups = build_chat_groups(&entries, &[], true, NOW);

        assert_eq!(groups.len(), 4);
        assert!(matches!(&groups[2], ChatGroup::Message { entry, .. } if entry.role == Role::User));
        let ChatGroup::Working { id, is_active, .. } = &groups[3] else {
            panic!("expected placeholder working group");
        };
        assert_eq!(id, "working-user-u2");
        assert!(*is_active);
    }

    #[test]
    fn no_placeholder_when_real_activity_exists_for_latest_turn() {
        let mut thought = Entry::new("t1", Role::Thought);
        thought.content = "busy".to_string();
        thought.is_streaming = true;

        let groups = build_chat_groups(&[user("u1", "go"), thought], &[], true, NOW);

        assert_eq!(groups.len(), 2);
        let ChatGroup::Working { is_active, .. } = &groups[1] else {
            panic!("expected working group");
        };
        assert!(*is_active);
    }

    #[test]
    fn pending_approvals_append_as_working_items() {
        let groups = build_chat_groups(
            &[user("u1", "run this")],
            &[approval("req-1", ApprovalStatus::Pending)],
            false,
            NOW,
        );

        assert_eq!(groups.len(), 2);
        let ChatGroup::Working {
            items, is_active, ..
        } = &groups[1]
        else {
            panic!("expected working group");
        };
        assert!(matches!(&items[0], WorkingItem::Approval(card) if card.call_id == "req-1"));
        assert!(*is_active);
    }

    #[test]
    fn resolved_activity_leaves_groups_inactive() {
        let mut tool = Entry::new("tool-1", Role::Tool);
        tool.tool_calls = vec![tool_call("tool-1", ToolCallStatus::Completed)];
        tool.timestamp = Some(2_000);

        let groups = build_chat_groups(&[user("u1", "go"), tool], &[], false, NOW);

        let ChatGroup::Working { is_active, .. } = &groups[1] else {
            panic!("expected working group");
        };
        assert!(!*is_active);
    }

    #[test]
    fn plan_steps_survive_on_the_message_group() {
        let mut assistant = Entry::new("a1", Role::Assistant);
        assistant.content = "plan below".to_string();
        assistant.plan_steps = vec![PlanStep {
            id: "plan-step-0".to_string(),
            title: "survey".to_string(),
            status: agent_events::PlanStatus::Pending,
        }];
        assistant.thinking = Some(ThinkingData {
            content: "…".to_string(),
            is_streaming: false,
            phase: ThinkingPhase::Done,
            start_time: None,
            duration: None,
        });

        let groups = build_chat_groups(&[assistant], &[], false, NOW);

        let ChatGroup::Message { entry, .. } = groups.last().expect("message group") else {
            panic!("expected message group");
        };
        assert_eq!(entry.plan_steps.len(), 1);
        assert!(entry.thinking.is_none());
    }
}
