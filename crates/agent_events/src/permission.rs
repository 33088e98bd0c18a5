//! Permission options and approval cards.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::payload::{as_array, as_record, field, string_field};
use crate::tool_call::{normalize_tool_kind, parse_tool_call_content, ToolCallContent, ToolKind};

/// Canonical permission-option kind offered by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionOptionKind {
    AllowAlways,
    AllowOnce,
    RejectAlways,
    RejectOnce,
}

/// User-facing status of an approval card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    ApprovedForSession,
    Rejected,
}

/// Maps a raw option kind onto the canonical enum.
///
/// Unrecognized kinds deliberately map to `AllowOnce` rather than failing
/// closed: an option the user cannot click is worse than one with a softened
/// label. Tighten here if the backend ever introduces stricter kinds.
#[must_use]
pub fn normalize_permission_kind(raw: Option<&str>) -> PermissionOptionKind {
    match raw.unwrap_or_default().to_ascii_lowercase().as_str() {
        "allow_always" | "allow-always" => PermissionOptionKind::AllowAlways,
        "allow_once" | "allow-once" => PermissionOptionKind::AllowOnce,
        "reject_always" | "reject-always" => PermissionOptionKind::RejectAlways,
        "reject_once" | "reject-once" | "abort" => PermissionOptionKind::RejectOnce,
        _ => PermissionOptionKind::AllowOnce,
    }
}

/// Status an approval card takes on once the user picks an option.
#[must_use]
pub fn approval_status_from_kind(kind: PermissionOptionKind) -> ApprovalStatus {
    match kind {
        PermissionOptionKind::AllowAlways => ApprovalStatus::ApprovedForSession,
        PermissionOptionKind::AllowOnce => ApprovalStatus::Approved,
        PermissionOptionKind::RejectAlways | PermissionOptionKind::RejectOnce => {
            ApprovalStatus::Rejected
        }
    }
}

/// One clickable option on an approval card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalOption {
    pub id: String,
    pub label: String,
    pub kind: PermissionOptionKind,
}

/// Normalizes raw permission options. Options without an id are dropped;
/// missing labels fall back to the id.
#[must_use]
pub fn map_approval_options(raw: &[Value]) -> Vec<ApprovalOption> {
    raw.iter()
        .filter_map(|option| {
            let record = as_record(option)?;
            let id = string_field(record, &["optionId", "option_id", "id"])?.to_string();
            let label = string_field(record, &["label", "name"])
                .unwrap_or(&id)
                .to_string();
            let kind = normalize_permission_kind(string_field(record, &["kind"]));
            Some(ApprovalOption { id, label, kind })
        })
        .collect()
}

/// Broad presentation style of an approval card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDisplayKind {
    Exec,
    Patch,
}

/// One diff attached to an approval card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDiff {
    pub path: String,
    pub diff: String,
}

/// Display model for one pending approval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalCard {
    pub call_id: String,
    pub kind: ApprovalDisplayKind,
    pub title: String,
    pub status: ApprovalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diffs: Vec<ApprovalDiff>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ApprovalOption>,
    pub loading: bool,
}

impl ApprovalCard {
    /// True while the card still needs user attention.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ApprovalStatus::Pending || self.loading
    }
}

/// Extracts the command line a tool call proposes to run, if any.
#[must_use]
pub fn extract_command(raw_input: Option<&Value>) -> Option<String> {
    let record = raw_input.and_then(as_record)?;
    let command = field(
        record,
        &["proposed_execpolicy_amendment", "command", "cmd"],
    );

    match command {
        Some(Value::Array(parts)) => Some(
            parts
                .iter()
                .map(|part| match part {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(" "),
        ),
        Some(Value::String(text)) => Some(text.clone()),
        _ => {
            let parsed = as_array(field(record, &["parsed_cmd"])?).first()?;
            let parsed = as_record(parsed)?;
            string_field(parsed, &["cmd"]).map(str::to_string)
        }
    }
}

/// Extracts the diff blocks carried by a raw approval tool call.
#[must_use]
pub fn extract_approval_diffs(tool_call: &Value) -> Vec<ApprovalDiff> {
    let Some(record) = as_record(tool_call) else {
        return Vec::new();
    };
    let Some(content) = field(record, &["content"]) else {
        return Vec::new();
    };

    parse_tool_call_content(content)
        .into_iter()
        .filter_map(|item| match item {
            ToolCallContent::Diff { path, diff } => Some(ApprovalDiff { path, diff }),
            _ => None,
        })
        .collect()
}

/// Extracts the human-readable description carried by a raw approval tool
/// call: all text blocks, trimmed and joined by blank lines.
#[must_use]
pub fn extract_approval_description(tool_call: &Value) -> Option<String> {
    let record = as_record(tool_call)?;
    let content = field(record, &["content"])?;

    let texts: Vec<String> = parse_tool_call_content(content)
        .into_iter()
        .filter_map(|item| match item {
            ToolCallContent::Text { text } => {
                let trimmed = text.trim().to_string();
                (!trimmed.is_empty()).then_some(trimmed)
            }
            _ => None,
        })
        .collect();

    (!texts.is_empty()).then(|| texts.join("\n\n"))
}

/// Builds the display card for a pending approval request.
#[must_use]
pub fn build_approval_card(
    request_id: &str,
    tool_call: &Value,
    options: &[Value],
    status: ApprovalStatus,
    loading: bool,
) -> ApprovalCard {
    let record = as_record(tool_call);
    let tool_kind = record
        .and_then(|record| string_field(record, &["kind"]))
        .and_then(|kind| normalize_tool_kind(Some(kind)));
    let kind = if tool_kind == Some(ToolKind::Edit) {
        ApprovalDisplayKind::Patch
    } else {
        ApprovalDisplayKind::Exec
    };
    let title = record
        .and_then(|record| string_field(record, &["title", "name"]))
        .unwrap_or("Approval required")
        .to_string();
    let command = record
        .and_then(|record| field(record, &["rawInput", "raw_input"]))
        .and_then(|raw_input| extract_command(Some(raw_input)));

    ApprovalCard {
        call_id: request_id.to_string(),
        kind,
        title,
        status,
        description: extract_approval_description(tool_call),
        command,
        diffs: extract_approval_diffs(tool_call),
        options: map_approval_options(options),
        loading,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn permission_kinds_accept_both_spellings_and_abort() {
        assert_eq!(
            normalize_permission_kind(Some("allow_always")),
            PermissionOptionKind::AllowAlways
        );
        assert_eq!(
            normalize_permission_kind(Some("reject-always")),
            PermissionOptionKind::RejectAlways
        );
        assert_eq!(
            normalize_permission_kind(Some("abort")),
            PermissionOptionKind::RejectOnce
        );
    }

    #[test]
    fn unrecognized_permission_kind_stays_clickable() {
        assert_eq!(
            normalize_permission_kind(Some("require_mfa")),
            PermissionOptionKind::AllowOnce
        );
        assert_eq!(normalize_permission_kind(None), PermissionOptionKind::AllowOnce);
    }

    #[test]
    fn selection_status_follows_option_kind() {
        assert_eq!(
            approval_status_from_kind(PermissionOptionKind::AllowAlways),
            ApprovalStatus::ApprovedForSession
        );
        assert_eq!(
            approval_status_from_kind(PermissionOptionKind::AllowOnce),
            ApprovalStatus::Approved
        );
        assert_eq!(
            approval_status_from_kind(PermissionOptionKind::RejectOnce),
            ApprovalStatus::Rejected
        );
    }

    #[test]
    fn options_without_id_are_dropped() {
        let options = map_approval_options(&[
            json!({ "option_id": "allow", "name": "Allow", "kind": "allow_once" }),
            json!({ "label": "orphan" }),
            json!("not an object"),
        ]);

        assert_eq!(options.len(), 1);
        assert_eq!(options[0].id, "allow");
        assert_eq!(options[0].label, "Allow");
    }

    #[test]
    fn command_extraction_joins_argv_and_reads_fallbacks() {
        assert_eq!(
            extract_command(Some(&json!({ "command": ["git", "status"] }))),
            Some("git status".to_string())
        );
        assert_eq!(
            extract_command(Some(&json!({ "cmd": "ls -la" }))),
            Some("ls -la".to_string())
        );
        assert_eq!(
            extract_command(Some(&json!({ "parsed_cmd": [{ "cmd": "rm -rf target" }] }))),
            Some("rm -rf target".to_string())
        );
        assert_eq!(extract_command(Some(&json!({ "other": 1 }))), None);
        assert_eq!(extract_command(None), None);
    }

    #[test]
    fn card_derives_patch_kind_and_diffs_for_edits() {
        let tool_call = json!({
            "title": "Apply patch",
            "kind": "edit",
            "raw_input": { "command": "apply" },
            "content": [
                { "type": "content", "content": { "type": "text", "text": " update foo " } },
                { "type": "diff", "path": "foo.txt", "old_text": "a", "new_text": "b" }
            ],
        });
        let options = [json!({ "optionId": "yes", "label": "Allow", "kind": "allow_once" })];

        let card = build_approval_card("req-1", &tool_call, &options, ApprovalStatus::Pending, false);

        assert_eq!(card.call_id, "req-1");
        assert_eq!(card.kind, ApprovalDisplayKind::Patch);
        assert_eq!(card.title, "Apply patch");
        assert_eq!(card.description.as_deref(), Some("update foo"));
        assert_eq!(card.command.as_deref(), Some("apply"));
        assert_eq!(card.diffs.len(), 1);
        assert_eq!(card.options.len(), 1);
        assert!(card.is_active());
    }
}
