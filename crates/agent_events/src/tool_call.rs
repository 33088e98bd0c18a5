//! Canonical tool-call records and the rules for building and patching them
//! from raw backend payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::diff::build_unified_diff;
use crate::payload::{as_array, as_record, field, i64_field, pretty_json, string_field};

/// Lifecycle status of one tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolCallStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ToolCallStatus {
    /// True while the call still has work outstanding.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    /// True once the call reached a terminal status.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Coarse classification of what a tool call does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Read,
    Edit,
    Execute,
    Search,
    Fetch,
    Browser,
    Mcp,
    Other,
}

/// File location referenced by a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallLocation {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u64>,
}

/// Display content attached to a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolCallContent {
    Text {
        text: String,
    },
    Diff {
        path: String,
        diff: String,
    },
    Terminal {
        terminal_id: String,
        #[serde(default)]
        output: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        signal: Option<String>,
    },
}

/// One tool call as tracked by the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_call_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ToolKind>,
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ToolCallContent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<ToolCallLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// Maps a raw status string onto the canonical enum. Unknown input is
/// `pending`, never an error.
#[must_use]
pub fn normalize_tool_call_status(raw: Option<&str>) -> ToolCallStatus {
    match raw.unwrap_or_default().to_ascii_lowercase().as_str() {
        "in_progress" | "in-progress" => ToolCallStatus::InProgress,
        "completed" => ToolCallStatus::Completed,
        "failed" => ToolCallStatus::Failed,
        _ => ToolCallStatus::Pending,
    }
}

/// Maps a raw kind string onto the canonical enum. Unrecognized non-empty
/// strings classify as `Other`; absent or empty input stays unclassified.
#[must_use]
pub fn normalize_tool_kind(raw: Option<&str>) -> Option<ToolKind> {
    let key = raw.unwrap_or_default().to_ascii_lowercase();
    match key.as_str() {
        "read" => Some(ToolKind::Read),
        "edit" | "delete" | "move" => Some(ToolKind::Edit),
        "execute" => Some(ToolKind::Execute),
        "search" => Some(ToolKind::Search),
        "fetch" => Some(ToolKind::Fetch),
        "browser" => Some(ToolKind::Browser),
        "mcp" => Some(ToolKind::Mcp),
        "" => None,
        _ => Some(ToolKind::Other),
    }
}

/// Extracts the tool-call identifier from a raw payload, if present.
#[must_use]
pub fn tool_call_id(raw: &Value) -> Option<String> {
    let record = as_record(raw)?;
    string_field(record, &["toolCallId", "tool_call_id", "id"]).map(str::to_string)
}

fn extract_meta<'a>(record: &'a Map<String, Value>) -> Option<&'a Map<String, Value>> {
    field(record, &["_meta", "meta"]).and_then(as_record)
}

fn parse_locations(raw: Option<&Value>) -> Vec<ToolCallLocation> {
    let Some(raw) = raw else {
        return Vec::new();
    };

    as_array(raw)
        .iter()
        .filter_map(|item| {
            let record = as_record(item)?;
            let uri = string_field(record, &["path", "uri"])?.to_string();
            let start_line = field(record, &["line", "startLine", "start_line"])
                .and_then(Value::as_u64)
                .filter(|line| *line > 0);
            Some(ToolCallLocation { uri, start_line })
        })
        .collect()
}

/// Normalizes a raw `content` array into canonical content blocks.
///
/// `content` sub-items unwrap to text (plain text, `"name (uri)"` resource
/// links, or a pretty-printed JSON fallback), `diff` items build a unified
/// diff from raw old/new text, and `terminal` items become terminal blocks
/// keyed by terminal id.
#[must_use]
pub fn parse_tool_call_content(raw: &Value) -> Vec<ToolCallContent> {
    let mut result = Vec::new();

    for item in as_array(raw) {
        let Some(record) = as_record(item) else {
            continue;
        };

        match string_field(record, &["type"]) {
            Some("content") => {
                let Some(inner) = record.get("content").and_then(as_record) else {
                    continue;
                };
                let text = match string_field(inner, &["type"]) {
                    Some("text") => match string_field(inner, &["text"]) {
                        Some(text) => text.to_string(),
                        None => continue,
                    },
                    Some("resource_link") => {
                        let name = string_field(inner, &["name"]).unwrap_or("resource");
                        match string_field(inner, &["uri"]) {
                            Some(uri) => format!("{name} ({uri})"),
                            None => name.to_string(),
                        }
                    }
                    _ => pretty_json(&Value::Object(inner.clone())),
                };
                result.push(ToolCallContent::Text { text });
            }
            Some("diff") => {
                let path = string_field(record, &["path"]).unwrap_or("unknown");
                let old_text = string_field(record, &["oldText", "old_text"]);
                let new_text = string_field(record, &["newText", "new_text"]).or(Some(""));
                result.push(ToolCallContent::Diff {
                    path: path.to_string(),
                    diff: build_unified_diff(path, old_text, new_text),
                });
            }
            Some("terminal") => {
                if let Some(terminal_id) = string_field(record, &["terminalId", "terminal_id"]) {
                    result.push(ToolCallContent::Terminal {
                        terminal_id: terminal_id.to_string(),
                        output: String::new(),
                        cwd: None,
                        exit_code: None,
                        signal: None,
                    });
                }
            }
            _ => {}
        }
    }

    result
}

fn terminal_entry<'a>(
    content: &'a mut Vec<ToolCallContent>,
    terminal_id: &str,
) -> &'a mut ToolCallContent {
    let index = content.iter().position(|item| {
        matches!(item, ToolCallContent::Terminal { terminal_id: id, .. } if id == terminal_id)
    });

    let index = match index {
        Some(index) => index,
        None => {
            content.push(ToolCallContent::Terminal {
                terminal_id: terminal_id.to_string(),
                output: String::new(),
                cwd: None,
                exit_code: None,
                signal: None,
            });
            content.len() - 1
        }
    };

    &mut content[index]
}

/// Applies terminal metadata (`terminal_info` / `terminal_output` /
/// `terminal_exit`) onto content blocks. Output is append-only across
/// repeated updates; exit code and signal are set once and retained.
fn apply_terminal_meta(content: &mut Vec<ToolCallContent>, meta: Option<&Map<String, Value>>) {
    let Some(meta) = meta else {
        return;
    };

    if let Some(info) = field(meta, &["terminal_info", "terminalInfo"]).and_then(as_record) {
        if let Some(id) = string_field(info, &["terminal_id", "terminalId"]) {
            let info_cwd = string_field(info, &["cwd"]).map(str::to_string);
            if let ToolCallContent::Terminal { cwd, .. } = terminal_entry(content, id) {
                if info_cwd.is_some() {
                    *cwd = info_cwd;
                }
            }
        }
    }

    if let Some(chunk) = field(meta, &["terminal_output", "terminalOutput"]).and_then(as_record) {
        let id = string_field(chunk, &["terminal_id", "terminalId"]);
        let data = string_field(chunk, &["data"]);
        if let (Some(id), Some(data)) = (id, data) {
            let data = data.to_string();
            if let ToolCallContent::Terminal { output, .. } = terminal_entry(content, id) {
                output.push_str(&data);
            }
        }
    }

    if let Some(exit) = field(meta, &["terminal_exit", "terminalExit"]).and_then(as_record) {
        if let Some(id) = string_field(exit, &["terminal_id", "terminalId"]) {
            let next_code = i64_field(exit, &["exit_code", "exitCode"]);
            let next_signal = string_field(exit, &["signal"]).map(str::to_string);
            if let ToolCallContent::Terminal {
                exit_code, signal, ..
            } = terminal_entry(content, id)
            {
                if exit_code.is_none() {
                    *exit_code = next_code;
                }
                if signal.is_none() {
                    *signal = next_signal;
                }
            }
        }
    }
}

/// Carries accumulated terminal state from an existing record into freshly
/// parsed content so repeated updates never lose already-streamed output.
fn merge_terminal_history(content: &mut [ToolCallContent], existing: &[ToolCallContent]) {
    for item in content.iter_mut() {
        let ToolCallContent::Terminal {
            terminal_id,
            output,
            cwd,
            exit_code,
            signal,
        } = item
        else {
            continue;
        };

        let prior = existing.iter().find_map(|candidate| match candidate {
            ToolCallContent::Terminal {
                terminal_id: id,
                output,
                cwd,
                exit_code,
                signal,
            } if id == terminal_id => Some((output, cwd, exit_code, signal)),
            _ => None,
        });

        if let Some((prior_output, prior_cwd, prior_exit, prior_signal)) = prior {
            if !prior_output.is_empty() {
                *output = format!("{prior_output}{output}");
            }
            if cwd.is_none() {
                *cwd = prior_cwd.clone();
            }
            if exit_code.is_none() {
                *exit_code = *prior_exit;
            }
            if signal.is_none() {
                *signal = prior_signal.clone();
            }
        }
    }
}

/// Builds a canonical record from a raw `tool-call` payload.
///
/// `now_ms` is captured as `start_time` only when the call arrives already
/// in progress; everything else about this function is a pure mapping.
#[must_use]
pub fn parse_tool_call(raw: &Value, now_ms: u64) -> ToolCallRecord {
    let empty = Map::new();
    let record = as_record(raw).unwrap_or(&empty);

    let id = tool_call_id(raw).unwrap_or_else(|| format!("tool-{now_ms}"));
    let title = string_field(record, &["title", "name"])
        .unwrap_or("Tool Call")
        .to_string();
    let status = normalize_tool_call_status(string_field(record, &["status"]));
    let kind = normalize_tool_kind(string_field(record, &["kind"]));
    let locations = parse_locations(field(record, &["locations"]));
    let raw_input = field(record, &["rawInput", "raw_input"]).cloned();
    let raw_output = field(record, &["rawOutput", "raw_output"]).cloned();

    let mut content = field(record, &["content"])
        .map(parse_tool_call_content)
        .unwrap_or_default();
    apply_terminal_meta(&mut content, extract_meta(record));

    ToolCallRecord {
        tool_call_id: id,
        title,
        kind,
        status,
        content,
        locations,
        raw_input,
        raw_output,
        start_time: (status == ToolCallStatus::InProgress).then_some(now_ms),
        duration: None,
    }
}

/// Merges a partial `tool-call-update` payload onto an existing record.
///
/// Present fields override; absent fields keep the existing value. Content
/// replaces wholesale but terminal blocks retain their accumulated output,
/// and the duration is computed exactly once, on the first transition into a
/// terminal status.
#[must_use]
pub fn apply_tool_call_update(
    existing: Option<&ToolCallRecord>,
    raw: &Value,
    now_ms: u64,
) -> ToolCallRecord {
    let empty = Map::new();
    let record = as_record(raw).unwrap_or(&empty);

    let id = tool_call_id(raw)
        .or_else(|| existing.map(|record| record.tool_call_id.clone()))
        .unwrap_or_else(|| format!("tool-{now_ms}"));
    let status = match string_field(record, &["status"]) {
        Some(status) => normalize_tool_call_status(Some(status)),
        None => existing.map_or(ToolCallStatus::Pending, |record| record.status),
    };
    let kind = match string_field(record, &["kind"]) {
        Some(kind) => normalize_tool_kind(Some(kind)),
        None => existing.and_then(|record| record.kind),
    };
    let title = string_field(record, &["title"])
        .map(str::to_string)
        .or_else(|| existing.map(|record| record.title.clone()))
        .unwrap_or_else(|| "Tool Call".to_string());
    let locations = match field(record, &["locations"]) {
        Some(raw) => parse_locations(Some(raw)),
        None => existing.map(|record| record.locations.clone()).unwrap_or_default(),
    };
    let raw_input = field(record, &["rawInput", "raw_input"])
        .cloned()
        .or_else(|| existing.and_then(|record| record.raw_input.clone()));
    let raw_output = field(record, &["rawOutput", "raw_output"])
        .cloned()
        .or_else(|| existing.and_then(|record| record.raw_output.clone()));

    let existing_content = existing.map(|record| record.content.as_slice()).unwrap_or_default();
    let mut content = match field(record, &["content"]) {
        Some(raw_content) => {
            let mut parsed = parse_tool_call_content(raw_content);
            merge_terminal_history(&mut parsed, existing_content);
            parsed
        }
        None => existing_content.to_vec(),
    };
    apply_terminal_meta(&mut content, extract_meta(record));

    let start_time = existing
        .and_then(|record| record.start_time)
        .or_else(|| (status == ToolCallStatus::InProgress).then_some(now_ms));
    let duration = match (status.is_terminal(), start_time) {
        (true, Some(start)) => existing
            .and_then(|record| record.duration)
            .or_else(|| Some(now_ms.saturating_sub(start) as f64 / 1000.0)),
        _ => existing.and_then(|record| record.duration),
    };

    ToolCallRecord {
        tool_call_id: id,
        title,
        kind,
        status,
        content,
        locations,
        raw_input,
        raw_output,
        start_time,
        duration,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn status_normalization_accepts_both_spellings() {
        assert_eq!(
            normalize_tool_call_status(Some("in_progress")),
            ToolCallStatus::InProgress
        );
        assert_eq!(
            normalize_tool_call_status(Some("in-progress")),
            ToolCallStatus::InProgress
        );
        assert_eq!(
            normalize_tool_call_status(Some("completed")),
            ToolCallStatus::Completed
        );
        assert_eq!(normalize_tool_call_status(Some("failed")), ToolCallStatus::Failed);
        assert_eq!(normalize_tool_call_status(Some("???")), ToolCallStatus::Pending);
        assert_eq!(normalize_tool_call_status(None), ToolCallStatus::Pending);
    }

    #[test]
    fn kind_normalization_folds_edit_family_and_flags_unknowns() {
        assert_eq!(normalize_tool_kind(Some("delete")), Some(ToolKind::Edit));
        assert_eq!(normalize_tool_kind(Some("move")), Some(ToolKind::Edit));
        assert_eq!(normalize_tool_kind(Some("browser")), Some(ToolKind::Browser));
        assert_eq!(normalize_tool_kind(Some("surprise")), Some(ToolKind::Other));
        assert_eq!(normalize_tool_kind(Some("")), None);
        assert_eq!(normalize_tool_kind(None), None);
    }

    #[test]
    fn parse_is_idempotent_for_identical_input_and_time() {
        let raw = json!({
            "tool_call_id": "call-7",
            "name": "Run tests",
            "status": "in_progress",
            "kind": "execute",
            "raw_input": { "command": "cargo test" },
        });

        let first = parse_tool_call(&raw, 5_000);
        let second = parse_tool_call(&raw, 5_000);

        assert_eq!(first, second);
        assert_eq!(first.tool_call_id, "call-7");
        assert_eq!(first.title, "Run tests");
        assert_eq!(first.start_time, Some(5_000));
    }

    #[test]
    fn parse_defaults_cover_malformed_payloads() {
        let record = parse_tool_call(&json!("not an object"), 1_000);

        assert_eq!(record.tool_call_id, "tool-1000");
        assert_eq!(record.title, "Tool Call");
        assert_eq!(record.status, ToolCallStatus::Pending);
        assert_eq!(record.kind, None);
        assert!(record.content.is_empty());
        assert_eq!(record.start_time, None);
    }

    #[test]
    fn parse_builds_diff_content_from_raw_text_pair() {
        let record = parse_tool_call(
            &json!({
                "toolCallId": "call-1",
                "title": "Edit",
                "kind": "edit",
                "status": "completed",
                "content": [
                    { "type": "diff", "path": "foo.txt", "oldText": "a", "newText": "b" }
                ],
            }),
            0,
        );

        let ToolCallContent::Diff { path, diff } = &record.content[0] else {
            panic!("expected diff content");
        };
        assert_eq!(path, "foo.txt");
        assert!(diff.contains("--- a/foo.txt"));
        assert!(diff.contains("\n-a"));
        assert!(diff.contains("\n+b"));
    }

    #[test]
    fn parse_unwraps_content_blocks() {
        let record = parse_tool_call(
            &json!({
                "toolCallId": "call-2",
                "content": [
                    { "type": "content", "content": { "type": "text", "text": "plain" } },
                    {
                        "type": "content",
                        "content": { "type": "resource_link", "name": "readme", "uri": "file:///README.md" }
                    },
                    { "type": "content", "content": { "type": "mystery", "payload": 1 } },
                ],
            }),
            0,
        );

        assert_eq!(record.content.len(), 3);
        assert_eq!(
            record.content[0],
            ToolCallContent::Text {
                text: "plain".to_string()
            }
        );
        assert_eq!(
            record.content[1],
            ToolCallContent::Text {
                text: "readme (file:///README.md)".to_string()
            }
        );
        let ToolCallContent::Text { text } = &record.content[2] else {
            panic!("expected text fallback");
        };
        assert!(text.contains("\"mystery\""));
    }

    #[test]
    fn terminal_output_accumulates_across_updates() {
        let first = parse_tool_call(
            &json!({
                "toolCallId": "call-3",
                "status": "in_progress",
                "_meta": {
                    "terminal_info": { "terminal_id": "term-1", "cwd": "/work" },
                    "terminal_output": { "terminal_id": "term-1", "data": "hello " },
                },
            }),
            100,
        );

        let updated = apply_tool_call_update(
            Some(&first),
            &json!({
                "toolCallId": "call-3",
                "_meta": {
                    "terminal_output": { "terminal_id": "term-1", "data": "world" },
                    "terminal_exit": { "terminal_id": "term-1", "exit_code": 0 },
                },
            }),
            200,
        );

        let ToolCallContent::Terminal {
            output,
            cwd,
            exit_code,
            ..
        } = &updated.content[0]
        else {
            panic!("expected terminal content");
        };
        assert_eq!(output, "hello world");
        assert_eq!(cwd.as_deref(), Some("/work"));
        assert_eq!(*exit_code, Some(0));

        // A late exit event must not overwrite the recorded code.
        let again = apply_tool_call_update(
            Some(&updated),
            &json!({
                "toolCallId": "call-3",
                "_meta": { "terminal_exit": { "terminal_id": "term-1", "exit_code": 137 } },
            }),
            300,
        );
        let ToolCallContent::Terminal { exit_code, .. } = &again.content[0] else {
            panic!("expected terminal content");
        };
        assert_eq!(*exit_code, Some(0));
    }

    #[test]
    fn update_computes_duration_once() {
        let started = parse_tool_call(
            &json!({ "toolCallId": "call-4", "status": "in_progress" }),
            1_000,
        );

        let finished = apply_tool_call_update(
            Some(&started),
            &json!({ "toolCallId": "call-4", "status": "completed" }),
            4_000,
        );
        assert_eq!(finished.duration, Some(3.0));

        // Re-applying a terminal update keeps the original duration.
        let reapplied = apply_tool_call_update(
            Some(&finished),
            &json!({ "toolCallId": "call-4", "status": "completed" }),
            60_000,
        );
        assert_eq!(reapplied.duration, Some(3.0));
    }

    #[test]
    fn update_keeps_existing_fields_when_patch_omits_them() {
        let existing = parse_tool_call(
            &json!({
                "toolCallId": "call-5",
                "title": "Read file",
                "kind": "read",
                "status": "in_progress",
                "locations": [{ "path": "src/lib.rs", "line": 4 }],
            }),
            100,
        );

        let updated = apply_tool_call_update(
            Some(&existing),
            &json!({ "toolCallId": "call-5", "status": "completed" }),
            900,
        );

        assert_eq!(updated.title, "Read file");
        assert_eq!(updated.kind, Some(ToolKind::Read));
        assert_eq!(updated.locations, existing.locations);
        assert_eq!(updated.status, ToolCallStatus::Completed);
    }
}
