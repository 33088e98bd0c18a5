//! Select-option extraction for modes, models, and slash commands.
//!
//! Mode/model choices arrive two ways: embedded in the create-session result
//! (`modes` / `models`) or later through `config-option-update` events. Both
//! shapes funnel into [`ResolvedOptions`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::payload::{as_array, as_record, field, string_field};

/// One selectable option (mode or model).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

/// Options plus the backend-reported current selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOptions {
    pub current_id: Option<String>,
    pub options: Vec<SelectOption>,
}

fn from_session_payload(
    raw: &Value,
    current_names: &[&str],
    list_names: &[&str],
    value_names: &[&str],
) -> Option<ResolvedOptions> {
    let record = as_record(raw)?;
    let current_id = string_field(record, current_names).map(str::to_string);
    let options: Vec<SelectOption> = field(record, list_names)
        .map(as_array)
        .unwrap_or_default()
        .iter()
        .filter_map(|item| {
            let record = as_record(item)?;
            let value = string_field(record, value_names)?.to_string();
            let label = string_field(record, &["name", "label"])
                .unwrap_or(&value)
                .to_string();
            Some(SelectOption { value, label })
        })
        .collect();

    if options.is_empty() && current_id.is_none() {
        return None;
    }
    Some(ResolvedOptions {
        current_id,
        options,
    })
}

fn push_config_option(options: &mut Vec<SelectOption>, record: &Map<String, Value>) {
    let Some(value) = string_field(record, &["value"]) else {
        return;
    };
    let label = string_field(record, &["name"]).unwrap_or(value);
    options.push(SelectOption {
        value: value.to_string(),
        label: label.to_string(),
    });
}

fn from_config_options(raw: &Value, target_id: &str) -> Option<ResolvedOptions> {
    let target = as_array(raw).iter().find_map(|item| {
        let record = as_record(item)?;
        let id = string_field(record, &["id"])?;
        id.eq_ignore_ascii_case(target_id).then_some(record)
    })?;

    let current_id = string_field(target, &["currentValue", "current_value"]).map(str::to_string);
    let mut options = Vec::new();

    for item in target.get("options").map(as_array).unwrap_or_default() {
        let Some(record) = as_record(item) else {
            continue;
        };
        // Option groups nest one level deep.
        let grouped = record.get("options").map(as_array).unwrap_or_default();
        if grouped.is_empty() {
            push_config_option(&mut options, record);
        } else {
            for inner in grouped {
                if let Some(inner) = as_record(inner) {
                    push_config_option(&mut options, inner);
                }
            }
        }
    }

    if options.is_empty() && current_id.is_none() {
        return None;
    }
    Some(ResolvedOptions {
        current_id,
        options,
    })
}

/// Resolves model options from the session payload, falling back to the
/// `model` config option.
#[must_use]
pub fn resolve_model_options(
    models: Option<&Value>,
    config_options: Option<&Value>,
) -> Option<ResolvedOptions> {
    models
        .and_then(|models| {
            from_session_payload(
                models,
                &["currentModelId", "current_model_id"],
                &["availableModels", "available_models"],
                &["modelId", "model_id", "id"],
            )
        })
        .or_else(|| config_options.and_then(|raw| from_config_options(raw, "model")))
}

/// Resolves mode options from the session payload, falling back to the
/// `mode` config option.
#[must_use]
pub fn resolve_mode_options(
    modes: Option<&Value>,
    config_options: Option<&Value>,
) -> Option<ResolvedOptions> {
    modes
        .and_then(|modes| {
            from_session_payload(
                modes,
                &["currentModeId", "current_mode_id"],
                &["availableModes", "available_modes"],
                &["id", "modeId", "mode_id"],
            )
        })
        .or_else(|| config_options.and_then(|raw| from_config_options(raw, "mode")))
}

/// Merges two option lists, primary first, dropping duplicate values.
#[must_use]
pub fn merge_select_options(
    primary: Vec<SelectOption>,
    fallback: Vec<SelectOption>,
) -> Vec<SelectOption> {
    if primary.is_empty() {
        return fallback;
    }
    if fallback.is_empty() {
        return primary;
    }

    let mut seen: BTreeSet<String> = primary.iter().map(|option| option.value.clone()).collect();
    let mut merged = primary;
    for option in fallback {
        if seen.insert(option.value.clone()) {
            merged.push(option);
        }
    }
    merged
}

/// Picks the option id to use: the preferred id when it is available, else
/// the first available fallback, else the first option, else the default.
#[must_use]
pub fn resolve_option_id(
    preferred: Option<&str>,
    available: &[SelectOption],
    fallbacks: &[Option<&str>],
    default_id: &str,
) -> String {
    let has_options = !available.is_empty();
    let is_available = |id: &str| available.iter().any(|option| option.value == id);

    let mut desired = preferred.filter(|id| !has_options || is_available(id));

    if desired.is_none() {
        desired = fallbacks
            .iter()
            .flatten()
            .copied()
            .find(|id| !has_options || is_available(id));
    }

    desired
        .map(str::to_string)
        .or_else(|| available.first().map(|option| option.value.clone()))
        .unwrap_or_else(|| default_id.to_string())
}

/// True when the desired id differs from the backend's current value and is
/// actually offered (or the offer list is unknown).
#[must_use]
pub fn should_sync_option(
    desired: Option<&str>,
    current: Option<&str>,
    available: &[SelectOption],
) -> bool {
    let Some(desired) = desired else {
        return false;
    };
    if current == Some(desired) {
        return false;
    }
    if available.is_empty() {
        return true;
    }
    available.iter().any(|option| option.value == desired)
}

/// Extracts slash-command names from an `available-commands` update.
///
/// Accepts a bare array or an object wrapping one; entries may be strings or
/// records with `name`/`command`. Names are trimmed, stripped of a leading
/// `/`, deduplicated, and sorted.
#[must_use]
pub fn extract_slash_commands(update: &Value) -> Vec<String> {
    let candidates: &[Value] = if update.is_array() {
        as_array(update)
    } else {
        as_record(update)
            .and_then(|record| {
                field(
                    record,
                    &["commands", "available_commands", "availableCommands"],
                )
            })
            .map(as_array)
            .unwrap_or_default()
    };

    let mut names = BTreeSet::new();
    for candidate in candidates {
        let name = match candidate {
            Value::String(name) => Some(name.as_str()),
            Value::Object(record) => string_field(record, &["name", "command"]),
            _ => None,
        };
        if let Some(name) = name {
            let cleaned = name.trim().trim_start_matches('/');
            if !cleaned.is_empty() {
                names.insert(cleaned.to_string());
            }
        }
    }

    names.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn options(values: &[&str]) -> Vec<SelectOption> {
        values
            .iter()
            .map(|value| SelectOption {
                value: value.to_string(),
                label: value.to_uppercase(),
            })
            .collect()
    }

    #[test]
    fn model_options_resolve_from_session_models() {
        let resolved = resolve_model_options(
            Some(&json!({
                "current_model_id": "gpt",
                "available_models": [{ "model_id": "gpt", "name": "GPT-Model" }],
            })),
            Some(&json!([])),
        )
        .expect("options resolved");

        assert_eq!(resolved.current_id.as_deref(), Some("gpt"));
        assert_eq!(
            resolved.options,
            vec![SelectOption {
                value: "gpt".to_string(),
                label: "GPT-Model".to_string(),
            }]
        );
    }

    #[test]
    fn model_options_fall_back_to_config_options_with_groups() {
        let config = json!([
            {
                "id": "Model",
                "current_value": "medium",
                "options": [
                    { "options": [{ "value": "low", "name": "Low" }, { "value": "medium" }] },
                    { "value": "high", "name": "High" },
                ],
            }
        ]);

        let resolved = resolve_model_options(None, Some(&config)).expect("options resolved");

        assert_eq!(resolved.current_id.as_deref(), Some("medium"));
        assert_eq!(
            resolved
                .options
                .iter()
                .map(|option| option.value.as_str())
                .collect::<Vec<_>>(),
            vec!["low", "medium", "high"]
        );
    }

    #[test]
    fn mode_options_resolve_from_session_modes() {
        let resolved = resolve_mode_options(
            Some(&json!({
                "currentModeId": "agent",
                "availableModes": [
                    { "id": "agent", "name": "Agent" },
                    { "id": "chat", "label": "Chat" },
                ],
            })),
            None,
        )
        .expect("options resolved");

        assert_eq!(resolved.current_id.as_deref(), Some("agent"));
        assert_eq!(resolved.options.len(), 2);
        assert_eq!(resolved.options[1].label, "Chat");
    }

    #[test]
    fn merge_drops_duplicate_values_and_keeps_primary_order() {
        let merged = merge_select_options(options(&["a"]), options(&["a", "b"]));
        assert_eq!(
            merged.iter().map(|option| option.value.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn resolve_option_id_prefers_available_preferred_value() {
        let available = options(&["agent", "chat"]);

        assert_eq!(
            resolve_option_id(Some("chat"), &available, &[Some("agent")], "fallback"),
            "chat"
        );
        // Preferred value not offered: first available fallback wins.
        assert_eq!(
            resolve_option_id(Some("gone"), &available, &[Some("agent")], "fallback"),
            "agent"
        );
        // Nothing usable: first option.
        assert_eq!(
            resolve_option_id(Some("gone"), &available, &[Some("also-gone")], "fallback"),
            "agent"
        );
        // No options at all: default id.
        assert_eq!(resolve_option_id(None, &[], &[None], "fallback"), "fallback");
    }

    #[test]
    fn should_sync_only_when_different_and_offered() {
        let available = options(&["agent", "chat"]);

        assert!(should_sync_option(Some("chat"), Some("agent"), &available));
        assert!(!should_sync_option(Some("agent"), Some("agent"), &available));
        assert!(!should_sync_option(Some("gone"), Some("agent"), &available));
        assert!(!should_sync_option(None, Some("agent"), &available));
        assert!(should_sync_option(Some("anything"), None, &[]));
    }

    #[test]
    fn slash_commands_are_cleaned_deduplicated_and_sorted() {
        let commands = extract_slash_commands(&json!([
            { "name": "/review" },
            " /init ",
            { "command": "compact" },
            { "command": "/review" },
            "",
        ]));

        assert_eq!(commands, vec!["compact", "init", "review"]);
    }

    #[test]
    fn slash_commands_unwrap_object_updates() {
        let commands = extract_slash_commands(&json!({
            "available_commands": ["plan", "/undo"],
        }));

        assert_eq!(commands, vec!["plan", "undo"]);
    }
}
