//! Tolerant normalization of loosely-typed agent backend payloads.
//!
//! The backend delivers tool calls, permission options, plan updates, and
//! option lists as untyped JSON with inconsistent field naming (camelCase and
//! snake_case both occur in the wild). This crate is the single boundary that
//! absorbs that looseness: everything downstream consumes the canonical
//! shapes defined here and never touches raw payloads.
//!
//! Normalization never fails. Malformed input degrades to safe defaults
//! (`pending` status, absent kind, generated id) so a misbehaving backend
//! cannot crash the event pipeline.

pub mod diff;
pub mod options;
pub mod payload;
pub mod permission;
pub mod plan;
pub mod tool_call;

pub use diff::build_unified_diff;
pub use options::{
    extract_slash_commands, merge_select_options, resolve_mode_options, resolve_model_options,
    resolve_option_id, should_sync_option, ResolvedOptions, SelectOption,
};
pub use permission::{
    approval_status_from_kind, build_approval_card, extract_approval_description,
    extract_approval_diffs, extract_command, map_approval_options, normalize_permission_kind,
    ApprovalCard, ApprovalDiff, ApprovalDisplayKind, ApprovalOption, ApprovalStatus,
    PermissionOptionKind,
};
pub use plan::{parse_plan_steps, PlanStatus, PlanStep};
pub use tool_call::{
    apply_tool_call_update, normalize_tool_call_status, normalize_tool_kind, parse_tool_call,
    parse_tool_call_content, tool_call_id, ToolCallContent, ToolCallLocation, ToolCallRecord,
    ToolCallStatus, ToolKind,
};
