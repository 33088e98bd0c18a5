//! Plan/checklist updates emitted by the backend's planning tool.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::payload::{as_array, as_record, string_field};

/// Display status of one plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Pending,
    Active,
    Completed,
    Error,
}

/// One step of the agent's current plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub title: String,
    pub status: PlanStatus,
}

fn map_plan_status(raw: &str) -> PlanStatus {
    match raw.to_ascii_lowercase().as_str() {
        "in_progress" | "inprogress" => PlanStatus::Active,
        "completed" => PlanStatus::Completed,
        "error" | "failed" => PlanStatus::Error,
        _ => PlanStatus::Pending,
    }
}

/// Normalizes a raw plan payload (array of `{ step, status }` records) into
/// ordered steps with stable per-position ids.
#[must_use]
pub fn parse_plan_steps(plan: &Value) -> Vec<PlanStep> {
    as_array(plan)
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let record = as_record(item)?;
            let title = string_field(record, &["step", "title"])?.to_string();
            let status = map_plan_status(string_field(record, &["status"]).unwrap_or_default());
            Some(PlanStep {
                id: format!("plan-step-{index}"),
                title,
                status,
            })
        })
        .collect()
}
