//! Built-in tool visualizations.
//!
//! FEP 系（ABFE / RBFE）は progress report の `cmd` をステップ一覧に当てはめて
//! 進捗を表示します。report が無い / JSON でない場合は "Initializing" 扱い。

use serde_json::Value;

use crate::app::Job;
use crate::ports::RenderError;

use super::registry::JobViz;

pub const DOCKING_TOOL_KEY: &str = "deeporigin.docking";
pub const ABFE_TOOL_KEY: &str = "deeporigin.abfe-end-to-end";
pub const RBFE_TOOL_KEY: &str = "deeporigin.rbfe-end-to-end";
pub const SYSTEM_PREP_TOOL_KEY: &str = "deeporigin.system-prep";

const FEP_STEPS: [&str; 4] = ["Initializing", "Solvation FEP", "Binding FEP", "FEP Results"];
const FEP_RESULTS: &str = "FEP Results";
const DEFAULT_ENERGY_UNIT: &str = "kcal/mol";

/// Absolute binding free energy.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbfeViz;

impl JobViz for AbfeViz {
    fn title(&self, _job: &Job) -> String {
        "ABFE".to_string()
    }

    fn body(&self, job: &Job) -> Result<String, RenderError> {
        Ok(describe_fep_progress(progress_report(job).as_ref(), "delta G"))
    }
}

/// Relative binding free energy.
#[derive(Debug, Clone, Copy, Default)]
pub struct RbfeViz;

impl JobViz for RbfeViz {
    fn title(&self, _job: &Job) -> String {
        "RBFE".to_string()
    }

    fn body(&self, job: &Job) -> Result<String, RenderError> {
        Ok(describe_fep_progress(progress_report(job).as_ref(), "delta delta G"))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DockingViz;

impl JobViz for DockingViz {
    fn title(&self, job: &Job) -> String {
        match ligand_count(job) {
            Some(1) => "Docking (1 ligand)".to_string(),
            Some(n) => format!("Docking ({n} ligands)"),
            None => "Docking".to_string(),
        }
    }

    fn body(&self, job: &Job) -> Result<String, RenderError> {
        Ok(describe_generic_progress(progress_report(job).as_ref()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPrepViz;

impl JobViz for SystemPrepViz {
    fn title(&self, _job: &Job) -> String {
        "System preparation".to_string()
    }

    fn body(&self, job: &Job) -> Result<String, RenderError> {
        Ok(describe_generic_progress(progress_report(job).as_ref()))
    }
}

fn progress_report(job: &Job) -> Option<Value> {
    job.with_snapshot(|dto| dto.and_then(|d| d.progress_report()))
}

fn ligand_count(job: &Job) -> Option<usize> {
    job.with_snapshot(|dto| dto.and_then(|d| d.ligand_count()))
}

/// Step checklist for an FEP progress report.
///
/// `cmd == "FEP Results"` marks every step done and reports `Total` with its
/// unit under `result_label`.
pub fn describe_fep_progress(report: Option<&Value>, result_label: &str) -> String {
    let field = |key: &str| report.and_then(|r| r.get(key)).filter(|v| !v.is_null());
    let cmd = field("cmd").and_then(Value::as_str);

    if cmd == Some(FEP_RESULTS) {
        let total = field("Total").map_or_else(|| "N/A".to_string(), plain_value);
        let unit = field("unit")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_ENERGY_UNIT);
        return format!(
            "{}\nJob completed successfully ✓\n{result_label} = {total} {unit}",
            step_list(&FEP_STEPS, FEP_STEPS.len())
        );
    }

    let current = cmd
        .and_then(|cmd| FEP_STEPS.iter().position(|step| *step == cmd))
        .unwrap_or(0);
    let mut lines = vec![step_list(&FEP_STEPS, current)];
    if let Some(sub_step) = field("sub_step").and_then(Value::as_str) {
        lines.push(format!("  {sub_step}"));
    }
    if let (Some(done), Some(target)) = (
        field("current_avg_step").and_then(Value::as_f64),
        field("target_step").and_then(Value::as_f64),
    ) && target > 0.0
    {
        let pct = (done / target * 100.0).clamp(0.0, 100.0);
        lines.push(format!("  step {done} / {target} ({pct:.0}%)"));
    }
    lines.join("\n")
}

/// `cmd` and `sub_step` of a progress report, or "Initializing" when there is none.
pub fn describe_generic_progress(report: Option<&Value>) -> String {
    let field = |key: &str| report.and_then(|r| r.get(key)).and_then(Value::as_str);
    match (field("cmd"), field("sub_step")) {
        (Some(cmd), Some(sub_step)) => format!("{cmd}\n  {sub_step}"),
        (Some(cmd), None) => cmd.to_string(),
        _ => FEP_STEPS[0].to_string(),
    }
}

fn step_list(steps: &[&str], current: usize) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let marker = match i.cmp(&current) {
                std::cmp::Ordering::Less => "✓",
                std::cmp::Ordering::Equal => "▶",
                std::cmp::Ordering::Greater => "·",
            };
            format!("{marker} {step}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn plain_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
