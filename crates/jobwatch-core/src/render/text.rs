//! TextRenderer - ターミナル向けのプレーンテキスト描画
//!
//! 構成:
//! ```text
//! == <title> ==
//! Status / Execution / Resource / Started / Running time
//! <Quoted メッセージ or ツール可視化>
//! Progress report (JSON を整形、JSON でなければそのまま)
//! Inputs / Outputs / Billing (あるものだけ、JSON を整形)
//! Last updated
//! ```

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;

use crate::app::{Job, JobList};
use crate::domain::ExecutionStatus;
use crate::ports::{Clock, RenderError, Renderer, SystemClock};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Plain-text renderer. The clock drives "started ... ago" and "Last updated".
#[derive(Clone)]
pub struct TextRenderer {
    clock: Arc<dyn Clock>,
}

impl TextRenderer {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    fn status_body(&self, job: &Job, status: Option<ExecutionStatus>) -> String {
        if status == Some(ExecutionStatus::Quoted) {
            return quoted_message(job.estimated_cost());
        }
        match job.viz() {
            Some(viz) => viz.body(job).unwrap_or_else(|err| {
                format!("No visualization function provided, or there was an error. Error: {err}")
            }),
            None => "No visualization function provided.".to_string(),
        }
    }
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for TextRenderer {
    fn render_job(&self, job: &Job, will_auto_update: bool) -> Result<String, RenderError> {
        let now = self.clock.now();
        let status = job.status();
        let (raw_status, resource_id, started_at, progress) = job.with_snapshot(|dto| {
            (
                dto.and_then(|d| d.status_str()).map(str::to_string),
                dto.and_then(|d| d.resource_id()).map(str::to_string),
                dto.and_then(|d| d.started_at()),
                dto.and_then(|d| d.progress_report_raw()),
            )
        });

        let mut lines = vec![format!("== {} ==", job.title())];

        let status_text = raw_status.unwrap_or_else(|| "unknown".to_string());
        if will_auto_update && !status.is_some_and(ExecutionStatus::is_terminal) {
            lines.push(format!("Status: {status_text} (auto-updating)"));
        } else {
            lines.push(format!("Status: {status_text}"));
        }
        lines.push(format!("Execution: {}", job.id()));
        if let Some(resource_id) = resource_id {
            lines.push(format!("Resource: {resource_id}"));
        }
        if let Some(started_at) = started_at {
            lines.push(format!(
                "Started: {}",
                humanize_elapsed(now.naive_utc() - started_at)
            ));
        }
        if let Some(minutes) = job.running_time_minutes() {
            lines.push(format!("Running time: {minutes} minutes"));
        }

        lines.push(String::new());
        lines.push(self.status_body(job, status));

        if let Some(raw) = progress {
            lines.push(String::new());
            lines.push("Progress report:".to_string());
            lines.push(pretty_progress(&raw));
        }

        let (inputs, outputs, billing) = job.with_snapshot(|dto| {
            (
                dto.and_then(|d| d.user_inputs()).cloned(),
                dto.and_then(|d| d.user_outputs()).cloned(),
                dto.and_then(|d| d.billing()),
            )
        });
        let sections = [("Inputs", inputs), ("Outputs", outputs), ("Billing", billing)];
        for (heading, section) in sections {
            if let Some(value) = section {
                lines.push(String::new());
                lines.push(format!("{heading}:"));
                lines.push(pretty_json(&value));
            }
        }

        lines.push(String::new());
        lines.push(format!("Last updated: {}", now.format(TIMESTAMP_FORMAT)));
        Ok(lines.join("\n"))
    }

    fn render_list(&self, jobs: &JobList) -> Result<String, RenderError> {
        Ok(format!(
            "{}\nUse to_table() to view full details",
            jobs.summary()
        ))
    }

    fn render_error_banner(&self, message: &str) -> String {
        banner_at(self.clock.now(), message)
    }
}

fn banner_at(at: DateTime<Utc>, message: &str) -> String {
    format!(
        "Network/update issue at {}. Will retry automatically. Error: {message}",
        at.format(TIMESTAMP_FORMAT)
    )
}

fn quoted_message(estimated_cost: Option<f64>) -> String {
    let cost = estimated_cost
        .map(|cost| format!(" It is estimated to cost ${}.", cost.round() as i64))
        .unwrap_or_default();
    format!(
        "Job Quoted\nThis job has been quoted.{cost} For details look at the Billing tab. \
         To approve and start the run, call confirm()."
    )
}

/// Pretty-printed JSON, or the raw text when it does not parse.
fn pretty_progress(raw: &str) -> String {
    serde_json::from_str::<Value>(raw)
        .map(|value| pretty_json(&value))
        .unwrap_or_else(|_| raw.to_string())
}

fn pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn humanize_elapsed(elapsed: TimeDelta) -> String {
    let seconds = elapsed.num_seconds();
    if seconds < 0 {
        return "just now".to_string();
    }
    let (amount, unit) = match seconds {
        0..60 => return "just now".to_string(),
        60..3_600 => (seconds / 60, "minute"),
        3_600..86_400 => (seconds / 3_600, "hour"),
        _ => (seconds / 86_400, "day"),
    };
    let plural = if amount == 1 { "" } else { "s" };
    format!("{amount} {unit}{plural} ago")
}
