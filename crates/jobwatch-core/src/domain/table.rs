//! Tabular projection of execution snapshots (one row per job).

use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use super::dto::ExecutionDto;

/// Column headers, in output order.
pub const COLUMNS: [&str; 9] = [
    "status",
    "executionId",
    "createdAt",
    "updatedAt",
    "completedAt",
    "startedAt",
    "approveAmount",
    "tool.key",
    "tool.version",
];

/// One row of the job table. Missing or unparseable values are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobRow {
    pub status: Option<String>,
    pub execution_id: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub started_at: Option<NaiveDateTime>,
    pub approve_amount: Option<f64>,
    pub tool_key: Option<String>,
    pub tool_version: Option<String>,
}

impl JobRow {
    /// A job that was never synced projects to an all-empty row.
    pub fn from_snapshot(snapshot: Option<&ExecutionDto>) -> Self {
        let Some(dto) = snapshot else {
            return Self::default();
        };
        Self {
            status: dto.status_str().map(str::to_string),
            execution_id: dto.execution_id().map(|id| id.to_string()),
            created_at: dto.created_at(),
            updated_at: dto.updated_at(),
            completed_at: dto.completed_at(),
            started_at: dto.started_at(),
            approve_amount: dto.approve_amount(),
            tool_key: dto.tool_key().map(str::to_string),
            tool_version: dto.tool_version().map(str::to_string),
        }
    }

    fn cells(&self) -> [String; 9] {
        fn text(v: &Option<String>) -> String {
            v.clone().unwrap_or_else(|| "-".to_string())
        }
        fn ts(v: &Option<NaiveDateTime>) -> String {
            v.map(|t| t.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
                .unwrap_or_else(|| "-".to_string())
        }
        [
            text(&self.status),
            text(&self.execution_id),
            ts(&self.created_at),
            ts(&self.updated_at),
            ts(&self.completed_at),
            ts(&self.started_at),
            self.approve_amount
                .map(|a| a.to_string())
                .unwrap_or_else(|| "-".to_string()),
            text(&self.tool_key),
            text(&self.tool_version),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobTable {
    pub rows: Vec<JobRow>,
}

impl JobTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl FromIterator<JobRow> for JobTable {
    fn from_iter<I: IntoIterator<Item = JobRow>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

/// Aligned plain-text table.
impl fmt::Display for JobTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<[String; 9]> = self.rows.iter().map(JobRow::cells).collect();
        let mut widths = COLUMNS.map(str::len);
        for row in &cells {
            for (width, cell) in widths.iter_mut().zip(row.iter()) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let header: Vec<String> = COLUMNS
            .iter()
            .zip(widths.iter())
            .map(|(name, &width)| format!("{name:<width$}"))
            .collect();
        writeln!(f, "{}", header.join("  ").trim_end())?;

        for row in &cells {
            let line: Vec<String> = row
                .iter()
                .zip(widths.iter())
                .map(|(cell, &width)| format!("{cell:<width$}"))
                .collect();
            writeln!(f, "{}", line.join("  ").trim_end())?;
        }
        Ok(())
    }
}
