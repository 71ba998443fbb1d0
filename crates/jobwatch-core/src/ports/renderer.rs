//! Renderer port - Job / JobList を表示用の成果物（文字列）に変換する
//!
//! core は成果物の中身を解釈しません。HTML でもプレーンテキストでも構いません。

use crate::app::{Job, JobList};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("visualization for '{tool_key}' failed: {message}")]
    Viz { tool_key: String, message: String },

    #[error("render failed: {0}")]
    Other(String),
}

/// Renderer は snapshot から display artifact を作る
pub trait Renderer: Send + Sync {
    /// `will_auto_update` is true while a poller keeps refreshing the view.
    fn render_job(&self, job: &Job, will_auto_update: bool) -> Result<String, RenderError>;

    fn render_list(&self, jobs: &JobList) -> Result<String, RenderError>;

    /// Banner shown over the last good render when a refresh fails.
    fn render_error_banner(&self, message: &str) -> String {
        format!("Network/update issue. Will retry automatically. Error: {message}")
    }
}
