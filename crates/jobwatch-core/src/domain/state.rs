//! State - Execution の状態
//!
//! リモートの status 文字列をそのまま写した閉じた語彙です。
//!
//! # 状態遷移
//! - Created -> Queued -> Running -> Succeeded / Failed
//! - Created -> Quoted -> (confirm) -> Running -> ...
//! - 非終端状態 -> (cancel) -> Cancelled
//!
//! 遷移の権威は Execution Gateway 側にあり、ここでは観測した値を保持するだけです。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status of a remote execution.
///
/// Serialized with the remote PascalCase names ("Succeeded", "Quoted", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Created,
    Queued,
    /// Priced but not yet authorized to run (billing gate).
    Quoted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub const ALL: [ExecutionStatus; 7] = [
        ExecutionStatus::Created,
        ExecutionStatus::Queued,
        ExecutionStatus::Quoted,
        ExecutionStatus::Running,
        ExecutionStatus::Succeeded,
        ExecutionStatus::Failed,
        ExecutionStatus::Cancelled,
    ];

    /// Is this a terminal state (no further automatic progress)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    /// Only quoted executions may be confirmed.
    pub fn is_confirmable(self) -> bool {
        self == ExecutionStatus::Quoted
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Created => "Created",
            ExecutionStatus::Queued => "Queued",
            ExecutionStatus::Quoted => "Quoted",
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Succeeded => "Succeeded",
            ExecutionStatus::Failed => "Failed",
            ExecutionStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown execution status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for ExecutionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExecutionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}
