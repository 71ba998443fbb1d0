//! Errors - エラー型と分類
//!
//! # 分類
//! - NotFound: Gateway が execution を知らない
//! - InvalidStateTransition: Quoted 以外の job に confirm した
//! - Transient: sync 中の通信 / HTTP エラー（Poller 内では握りつぶして再試行）
//! - Aggregate: JobList の一括操作で 1 件以上失敗した

use std::fmt;

use super::ids::ExecutionId;
use super::state::ExecutionStatus;
use crate::ports::GatewayError;

/// ErrorKind は実行エラーの運用上の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retrying later may succeed.
    Transient,
    /// Retrying will not help without a change from the caller.
    Permanent,
}

/// Errors surfaced by `Job` / `JobList` operations.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("execution {0} not found")]
    NotFound(ExecutionId),

    #[error(
        "execution {execution_id} is in the '{}' state; only Quoted executions can be confirmed",
        .current.map_or("unknown", ExecutionStatus::as_str)
    )]
    InvalidStateTransition {
        execution_id: ExecutionId,
        current: Option<ExecutionStatus>,
    },

    #[error("request for execution {execution_id} failed: {source}")]
    Transient {
        execution_id: ExecutionId,
        #[source]
        source: GatewayError,
    },

    #[error("listing executions failed: {0}")]
    Listing(#[source] GatewayError),

    #[error("execution DTO has no 'executionId' field")]
    MissingExecutionId,

    #[error(transparent)]
    Aggregate(#[from] AggregateFailure),
}

impl JobError {
    /// Attach the execution id to a gateway failure.
    pub fn from_gateway(execution_id: &ExecutionId, err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(_) => JobError::NotFound(execution_id.clone()),
            source => JobError::Transient {
                execution_id: execution_id.clone(),
                source,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::Transient { source, .. } | JobError::Listing(source)
                if source.is_retryable() =>
            {
                ErrorKind::Transient
            }
            JobError::Aggregate(failure)
                if failure
                    .failures
                    .iter()
                    .all(|(_, err)| err.kind() == ErrorKind::Transient) =>
            {
                ErrorKind::Transient
            }
            _ => ErrorKind::Permanent,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, JobError::NotFound(_))
    }
}

/// Every failure of a bulk operation, reported once all members were attempted.
#[derive(Debug)]
pub struct AggregateFailure {
    pub operation: &'static str,
    pub attempted: usize,
    pub failures: Vec<(ExecutionId, JobError)>,
}

impl AggregateFailure {
    pub fn failed_ids(&self) -> impl Iterator<Item = &ExecutionId> {
        self.failures.iter().map(|(id, _)| id)
    }
}

impl fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed for {} of {} executions",
            self.operation,
            self.failures.len(),
            self.attempted
        )?;
        for (id, err) in &self.failures {
            write!(f, "\n  {id}: {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateFailure {}
