//! InMemoryExecutionGateway - テスト / デモ用の Execution Gateway
//!
//! # 学習ポイント
//! - Mutex による排他制御（ロックは await を跨がない）
//! - 呼び出し回数の記録と、失敗の注入
//! - AtomicUsize による同時実行数の計測
//!
//! サーバ側の振る舞いは単純化しています:
//! cancel は `Cancelled`、confirm は `Running` に遷移させるだけです。
//! `order` / `filter` は無視し、登録順でページングします。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{ExecutionDto, ExecutionId, ExecutionStatus};
use crate::ports::{ExecutionGateway, ExecutionPage, GatewayError, ListQuery};

/// Number of calls per gateway operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayCalls {
    pub get: usize,
    pub list: usize,
    pub cancel: usize,
    pub confirm: usize,
}

impl GatewayCalls {
    pub fn total(&self) -> usize {
        self.get + self.list + self.cancel + self.confirm
    }
}

#[derive(Default)]
struct State {
    /// 登録順を保持（list のページング順）
    executions: Vec<ExecutionDto>,
    calls: GatewayCalls,
    get_failures: VecDeque<GatewayError>,
    cancel_failures: HashMap<ExecutionId, GatewayError>,
    count_override: Option<u64>,
    latency: Option<Duration>,
}

impl State {
    fn find_mut(&mut self, id: &ExecutionId) -> Option<&mut ExecutionDto> {
        self.executions
            .iter_mut()
            .find(|dto| dto.execution_id().as_ref() == Some(id))
    }

    fn transition(
        &mut self,
        id: &ExecutionId,
        status: ExecutionStatus,
    ) -> Result<ExecutionDto, GatewayError> {
        let dto = self
            .find_mut(id)
            .ok_or_else(|| GatewayError::NotFound(format!("execution {id}")))?;
        dto.insert("status", Value::String(status.as_str().to_string()));
        Ok(dto.clone())
    }
}

/// InMemoryExecutionGateway は開発用の Gateway
///
/// # 使用例
/// ```ignore
/// let gateway = Arc::new(InMemoryExecutionGateway::with_executions(dtos));
/// gateway.fail_next_gets(1, GatewayError::Timeout);
/// let client = Client::new(gateway.clone());
/// ```
#[derive(Default)]
pub struct InMemoryExecutionGateway {
    state: Mutex<State>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InMemoryExecutionGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executions(executions: impl IntoIterator<Item = ExecutionDto>) -> Self {
        let gateway = Self::new();
        gateway.lock().executions = executions.into_iter().collect();
        gateway
    }

    /// Add an execution, or replace the one with the same id.
    pub fn insert(&self, dto: ExecutionDto) {
        let mut state = self.lock();
        match dto.execution_id() {
            Some(id) if state.find_mut(&id).is_some() => {
                if let Some(existing) = state.find_mut(&id) {
                    *existing = dto;
                }
            }
            _ => state.executions.push(dto),
        }
    }

    /// Server-side status change, as if the execution progressed on its own.
    pub fn set_status(&self, id: impl Into<ExecutionId>, status: ExecutionStatus) {
        let id = id.into();
        // 未登録の id は無視
        let _ = self.lock().transition(&id, status);
    }

    pub fn calls(&self) -> GatewayCalls {
        self.lock().calls
    }

    /// The next `n` `get` calls fail with `err`.
    pub fn fail_next_gets(&self, n: usize, err: GatewayError) {
        self.lock()
            .get_failures
            .extend(std::iter::repeat_n(err, n));
    }

    /// Every `cancel` of `id` fails with `err`.
    pub fn fail_cancel_for(&self, id: impl Into<ExecutionId>, err: GatewayError) {
        self.lock().cancel_failures.insert(id.into(), err);
    }

    /// Report `count` instead of the number of stored executions.
    pub fn override_count(&self, count: Option<u64>) {
        self.lock().count_override = count;
    }

    /// Delay every call by `latency` (tokio time, so paused clocks apply).
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = Some(latency);
    }

    /// Highest number of calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call and wait out the configured latency.
    async fn begin(&self, record: impl FnOnce(&mut GatewayCalls)) -> InFlight<'_> {
        let latency = {
            let mut state = self.lock();
            record(&mut state.calls);
            state.latency
        };
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight { gateway: self };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        guard
    }
}

/// Decrements the in-flight counter when the call ends or is dropped mid-way.
struct InFlight<'a> {
    gateway: &'a InMemoryExecutionGateway,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.gateway.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExecutionGateway for InMemoryExecutionGateway {
    async fn get(&self, id: &ExecutionId) -> Result<ExecutionDto, GatewayError> {
        let _call = self.begin(|calls| calls.get += 1).await;
        let mut state = self.lock();
        if let Some(err) = state.get_failures.pop_front() {
            return Err(err);
        }
        state
            .find_mut(id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("execution {id}")))
    }

    async fn list(&self, query: &ListQuery) -> Result<ExecutionPage, GatewayError> {
        let _call = self.begin(|calls| calls.list += 1).await;
        let state = self.lock();
        let page_size = query.page_size as usize;
        let start = (query.page as usize).saturating_mul(page_size);
        let data: Vec<ExecutionDto> = state
            .executions
            .iter()
            .skip(start)
            .take(page_size)
            .cloned()
            .collect();
        Ok(ExecutionPage {
            count: state
                .count_override
                .unwrap_or(state.executions.len() as u64),
            data,
        })
    }

    async fn cancel(&self, id: &ExecutionId) -> Result<ExecutionDto, GatewayError> {
        let _call = self.begin(|calls| calls.cancel += 1).await;
        let mut state = self.lock();
        if let Some(err) = state.cancel_failures.get(id) {
            return Err(err.clone());
        }
        state.transition(id, ExecutionStatus::Cancelled)
    }

    async fn confirm(&self, id: &ExecutionId) -> Result<ExecutionDto, GatewayError> {
        let _call = self.begin(|calls| calls.confirm += 1).await;
        self.lock().transition(id, ExecutionStatus::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, status: &str) -> ExecutionDto {
        ExecutionDto::from_value(json!({"executionId": id, "status": status})).unwrap()
    }

    #[tokio::test]
    async fn get_and_not_found() {
        let gateway = InMemoryExecutionGateway::with_executions(vec![record("a", "Running")]);
        let dto = gateway.get(&ExecutionId::from("a")).await.unwrap();
        assert_eq!(dto.status(), Some(ExecutionStatus::Running));

        let err = gateway.get(&ExecutionId::from("b")).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
        assert_eq!(gateway.calls().get, 2);
    }

    #[tokio::test]
    async fn cancel_and_confirm_transition() {
        let gateway = InMemoryExecutionGateway::with_executions(vec![
            record("a", "Running"),
            record("b", "Quoted"),
        ]);
        let cancelled = gateway.cancel(&ExecutionId::from("a")).await.unwrap();
        assert_eq!(cancelled.status(), Some(ExecutionStatus::Cancelled));
        let confirmed = gateway.confirm(&ExecutionId::from("b")).await.unwrap();
        assert_eq!(confirmed.status(), Some(ExecutionStatus::Running));
    }

    #[tokio::test]
    async fn list_pages_in_insertion_order() {
        let gateway = InMemoryExecutionGateway::with_executions(
            (0..5).map(|i| record(&format!("e{i}"), "Running")),
        );
        let page = gateway
            .list(&ListQuery::new().with_page(1).with_page_size(2))
            .await
            .unwrap();
        assert_eq!(page.count, 5);
        let ids: Vec<String> = page
            .data
            .iter()
            .filter_map(|d| d.execution_id().map(|id| id.to_string()))
            .collect();
        assert_eq!(ids, vec!["e2", "e3"]);
    }

    #[tokio::test]
    async fn scripted_get_failures_are_consumed_in_order() {
        let gateway = InMemoryExecutionGateway::with_executions(vec![record("a", "Running")]);
        gateway.fail_next_gets(1, GatewayError::Timeout);
        let id = ExecutionId::from("a");
        assert_eq!(gateway.get(&id).await.unwrap_err(), GatewayError::Timeout);
        assert!(gateway.get(&id).await.is_ok());
    }

    #[test]
    fn insert_replaces_existing() {
        let gateway = InMemoryExecutionGateway::with_executions(vec![record("a", "Running")]);
        gateway.insert(record("a", "Failed"));
        gateway.insert(record("b", "Queued"));
        let state = gateway.lock();
        assert_eq!(state.executions.len(), 2);
        assert_eq!(state.executions[0].status(), Some(ExecutionStatus::Failed));
    }
}
