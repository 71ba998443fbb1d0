//! JobList - Job の順序付きコレクション
//!
//! # 学習ポイント
//! - filter は「新しい JobList、同じ Job ハンドル」を返す（コピーしない）
//! - 一括操作は Semaphore + JoinSet で並列度を制限
//! - 一部失敗しても他の操作は続行し、最後に AggregateFailure で報告
//!
//! # フィルタの適用順序
//! ```text
//! status → tool_key → tool_version → attribute 一致 → predicate
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::domain::{
    AggregateFailure, ExecutionDto, ExecutionId, ExecutionStatus, JobError, JobRow, JobTable,
};
use crate::ports::ListQuery;

use super::builder::Client;
use super::job::Job;

/// Worker pool size for `confirm_all` / `cancel_all`.
pub const DEFAULT_BULK_WORKERS: usize = 4;

type JobPredicate = Arc<dyn Fn(&Job) -> bool + Send + Sync>;

/// Criteria for `JobList::filter`. Unset criteria match everything.
#[derive(Clone, Default)]
pub struct JobFilter {
    status: Option<ExecutionStatus>,
    tool_key: Option<String>,
    tool_version: Option<String>,
    attributes: Vec<(String, Value)>,
    predicate: Option<JobPredicate>,
}

impl JobFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: ExecutionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn tool_key(mut self, key: impl Into<String>) -> Self {
        self.tool_key = Some(key.into());
        self
    }

    pub fn tool_version(mut self, version: impl Into<String>) -> Self {
        self.tool_version = Some(version.into());
        self
    }

    /// Exact match on a top-level snapshot field.
    pub fn attribute(mut self, key: impl Into<String>, expected: impl Into<Value>) -> Self {
        self.attributes.push((key.into(), expected.into()));
        self
    }

    /// Arbitrary predicate, applied after every other criterion.
    pub fn predicate(mut self, f: impl Fn(&Job) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for JobFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobFilter")
            .field("status", &self.status)
            .field("tool_key", &self.tool_key)
            .field("tool_version", &self.tool_version)
            .field("attributes", &self.attributes)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
enum BulkOp {
    Confirm,
    Cancel,
}

impl BulkOp {
    fn name(self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::Cancel => "cancel",
        }
    }
}

/// Ordered collection of job handles.
#[derive(Debug, Clone, Default)]
pub struct JobList {
    jobs: Vec<Job>,
}

impl JobList {
    pub fn new(jobs: Vec<Job>) -> Self {
        Self { jobs }
    }

    /// One `get` per id, in order. Stops at the first failure.
    pub async fn from_ids<I>(client: &Client, ids: I) -> Result<Self, JobError>
    where
        I: IntoIterator,
        I::Item: Into<ExecutionId>,
    {
        let mut jobs = Vec::new();
        for id in ids {
            jobs.push(Job::from_id(client, id).await?);
        }
        Ok(Self::new(jobs))
    }

    /// No network calls.
    pub fn from_dtos(
        client: &Client,
        dtos: impl IntoIterator<Item = ExecutionDto>,
    ) -> Result<Self, JobError> {
        dtos.into_iter()
            .map(|dto| Job::from_dto(client, dto))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    /// Fetch every matching record, page by page, starting at `query.page`.
    ///
    /// Stops on a short or empty page, or once `count` records are accumulated. Records
    /// created or removed server-side while paging may be skipped or repeated.
    pub async fn list(client: &Client, query: &ListQuery) -> Result<Self, JobError> {
        let mut query = query.clone();
        let mut dtos: Vec<ExecutionDto> = Vec::new();
        loop {
            let page = client
                .gateway()
                .list(&query)
                .await
                .map_err(JobError::Listing)?;
            let fetched = page.data.len();
            debug!(page = query.page, fetched, count = page.count, "listed executions");
            dtos.extend(page.data);

            if fetched == 0
                || fetched < query.page_size as usize
                || dtos.len() as u64 >= page.count
            {
                break;
            }
            query.page += 1;
        }
        Self::from_dtos(client, dtos)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Job> {
        self.jobs.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Job> {
        self.jobs.iter()
    }

    pub fn as_slice(&self) -> &[Job] {
        &self.jobs
    }

    /// New list sharing the matching handles, order preserved.
    pub fn filter(&self, filter: &JobFilter) -> JobList {
        let mut jobs = self.jobs.clone();
        if let Some(status) = filter.status {
            jobs.retain(|job| job.status() == Some(status));
        }
        if let Some(key) = &filter.tool_key {
            jobs.retain(|job| {
                job.with_snapshot(|dto| dto.and_then(ExecutionDto::tool_key) == Some(key.as_str()))
            });
        }
        if let Some(version) = &filter.tool_version {
            jobs.retain(|job| {
                job.with_snapshot(|dto| {
                    dto.and_then(ExecutionDto::tool_version) == Some(version.as_str())
                })
            });
        }
        for (key, expected) in &filter.attributes {
            jobs.retain(|job| job.with_snapshot(|dto| dto.and_then(|d| d.get(key)) == Some(expected)));
        }
        if let Some(predicate) = &filter.predicate {
            jobs.retain(|job| predicate(job));
        }
        JobList::new(jobs)
    }

    /// Count of jobs per status string, sorted by name.
    ///
    /// Statuses outside the known vocabulary are counted under their raw name;
    /// jobs without a status are not counted.
    pub fn status_breakdown(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for job in &self.jobs {
            let status =
                job.with_snapshot(|dto| dto.and_then(|d| d.status_str()).map(str::to_string));
            if let Some(status) = status {
                *counts.entry(status).or_insert(0) += 1;
            }
        }
        counts
    }

    /// "N job(s)" followed by the per-status counts, sorted by status name.
    pub fn summary(&self) -> String {
        let breakdown = self.status_breakdown();
        let statuses = if breakdown.is_empty() {
            "No status information".to_string()
        } else {
            let parts: Vec<String> = breakdown
                .iter()
                .map(|(name, count)| format!("{name}: {count}"))
                .collect();
            format!("Statuses: {}", parts.join(", "))
        };
        format!("{} job(s)\n{statuses}", self.len())
    }

    pub fn to_table(&self) -> JobTable {
        self.jobs
            .iter()
            .map(|job| job.with_snapshot(JobRow::from_snapshot))
            .collect()
    }

    /// Confirm every job with at most `max_workers` in flight.
    pub async fn confirm_all(&self, max_workers: usize) -> Result<(), JobError> {
        self.run_bulk(BulkOp::Confirm, max_workers).await
    }

    /// Cancel every job with at most `max_workers` in flight.
    pub async fn cancel_all(&self, max_workers: usize) -> Result<(), JobError> {
        self.run_bulk(BulkOp::Cancel, max_workers).await
    }

    async fn run_bulk(&self, op: BulkOp, max_workers: usize) -> Result<(), JobError> {
        let permits = Arc::new(Semaphore::new(max_workers.max(1)));
        let mut tasks = JoinSet::new();
        for (index, job) in self.jobs.iter().cloned().enumerate() {
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                // semaphore は close しないので acquire は失敗しない
                let _permit = permits.acquire_owned().await.ok();
                let result = match op {
                    BulkOp::Confirm => job.confirm().await,
                    BulkOp::Cancel => job.cancel().await,
                };
                (index, job.id().clone(), result)
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, _, Ok(()))) => {}
                Ok((index, id, Err(err))) => {
                    warn!(operation = op.name(), execution_id = %id, error = %err, "bulk operation failed");
                    failures.push((index, id, err));
                }
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(err) => warn!(operation = op.name(), error = %err, "bulk task cancelled"),
            }
        }

        info!(
            operation = op.name(),
            attempted = self.jobs.len(),
            failed = failures.len(),
            "bulk operation finished"
        );
        if failures.is_empty() {
            return Ok(());
        }
        failures.sort_by_key(|(index, _, _)| *index);
        Err(AggregateFailure {
            operation: op.name(),
            attempted: self.jobs.len(),
            failures: failures.into_iter().map(|(_, id, err)| (id, err)).collect(),
        }
        .into())
    }
}

impl Index<usize> for JobList {
    type Output = Job;

    fn index(&self, index: usize) -> &Job {
        &self.jobs[index]
    }
}

impl FromIterator<Job> for JobList {
    fn from_iter<I: IntoIterator<Item = Job>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for JobList {
    type Item = Job;
    type IntoIter = std::vec::IntoIter<Job>;

    fn into_iter(self) -> Self::IntoIter {
        self.jobs.into_iter()
    }
}

impl<'a> IntoIterator for &'a JobList {
    type Item = &'a Job;
    type IntoIter = std::slice::Iter<'a, Job>;

    fn into_iter(self) -> Self::IntoIter {
        self.jobs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rstest::rstest;
    use serde_json::json;

    use crate::domain::ErrorKind;
    use crate::impls::InMemoryExecutionGateway;
    use crate::ports::GatewayError;
    use crate::render::{ABFE_TOOL_KEY, DOCKING_TOOL_KEY};

    fn record(id: &str, status: &str, tool: &str, version: &str) -> ExecutionDto {
        ExecutionDto::from_value(json!({
            "executionId": id,
            "status": status,
            "tool": {"key": tool, "version": version},
            "approveAmount": 100,
        }))
        .unwrap()
    }

    fn sample() -> Vec<ExecutionDto> {
        vec![
            record("exec-1", "Succeeded", DOCKING_TOOL_KEY, "1.0.0"),
            record("exec-2", "Running", ABFE_TOOL_KEY, "0.2.0"),
            record("exec-3", "Succeeded", ABFE_TOOL_KEY, "0.2.1"),
            record("exec-4", "Quoted", DOCKING_TOOL_KEY, "1.0.0"),
        ]
    }

    fn setup(records: Vec<ExecutionDto>) -> (Arc<InMemoryExecutionGateway>, Client) {
        let gateway = Arc::new(InMemoryExecutionGateway::with_executions(records));
        let client = Client::new(gateway.clone());
        (gateway, client)
    }

    fn ids(list: &JobList) -> Vec<String> {
        list.iter().map(|job| job.id().to_string()).collect()
    }

    #[test]
    fn filter_by_status_preserves_order_and_identity() {
        let (_gateway, client) = setup(vec![]);
        let list = JobList::from_dtos(&client, sample()).unwrap();

        let succeeded = list.filter(&JobFilter::new().status(ExecutionStatus::Succeeded));

        assert_eq!(ids(&succeeded), vec!["exec-1", "exec-3"]);
        assert!(succeeded[0].ptr_eq(&list[0]));
        assert!(succeeded[1].ptr_eq(&list[2]));
    }

    #[test]
    fn filter_combines_criteria() {
        let (_gateway, client) = setup(vec![]);
        let list = JobList::from_dtos(&client, sample()).unwrap();

        let filtered = list.filter(
            &JobFilter::new()
                .tool_key(DOCKING_TOOL_KEY)
                .tool_version("1.0.0")
                .attribute("approveAmount", 100)
                .predicate(|job| job.status() == Some(ExecutionStatus::Quoted)),
        );

        assert_eq!(ids(&filtered), vec!["exec-4"]);
    }

    #[test]
    fn empty_filter_keeps_every_job_in_order() {
        let (_gateway, client) = setup(vec![]);
        let list = JobList::from_dtos(&client, sample()).unwrap();

        let filtered = list.filter(&JobFilter::new());

        assert_eq!(filtered.len(), list.len());
        assert_eq!(ids(&filtered), ids(&list));
        for (kept, original) in filtered.iter().zip(list.iter()) {
            assert!(kept.ptr_eq(original));
        }
    }

    #[test]
    fn attribute_filter_on_missing_key_matches_nothing() {
        let (_gateway, client) = setup(vec![]);
        let list = JobList::from_dtos(&client, sample()).unwrap();
        let filtered = list.filter(&JobFilter::new().attribute("nonexistent", "x"));
        assert!(filtered.is_empty());
    }

    #[test]
    fn status_breakdown_and_summary() {
        let (_gateway, client) = setup(vec![]);
        let list = JobList::from_dtos(&client, sample()).unwrap();

        let breakdown = list.status_breakdown();
        assert_eq!(breakdown["Succeeded"], 2);
        assert_eq!(breakdown["Running"], 1);
        assert_eq!(breakdown["Quoted"], 1);

        assert_eq!(
            list.summary(),
            "4 job(s)\nStatuses: Quoted: 1, Running: 1, Succeeded: 2"
        );
        assert_eq!(
            JobList::default().summary(),
            "0 job(s)\nNo status information"
        );
    }

    #[test]
    fn breakdown_counts_repeated_statuses() {
        let (_gateway, client) = setup(vec![]);
        let statuses = ["Succeeded", "Running", "Succeeded", "Failed", "Running"];
        let list = JobList::from_dtos(
            &client,
            statuses
                .iter()
                .enumerate()
                .map(|(i, status)| record(&format!("exec-{i}"), status, DOCKING_TOOL_KEY, "1.0.0")),
        )
        .unwrap();

        let breakdown = list.status_breakdown();

        assert_eq!(breakdown.len(), 3);
        assert_eq!(breakdown["Succeeded"], 2);
        assert_eq!(breakdown["Running"], 2);
        assert_eq!(breakdown["Failed"], 1);
        assert_eq!(breakdown.values().sum::<usize>(), list.len());
    }

    #[test]
    fn unknown_status_is_counted_under_its_raw_name() {
        let (_gateway, client) = setup(vec![]);
        let list = JobList::from_dtos(
            &client,
            vec![
                record("exec-1", "Running", DOCKING_TOOL_KEY, "1.0.0"),
                record("exec-2", "Paused", DOCKING_TOOL_KEY, "1.0.0"),
            ],
        )
        .unwrap();

        assert_eq!(list.status_breakdown()["Paused"], 1);
        assert_eq!(list.summary(), "2 job(s)\nStatuses: Paused: 1, Running: 1");
    }

    #[test]
    fn to_table_leaves_missing_timestamps_empty() {
        let (_gateway, client) = setup(vec![]);
        let list = JobList::from_dtos(
            &client,
            vec![record("exec-1", "Queued", DOCKING_TOOL_KEY, "1.0.0")],
        )
        .unwrap();

        let table = list.to_table();

        assert_eq!(table.rows[0].execution_id.as_deref(), Some("exec-1"));
        assert_eq!(table.rows[0].started_at, None);
        assert_eq!(table.rows[0].completed_at, None);
    }

    #[test]
    fn to_table_has_one_row_per_job() {
        let (_gateway, client) = setup(vec![]);
        let list = JobList::from_dtos(&client, sample()).unwrap();
        let table = list.to_table();
        assert_eq!(table.len(), 4);
        assert_eq!(table.rows[1].execution_id.as_deref(), Some("exec-2"));
        assert_eq!(table.rows[1].tool_key.as_deref(), Some(ABFE_TOOL_KEY));
    }

    #[rstest]
    #[case(10, 3, 4)]
    #[case(9, 3, 3)]
    #[case(0, 3, 1)]
    #[tokio::test]
    async fn list_stops_after_last_page(
        #[case] total: usize,
        #[case] page_size: u32,
        #[case] expected_calls: usize,
    ) {
        let records: Vec<ExecutionDto> = (0..total)
            .map(|i| record(&format!("exec-{i}"), "Running", DOCKING_TOOL_KEY, "1.0.0"))
            .collect();
        let (gateway, client) = setup(records);

        let list = JobList::list(&client, &ListQuery::new().with_page_size(page_size))
            .await
            .unwrap();

        assert_eq!(list.len(), total);
        assert_eq!(gateway.calls().list, expected_calls);
        assert_eq!(gateway.calls().get, 0);
    }

    #[tokio::test]
    async fn list_stops_when_count_is_reached() {
        let records: Vec<ExecutionDto> = (0..6)
            .map(|i| record(&format!("exec-{i}"), "Running", DOCKING_TOOL_KEY, "1.0.0"))
            .collect();
        let (gateway, client) = setup(records);
        gateway.override_count(Some(3));

        let list = JobList::list(&client, &ListQuery::new().with_page_size(3))
            .await
            .unwrap();

        assert_eq!(list.len(), 3);
        assert_eq!(gateway.calls().list, 1);
    }

    #[tokio::test]
    async fn from_ids_fetches_each_execution() {
        let (gateway, client) = setup(sample());
        let list = JobList::from_ids(&client, ["exec-2", "exec-1"]).await.unwrap();
        assert_eq!(ids(&list), vec!["exec-2", "exec-1"]);
        assert_eq!(gateway.calls().get, 2);
    }

    #[tokio::test]
    async fn cancel_all_reports_every_failure() {
        let (gateway, client) = setup(sample());
        let list = JobList::from_dtos(&client, sample()).unwrap();
        gateway.fail_cancel_for("exec-2", GatewayError::Transport("boom".into()));
        gateway.fail_cancel_for("exec-4", GatewayError::Transport("boom".into()));

        let err = list.cancel_all(DEFAULT_BULK_WORKERS).await.unwrap_err();

        let JobError::Aggregate(failure) = &err else {
            panic!("expected aggregate failure, got {err:?}");
        };
        let failed: Vec<&str> = failure.failed_ids().map(ExecutionId::as_str).collect();
        assert_eq!(failed, vec!["exec-2", "exec-4"]);
        assert_eq!(failure.attempted, 4);
        assert_eq!(err.kind(), ErrorKind::Transient);
        // 他のジョブは処理されている
        assert_eq!(gateway.calls().cancel, 4);
        assert_eq!(list[0].status(), Some(ExecutionStatus::Cancelled));
    }

    #[tokio::test]
    async fn confirm_all_rejects_jobs_that_are_not_quoted() {
        let (gateway, client) = setup(sample());
        let list = JobList::from_dtos(&client, sample()).unwrap();

        let err = list.confirm_all(DEFAULT_BULK_WORKERS).await.unwrap_err();

        let JobError::Aggregate(failure) = &err else {
            panic!("expected aggregate failure, got {err:?}");
        };
        assert_eq!(failure.failures.len(), 3);
        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert_eq!(gateway.calls().confirm, 1);
        assert_eq!(list[3].status(), Some(ExecutionStatus::Running));
    }

    #[tokio::test(start_paused = true)]
    async fn bulk_concurrency_is_bounded() {
        let records: Vec<ExecutionDto> = (0..10)
            .map(|i| record(&format!("exec-{i}"), "Running", DOCKING_TOOL_KEY, "1.0.0"))
            .collect();
        let (gateway, client) = setup(records.clone());
        gateway.set_latency(Duration::from_millis(50));
        let list = JobList::from_dtos(&client, records).unwrap();

        list.cancel_all(4).await.unwrap();

        assert_eq!(gateway.max_in_flight(), 4);
        assert_eq!(gateway.calls().cancel, 10);
    }

    #[tokio::test]
    async fn bulk_on_empty_list_is_ok() {
        assert!(JobList::default().cancel_all(DEFAULT_BULK_WORKERS).await.is_ok());
    }
}
