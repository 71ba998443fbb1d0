//! Job - 1 つの execution をローカルに追跡するハンドル
//!
//! # 学習ポイント
//! - `Arc` で共有する安価な clone ハンドル（JobList の filter 結果と同一性を共有）
//! - snapshot は成功した `get` でのみ置き換える（失敗時は直前の値を保持）
//! - status は snapshot から導出し、別途キャッシュとして保持
//!
//! # 状態
//! ```text
//! unsynced --sync()--> synced --(terminal status)--> terminal
//! ```
//! terminal になると poller は停止しますが、明示的な sync() は引き続き可能です。

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::{ExecutionDto, ExecutionId, ExecutionStatus, JobError};
use crate::ports::{DisplaySink, ExecutionGateway, Renderer};
use crate::render::JobViz;

use super::builder::Client;
use super::poller::WatchControl;

/// Cheap-to-clone handle. Clones share the same snapshot and watch slot.
#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

struct JobInner {
    id: ExecutionId,
    client: Client,
    state: RwLock<Snapshot>,
    viz: OnceLock<Arc<dyn JobViz>>,
    watch: Mutex<Option<WatchControl>>,
}

#[derive(Default)]
struct Snapshot {
    dto: Option<ExecutionDto>,
    status: Option<ExecutionStatus>,
}

impl Job {
    /// Tracks `id` and performs exactly one eager `get`.
    pub async fn from_id(client: &Client, id: impl Into<ExecutionId>) -> Result<Self, JobError> {
        let job = Self::unsynced(client, id);
        job.sync().await?;
        Ok(job)
    }

    /// Tracks `id` without contacting the gateway. Status stays unknown until `sync`.
    pub fn unsynced(client: &Client, id: impl Into<ExecutionId>) -> Self {
        Self {
            inner: Arc::new(JobInner {
                id: id.into(),
                client: client.clone(),
                state: RwLock::new(Snapshot::default()),
                viz: OnceLock::new(),
                watch: Mutex::new(None),
            }),
        }
    }

    /// Builds a job from an already-fetched record. No network call.
    pub fn from_dto(client: &Client, dto: ExecutionDto) -> Result<Self, JobError> {
        let id = dto.execution_id().ok_or(JobError::MissingExecutionId)?;
        let job = Self::unsynced(client, id);
        job.apply(dto);
        Ok(job)
    }

    pub fn id(&self) -> &ExecutionId {
        &self.inner.id
    }

    pub fn client(&self) -> &Client {
        &self.inner.client
    }

    /// `None` until the first successful sync, or when the record's status is unrecognized.
    pub fn status(&self) -> Option<ExecutionStatus> {
        self.read_state().status
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_some_and(ExecutionStatus::is_terminal)
    }

    /// Copy of the last successfully fetched record.
    pub fn snapshot(&self) -> Option<ExecutionDto> {
        self.read_state().dto.clone()
    }

    /// Borrow the snapshot without cloning it.
    pub fn with_snapshot<R>(&self, f: impl FnOnce(Option<&ExecutionDto>) -> R) -> R {
        f(self.read_state().dto.as_ref())
    }

    /// Top-level field of the snapshot.
    pub fn attribute(&self, key: &str) -> Option<Value> {
        self.with_snapshot(|dto| dto.and_then(|d| d.get(key)).cloned())
    }

    pub fn tool_key(&self) -> Option<String> {
        self.with_snapshot(|dto| dto.and_then(ExecutionDto::tool_key).map(str::to_string))
    }

    pub fn tool_version(&self) -> Option<String> {
        self.with_snapshot(|dto| dto.and_then(ExecutionDto::tool_version).map(str::to_string))
    }

    /// Whole minutes between `startedAt` and `completedAt`, rounded.
    pub fn running_time_minutes(&self) -> Option<i64> {
        self.with_snapshot(|dto| {
            let dto = dto?;
            let elapsed = dto.completed_at()? - dto.started_at()?;
            Some((elapsed.num_seconds() as f64 / 60.0).round() as i64)
        })
    }

    /// Price quoted for this execution, if any.
    pub fn estimated_cost(&self) -> Option<f64> {
        self.with_snapshot(|dto| dto.and_then(ExecutionDto::estimated_cost))
    }

    /// Visualization for the job's tool, resolved once the tool key is known.
    pub fn viz(&self) -> Option<Arc<dyn JobViz>> {
        self.inner.viz.get().cloned()
    }

    pub fn title(&self) -> String {
        self.viz()
            .map(|viz| viz.title(self))
            .unwrap_or_else(|| "Job".to_string())
    }

    /// Two handles refer to the same tracked execution.
    pub fn ptr_eq(&self, other: &Job) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Refresh the snapshot. On failure the previous snapshot is kept.
    pub async fn sync(&self) -> Result<(), JobError> {
        debug!(execution_id = %self.id(), "syncing execution");
        let dto = self
            .gateway()
            .get(self.id())
            .await
            .map_err(|err| JobError::from_gateway(self.id(), err))?;
        self.apply(dto);
        Ok(())
    }

    /// Request cancellation, then re-sync. Terminal jobs are left to the server to reject.
    pub async fn cancel(&self) -> Result<(), JobError> {
        self.gateway()
            .cancel(self.id())
            .await
            .map_err(|err| JobError::from_gateway(self.id(), err))?;
        info!(execution_id = %self.id(), "cancellation requested");
        self.sync().await
    }

    /// Approve a quoted execution, then re-sync. Only valid while `Quoted`.
    pub async fn confirm(&self) -> Result<(), JobError> {
        let current = self.status();
        if current.is_none_or(|status| !status.is_confirmable()) {
            return Err(JobError::InvalidStateTransition {
                execution_id: self.id().clone(),
                current,
            });
        }
        self.gateway()
            .confirm(self.id())
            .await
            .map_err(|err| JobError::from_gateway(self.id(), err))?;
        info!(execution_id = %self.id(), "execution confirmed");
        self.sync().await
    }

    /// Render the current snapshot. A renderer failure degrades to a one-line notice.
    pub fn render(&self, renderer: &dyn Renderer, will_auto_update: bool) -> String {
        match renderer.render_job(self, will_auto_update) {
            Ok(artifact) => artifact,
            Err(err) => {
                warn!(execution_id = %self.id(), error = %err, "render failed");
                format!("Unable to render execution {}: {err}", self.id())
            }
        }
    }

    /// Render once and hand the artifact to the display.
    pub fn show(&self, renderer: &dyn Renderer, display: &dyn DisplaySink) {
        display.show(&self.render(renderer, false));
    }

    pub(super) fn watch_slot(&self) -> &Mutex<Option<WatchControl>> {
        &self.inner.watch
    }

    fn gateway(&self) -> &Arc<dyn ExecutionGateway> {
        self.inner.client.gateway()
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, Snapshot> {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, dto: ExecutionDto) {
        let status = dto.status();
        if status.is_none()
            && let Some(raw) = dto.status_str()
        {
            warn!(execution_id = %self.id(), status = raw, "unrecognized execution status");
        }
        if self.inner.viz.get().is_none()
            && let Some(viz) = dto
                .tool_key()
                .and_then(|key| self.inner.client.viz_registry().resolve(key))
        {
            // 同時に set された場合は先勝ち
            let _ = self.inner.viz.set(viz);
        }

        let mut state = self
            .inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        state.dto = Some(dto);
        state.status = status;
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", self.id())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
