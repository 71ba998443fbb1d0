//! Poller - Job のバックグラウンド更新ループ
//!
//! # 学習ポイント
//! - `watch::channel` による停止シグナル（ワーカーグループと同じ形）
//! - sync 中も sleep 中も `select!` で停止できる
//! - 終了時は必ず最終 sync（interval で上限）→ 最終描画 → release
//!
//! # ループ
//! ```text
//! open("Initializing...")
//!   loop:
//!     sync ─ Ok ─→ render(auto=true) → update → terminal なら break
//!          └ Err ─→ error banner + 直前の描画 → update
//!     sleep(interval)
//! final sync → render(auto=false) → update → release
//! ```
//!
//! `WatchHandle::abort` だけは後片付けを飛ばします（display は release されません）。
//!
//! # 再 watch
//! 同じ Job に 2 つ目の watch を掛けると、前のタスクは abort されます。
//! 新しいタスクは前のタスクが完全に drop されるのを待ってから最初の sync を行い、
//! 前のタスクが release できなかった display handle を代わりに release します。
//! 1 つの Job に対して gateway を叩く poller は常に高々 1 つです。

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::domain::DisplayId;
use crate::ports::{DisplaySink, Renderer};

use super::job::Job;

pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(5);

/// Shorter intervals are raised to this; zero would spin the loop.
pub const MIN_WATCH_INTERVAL: Duration = Duration::from_millis(100);

/// Placeholder published before the first sync completes.
pub const INITIALIZING_PLACEHOLDER: &str = "Initializing...";

/// Shown under the error banner when no render has succeeded yet.
pub const NO_DATA_YET: &str = "No data yet.";

/// Shown instead of starting a poller for an already-terminal job.
pub const NO_ACTIVE_JOB: &str = "No active job to monitor. This display will not update.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    interval: Duration,
}

impl WatchOptions {
    /// Clamped to at least [`MIN_WATCH_INTERVAL`].
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_WATCH_INTERVAL);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_WATCH_INTERVAL,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("watching a job requires a running tokio runtime")]
    NoRuntime,
}

/// Job 側の watch slot に置く制御用ハンドル
pub(super) struct WatchControl {
    shutdown_tx: Arc<watch::Sender<bool>>,
    abort: AbortHandle,
    exit_rx: watch::Receiver<Option<LoopExit>>,
    display: Arc<dyn DisplaySink>,
    display_id: DisplayId,
}

/// How a poll loop ended. Sent when the loop future is dropped, abort included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    Released,
    Abandoned,
}

/// Reports the loop's exit on drop.
struct ExitSignal {
    tx: watch::Sender<Option<LoopExit>>,
    exit: LoopExit,
}

impl Drop for ExitSignal {
    fn drop(&mut self) {
        self.tx.send_replace(Some(self.exit));
    }
}

impl WatchControl {
    fn request_stop(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    fn is_active(&self) -> bool {
        !self.abort.is_finished()
    }

    /// Wait until the aborted loop is gone, then release what it left open.
    async fn take_over(mut self) {
        // a dropped sender also means the loop is gone
        let exit = match self.exit_rx.wait_for(Option::is_some).await {
            Ok(exit) => *exit,
            Err(_) => None,
        };
        if exit != Some(LoopExit::Released) {
            self.display.release(self.display_id);
            debug!(display_id = %self.display_id, "released display of replaced watcher");
        }
    }
}

/// Caller-side handle of a running poller.
///
/// Dropping it detaches the task; the loop keeps running until the job is
/// terminal or `Job::stop_watching` is called.
pub struct WatchHandle {
    shutdown_tx: Arc<watch::Sender<bool>>,
    join: Option<JoinHandle<()>>,
    display_id: DisplayId,
}

impl WatchHandle {
    pub fn display_id(&self) -> DisplayId {
        self.display_id
    }

    /// Signal the loop to stop. Does not wait.
    pub fn request_stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the loop to end on its own (terminal status or a stop request).
    /// Cancel-safe.
    pub async fn wait(&mut self) {
        if let Some(join) = self.join.as_mut() {
            match join.await {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => {
                    debug!(display_id = %self.display_id, "poller task was cancelled");
                }
                Err(err) => {
                    warn!(display_id = %self.display_id, error = %err, "poller task ended abnormally");
                }
            }
            self.join = None;
        }
    }

    /// Signal the loop and wait for its final sync, render and release.
    pub async fn stop_and_join(mut self) {
        self.request_stop();
        self.wait().await;
    }

    /// Hard cancellation. The final render and `release` are skipped.
    pub fn abort(self) {
        if let Some(join) = &self.join {
            join.abort();
        }
    }
}

impl Job {
    /// Start a background poller that keeps `display` up to date.
    ///
    /// Returns `Ok(None)` without spawning anything when the job is already
    /// terminal; a single notice plus one render is shown instead. A previous
    /// poller on this job is aborted, and the new one starts syncing only after
    /// the old task is gone.
    pub fn watch(
        &self,
        renderer: Arc<dyn Renderer>,
        display: Arc<dyn DisplaySink>,
        options: WatchOptions,
    ) -> Result<Option<WatchHandle>, WatchError> {
        if self.is_terminal() {
            let artifact = self.render(renderer.as_ref(), false);
            display.show(&format!("{NO_ACTIVE_JOB}\n\n{artifact}"));
            return Ok(None);
        }
        let runtime = Handle::try_current().map_err(|_| WatchError::NoRuntime)?;

        let mut slot = self
            .watch_slot()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let previous = slot.take();
        if let Some(previous) = &previous {
            previous.abort.abort();
            debug!(
                execution_id = %self.id(),
                display_id = %previous.display_id,
                "aborting previous watcher"
            );
        }

        let display_id = display.open(INITIALIZING_PLACEHOLDER);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown_tx = Arc::new(shutdown_tx);
        let (exit_tx, exit_rx) = watch::channel(None);
        let poller = Poller {
            job: self.clone(),
            renderer,
            display: Arc::clone(&display),
            display_id,
            interval: options.interval,
        };
        let join = runtime.spawn(poller.run(previous, shutdown_rx, exit_tx));
        *slot = Some(WatchControl {
            shutdown_tx: Arc::clone(&shutdown_tx),
            abort: join.abort_handle(),
            exit_rx,
            display,
            display_id,
        });

        info!(
            execution_id = %self.id(),
            %display_id,
            interval_ms = options.interval.as_millis() as u64,
            "watching execution"
        );
        Ok(Some(WatchHandle {
            shutdown_tx,
            join: Some(join),
            display_id,
        }))
    }

    /// Signal the active poller, if any. Returns whether one was running.
    pub fn stop_watching(&self) -> bool {
        let control = self
            .watch_slot()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match control {
            Some(control) => {
                let was_active = control.is_active();
                control.request_stop();
                if was_active {
                    info!(execution_id = %self.id(), "stop requested for watcher");
                }
                was_active
            }
            None => false,
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watch_slot()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(WatchControl::is_active)
    }
}

struct Poller {
    job: Job,
    renderer: Arc<dyn Renderer>,
    display: Arc<dyn DisplaySink>,
    display_id: DisplayId,
    interval: Duration,
}

impl Poller {
    async fn run(
        self,
        previous: Option<WatchControl>,
        shutdown_rx: watch::Receiver<bool>,
        exit_tx: watch::Sender<Option<LoopExit>>,
    ) {
        let mut exit = ExitSignal {
            tx: exit_tx,
            exit: LoopExit::Abandoned,
        };
        if let Some(previous) = previous {
            previous.take_over().await;
        }
        poll_loop(
            &self.job,
            self.renderer.as_ref(),
            self.display.as_ref(),
            self.display_id,
            self.interval,
            shutdown_rx,
        )
        .await;
        exit.exit = LoopExit::Released;
    }
}

async fn poll_loop(
    job: &Job,
    renderer: &dyn Renderer,
    display: &dyn DisplaySink,
    display_id: DisplayId,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut last_artifact: Option<String> = None;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // sync は時間がかかり得るので停止シグナルと競合させる
        let synced = tokio::select! {
            _ = shutdown_rx.changed() => break,
            result = job.sync() => result,
        };

        match synced {
            Ok(()) => {
                let artifact = job.render(renderer, true);
                display.update(&display_id, &artifact);
                last_artifact = Some(artifact);
                if job.is_terminal() {
                    info!(execution_id = %job.id(), status = ?job.status(), "execution reached terminal status");
                    break;
                }
            }
            Err(err) => {
                warn!(execution_id = %job.id(), error = %err, "sync failed, will retry");
                let banner = renderer.render_error_banner(&err.to_string());
                let body = last_artifact.as_deref().unwrap_or(NO_DATA_YET);
                display.update(&display_id, &format!("{banner}\n\n{body}"));
            }
        }

        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    match tokio::time::timeout(interval, job.sync()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => debug!(execution_id = %job.id(), error = %err, "final sync failed"),
        Err(_) => debug!(execution_id = %job.id(), "final sync timed out"),
    }
    let artifact = job.render(renderer, false);
    display.update(&display_id, &artifact);
    display.release(display_id);
    info!(execution_id = %job.id(), %display_id, "stopped watching execution");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use tokio::time::{Instant, sleep};

    use crate::app::{Client, JobList};
    use crate::domain::{ExecutionDto, ExecutionStatus};
    use crate::impls::{DisplayEvent, InMemoryExecutionGateway, RecordingDisplay};
    use crate::ports::{GatewayError, RenderError};

    #[derive(Default)]
    struct StubRenderer {
        calls: AtomicUsize,
        fail: bool,
    }

    impl Renderer for StubRenderer {
        fn render_job(&self, job: &Job, will_auto_update: bool) -> Result<String, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RenderError::Other("broken template".into()));
            }
            let status = job.status().map_or("unknown", ExecutionStatus::as_str);
            Ok(format!("{status} auto={will_auto_update}"))
        }

        fn render_list(&self, jobs: &JobList) -> Result<String, RenderError> {
            Ok(jobs.summary())
        }
    }

    fn record(status: &str) -> ExecutionDto {
        ExecutionDto::from_value(json!({"executionId": "exec-1", "status": status})).unwrap()
    }

    async fn setup(status: &str) -> (Arc<InMemoryExecutionGateway>, Job) {
        let gateway = Arc::new(InMemoryExecutionGateway::with_executions(vec![record(status)]));
        let client = Client::new(gateway.clone());
        let job = Job::from_id(&client, "exec-1").await.unwrap();
        (gateway, job)
    }

    fn updates(display: &RecordingDisplay) -> Vec<String> {
        display
            .events()
            .into_iter()
            .filter_map(|event| match event {
                DisplayEvent::Updated { artifact, .. } => Some(artifact),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_job_renders_once_without_polling() {
        let (gateway, job) = setup("Succeeded").await;
        let renderer = Arc::new(StubRenderer::default());
        let display = Arc::new(RecordingDisplay::new());

        let handle = job
            .watch(renderer.clone(), display.clone(), WatchOptions::default())
            .unwrap();

        assert!(handle.is_none());
        assert!(!job.is_watching());
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
        let events = display.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], DisplayEvent::Shown(text) if text.starts_with(NO_ACTIVE_JOB)));

        sleep(Duration::from_secs(60)).await;
        assert_eq!(gateway.calls().get, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_ends_on_terminal_status_and_releases_display() {
        let (gateway, job) = setup("Running").await;
        let renderer = Arc::new(StubRenderer::default());
        let display = Arc::new(RecordingDisplay::new());

        let mut handle = job
            .watch(renderer, display.clone(), WatchOptions::default())
            .unwrap()
            .unwrap();
        assert!(job.is_watching());

        sleep(Duration::from_secs(12)).await;
        gateway.set_status("exec-1", ExecutionStatus::Succeeded);
        handle.wait().await;

        assert!(!job.is_watching());
        assert_eq!(job.status(), Some(ExecutionStatus::Succeeded));
        // from_id + 4 polls (t=0, 5, 10, 15) + final sync
        assert_eq!(gateway.calls().get, 6);

        let events = display.events();
        assert!(matches!(&events[0], DisplayEvent::Opened { artifact, .. } if artifact == INITIALIZING_PLACEHOLDER));
        assert!(matches!(events.last(), Some(DisplayEvent::Released(_))));
        let updates = updates(&display);
        assert_eq!(updates.first().map(String::as_str), Some("Running auto=true"));
        assert_eq!(updates.last().map(String::as_str), Some("Succeeded auto=false"));
        assert_eq!(display.open_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_watching_ends_polling() {
        let (gateway, job) = setup("Running").await;
        let display = Arc::new(RecordingDisplay::new());
        let handle = job
            .watch(Arc::new(StubRenderer::default()), display.clone(), WatchOptions::default())
            .unwrap()
            .unwrap();

        sleep(Duration::from_secs(7)).await;
        assert!(job.stop_watching());
        handle.stop_and_join().await;

        let after_stop = gateway.calls().get;
        sleep(Duration::from_secs(60)).await;
        assert_eq!(gateway.calls().get, after_stop);
        assert!(!job.is_watching());
        assert!(!job.stop_watching());
        assert!(matches!(display.events().last(), Some(DisplayEvent::Released(_))));
        assert_eq!(
            updates(&display).last().map(String::as_str),
            Some("Running auto=false")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sync_failure_shows_banner_over_last_render_and_continues() {
        let (gateway, job) = setup("Running").await;
        let display = Arc::new(RecordingDisplay::new());
        let handle = job
            .watch(Arc::new(StubRenderer::default()), display.clone(), WatchOptions::default())
            .unwrap()
            .unwrap();

        sleep(Duration::from_secs(1)).await;
        gateway.fail_next_gets(1, GatewayError::Transport("connection reset".into()));
        sleep(Duration::from_secs(10)).await;
        handle.stop_and_join().await;

        let updates = updates(&display);
        assert_eq!(updates[0], "Running auto=true");
        assert!(updates[1].contains("Will retry automatically"));
        assert!(updates[1].contains("connection reset"));
        assert!(updates[1].ends_with("Running auto=true"));
        // the loop kept going after the failure
        assert_eq!(updates[2], "Running auto=true");
    }

    #[tokio::test(start_paused = true)]
    async fn first_sync_failure_falls_back_to_no_data_yet() {
        let gateway = Arc::new(InMemoryExecutionGateway::with_executions(vec![record("Running")]));
        let client = Client::new(gateway.clone());
        let job = Job::unsynced(&client, "exec-1");
        let display = Arc::new(RecordingDisplay::new());

        gateway.fail_next_gets(1, GatewayError::Timeout);
        let handle = job
            .watch(Arc::new(StubRenderer::default()), display.clone(), WatchOptions::default())
            .unwrap()
            .unwrap();
        sleep(Duration::from_secs(1)).await;
        handle.stop_and_join().await;

        let updates = updates(&display);
        assert!(updates[0].ends_with(NO_DATA_YET));
    }

    #[tokio::test(start_paused = true)]
    async fn render_failure_degrades_and_keeps_polling() {
        let (gateway, job) = setup("Running").await;
        let renderer = Arc::new(StubRenderer {
            fail: true,
            ..StubRenderer::default()
        });
        let display = Arc::new(RecordingDisplay::new());
        let handle = job
            .watch(renderer, display.clone(), WatchOptions::default())
            .unwrap()
            .unwrap();

        sleep(Duration::from_secs(11)).await;
        handle.stop_and_join().await;

        let updates = updates(&display);
        assert!(updates.len() >= 3);
        assert!(updates.iter().all(|u| u.contains("Unable to render execution exec-1")));
        assert!(gateway.calls().get >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_in_flight_sync() {
        let (gateway, job) = setup("Running").await;
        gateway.set_latency(Duration::from_secs(600));
        let display = Arc::new(RecordingDisplay::new());
        let handle = job
            .watch(Arc::new(StubRenderer::default()), display.clone(), WatchOptions::default())
            .unwrap()
            .unwrap();

        sleep(Duration::from_secs(1)).await;
        let started = Instant::now();
        handle.stop_and_join().await;

        // final sync is bounded by the interval
        assert!(started.elapsed() <= DEFAULT_WATCH_INTERVAL + Duration::from_secs(1));
        assert!(matches!(display.events().last(), Some(DisplayEvent::Released(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tick_then_terminal_tick_ends_cleanly() {
        let (gateway, job) = setup("Running").await;
        let display = Arc::new(RecordingDisplay::new());
        let mut handle = job
            .watch(Arc::new(StubRenderer::default()), display.clone(), WatchOptions::default())
            .unwrap()
            .unwrap();

        sleep(Duration::from_secs(1)).await;
        gateway.fail_next_gets(1, GatewayError::Transport("connection reset".into()));
        gateway.set_status("exec-1", ExecutionStatus::Succeeded);
        handle.wait().await;

        let updates = updates(&display);
        assert_eq!(updates.len(), 4, "{updates:?}");
        assert_eq!(updates[0], "Running auto=true");
        assert!(updates[1].contains("connection reset"));
        assert_eq!(updates[2], "Succeeded auto=true");
        assert_eq!(updates[3], "Succeeded auto=false");
        assert!(matches!(display.events().last(), Some(DisplayEvent::Released(_))));
        assert_eq!(display.open_handles(), 0);
        assert!(!job.is_watching());
    }

    #[tokio::test(start_paused = true)]
    async fn second_watch_replaces_the_first() {
        let (_gateway, job) = setup("Running").await;
        let display = Arc::new(RecordingDisplay::new());
        let renderer: Arc<dyn Renderer> = Arc::new(StubRenderer::default());

        let first = job
            .watch(renderer.clone(), display.clone(), WatchOptions::default())
            .unwrap()
            .unwrap();
        let second = job
            .watch(renderer, display.clone(), WatchOptions::default())
            .unwrap()
            .unwrap();
        assert_ne!(first.display_id(), second.display_id());

        sleep(Duration::from_secs(1)).await;
        assert!(first.is_finished());
        assert!(job.is_watching());
        assert_eq!(display.open_handles(), 1);
        let first_id = first.display_id();
        assert!(display
            .events()
            .iter()
            .any(|event| matches!(event, DisplayEvent::Released(id) if *id == first_id)));

        second.stop_and_join().await;
        assert_eq!(display.open_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rewatch_during_slow_sync_never_overlaps_gateway_calls() {
        let (gateway, job) = setup("Running").await;
        gateway.set_latency(Duration::from_secs(3));
        let display = Arc::new(RecordingDisplay::new());
        let renderer: Arc<dyn Renderer> = Arc::new(StubRenderer::default());

        let _first = job
            .watch(renderer.clone(), display.clone(), WatchOptions::default())
            .unwrap()
            .unwrap();
        sleep(Duration::from_millis(500)).await;
        let second = job
            .watch(renderer, display.clone(), WatchOptions::default())
            .unwrap()
            .unwrap();
        sleep(Duration::from_millis(500)).await;

        assert_eq!(gateway.max_in_flight(), 1);
        assert_eq!(display.open_handles(), 1);

        second.stop_and_join().await;
        assert_eq!(gateway.max_in_flight(), 1);
        assert_eq!(display.open_handles(), 0);
    }

    #[test]
    fn zero_interval_is_clamped() {
        let options = WatchOptions::default().with_interval(Duration::ZERO);
        assert_eq!(options.interval(), MIN_WATCH_INTERVAL);
        let options = WatchOptions::default().with_interval(Duration::from_secs(2));
        assert_eq!(options.interval(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_does_not_spin() {
        let (gateway, job) = setup("Running").await;
        let handle = job
            .watch(
                Arc::new(StubRenderer::default()),
                Arc::new(RecordingDisplay::new()),
                WatchOptions::default().with_interval(Duration::ZERO),
            )
            .unwrap()
            .unwrap();

        for _ in 0..200 {
            tokio::task::yield_now().await;
        }

        // from_id + the first poll; the clock has not moved since
        assert_eq!(gateway.calls().get, 2);
        handle.stop_and_join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn abort_skips_cleanup() {
        let (_gateway, job) = setup("Running").await;
        let display = Arc::new(RecordingDisplay::new());
        let handle = job
            .watch(Arc::new(StubRenderer::default()), display.clone(), WatchOptions::default())
            .unwrap()
            .unwrap();

        sleep(Duration::from_secs(1)).await;
        handle.abort();
        sleep(Duration::from_secs(30)).await;

        assert!(!job.is_watching());
        assert_eq!(display.open_handles(), 1);
    }

    #[test]
    fn watch_outside_runtime_is_an_error() {
        let gateway = Arc::new(InMemoryExecutionGateway::new());
        let client = Client::new(gateway);
        let job = Job::unsynced(&client, "exec-1");
        let result = job.watch(
            Arc::new(StubRenderer::default()),
            Arc::new(RecordingDisplay::new()),
            WatchOptions::default(),
        );
        assert!(matches!(result, Err(WatchError::NoRuntime)));
    }
}
