//! Capture session lifecycle
//!
//! A [`SessionController`] owns at most one capture session at a time. It
//! acquires a media stream for a task, wires a [`FrameSampler`] to an
//! [`UploadDispatcher`], and tears everything down on stop or when the
//! stream's video track ends.
//!
//! ```text
//!  Idle ──start──▶ Requesting ──granted──▶ Active ──stop / track end──▶ Stopped
//!   ▲                  │
//!   └────denied────────┘
//! ```

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::capture::{CaptureSource, MediaStream, StreamInfo, TrackEnded};
use crate::config::CaptureConfig;
use crate::error::{Result, SnapError};
use crate::render::{FrameRenderer, PngRenderer};
use crate::sampler::{FrameSampler, SamplerExit, SamplerStats};
use crate::types::{Handle, SessionState, SourceKind, TaskId, TaskSignal, TaskStage};
use crate::upload::{ScreenshotStore, UploadDispatcher, UploadStats};

/// Information about a session that just became active
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Session handle
    pub handle: Handle,
    /// Task being captured
    pub task_id: TaskId,
    /// Stream width in pixels
    pub width: u32,
    /// Stream height in pixels
    pub height: u32,
    /// What kind of surface the user shared
    pub source_kind: SourceKind,
}

/// Snapshot of a session's counters
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// Session handle
    pub handle: Handle,
    /// Task being captured
    pub task_id: TaskId,
    /// Controller state when the snapshot was taken
    pub state: SessionState,
    /// Ticks fired
    pub ticks: u64,
    /// Ticks that produced a screenshot
    pub captured: u64,
    /// Ticks skipped (not ready, render or encode failure)
    pub skipped: u64,
    /// Screenshots stored
    pub uploaded: u64,
    /// Uploads that failed
    pub failed: u64,
    /// Uploads still running
    pub in_flight: u64,
    /// Time since the session became active
    pub elapsed: Duration,
}

impl std::fmt::Display for SessionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] task {}: {} ticks, {} captured, {} skipped, {} uploaded, {} failed, {} in flight, {:.1}s",
            self.handle,
            self.state,
            self.task_id,
            self.ticks,
            self.captured,
            self.skipped,
            self.uploaded,
            self.failed,
            self.in_flight,
            self.elapsed.as_secs_f64()
        )
    }
}

/// A running capture session
struct ActiveSession {
    handle: Handle,
    task_id: TaskId,
    info: StreamInfo,
    /// Keeps the playback surface alive until the session is finished
    stream: MediaStream,
    stop_tx: Arc<watch::Sender<bool>>,
    sampler: JoinHandle<SamplerExit>,
    dispatcher: JoinHandle<()>,
    supervisor: JoinHandle<()>,
    sampler_stats: Arc<SamplerStats>,
    upload_stats: Arc<UploadStats>,
    started: Instant,
}

impl ActiveSession {
    fn stats(&self, state: SessionState) -> SessionStats {
        SessionStats {
            handle: self.handle,
            task_id: self.task_id.clone(),
            state,
            ticks: self.sampler_stats.ticks(),
            captured: self.sampler_stats.captured(),
            skipped: self.sampler_stats.skipped(),
            uploaded: self.upload_stats.uploaded(),
            failed: self.upload_stats.failed(),
            in_flight: self.upload_stats.in_flight(),
            elapsed: self.started.elapsed(),
        }
    }

    /// Raise stop, wait for the session tasks, then release the stream
    ///
    /// Detached uploads keep running. Returns the final counters.
    async fn finish(mut self) -> SessionStats {
        self.stop_tx.send_replace(true);

        match (&mut self.sampler).await {
            Ok(exit) => debug!("{} sampler finished: {:?}", self.handle, exit),
            Err(e) => error!("{} sampler task failed: {}", self.handle, e),
        }
        if let Err(e) = (&mut self.dispatcher).await {
            error!("{} dispatcher task failed: {}", self.handle, e);
        }
        if let Err(e) = (&mut self.supervisor).await {
            error!("{} supervisor task failed: {}", self.handle, e);
        }

        let stats = self.stats(SessionState::Stopped);
        drop(self.stream);
        info!(
            "{} released ({}x{} {})",
            self.handle, self.info.width, self.info.height, self.info.source_kind
        );
        stats
    }
}

type SessionSlot = Arc<Mutex<Option<ActiveSession>>>;

/// Starts and stops capture sessions for tasks
pub struct SessionController {
    source: Arc<dyn CaptureSource>,
    store: Arc<dyn ScreenshotStore>,
    renderer: Arc<dyn FrameRenderer>,
    config: CaptureConfig,
    state: Arc<watch::Sender<SessionState>>,
    session: SessionSlot,
    /// Task of the session being requested or run
    task: Mutex<Option<TaskId>>,
    /// Bumped by every accepted `start`; only changed under the slot lock
    request: AtomicU64,
    /// Last stage seen per task, for edge detection
    stages: Mutex<HashMap<TaskId, TaskStage>>,
    /// Final counters of the last finished session
    last: Mutex<Option<SessionStats>>,
}

impl SessionController {
    /// Create an idle controller
    pub fn new(
        source: Arc<dyn CaptureSource>,
        store: Arc<dyn ScreenshotStore>,
        config: CaptureConfig,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            source,
            store,
            renderer: Arc::new(PngRenderer::new()),
            config,
            state: Arc::new(state),
            session: Arc::new(Mutex::new(None)),
            task: Mutex::new(None),
            request: AtomicU64::new(0),
            stages: Mutex::new(HashMap::new()),
            last: Mutex::new(None),
        }
    }

    /// Use a different frame renderer
    pub fn with_renderer(mut self, renderer: Arc<dyn FrameRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Task of the current or most recent session
    pub fn task_id(&self) -> Option<TaskId> {
        self.task.lock().clone()
    }

    /// The capture configuration in use
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Counters of the current or most recent session
    pub fn stats(&self) -> Option<SessionStats> {
        let state = self.state();
        match self.session.lock().as_ref() {
            Some(session) => Some(session.stats(state)),
            None => self.last.lock().clone(),
        }
    }

    /// Start capturing a task
    ///
    /// Asks the capture source for a stream; this is where the user is
    /// prompted. On denial the controller returns to `Idle` and the error is
    /// handed back without retrying.
    pub async fn start(&self, task_id: TaskId) -> Result<SessionInfo> {
        let (request, previous) = {
            let mut slot = self.session.lock();
            let state = *self.state.borrow();
            if matches!(state, SessionState::Requesting | SessionState::Active) {
                let current = self
                    .task
                    .lock()
                    .as_ref()
                    .map(|t| t.to_string())
                    .unwrap_or_default();
                return Err(SnapError::SessionAlreadyActive(current));
            }
            let request = self.request.fetch_add(1, Ordering::SeqCst) + 1;
            self.state.send_replace(SessionState::Requesting);
            *self.task.lock() = Some(task_id.clone());
            (request, slot.take())
        };

        if let Some(old) = previous {
            let stats = old.finish().await;
            *self.last.lock() = Some(stats);
        }

        info!("Requesting screen capture for task {}", task_id);

        let stream = match self.source.acquire().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Screen capture for task {} not started: {}", task_id, e);
                let _slot = self.session.lock();
                let current = self.request.load(Ordering::SeqCst) == request;
                self.state.send_if_modified(|s| {
                    if current && *s == SessionState::Requesting {
                        *s = SessionState::Idle;
                        true
                    } else {
                        false
                    }
                });
                return Err(e);
            }
        };

        // A stop, or a stop followed by a newer start, supersedes this request
        let mut slot = self.session.lock();
        if self.request.load(Ordering::SeqCst) != request
            || *self.state.borrow() != SessionState::Requesting
        {
            drop(slot);
            info!("Session for task {} stopped before it started", task_id);
            return Err(SnapError::NoActiveSession);
        }

        let session = self.spawn_session(task_id, stream);
        let info = SessionInfo {
            handle: session.handle,
            task_id: session.task_id.clone(),
            width: session.info.width,
            height: session.info.height,
            source_kind: session.info.source_kind,
        };
        *slot = Some(session);
        self.state.send_replace(SessionState::Active);

        info!(
            "{} active for task {} ({}x{} {}, every {}ms)",
            info.handle,
            info.task_id,
            info.width,
            info.height,
            info.source_kind,
            self.config.interval.as_millis()
        );
        Ok(info)
    }

    fn spawn_session(&self, task_id: TaskId, stream: MediaStream) -> ActiveSession {
        let handle = Handle::new();
        let (stop_tx, stop_rx) = watch::channel(false);
        let stop_tx = Arc::new(stop_tx);
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();

        let sampler = FrameSampler::new(
            stream.surface(),
            self.renderer.clone(),
            task_id.clone(),
            self.config.interval,
        );
        let sampler_stats = sampler.stats();
        let sampler = tokio::spawn(sampler.run(frames_tx, stop_rx.clone(), stream.on_ended()));

        let dispatcher = UploadDispatcher::new(self.store.clone());
        let upload_stats = dispatcher.stats();
        let dispatcher = tokio::spawn(dispatcher.run(frames_rx, stop_rx.clone()));

        let supervisor = tokio::spawn(supervise(
            handle,
            stream.on_ended(),
            stop_rx,
            stop_tx.clone(),
            self.state.clone(),
            self.session.clone(),
        ));

        ActiveSession {
            handle,
            task_id,
            info: stream.info(),
            stream,
            stop_tx,
            sampler,
            dispatcher,
            supervisor,
            sampler_stats,
            upload_stats,
            started: Instant::now(),
        }
    }

    /// Feed a task-state signal
    ///
    /// Edge-triggered: a task moving into `InProgress` starts a session,
    /// repeating `InProgress` for the same task does nothing. Other stages
    /// are only remembered.
    pub async fn handle_signal(&self, signal: TaskSignal) -> Result<Option<SessionInfo>> {
        let previous = self
            .stages
            .lock()
            .insert(signal.task_id.clone(), signal.stage);

        if signal.stage != TaskStage::InProgress || previous == Some(TaskStage::InProgress) {
            debug!(
                "Task {} stage {} (was {:?}), no session change",
                signal.task_id, signal.stage, previous
            );
            return Ok(None);
        }

        match self.start(signal.task_id.clone()).await {
            Ok(info) => Ok(Some(info)),
            Err(e) => {
                // Forget the edge so a later signal can try again
                let mut stages = self.stages.lock();
                match previous {
                    Some(stage) => stages.insert(signal.task_id, stage),
                    None => stages.remove(&signal.task_id),
                };
                Err(e)
            }
        }
    }

    /// Stop the current session
    ///
    /// Idempotent. Waits for the sampler and dispatcher to exit and releases
    /// the stream; uploads already running are left to finish.
    pub async fn stop(&self) -> Result<()> {
        let session = {
            let mut slot = self.session.lock();
            let session = slot.take();
            self.state.send_if_modified(|s| {
                if matches!(s, SessionState::Requesting | SessionState::Active) {
                    *s = SessionState::Stopped;
                    true
                } else {
                    false
                }
            });
            if let Some(session) = &session {
                session.stop_tx.send_replace(true);
            }
            session
        };

        match session {
            Some(session) => {
                info!("Stopping {} for task {}", session.handle, session.task_id);
                let stats = session.finish().await;
                info!("{}", stats);
                *self.last.lock() = Some(stats);
            }
            None => debug!("Stop requested with no running session"),
        }
        Ok(())
    }

    /// Wait until no session is requesting or active
    pub async fn wait_stopped(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx
            .wait_for(|s| !matches!(s, SessionState::Requesting | SessionState::Active))
            .await;
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(session) = self.session.lock().as_ref() {
            debug!("Controller dropped, stopping {}", session.handle);
            session.stop_tx.send_replace(true);
        }
    }
}

/// Stop the session when its video track ends
async fn supervise(
    handle: Handle,
    mut ended: TrackEnded,
    mut stop_rx: watch::Receiver<bool>,
    stop_tx: Arc<watch::Sender<bool>>,
    state: Arc<watch::Sender<SessionState>>,
    slot: SessionSlot,
) {
    tokio::select! {
        biased;
        _ = stop_rx.wait_for(|stopped| *stopped) => return,
        _ = ended.wait() => {}
    }

    info!("{} video track ended, stopping", handle);
    stop_tx.send_replace(true);

    let slot = slot.lock();
    if slot.as_ref().map(|s| s.handle) == Some(handle) {
        state.send_if_modified(|s| {
            if *s == SessionState::Active {
                *s = SessionState::Stopped;
                true
            } else {
                false
            }
        });
    }
}
