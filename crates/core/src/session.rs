// Blocking session controller over the asynchronous media pipeline
//
// Public operations run on caller threads, validate against the current
// session state, issue one asynchronous command and block on the wait
// slot for that command's completion event. The pipeline answers on its
// own delivery thread through the event router.

use crate::clock::Ticks;
use crate::error::{ControlError, Result};
use crate::pipeline::{MediaPipeline, PipelineFactory};
use crate::router::EventRouter;
use crate::state::{PlayerState, SessionState};
use crate::waiter::WaitSlots;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Bounded wait for the open/topology sequence
const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(3);

/// Bounded wait for start/pause/stop completion
const DEFAULT_TRANSPORT_TIMEOUT: Duration = Duration::from_secs(3);

/// Bounded wait for the close acknowledgment. Missing this deadline has
/// no recovery path, so it is far more generous than the others.
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Wait bounds for the blocking control operations.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub open_timeout: Duration,
    pub transport_timeout: Duration,
    pub close_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            transport_timeout: DEFAULT_TRANSPORT_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

/// Synchronous, blocking control surface for one playback session.
///
/// All control operations may be called from any thread; an operation
/// lock serializes them for the full issue-command-then-wait span.
/// Getters and the volume pass-throughs are immediate and never queue
/// behind a blocked operation.
pub struct SessionController {
    session: Arc<SessionState>,
    slots: Arc<WaitSlots>,
    router: Arc<EventRouter>,
    factory: Arc<dyn PipelineFactory>,
    pipeline: Mutex<Option<Arc<dyn MediaPipeline>>>,
    config: SessionConfig,
    op_lock: Mutex<()>,
}

impl SessionController {
    pub fn new(factory: Arc<dyn PipelineFactory>) -> Self {
        Self::with_config(factory, SessionConfig::default())
    }

    pub fn with_config(factory: Arc<dyn PipelineFactory>, config: SessionConfig) -> Self {
        let session = Arc::new(SessionState::new());
        let slots = Arc::new(WaitSlots::new());
        let router = Arc::new(EventRouter::new(session.clone(), slots.clone()));
        Self {
            session,
            slots,
            router,
            factory,
            pipeline: Mutex::new(None),
            config,
            op_lock: Mutex::new(()),
        }
    }

    /// Load `path` and begin playback.
    ///
    /// Tears down any existing pipeline instance first, then constructs a
    /// fresh one, opens the resource and starts rendering. Returns once
    /// playback has actually started. An open timeout leaves the session
    /// `Ready` with the instance alive, so the load can be retried.
    pub fn load_file(&self, path: &str) -> Result<()> {
        if path.is_empty() {
            return Err(ControlError::InvalidArgument("empty file path".to_string()));
        }

        let _op = self.op_lock.lock();
        log::info!("loading {}", path);

        // The session never holds two live pipeline instances.
        self.close_pipeline_locked()?;

        self.session.clear_fault();
        self.session.clear_track();
        self.slots.reset_all();
        self.session.set_state(PlayerState::OpenPending);

        let pipeline = match self.factory.create(self.router.clone()) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                self.session.set_state(PlayerState::Closed);
                return Err(ControlError::PipelineFault(e.to_string()));
            }
        };
        *self.pipeline.lock() = Some(pipeline.clone());

        if let Err(e) = pipeline.open(path) {
            self.session.set_state(PlayerState::Ready);
            return Err(ControlError::PipelineFault(e.to_string()));
        }

        if !self.slots.topology_ready.wait(self.config.open_timeout) {
            // The instance stays alive for a retry; only the wait gives up.
            self.session.set_state(PlayerState::Ready);
            return Err(ControlError::Timeout("open was never acknowledged".to_string()));
        }
        if let Some(fault) = self.session.take_fault() {
            self.session.set_state(PlayerState::Ready);
            return Err(ControlError::PipelineFault(fault));
        }

        // The router has stored the duration and moved us to Ready.
        self.session.set_file_path(path);

        // Load-and-play: loading a file immediately begins playback.
        self.start_playback(&pipeline, None)
    }

    /// Resume playback. Silent no-op success unless paused or stopped.
    pub fn play(&self) -> Result<()> {
        let _op = self.op_lock.lock();
        if !matches!(
            self.session.state(),
            PlayerState::Paused | PlayerState::Stopped
        ) {
            return Ok(());
        }
        let Some(pipeline) = self.pipeline_handle() else {
            return Ok(());
        };
        self.session.clear_fault();
        self.start_playback(&pipeline, None)
    }

    /// Pause playback. Silent no-op success unless playing.
    pub fn pause(&self) -> Result<()> {
        let _op = self.op_lock.lock();
        if self.session.state() != PlayerState::Playing {
            return Ok(());
        }
        let Some(pipeline) = self.pipeline_handle() else {
            return Ok(());
        };
        self.session.clear_fault();
        self.pause_locked(&pipeline)
    }

    /// Stop playback and reset the render position.
    ///
    /// Accepted while playing, paused, or after the presentation ended;
    /// a silent no-op success anywhere else.
    pub fn stop(&self) -> Result<()> {
        let _op = self.op_lock.lock();
        if !matches!(
            self.session.state(),
            PlayerState::Playing | PlayerState::Paused | PlayerState::PresentationEnded
        ) {
            return Ok(());
        }
        let Some(pipeline) = self.pipeline_handle() else {
            return Ok(());
        };
        self.session.clear_fault();
        self.slots.stopped.reset();
        pipeline
            .stop()
            .map_err(|e| ControlError::PipelineFault(e.to_string()))?;
        if !self.slots.stopped.wait(self.config.transport_timeout) {
            return Err(ControlError::Timeout("stop was never acknowledged".to_string()));
        }
        if let Some(fault) = self.session.take_fault() {
            return Err(ControlError::PipelineFault(fault));
        }
        Ok(())
    }

    /// Seek to `position` and resume playing from there.
    ///
    /// The pipeline does not distinguish "start from position" from
    /// "resume", so seeking shares the started wait slot with `play`.
    /// Pauses first when currently playing.
    pub fn seek(&self, position: Ticks) -> Result<()> {
        let _op = self.op_lock.lock();
        let state = self.session.state();
        if !matches!(
            state,
            PlayerState::Playing | PlayerState::Paused | PlayerState::Stopped
        ) {
            return Ok(());
        }
        let duration = self.session.duration();
        if position > duration {
            return Err(ControlError::InvalidArgument(format!(
                "seek position {} past duration {}",
                position, duration
            )));
        }
        let Some(pipeline) = self.pipeline_handle() else {
            return Ok(());
        };
        self.session.clear_fault();
        if state == PlayerState::Playing {
            self.pause_locked(&pipeline)?;
        }
        self.start_playback(&pipeline, Some(position))
    }

    /// Set the master volume. Immediate, no session state transition.
    pub fn set_volume(&self, level: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&level) {
            return Err(ControlError::InvalidArgument(format!(
                "volume {} outside [0.0, 1.0]",
                level
            )));
        }
        let Some(pipeline) = self.pipeline_handle() else {
            return Err(ControlError::InvalidState("no pipeline instance".to_string()));
        };
        pipeline
            .set_volume(level)
            .map_err(|e| ControlError::PipelineFault(e.to_string()))?;
        self.session.set_volume(level);
        Ok(())
    }

    /// Read the master volume straight from the pipeline.
    pub fn get_volume(&self) -> Result<f32> {
        let Some(pipeline) = self.pipeline_handle() else {
            return Err(ControlError::InvalidState("no pipeline instance".to_string()));
        };
        pipeline
            .volume()
            .map_err(|e| ControlError::PipelineFault(e.to_string()))
    }

    pub fn state(&self) -> PlayerState {
        self.session.state()
    }

    pub fn file_path(&self) -> Option<String> {
        self.session.file_path()
    }

    pub fn duration(&self) -> Ticks {
        self.session.duration()
    }

    /// Live render position. Position is advisory telemetry, so this
    /// never fails: it reads zero whenever no pipeline or clock exists.
    pub fn current_position(&self) -> Ticks {
        self.pipeline_handle()
            .and_then(|pipeline| pipeline.clock_position())
            .unwrap_or(0)
    }

    /// Tear down the pipeline instance and transition to `Closed`.
    ///
    /// Must be invoked before the controller is released; idempotent once
    /// closed. A close timeout is `Unrecoverable`: the pipeline gave no
    /// acknowledgment and there is no safe way to continue.
    pub fn shutdown(&self) -> Result<()> {
        let _op = self.op_lock.lock();
        self.close_pipeline_locked()
    }

    fn pipeline_handle(&self) -> Option<Arc<dyn MediaPipeline>> {
        self.pipeline.lock().clone()
    }

    /// Issue `start` and block until rendering has begun. Shared by
    /// play, seek and the load-and-play tail of `load_file`.
    fn start_playback(
        &self,
        pipeline: &Arc<dyn MediaPipeline>,
        position: Option<Ticks>,
    ) -> Result<()> {
        self.slots.started.reset();
        pipeline
            .start(position)
            .map_err(|e| ControlError::PipelineFault(e.to_string()))?;
        if !self.slots.started.wait(self.config.transport_timeout) {
            return Err(ControlError::Timeout("start was never acknowledged".to_string()));
        }
        if let Some(fault) = self.session.take_fault() {
            return Err(ControlError::PipelineFault(fault));
        }
        Ok(())
    }

    fn pause_locked(&self, pipeline: &Arc<dyn MediaPipeline>) -> Result<()> {
        self.slots.paused.reset();
        pipeline
            .pause()
            .map_err(|e| ControlError::PipelineFault(e.to_string()))?;
        if !self.slots.paused.wait(self.config.transport_timeout) {
            return Err(ControlError::Timeout("pause was never acknowledged".to_string()));
        }
        if let Some(fault) = self.session.take_fault() {
            return Err(ControlError::PipelineFault(fault));
        }
        Ok(())
    }

    /// Full close sequence for the current instance, if any. Expects the
    /// operation lock to be held.
    fn close_pipeline_locked(&self) -> Result<()> {
        let Some(pipeline) = self.pipeline_handle() else {
            self.session.set_state(PlayerState::Closed);
            return Ok(());
        };

        log::info!("closing pipeline instance");
        self.session.set_state(PlayerState::Closing);
        self.session.clear_fault();
        self.slots.closed.reset();

        if let Err(e) = pipeline.close() {
            return Err(ControlError::Unrecoverable(format!(
                "close command rejected: {}",
                e
            )));
        }
        if !self.slots.closed.wait(self.config.close_timeout) {
            return Err(ControlError::Unrecoverable(
                "close was never acknowledged".to_string(),
            ));
        }
        let fault = self.session.take_fault();

        // The instance acknowledged closure; release it either way.
        *self.pipeline.lock() = None;
        self.session.clear_track();
        self.session.set_state(PlayerState::Closed);

        match fault {
            Some(fault) => Err(ControlError::PipelineFault(fault)),
            None => Ok(()),
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("session teardown failed: {}", e);
        }
    }
}
