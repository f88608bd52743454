// Collaborator boundary: the asynchronous media pipeline
//
// The pipeline decodes and renders audio on its own threads. Control
// commands only enqueue work; completion is reported out-of-band through
// an `EventSink` on a delivery thread the pipeline owns.

use crate::clock::Ticks;
use std::fmt;
use std::sync::Arc;

/// Failure reported by a pipeline command or attached to an event.
#[derive(Debug, Clone)]
pub enum PipelineError {
    /// The media resource could not be opened or is not playable audio
    Open(String),

    /// A transport command (start/pause/stop/close) failed
    Transport(String),

    /// The output device rejected the stream
    Device(String),

    /// The pipeline worker is gone; no further commands are possible
    Disconnected,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PipelineError::Open(msg) => write!(f, "open failed: {}", msg),
            PipelineError::Transport(msg) => write!(f, "transport failed: {}", msg),
            PipelineError::Device(msg) => write!(f, "device error: {}", msg),
            PipelineError::Disconnected => write!(f, "pipeline worker disconnected"),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Lifecycle event kinds the pipeline emits.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEventKind {
    /// The resource is demuxed and the render graph is ready to start
    Opened { duration: Ticks },
    /// Rendering started (covers both resume and start-from-position)
    Started,
    /// Rendering paused
    Paused,
    /// Rendering stopped
    Stopped,
    /// Final acknowledgment: the instance has torn down and will emit
    /// nothing further
    Closed,
    /// The presentation played through to the end
    EndOfStream,
    /// Master volume changed
    VolumeChanged { volume: f32 },
    /// The pipeline hit a fault outside any pending command
    Error { message: String },
}

/// Delivery status attached to every event.
///
/// A failed status means the operation that produced the event did not
/// complete; the event's kind still identifies which operation it was.
#[derive(Debug, Clone, PartialEq)]
pub enum EventStatus {
    Ok,
    Failed(String),
}

/// A single asynchronous notification from the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineEvent {
    pub kind: PipelineEventKind,
    pub status: EventStatus,
}

impl PipelineEvent {
    pub fn ok(kind: PipelineEventKind) -> Self {
        Self {
            kind,
            status: EventStatus::Ok,
        }
    }

    pub fn failed(kind: PipelineEventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: EventStatus::Failed(message.into()),
        }
    }
}

/// Whether the pipeline should keep delivering events after this one.
///
/// `Detach` is returned exactly once, for the terminal closed
/// acknowledgment; the pipeline must not deliver anything afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    Continue,
    Detach,
}

/// Receives pipeline events on the pipeline's delivery thread.
///
/// Implementations must be quick and must never call back into the
/// pipeline; the delivery thread processes one event at a time.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: PipelineEvent) -> EventDisposition;
}

/// Black-box media pipeline driven by the session controller.
///
/// `open`, `start`, `pause`, `stop` and `close` return as soon as the
/// command is accepted; the matching `PipelineEvent` reports completion.
/// Volume and clock access are immediate, synchronous calls.
pub trait MediaPipeline: Send + Sync {
    fn open(&self, path: &str) -> std::result::Result<(), PipelineError>;

    /// Start or resume rendering. `position` rewinds/advances the render
    /// clock first; `None` resumes from the current position.
    fn start(&self, position: Option<Ticks>) -> std::result::Result<(), PipelineError>;

    fn pause(&self) -> std::result::Result<(), PipelineError>;

    fn stop(&self) -> std::result::Result<(), PipelineError>;

    fn close(&self) -> std::result::Result<(), PipelineError>;

    fn set_volume(&self, volume: f32) -> std::result::Result<(), PipelineError>;

    fn volume(&self) -> std::result::Result<f32, PipelineError>;

    /// Best-effort read of the live render clock. `None` when the clock
    /// is not running or not yet created.
    fn clock_position(&self) -> Option<Ticks>;
}

/// Builds a fresh pipeline instance wired to an event sink.
///
/// The session never mutates a pipeline in place; each load constructs a
/// new instance and retires the old one through the close sequence.
pub trait PipelineFactory: Send + Sync {
    fn create(
        &self,
        sink: Arc<dyn EventSink>,
    ) -> std::result::Result<Arc<dyn MediaPipeline>, PipelineError>;
}
