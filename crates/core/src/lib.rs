// Core session control for the Tonearm audio player

pub mod clock;
pub mod error;
pub mod pipeline;
pub mod router;
pub mod session;
pub mod state;
pub mod waiter;

// Re-export commonly used types
pub use clock::{format_mm_ss, Ticks, TICKS_PER_SECOND};
pub use error::{ControlError, Result};
pub use pipeline::{
    EventDisposition, EventSink, EventStatus, MediaPipeline, PipelineError, PipelineEvent,
    PipelineEventKind, PipelineFactory,
};
pub use router::EventRouter;
pub use session::{SessionConfig, SessionController};
pub use state::{PlayerState, SessionState};
pub use waiter::{WaitSlot, WaitSlots};
