// Routes asynchronous pipeline events into session state and wait slots

use crate::pipeline::{EventDisposition, EventSink, EventStatus, PipelineEvent, PipelineEventKind};
use crate::state::{PlayerState, SessionState};
use crate::waiter::{WaitSlot, WaitSlots};
use std::sync::Arc;

/// Single point of entry for every event the pipeline emits.
///
/// Runs on the pipeline's delivery thread, one event at a time. Each
/// event maps to exactly one state assignment plus one wait-slot signal;
/// the state write always precedes the signal so a waking waiter observes
/// the post-transition state.
pub struct EventRouter {
    session: Arc<SessionState>,
    slots: Arc<WaitSlots>,
}

impl EventRouter {
    pub fn new(session: Arc<SessionState>, slots: Arc<WaitSlots>) -> Self {
        Self { session, slots }
    }

    fn slot_for(&self, kind: &PipelineEventKind) -> Option<&WaitSlot> {
        match kind {
            PipelineEventKind::Opened { .. } => Some(&self.slots.topology_ready),
            PipelineEventKind::Started => Some(&self.slots.started),
            PipelineEventKind::Paused => Some(&self.slots.paused),
            PipelineEventKind::Stopped => Some(&self.slots.stopped),
            PipelineEventKind::Closed => Some(&self.slots.closed),
            PipelineEventKind::VolumeChanged { .. } => Some(&self.slots.volume_changed),
            PipelineEventKind::EndOfStream | PipelineEventKind::Error { .. } => None,
        }
    }
}

impl EventSink for EventRouter {
    fn on_event(&self, event: PipelineEvent) -> EventDisposition {
        let terminal = matches!(event.kind, PipelineEventKind::Closed);

        if let EventStatus::Failed(message) = &event.status {
            // Fail fast: record the fault and wake the waiter tied to this
            // event class, so the blocked call returns PipelineFault
            // instead of running out its timeout.
            log::error!("pipeline event {:?} delivered failed: {}", event.kind, message);
            self.session.set_fault(message.clone());
            if let Some(slot) = self.slot_for(&event.kind) {
                slot.signal();
            }
            return if terminal {
                EventDisposition::Detach
            } else {
                EventDisposition::Continue
            };
        }

        match &event.kind {
            PipelineEventKind::Opened { duration } => {
                log::debug!("pipeline opened, duration {} ticks", duration);
                self.session.set_duration(*duration);
                self.session.set_state(PlayerState::Ready);
                self.slots.topology_ready.signal();
            }
            PipelineEventKind::Started => {
                self.session.set_state(PlayerState::Playing);
                self.slots.started.signal();
            }
            PipelineEventKind::Paused => {
                self.session.set_state(PlayerState::Paused);
                self.slots.paused.signal();
            }
            PipelineEventKind::Stopped => {
                self.session.set_state(PlayerState::Stopped);
                self.slots.stopped.signal();
            }
            PipelineEventKind::Closed => {
                // The controller owns the Closing -> Closed transition; it
                // still has to release the instance after this signal.
                log::debug!("pipeline acknowledged close");
                self.slots.closed.signal();
            }
            PipelineEventKind::EndOfStream => {
                log::info!("presentation ended");
                self.session.set_state(PlayerState::PresentationEnded);
            }
            PipelineEventKind::VolumeChanged { volume } => {
                self.session.set_volume(*volume);
                self.slots.volume_changed.signal();
            }
            PipelineEventKind::Error { message } => {
                // Not tied to a single pending command: record the fault
                // and wake everything so no caller is left stuck.
                log::error!("pipeline fault: {}", message);
                self.session.set_fault(message.clone());
                self.slots.signal_all();
            }
        }

        if terminal {
            EventDisposition::Detach
        } else {
            EventDisposition::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> (Arc<SessionState>, Arc<WaitSlots>, EventRouter) {
        let session = Arc::new(SessionState::new());
        let slots = Arc::new(WaitSlots::new());
        let router = EventRouter::new(session.clone(), slots.clone());
        (session, slots, router)
    }

    #[test]
    fn test_opened_stores_duration_before_signaling() {
        let (session, slots, router) = router();
        let disposition = router.on_event(PipelineEvent::ok(PipelineEventKind::Opened {
            duration: 1234,
        }));
        assert_eq!(disposition, EventDisposition::Continue);
        assert_eq!(session.duration(), 1234);
        assert_eq!(session.state(), PlayerState::Ready);
        assert!(slots.topology_ready.wait(std::time::Duration::ZERO));
    }

    #[test]
    fn test_closed_is_terminal_and_does_not_rearm() {
        let (session, slots, router) = router();
        session.set_state(PlayerState::Closing);
        let disposition = router.on_event(PipelineEvent::ok(PipelineEventKind::Closed));
        assert_eq!(disposition, EventDisposition::Detach);
        // State stays Closing: the controller finishes the transition
        assert_eq!(session.state(), PlayerState::Closing);
        assert!(slots.closed.wait(std::time::Duration::ZERO));
    }

    #[test]
    fn test_failed_delivery_wakes_waiter_with_fault() {
        let (session, slots, router) = router();
        session.set_state(PlayerState::OpenPending);
        router.on_event(PipelineEvent::failed(
            PipelineEventKind::Opened { duration: 0 },
            "no such file",
        ));
        assert!(slots.topology_ready.wait(std::time::Duration::ZERO));
        assert_eq!(session.take_fault().as_deref(), Some("no such file"));
        // A failed open must not pretend the topology is ready
        assert_eq!(session.state(), PlayerState::OpenPending);
    }

    #[test]
    fn test_end_of_stream_is_informational() {
        let (session, _slots, router) = router();
        session.set_state(PlayerState::Playing);
        router.on_event(PipelineEvent::ok(PipelineEventKind::EndOfStream));
        assert_eq!(session.state(), PlayerState::PresentationEnded);
    }

    #[test]
    fn test_out_of_band_error_wakes_everything() {
        let (session, slots, router) = router();
        router.on_event(PipelineEvent::ok(PipelineEventKind::Error {
            message: "render device lost".to_string(),
        }));
        assert_eq!(session.take_fault().as_deref(), Some("render device lost"));
        assert!(slots.started.wait(std::time::Duration::ZERO));
        assert!(slots.closed.wait(std::time::Duration::ZERO));
    }

    #[test]
    fn test_volume_changed_updates_cache() {
        let (session, slots, router) = router();
        router.on_event(PipelineEvent::ok(PipelineEventKind::VolumeChanged {
            volume: 0.25,
        }));
        assert_eq!(session.volume(), 0.25);
        assert!(slots.volume_changed.wait(std::time::Duration::ZERO));
    }
}
