// Session lifecycle state shared between caller threads and the
// pipeline's event-delivery thread

use crate::clock::Ticks;
use parking_lot::{Mutex, RwLock};

/// Lifecycle state of the playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// No live pipeline instance
    Closed,
    /// A resource is opened and ready to start
    Ready,
    /// An open command is in flight
    OpenPending,
    /// Audio is rendering
    Playing,
    /// Rendering is paused
    Paused,
    /// Rendering is stopped (position reset, ready to start)
    Stopped,
    /// A close command is in flight
    Closing,
    /// The presentation played to the end; load or stop next
    PresentationEnded,
}

/// Thread-safe container for everything the session shares with the
/// event thread: lifecycle state, loaded-track attributes, the volume
/// cache and a pending fault.
///
/// Writers are either a public operation (caller thread) or the event
/// router (delivery thread), never both for the same transition.
pub struct SessionState {
    state: RwLock<PlayerState>,
    file_path: RwLock<Option<String>>,
    duration: RwLock<Ticks>,
    volume: RwLock<f32>,
    fault: Mutex<Option<String>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(PlayerState::Closed),
            file_path: RwLock::new(None),
            duration: RwLock::new(0),
            volume: RwLock::new(1.0),
            fault: Mutex::new(None),
        }
    }

    pub fn state(&self) -> PlayerState {
        *self.state.read()
    }

    pub fn set_state(&self, new_state: PlayerState) {
        *self.state.write() = new_state;
        log::debug!("session state -> {:?}", new_state);
    }

    pub fn file_path(&self) -> Option<String> {
        self.file_path.read().clone()
    }

    pub fn set_file_path(&self, path: &str) {
        *self.file_path.write() = Some(path.to_string());
    }

    pub fn duration(&self) -> Ticks {
        *self.duration.read()
    }

    pub fn set_duration(&self, duration: Ticks) {
        *self.duration.write() = duration;
    }

    /// Forget the loaded track. Called before a new open is issued and
    /// after a close completes.
    pub fn clear_track(&self) {
        *self.file_path.write() = None;
        *self.duration.write() = 0;
    }

    pub fn volume(&self) -> f32 {
        *self.volume.read()
    }

    pub fn set_volume(&self, volume: f32) {
        *self.volume.write() = volume;
    }

    /// Record a pipeline fault for the currently blocked waiter (if any)
    /// to pick up. A later fault overwrites an unconsumed earlier one.
    pub fn set_fault(&self, message: String) {
        *self.fault.lock() = Some(message);
    }

    pub fn take_fault(&self) -> Option<String> {
        self.fault.lock().take()
    }

    pub fn clear_fault(&self) {
        *self.fault.lock() = None;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let session = SessionState::new();
        assert_eq!(session.state(), PlayerState::Closed);
        assert_eq!(session.file_path(), None);
        assert_eq!(session.duration(), 0);
        assert_eq!(session.volume(), 1.0);
        assert_eq!(session.take_fault(), None);
    }

    #[test]
    fn test_track_attributes_cleared_together() {
        let session = SessionState::new();
        session.set_file_path("a.wav");
        session.set_duration(42);
        session.clear_track();
        assert_eq!(session.file_path(), None);
        assert_eq!(session.duration(), 0);
    }

    #[test]
    fn test_fault_is_consumed_once() {
        let session = SessionState::new();
        session.set_fault("decode failed".to_string());
        assert_eq!(session.take_fault().as_deref(), Some("decode failed"));
        assert_eq!(session.take_fault(), None);
    }
}
