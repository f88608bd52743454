// Single-shot wait slots bridging pipeline events to blocked callers

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Auto-resetting single-shot signal.
///
/// The caller thread arms the slot with `reset`, issues the asynchronous
/// command and blocks in `wait`; the event-delivery thread fires `signal`
/// once the matching event has been routed. Waking consumes the signal,
/// so a stale signal from a late event after a timed-out wait is cleared
/// by the next `reset`.
pub struct WaitSlot {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl WaitSlot {
    pub fn new() -> Self {
        Self {
            signaled: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Arm the slot. Must be called before the command whose completion
    /// this slot reports is issued.
    pub fn reset(&self) {
        *self.signaled.lock() = false;
    }

    /// Wake the waiter. Called from the event-delivery thread, strictly
    /// after the state mutation that accompanies the event.
    pub fn signal(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        self.cond.notify_one();
    }

    /// Block until signaled or until `timeout` elapses. Returns whether
    /// the signal fired; either way the slot is left unsignaled.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signaled = self.signaled.lock();
        while !*signaled {
            if self.cond.wait_until(&mut signaled, deadline).timed_out() {
                break;
            }
        }
        let fired = *signaled;
        *signaled = false;
        fired
    }
}

impl Default for WaitSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// One slot per event class the session controller can block on.
pub struct WaitSlots {
    pub topology_ready: WaitSlot,
    pub started: WaitSlot,
    pub paused: WaitSlot,
    pub stopped: WaitSlot,
    pub closed: WaitSlot,
    pub volume_changed: WaitSlot,
}

impl WaitSlots {
    pub fn new() -> Self {
        Self {
            topology_ready: WaitSlot::new(),
            started: WaitSlot::new(),
            paused: WaitSlot::new(),
            stopped: WaitSlot::new(),
            closed: WaitSlot::new(),
            volume_changed: WaitSlot::new(),
        }
    }

    /// Disarm every slot. Used when a fresh pipeline instance replaces
    /// the old one, so stale signals cannot leak across instances.
    pub fn reset_all(&self) {
        self.topology_ready.reset();
        self.started.reset();
        self.paused.reset();
        self.stopped.reset();
        self.closed.reset();
        self.volume_changed.reset();
    }

    /// Wake every waiter. Used when the pipeline reports a fault that is
    /// not tied to a single pending command.
    pub fn signal_all(&self) {
        self.topology_ready.signal();
        self.started.signal();
        self.paused.signal();
        self.stopped.signal();
        self.closed.signal();
        self.volume_changed.signal();
    }
}

impl Default for WaitSlots {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_signal_before_wait_is_not_lost() {
        let slot = WaitSlot::new();
        slot.signal();
        assert!(slot.wait(Duration::from_millis(10)));
    }

    #[test]
    fn test_wait_consumes_the_signal() {
        let slot = WaitSlot::new();
        slot.signal();
        assert!(slot.wait(Duration::from_millis(10)));
        // Second wait must time out: the slot auto-resets
        assert!(!slot.wait(Duration::from_millis(10)));
    }

    #[test]
    fn test_wait_times_out_without_signal() {
        let slot = WaitSlot::new();
        let before = Instant::now();
        assert!(!slot.wait(Duration::from_millis(50)));
        assert!(before.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_signal_from_another_thread_wakes_waiter() {
        let slot = Arc::new(WaitSlot::new());
        let signaler = slot.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            signaler.signal();
        });
        assert!(slot.wait(Duration::from_secs(5)));
        handle.join().unwrap();
    }

    #[test]
    fn test_reset_discards_stale_signal() {
        let slot = WaitSlot::new();
        slot.signal();
        slot.reset();
        assert!(!slot.wait(Duration::from_millis(10)));
    }
}
