// Interleaved f32 sample queue between the decode pump and the output callback

use std::collections::VecDeque;

/// Bounded FIFO of interleaved f32 samples.
///
/// The decode pump pushes on the worker thread; the output callback pops
/// on the device thread. Callers hold it behind a mutex, so the queue
/// itself stays single-threaded and simple.
pub struct SampleRing {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append as much of `data` as fits. Returns how many samples were taken.
    pub fn push(&mut self, data: &[f32]) -> usize {
        let room = self.capacity - self.samples.len();
        let taken = data.len().min(room);
        self.samples.extend(&data[..taken]);
        taken
    }

    /// Fill `out` from the queue, zeroing whatever cannot be served.
    /// Returns the number of real samples written.
    pub fn pop_into(&mut self, out: &mut [f32]) -> usize {
        let available = self.samples.len().min(out.len());
        for slot in out[..available].iter_mut() {
            // The bound above guarantees the queue is non-empty here
            *slot = self.samples.pop_front().unwrap_or(0.0);
        }
        out[available..].fill(0.0);
        available
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_respects_capacity() {
        let mut ring = SampleRing::new(4);
        assert_eq!(ring.push(&[1.0, 2.0, 3.0]), 3);
        assert_eq!(ring.push(&[4.0, 5.0]), 1);
        assert_eq!(ring.len(), 4);
    }

    #[test]
    fn test_pop_zero_fills_the_tail() {
        let mut ring = SampleRing::new(8);
        ring.push(&[1.0, 2.0]);
        let mut out = [9.0; 4];
        assert_eq!(ring.pop_into(&mut out), 2);
        assert_eq!(out, [1.0, 2.0, 0.0, 0.0]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_fifo_order_across_pushes() {
        let mut ring = SampleRing::new(8);
        ring.push(&[1.0, 2.0]);
        ring.push(&[3.0]);
        let mut out = [0.0; 3];
        assert_eq!(ring.pop_into(&mut out), 3);
        assert_eq!(out, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_clear_discards_everything() {
        let mut ring = SampleRing::new(8);
        ring.push(&[1.0; 8]);
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.push(&[2.0; 8]), 8);
    }
}
