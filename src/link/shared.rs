//! State shared between a link worker and its consumer

use crate::devices::ScanFrame;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Single-slot handoff of complete scan frames
///
/// The worker writes a whole frame under the lock before raising the ready
/// flag; the consumer swaps the frame out under the same lock, so a reader
/// never observes a partially written buffer.
pub struct ScanSlot {
    frame: Mutex<ScanFrame>,
    ready: AtomicBool,
}

impl ScanSlot {
    pub fn new(resolution: usize) -> Self {
        Self {
            frame: Mutex::new(ScanFrame::new(resolution)),
            ready: AtomicBool::new(false),
        }
    }

    /// Publish a complete frame (worker side)
    pub fn publish(&self, frame: &ScanFrame) {
        self.frame.lock().clone_from(frame);
        self.ready.store(true, Ordering::Release);
    }

    /// Swap the latest frame into `into` if one was published since the last take
    pub fn take(&self, into: &mut ScanFrame) -> bool {
        if !self.ready.swap(false, Ordering::Acquire) {
            return false;
        }
        std::mem::swap(&mut *self.frame.lock(), into);
        true
    }

    pub fn has_new(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Drop any pending frame
    pub fn discard(&self) {
        self.ready.store(false, Ordering::Release);
    }
}

/// Watchdog timer in microseconds
///
/// Advanced by the consumer tick, reset by the worker every loop cycle.
#[derive(Default)]
pub struct InactivityTimer {
    micros: AtomicU64,
}

impl InactivityTimer {
    pub fn advance(&self, dt_secs: f32) {
        let us = (dt_secs.max(0.0) * 1_000_000.0) as u64;
        self.micros.fetch_add(us, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.micros.store(0, Ordering::Relaxed);
    }

    pub fn elapsed_secs(&self) -> f32 {
        self.micros.load(Ordering::Relaxed) as f32 / 1_000_000.0
    }
}

/// Everything one worker thread shares with its `SensorLink`
pub struct LinkShared {
    pub slot: ScanSlot,
    pub inactivity: InactivityTimer,
    pub stop: AtomicBool,
    pub frames: AtomicU64,
    pub dropped_frames: AtomicU64,
}

impl LinkShared {
    pub fn new(resolution: usize) -> Self {
        Self {
            slot: ScanSlot::new(resolution),
            inactivity: InactivityTimer::default(),
            stop: AtomicBool::new(false),
            frames: AtomicU64::new(0),
            dropped_frames: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_take_is_read_and_clear() {
        let slot = ScanSlot::new(4);
        let mut frame = ScanFrame::new(4);
        assert!(!slot.take(&mut frame));

        let mut published = ScanFrame::new(4);
        published.distances[2] = 1500;
        slot.publish(&published);

        assert!(slot.has_new());
        assert!(slot.take(&mut frame));
        assert_eq!(frame.distances[2], 1500);
        assert!(!slot.take(&mut frame));
    }

    #[test]
    fn test_frames_never_torn() {
        let slot = Arc::new(ScanSlot::new(512));
        let writer = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                let mut frame = ScanFrame::new(512);
                for value in 1..=200u32 {
                    frame.distances.fill(value);
                    slot.publish(&frame);
                }
            })
        };

        let mut frame = ScanFrame::new(512);
        for _ in 0..2000 {
            if slot.take(&mut frame) {
                let first = frame.distances[0];
                assert!(frame.distances.iter().all(|&d| d == first));
            }
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_inactivity_timer() {
        let timer = InactivityTimer::default();
        timer.advance(0.5);
        timer.advance(0.25);
        assert_relative_eq!(timer.elapsed_secs(), 0.75, epsilon = 1e-5);
        timer.reset();
        assert_eq!(timer.elapsed_secs(), 0.0);
    }
}
