//! Periodic relock timer for continuous-unlock doors.
//!
//! A thin generation-counted wrapper over a sleeping thread. Handles are
//! swapped atomically: starting a new timer bumps the shared generation,
//! which both invalidates any older thread at its next wake-up and tags
//! the new one. Cancel is idempotent and never joins.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

/// What one relock tick decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelockTick {
    /// Still inside normal hours; sleep another period.
    Rearm,
    /// The door was relocked (or the controller is gone); stop.
    Stop,
}

/// At most one live relock handle at a time.
#[derive(Debug, Default)]
pub struct RelockTimer {
    generation: Arc<AtomicU64>,
}

impl RelockTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate any previous handle and spawn a fresh periodic timer.
    /// `tick` runs once per `interval` until it returns
    /// [`RelockTick::Stop`] or the handle is superseded.
    pub fn start<F>(&self, interval: Duration, mut tick: F)
    where
        F: FnMut() -> RelockTick + Send + 'static,
    {
        let generation = Arc::clone(&self.generation);
        let handle = generation.fetch_add(1, Ordering::SeqCst) + 1;
        thread::spawn(move || {
            loop {
                thread::sleep(interval);
                if generation.load(Ordering::SeqCst) != handle {
                    return;
                }
                if tick() == RelockTick::Stop {
                    return;
                }
            }
        });
    }

    /// Invalidate the live handle, if any. Idempotent.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}
