//! Periodic tick thread with monotonic re-anchoring.
//!
//! Each deadline is `previous + period` rather than `now + period`, so
//! jitter does not accumulate; only when a tick overruns a whole period
//! does the schedule re-anchor to the present instead of bursting to
//! catch up.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use axle_traits::Clock;

pub struct Ticker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn spawn<F>(period: Duration, clock: Arc<dyn Clock + Send + Sync>, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_bg = stop.clone();
        let handle = thread::spawn(move || {
            let mut next = clock.now() + period;
            loop {
                if stop_bg.load(Ordering::Acquire) {
                    break;
                }
                let now = clock.now();
                if now < next {
                    // Sleeps may return short (or simulate); re-check the
                    // deadline instead of trusting the wakeup.
                    clock.sleep(next - now);
                    continue;
                }
                tick();
                next += period;
                let now = clock.now();
                if next < now {
                    next = now + period;
                }
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signal the thread and wait for it to exit. Any tick already running
    /// completes before this returns.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.halt();
    }
}
