//! One-shot cancellable timer for the enumeration grace period.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use node_hal::{Clock, Millis};
use parking_lot::{Condvar, Mutex};

/// Longest stretch the timer thread waits before re-reading the node clock,
/// which can jump forward over a sleep.
const CLOCK_POLL_MS: Millis = 50;

/// Runs a callback on its own thread once `grace` ms of node time have
/// elapsed, unless cancelled first.
///
/// Cancelling after the timer has fired cannot stop a callback that is
/// already running; callers that care must check for stale expirations.
#[derive(Debug, Default)]
pub struct EnumerationTimer {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl EnumerationTimer {
    pub fn start<F>(clock: Arc<dyn Clock>, grace: Millis, on_expiry: F) -> io::Result<Arc<Self>>
    where
        F: FnOnce() + Send + 'static,
    {
        let timer = Arc::new(Self::default());
        let waiter = Arc::clone(&timer);
        let deadline = clock.now_millis().saturating_add(grace);
        thread::Builder::new()
            .name("usb-enum-timer".into())
            .spawn(move || {
                if waiter.wait(clock.as_ref(), deadline) {
                    on_expiry();
                }
            })?;
        Ok(timer)
    }

    pub fn cancel(&self) {
        *self.cancelled.lock() = true;
        self.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock()
    }

    /// True if the clock reached `deadline` without a cancel.
    fn wait(&self, clock: &dyn Clock, deadline: Millis) -> bool {
        let mut cancelled = self.cancelled.lock();
        loop {
            if *cancelled {
                return false;
            }
            let now = clock.now_millis();
            if now >= deadline {
                return true;
            }
            let slice = (deadline - now).min(CLOCK_POLL_MS);
            self.wake
                .wait_for(&mut cancelled, Duration::from_millis(slice));
        }
    }
}
