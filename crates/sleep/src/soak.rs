//! Holding application threads back while the hardware is mid-transition.
//!
//! While the scheduler quiesces, powers down and reactivates, no application
//! thread may run. Engaging the gate makes every thread that passes through it
//! block until the guard is dropped; the scheduler's own thread and driver
//! threads never pass through it.

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
pub struct SoakGate {
    engaged: Mutex<bool>,
    released: Condvar,
}

impl SoakGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the gate until the returned guard is dropped.
    pub fn engage(&self) -> SoakGuard<'_> {
        *self.engaged.lock() = true;
        SoakGuard { gate: self }
    }

    pub fn is_engaged(&self) -> bool {
        *self.engaged.lock()
    }

    /// Return immediately when open, otherwise block until it opens.
    pub fn pass(&self) {
        let mut engaged = self.engaged.lock();
        while *engaged {
            self.released.wait(&mut engaged);
        }
    }

    fn release(&self) {
        *self.engaged.lock() = false;
        self.released.notify_all();
    }
}

#[must_use = "the gate reopens as soon as the guard is dropped"]
pub struct SoakGuard<'a> {
    gate: &'a SoakGate,
}

impl Drop for SoakGuard<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn open_gate_does_not_block() {
        let gate = SoakGate::new();
        gate.pass();
        assert!(!gate.is_engaged());
    }

    #[test]
    fn engaged_gate_holds_threads_until_guard_drops() {
        let gate = Arc::new(SoakGate::new());
        let passed = Arc::new(AtomicBool::new(false));

        let guard = gate.engage();
        let worker = {
            let gate = Arc::clone(&gate);
            let passed = Arc::clone(&passed);
            thread::spawn(move || {
                gate.pass();
                passed.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(30));
        assert!(!passed.load(Ordering::SeqCst));

        drop(guard);
        worker.join().unwrap();
        assert!(passed.load(Ordering::SeqCst));
    }
}
