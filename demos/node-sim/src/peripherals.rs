//! Simulated peripheral drivers registered alongside the USB daemon.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use node_drivers::{Driver, DriverResult};

/// Status LED; always happy to power down, remembers whether it was lit.
#[derive(Default)]
pub struct StatusLed {
    lit: AtomicBool,
    saved: AtomicBool,
}

impl StatusLed {
    pub fn set(&self, lit: bool) {
        self.lit.store(lit, Ordering::SeqCst);
    }
}

impl Driver for StatusLed {
    fn name(&self) -> &str {
        "status LED"
    }

    fn quiesce(&self) -> DriverResult<bool> {
        self.saved
            .store(self.lit.swap(false, Ordering::SeqCst), Ordering::SeqCst);
        Ok(true)
    }

    fn activate(&self) -> DriverResult<()> {
        self.lit
            .store(self.saved.load(Ordering::SeqCst), Ordering::SeqCst);
        Ok(())
    }
}

/// Radio that refuses to power down while frames are queued.
#[derive(Default)]
pub struct Radio {
    queued: AtomicU32,
}

impl Radio {
    pub fn queue_frame(&self) {
        self.queued.fetch_add(1, Ordering::SeqCst);
    }

    pub fn flush(&self) -> u32 {
        self.queued.swap(0, Ordering::SeqCst)
    }
}

impl Driver for Radio {
    fn name(&self) -> &str {
        "radio"
    }

    fn quiesce(&self) -> DriverResult<bool> {
        let queued = self.queued.load(Ordering::SeqCst);
        if queued > 0 {
            log::debug!("radio has {queued} frames queued");
            return Ok(false);
        }
        Ok(true)
    }

    fn activate(&self) -> DriverResult<()> {
        Ok(())
    }

    fn finalize(&self) {
        let dropped = self.flush();
        if dropped > 0 {
            log::warn!("radio dropped {dropped} queued frames at exit");
        }
    }
}
