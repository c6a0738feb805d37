//! Clock and power primitives

use crate::error::HalResult;

/// Milliseconds on the node's monotonic clock.
pub type Millis = u64;

/// Monotonic millisecond clock, readable from any thread.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> Millis;
}

/// Chip-level power primitives.
pub trait PowerControl: Send + Sync {
    /// Power the chip down until the absolute time `wake_at`.
    ///
    /// Suspends the whole process; all peripheral state is lost. Returns once
    /// execution resumes after the wake-up.
    fn power_down_until(&self, wake_at: Millis) -> HalResult<()>;

    /// Low-power idle until the absolute time `wake_at`. Driver and peripheral
    /// state is preserved.
    fn idle_until(&self, wake_at: Millis) -> HalResult<()>;
}
