use node_drivers::RegistryError;
use node_hal::{HalError, Millis};
use thiserror::Error;

/// Why a deep sleep was refused or did not happen.
#[derive(Debug, Error)]
pub enum UnableToDeepSleep {
    #[error("deep sleep is disabled")]
    Disabled,
    #[error("time specified ({requested} ms) is less than minimum deep sleep time of {minimum} ms")]
    BelowMinimum { requested: Millis, minimum: Millis },
    #[error("another thread will be runnable within {0} ms")]
    ThreadRunnable(Millis),
    #[error("driver {0} vetoed deep sleep")]
    Vetoed(String),
    #[error("cannot deep sleep: {0}")]
    Inhibited(String),
    #[error("not enough time left to power down (deadline {deadline}, now {now})")]
    InsufficientMargin { deadline: Millis, now: Millis },
    #[error(transparent)]
    Fault(#[from] RegistryError),
    #[error("power primitive failed: {0}")]
    Hardware(#[from] HalError),
    #[error("sleep interrupted")]
    Interrupted,
    #[error("no deep sleep happened during the requested interval")]
    NotSlept,
}

/// Returned by [`IdleMonitor::sleep`](crate::IdleMonitor::sleep) when a sleep
/// ended before its wake time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sleep interrupted")]
pub struct Interrupted;

impl From<Interrupted> for UnableToDeepSleep {
    fn from(_: Interrupted) -> Self {
        Self::Interrupted
    }
}
