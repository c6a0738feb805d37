//! The capability every peripheral controller implements.

use std::sync::Arc;

use node_hal::HalError;
use thiserror::Error;

/// Failure raised by a driver while quiescing or activating.
///
/// This is not a veto: a driver that merely cannot sleep right now returns
/// `Ok(false)` from [`Driver::quiesce`].
#[derive(Debug, Error)]
pub enum DriverFault {
    #[error(transparent)]
    Hal(#[from] HalError),
    #[error("{0}")]
    Failed(String),
}

pub type DriverResult<T> = Result<T, DriverFault>;

/// A peripheral controller taking part in deep sleep.
///
/// Drivers are quiesced in the reverse of their registration order and
/// activated in registration order, so drivers registered later may depend on
/// drivers registered earlier.
pub trait Driver: Send + Sync {
    /// Identifying name, e.g. `"AIC"`.
    fn name(&self) -> &str;

    /// Save state and release every resource claimed from other drivers.
    ///
    /// Returns `Ok(false)` to veto the deep sleep, for example while a
    /// transfer is in progress. Drivers quiesced earlier in the same pass are
    /// then reactivated.
    fn quiesce(&self) -> DriverResult<bool>;

    /// Reclaim resources, reinitialise the hardware and restore saved state.
    ///
    /// Called after a deep sleep and to undo a quiesce when another driver
    /// vetoed.
    fn activate(&self) -> DriverResult<()>;

    /// The process is about to exit.
    fn finalize(&self) {}
}

/// Shared handle to a registered driver. Identity is the allocation, not the name.
pub type DriverRef = Arc<dyn Driver>;

pub(crate) fn same_driver(a: &DriverRef, b: &DriverRef) -> bool {
    // Compare data pointers only; vtable pointers for one type may differ
    // between codegen units.
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Something that can forbid deep sleep for the time being without being a
/// driver veto, e.g. an attached USB host.
pub trait DeepSleepInhibitor: Send + Sync {
    /// `Some(reason)` while deep sleep must not be attempted.
    fn inhibit_reason(&self) -> Option<String>;
}
