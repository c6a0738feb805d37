//! Blocking interrupt wait

use crate::error::HalResult;

/// Bit mask of interrupt sources. Each bit is one source the line can raise.
pub type IrqMask = u32;

/// A hardware interrupt line that a thread can block on.
///
/// Exactly one thread per source should be inside
/// [`block_until_interrupt`](InterruptLine::block_until_interrupt) at a time;
/// the driver crate's `InterruptWaitArbiter` enforces that.
pub trait InterruptLine: Send + Sync {
    /// Block the calling thread until any source in `mask` fires.
    ///
    /// Returns the subset of `mask` that fired. Returns immediately when a bit
    /// is already latched pending. Latched bits are cleared by the call.
    fn block_until_interrupt(&self, mask: IrqMask) -> HalResult<IrqMask>;
}
