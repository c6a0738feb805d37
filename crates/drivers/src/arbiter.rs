//! Sharing one blocking interrupt wait between many threads.
//!
//! Each interrupt line may only have one thread inside
//! [`InterruptLine::block_until_interrupt`] at a time, otherwise the waiters
//! race on the enable/disable bits. The arbiter hands an ownership token to the
//! first thread that needs to wait. The owner makes the single blocking call
//! for the whole source, records every bit that fired, clears the token and
//! wakes everybody parked on it. Each thread then re-checks its own bits and
//! either returns or queues up again.
//!
//! Fired bits are recorded before the token is cleared and parked threads test
//! a released flag under the token's own lock, so a wake-up that lands between
//! a thread's check and its wait is never lost.

use core::fmt;
use std::sync::Arc;

use node_hal::{HalError, HalResult, InterruptLine, IrqMask};
use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct OwnershipToken {
    released: Mutex<bool>,
    wake: Condvar,
}

impl OwnershipToken {
    fn wait(&self) {
        let mut released = self.released.lock();
        while !*released {
            self.wake.wait(&mut released);
        }
    }

    fn release(&self) {
        *self.released.lock() = true;
        self.wake.notify_all();
    }
}

#[derive(Default)]
struct ArbiterState {
    owner: Option<Arc<OwnershipToken>>,
    outstanding: IrqMask,
}

/// Arbitrates waits on one interrupt source.
pub struct InterruptWaitArbiter {
    line: Arc<dyn InterruptLine>,
    source_mask: IrqMask,
    state: Mutex<ArbiterState>,
    #[cfg(test)]
    park_hook: Mutex<Option<Box<dyn Fn() + Send>>>,
}

impl InterruptWaitArbiter {
    /// Arbiter for the bits of `source_mask` on `line`.
    pub fn new(line: Arc<dyn InterruptLine>, source_mask: IrqMask) -> Self {
        Self {
            line,
            source_mask,
            state: Mutex::new(ArbiterState::default()),
            #[cfg(test)]
            park_hook: Mutex::new(None),
        }
    }

    pub fn source_mask(&self) -> IrqMask {
        self.source_mask
    }

    /// Bits that fired and have not been consumed yet.
    pub fn outstanding(&self) -> IrqMask {
        self.state.lock().outstanding
    }

    /// True while some thread is inside the blocking call.
    pub fn is_owned(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    /// Wait until any bit of `bits` fires and return the bits that did.
    ///
    /// Returned bits are consumed: a fired bit satisfies one waiter. Fails
    /// with [`HalError::InvalidParameter`] if `bits` selects nothing of the
    /// arbitrated source, since such a wait could never finish.
    pub fn wait_for(&self, bits: IrqMask) -> HalResult<IrqMask> {
        let bits = bits & self.source_mask;
        if bits == 0 {
            return Err(HalError::InvalidParameter(
                "wait mask selects no bit of the arbitrated source",
            ));
        }
        loop {
            let token = {
                let mut state = self.state.lock();
                let fired = state.outstanding & bits;
                if fired != 0 {
                    state.outstanding &= !fired;
                    return Ok(fired);
                }
                if let Some(token) = state.owner.clone() {
                    drop(state);
                    self.before_park();
                    token.wait();
                    continue;
                }
                let token = Arc::new(OwnershipToken::default());
                state.owner = Some(Arc::clone(&token));
                token
            };

            let result = self.line.block_until_interrupt(self.source_mask);
            {
                let mut state = self.state.lock();
                if let Ok(fired) = result {
                    state.outstanding |= fired;
                }
                state.owner = None;
            }
            token.release();
            result?;
        }
    }

    /// Wait for any bit of the source.
    pub fn wait_any(&self) -> HalResult<IrqMask> {
        self.wait_for(self.source_mask)
    }

    /// Run `hook` on a non-owner after it has taken the token and before it
    /// parks on it.
    #[cfg(test)]
    pub(crate) fn set_park_hook(&self, hook: impl Fn() + Send + 'static) {
        *self.park_hook.lock() = Some(Box::new(hook));
    }

    #[cfg(test)]
    fn before_park(&self) {
        if let Some(hook) = self.park_hook.lock().as_ref() {
            hook();
        }
    }

    #[cfg(not(test))]
    fn before_park(&self) {}
}

impl fmt::Debug for InterruptWaitArbiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("InterruptWaitArbiter")
            .field("source_mask", &format_args!("{:#010x}", self.source_mask))
            .field("outstanding", &format_args!("{:#010x}", state.outstanding))
            .field("owned", &state.owner.is_some())
            .finish()
    }
}
