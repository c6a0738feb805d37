//! Simulated peripherals for host builds and tests.
//!
//! The simulated clock can either follow wall time (`SimClock::running`) or
//! stay frozen until advanced explicitly (`SimClock::manual`). Power-down and
//! idle jump the clock forward to the requested wake time, so a simulated node
//! sleeps for hours in microseconds.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::error::{HalError, HalResult};
use crate::gpio::{InputPin, Level};
use crate::interrupt::{InterruptLine, IrqMask};
use crate::power::{Clock, Millis, PowerControl};
use crate::usb::{PowerRegulator, UsbBus, UsbBusState};

/// Millisecond clock whose value can be pushed forward.
#[derive(Debug)]
pub struct SimClock {
    origin: Option<Instant>,
    offset: AtomicU64,
}

impl SimClock {
    /// Clock frozen at `start`; only [`advance`](Self::advance) moves it.
    pub fn manual(start: Millis) -> Arc<Self> {
        Arc::new(Self {
            origin: None,
            offset: AtomicU64::new(start),
        })
    }

    /// Clock that follows wall time from zero, plus any simulated jumps.
    pub fn running() -> Arc<Self> {
        Arc::new(Self {
            origin: Some(Instant::now()),
            offset: AtomicU64::new(0),
        })
    }

    pub fn advance(&self, millis: Millis) {
        self.offset.fetch_add(millis, Ordering::SeqCst);
    }

    /// Jump forward to `target`; never moves the clock backwards.
    pub fn advance_to(&self, target: Millis) {
        let now = self.now_millis();
        if target > now {
            self.advance(target - now);
        }
    }
}

impl Clock for SimClock {
    fn now_millis(&self) -> Millis {
        let elapsed = self
            .origin
            .map(|origin| origin.elapsed().as_millis() as Millis)
            .unwrap_or(0);
        self.offset.load(Ordering::SeqCst) + elapsed
    }
}

/// Which primitive a [`SimPower`] call used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerCall {
    PowerDown(Millis),
    Idle(Millis),
}

/// Power primitives that jump a [`SimClock`] to the wake time.
pub struct SimPower {
    clock: Arc<SimClock>,
    calls: Mutex<Vec<PowerCall>>,
    fail_power_down: Mutex<Option<HalError>>,
}

impl SimPower {
    pub fn new(clock: Arc<SimClock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            calls: Mutex::new(Vec::new()),
            fail_power_down: Mutex::new(None),
        })
    }

    /// Every primitive invoked so far, in call order.
    pub fn calls(&self) -> Vec<PowerCall> {
        self.calls.lock().clone()
    }

    pub fn power_down_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, PowerCall::PowerDown(_)))
            .count()
    }

    pub fn idle_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, PowerCall::Idle(_)))
            .count()
    }

    /// Make the next power-down fail with `error` without sleeping.
    pub fn fail_next_power_down(&self, error: HalError) {
        *self.fail_power_down.lock() = Some(error);
    }
}

impl PowerControl for SimPower {
    fn power_down_until(&self, wake_at: Millis) -> HalResult<()> {
        self.calls.lock().push(PowerCall::PowerDown(wake_at));
        if let Some(error) = self.fail_power_down.lock().take() {
            return Err(error);
        }
        self.clock.advance_to(wake_at);
        Ok(())
    }

    fn idle_until(&self, wake_at: Millis) -> HalResult<()> {
        self.calls.lock().push(PowerCall::Idle(wake_at));
        self.clock.advance_to(wake_at);
        Ok(())
    }
}

#[derive(Default)]
struct LineState {
    pending: IrqMask,
    closed: bool,
    in_flight: usize,
}

/// Interrupt line whose sources are raised by test code or simulated pins.
#[derive(Default)]
pub struct SimInterruptLine {
    state: Mutex<LineState>,
    fired: Condvar,
    calls: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SimInterruptLine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Latch `mask` pending and wake the blocked caller, if any.
    pub fn raise(&self, mask: IrqMask) {
        let mut state = self.state.lock();
        state.pending |= mask;
        self.fired.notify_all();
    }

    /// Fail every current and future wait with [`HalError::Closed`].
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.fired.notify_all();
    }

    /// Number of blocking calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of threads currently inside the blocking call.
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// Highest number of threads ever blocked in the call at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl InterruptLine for SimInterruptLine {
    fn block_until_interrupt(&self, mask: IrqMask) -> HalResult<IrqMask> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        state.in_flight += 1;
        self.max_in_flight
            .fetch_max(state.in_flight, Ordering::SeqCst);

        while state.pending & mask == 0 && !state.closed {
            self.fired.wait(&mut state);
        }
        state.in_flight -= 1;

        if state.pending & mask == 0 {
            return Err(HalError::Closed);
        }
        let fired = state.pending & mask;
        state.pending &= !mask;
        Ok(fired)
    }
}

/// Input pin wired to a [`SimInterruptLine`]; edges raise its mask when unmasked.
pub struct SimPin {
    line: Arc<SimInterruptLine>,
    mask: IrqMask,
    level: Mutex<bool>,
    claimed: AtomicBool,
    irq_enabled: AtomicBool,
}

impl SimPin {
    pub fn new(line: Arc<SimInterruptLine>, mask: IrqMask) -> Arc<Self> {
        Arc::new(Self {
            line,
            mask,
            level: Mutex::new(false),
            claimed: AtomicBool::new(false),
            irq_enabled: AtomicBool::new(false),
        })
    }

    /// Drive the pin from outside; an edge raises the line when unmasked.
    pub fn set_high(&self, high: bool) {
        let mut level = self.level.lock();
        if *level != high {
            *level = high;
            if self.irq_enabled.load(Ordering::SeqCst) {
                self.line.raise(self.mask);
            }
        }
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }

    pub fn is_irq_enabled(&self) -> bool {
        self.irq_enabled.load(Ordering::SeqCst)
    }
}

impl InputPin for SimPin {
    fn claim(&self) -> HalResult<()> {
        if self.claimed.swap(true, Ordering::SeqCst) {
            return Err(HalError::AlreadyClaimed(self.mask));
        }
        Ok(())
    }

    fn release(&self) {
        self.irq_enabled.store(false, Ordering::SeqCst);
        self.claimed.store(false, Ordering::SeqCst);
    }

    fn read(&self) -> HalResult<Level> {
        Ok(Level::from(*self.level.lock()))
    }

    fn enable_irq(&self) -> HalResult<()> {
        if !self.is_claimed() {
            return Err(HalError::NotClaimed(self.mask));
        }
        self.irq_enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disable_irq(&self) {
        self.irq_enabled.store(false, Ordering::SeqCst);
    }

    fn irq_mask(&self) -> IrqMask {
        self.mask
    }
}

/// USB controller whose state changes raise its interrupt source.
pub struct SimUsbBus {
    line: Arc<SimInterruptLine>,
    mask: IrqMask,
    state: Mutex<UsbBusState>,
}

impl SimUsbBus {
    pub fn new(line: Arc<SimInterruptLine>, mask: IrqMask) -> Arc<Self> {
        Arc::new(Self {
            line,
            mask,
            state: Mutex::new(UsbBusState::Reset),
        })
    }

    pub fn set_state(&self, state: UsbBusState) {
        *self.state.lock() = state;
        self.line.raise(self.mask);
    }
}

impl UsbBus for SimUsbBus {
    fn state(&self) -> HalResult<UsbBusState> {
        Ok(*self.state.lock())
    }
}

/// Regulator that remembers every current-limit change.
#[derive(Default)]
pub struct SimRegulator {
    history: Mutex<Vec<bool>>,
}

impl SimRegulator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_high_power(&self) -> bool {
        self.history.lock().last().copied().unwrap_or(false)
    }

    /// Every `set_high_power` argument, oldest first.
    pub fn history(&self) -> Vec<bool> {
        self.history.lock().clone()
    }
}

impl PowerRegulator for SimRegulator {
    fn set_high_power(&self, high: bool) -> HalResult<()> {
        self.history.lock().push(high);
        Ok(())
    }
}
