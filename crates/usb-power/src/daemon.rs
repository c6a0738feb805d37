//! The USB power daemon.
//!
//! A USB host may only be asked for 500 mA once it has enumerated the node;
//! a dumb charger never enumerates but can supply it anyway. The daemon
//! watches the power pin and the bus state, waits a grace period for
//! enumeration after power appears and switches the charger's current limit
//! accordingly.
//!
//! Three threads feed events into it: one watching the power pin, one
//! watching the USB controller and the enumeration timer. All of them go
//! through one lock, so events are handled one at a time in arrival order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use node_drivers::{
    DeepSleepInhibitor, Driver, DriverResult, InterruptWaitArbiter, TraceRecord, Tracer,
};
use node_hal::{Clock, HalError, InputPin, PowerRegulator, UsbBus, UsbBusState};
use parking_lot::Mutex;

use crate::config::UsbPowerConfig;
use crate::error::UsbPowerError;
use crate::state::{transition, PowerEvent, PowerState, TimerAction};
use crate::timer::EnumerationTimer;

/// Peripherals the daemon drives.
pub struct UsbPowerHardware {
    /// High while USB power is present.
    pub power_pin: Arc<dyn InputPin>,
    pub bus: Arc<dyn UsbBus>,
    pub regulator: Arc<dyn PowerRegulator>,
    /// Arbiter for the line both the pin and the USB controller raise.
    pub interrupts: Arc<InterruptWaitArbiter>,
    /// Node clock the enumeration grace period is measured on.
    pub clock: Arc<dyn Clock>,
}

struct RunningTimer {
    id: u64,
    timer: Arc<EnumerationTimer>,
}

struct DaemonState {
    current: PowerState,
    usb_powered: bool,
    bus_state: UsbBusState,
    timer: Option<RunningTimer>,
    next_timer_id: u64,
}

struct DaemonCore {
    config: UsbPowerConfig,
    hardware: UsbPowerHardware,
    tracer: Arc<Tracer>,
    state: Mutex<DaemonState>,
    started: AtomicBool,
    stopping: AtomicBool,
}

/// Driver negotiating the USB current limit.
///
/// Registered with the driver registry like any other driver, and as a
/// deep-sleep inhibitor with the sleep scheduler: the node must not power
/// down while a host is enumerating or using it.
#[derive(Clone)]
pub struct UsbPowerDaemon {
    core: Arc<DaemonCore>,
}

impl UsbPowerDaemon {
    pub fn new(config: UsbPowerConfig, hardware: UsbPowerHardware, tracer: Arc<Tracer>) -> Self {
        let state = DaemonState {
            current: PowerState::Unconnected,
            usb_powered: false,
            bus_state: UsbBusState::Reset,
            timer: None,
            next_timer_id: 0,
        };
        Self {
            core: Arc::new(DaemonCore {
                config,
                hardware,
                tracer,
                state: Mutex::new(state),
                started: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
            }),
        }
    }

    /// Sample the hardware and start the pin and bus threads.
    pub fn start(&self) -> Result<(), UsbPowerError> {
        if self.core.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.core.set_up()?;

        let core = Arc::clone(&self.core);
        thread::Builder::new()
            .name("usb-power-pin".into())
            .spawn(move || core.watch_power_pin())?;
        let core = Arc::clone(&self.core);
        thread::Builder::new()
            .name("usb-bus-state".into())
            .spawn(move || core.watch_bus())?;
        Ok(())
    }

    /// Feed one event through the state machine.
    pub fn process_event(&self, event: PowerEvent) {
        let mut state = self.core.state.lock();
        self.core.handle(&mut state, event);
    }

    pub fn state(&self) -> PowerState {
        self.core.state.lock().current
    }

    pub fn is_usb_powered(&self) -> bool {
        self.core.state.lock().usb_powered
    }

    pub fn is_usb_enumerated(&self) -> bool {
        self.state() == PowerState::Enumerated
    }

    /// True while a host application has the port open.
    pub fn is_usb_in_use(&self) -> bool {
        self.core.state.lock().bus_state == UsbBusState::Ready
    }

    pub fn is_timer_running(&self) -> bool {
        self.core.state.lock().timer.is_some()
    }

    #[cfg(test)]
    pub(crate) fn force_state(&self, state: PowerState) {
        self.core.state.lock().current = state;
    }
}

impl Driver for UsbPowerDaemon {
    fn name(&self) -> &str {
        "USB power daemon"
    }

    fn quiesce(&self) -> DriverResult<bool> {
        self.core.hardware.power_pin.release();
        Ok(true)
    }

    fn activate(&self) -> DriverResult<()> {
        self.core.set_up()
    }

    /// Stop handling events. The pin and bus threads leave at their next
    /// wake-up, or when the interrupt line is closed.
    fn finalize(&self) {
        self.core.stopping.store(true, Ordering::SeqCst);
        let mut state = self.core.state.lock();
        cancel_timer(&mut state);
    }
}

impl DeepSleepInhibitor for UsbPowerDaemon {
    fn inhibit_reason(&self) -> Option<String> {
        match self.state() {
            PowerState::AwaitingEnum | PowerState::Enumerated => {
                Some("USB connected".to_string())
            }
            PowerState::Unconnected | PowerState::OnBattery => None,
        }
    }
}

impl DaemonCore {
    /// Claim the pin and re-sample power and bus state, which may have
    /// changed while the node slept.
    fn set_up(self: &Arc<Self>) -> DriverResult<()> {
        let pin = &self.hardware.power_pin;
        pin.claim()?;
        let powered = pin.is_high()?;

        let mut state = self.state.lock();
        state.usb_powered = powered;
        if powered {
            let bus = self.hardware.bus.state()?;
            state.bus_state = bus;
            if bus.is_enumerated() {
                cancel_timer(&mut state);
                self.set_high_power(true, "enumerated at set-up");
                self.move_to(&mut state, PowerState::Enumerated, "set-up");
            } else if state.current == PowerState::OnBattery {
                // The regulator may not keep its setting across a power-down.
                self.set_high_power(true, "previously on battery");
            } else if state.current == PowerState::Unconnected {
                self.handle(&mut state, PowerEvent::PowerOn);
            } else if state.current == PowerState::Enumerated {
                // Host reset the bus while we slept.
                self.handle(&mut state, PowerEvent::Reset);
            }
        } else if state.current != PowerState::Unconnected {
            // Cable pulled out while asleep.
            self.handle(&mut state, PowerEvent::PowerOff);
        }
        drop(state);

        pin.enable_irq()?;
        Ok(())
    }

    fn handle(self: &Arc<Self>, state: &mut DaemonState, event: PowerEvent) {
        if self.stopping.load(Ordering::SeqCst) {
            log::debug!("ignoring USB power event {event} after finalize");
            return;
        }
        let Some(step) = transition(state.current, event) else {
            log::warn!("unexpected USB power event {event} in state {}", state.current);
            return;
        };

        match step.timer {
            TimerAction::Start => self.start_timer(state),
            TimerAction::Cancel => cancel_timer(state),
            TimerAction::Keep => {}
        }
        if let Some(high) = step.high_power {
            self.set_high_power(high, &event.to_string());
        }
        self.move_to(state, step.next, &event.to_string());
    }

    fn move_to(&self, state: &mut DaemonState, next: PowerState, cause: &str) {
        let from = state.current;
        state.current = next;
        self.tracer.emit(|| TraceRecord::Transition {
            machine: "usb-power",
            from: from.to_string(),
            event: cause.to_string(),
            to: next.to_string(),
        });
    }

    fn set_high_power(&self, high: bool, cause: &str) {
        let level = if high { "high" } else { "low" };
        log::info!("setting USB current limit to {level} power: {cause}");
        if let Err(error) = self.hardware.regulator.set_high_power(high) {
            log::error!("cannot set USB current limit to {level} power: {error}");
        }
    }

    fn start_timer(self: &Arc<Self>, state: &mut DaemonState) {
        cancel_timer(state);
        state.next_timer_id += 1;
        let id = state.next_timer_id;
        let core: Weak<Self> = Arc::downgrade(self);
        let clock = Arc::clone(&self.hardware.clock);

        log::debug!("starting USB enumeration timer");
        match EnumerationTimer::start(clock, self.config.enumeration_grace_ms, move || {
            if let Some(core) = core.upgrade() {
                core.timer_expired(id);
            }
        }) {
            Ok(timer) => state.timer = Some(RunningTimer { id, timer }),
            Err(error) => log::error!("cannot start USB enumeration timer: {error}"),
        }
    }

    fn timer_expired(self: &Arc<Self>, id: u64) {
        let mut state = self.state.lock();
        if state.timer.as_ref().map(|running| running.id) != Some(id) {
            // Cancelled while waiting for the lock.
            log::debug!("discarding stale USB enumeration timeout");
            return;
        }
        state.timer = None;
        self.handle(&mut state, PowerEvent::Timeout);
    }

    fn watch_power_pin(self: Arc<Self>) {
        let pin = &self.hardware.power_pin;
        let mask = pin.irq_mask();
        while !self.stopping.load(Ordering::SeqCst) {
            let sampled = pin.is_high();
            let changed = {
                let mut state = self.state.lock();
                match sampled {
                    Ok(powered) if powered != state.usb_powered => {
                        state.usb_powered = powered;
                        let event = if powered {
                            PowerEvent::PowerOn
                        } else {
                            PowerEvent::PowerOff
                        };
                        self.handle(&mut state, event);
                        true
                    }
                    _ => false,
                }
            };
            if changed {
                continue;
            }

            match self.hardware.interrupts.wait_for(mask) {
                Ok(_) => {}
                Err(HalError::Closed) => break,
                Err(error) => {
                    log::error!("USB power pin wait failed: {error}");
                    break;
                }
            }
            // Released while the node sleeps; activation re-enables it.
            if let Err(error) = pin.enable_irq() {
                log::debug!("USB power pin interrupt not re-enabled: {error}");
            }
        }
        log::debug!("USB power pin thread stopped");
    }

    fn watch_bus(self: Arc<Self>) {
        let mask = self.config.bus_irq_mask;
        while !self.stopping.load(Ordering::SeqCst) {
            match self.hardware.interrupts.wait_for(mask) {
                Ok(_) => {}
                Err(HalError::Closed) => break,
                Err(error) => {
                    log::error!("USB bus wait failed: {error}");
                    break;
                }
            }
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }

            let bus = match self.hardware.bus.state() {
                Ok(bus) => bus,
                Err(error) => {
                    log::warn!("cannot read USB bus state: {error}");
                    continue;
                }
            };
            let mut state = self.state.lock();
            if bus == state.bus_state {
                continue;
            }
            state.bus_state = bus;
            match bus_event(bus) {
                Some(event) => self.handle(&mut state, event),
                None => log::warn!("unexpected USB bus state {bus:?} in state {}", state.current),
            }
        }
        log::debug!("USB bus thread stopped");
    }
}

fn cancel_timer(state: &mut DaemonState) {
    if let Some(running) = state.timer.take() {
        running.timer.cancel();
    }
}

fn bus_event(bus: UsbBusState) -> Option<PowerEvent> {
    match bus {
        UsbBusState::Configured | UsbBusState::Ready => Some(PowerEvent::Enumerated),
        UsbBusState::Reset => Some(PowerEvent::Reset),
        UsbBusState::Other(_) => None,
    }
}
