//! The sleep scheduler.
//!
//! Whenever every application thread is asleep the scheduler decides between a
//! shallow sleep, which leaves the drivers alone, and a deep sleep, which
//! quiesces every driver and powers the chip down. A deep sleep is only
//! attempted when the idle period covers the tear-down and set-up budgets plus
//! the fixed platform overheads. Both budgets ratchet upwards whenever a
//! measured phase overruns them.

use core::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use node_drivers::{DeepSleepInhibitor, DriverRegistry, TraceRecord, Tracer};
use node_hal::{Clock, Millis, PowerControl};
use parking_lot::Mutex;

use crate::budget::SleepBudget;
use crate::config::SleepConfig;
use crate::error::UnableToDeepSleep;
use crate::idle::IdleMonitor;
use crate::soak::SoakGate;
use crate::stats::SleepStatistics;

/// What one call to [`SleepScheduler::run_cycle`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The wake time had passed before a decision was made.
    Skipped,
    /// Deep sleep was not possible; the node slept shallowly instead.
    Shallow { reason: String },
    /// Deep sleep was not possible and the failure went to the
    /// `ensure_deep_sleep` caller instead of sleeping.
    Abandoned { reason: String },
    /// Drivers were quiesced, the chip slept for `slept` ms and every driver
    /// was reactivated.
    Deep { slept: Millis, simulated: bool },
}

struct SchedulerState {
    budget: SleepBudget,
    enabled: bool,
    diagnostic: bool,
    deep_sleep_count: u32,
    total_deep_sleep: Millis,
    total_simulated_deep_sleep: Millis,
    total_shallow_sleep: Millis,
    start_time: Millis,
    ensure_waiter: Option<ThreadId>,
    fault: Option<UnableToDeepSleep>,
}

/// Builder for [`SleepScheduler`].
pub struct SleepSchedulerBuilder {
    config: SleepConfig,
    registry: Arc<DriverRegistry>,
    clock: Arc<dyn Clock>,
    power: Arc<dyn PowerControl>,
    idle: Arc<dyn IdleMonitor>,
    soak: Option<Arc<SoakGate>>,
    inhibitors: Vec<Arc<dyn DeepSleepInhibitor>>,
    diagnostic: bool,
}

impl SleepSchedulerBuilder {
    pub fn config(mut self, config: SleepConfig) -> Self {
        self.config = config;
        self
    }

    /// Gate application threads pass through when they wake. Should be the
    /// one the idle monitor uses.
    pub fn soak_gate(mut self, soak: Arc<SoakGate>) -> Self {
        self.soak = Some(soak);
        self
    }

    pub fn inhibitor(mut self, inhibitor: Arc<dyn DeepSleepInhibitor>) -> Self {
        self.inhibitors.push(inhibitor);
        self
    }

    pub fn diagnostic_mode(mut self, enabled: bool) -> Self {
        self.diagnostic = enabled;
        self
    }

    pub fn build(self) -> SleepScheduler {
        let tracer = self.registry.tracer();
        if self.diagnostic {
            tracer.set_enabled(true);
        }
        let state = SchedulerState {
            budget: self.config.initial_budget(),
            enabled: false,
            diagnostic: self.diagnostic,
            deep_sleep_count: 0,
            total_deep_sleep: 0,
            total_simulated_deep_sleep: 0,
            total_shallow_sleep: 0,
            start_time: self.clock.now_millis(),
            ensure_waiter: None,
            fault: None,
        };
        SleepScheduler {
            config: self.config,
            registry: self.registry,
            tracer,
            clock: self.clock,
            power: self.power,
            idle: self.idle,
            soak: self.soak.unwrap_or_default(),
            inhibitors: Mutex::new(self.inhibitors),
            state: Mutex::new(state),
            ensure_lock: Mutex::new(()),
            worker: Mutex::new(None),
            shutdown: AtomicBool::new(false),
        }
    }
}

/// Decides between shallow and deep sleep and drives the registry through
/// each deep-sleep cycle.
pub struct SleepScheduler {
    config: SleepConfig,
    registry: Arc<DriverRegistry>,
    tracer: Arc<Tracer>,
    clock: Arc<dyn Clock>,
    power: Arc<dyn PowerControl>,
    idle: Arc<dyn IdleMonitor>,
    soak: Arc<SoakGate>,
    inhibitors: Mutex<Vec<Arc<dyn DeepSleepInhibitor>>>,
    state: Mutex<SchedulerState>,
    ensure_lock: Mutex<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shutdown: AtomicBool,
}

impl SleepScheduler {
    pub fn builder(
        registry: Arc<DriverRegistry>,
        clock: Arc<dyn Clock>,
        power: Arc<dyn PowerControl>,
        idle: Arc<dyn IdleMonitor>,
    ) -> SleepSchedulerBuilder {
        SleepSchedulerBuilder {
            config: SleepConfig::default(),
            registry,
            clock,
            power,
            idle,
            soak: None,
            inhibitors: Vec::new(),
            diagnostic: false,
        }
    }

    pub fn config(&self) -> &SleepConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<DriverRegistry> {
        &self.registry
    }

    pub fn add_inhibitor(&self, inhibitor: Arc<dyn DeepSleepInhibitor>) {
        self.inhibitors.lock().push(inhibitor);
    }

    /// Enable deep sleep and start the scheduler thread.
    pub fn start(self: &Arc<Self>) -> io::Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        {
            let mut state = self.state.lock();
            state.enabled = true;
            state.start_time = self.clock.now_millis();
        }
        let scheduler = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("sleep-scheduler".into())
            .spawn(move || scheduler.run())?;
        *worker = Some(handle);
        Ok(())
    }

    /// Stop the scheduler thread and log the statistics.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        self.idle.shutdown();
        let worker = self.worker.lock().take();
        if let Some(handle) = worker {
            if handle.join().is_err() {
                log::error!("sleep scheduler thread panicked");
            }
        }
        log::info!("sleep scheduler statistics:\n{}", self.statistics());
    }

    fn run(&self) {
        log::debug!("sleep scheduler running");
        while !self.shutdown.load(Ordering::SeqCst) {
            let Some(target) = self.idle.wait_for_idle() else {
                break;
            };
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            let remaining = target.saturating_sub(self.clock.now_millis());
            if self.is_deep_sleep_enabled() && remaining >= self.idle_threshold() {
                let _soak = self.soak.engage();
                self.run_cycle(target);
            } else {
                self.shallow_sleep(target, "idle period too short for deep sleep");
            }
            self.idle.notify_resumed();
        }
        log::debug!("sleep scheduler stopped");
    }

    /// Try to deep sleep so that the application runs again at `target_wake`.
    ///
    /// Any failure falls back to a shallow sleep until `target_wake`, unless an
    /// [`ensure_deep_sleep`](Self::ensure_deep_sleep) caller is waiting, in
    /// which case the failure is handed to that caller and the node does not
    /// sleep.
    pub fn run_cycle(&self, target_wake: Millis) -> CycleOutcome {
        let now = self.clock.now_millis();
        self.tracer.emit(|| TraceRecord::SleepRequested {
            wake_at: target_wake,
            now,
        });
        if now >= target_wake {
            self.tracer.emit(|| TraceRecord::SleepSkipped {
                wake_at: target_wake,
                now,
            });
            return CycleOutcome::Skipped;
        }

        match self.deep_sleep(target_wake) {
            Ok(outcome) => outcome,
            Err(error) => self.deep_sleep_failed(target_wake, error),
        }
    }

    fn deep_sleep(&self, target_wake: Millis) -> Result<CycleOutcome, UnableToDeepSleep> {
        let (enabled, diagnostic, budget) = {
            let state = self.state.lock();
            (state.enabled, state.diagnostic, state.budget)
        };
        if !enabled {
            return Err(UnableToDeepSleep::Disabled);
        }

        let tear_down_start = self.clock.now_millis();
        let deadline = self.config.power_down_deadline(target_wake, &budget);
        if tear_down_start >= deadline {
            return Err(UnableToDeepSleep::InsufficientMargin {
                deadline,
                now: tear_down_start,
            });
        }
        if !diagnostic {
            if let Some(reason) = self.inhibit_reason() {
                return Err(UnableToDeepSleep::Inhibited(reason));
            }
        }

        if !self.registry.quiesce_all()? {
            let driver = self.registry.last_veto().unwrap_or_default();
            return Err(UnableToDeepSleep::Vetoed(driver));
        }
        let sleep_start = self.clock.now_millis();
        self.record_tear_down(sleep_start.saturating_sub(tear_down_start));

        if sleep_start >= deadline {
            self.registry.activate_all()?;
            return Err(UnableToDeepSleep::InsufficientMargin {
                deadline,
                now: sleep_start,
            });
        }

        self.tracer.emit(|| TraceRecord::DeepSleep {
            until: deadline,
            simulated: diagnostic,
        });
        let powered = if diagnostic {
            self.power.idle_until(deadline)
        } else {
            self.power.power_down_until(deadline)
        };
        if let Err(error) = powered {
            self.registry.activate_all()?;
            return Err(error.into());
        }

        let set_up_start = self.clock.now_millis();
        let slept = set_up_start.saturating_sub(sleep_start);
        self.tracer.emit(|| TraceRecord::Resumed { at: set_up_start });
        self.registry.activate_all()?;
        self.record_set_up(self.clock.now_millis().saturating_sub(set_up_start));

        let mut state = self.state.lock();
        state.deep_sleep_count += 1;
        state.total_deep_sleep += slept;
        if diagnostic {
            state.total_simulated_deep_sleep += slept;
        }
        Ok(CycleOutcome::Deep {
            slept,
            simulated: diagnostic,
        })
    }

    fn deep_sleep_failed(&self, target_wake: Millis, error: UnableToDeepSleep) -> CycleOutcome {
        let reason = error.to_string();
        match &error {
            UnableToDeepSleep::Fault(_) | UnableToDeepSleep::Hardware(_) => {
                log::error!("deep sleep failed: {reason}");
            }
            // The registry has already warned about the veto.
            _ => log::debug!("unable to deep sleep: {reason}"),
        }

        let waiter = {
            let mut state = self.state.lock();
            let waiter = state.ensure_waiter;
            if waiter.is_some() {
                state.fault = Some(error);
            }
            waiter
        };
        if let Some(thread) = waiter {
            self.idle.interrupt(thread);
            return CycleOutcome::Abandoned { reason };
        }

        self.shallow_sleep(target_wake, &reason);
        CycleOutcome::Shallow { reason }
    }

    fn shallow_sleep(&self, until: Millis, reason: &str) {
        let start = self.clock.now_millis();
        if start >= until {
            return;
        }
        self.tracer.emit(|| TraceRecord::ShallowSleep {
            until,
            reason: reason.to_string(),
        });
        if let Err(error) = self.power.idle_until(until) {
            log::error!("shallow sleep failed: {error}");
        }
        let slept = self.clock.now_millis().saturating_sub(start);
        self.state.lock().total_shallow_sleep += slept;
    }

    fn inhibit_reason(&self) -> Option<String> {
        self.inhibitors
            .lock()
            .iter()
            .find_map(|inhibitor| inhibitor.inhibit_reason())
    }

    fn record_tear_down(&self, measured: Millis) {
        let raised = self
            .state
            .lock()
            .budget
            .record_tear_down(measured, self.config.ratchet_margin_percent);
        self.trace_phase("tear down", measured, raised);
    }

    fn record_set_up(&self, measured: Millis) {
        let raised = self
            .state
            .lock()
            .budget
            .record_set_up(measured, self.config.ratchet_margin_percent);
        self.trace_phase("set up", measured, raised);
    }

    fn trace_phase(&self, phase: &'static str, millis: Millis, raised: Option<Millis>) {
        self.tracer
            .emit(|| TraceRecord::PhaseMeasured { phase, millis });
        if let Some(budget) = raised {
            self.tracer
                .emit(|| TraceRecord::BudgetRaised { phase, budget });
        }
    }

    /// Block the calling thread for `duration` ms and guarantee a deep sleep
    /// happened meanwhile.
    ///
    /// Fails without blocking if deep sleep is disabled, if `duration` is
    /// below [`minimum_deep_sleep_time`](Self::minimum_deep_sleep_time) or if
    /// another thread will be runnable sooner. Fails after blocking with the
    /// veto or fault that prevented the deep sleep, or with
    /// [`UnableToDeepSleep::NotSlept`] if none is known. Concurrent callers
    /// are served one at a time.
    pub fn ensure_deep_sleep(&self, duration: Millis) -> Result<(), UnableToDeepSleep> {
        let _serial = self.ensure_lock.lock();
        if !self.is_deep_sleep_enabled() {
            return Err(UnableToDeepSleep::Disabled);
        }
        let minimum = self.minimum_deep_sleep_time();
        if duration < minimum {
            return Err(UnableToDeepSleep::BelowMinimum {
                requested: duration,
                minimum,
            });
        }
        let runnable_in = self.idle.time_until_runnable();
        if runnable_in < duration {
            return Err(UnableToDeepSleep::ThreadRunnable(runnable_in));
        }

        let count_before = {
            let mut state = self.state.lock();
            state.ensure_waiter = Some(thread::current().id());
            state.fault = None;
            state.deep_sleep_count
        };
        let slept = self.idle.sleep(duration);
        let (fault, count_after) = {
            let mut state = self.state.lock();
            state.ensure_waiter = None;
            (state.fault.take(), state.deep_sleep_count)
        };

        if let Some(fault) = fault {
            return Err(fault);
        }
        slept?;
        if count_after == count_before {
            return Err(UnableToDeepSleep::NotSlept);
        }
        Ok(())
    }

    pub fn enable_deep_sleep(&self, enabled: bool) {
        self.state.lock().enabled = enabled;
    }

    pub fn is_deep_sleep_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn deep_sleep_count(&self) -> u32 {
        self.state.lock().deep_sleep_count
    }

    pub fn budget(&self) -> SleepBudget {
        self.state.lock().budget
    }

    /// Shortest idle period that triggers a deep-sleep attempt.
    pub fn idle_threshold(&self) -> Millis {
        self.config.idle_threshold(&self.budget())
    }

    pub fn minimum_deep_sleep_time(&self) -> Millis {
        self.config.minimum_deep_sleep_time(&self.budget())
    }

    pub fn maximum_shallow_sleep_time(&self) -> Millis {
        self.config.maximum_shallow_sleep_time(&self.budget())
    }

    /// Put both budgets back to their initial values.
    pub fn reset_minimum_deep_sleep_time(&self) {
        self.state.lock().budget.reset(
            self.config.initial_tear_down_ms,
            self.config.initial_set_up_ms,
        );
    }

    pub fn set_tracing(&self, enabled: bool) {
        self.tracer.set_enabled(enabled);
    }

    pub fn is_tracing(&self) -> bool {
        self.tracer.is_enabled()
    }

    /// Simulate deep sleeps with the shallow primitive and trace everything.
    ///
    /// Drivers are still quiesced and reactivated, and inhibitors are ignored.
    pub fn set_diagnostic_mode(&self, enabled: bool) {
        self.state.lock().diagnostic = enabled;
        self.set_tracing(enabled);
    }

    pub fn is_in_diagnostic_mode(&self) -> bool {
        self.state.lock().diagnostic
    }

    pub fn total_deep_sleep_time(&self) -> Millis {
        self.state.lock().total_deep_sleep
    }

    /// Shallow sleep time, not counting simulated deep sleeps.
    pub fn total_shallow_sleep_time(&self) -> Millis {
        self.state.lock().total_shallow_sleep
    }

    pub fn up_time(&self) -> Millis {
        let start = self.state.lock().start_time;
        self.clock.now_millis().saturating_sub(start)
    }

    /// Shift the start time after the clock has been set.
    pub fn adjust_start_time(&self, delta: i64) {
        let mut state = self.state.lock();
        state.start_time = state.start_time.saturating_add_signed(delta);
    }

    pub fn statistics(&self) -> SleepStatistics {
        let up_time = self.up_time();
        let state = self.state.lock();
        SleepStatistics {
            deep_sleep_count: state.deep_sleep_count,
            total_deep_sleep: state.total_deep_sleep,
            total_simulated_deep_sleep: state.total_simulated_deep_sleep,
            total_shallow_sleep: state.total_shallow_sleep,
            up_time,
        }
    }
}

impl fmt::Debug for SleepScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SleepScheduler")
            .field("enabled", &state.enabled)
            .field("diagnostic", &state.diagnostic)
            .field("budget", &state.budget)
            .field("deep_sleep_count", &state.deep_sleep_count)
            .finish()
    }
}
