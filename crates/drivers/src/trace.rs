//! Diagnostic tracing of lifecycle and sleep decisions.
//!
//! Tracing is off by default. When on, each record is logged at `info` and
//! passed to the installed [`TraceHook`], if any. Vetoes and faults are logged
//! by their emitters regardless of this switch.

use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use node_hal::Millis;
use parking_lot::RwLock;

/// Callback receiving every record while tracing is enabled.
pub type TraceHook = Arc<dyn Fn(&TraceRecord) + Send + Sync>;

/// One traced decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceRecord {
    Registered { driver: String },
    Deregistered { driver: String },
    Quiescing { driver: String },
    Vetoed { driver: String },
    Activating { driver: String },
    Finalizing { driver: String },
    SleepRequested { wake_at: Millis, now: Millis },
    SleepSkipped { wake_at: Millis, now: Millis },
    ShallowSleep { until: Millis, reason: String },
    DeepSleep { until: Millis, simulated: bool },
    Resumed { at: Millis },
    PhaseMeasured { phase: &'static str, millis: Millis },
    BudgetRaised { phase: &'static str, budget: Millis },
    Transition {
        machine: &'static str,
        from: String,
        event: String,
        to: String,
    },
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registered { driver } => write!(f, "registering {driver}"),
            Self::Deregistered { driver } => write!(f, "deregistering {driver}"),
            Self::Quiescing { driver } => write!(f, "quiescing {driver}"),
            Self::Vetoed { driver } => write!(f, "{driver} vetoed quiescence"),
            Self::Activating { driver } => write!(f, "activating {driver}"),
            Self::Finalizing { driver } => write!(f, "finalizing {driver}"),
            Self::SleepRequested { wake_at, now } => {
                write!(f, "sleep requested until {wake_at} (now {now})")
            }
            Self::SleepSkipped { wake_at, now } => {
                write!(f, "wake time {wake_at} already passed at {now}; not sleeping")
            }
            Self::ShallowSleep { until, reason } => {
                write!(f, "shallow sleep until {until}: {reason}")
            }
            Self::DeepSleep { until, simulated } => {
                let kind = if *simulated { "simulated deep sleep" } else { "deep sleep" };
                write!(f, "entering {kind} until {until}")
            }
            Self::Resumed { at } => write!(f, "resumed at {at}"),
            Self::PhaseMeasured { phase, millis } => write!(f, "{phase} took {millis} ms"),
            Self::BudgetRaised { phase, budget } => {
                write!(f, "{phase} budget raised to {budget} ms")
            }
            Self::Transition {
                machine,
                from,
                event,
                to,
            } => write!(f, "[{machine}] {from} --{event}--> {to}"),
        }
    }
}

/// Tracing switch shared by the registry, the scheduler and drivers.
#[derive(Default)]
pub struct Tracer {
    enabled: AtomicBool,
    hook: RwLock<Option<TraceHook>>,
}

impl Tracer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_hook(&self, hook: Option<TraceHook>) {
        *self.hook.write() = hook;
    }

    /// Emit the record built by `record` if tracing is enabled.
    ///
    /// The builder only runs when the record is going to be used.
    pub fn emit<F>(&self, record: F)
    where
        F: FnOnce() -> TraceRecord,
    {
        if !self.is_enabled() {
            return;
        }
        let record = record();
        log::info!("{record}");
        let hook = self.hook.read().clone();
        if let Some(hook) = hook {
            hook(&record);
        }
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("enabled", &self.is_enabled())
            .field("hook", &self.hook.read().is_some())
            .finish()
    }
}
