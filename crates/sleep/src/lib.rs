//! # node-sleep
//!
//! Deep/shallow sleep scheduling for the node runtime.
//!
//! ## Module Overview
//! - [`config`]    – Platform timing parameters and the thresholds derived from them.
//! - [`budget`]    – Tear-down and set-up budgets that only ratchet upwards.
//! - [`idle`]      – Idle detection: the [`IdleMonitor`] seam and [`IdleTracker`].
//! - [`soak`]      – Holding application threads back during a sleep transition.
//! - [`scheduler`] – The [`SleepScheduler`] and its `ensure_deep_sleep` guarantee.
//! - [`stats`]     – Sleep and up-time counters.

pub mod budget;
pub mod config;
pub mod error;
pub mod idle;
pub mod scheduler;
pub mod soak;
pub mod stats;

pub use budget::SleepBudget;
pub use config::{SleepConfig, SleepConfigBuilder};
pub use error::{Interrupted, UnableToDeepSleep};
pub use idle::{IdleMonitor, IdleTracker};
pub use scheduler::{CycleOutcome, SleepScheduler, SleepSchedulerBuilder};
pub use soak::{SoakGate, SoakGuard};
pub use stats::SleepStatistics;
