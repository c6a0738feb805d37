//! # node-drivers
//!
//! Driver lifecycle primitives shared by every peripheral controller on the
//! node.
//!
//! ## Module Overview
//! - [`driver`]   – The [`Driver`] capability and deep-sleep inhibitors.
//! - [`registry`] – Ordered, veto-capable quiesce/activate protocol.
//! - [`arbiter`]  – One blocking interrupt wait per source, shared by many threads.
//! - [`trace`]    – Diagnostic tracing toggle and record hook.
//!
//! Registries and tracers are plain owned values handed to the drivers and
//! schedulers that need them; nothing here is a process-wide static.

pub mod arbiter;
pub mod driver;
pub mod registry;
pub mod trace;

pub use arbiter::InterruptWaitArbiter;
pub use driver::{DeepSleepInhibitor, Driver, DriverFault, DriverRef, DriverResult};
pub use registry::{DriverRegistry, Phase, RegistryError};
pub use trace::{TraceHook, TraceRecord, Tracer};

#[cfg(test)]
mod tests;
