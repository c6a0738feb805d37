//! # node-usb-power
//!
//! Negotiates how much current the node draws from USB.
//!
//! - [`state`]  – The pure transition table.
//! - [`daemon`] – [`UsbPowerDaemon`], the driver running the table against
//!   the power pin, the USB controller and the enumeration timer.
//! - [`timer`]  – The cancellable enumeration grace timer.

pub mod config;
pub mod daemon;
pub mod error;
pub mod state;
pub mod timer;

pub use config::UsbPowerConfig;
pub use daemon::{UsbPowerDaemon, UsbPowerHardware};
pub use error::UsbPowerError;
pub use state::{transition, PowerEvent, PowerState, TimerAction, Transition};
pub use timer::EnumerationTimer;
