//! Hardware boundary of the node runtime
//!
//! This crate holds the vendor-agnostic traits the driver-lifecycle and
//! low-power subsystems consume: a monotonic millisecond clock, the two power
//! primitives, the blocking interrupt wait, GPIO input pins and the USB power
//! path. Register layouts live behind these traits in board crates.
//!
//! The [`sim`] module provides simulated peripherals for host builds and tests.

pub mod error;
pub mod gpio;
pub mod interrupt;
pub mod power;
pub mod usb;

#[cfg(feature = "sim")]
pub mod sim;

// Re-export commonly used types
pub use error::{HalError, HalResult};
pub use gpio::{InputPin, Level, PinMask};
pub use interrupt::{InterruptLine, IrqMask};
pub use power::{Clock, Millis, PowerControl};
pub use usb::{PowerRegulator, UsbBus, UsbBusState};
