//! USB power path: bus state and the charger's current limit

use crate::error::HalResult;

/// Device state as reported by the USB controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbBusState {
    /// Bus reset seen, not yet configured by the host.
    Reset,
    /// Configured by the host.
    Configured,
    /// Configured and an application has the port open.
    Ready,
    /// Any other controller state.
    Other(u8),
}

impl UsbBusState {
    /// True once the host has enumerated the device.
    pub fn is_enumerated(self) -> bool {
        matches!(self, Self::Configured | Self::Ready)
    }
}

/// USB device controller status.
pub trait UsbBus: Send + Sync {
    fn state(&self) -> HalResult<UsbBusState>;
}

/// Battery charger / regulator controlling how much current is drawn from USB.
pub trait PowerRegulator: Send + Sync {
    /// Select the 500 mA (high) or 100 mA (low) USB current limit.
    fn set_high_power(&self, high: bool) -> HalResult<()>;
}
