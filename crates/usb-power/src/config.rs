use node_hal::{IrqMask, Millis};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Settings of the USB power daemon.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbPowerConfig {
    /// How long a powered port may stay unenumerated before it is treated as
    /// a dumb charger.
    pub enumeration_grace_ms: Millis,
    /// Bit the USB device controller raises on the interrupt line.
    pub bus_irq_mask: IrqMask,
}

impl Default for UsbPowerConfig {
    fn default() -> Self {
        Self {
            enumeration_grace_ms: 5000,
            bus_irq_mask: 1 << 11,
        }
    }
}
