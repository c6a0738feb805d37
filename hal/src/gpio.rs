//! GPIO input pins used by interrupt-driven drivers

use crate::error::HalResult;
use crate::interrupt::IrqMask;

/// Bit mask selecting pins within one PIO bank.
pub type PinMask = u32;

/// GPIO pin levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Low level (0V)
    Low,
    /// High level (VCC)
    High,
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Self::High
        } else {
            Self::Low
        }
    }
}

/// Input pin with edge interrupts, claimed by a single driver at a time.
pub trait InputPin: Send + Sync {
    /// Take ownership of the pin and configure it as an input.
    fn claim(&self) -> HalResult<()>;

    /// Give the pin back to its bank.
    fn release(&self);

    /// Read current level
    fn read(&self) -> HalResult<Level>;

    /// Returns true when the pin reads high.
    fn is_high(&self) -> HalResult<bool> {
        Ok(self.read()? == Level::High)
    }

    /// Unmask edge interrupts for this pin.
    fn enable_irq(&self) -> HalResult<()>;

    /// Mask edge interrupts for this pin.
    fn disable_irq(&self);

    /// Bit this pin raises on its bank's interrupt line.
    fn irq_mask(&self) -> IrqMask;
}
