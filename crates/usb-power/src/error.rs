use std::io;

use node_drivers::DriverFault;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UsbPowerError {
    #[error("cannot sample USB power state: {0}")]
    Driver(#[from] DriverFault),
    #[error("cannot spawn USB power thread: {0}")]
    Spawn(#[from] io::Error),
}
