//! Ordered registry running the quiesce/activate protocol.
//!
//! Drivers are kept in registration order. Quiescence walks the list back to
//! front; activation walks it front to back. A veto part-way through a
//! quiescence pass reactivates every driver already quiesced in that pass
//! before the pass reports failure.

use core::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::driver::{same_driver, DriverFault, DriverRef};
use crate::trace::{TraceRecord, Tracer};

/// Which half of the protocol a driver was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Quiesce,
    Activate,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quiesce => "quiesce",
            Self::Activate => "activate",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("driver {0} is attempting to register twice")]
    AlreadyRegistered(String),
    #[error("driver {0} is attempting to deregister before registering")]
    NotRegistered(String),
    #[error("driver {driver} failed to {phase}: {source}")]
    Fault {
        driver: String,
        phase: Phase,
        #[source]
        source: DriverFault,
    },
}

#[derive(Default)]
struct RegistryInner {
    drivers: Vec<DriverRef>,
    last_veto: Option<String>,
}

/// Owner of every registered driver.
///
/// Registration changes and whole quiesce/activate passes are serialised by
/// one internal lock, so driver callbacks never overlap. Callbacks must not
/// call back into the registry.
pub struct DriverRegistry {
    inner: Mutex<RegistryInner>,
    tracer: Arc<Tracer>,
}

impl DriverRegistry {
    pub fn new(tracer: Arc<Tracer>) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            tracer,
        }
    }

    pub fn tracer(&self) -> Arc<Tracer> {
        Arc::clone(&self.tracer)
    }

    /// Append `driver` to the registration order.
    pub fn add(&self, driver: DriverRef) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        if inner.drivers.iter().any(|known| same_driver(known, &driver)) {
            return Err(RegistryError::AlreadyRegistered(driver.name().to_string()));
        }
        self.tracer.emit(|| TraceRecord::Registered {
            driver: driver.name().to_string(),
        });
        inner.drivers.push(driver);
        Ok(())
    }

    /// Remove `driver`, keeping the relative order of the others.
    pub fn remove(&self, driver: &DriverRef) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        let position = inner
            .drivers
            .iter()
            .position(|known| same_driver(known, driver))
            .ok_or_else(|| RegistryError::NotRegistered(driver.name().to_string()))?;
        self.tracer.emit(|| TraceRecord::Deregistered {
            driver: driver.name().to_string(),
        });
        inner.drivers.remove(position);
        Ok(())
    }

    pub fn names_in_order(&self) -> Vec<String> {
        self.inner
            .lock()
            .drivers
            .iter()
            .map(|driver| driver.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the driver that most recently refused to quiesce.
    pub fn last_veto(&self) -> Option<String> {
        self.inner.lock().last_veto.clone()
    }

    /// Quiesce every driver, most recently registered first.
    ///
    /// Returns `Ok(false)` after a veto, once the drivers quiesced in this pass
    /// have been reactivated. A driver fault aborts the pass immediately and
    /// leaves the hardware as it is.
    pub fn quiesce_all(&self) -> Result<bool, RegistryError> {
        let mut inner = self.inner.lock();
        for index in (0..inner.drivers.len()).rev() {
            let driver = Arc::clone(&inner.drivers[index]);
            let name = driver.name().to_string();
            self.tracer.emit(|| TraceRecord::Quiescing {
                driver: name.clone(),
            });

            let quiesced = driver.quiesce().map_err(|source| RegistryError::Fault {
                driver: name.clone(),
                phase: Phase::Quiesce,
                source,
            })?;
            if quiesced {
                continue;
            }

            log::warn!("driver {name} vetoed deep sleep");
            self.tracer.emit(|| TraceRecord::Vetoed {
                driver: name.clone(),
            });
            inner.last_veto = Some(name);
            for undone in &inner.drivers[index + 1..] {
                self.activate_one(undone)?;
            }
            return Ok(false);
        }
        Ok(true)
    }

    /// Activate every driver in registration order.
    pub fn activate_all(&self) -> Result<(), RegistryError> {
        let inner = self.inner.lock();
        for driver in &inner.drivers {
            self.activate_one(driver)?;
        }
        Ok(())
    }

    /// Tell every driver, most recent first, that the process is exiting.
    pub fn finalize_all(&self) {
        let inner = self.inner.lock();
        for driver in inner.drivers.iter().rev() {
            self.tracer.emit(|| TraceRecord::Finalizing {
                driver: driver.name().to_string(),
            });
            driver.finalize();
        }
    }

    fn activate_one(&self, driver: &DriverRef) -> Result<(), RegistryError> {
        self.tracer.emit(|| TraceRecord::Activating {
            driver: driver.name().to_string(),
        });
        driver.activate().map_err(|source| RegistryError::Fault {
            driver: driver.name().to_string(),
            phase: Phase::Activate,
            source,
        })
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.names_in_order())
            .field("last_veto", &self.last_veto())
            .finish()
    }
}
