#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use node_drivers::{DeepSleepInhibitor, Driver, DriverFault, DriverRegistry, DriverResult, Tracer};
use node_hal::sim::{SimClock, SimPower};
use node_hal::{Clock, Millis};
use node_sleep::{IdleMonitor, IdleTracker, SleepScheduler, SoakGate};

pub type Journal = Arc<Mutex<Vec<String>>>;

/// Driver that records calls and can veto, fail or take simulated time.
pub struct TestDriver {
    name: &'static str,
    clock: Arc<SimClock>,
    journal: Journal,
    pub veto: AtomicBool,
    pub fail_quiesce: AtomicBool,
    pub quiesce_millis: AtomicU64,
    pub activate_millis: AtomicU64,
}

impl TestDriver {
    pub fn new(name: &'static str, clock: &Arc<SimClock>, journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            name,
            clock: Arc::clone(clock),
            journal: Arc::clone(journal),
            veto: AtomicBool::new(false),
            fail_quiesce: AtomicBool::new(false),
            quiesce_millis: AtomicU64::new(0),
            activate_millis: AtomicU64::new(0),
        })
    }
}

impl Driver for TestDriver {
    fn name(&self) -> &str {
        self.name
    }

    fn quiesce(&self) -> DriverResult<bool> {
        self.journal.lock().unwrap().push(format!("q:{}", self.name));
        self.clock.advance(self.quiesce_millis.load(Ordering::SeqCst));
        if self.fail_quiesce.load(Ordering::SeqCst) {
            return Err(DriverFault::Failed("flash busy".into()));
        }
        Ok(!self.veto.load(Ordering::SeqCst))
    }

    fn activate(&self) -> DriverResult<()> {
        self.journal.lock().unwrap().push(format!("a:{}", self.name));
        self.clock.advance(self.activate_millis.load(Ordering::SeqCst));
        Ok(())
    }
}

pub struct FixedInhibitor(pub Mutex<Option<String>>);

impl DeepSleepInhibitor for FixedInhibitor {
    fn inhibit_reason(&self) -> Option<String> {
        self.0.lock().unwrap().clone()
    }
}

pub struct Node {
    pub clock: Arc<SimClock>,
    pub power: Arc<SimPower>,
    pub registry: Arc<DriverRegistry>,
    pub idle: Arc<IdleTracker>,
    pub scheduler: Arc<SleepScheduler>,
    pub journal: Journal,
}

impl Node {
    pub fn new(start: Millis) -> Self {
        let clock = SimClock::manual(start);
        let power = SimPower::new(Arc::clone(&clock));
        let registry = Arc::new(DriverRegistry::new(Tracer::new()));
        let soak = Arc::new(SoakGate::new());
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let idle = Arc::new(IdleTracker::new(Arc::clone(&dyn_clock), Arc::clone(&soak)));
        let idle_monitor: Arc<dyn IdleMonitor> = idle.clone();
        let scheduler = SleepScheduler::builder(
            Arc::clone(&registry),
            dyn_clock,
            power.clone(),
            idle_monitor,
        )
        .soak_gate(soak)
        .build();

        Self {
            clock,
            power,
            registry,
            idle,
            scheduler: Arc::new(scheduler),
            journal: Journal::default(),
        }
    }

    pub fn driver(&self, name: &'static str) -> Arc<TestDriver> {
        let driver = TestDriver::new(name, &self.clock, &self.journal);
        self.registry.add(driver.clone()).unwrap();
        driver
    }

    pub fn entries(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }
}
