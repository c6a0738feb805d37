use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use node_hal::HalError;

use crate::driver::{Driver, DriverFault, DriverRef, DriverResult};
use crate::registry::{DriverRegistry, Phase, RegistryError};
use crate::trace::{TraceRecord, Tracer};

type Journal = Arc<Mutex<Vec<String>>>;

struct Recorder {
    name: &'static str,
    journal: Journal,
    veto: AtomicBool,
    fail_quiesce: bool,
    fail_activate: bool,
}

impl Recorder {
    fn new(name: &'static str, journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            name,
            journal: Arc::clone(journal),
            veto: AtomicBool::new(false),
            fail_quiesce: false,
            fail_activate: false,
        })
    }

    fn vetoing(name: &'static str, journal: &Journal) -> Arc<Self> {
        let driver = Self::new(name, journal);
        driver.veto.store(true, Ordering::SeqCst);
        driver
    }
}

impl Driver for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn quiesce(&self) -> DriverResult<bool> {
        self.journal.lock().unwrap().push(format!("q:{}", self.name));
        if self.fail_quiesce {
            return Err(DriverFault::Hal(HalError::Hardware("bus stuck".into())));
        }
        Ok(!self.veto.load(Ordering::SeqCst))
    }

    fn activate(&self) -> DriverResult<()> {
        self.journal.lock().unwrap().push(format!("a:{}", self.name));
        if self.fail_activate {
            return Err(DriverFault::Failed("no clock".into()));
        }
        Ok(())
    }

    fn finalize(&self) {
        self.journal.lock().unwrap().push(format!("f:{}", self.name));
    }
}

fn registry() -> DriverRegistry {
    DriverRegistry::new(Tracer::new())
}

fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

#[test]
fn quiesce_runs_in_reverse_and_activate_in_order() {
    let journal = Journal::default();
    let registry = registry();
    for name in ["a", "b", "c"] {
        registry.add(Recorder::new(name, &journal)).unwrap();
    }

    assert!(registry.quiesce_all().unwrap());
    registry.activate_all().unwrap();

    assert_eq!(
        entries(&journal),
        ["q:c", "q:b", "q:a", "a:a", "a:b", "a:c"]
    );
    assert_eq!(registry.last_veto(), None);
}

#[test]
fn veto_reactivates_drivers_already_quiesced() {
    let journal = Journal::default();
    let registry = registry();
    registry.add(Recorder::new("a", &journal)).unwrap();
    registry.add(Recorder::vetoing("b", &journal)).unwrap();
    registry.add(Recorder::new("c", &journal)).unwrap();

    assert!(!registry.quiesce_all().unwrap());

    assert_eq!(entries(&journal), ["q:c", "q:b", "a:c"]);
    assert_eq!(registry.last_veto().as_deref(), Some("b"));
}

#[test]
fn veto_by_last_registered_driver_reactivates_nothing() {
    let journal = Journal::default();
    let registry = registry();
    registry.add(Recorder::new("a", &journal)).unwrap();
    registry.add(Recorder::vetoing("b", &journal)).unwrap();

    assert!(!registry.quiesce_all().unwrap());
    assert_eq!(entries(&journal), ["q:b"]);
}

#[test]
fn last_veto_is_kept_after_a_successful_pass() {
    let journal = Journal::default();
    let registry = registry();
    let moody = Recorder::vetoing("moody", &journal);
    registry.add(moody.clone()).unwrap();

    assert!(!registry.quiesce_all().unwrap());
    moody.veto.store(false, Ordering::SeqCst);
    assert!(registry.quiesce_all().unwrap());

    assert_eq!(registry.last_veto().as_deref(), Some("moody"));
}

#[test]
fn empty_registry_quiesces_trivially() {
    let registry = registry();
    assert!(registry.is_empty());
    assert!(registry.quiesce_all().unwrap());
    registry.activate_all().unwrap();
}

#[test]
fn duplicate_registration_is_rejected() {
    let journal = Journal::default();
    let registry = registry();
    let driver: DriverRef = Recorder::new("uart", &journal);

    registry.add(Arc::clone(&driver)).unwrap();
    let err = registry.add(Arc::clone(&driver)).unwrap_err();

    assert!(matches!(err, RegistryError::AlreadyRegistered(ref name) if name == "uart"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn drivers_with_the_same_name_are_distinct() {
    let journal = Journal::default();
    let registry = registry();
    registry.add(Recorder::new("led", &journal)).unwrap();
    registry.add(Recorder::new("led", &journal)).unwrap();
    assert_eq!(registry.len(), 2);
}

#[test]
fn removing_unknown_driver_fails() {
    let journal = Journal::default();
    let registry = registry();
    let stranger: DriverRef = Recorder::new("stranger", &journal);

    let err = registry.remove(&stranger).unwrap_err();
    assert!(matches!(err, RegistryError::NotRegistered(ref name) if name == "stranger"));
}

#[test]
fn remove_keeps_relative_order() {
    let journal = Journal::default();
    let registry = registry();
    let a: DriverRef = Recorder::new("a", &journal);
    let b: DriverRef = Recorder::new("b", &journal);
    let c: DriverRef = Recorder::new("c", &journal);
    for driver in [&a, &b, &c] {
        registry.add(Arc::clone(driver)).unwrap();
    }

    registry.remove(&b).unwrap();

    assert_eq!(registry.names_in_order(), ["a", "c"]);
    assert!(registry.quiesce_all().unwrap());
    assert_eq!(entries(&journal), ["q:c", "q:a"]);
}

#[test]
fn quiesce_fault_aborts_the_pass() {
    let journal = Journal::default();
    let registry = registry();
    registry.add(Recorder::new("a", &journal)).unwrap();
    registry
        .add(Arc::new(Recorder {
            name: "flash",
            journal: Arc::clone(&journal),
            veto: AtomicBool::new(false),
            fail_quiesce: true,
            fail_activate: false,
        }))
        .unwrap();
    registry.add(Recorder::new("c", &journal)).unwrap();

    let err = registry.quiesce_all().unwrap_err();

    match err {
        RegistryError::Fault { driver, phase, .. } => {
            assert_eq!(driver, "flash");
            assert_eq!(phase, Phase::Quiesce);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(entries(&journal), ["q:c", "q:flash"]);
}

#[test]
fn activate_fault_is_reported_with_phase() {
    let journal = Journal::default();
    let registry = registry();
    registry
        .add(Arc::new(Recorder {
            name: "radio",
            journal: Arc::clone(&journal),
            veto: AtomicBool::new(false),
            fail_quiesce: false,
            fail_activate: true,
        }))
        .unwrap();
    registry.add(Recorder::new("b", &journal)).unwrap();

    let err = registry.activate_all().unwrap_err();

    assert!(matches!(err, RegistryError::Fault { phase: Phase::Activate, .. }));
    assert_eq!(entries(&journal), ["a:radio"]);
}

#[test]
fn finalize_runs_in_reverse() {
    let journal = Journal::default();
    let registry = registry();
    registry.add(Recorder::new("a", &journal)).unwrap();
    registry.add(Recorder::new("b", &journal)).unwrap();

    registry.finalize_all();

    assert_eq!(entries(&journal), ["f:b", "f:a"]);
}

#[test]
fn veto_is_traced_when_enabled() {
    let journal = Journal::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let tracer = Tracer::new();
    tracer.set_hook(Some(Arc::new(move |record: &TraceRecord| {
        sink.lock().unwrap().push(record.clone());
    })));
    tracer.set_enabled(true);

    let registry = DriverRegistry::new(tracer);
    registry.add(Recorder::vetoing("radio", &journal)).unwrap();
    assert!(!registry.quiesce_all().unwrap());

    let seen = seen.lock().unwrap();
    assert!(seen.contains(&TraceRecord::Vetoed {
        driver: "radio".into()
    }));
}
