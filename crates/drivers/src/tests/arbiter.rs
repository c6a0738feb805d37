use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use node_hal::sim::SimInterruptLine;
use node_hal::{HalError, HalResult, InterruptLine, IrqMask};
use parking_lot::Mutex;

use crate::arbiter::InterruptWaitArbiter;

const POWER: u32 = 1 << 0;
const BUS: u32 = 1 << 1;
const BUTTON: u32 = 1 << 2;

fn arbiter(line: &Arc<SimInterruptLine>) -> Arc<InterruptWaitArbiter> {
    let line: Arc<dyn InterruptLine> = line.clone();
    Arc::new(InterruptWaitArbiter::new(line, POWER | BUS | BUTTON))
}

fn wait_until_blocked(line: &SimInterruptLine) {
    for _ in 0..500 {
        if line.in_flight() > 0 {
            return;
        }
        thread::sleep(Duration::from_millis(2));
    }
    panic!("nobody blocked on the interrupt line");
}

/// Line that reports each blocking call and returns whatever the test
/// scripts next, so interleavings can be forced step by step.
struct ScriptedLine {
    entered: Mutex<mpsc::Sender<()>>,
    script: Mutex<mpsc::Receiver<IrqMask>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedLine {
    fn new() -> (Arc<Self>, mpsc::Receiver<()>, mpsc::Sender<IrqMask>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (script_tx, script_rx) = mpsc::channel();
        let line = Arc::new(Self {
            entered: Mutex::new(entered_tx),
            script: Mutex::new(script_rx),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });
        (line, entered_rx, script_tx)
    }
}

impl InterruptLine for ScriptedLine {
    fn block_until_interrupt(&self, mask: IrqMask) -> HalResult<IrqMask> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let depth = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(depth, Ordering::SeqCst);
        let _ = self.entered.lock().send(());

        let fired = self.script.lock().recv().map_err(|_| HalError::Closed);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        fired.map(|fired| fired & mask)
    }
}

#[test]
fn pending_bit_returns_without_blocking_again() {
    let line = SimInterruptLine::new();
    let arbiter = arbiter(&line);

    line.raise(POWER | BUS);
    assert_eq!(arbiter.wait_for(POWER).unwrap(), POWER);
    assert_eq!(arbiter.outstanding(), BUS);

    assert_eq!(arbiter.wait_for(BUS).unwrap(), BUS);
    assert_eq!(line.calls(), 1);
    assert_eq!(arbiter.outstanding(), 0);
}

#[test]
fn waiters_share_a_single_blocking_call() {
    let line = SimInterruptLine::new();
    let arbiter = arbiter(&line);
    let (tx, rx) = mpsc::channel();

    let handles: Vec<_> = [POWER, BUS, BUTTON]
        .into_iter()
        .map(|bit| {
            let arbiter = Arc::clone(&arbiter);
            let tx = tx.clone();
            thread::spawn(move || {
                let fired = arbiter.wait_for(bit).unwrap();
                tx.send((bit, fired)).unwrap();
            })
        })
        .collect();

    wait_until_blocked(&line);
    thread::sleep(Duration::from_millis(20));
    line.raise(BUTTON);
    line.raise(POWER);
    line.raise(BUS);

    for handle in handles {
        handle.join().unwrap();
    }
    drop(tx);
    let mut results: Vec<_> = rx.iter().collect();
    results.sort();

    assert_eq!(results, [(POWER, POWER), (BUS, BUS), (BUTTON, BUTTON)]);
    assert_eq!(line.max_in_flight(), 1);
    assert!(!arbiter.is_owned());
}

#[test]
fn bits_fired_for_other_waiters_are_not_lost() {
    let line = SimInterruptLine::new();
    let arbiter = arbiter(&line);

    let owner = {
        let arbiter = Arc::clone(&arbiter);
        thread::spawn(move || arbiter.wait_for(POWER))
    };
    wait_until_blocked(&line);

    line.raise(BUS);
    // The owner sees only BUS, records it and blocks again for POWER.
    for _ in 0..500 {
        if arbiter.outstanding() == BUS && line.in_flight() == 1 && line.calls() == 2 {
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(arbiter.wait_for(BUS).unwrap(), BUS);

    line.raise(POWER);
    assert_eq!(owner.join().unwrap().unwrap(), POWER);
    assert_eq!(line.max_in_flight(), 1);
}

#[test]
fn bits_outside_the_source_are_ignored() {
    let line = SimInterruptLine::new();
    let arbiter = arbiter(&line);

    line.raise(1 << 8 | BUTTON);
    assert_eq!(arbiter.wait_for(BUTTON | 1 << 8).unwrap(), BUTTON);
}

#[test]
fn line_error_reaches_every_waiter() {
    let line = SimInterruptLine::new();
    let arbiter = arbiter(&line);

    let handles: Vec<_> = [POWER, BUS]
        .into_iter()
        .map(|bit| {
            let arbiter = Arc::clone(&arbiter);
            thread::spawn(move || arbiter.wait_for(bit))
        })
        .collect();

    wait_until_blocked(&line);
    line.close();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), Err(HalError::Closed));
    }
    assert!(!arbiter.is_owned());
}

#[test]
fn wait_outside_the_source_is_rejected() {
    let line = SimInterruptLine::new();
    let arbiter = arbiter(&line);

    line.raise(POWER);
    assert!(matches!(
        arbiter.wait_for(1 << 8),
        Err(HalError::InvalidParameter(_))
    ));
    assert!(matches!(arbiter.wait_for(0), Err(HalError::InvalidParameter(_))));
    assert_eq!(line.calls(), 0);
    assert!(!arbiter.is_owned());
}

#[test]
fn token_released_before_waiter_parks_still_wakes_it() {
    let (line, entered, script) = ScriptedLine::new();
    let dyn_line: Arc<dyn InterruptLine> = line.clone();
    let arbiter = Arc::new(InterruptWaitArbiter::new(dyn_line, POWER | BUS));

    let owner = {
        let arbiter = Arc::clone(&arbiter);
        thread::spawn(move || arbiter.wait_for(POWER))
    };
    entered.recv().unwrap();
    assert!(arbiter.is_owned());

    // The second waiter stops between seeing the owner and parking on its token.
    let (parking_tx, parking_rx) = mpsc::channel();
    let (resume_tx, resume_rx) = mpsc::channel::<()>();
    arbiter.set_park_hook(move || {
        parking_tx.send(()).unwrap();
        resume_rx.recv().unwrap();
    });
    let waiter = {
        let arbiter = Arc::clone(&arbiter);
        thread::spawn(move || arbiter.wait_for(BUS))
    };
    parking_rx.recv().unwrap();

    // The owner finishes and releases the token while the waiter is not parked.
    script.send(POWER | BUS).unwrap();
    assert_eq!(owner.join().unwrap(), Ok(POWER));
    assert!(!arbiter.is_owned());
    assert_eq!(arbiter.outstanding(), BUS);

    resume_tx.send(()).unwrap();
    assert_eq!(waiter.join().unwrap(), Ok(BUS));
    assert_eq!(line.calls.load(Ordering::SeqCst), 1);
    assert_eq!(line.max_in_flight.load(Ordering::SeqCst), 1);
}
