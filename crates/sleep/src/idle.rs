//! Idle detection.
//!
//! The scheduler can only decide how deeply to sleep if it knows when the
//! application next needs the processor. [`IdleMonitor`] is that view of the
//! application; [`IdleTracker`] implements it for hosted builds by having
//! application threads sleep through it.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use node_hal::{Clock, Millis};
use parking_lot::{Condvar, Mutex};

use crate::error::Interrupted;
use crate::soak::SoakGate;

/// What the sleep scheduler needs to know about application threads.
pub trait IdleMonitor: Send + Sync {
    /// Block until every application thread is asleep and return the earliest
    /// wake time, which is always in the future. `None` after shutdown.
    fn wait_for_idle(&self) -> Option<Millis>;

    /// Milliseconds until some thread other than the caller becomes runnable.
    /// [`Millis::MAX`] if none is scheduled to.
    fn time_until_runnable(&self) -> Millis;

    /// Put the calling thread to sleep for `millis`.
    fn sleep(&self, millis: Millis) -> Result<(), Interrupted>;

    /// End `thread`'s current sleep early. No effect if it is not sleeping.
    fn interrupt(&self, thread: ThreadId);

    /// The clock may have jumped; sleepers re-check their wake times.
    fn notify_resumed(&self);

    /// Release every waiter. Later sleeps fail immediately.
    fn shutdown(&self);
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    registered: bool,
    wake_at: Option<Millis>,
    interrupted: bool,
}

impl Slot {
    fn running(registered: bool) -> Self {
        Self {
            registered,
            wake_at: None,
            interrupted: false,
        }
    }

    fn runnable_in(&self, now: Millis) -> Millis {
        match self.wake_at {
            Some(wake_at) if !self.interrupted => wake_at.saturating_sub(now),
            _ => 0,
        }
    }
}

#[derive(Debug, Default)]
struct IdleState {
    threads: HashMap<ThreadId, Slot>,
    shutdown: bool,
}

impl IdleState {
    fn earliest_wake(&self, now: Millis) -> Option<Millis> {
        let mut earliest = None::<Millis>;
        for slot in self.threads.values() {
            if slot.interrupted {
                return None;
            }
            let wake_at = slot.wake_at?;
            earliest = Some(earliest.map_or(wake_at, |current| current.min(wake_at)));
        }
        earliest.filter(|&wake_at| wake_at > now)
    }
}

/// Host implementation of [`IdleMonitor`].
///
/// Registered threads count as busy except while inside
/// [`sleep`](IdleMonitor::sleep). Unregistered threads only count while they
/// sleep. Threads leaving a sleep pass through the soak gate, so they stay
/// parked while the scheduler is mid-transition.
pub struct IdleTracker {
    clock: Arc<dyn Clock>,
    soak: Arc<SoakGate>,
    state: Mutex<IdleState>,
    changed: Condvar,
}

impl IdleTracker {
    pub fn new(clock: Arc<dyn Clock>, soak: Arc<SoakGate>) -> Self {
        Self {
            clock,
            soak,
            state: Mutex::new(IdleState::default()),
            changed: Condvar::new(),
        }
    }

    /// Count the calling thread as busy until it sleeps or deregisters.
    pub fn register(&self) {
        let mut state = self.state.lock();
        state
            .threads
            .insert(thread::current().id(), Slot::running(true));
        self.changed.notify_all();
    }

    pub fn deregister(&self) {
        let mut state = self.state.lock();
        state.threads.remove(&thread::current().id());
        self.changed.notify_all();
    }

    /// Number of threads currently inside a sleep.
    pub fn sleeping(&self) -> usize {
        self.state
            .lock()
            .threads
            .values()
            .filter(|slot| slot.wake_at.is_some())
            .count()
    }
}

impl IdleMonitor for IdleTracker {
    fn wait_for_idle(&self) -> Option<Millis> {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return None;
            }
            if let Some(target) = state.earliest_wake(self.clock.now_millis()) {
                return Some(target);
            }
            self.changed.wait(&mut state);
        }
    }

    fn time_until_runnable(&self) -> Millis {
        let me = thread::current().id();
        let now = self.clock.now_millis();
        self.state
            .lock()
            .threads
            .iter()
            .filter(|(id, _)| **id != me)
            .map(|(_, slot)| slot.runnable_in(now))
            .min()
            .unwrap_or(Millis::MAX)
    }

    fn sleep(&self, millis: Millis) -> Result<(), Interrupted> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.shutdown {
            return Err(Interrupted);
        }

        let wake_at = self.clock.now_millis().saturating_add(millis);
        let slot = state.threads.entry(me).or_insert(Slot::running(false));
        slot.wake_at = Some(wake_at);
        slot.interrupted = false;
        self.changed.notify_all();

        let result = loop {
            let interrupted = state.threads.get(&me).map_or(true, |slot| slot.interrupted);
            if interrupted || state.shutdown {
                break Err(Interrupted);
            }
            let now = self.clock.now_millis();
            if now >= wake_at {
                break Ok(());
            }
            self.changed
                .wait_for(&mut state, Duration::from_millis(wake_at - now));
        };

        match state.threads.get_mut(&me) {
            Some(slot) if slot.registered => *slot = Slot::running(true),
            _ => {
                state.threads.remove(&me);
            }
        }
        self.changed.notify_all();
        drop(state);

        self.soak.pass();
        result
    }

    fn interrupt(&self, thread: ThreadId) {
        let mut state = self.state.lock();
        if let Some(slot) = state.threads.get_mut(&thread) {
            if slot.wake_at.is_some() {
                slot.interrupted = true;
                self.changed.notify_all();
            }
        }
    }

    fn notify_resumed(&self) {
        let _state = self.state.lock();
        self.changed.notify_all();
    }

    fn shutdown(&self) {
        self.state.lock().shutdown = true;
        self.changed.notify_all();
    }
}
