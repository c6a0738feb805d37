//! Adaptive tear-down and set-up budgets.

use node_hal::Millis;

/// How long quiescing and reactivating the drivers are allowed to take.
///
/// Both values only ever grow: whenever a measured phase runs over its budget
/// the budget is raised to the measurement plus a margin. Only
/// [`reset`](Self::reset) lowers them again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepBudget {
    tear_down: Millis,
    set_up: Millis,
}

impl SleepBudget {
    pub fn new(tear_down: Millis, set_up: Millis) -> Self {
        Self { tear_down, set_up }
    }

    pub fn tear_down(&self) -> Millis {
        self.tear_down
    }

    pub fn set_up(&self) -> Millis {
        self.set_up
    }

    /// Record a measured quiescence. Returns the new budget if it was raised.
    pub fn record_tear_down(&mut self, measured: Millis, margin_percent: u32) -> Option<Millis> {
        ratchet(&mut self.tear_down, measured, margin_percent)
    }

    /// Record a measured reactivation. Returns the new budget if it was raised.
    pub fn record_set_up(&mut self, measured: Millis, margin_percent: u32) -> Option<Millis> {
        ratchet(&mut self.set_up, measured, margin_percent)
    }

    pub fn reset(&mut self, tear_down: Millis, set_up: Millis) {
        *self = Self::new(tear_down, set_up);
    }
}

fn ratchet(budget: &mut Millis, measured: Millis, margin_percent: u32) -> Option<Millis> {
    if measured <= *budget {
        return None;
    }
    *budget = measured + measured * Millis::from(margin_percent) / 100;
    Some(*budget)
}
