//! Timing parameters of the sleep scheduler.
//!
//! Every constant here is a property of the board (reboot latency, how long
//! the runtime takes to get back to the application) rather than of the
//! protocol, so all of them can be overridden.

use node_hal::Millis;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::budget::SleepBudget;

/// Platform timing parameters.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SleepConfig {
    /// Tear-down budget after a reset of the budgets.
    pub initial_tear_down_ms: Millis,
    /// Set-up budget after a reset of the budgets.
    pub initial_set_up_ms: Millis,
    /// Time for the scheduler thread to run again after idle is detected.
    pub resume_thread_overhead_ms: Millis,
    /// Time for the runtime to get back to waiting for an event.
    pub wait_for_event_overhead_ms: Millis,
    /// Time between the idle calculation and the scheduler's next decision.
    pub reschedule_overhead_ms: Millis,
    /// Time for the processor to boot and resume execution.
    pub reboot_overhead_ms: Millis,
    /// Time between the end of set-up and the application running.
    pub resume_application_overhead_ms: Millis,
    /// Keeps the longest shallow sleep just below the idle threshold.
    pub shallow_sleep_allowance_ms: Millis,
    /// Shortest power-off period that saves energy.
    pub minimum_off_time_ms: Millis,
    /// Margin added when a measured phase exceeds its budget.
    pub ratchet_margin_percent: u32,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            initial_tear_down_ms: 700,
            initial_set_up_ms: 700,
            resume_thread_overhead_ms: 10,
            wait_for_event_overhead_ms: 3,
            reschedule_overhead_ms: 2,
            reboot_overhead_ms: 95,
            resume_application_overhead_ms: 5,
            shallow_sleep_allowance_ms: 1,
            minimum_off_time_ms: 2000,
            ratchet_margin_percent: 10,
        }
    }
}

impl SleepConfig {
    pub fn builder() -> SleepConfigBuilder {
        SleepConfigBuilder::default()
    }

    /// Budgets as they stand after construction or an operator reset.
    pub fn initial_budget(&self) -> SleepBudget {
        SleepBudget::new(self.initial_tear_down_ms, self.initial_set_up_ms)
    }

    /// Shortest idle period worth a deep sleep with the given budgets.
    pub fn idle_threshold(&self, budget: &SleepBudget) -> Millis {
        budget.tear_down()
            + budget.set_up()
            + self.resume_thread_overhead_ms
            + self.reboot_overhead_ms
            + self.resume_application_overhead_ms
            + self.wait_for_event_overhead_ms
            + self.minimum_off_time_ms
    }

    /// Shortest duration `ensure_deep_sleep` accepts.
    pub fn minimum_deep_sleep_time(&self, budget: &SleepBudget) -> Millis {
        self.idle_threshold(budget) + self.reschedule_overhead_ms
    }

    /// Longest idle period that is still handled by a shallow sleep.
    pub fn maximum_shallow_sleep_time(&self, budget: &SleepBudget) -> Millis {
        self.idle_threshold(budget)
            .saturating_sub(self.shallow_sleep_allowance_ms)
    }

    /// Latest time the chip may power down and still have the application
    /// running again by `target_wake`.
    pub fn power_down_deadline(&self, target_wake: Millis, budget: &SleepBudget) -> Millis {
        target_wake.saturating_sub(
            budget.set_up() + self.reboot_overhead_ms + self.resume_application_overhead_ms,
        )
    }
}

/// Builder for [`SleepConfig`].
#[derive(Debug, Clone, Default)]
pub struct SleepConfigBuilder {
    config: SleepConfig,
}

impl SleepConfigBuilder {
    /// Sets both initial budgets.
    pub fn initial_budgets(mut self, tear_down: Millis, set_up: Millis) -> Self {
        self.config.initial_tear_down_ms = tear_down;
        self.config.initial_set_up_ms = set_up;
        self
    }

    pub fn resume_thread_overhead(mut self, millis: Millis) -> Self {
        self.config.resume_thread_overhead_ms = millis;
        self
    }

    pub fn wait_for_event_overhead(mut self, millis: Millis) -> Self {
        self.config.wait_for_event_overhead_ms = millis;
        self
    }

    pub fn reschedule_overhead(mut self, millis: Millis) -> Self {
        self.config.reschedule_overhead_ms = millis;
        self
    }

    pub fn reboot_overhead(mut self, millis: Millis) -> Self {
        self.config.reboot_overhead_ms = millis;
        self
    }

    pub fn resume_application_overhead(mut self, millis: Millis) -> Self {
        self.config.resume_application_overhead_ms = millis;
        self
    }

    pub fn shallow_sleep_allowance(mut self, millis: Millis) -> Self {
        self.config.shallow_sleep_allowance_ms = millis;
        self
    }

    pub fn minimum_off_time(mut self, millis: Millis) -> Self {
        self.config.minimum_off_time_ms = millis;
        self
    }

    /// Sets the ratchet margin, in percent of the measured phase.
    pub fn ratchet_margin_percent(mut self, percent: u32) -> Self {
        self.config.ratchet_margin_percent = percent;
        self
    }

    pub fn build(self) -> SleepConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_give_documented_thresholds() {
        let config = SleepConfig::default();
        let budget = config.initial_budget();

        assert_eq!(config.idle_threshold(&budget), 3513);
        assert_eq!(config.minimum_deep_sleep_time(&budget), 3515);
        assert_eq!(config.maximum_shallow_sleep_time(&budget), 3512);
        assert_eq!(config.power_down_deadline(10_000, &budget), 9_200);
    }

    #[test]
    fn deadline_never_underflows() {
        let config = SleepConfig::default();
        let budget = config.initial_budget();
        assert_eq!(config.power_down_deadline(100, &budget), 0);
    }
}
