use core::fmt;

use node_hal::Millis;

/// Snapshot of the scheduler's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SleepStatistics {
    pub deep_sleep_count: u32,
    /// Includes simulated deep sleeps.
    pub total_deep_sleep: Millis,
    pub total_simulated_deep_sleep: Millis,
    pub total_shallow_sleep: Millis,
    pub up_time: Millis,
}

impl SleepStatistics {
    /// Share of the up time not spent asleep, rounded to whole percent.
    pub fn utilisation_percent(&self) -> u32 {
        if self.up_time == 0 {
            return 100;
        }
        let asleep = self.total_deep_sleep + self.total_shallow_sleep;
        let awake = self.up_time.saturating_sub(asleep);
        ((awake * 100 + self.up_time / 2) / self.up_time) as u32
    }
}

impl fmt::Display for SleepStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CPU utilisation     = {}%", self.utilisation_percent())?;
        writeln!(f, "Deep sleeps         = {}", self.deep_sleep_count)?;
        writeln!(f, "Total deep sleep    = {}", self.total_deep_sleep)?;
        writeln!(f, "Total shallow sleep = {}", self.total_shallow_sleep)?;
        write!(f, "Total up time       = {}", self.up_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utilisation_rounds_to_nearest_percent() {
        let stats = SleepStatistics {
            total_deep_sleep: 600,
            total_shallow_sleep: 395,
            up_time: 1_000,
            ..SleepStatistics::default()
        };
        assert_eq!(stats.utilisation_percent(), 1);
    }

    #[test]
    fn zero_up_time_counts_as_busy() {
        assert_eq!(SleepStatistics::default().utilisation_percent(), 100);
    }
}
