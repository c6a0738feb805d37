//! Tests for the SleepConfig builder and derived thresholds.

use node_sleep::{SleepBudget, SleepConfig};

#[test]
fn sleep_config_builder() {
    let config = SleepConfig::builder()
        .initial_budgets(300, 400)
        .resume_thread_overhead(1)
        .wait_for_event_overhead(2)
        .reschedule_overhead(3)
        .reboot_overhead(40)
        .resume_application_overhead(5)
        .shallow_sleep_allowance(6)
        .minimum_off_time(1000)
        .ratchet_margin_percent(25)
        .build();

    assert_eq!(config.initial_tear_down_ms, 300);
    assert_eq!(config.initial_set_up_ms, 400);
    assert_eq!(config.resume_thread_overhead_ms, 1);
    assert_eq!(config.wait_for_event_overhead_ms, 2);
    assert_eq!(config.reschedule_overhead_ms, 3);
    assert_eq!(config.reboot_overhead_ms, 40);
    assert_eq!(config.resume_application_overhead_ms, 5);
    assert_eq!(config.shallow_sleep_allowance_ms, 6);
    assert_eq!(config.minimum_off_time_ms, 1000);
    assert_eq!(config.ratchet_margin_percent, 25);
}

#[test]
fn sleep_config_default() {
    let config = SleepConfig::default();

    assert_eq!(config.initial_tear_down_ms, 700);
    assert_eq!(config.initial_set_up_ms, 700);
    assert_eq!(config.reboot_overhead_ms, 95);
    assert_eq!(config.minimum_off_time_ms, 2000);
    assert_eq!(config.ratchet_margin_percent, 10);
    assert_eq!(SleepConfig::builder().build(), config);
}

#[test]
fn thresholds_follow_budgets() {
    let config = SleepConfig::builder()
        .initial_budgets(300, 400)
        .resume_thread_overhead(1)
        .wait_for_event_overhead(2)
        .reschedule_overhead(3)
        .reboot_overhead(40)
        .resume_application_overhead(5)
        .shallow_sleep_allowance(6)
        .minimum_off_time(1000)
        .build();
    let budget = config.initial_budget();

    // 300 + 400 + 1 + 40 + 5 + 2 + 1000
    assert_eq!(config.idle_threshold(&budget), 1748);
    assert_eq!(config.minimum_deep_sleep_time(&budget), 1751);
    assert_eq!(config.maximum_shallow_sleep_time(&budget), 1742);
    assert_eq!(config.power_down_deadline(5_000, &budget), 4_555);

    let grown = SleepBudget::new(500, 400);
    assert_eq!(config.idle_threshold(&grown), 1948);
}
