use std::fs;
use std::path::Path;

use anyhow::Context;
use node_sleep::SleepConfig;
use node_usb_power::UsbPowerConfig;
use serde::Deserialize;

/// Contents of the node configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub sleep: SleepConfig,
    pub usb: UsbPowerConfig,
}

impl NodeConfig {
    /// Defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: NodeConfig = toml::from_str(
            "[sleep]\nreboot_overhead_ms = 120\n\n[usb]\nenumeration_grace_ms = 250\n",
        )
        .unwrap();

        assert_eq!(config.sleep.reboot_overhead_ms, 120);
        assert_eq!(config.sleep.initial_tear_down_ms, 700);
        assert_eq!(config.usb.enumeration_grace_ms, 250);
        assert_eq!(config.usb.bus_irq_mask, UsbPowerConfig::default().bus_irq_mask);
    }

    #[test]
    fn missing_path_gives_defaults() {
        let config = NodeConfig::load(None).unwrap();
        assert_eq!(config.sleep, SleepConfig::default());
    }
}
