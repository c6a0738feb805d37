//! Simulated sensor node.
//!
//! Wires the driver registry, the USB power daemon and the sleep scheduler to
//! simulated hardware, then runs a sampling loop that sleeps between samples.
//! The simulated clock jumps over every sleep, so hours of node time pass in
//! moments.

mod config;
mod logger;
mod peripherals;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;
use node_drivers::{DriverRegistry, InterruptWaitArbiter, Tracer};
use node_hal::sim::{SimClock, SimInterruptLine, SimPin, SimPower, SimRegulator, SimUsbBus};
use node_hal::{Clock, InterruptLine, UsbBusState};
use node_sleep::{IdleMonitor, IdleTracker, SleepScheduler, SoakGate};
use node_usb_power::{UsbPowerDaemon, UsbPowerHardware};

use crate::config::NodeConfig;
use crate::peripherals::{Radio, StatusLed};

const USB_POWER_IRQ: u32 = 1 << 2;

#[derive(Parser, Debug)]
#[command(author, version, about = "Simulated sensor node with deep sleep")]
struct Opts {
    /// TOML file with `[sleep]` and `[usb]` sections.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of samples to take before exiting.
    #[arg(long, default_value_t = 8)]
    samples: u32,

    /// Sleep between samples.
    #[arg(long = "period", default_value_t = 10_000, value_name = "MS")]
    period_ms: u64,

    /// Plug a USB host in before this sample and unplug it two samples later.
    #[arg(long = "plug-usb", value_name = "SAMPLE")]
    plug_usb: Option<u32>,

    /// Trace every lifecycle and sleep decision.
    #[arg(long)]
    trace: bool,

    /// Simulate deep sleeps with shallow ones.
    #[arg(long)]
    diagnostic: bool,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Opts {
    fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    logger::init(opts.log_level())?;
    let config = NodeConfig::load(opts.config.as_deref())?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .context("installing Ctrl-C handler")?;
    }

    let clock = SimClock::running();
    let power = SimPower::new(Arc::clone(&clock));
    let line = SimInterruptLine::new();
    let usb_pin = SimPin::new(Arc::clone(&line), USB_POWER_IRQ);
    let usb_bus = SimUsbBus::new(Arc::clone(&line), config.usb.bus_irq_mask);
    let dyn_line: Arc<dyn InterruptLine> = line.clone();
    let interrupts = Arc::new(InterruptWaitArbiter::new(
        dyn_line,
        USB_POWER_IRQ | config.usb.bus_irq_mask,
    ));

    let tracer = Tracer::new();
    tracer.set_enabled(opts.trace);
    let registry = Arc::new(DriverRegistry::new(Arc::clone(&tracer)));

    let led = Arc::new(StatusLed::default());
    let radio = Arc::new(Radio::default());
    let usb = UsbPowerDaemon::new(
        config.usb.clone(),
        UsbPowerHardware {
            power_pin: usb_pin.clone(),
            bus: usb_bus.clone(),
            regulator: SimRegulator::new(),
            interrupts,
            clock: clock.clone(),
        },
        tracer,
    );
    registry.add(led.clone())?;
    registry.add(radio.clone())?;
    registry.add(Arc::new(usb.clone()))?;
    usb.start()?;

    let soak = Arc::new(SoakGate::new());
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let idle = Arc::new(IdleTracker::new(Arc::clone(&dyn_clock), Arc::clone(&soak)));
    let scheduler = Arc::new(
        SleepScheduler::builder(Arc::clone(&registry), dyn_clock, power.clone(), idle.clone())
            .config(config.sleep.clone())
            .soak_gate(soak)
            .inhibitor(Arc::new(usb.clone()))
            .diagnostic_mode(opts.diagnostic)
            .build(),
    );
    scheduler.start().context("starting sleep scheduler")?;
    log::info!(
        "drivers {:?}; minimum deep sleep {} ms",
        registry.names_in_order(),
        scheduler.minimum_deep_sleep_time()
    );

    idle.register();
    for sample in 1..=opts.samples {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        if opts.plug_usb == Some(sample) {
            log::info!("plugging in USB host");
            usb_pin.set_high(true);
            usb_bus.set_state(UsbBusState::Configured);
        } else if opts.plug_usb.map(|at| at + 2) == Some(sample) {
            log::info!("unplugging USB host");
            usb_bus.set_state(UsbBusState::Reset);
            usb_pin.set_high(false);
        }

        led.set(true);
        radio.queue_frame();
        log::info!(
            "sample {sample} at {} ms (USB {})",
            clock.now_millis(),
            usb.state()
        );
        // Every fourth frame is still in flight when the node goes to sleep.
        if sample % 4 != 0 {
            radio.flush();
        }
        led.set(false);

        if sample % 3 == 0 {
            match scheduler.ensure_deep_sleep(opts.period_ms) {
                Ok(()) => log::info!("guaranteed deep sleep done"),
                Err(err) => log::warn!("guaranteed deep sleep failed: {err}"),
            }
        } else if idle.sleep(opts.period_ms).is_err() {
            break;
        }
        radio.flush();
    }
    idle.deregister();

    scheduler.shutdown();
    registry.finalize_all();
    line.close();
    log::info!("power primitive calls: {:?}", power.calls());
    Ok(())
}
