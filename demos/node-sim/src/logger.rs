//! Console logger: timestamped, coloured by level.

use chrono::Local;
use colored::Colorize;
use log::{Level, LevelFilter, Log, Metadata, Record};

struct ConsoleLogger {
    level: LevelFilter,
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = match record.level() {
            Level::Error => "ERROR".bright_red().bold(),
            Level::Warn => "WARN ".bright_yellow(),
            Level::Info => "INFO ".bright_green(),
            Level::Debug => "DEBUG".bright_blue(),
            Level::Trace => "TRACE".dimmed(),
        };
        let timestamp = Local::now().format("%H:%M:%S%.3f").to_string();
        println!(
            "{} {} {:16} {}",
            timestamp.dimmed(),
            level,
            record.target().cyan(),
            record.args()
        );
    }

    fn flush(&self) {}
}

pub fn init(level: LevelFilter) -> anyhow::Result<()> {
    log::set_logger(Box::leak(Box::new(ConsoleLogger { level })))
        .map_err(|err| anyhow::anyhow!("cannot install logger: {err}"))?;
    log::set_max_level(level);
    Ok(())
}
