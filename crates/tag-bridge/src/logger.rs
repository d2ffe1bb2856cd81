//! Minimal logger for bridge diagnostics.
//!
//! Prints `[elapsed LEVEL target] message` to stderr. The bridge entry points
//! install it once at initialization; embedders that already route the `log`
//! facade elsewhere can skip it entirely.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

struct BridgeLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for BridgeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let mut stderr = std::io::stderr();
        let _ = writeln!(
            stderr,
            "[{:8.3}s {:>5} {}] {}",
            elapsed,
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

static LOGGER: OnceLock<BridgeLogger> = OnceLock::new();

/// Install the bridge logger with the provided level filter.
///
/// Calling this more than once is a no-op after the first successful
/// initialization; so is calling it when another logger is already installed.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| BridgeLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}
