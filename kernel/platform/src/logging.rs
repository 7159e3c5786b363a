//! Kernel logging during bring-up

use core::fmt;
use core::fmt::Write;
use log::{Level, Log, Metadata, Record, SetLoggerError};

/// The byte sink log output is written to.
///
/// Which console exists (UART, semihosting, ...) is a board decision made by
/// whoever installs the logger; bring-up itself only pushes bytes.
pub trait Console: Sync {
    fn put_byte(&self, byte: u8);
}

/// A `log` implementation writing through a [`Console`]
pub struct KernelLogger {
    max_log_level: Level,
    console: &'static dyn Console,
}

impl KernelLogger {
    pub const fn new(max_log_level: Level, console: &'static dyn Console) -> KernelLogger {
        KernelLogger {
            max_log_level,
            console,
        }
    }

    pub fn install(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self).map(|_| log::set_max_level(self.max_log_level.to_level_filter()))
    }
}

/// Dummy struct that makes [`fmt::Arguments`] easy to convert to bytes by
/// offloading that to the [`Write`] trait.
struct ConsoleWriter<'a>(&'a dyn Console);

impl<'a> Write for ConsoleWriter<'a> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for &byte in s.as_bytes() {
            self.0.put_byte(byte);
        }
        Ok(())
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_log_level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            // formatting into a console sink cannot fail
            let _ = ConsoleWriter(self.console).write_fmt(format_args!(
                "{} - {}: {}\n",
                record.level(),
                record.target(),
                record.args(),
            ));
        }
    }

    fn flush(&self) {}
}
