//! Diagnostic log, kept apart from the USB console
//!
//! Lines are tagged with their level and written to whatever byte sink the
//! firmware was built with (USART1 under the `debug` feature, nothing
//! otherwise). Formatting goes through `ufmt` so the log costs no float or
//! `core::fmt` code on the target.

use core::convert::Infallible;

use embedded_hal::serial;
use ufmt::uWrite;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

impl Level {
    pub fn tag(self) -> &'static str {
        match self {
            Level::Error => "[ERR] ",
            Level::Warn => "[WRN] ",
            Level::Info => "[INF] ",
            Level::Debug => "[DBG] ",
        }
    }
}

/// Line-oriented log sink
pub trait Log: uWrite {
    fn enabled(&self, level: Level) -> bool;
    fn begin(&mut self, level: Level);
    fn end(&mut self);
}

#[macro_export]
macro_rules! log {
    ($sink:expr, $level:expr, $($arg:tt)+) => {{
        let sink = &mut $sink;
        if $crate::logger::Log::enabled(&*sink, $level) {
            $crate::logger::Log::begin(sink, $level);
            ufmt::uwrite!(sink, $($arg)+).ok();
            $crate::logger::Log::end(sink);
        }
    }};
}

#[macro_export]
macro_rules! error {
    ($sink:expr, $($arg:tt)+) => { $crate::log!($sink, $crate::logger::Level::Error, $($arg)+) };
}

#[macro_export]
macro_rules! warn {
    ($sink:expr, $($arg:tt)+) => { $crate::log!($sink, $crate::logger::Level::Warn, $($arg)+) };
}

#[macro_export]
macro_rules! info {
    ($sink:expr, $($arg:tt)+) => { $crate::log!($sink, $crate::logger::Level::Info, $($arg)+) };
}

#[macro_export]
macro_rules! debug {
    ($sink:expr, $($arg:tt)+) => { $crate::log!($sink, $crate::logger::Level::Debug, $($arg)+) };
}

/// Log over a blocking byte-serial port
pub struct SerialLog<W> {
    port: W,
    max_level: Level,
}

impl<W: serial::Write<u8>> SerialLog<W> {
    pub fn new(port: W, max_level: Level) -> Self {
        Self { port, max_level }
    }

    pub fn release(self) -> W {
        self.port
    }
}

impl<W: serial::Write<u8>> uWrite for SerialLog<W> {
    type Error = W::Error;

    fn write_str(&mut self, s: &str) -> Result<(), W::Error> {
        for byte in s.bytes() {
            nb::block!(self.port.write(byte))?;
        }
        Ok(())
    }
}

impl<W: serial::Write<u8>> Log for SerialLog<W> {
    fn enabled(&self, level: Level) -> bool {
        level <= self.max_level
    }

    fn begin(&mut self, level: Level) {
        self.write_str(level.tag()).ok();
    }

    fn end(&mut self) {
        self.write_str("\r\n").ok();
        nb::block!(self.port.flush()).ok();
    }
}

/// Sink for builds without a diagnostic port
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLog;

impl uWrite for NoLog {
    type Error = Infallible;

    fn write_str(&mut self, _s: &str) -> Result<(), Infallible> {
        Ok(())
    }
}

impl Log for NoLog {
    fn enabled(&self, _level: Level) -> bool {
        false
    }

    fn begin(&mut self, _level: Level) {}

    fn end(&mut self) {}
}
