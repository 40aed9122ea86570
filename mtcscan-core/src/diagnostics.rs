use std::fmt;

/// Sink for detection diagnostics.
///
/// Implementations must not influence detection; every method defaults to a
/// no-op so a sink only overrides what it cares about.
pub trait Diagnostics {
    fn emit(&self, _level: log::Level, _message: fmt::Arguments<'_>) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Diagnostics for Silent {}

/// Forwards to the `log` facade under the `mtcscan` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn emit(&self, level: log::Level, message: fmt::Arguments<'_>) {
        log::log!(target: "mtcscan", level, "{}", message);
    }
}
