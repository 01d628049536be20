//! Structured logging: wires `slog` through `sloggers`, building a logger
//! from a small
//! config struct, then install it as the process-wide logger so ordinary
//! `log`/`slog` call sites work without threading a `Logger` everywhere.

use slog::Drain;
use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::Build;

/// Where log output goes. Only terminal destinations are modeled — a file
/// sink can be added the same way once the embedding binary needs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDestination {
    Stdout,
    Stderr,
}

impl Default for LogDestination {
    fn default() -> Self {
        LogDestination::Stderr
    }
}

/// Logging knobs an embedder sets before calling [`init`]. There is no
/// parser attached to this struct on purpose — reading it from a file or
/// flags is the excluded, transport-owned concern.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub destination: LogDestination,
    pub level: Severity,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            destination: LogDestination::default(),
            level: Severity::Debug,
        }
    }
}

/// Build a root [`slog::Logger`] from `config` and install it as both the
/// process-wide `slog_scope` logger and the backing implementation for the
/// standard `log` facade, so every module can log with the lightweight
/// `slog::{debug, info, warn, error}` macros or `log::*` interchangeably.
///
/// Returns a guard that must be kept alive for the duration of the process;
/// dropping it restores the previous global logger.
pub fn init(config: &LoggingConfig) -> slog_scope::GlobalLoggerGuard {
    let mut builder = TerminalLoggerBuilder::new();
    builder.level(config.level);
    builder.destination(match config.destination {
        LogDestination::Stdout => Destination::Stdout,
        LogDestination::Stderr => Destination::Stderr,
    });

    let logger = builder.build().expect("terminal logger config is always valid");
    let guard = slog_scope::set_global_logger(logger);
    slog_stdlog::init().ok();
    guard
}

/// Build a logger without installing it globally — useful for tests that
/// want isolated output instead of fighting over the process-wide logger.
pub fn test_logger() -> slog::Logger {
    let drain = slog::Discard;
    slog::Logger::root(drain, slog::o!())
}
