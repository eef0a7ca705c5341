//! Engine logging
//!
//! Every engine message goes through one process-wide [`Logger`]. The
//! default prints colored lines to stdout; applications swap it with
//! [`set_logger`] and drop noisy levels with [`set_min_severity`]. Errors
//! carry the file and line they were raised from.

use colored::*;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{OnceLock, RwLock};
use std::time::SystemTime;
use chrono::{DateTime, Local};

/// Process-wide logger (initialized with DefaultLogger on first use)
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

/// Entries below this severity are dropped before reaching the logger
static MIN_SEVERITY: AtomicU8 = AtomicU8::new(LogSeverity::Trace as u8);

/// Sink for engine log entries
///
/// # Example
///
/// ```no_run
/// use std::sync::Mutex;
/// use ignis_engine::ignis::log::{Logger, LogEntry, LogSeverity};
///
/// /// Keeps warnings and errors for an in-app console
/// struct ConsoleLogger {
///     lines: Mutex<Vec<String>>,
/// }
///
/// impl Logger for ConsoleLogger {
///     fn log(&self, entry: &LogEntry) {
///         if entry.severity >= LogSeverity::Warn {
///             if let Ok(mut lines) = self.lines.lock() {
///                 lines.push(format!("{}: {}", entry.source, entry.message));
///             }
///         }
///     }
/// }
/// ```
pub trait Logger: Send + Sync {
    fn log(&self, entry: &LogEntry);
}

/// One log message with its origin
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub severity: LogSeverity,
    pub timestamp: SystemTime,

    /// Emitting subsystem, e.g. "ignis::Device" or "ignis::vulkan"
    pub source: String,
    pub message: String,

    /// Set for entries logged with `log_detailed` (errors)
    pub file: Option<&'static str>,
    pub line: Option<u32>,
}

/// Ordered from most to least verbose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogSeverity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogSeverity {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LogSeverity::Trace,
            1 => LogSeverity::Debug,
            2 => LogSeverity::Info,
            3 => LogSeverity::Warn,
            _ => LogSeverity::Error,
        }
    }

    fn label(self) -> ColoredString {
        match self {
            LogSeverity::Trace => "TRACE".bright_black(),
            LogSeverity::Debug => "DEBUG".cyan(),
            LogSeverity::Info => "INFO ".green(),
            LogSeverity::Warn => "WARN ".yellow(),
            LogSeverity::Error => "ERROR".red().bold(),
        }
    }
}

/// Colored stdout logger:
/// `[2026-01-31 12:00:00.000] [WARN ] [ignis::Device] message`,
/// followed by `(file:line)` when the entry has a location.
pub struct DefaultLogger;

impl Logger for DefaultLogger {
    fn log(&self, entry: &LogEntry) {
        let local: DateTime<Local> = entry.timestamp.into();
        let location = match (entry.file, entry.line) {
            (Some(file), Some(line)) => format!(" ({}:{})", file, line),
            _ => String::new(),
        };

        println!(
            "[{}] [{}] [{}] {}{}",
            local.format("%Y-%m-%d %H:%M:%S%.3f"),
            entry.severity.label(),
            entry.source.bright_blue(),
            entry.message,
            location
        );
    }
}

fn logger_lock() -> &'static RwLock<Box<dyn Logger>> {
    LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)))
}

/// Replace the process-wide logger
///
/// # Example
///
/// ```no_run
/// use ignis_engine::ignis::log::{set_logger, DefaultLogger};
///
/// set_logger(DefaultLogger);
/// ```
pub fn set_logger<L: Logger + 'static>(logger: L) {
    if let Ok(mut lock) = logger_lock().write() {
        *lock = Box::new(logger);
    }
}

/// Reset logger to default (DefaultLogger)
pub fn reset_logger() {
    if let Ok(mut lock) = logger_lock().write() {
        *lock = Box::new(DefaultLogger);
    }
}

/// Drop every entry whose severity is below `severity`
pub fn set_min_severity(severity: LogSeverity) {
    MIN_SEVERITY.store(severity as u8, Ordering::Relaxed);
}

/// Current minimum severity
pub fn min_severity() -> LogSeverity {
    LogSeverity::from_u8(MIN_SEVERITY.load(Ordering::Relaxed))
}

/// Logging entry point used by the `ignis_*!` macros (no file:line)
pub fn log(severity: LogSeverity, source: &str, message: String) {
    dispatch(severity, source, message, None, None);
}

/// Logging entry point with file:line information (used by `ignis_error!`)
pub fn log_detailed(
    severity: LogSeverity,
    source: &str,
    message: String,
    file: &'static str,
    line: u32,
) {
    dispatch(severity, source, message, Some(file), Some(line));
}

fn dispatch(
    severity: LogSeverity,
    source: &str,
    message: String,
    file: Option<&'static str>,
    line: Option<u32>,
) {
    if severity < min_severity() {
        return;
    }
    if let Ok(lock) = logger_lock().read() {
        lock.log(&LogEntry {
            severity,
            timestamp: SystemTime::now(),
            source: source.to_string(),
            message,
            file,
            line,
        });
    }
}

/// Per-call detail (barriers, descriptor writes)
///
/// ```no_run
/// ignis_engine::ignis_trace!("ignis::Command", "Recording barrier");
/// ```
#[macro_export]
macro_rules! ignis_trace {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::log(
            $crate::log::LogSeverity::Trace,
            $source,
            format!($($arg)*)
        )
    };
}

/// Resource creation and other per-object events
///
/// ```no_run
/// ignis_engine::ignis_debug!("ignis::Device", "Created UBO {} ({} bytes)", 3, 64);
/// ```
#[macro_export]
macro_rules! ignis_debug {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::log(
            $crate::log::LogSeverity::Debug,
            $source,
            format!($($arg)*)
        )
    };
}

/// Device and swapchain lifecycle
#[macro_export]
macro_rules! ignis_info {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::log(
            $crate::log::LogSeverity::Info,
            $source,
            format!($($arg)*)
        )
    };
}

/// Degraded but working (missing optional feature, fallback present mode)
#[macro_export]
macro_rules! ignis_warn {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::log(
            $crate::log::LogSeverity::Warn,
            $source,
            format!($($arg)*)
        )
    };
}

/// Failure, logged with the caller's file:line
#[macro_export]
macro_rules! ignis_error {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::log_detailed(
            $crate::log::LogSeverity::Error,
            $source,
            format!($($arg)*),
            file!(),
            line!()
        )
    };
}

/// Log an ERROR and evaluate to the matching `Error::BackendError`
///
/// ```no_run
/// # use ignis_engine::ignis::Error;
/// let err: Error = ignis_engine::ignis_err!("ignis::vulkan", "vkQueueSubmit2 failed: {}", -4);
/// ```
#[macro_export]
macro_rules! ignis_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::log::log_detailed(
            $crate::log::LogSeverity::Error,
            $source,
            message.clone(),
            file!(),
            line!()
        );
        $crate::error::Error::BackendError(message)
    }};
}

/// Log an ERROR and return `Err(Error::BackendError)` from the enclosing function
#[macro_export]
macro_rules! ignis_bail {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::ignis_err!($source, $($arg)*))
    };
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
