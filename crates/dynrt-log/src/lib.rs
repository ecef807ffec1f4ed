//! Leveled logging for the `dynrt` runtime.
//!
//! A single global logger holds the active [`Level`] in an atomic, so the
//! check performed by every macro is one relaxed load. Records are written to
//! stderr tagged with the module path of the call site.
//!
//! # Example
//!
//! ```
//! use dynrt_log::{Level, debug, warn};
//!
//! dynrt_log::set_level(Level::Debug);
//!
//! debug!("instantiated {} with {} arguments", "List", 1);
//! warn!("benign cast from {} to {}", "Iterable<dynamic>", "Iterable<int>");
//! ```

use std::fmt::{self, Arguments};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

/// Severity of a log record, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Failures the runtime cannot recover from.
    Error = 0,
    /// Suspicious but tolerated situations.
    Warn = 1,
    /// Coarse lifecycle events.
    Info = 2,
    /// Registrations and cache misses.
    Debug = 3,
    /// Per-operation tracing.
    Trace = 4,
}

impl Level {
    /// Upper-case label used in output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    const fn from_u8(raw: u8) -> Level {
        match raw {
            0 => Level::Error,
            1 => Level::Warn,
            2 => Level::Info,
            3 => Level::Debug,
            _ => Level::Trace,
        }
    }

    const fn color(self) -> &'static str {
        match self {
            Level::Error => "\x1b[31m",
            Level::Warn => "\x1b[33m",
            Level::Info => "\x1b[32m",
            Level::Debug => "\x1b[36m",
            Level::Trace => "\x1b[35m",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no [`Level`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLevelError(String);

impl fmt::Display for ParseLevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid log level: {}", self.0)
    }
}

impl std::error::Error for ParseLevelError {}

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Level::Error),
            "warn" | "warning" => Ok(Level::Warn),
            "info" => Ok(Level::Info),
            "debug" => Ok(Level::Debug),
            "trace" => Ok(Level::Trace),
            _ => Err(ParseLevelError(s.to_owned())),
        }
    }
}

/// The global logger.
pub struct Logger {
    level: AtomicU8,
}

impl Logger {
    const fn new(level: Level) -> Self {
        Logger {
            level: AtomicU8::new(level as u8),
        }
    }

    /// Sets the most verbose level that will be written.
    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    /// Returns the active level.
    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Whether a record at `level` would be written.
    #[inline]
    pub fn enabled(&self, level: Level) -> bool {
        level as u8 <= self.level.load(Ordering::Relaxed)
    }
}

static LOGGER: Logger = Logger::new(Level::Warn);

/// Returns the global logger. Starts at [`Level::Warn`].
pub fn get_logger() -> &'static Logger {
    &LOGGER
}

/// Sets the level of the global logger.
pub fn set_level(level: Level) {
    LOGGER.set_level(level);
}

/// Parses `s` and sets the level of the global logger.
pub fn set_level_from_str(s: &str) -> Result<(), ParseLevelError> {
    set_level(s.parse()?);
    Ok(())
}

/// Reads the level from environment variable `var` when it is set.
///
/// Returns the level that was applied, or `None` when the variable is absent.
pub fn init_from_env(var: &str) -> Result<Option<Level>, ParseLevelError> {
    match std::env::var(var) {
        Ok(raw) => {
            let level = raw.parse()?;
            set_level(level);
            Ok(Some(level))
        }
        Err(_) => Ok(None),
    }
}

#[doc(hidden)]
pub fn __write(level: Level, target: &str, args: Arguments<'_>) {
    const RESET: &str = "\x1b[0m";
    eprintln!("{}[{level}]{RESET} {target}: {args}", level.color());
}

/// Writes a record at an explicit level.
#[macro_export]
macro_rules! log {
    (level: $level:expr, $($arg:tt)+) => {{
        let level = $level;
        if $crate::get_logger().enabled(level) {
            $crate::__write(level, module_path!(), format_args!($($arg)+));
        }
    }};
}

/// Writes a record at [`Level::Error`].
#[macro_export]
macro_rules! error {
    ($($arg:tt)+) => { $crate::log!(level: $crate::Level::Error, $($arg)+) };
}

/// Writes a record at [`Level::Warn`].
#[macro_export]
macro_rules! warn {
    ($($arg:tt)+) => { $crate::log!(level: $crate::Level::Warn, $($arg)+) };
}

/// Writes a record at [`Level::Info`].
#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => { $crate::log!(level: $crate::Level::Info, $($arg)+) };
}

/// Writes a record at [`Level::Debug`].
#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => { $crate::log!(level: $crate::Level::Debug, $($arg)+) };
}

/// Writes a record at [`Level::Trace`].
#[macro_export]
macro_rules! trace {
    ($($arg:tt)+) => { $crate::log!(level: $crate::Level::Trace, $($arg)+) };
}
