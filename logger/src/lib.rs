//! # Kernel Logger
//!
//! Structured logging for every Osmium subsystem.
//!
//! ## Philosophy
//!
//! Logging is explicit and component-tagged, not printf-scattered. A
//! [`Logger`] is an ordinary value: `main` constructs one and hands a
//! clone to each subsystem, so tests get isolated histories and nothing
//! reaches for a global.
//!
//! Entries are timestamped relative to logger creation (dmesg-style),
//! kept in a bounded in-memory history, optionally echoed to stdout, and
//! can be dumped to a file at shutdown.

use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Maximum number of retained history entries. Older entries are dropped.
pub const MAX_HISTORY: usize = 4096;

/// Log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    Critical = 4,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRIT",
        };
        f.write_str(s)
    }
}

struct LoggerInner {
    min_level: LogLevel,
    console_output: bool,
    history: VecDeque<String>,
    started: Instant,
}

/// Cloneable handle to a shared log sink
///
/// All clones append to the same mutex-guarded history.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Mutex<LoggerInner>>,
}

impl Logger {
    /// Creates a logger with console echo on and Info as minimum level
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LoggerInner {
                min_level: LogLevel::Info,
                console_output: true,
                history: VecDeque::new(),
                started: Instant::now(),
            })),
        }
    }

    /// Creates a silent logger for tests (nothing below Critical, no console)
    pub fn quiet() -> Self {
        let logger = Self::new();
        logger.set_level(LogLevel::Critical);
        logger.enable_console_output(false);
        logger
    }

    /// Sets the minimum level; entries below it are discarded
    pub fn set_level(&self, level: LogLevel) {
        self.inner.lock().unwrap().min_level = level;
    }

    /// Returns the current minimum level
    pub fn level(&self) -> LogLevel {
        self.inner.lock().unwrap().min_level
    }

    /// Turns stdout echo on or off
    pub fn enable_console_output(&self, enable: bool) {
        self.inner.lock().unwrap().console_output = enable;
    }

    /// Records an entry tagged with the originating component
    pub fn log(&self, level: LogLevel, component: &str, message: &str) {
        let mut inner = self.inner.lock().unwrap();
        if level < inner.min_level {
            return;
        }

        let uptime = inner.started.elapsed();
        let entry = format!(
            "[{:5}.{:03}] [{:5}] [{}] {}",
            uptime.as_secs(),
            uptime.subsec_millis(),
            level,
            component,
            message
        );

        if inner.history.len() == MAX_HISTORY {
            inner.history.pop_front();
        }
        inner.history.push_back(entry.clone());

        if inner.console_output {
            println!("{}", entry);
        }
    }

    /// Records a Debug entry
    pub fn debug(&self, component: &str, message: &str) {
        self.log(LogLevel::Debug, component, message);
    }

    /// Records an Info entry
    pub fn info(&self, component: &str, message: &str) {
        self.log(LogLevel::Info, component, message);
    }

    /// Records a Warn entry
    pub fn warn(&self, component: &str, message: &str) {
        self.log(LogLevel::Warn, component, message);
    }

    /// Records an Error entry
    pub fn error(&self, component: &str, message: &str) {
        self.log(LogLevel::Error, component, message);
    }

    /// Records a Critical entry
    pub fn critical(&self, component: &str, message: &str) {
        self.log(LogLevel::Critical, component, message);
    }

    /// Returns a copy of the retained history
    pub fn history(&self) -> Vec<String> {
        self.inner.lock().unwrap().history.iter().cloned().collect()
    }

    /// Discards the retained history
    pub fn clear_history(&self) {
        self.inner.lock().unwrap().history.clear();
    }

    /// Writes the retained history to a file, one entry per line
    pub fn dump_to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let inner = self.inner.lock().unwrap();
        let mut out = String::new();
        for entry in &inner.history {
            out.push_str(entry);
            out.push('\n');
        }
        fs::write(path, out)
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}
