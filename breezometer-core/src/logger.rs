//! Pluggable, leveled logging.
//!
//! The client never logs through global state directly; it calls the
//! [`Logger`] it was built with. [`NoopLogger`] discards everything and
//! [`LogCrateLogger`] forwards to the `log` facade.

use std::fmt::Debug;

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// `context` carries the structured details (status, body, query) of the event.
pub trait Logger: Send + Sync + Debug {
    fn log(&self, level: LogLevel, context: &Value, message: &str);

    fn fatal(&self, context: &Value, message: &str) {
        self.log(LogLevel::Fatal, context, message);
    }

    fn error(&self, context: &Value, message: &str) {
        self.log(LogLevel::Error, context, message);
    }

    fn warn(&self, context: &Value, message: &str) {
        self.log(LogLevel::Warn, context, message);
    }

    fn info(&self, context: &Value, message: &str) {
        self.log(LogLevel::Info, context, message);
    }

    fn debug(&self, context: &Value, message: &str) {
        self.log(LogLevel::Debug, context, message);
    }

    fn trace(&self, context: &Value, message: &str) {
        self.log(LogLevel::Trace, context, message);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _level: LogLevel, _context: &Value, _message: &str) {}
}

/// Forwards to the `log` crate under the given target.
#[derive(Debug, Clone)]
pub struct LogCrateLogger {
    target: String,
}

impl LogCrateLogger {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl Default for LogCrateLogger {
    fn default() -> Self {
        Self::new("breezometer")
    }
}

impl Logger for LogCrateLogger {
    fn log(&self, level: LogLevel, context: &Value, message: &str) {
        let level = match level {
            LogLevel::Fatal | LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        };

        if context.is_null() {
            log::log!(target: self.target.as_str(), level, "{message}");
        } else {
            log::log!(target: self.target.as_str(), level, "{message} {context}");
        }
    }
}
