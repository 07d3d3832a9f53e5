// crates/opspilot-core/src/logger.rs
// ============================================================================
// Module: OpsPilot Logger Contract
// Description: Dependency-light structured logging trait and a handful of
// stock implementations.
// Purpose: Give modules a prefixed logger through their context without
// pulling in a logging facade crate.
// Dependencies: std::sync
// ============================================================================

//! ## Overview
//! The runtime does not depend on a logging facade crate; instead components
//! log through a small [`Logger`] trait, the same shape the source runtime
//! uses for its metrics seam. [`PrefixedLogger`] decorates an inner logger
//! with a fixed module id so every line a module emits is attributable.
//! [`StderrLogger`] is the default sink bundled with the CLI binary;
//! [`CapturingLogger`] is a test double that records lines for assertions.

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;

use crate::identifiers::ModuleId;

/// Severity of a logged line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Fine-grained diagnostic detail.
    Debug,
    /// Routine operational information.
    Info,
    /// An unexpected but non-fatal condition.
    Warn,
    /// A failure that aborted the current operation.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// A single structured field attached to a log line.
#[derive(Debug, Clone)]
pub struct Field {
    /// Field name.
    pub key: String,
    /// Field value, pre-rendered to a string.
    pub value: String,
}

impl Field {
    /// Builds a field from any displayable value.
    pub fn new(key: impl Into<String>, value: impl fmt::Display) -> Self {
        Self {
            key: key.into(),
            value: value.to_string(),
        }
    }
}

/// Structured logging contract. Implementations must not panic.
pub trait Logger: Send + Sync {
    /// Emits one log line at `level`, tagged with `module` and `fields`.
    fn log(&self, level: LogLevel, module: &str, message: &str, fields: &[Field]);
}

/// Writes formatted lines to stderr; the default sink for binaries.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrLogger;

impl Logger for StderrLogger {
    fn log(&self, level: LogLevel, module: &str, message: &str, fields: &[Field]) {
        use std::io::Write;

        let rendered = render_fields(fields);
        let _ = writeln!(std::io::stderr(), "{level} [{module}] {message}{rendered}");
    }
}

/// Renders `fields` as a trailing `" (k=v, ...)"` suffix, or an empty string.
fn render_fields(fields: &[Field]) -> String {
    if fields.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = fields.iter().map(|f| format!("{}={}", f.key, f.value)).collect();
    format!(" ({})", parts.join(", "))
}

/// Records every logged line in memory; used by tests that assert on log
/// output instead of stderr capture.
#[derive(Debug, Default, Clone)]
pub struct CapturingLogger {
    lines: Arc<Mutex<Vec<String>>>,
}

impl CapturingLogger {
    /// Creates an empty capturing logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every line logged so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned, which only happens if a
    /// prior holder panicked while holding the lock.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

impl Logger for CapturingLogger {
    fn log(&self, level: LogLevel, module: &str, message: &str, fields: &[Field]) {
        let rendered = render_fields(fields);
        let line = format!("{level} [{module}] {message}{rendered}");
        self.lines.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(line);
    }
}

/// Decorates an inner [`Logger`] with a fixed module id, so every call site
/// only ever needs `logger.info("message")`.
#[derive(Clone)]
pub struct PrefixedLogger {
    inner: Arc<dyn Logger>,
    module_id: ModuleId,
}

impl PrefixedLogger {
    /// Creates a prefixed logger tagging every line with `module_id`.
    #[must_use]
    pub fn new(inner: Arc<dyn Logger>, module_id: ModuleId) -> Self {
        Self { inner, module_id }
    }

    /// Logs at [`LogLevel::Debug`].
    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message, &[]);
    }

    /// Logs at [`LogLevel::Info`].
    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message, &[]);
    }

    /// Logs at [`LogLevel::Warn`].
    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message, &[]);
    }

    /// Logs at [`LogLevel::Error`].
    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message, &[]);
    }

    /// Logs with explicit structured fields.
    pub fn log(&self, level: LogLevel, message: &str, fields: &[Field]) {
        self.inner.log(level, self.module_id.as_str(), message, fields);
    }
}

#[cfg(test)]
mod tests {
    use super::CapturingLogger;
    use super::LogLevel;
    use super::Logger;
    use super::PrefixedLogger;
    use crate::identifiers::ModuleId;
    use std::sync::Arc;

    #[test]
    fn prefixed_logger_tags_lines_with_module_id() {
        let capturing = CapturingLogger::new();
        let logger = PrefixedLogger::new(Arc::new(capturing.clone()), ModuleId::new("detector.threshold.cpu"));
        logger.info("started");
        let lines = capturing.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("detector.threshold.cpu"));
        assert!(lines[0].contains("started"));
    }

    #[test]
    fn fields_are_rendered_in_order() {
        let capturing = CapturingLogger::new();
        capturing.log(LogLevel::Warn, "m", "msg", &[super::Field::new("k", "v")]);
        assert!(capturing.lines()[0].contains("k=v"));
    }
}
