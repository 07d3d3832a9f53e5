// crates/opspilot-runtime/src/logging.rs
// ============================================================================
// Module: Logger Construction
// Description: Builds the process-wide Logger the composition root hands to
// the kernel, from the configured level/format/output.
// Purpose: Turn the `logging` config section into a concrete `Arc<dyn
// Logger>` without introducing a logging facade crate.
// Dependencies: opspilot-core::logger
// ============================================================================

//! ## Overview
//! There is no `tracing`/`log` facade anywhere in this workspace's
//! dependency stack; every sink here composes around
//! [`opspilot_core::Logger`]. [`LevelFilteredLogger`] gates an inner logger
//! by a configured minimum [`LogLevel`]; [`JsonLogger`] renders each line as
//! one JSON object; [`RotatingFileLogger`] appends to a file on disk,
//! rotating it once it crosses a configured size and keeping a configured
//! number of numbered backups. [`build_logger`] assembles the sink the
//! `logging` config section describes.

use std::fs::File;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use opspilot_core::ConfigError;
use opspilot_core::Field;
use opspilot_core::LogLevel;
use opspilot_core::Logger;
use opspilot_core::StderrLogger;
use serde_json::json;

use crate::config::LogFormat;
use crate::config::LogOutput;
use crate::config::LoggingConfig;

/// Default rotation size when `logging.maxFileSize` is omitted.
const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
/// Default backup count when `logging.maxFiles` is omitted.
const DEFAULT_MAX_FILES: u32 = 5;

/// Decorates an inner [`Logger`], dropping every line below `minimum`.
pub struct LevelFilteredLogger {
    /// Sink every line at or above `minimum` is forwarded to.
    inner: Arc<dyn Logger>,
    /// Lowest level forwarded to `inner`.
    minimum: LogLevel,
}

impl LevelFilteredLogger {
    /// Wraps `inner`, filtering out lines below `minimum`.
    #[must_use]
    pub fn new(inner: Arc<dyn Logger>, minimum: LogLevel) -> Self {
        Self { inner, minimum }
    }
}

impl Logger for LevelFilteredLogger {
    fn log(&self, level: LogLevel, module: &str, message: &str, fields: &[Field]) {
        if level >= self.minimum {
            self.inner.log(level, module, message, fields);
        }
    }
}

/// Renders each line to an inner sink as one JSON object instead of text.
pub struct JsonLogger {
    /// Receives each rendered JSON line.
    sink: Box<dyn Fn(&str) + Send + Sync>,
}

impl JsonLogger {
    /// Writes rendered JSON lines through `sink`.
    #[must_use]
    pub fn new(sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self { sink: Box::new(sink) }
    }
}

impl Logger for JsonLogger {
    fn log(&self, level: LogLevel, module: &str, message: &str, fields: &[Field]) {
        let fields: serde_json::Map<String, serde_json::Value> = fields.iter().map(|field| (field.key.clone(), json!(field.value))).collect();
        let line = json!({
            "level": level.to_string(),
            "module": module,
            "message": message,
            "fields": fields,
        });
        (self.sink)(&line.to_string());
    }
}

/// Plain-text, size-rotated log file shared by every [`RotatingFileLogger`].
struct RotatingFile {
    /// Active log file path.
    path: PathBuf,
    /// Byte size at which the active file is rotated.
    max_size: u64,
    /// Backup count kept on rotation.
    max_backups: u32,
    /// Open handle to the active log file.
    handle: File,
    /// Bytes written to the active file so far.
    written: u64,
}

impl RotatingFile {
    /// Opens (creating if absent) the file at `path` for appending.
    fn open(path: PathBuf, max_size: u64, max_backups: u32) -> std::io::Result<Self> {
        let handle = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = handle.metadata()?.len();
        Ok(Self { path, max_size, max_backups, handle, written })
    }

    /// Appends `line` plus a trailing newline, rotating first if the active
    /// file has already crossed `max_size`.
    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        if self.written >= self.max_size {
            self.rotate()?;
        }
        writeln!(self.handle, "{line}")?;
        self.written += line.len() as u64 + 1;
        Ok(())
    }

    /// Shifts existing backups up by one index, moves the active file to
    /// `.1`, and reopens a fresh active file.
    fn rotate(&mut self) -> std::io::Result<()> {
        for index in (1..self.max_backups).rev() {
            let from = backup_path(&self.path, index);
            let to = backup_path(&self.path, index + 1);
            if from.exists() {
                std::fs::rename(from, to)?;
            }
        }
        if self.max_backups > 0 {
            std::fs::rename(&self.path, backup_path(&self.path, 1)).ok();
        }
        self.handle = OpenOptions::new().create(true).append(true).truncate(false).open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

/// Appends `.{index}` to `base`'s filename.
fn backup_path(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

/// Appends lines to a file on disk, rotating once the file crosses
/// `max_size` bytes and keeping up to `max_backups` numbered copies.
pub struct RotatingFileLogger {
    /// Shared, lockable handle to the active rotating file.
    file: Mutex<RotatingFile>,
}

impl RotatingFileLogger {
    /// Opens (creating if absent) the file at `path` for appending.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>, max_size: u64, max_backups: u32) -> std::io::Result<Self> {
        let file = RotatingFile::open(path.into(), max_size, max_backups)?;
        Ok(Self { file: Mutex::new(file) })
    }
}

impl Logger for RotatingFileLogger {
    #[allow(clippy::expect_used, reason = "a poisoned file-writer mutex means a prior writer panicked; the lock's contents are still valid")]
    fn log(&self, level: LogLevel, module: &str, message: &str, fields: &[Field]) {
        let rendered_fields: Vec<String> = fields.iter().map(|field| format!("{}={}", field.key, field.value)).collect();
        let suffix = if rendered_fields.is_empty() { String::new() } else { format!(" ({})", rendered_fields.join(", ")) };
        let line = format!("{level} [{module}] {message}{suffix}");
        let mut file = self.file.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let _ = file.write_line(&line);
    }
}

/// Assembles the logger the `logging` config section describes: output
/// chooses the base sink (stderr or a rotating file), then level and format
/// wrap it. `None` defaults to an unfiltered text [`StderrLogger`].
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] if `output` is `file` without a
/// `file_path`, or the file cannot be opened.
pub fn build_logger(config: Option<&LoggingConfig>) -> Result<Arc<dyn Logger>, ConfigError> {
    let Some(config) = config else {
        return Ok(Arc::new(StderrLogger));
    };

    let base: Arc<dyn Logger> = match config.output {
        LogOutput::Stderr => Arc::new(StderrLogger),
        LogOutput::File => {
            let path = config.file_path.clone().ok_or_else(|| ConfigError::Missing("logging.filePath".to_string()))?;
            let max_size = config.max_file_size.unwrap_or(DEFAULT_MAX_FILE_SIZE);
            let max_files = config.max_files.unwrap_or(DEFAULT_MAX_FILES);
            let logger = RotatingFileLogger::open(path.clone(), max_size, max_files).map_err(|err| ConfigError::Invalid {
                key: "logging.filePath".to_string(),
                message: format!("could not open {}: {err}", path.display()),
            })?;
            Arc::new(logger)
        }
    };

    let formatted: Arc<dyn Logger> = match config.format {
        LogFormat::Text => base,
        LogFormat::Json => {
            let inner = base;
            Arc::new(JsonLogger::new(move |line| inner.log(LogLevel::Info, "json-sink", line, &[])))
        }
    };

    let minimum = match config.level {
        crate::config::ConfiguredLogLevel::Debug => LogLevel::Debug,
        crate::config::ConfiguredLogLevel::Info => LogLevel::Info,
        crate::config::ConfiguredLogLevel::Warn => LogLevel::Warn,
        crate::config::ConfiguredLogLevel::Error => LogLevel::Error,
    };
    Ok(Arc::new(LevelFilteredLogger::new(formatted, minimum)))
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use std::sync::Arc;
    use std::sync::Mutex;

    use opspilot_core::Logger;

    use super::JsonLogger;
    use super::LevelFilteredLogger;
    use opspilot_core::CapturingLogger;
    use opspilot_core::LogLevel;

    #[test]
    fn level_filtered_logger_drops_lines_below_the_minimum() {
        let capturing = Arc::new(CapturingLogger::new());
        let logger = LevelFilteredLogger::new(Arc::clone(&capturing) as Arc<dyn Logger>, LogLevel::Warn);
        logger.log(LogLevel::Debug, "m", "dropped", &[]);
        logger.log(LogLevel::Error, "m", "kept", &[]);
        let lines = capturing.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("kept"));
    }

    #[test]
    fn json_logger_renders_a_parseable_object() {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink_collected = Arc::clone(&collected);
        let logger = JsonLogger::new(move |line| sink_collected.lock().expect("uncontended in test").push(line.to_string()));
        logger.log(LogLevel::Info, "detector.threshold.cpu", "incident created", &[opspilot_core::Field::new("incidentId", "abc")]);
        let lines = collected.lock().expect("uncontended in test");
        let parsed: serde_json::Value = serde_json::from_str(&lines[0]).expect("valid json line");
        assert_eq!(parsed["module"], "detector.threshold.cpu");
        assert_eq!(parsed["fields"]["incidentId"], "abc");
    }
}
