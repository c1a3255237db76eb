//! Per-session conversation log file
//!
//! Each session gets its own `conversation.log` next to its history and turn
//! records. Lines are leveled (`INFO`, `DEBUG`, `ERROR`) or structured
//! markers (`INPUT`, `OUTPUT`, `METADATA`), optionally tagged with a turn
//! number. Thread-safe via `Mutex<BufWriter<File>>`, flushed per line and on
//! `Drop`.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::errors::EngineError;

/// Line marker for the session log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMarker {
    Info,
    Debug,
    Error,
    Input,
    Output,
    Metadata,
}

impl fmt::Display for LogMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogMarker::Info => write!(f, "INFO"),
            LogMarker::Debug => write!(f, "DEBUG"),
            LogMarker::Error => write!(f, "ERROR"),
            LogMarker::Input => write!(f, "INPUT"),
            LogMarker::Output => write!(f, "OUTPUT"),
            LogMarker::Metadata => write!(f, "METADATA"),
        }
    }
}

/// Writer for one session's conversation log
pub struct SessionLogger {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl SessionLogger {
    /// Create the log file (and parent directories) for a session
    pub fn create(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                EngineError::Persistence(format!(
                    "Failed to create log directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = File::create(path).map_err(|e| {
            EngineError::Persistence(format!(
                "Failed to create log file {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
        })
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line with the given marker and optional turn tag
    pub fn log(&self, marker: LogMarker, turn: Option<u32>, message: &str) {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

        let line = match turn {
            Some(t) => format!("[{}] [{}] [turn {}] {}", timestamp, marker, t, message),
            None => format!("[{}] [{}] {}", timestamp, marker, message),
        };

        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", line);
            // Flush per line so a crashed session still leaves a usable log
            let _ = writer.flush();
        }
    }

    pub fn info(&self, message: &str) {
        self.log(LogMarker::Info, None, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogMarker::Error, None, message);
    }

    /// Record the text sent to a provider
    pub fn input(&self, turn: u32, text: &str) {
        self.log(LogMarker::Input, Some(turn), text);
    }

    /// Record the text received from a provider
    pub fn output(&self, turn: u32, text: &str) {
        self.log(LogMarker::Output, Some(turn), text);
    }

    /// Record timing and token metadata for a turn
    pub fn metadata(&self, turn: u32, details: &str) {
        self.log(LogMarker::Metadata, Some(turn), details);
    }
}

impl Drop for SessionLogger {
    fn drop(&mut self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_writes_tagged_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversation.log");
        let logger = SessionLogger::create(&path).unwrap();

        logger.info("session started");
        logger.input(1, "Discuss renewable energy");
        logger.output(1, "Solar is getting cheap.");
        logger.metadata(1, "provider=openai elapsed_ms=12 tokens=34");

        drop(logger);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.trim().lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("[INFO] session started"));
        assert!(lines[1].contains("[INPUT] [turn 1] Discuss renewable energy"));
        assert!(lines[2].contains("[OUTPUT] [turn 1]"));
        assert!(lines[3].contains("[METADATA] [turn 1] provider=openai"));
    }

    #[test]
    fn test_logger_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions").join("abc").join("conversation.log");
        let logger = SessionLogger::create(&path).unwrap();
        logger.info("hello");
        drop(logger);

        assert!(path.exists());
    }
}
