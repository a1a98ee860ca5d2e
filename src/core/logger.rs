//! Structured replay log
//!
//! Writes one JSON object per line: every event the pipeline handled (with
//! its outcome) and every newly detected deadlock. File I/O happens on a
//! background writer thread fed through a channel, so logging never stalls
//! the replay. A process-wide instance is installed with [`init_logger`].
//!
//! Leveled human-readable diagnostics go through `tracing`; this log is the
//! machine-readable record of a run.

use crate::core::types::{CommandId, DeadlockInfo, EventPayload, EventState, RecordedEvent};
use anyhow::{Context, Result};
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// One handled event
#[derive(Debug, Serialize, Clone)]
pub struct LogEntry {
    pub process_id: u32,
    pub thread_id: u64,
    pub state: EventState,
    pub event: EventPayload,
    /// Seconds since the Unix epoch with microsecond precision
    pub timestamp: f64,
}

/// First sighting of a deadlock
#[derive(Debug, Serialize, Clone)]
pub struct DeadlockRecord {
    pub deadlock: DeadlockInfo,
    /// Correlation id of the stack-trace snapshot request, if one was sent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<CommandId>,
    pub timestamp: f64,
}

/// A single line of the log
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum LogRecord {
    Event(LogEntry),
    Deadlock(DeadlockRecord),
}

enum LoggerCommand {
    Write(LogRecord),
    Flush(Sender<()>),
}

/// JSON-lines logger backed by a writer thread
pub struct EventLogger {
    sender: Sender<LoggerCommand>,
    path: PathBuf,
}

impl EventLogger {
    /// Open (truncate) a log file and start its writer thread
    ///
    /// A `{timestamp}` placeholder in the file name is replaced with the
    /// current UTC time. Missing parent directories are created.
    pub fn with_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = expand_timestamp(path.as_ref());

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;

        let (tx, rx) = unbounded::<LoggerCommand>();
        thread::Builder::new()
            .name("hbtrace-logger".into())
            .spawn(move || writer_thread(file, rx))
            .context("Failed to spawn logger thread")?;

        Ok(EventLogger { sender: tx, path })
    }

    /// Path of the file being written, after placeholder expansion
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log_event(&self, event: &RecordedEvent, state: EventState) {
        self.send(LogRecord::Event(LogEntry {
            process_id: event.metadata.process_id,
            thread_id: event.metadata.thread_id,
            state,
            event: event.payload.clone(),
            timestamp: now(),
        }));
    }

    pub fn log_deadlock(&self, deadlock: &DeadlockInfo, command_id: Option<CommandId>) {
        self.send(LogRecord::Deadlock(DeadlockRecord {
            deadlock: deadlock.clone(),
            command_id,
            timestamp: now(),
        }));
    }

    /// Block until everything sent so far is on disk
    ///
    /// # Errors
    /// Fails if the writer thread is gone or does not answer within ten
    /// seconds.
    pub fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = bounded(1);
        self.sender
            .send(LoggerCommand::Flush(done_tx))
            .map_err(|_| anyhow::anyhow!("Logger thread has stopped"))?;
        done_rx
            .recv_timeout(FLUSH_TIMEOUT)
            .context("Flush operation timed out")
    }

    fn send(&self, record: LogRecord) {
        if let Err(e) = self.sender.send(LoggerCommand::Write(record)) {
            tracing::error!("failed to queue log record: {e}");
        }
    }
}

impl Drop for EventLogger {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!("failed to flush logs while dropping logger: {e:?}");
        }
    }
}

fn writer_thread(file: File, rx: Receiver<LoggerCommand>) {
    let mut writer = BufWriter::new(file);

    while let Ok(cmd) = rx.recv() {
        match cmd {
            LoggerCommand::Write(record) => match serde_json::to_string(&record) {
                Ok(json) => {
                    if let Err(e) = writeln!(writer, "{json}") {
                        tracing::error!("logger write error: {e}");
                    }
                }
                Err(e) => tracing::error!("failed to serialize log record: {e}"),
            },
            LoggerCommand::Flush(done) => {
                if let Err(e) = writer.flush() {
                    tracing::error!("logger flush error: {e}");
                }
                let _ = done.send(());
            }
        }
    }

    // Channel closed
    if let Err(e) = writer.flush() {
        tracing::error!("logger final flush error: {e}");
    }
}

#[allow(clippy::literal_string_with_formatting_args)]
fn expand_timestamp(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if raw.contains("{timestamp}") {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        PathBuf::from(raw.replace("{timestamp}", &stamp))
    } else {
        path.to_path_buf()
    }
}

fn now() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + now.timestamp_subsec_micros() as f64 / 1_000_000.0
}

lazy_static::lazy_static! {
    static ref GLOBAL_LOGGER: Mutex<Option<EventLogger>> = Mutex::new(None);
}

/// Install the process-wide logger, or disable logging with `None`
///
/// # Returns
/// The resolved log file path when logging was enabled
pub fn init_logger<P: AsRef<Path>>(path: Option<P>) -> Result<Option<PathBuf>> {
    let logger = path
        .map(EventLogger::with_file)
        .transpose()
        .context("Failed to create logger with file")?;
    let resolved = logger.as_ref().map(|l| l.path().to_path_buf());
    *GLOBAL_LOGGER.lock() = logger;
    Ok(resolved)
}

/// Log a handled event to the global logger (if enabled)
pub fn log_event(event: &RecordedEvent, state: EventState) {
    if let Some(logger) = GLOBAL_LOGGER.lock().as_ref() {
        logger.log_event(event, state);
    }
}

/// Log a newly detected deadlock to the global logger (if enabled)
pub fn log_deadlock(deadlock: &DeadlockInfo, command_id: Option<CommandId>) {
    if let Some(logger) = GLOBAL_LOGGER.lock().as_ref() {
        logger.log_deadlock(deadlock, command_id);
    }
}

/// Flush the global logger; a no-op when logging is disabled
pub fn flush_logs() -> Result<()> {
    match GLOBAL_LOGGER.lock().as_ref() {
        Some(logger) => logger.flush(),
        None => Ok(()),
    }
}

pub fn is_logging_enabled() -> bool {
    GLOBAL_LOGGER.lock().is_some()
}

/// Path of the active global log file
pub fn current_log_file() -> Option<PathBuf> {
    GLOBAL_LOGGER.lock().as_ref().map(|l| l.path().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DeadlockThreadInfo, ProcessThreadId, WaitInfo};
    use tempfile::TempDir;

    #[test]
    fn test_event_lines_are_written_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("events.log");
        let logger = EventLogger::with_file(&log_path).unwrap();

        logger.log_event(&RecordedEvent::new(1, 5, EventPayload::ThreadCreate), EventState::Executed);
        logger.log_event(
            &RecordedEvent::new(1, 5, EventPayload::LockAcquireResult { lock: 9, success: true }),
            EventState::Deferred,
        );
        logger.flush().unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["record"], "event");
        assert_eq!(lines[0]["event"]["type"], "thread_create");
        assert_eq!(lines[1]["state"], "deferred");
        assert_eq!(lines[1]["event"]["lock"], 9);
    }

    #[test]
    fn test_deadlock_record_carries_command_id() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("deadlock.log");
        let logger = EventLogger::with_file(&log_path).unwrap();

        let t1 = ProcessThreadId::new(3, 1);
        let t2 = ProcessThreadId::new(3, 2);
        let info = DeadlockInfo {
            process_id: 3,
            cycle: vec![
                DeadlockThreadInfo {
                    thread: t1,
                    display_name: "Thread-1".into(),
                    blocked_on: t2,
                    wait_info: WaitInfo::Thread { joinee: t2 },
                },
                DeadlockThreadInfo {
                    thread: t2,
                    display_name: "Thread-2".into(),
                    blocked_on: t1,
                    wait_info: WaitInfo::Thread { joinee: t1 },
                },
            ],
            timestamp: Utc::now().to_rfc3339(),
        };
        logger.log_deadlock(&info, Some(CommandId(7)));
        logger.flush().unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        let line: serde_json::Value = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(line["record"], "deadlock");
        assert_eq!(line["command_id"], 7);
        assert_eq!(line["deadlock"]["cycle"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_timestamp_placeholder_and_nested_directory() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("nested/dir/run_{timestamp}.log");
        let logger = EventLogger::with_file(&log_path).unwrap();

        let name = logger.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("run_"));
        assert!(!name.contains("{timestamp}"));
        assert!(logger.path().exists());
    }

    #[test]
    fn test_flush_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let logger = EventLogger::with_file(temp_dir.path().join("flush.log")).unwrap();
        for tid in 0..10 {
            logger.log_event(&RecordedEvent::new(1, tid, EventPayload::ThreadCreate), EventState::Executed);
        }
        logger.flush().unwrap();
        logger.flush().unwrap();

        let contents = std::fs::read_to_string(logger.path()).unwrap();
        assert_eq!(contents.lines().count(), 10);
    }
}
