//! Recorded traces stored as JSON lines
//!
//! One [`RecordedEvent`] per line, in receipt order. Blank lines are skipped.

use crate::core::types::RecordedEvent;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Iterator over the events of a trace
pub struct TraceReader<R> {
    lines: std::io::Lines<R>,
    line_number: usize,
}

impl TraceReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open trace file {}", path.display()))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(reader: R) -> Self {
        TraceReader {
            lines: reader.lines(),
            line_number: 0,
        }
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<RecordedEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_number += 1;
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    return Some(
                        Err(e).with_context(|| format!("Failed to read trace line {}", self.line_number)),
                    );
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str(&line)
                    .with_context(|| format!("Invalid event on trace line {}", self.line_number)),
            );
        }
    }
}

/// Write events as a trace, one line each
pub fn write_trace<W: Write>(mut writer: W, events: &[RecordedEvent]) -> Result<()> {
    for event in events {
        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        writeln!(writer, "{json}").context("Failed to write trace line")?;
    }
    writer.flush().context("Failed to flush trace")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::EventPayload;
    use std::io::Cursor;

    #[test]
    fn test_reads_events_and_skips_blank_lines() {
        let input = concat!(
            r#"{"metadata":{"process_id":1,"thread_id":2},"type":"thread_create"}"#,
            "\n\n   \n",
            r#"{"metadata":{"process_id":1,"thread_id":2},"type":"lock_acquire_result","lock":5,"success":true}"#,
            "\n",
        );
        let events: Vec<_> = TraceReader::new(Cursor::new(input))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(
            events,
            vec![
                RecordedEvent::new(1, 2, EventPayload::ThreadCreate),
                RecordedEvent::new(1, 2, EventPayload::LockAcquireResult { lock: 5, success: true }),
            ]
        );
    }

    #[test]
    fn test_parse_error_names_the_line() {
        let input = concat!(
            r#"{"metadata":{"process_id":1,"thread_id":2},"type":"thread_create"}"#,
            "\n\n",
            r#"{"metadata":{"process_id":1,"thread_id":2},"type":"no_such_event"}"#,
            "\n",
        );
        let mut reader = TraceReader::new(Cursor::new(input));
        assert!(reader.next().unwrap().is_ok());
        let err = reader.next().unwrap().unwrap_err();
        assert!(err.to_string().contains("line 3"));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_written_trace_reads_back() {
        let events = vec![
            RecordedEvent::new(4, 1, EventPayload::ThreadRename { name: "main".into() }),
            RecordedEvent::new(4, 1, EventPayload::GarbageCollected { objects: vec![1, 2, 3] }),
        ];
        let mut buffer = Vec::new();
        write_trace(&mut buffer, &events).unwrap();
        let read: Vec<_> = TraceReader::new(Cursor::new(buffer))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(read, events);
    }
}
