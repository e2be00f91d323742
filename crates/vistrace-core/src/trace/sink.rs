// Append-only destinations for operation records

use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use super::{errors::TraceError, record::OperationRecord};

pub trait TraceSink {
    /// Append one record. Each append is a complete unit on its own.
    fn append(&mut self, record: &OperationRecord) -> Result<(), TraceError>;

    fn flush(&mut self) -> Result<(), TraceError> {
        Ok(())
    }
}

impl<S: TraceSink + ?Sized> TraceSink for Box<S> {
    fn append(&mut self, record: &OperationRecord) -> Result<(), TraceError> {
        (**self).append(record)
    }

    fn flush(&mut self) -> Result<(), TraceError> {
        (**self).flush()
    }
}

/// In-memory sink
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Vec<OperationRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[OperationRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<OperationRecord> {
        self.records
    }
}

impl TraceSink for MemorySink {
    fn append(&mut self, record: &OperationRecord) -> Result<(), TraceError> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// One JSON object per line, flushed after every record so a crash leaves a
/// readable prefix
pub struct JsonLinesSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    /// Create (or truncate) the log at `path`
    pub fn create(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TraceSink for JsonLinesSink {
    fn append(&mut self, record: &OperationRecord) -> Result<(), TraceError> {
        let line =
            serde_json::to_string(record).map_err(|e| TraceError::Serialization(e.to_string()))?;
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.write_all(b"\n"))
            .and_then(|_| self.writer.flush())
            .map_err(|e| TraceError::Sink(format!("{}: {e}", self.path.display())))
    }

    fn flush(&mut self) -> Result<(), TraceError> {
        self.writer
            .flush()
            .map_err(|e| TraceError::Sink(format!("{}: {e}", self.path.display())))
    }
}

/// Records recovered from a JSON-lines log
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedLog {
    pub records: Vec<OperationRecord>,
    /// Complete lines that did not parse
    pub malformed: usize,
    /// Whether the final line was cut short
    pub truncated: bool,
}

/// Parse a JSON-lines log, tolerating a truncated trailing line
pub fn parse_log(text: &str) -> ParsedLog {
    let mut parsed = ParsedLog::default();
    let complete = text.ends_with('\n');
    let lines: Vec<&str> = text.lines().collect();
    let last = lines.len().saturating_sub(1);

    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<OperationRecord>(line) {
            Ok(record) => parsed.records.push(record),
            Err(_) if i == last && !complete => {
                tracing::warn!(line = i + 1, "trace log ends with a truncated record");
                parsed.truncated = true;
            }
            Err(e) => {
                tracing::warn!(line = i + 1, error = %e, "skipping malformed trace record");
                parsed.malformed += 1;
            }
        }
    }
    parsed
}

pub fn read_log(path: impl AsRef<Path>) -> Result<ParsedLog, TraceError> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_log(&text))
}
