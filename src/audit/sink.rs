//! Append-only sinks the audit consumer writes serialized events to.

use async_trait::async_trait;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Mutex;

use super::AuditError;

/// Where the audit consumer appends serialized event lines.
///
/// Implementations should be cheap to retry — the consumer calls
/// [`Self::append`] again with backoff on failure rather than
/// propagating the error to the pipeline.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one already-serialized line (without trailing newline) to the sink.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::SinkWrite`] if the write could not complete.
    async fn append(&self, line: &str) -> Result<(), AuditError>;

    /// Identifier used in error messages and Health/Metrics.
    fn name(&self) -> &str;
}

/// Appends line-delimited JSON to a file, the default sink.
pub struct JsonlFileSink {
    path: PathBuf,
    file: Mutex<std::fs::File>,
}

impl JsonlFileSink {
    /// Open (creating if absent) the file at `path` for appending.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::SinkWrite`] if the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AuditError::SinkWrite {
                sink: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl AuditSink for JsonlFileSink {
    async fn append(&self, line: &str) -> Result<(), AuditError> {
        let mut file = self.file.lock().expect("audit sink file lock poisoned");
        writeln!(file, "{line}").map_err(|e| AuditError::SinkWrite {
            sink: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn name(&self) -> &str {
        "jsonl_file"
    }
}

/// An in-memory sink for tests and embedding scenarios that want to inspect
/// emitted events directly rather than reading a file back.
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    /// Build an empty in-memory sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of every line appended so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("memory sink lock poisoned").clone()
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn append(&self, line: &str) -> Result<(), AuditError> {
        self.lines.lock().expect("memory sink lock poisoned").push(line.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// A sink that always fails, for exercising the consumer's retry/backoff path.
#[cfg(test)]
pub struct FailingSink;

#[cfg(test)]
#[async_trait]
impl AuditSink for FailingSink {
    async fn append(&self, _line: &str) -> Result<(), AuditError> {
        Err(AuditError::SinkWrite {
            sink: "failing".into(),
            reason: "always fails".into(),
        })
    }

    fn name(&self) -> &str {
        "failing"
    }
}
