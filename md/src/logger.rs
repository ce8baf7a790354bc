//! Structured per-step run log
//!
//! Fields are merged into a current record until a field name repeats; the
//! repeat marks the start of the next step and closes the record. Closed
//! records are written out as one JSON array.

use serde_json::{Map, Value};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

pub struct RunLog {
    current: Map<String, Value>,
    records: Vec<Map<String, Value>>,
    output: Option<PathBuf>,
    /// Persist after this many closed records, never if zero
    flush_every: usize,
    closed_since_flush: usize,
}

impl RunLog {
    pub fn new(output: Option<PathBuf>, flush_every: usize) -> Self {
        RunLog {
            current: Map::new(),
            records: Vec::new(),
            output,
            flush_every,
            closed_since_flush: 0,
        }
    }

    /// A log that is never written anywhere.
    pub fn in_memory() -> Self {
        Self::new(None, 0)
    }

    /// Merges a JSON object into the current record.
    pub fn insert(&mut self, fields: Value) {
        let fields = match fields {
            Value::Object(fields) => fields,
            other => {
                warn!("ignoring log entry that is not an object: {}", other);
                return;
            }
        };

        if fields.keys().any(|key| self.current.contains_key(key)) {
            self.close_record();
        }
        self.current.extend(fields);
    }

    fn close_record(&mut self) {
        if self.current.is_empty() {
            return;
        }
        self.records.push(std::mem::take(&mut self.current));
        self.closed_since_flush += 1;

        if self.flush_every > 0 && self.closed_since_flush >= self.flush_every {
            self.closed_since_flush = 0;
            if let Err(err) = self.persist() {
                warn!("could not write run log: {}", err);
            }
        }
    }

    /// Closed records, oldest first.
    pub fn records(&self) -> &[Map<String, Value>] {
        &self.records
    }

    pub fn current(&self) -> &Map<String, Value> {
        &self.current
    }

    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    /// Closes the open record and writes the full log.
    pub fn finish(&mut self) -> io::Result<()> {
        if !self.current.is_empty() {
            self.records.push(std::mem::take(&mut self.current));
        }
        self.closed_since_flush = 0;
        self.persist()
    }

    fn persist(&self) -> io::Result<()> {
        let Some(path) = &self.output else {
            return Ok(());
        };
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, &self.records)?;
        writer.flush()
    }
}
