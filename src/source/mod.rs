//! Source declarations and streaming line-delimited record readers.
//!
//! Ownership model:
//! - `SourceSpec` is a plain declaration; it owns no open handles.
//! - `RecordReader` owns one buffered stream and its counters. Readers share
//!   no state, so each source stream is independent.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::io::SKIP_MALFORMED_MSG;
use crate::data::UpstreamRecord;
use crate::errors::CorpusError;
use crate::transport::fs::open_reader;
use crate::types::{CategoryId, SourceId};

/// Streaming decoder for back-to-back JSON objects without line delimiters.
pub mod concatenated;

/// One declared merge input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// File or directory of shard files.
    pub path: PathBuf,
    /// Category hint attached to every record from this source.
    pub category: CategoryId,
    /// Upstream dataset identifier attached to every record.
    #[serde(rename = "source")]
    pub source_id: SourceId,
    /// Stop after this many records from the source are retained.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_records: Option<u64>,
}

impl SourceSpec {
    /// Declare a source without a record cap.
    pub fn new(
        path: impl Into<PathBuf>,
        category: impl Into<CategoryId>,
        source_id: impl Into<SourceId>,
    ) -> Self {
        Self {
            path: path.into(),
            category: category.into(),
            source_id: source_id.into(),
            max_records: None,
        }
    }

    /// Cap the number of retained records taken from this source.
    pub fn with_max_records(mut self, max_records: u64) -> Self {
        self.max_records = Some(max_records);
        self
    }
}

/// Line-level counters for one reader.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReaderStats {
    /// Non-blank lines consumed.
    pub lines: u64,
    /// Lines decoded into records.
    pub records: u64,
    /// Lines that were not a JSON object.
    pub malformed: u64,
    /// Whitespace-only lines.
    pub blank: u64,
}

/// A decoded line together with its original text.
#[derive(Clone, Debug)]
pub struct RawRecord {
    /// The line as read, without surrounding whitespace or terminator.
    pub raw: String,
    /// Decoded object.
    pub record: UpstreamRecord,
}

/// Single-pass reader yielding one upstream record per line.
///
/// Malformed and blank lines are counted and skipped; only IO failures are
/// yielded as errors, after which the reader is exhausted.
pub struct RecordReader<R> {
    reader: R,
    label: String,
    buf: Vec<u8>,
    stats: ReaderStats,
    done: bool,
}

impl RecordReader<BufReader<File>> {
    /// Open `path` for streaming; a missing file is `InputMissing`.
    pub fn open(path: &Path) -> Result<Self, CorpusError> {
        Ok(Self::new(open_reader(path)?, path.display().to_string()))
    }
}

impl<R: BufRead> RecordReader<R> {
    /// Wrap a buffered reader; `label` identifies the stream in logs.
    pub fn new(reader: R, label: impl Into<String>) -> Self {
        Self {
            reader,
            label: label.into(),
            buf: Vec::new(),
            stats: ReaderStats::default(),
            done: false,
        }
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// Read the next record and keep its original line text.
    pub fn next_raw(&mut self) -> Option<Result<RawRecord, CorpusError>> {
        self.read_next(true)
            .map(|res| res.map(|(raw, record)| RawRecord { raw, record }))
    }

    fn read_next(&mut self, keep_raw: bool) -> Option<Result<(String, UpstreamRecord), CorpusError>> {
        loop {
            if self.done {
                return None;
            }
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {}
                Err(err) => {
                    self.done = true;
                    return Some(Err(err.into()));
                }
            }
            let line = self.buf.trim_ascii();
            if line.is_empty() {
                self.stats.blank += 1;
                continue;
            }
            self.stats.lines += 1;
            match serde_json::from_slice::<Value>(line) {
                Ok(Value::Object(record)) => {
                    self.stats.records += 1;
                    let raw = if keep_raw {
                        String::from_utf8_lossy(line).into_owned()
                    } else {
                        String::new()
                    };
                    return Some(Ok((raw, record)));
                }
                Ok(_) => {
                    self.stats.malformed += 1;
                    debug!(
                        stream = %self.label,
                        line = self.stats.lines,
                        reason = "not an object",
                        "{}",
                        SKIP_MALFORMED_MSG
                    );
                }
                Err(err) => {
                    self.stats.malformed += 1;
                    debug!(
                        stream = %self.label,
                        line = self.stats.lines,
                        error = %err,
                        "{}",
                        SKIP_MALFORMED_MSG
                    );
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<UpstreamRecord, CorpusError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next(false).map(|res| res.map(|(_, record)| record))
    }
}
