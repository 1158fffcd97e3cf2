use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::data::CanonicalRecord;
use crate::errors::CorpusError;
use crate::transport::fs::create_writer;

/// Append-only destination for canonical records.
///
/// Any error returned here aborts a merge.
pub trait RecordSink {
    /// Append one record.
    fn append(&mut self, record: &CanonicalRecord) -> Result<(), CorpusError>;
    /// Push buffered records to the underlying store.
    fn flush(&mut self) -> Result<(), CorpusError> {
        Ok(())
    }
}

impl RecordSink for Vec<CanonicalRecord> {
    fn append(&mut self, record: &CanonicalRecord) -> Result<(), CorpusError> {
        self.push(record.clone());
        Ok(())
    }
}

/// Line-delimited JSON sink: one record per newline-terminated line.
pub struct JsonlSink<W: Write> {
    writer: W,
    path: PathBuf,
    written: u64,
}

impl JsonlSink<BufWriter<File>> {
    /// Create (truncating) a corpus file at `path`.
    pub fn create(path: &Path) -> Result<Self, CorpusError> {
        Ok(Self::new(create_writer(path)?, path))
    }
}

impl<W: Write> JsonlSink<W> {
    /// Wrap a writer; `path` names the destination in errors.
    pub fn new(writer: W, path: impl Into<PathBuf>) -> Self {
        Self {
            writer,
            path: path.into(),
            written: 0,
        }
    }

    /// Records appended so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and return the inner writer.
    pub fn into_inner(mut self) -> Result<W, CorpusError> {
        RecordSink::flush(&mut self)?;
        Ok(self.writer)
    }
}

impl<W: Write> RecordSink for JsonlSink<W> {
    fn append(&mut self, record: &CanonicalRecord) -> Result<(), CorpusError> {
        serde_json::to_writer(&mut self.writer, record)
            .map_err(|err| CorpusError::write(&self.path, err.into()))?;
        self.writer
            .write_all(b"\n")
            .map_err(|err| CorpusError::write(&self.path, err))?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), CorpusError> {
        self.writer
            .flush()
            .map_err(|err| CorpusError::write(&self.path, err))
    }
}
