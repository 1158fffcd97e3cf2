use serde::Serialize;
use serde_json::{Deserializer, Value};
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::{info, warn};

use crate::constants::io::CONCAT_READ_CHUNK;
use crate::errors::CorpusError;
use crate::transport::fs::{create_writer, open_reader};

/// Counters for one concatenated-object parse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConcatenatedStats {
    /// Objects decoded and written as lines.
    pub objects: u64,
    /// Times the decoder resynchronized after undecodable bytes.
    pub recoveries: u64,
    /// Bytes discarded while resynchronizing (including a truncated tail).
    pub skipped_bytes: u64,
    /// True if the input ended inside an object.
    pub truncated_tail: bool,
}

/// Rewrites a stream of back-to-back JSON objects as one object per line.
///
/// Holds at most one refill chunk plus the object being decoded in memory.
#[derive(Clone, Debug)]
pub struct ConcatenatedParser {
    chunk_size: usize,
}

impl Default for ConcatenatedParser {
    fn default() -> Self {
        Self {
            chunk_size: CONCAT_READ_CHUNK,
        }
    }
}

impl ConcatenatedParser {
    /// Parser with the default refill chunk size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the number of bytes requested per refill (minimum 1).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Parse `input` into line-delimited `output`.
    pub fn parse_file(&self, input: &Path, output: &Path) -> Result<ConcatenatedStats, CorpusError> {
        let reader = open_reader(input)?;
        let mut writer = create_writer(output)?;
        let stats = self.parse_inner(reader, &mut writer, output)?;
        info!(
            input = %input.display(),
            output = %output.display(),
            objects = stats.objects,
            recoveries = stats.recoveries,
            skipped_bytes = stats.skipped_bytes,
            "[corpus:concat] parse complete"
        );
        Ok(stats)
    }

    /// Parse from any reader into any writer.
    pub fn parse<R: Read, W: Write>(
        &self,
        input: R,
        output: &mut W,
    ) -> Result<ConcatenatedStats, CorpusError> {
        self.parse_inner(input, output, Path::new("<output>"))
    }

    fn parse_inner<R: Read, W: Write>(
        &self,
        mut input: R,
        output: &mut W,
        output_path: &Path,
    ) -> Result<ConcatenatedStats, CorpusError> {
        let mut stats = ConcatenatedStats::default();
        let mut buf: Vec<u8> = Vec::with_capacity(self.chunk_size);
        let mut pos = 0usize;
        // Bytes drained from the front of `buf`, for absolute offsets in logs.
        let mut drained = 0u64;
        let mut eof = false;

        loop {
            pos += buf[pos..]
                .iter()
                .take_while(|byte| byte.is_ascii_whitespace())
                .count();
            if pos == buf.len() {
                if eof {
                    break;
                }
                eof = self.refill(&mut input, &mut buf, &mut pos, &mut drained)?;
                continue;
            }

            let (next, consumed) = {
                let mut stream = Deserializer::from_slice(&buf[pos..]).into_iter::<Value>();
                let next = stream.next();
                (next, stream.byte_offset())
            };
            match next {
                Some(Ok(value @ Value::Object(_))) => {
                    write_line(output, &value).map_err(|err| CorpusError::write(output_path, err))?;
                    stats.objects += 1;
                    pos += consumed;
                }
                Some(Err(err)) if err.is_eof() && !eof => {
                    eof = self.refill(&mut input, &mut buf, &mut pos, &mut drained)?;
                }
                Some(Err(err)) if err.is_eof() => {
                    let remaining = (buf.len() - pos) as u64;
                    warn!(
                        offset = drained + pos as u64,
                        bytes = remaining,
                        "[corpus:concat] input ends inside an object; dropping truncated tail"
                    );
                    stats.truncated_tail = true;
                    stats.skipped_bytes += remaining;
                    break;
                }
                Some(Ok(_)) | Some(Err(_)) => {
                    let start = pos;
                    let skipped = match buf[pos + 1..].iter().position(|byte| *byte == b'{') {
                        Some(next) => next + 1,
                        None => buf.len() - pos,
                    };
                    pos += skipped;
                    stats.recoveries += 1;
                    stats.skipped_bytes += skipped as u64;
                    warn!(
                        offset = drained + start as u64,
                        bytes = skipped,
                        "[corpus:concat] skipping undecodable bytes to next object start"
                    );
                }
                None => pos = buf.len(),
            }
        }

        output.flush().map_err(|err| CorpusError::write(output_path, err))?;
        Ok(stats)
    }

    /// Drop consumed bytes and append the next chunk; returns true at end of input.
    fn refill<R: Read>(
        &self,
        input: &mut R,
        buf: &mut Vec<u8>,
        pos: &mut usize,
        drained: &mut u64,
    ) -> Result<bool, CorpusError> {
        buf.drain(..*pos);
        *drained += *pos as u64;
        *pos = 0;
        let start = buf.len();
        buf.resize(start + self.chunk_size, 0);
        let read = loop {
            match input.read(&mut buf[start..]) {
                Ok(read) => break read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    buf.truncate(start);
                    return Err(err.into());
                }
            }
        };
        buf.truncate(start + read);
        Ok(read == 0)
    }
}

fn write_line<W: Write>(output: &mut W, value: &Value) -> io::Result<()> {
    serde_json::to_writer(&mut *output, value).map_err(io::Error::from)?;
    output.write_all(b"\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RecordReader;
    use std::io::Cursor;

    fn parse_str(input: &str, chunk_size: usize) -> (String, ConcatenatedStats) {
        let mut out = Vec::new();
        let stats = ConcatenatedParser::new()
            .with_chunk_size(chunk_size)
            .parse(Cursor::new(input.as_bytes()), &mut out)
            .unwrap();
        (String::from_utf8(out).unwrap(), stats)
    }

    #[test]
    fn splits_back_to_back_objects_and_skips_garbage() {
        let (out, stats) = parse_str(r#"{"a":1}{"b":2}garbage{"c":3}"#, 1024);
        assert_eq!(out, "{\"a\":1}\n{\"b\":2}\n{\"c\":3}\n");
        assert_eq!(stats.objects, 3);
        assert_eq!(stats.recoveries, 1);
        assert_eq!(stats.skipped_bytes, "garbage".len() as u64);
        assert!(!stats.truncated_tail);
    }

    #[test]
    fn tiny_chunks_refill_across_object_boundaries() {
        let input = "{\"text\": \"spans several refills\"}\n  {\"nested\": {\"k\": [1, 2, 3]}}";
        let (small, _) = parse_str(input, 3);
        let (large, _) = parse_str(input, 4096);
        assert_eq!(small, large);
        assert_eq!(
            small,
            "{\"text\":\"spans several refills\"}\n{\"nested\":{\"k\":[1,2,3]}}\n"
        );
    }

    #[test]
    fn truncated_tail_is_dropped_with_flag() {
        let (out, stats) = parse_str(r#"{"a":1}{"b":"unterminated"#, 4);
        assert_eq!(out, "{\"a\":1}\n");
        assert!(stats.truncated_tail);
        assert_eq!(stats.objects, 1);
    }

    #[test]
    fn non_object_values_are_treated_as_garbage() {
        let (out, stats) = parse_str(r#"42 "str" {"ok":true}"#, 2);
        assert_eq!(out, "{\"ok\":true}\n");
        assert_eq!(stats.objects, 1);
        assert!(stats.recoveries >= 1);
    }

    #[test]
    fn output_feeds_the_line_reader() {
        let (out, _) = parse_str(r#"{"text":"x"}{"text":"y"}"#, 5);
        let reader = RecordReader::new(Cursor::new(out), "concat");
        assert_eq!(reader.filter(Result::is_ok).count(), 2);
    }
}
