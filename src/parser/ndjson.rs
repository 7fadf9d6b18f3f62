//! NDJSON (line-delimited JSON) parser.
//!
//! Grounded on the reference `ndjson_parser.rs`'s `memchr(b'\n', ...)` line
//! splitting and line skip-if-blank behavior, generalized from passthrough
//! validation to structured record construction.

use memchr::memchr;

use crate::buffer::ByteBuffer;
use crate::error::{ConvertError, Result};
use crate::record::{Record, Value};

use super::RecordParser;

#[derive(Default)]
pub struct NdjsonParser {
    bytes_consumed_total: usize,
}

impl NdjsonParser {
    pub fn new() -> Self {
        NdjsonParser::default()
    }

    fn process_line(&self, offset: usize, line: &[u8]) -> Result<Option<Record>> {
        let trimmed = trim_ascii(line);
        if trimmed.is_empty() {
            return Ok(None);
        }
        let json: serde_json::Value = serde_json::from_slice(trimmed)
            .map_err(|e| ConvertError::parse(self.bytes_consumed_total + offset, e.to_string()))?;
        Ok(Some(match Value::from(json) {
            Value::Map(record) => record,
            other => {
                let mut record = Record::new();
                record.push("value", other);
                record
            }
        }))
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map(|i| i + 1).unwrap_or(start);
    &bytes[start..end]
}

impl RecordParser for NdjsonParser {
    fn drain(&mut self, buffer: &mut ByteBuffer) -> Result<Vec<Record>> {
        let mut out = Vec::new();
        let mut consumed = 0usize;
        loop {
            let pending = buffer.pending();
            let Some(nl) = memchr(b'\n', &pending[consumed..]) else {
                break;
            };
            let line_end = consumed + nl;
            let mut line = &pending[consumed..line_end];
            if line.ends_with(b"\r") {
                line = &line[..line.len() - 1];
            }
            if let Some(record) = self.process_line(consumed, line)? {
                out.push(record);
            }
            consumed = line_end + 1;
        }
        self.bytes_consumed_total += consumed;
        buffer.advance(consumed);
        buffer.maybe_compact();
        Ok(out)
    }

    fn eof(&mut self, buffer: &mut ByteBuffer) -> Result<Vec<Record>> {
        let mut out = Vec::new();
        let pending = buffer.pending().to_vec();
        if !pending.is_empty() {
            let mut line = pending.as_slice();
            if line.ends_with(b"\r") {
                line = &line[..line.len() - 1];
            }
            if let Some(record) = self.process_line(0, line)? {
                out.push(record);
            }
        }
        self.bytes_consumed_total += pending.len();
        buffer.advance(pending.len());
        Ok(out)
    }
}
