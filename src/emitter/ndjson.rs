//! NDJSON emitter: one `serde_json`-encoded record per line.
//!
//! Grounded on the teacher's `csv_json.rs`, which already serializes
//! records via `serde_json`; generalized from a one-shot `json!` macro call
//! into the per-record streaming path the Converter drives.

use crate::error::{ConvertError, Result};
use crate::record::{Record, Value};

use super::RecordEmitter;

#[derive(Default)]
pub struct NdjsonEmitter;

impl NdjsonEmitter {
    pub fn new() -> Self {
        NdjsonEmitter
    }
}

impl RecordEmitter for NdjsonEmitter {
    fn begin(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn write_record(&mut self, record: &Record) -> Result<Vec<u8>> {
        let json: serde_json::Value = Value::Map(record.clone()).into();
        let mut out = serde_json::to_vec(&json).map_err(|e| ConvertError::emit(e.to_string()))?;
        out.push(b'\n');
        Ok(out)
    }

    fn end(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}
