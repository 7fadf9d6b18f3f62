//! JSON emitter: a single top-level array, records are the elements.
//!
//! Grounded on the reference `ndjson_parser.rs::to_json_array`'s
//! `is_first`/comma-tracking bracket framing, adapted from a batch
//! end-of-stream function into the incremental `begin`/`write_record`/`end`
//! shape the Converter drives one record at a time.

use crate::error::{ConvertError, Result};
use crate::record::{Record, Value};

use super::RecordEmitter;

#[derive(Default)]
pub struct JsonEmitter {
    wrote_any: bool,
}

impl JsonEmitter {
    pub fn new() -> Self {
        JsonEmitter::default()
    }
}

impl RecordEmitter for JsonEmitter {
    fn begin(&mut self) -> Result<Vec<u8>> {
        Ok(b"[".to_vec())
    }

    fn write_record(&mut self, record: &Record) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        if self.wrote_any {
            out.push(b',');
        }
        self.wrote_any = true;
        let json: serde_json::Value = Value::Map(record.clone()).into();
        out.extend(serde_json::to_vec(&json).map_err(|e| ConvertError::emit(e.to_string()))?);
        Ok(out)
    }

    fn end(&mut self) -> Result<Vec<u8>> {
        Ok(b"]".to_vec())
    }
}
