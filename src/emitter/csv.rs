//! CSV emitter: header inference from the first record, quoting per RFC4180.
//!
//! Grounded on the teacher's `finish_record_to_flat` header-padding logic
//! (`parser.rs`), mirrored on the write side: a record's value for a header
//! column it doesn't have is emitted empty rather than erroring.

use crate::config::CsvConfig;
use crate::error::Result;
use crate::record::Record;

use super::RecordEmitter;

pub struct CsvEmitter {
    delimiter: u8,
    quote: u8,
    header: Option<Vec<String>>,
}

impl CsvEmitter {
    pub fn new(config: &CsvConfig) -> Self {
        CsvEmitter {
            delimiter: config.delimiter,
            quote: config.quote,
            header: None,
        }
    }

    fn needs_quoting(&self, field: &str) -> bool {
        field.as_bytes().iter().any(|&b| {
            b == self.delimiter || b == self.quote || b == b'\n' || b == b'\r'
        })
    }

    fn write_field(&self, out: &mut Vec<u8>, field: &str) {
        if self.needs_quoting(field) {
            out.push(self.quote);
            for b in field.bytes() {
                if b == self.quote {
                    out.push(self.quote);
                }
                out.push(b);
            }
            out.push(self.quote);
        } else {
            out.extend_from_slice(field.as_bytes());
        }
    }

    fn write_row(&self, out: &mut Vec<u8>, fields: impl Iterator<Item = String>) {
        for (i, field) in fields.enumerate() {
            if i > 0 {
                out.push(self.delimiter);
            }
            self.write_field(out, &field);
        }
        out.push(b'\n');
    }
}

impl RecordEmitter for CsvEmitter {
    fn begin(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn write_record(&mut self, record: &Record) -> Result<Vec<u8>> {
        let mut out = Vec::new();

        if self.header.is_none() {
            let header: Vec<String> = record.field_names().map(String::from).collect();
            self.write_row(&mut out, header.iter().cloned());
            self.header = Some(header);
        }

        let header = self.header.as_ref().expect("header just set above");
        let values = header
            .iter()
            .map(|name| record.get(name).map(|v| v.to_display_string()).unwrap_or_default());
        self.write_row(&mut out, values);
        Ok(out)
    }

    fn end(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}
