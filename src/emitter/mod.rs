//! Per-format streaming emitters, all implementing [`RecordEmitter`].

pub mod csv;
pub mod json;
pub mod ndjson;
pub mod xml;

use crate::error::Result;
use crate::record::Record;

/// Mirrors [`crate::parser::RecordParser`] on the output side: `begin`
/// returns any prelude bytes (e.g. a JSON `[` or an XML declaration),
/// `write_record` returns the bytes for exactly one record, and `end`
/// returns any postlude bytes (closing bracket/root element). Emitters
/// buffer only what is needed to finish the current record.
pub trait RecordEmitter {
    fn begin(&mut self) -> Result<Vec<u8>>;
    fn write_record(&mut self, record: &Record) -> Result<Vec<u8>>;
    fn end(&mut self) -> Result<Vec<u8>>;
}
