//! Per-format streaming parsers, all implementing [`RecordParser`] so the
//! Converter can drive any of them identically.

pub mod csv;
pub mod json;
pub mod ndjson;
pub mod xml;

use crate::buffer::ByteBuffer;
use crate::error::Result;
use crate::record::Record;

/// A pull-parser over a shared [`ByteBuffer`]. `drain` is called in a loop
/// by the Converter until it returns an empty vector, meaning the parser has
/// consumed everything it can without more input. `eof` is called exactly
/// once, after the last chunk, to close any record reachable from the
/// current state.
pub trait RecordParser {
    /// Consume as many complete records as the buffer currently allows,
    /// advancing the buffer's cursor past everything consumed. Returns the
    /// records produced, in input order; an empty result means the parser is
    /// waiting for more bytes.
    fn drain(&mut self, buffer: &mut ByteBuffer) -> Result<Vec<Record>>;

    /// Called once at end of input. Closes a final record reachable from the
    /// current state, or errors if the state indicates truncated input.
    fn eof(&mut self, buffer: &mut ByteBuffer) -> Result<Vec<Record>>;
}
