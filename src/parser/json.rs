//! Incremental parser for a single top-level JSON array (or a bare object,
//! accepted as a one-record document).
//!
//! No direct teacher precedent — the teacher and the reference NDJSON
//! parser both parse whole, already-delimited lines, never a partial
//! top-level structure. Built fresh in the teacher's hand-rolled-parser
//! idiom: a bracket/string-depth scanner locates the next complete value's
//! byte range, which is then handed to `serde_json` for construction. The
//! scanner suspends (returns "need more bytes") rather than erroring
//! whenever it runs off the end of the currently available buffer, so a
//! value split across any number of chunks is still parsed correctly.

use crate::buffer::ByteBuffer;
use crate::error::{ConvertError, Result};
use crate::record::{Record, Value};

use super::RecordParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    BeforeArray,
    BareObject,
    BetweenElements,
    AfterArray,
}

pub struct JsonArrayParser {
    state: State,
    bytes_consumed_total: usize,
    saw_any_non_whitespace: bool,
}

impl JsonArrayParser {
    pub fn new() -> Self {
        JsonArrayParser {
            state: State::BeforeArray,
            bytes_consumed_total: 0,
            saw_any_non_whitespace: false,
        }
    }

    fn err(&self, local_offset: usize, message: impl Into<String>) -> ConvertError {
        ConvertError::parse(self.bytes_consumed_total + local_offset, message)
    }

    fn run(&mut self, pending: &[u8], at_eof: bool, out: &mut Vec<Record>) -> Result<usize> {
        let mut pos = 0usize;

        loop {
            match self.state {
                State::BeforeArray => {
                    let ws = skip_ws(&pending[pos..]);
                    pos += ws;
                    let Some(&b) = pending.get(pos) else {
                        break;
                    };
                    self.saw_any_non_whitespace = true;
                    if b == b'[' {
                        pos += 1;
                        self.state = State::BetweenElements;
                    } else if b == b'{' {
                        self.state = State::BareObject;
                    } else {
                        return Err(self.err(pos, format!("unexpected byte '{}' at document root", b as char)));
                    }
                }

                State::BareObject => {
                    let remaining = &pending[pos..];
                    match scan_value_end(remaining, at_eof).map_err(|e| self.err(pos, e))? {
                        Some(end) => {
                            let slice = &remaining[..end];
                            out.push(parse_element(slice).map_err(|e| self.err(pos, e))?);
                            pos += end;
                            self.state = State::AfterArray;
                        }
                        None => break,
                    }
                }

                State::BetweenElements => {
                    let ws = skip_ws(&pending[pos..]);
                    pos += ws;
                    let Some(&b) = pending.get(pos) else {
                        break;
                    };
                    if b == b']' {
                        pos += 1;
                        self.state = State::AfterArray;
                        continue;
                    }
                    let remaining = &pending[pos..];
                    match scan_value_end(remaining, at_eof).map_err(|e| self.err(pos, e))? {
                        Some(end) => {
                            let slice = &remaining[..end];
                            out.push(parse_element(slice).map_err(|e| self.err(pos, e))?);
                            pos += end;

                            let ws2 = skip_ws(&pending[pos..]);
                            pos += ws2;
                            match pending.get(pos) {
                                Some(b',') => {
                                    pos += 1;
                                }
                                Some(b']') => {
                                    pos += 1;
                                    self.state = State::AfterArray;
                                }
                                Some(other) => {
                                    return Err(self.err(
                                        pos,
                                        format!("expected ',' or ']' after array element, found '{}'", *other as char),
                                    ));
                                }
                                None => {
                                    if at_eof {
                                        return Err(self.err(pos, "unterminated array: missing ']'"));
                                    }
                                    break;
                                }
                            }
                        }
                        None => break,
                    }
                }

                State::AfterArray => break,
            }
        }

        Ok(pos)
    }
}

impl Default for JsonArrayParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordParser for JsonArrayParser {
    fn drain(&mut self, buffer: &mut ByteBuffer) -> Result<Vec<Record>> {
        let mut out = Vec::new();
        let pending = buffer.pending();
        if pending.is_empty() {
            return Ok(out);
        }
        let consumed = self.run(pending, false, &mut out)?;
        self.bytes_consumed_total += consumed;
        buffer.advance(consumed);
        buffer.maybe_compact();
        Ok(out)
    }

    fn eof(&mut self, buffer: &mut ByteBuffer) -> Result<Vec<Record>> {
        let mut out = Vec::new();
        let pending = buffer.pending().to_vec();
        let consumed = self.run(&pending, true, &mut out)?;
        self.bytes_consumed_total += consumed;
        buffer.advance(consumed);

        if self.state == State::BeforeArray && !self.saw_any_non_whitespace {
            return Ok(out);
        }
        if !matches!(self.state, State::AfterArray) {
            return Err(self.err(consumed, "unexpected end of input before the document closed"));
        }
        Ok(out)
    }
}

fn parse_element(slice: &[u8]) -> std::result::Result<Record, String> {
    let json: serde_json::Value = serde_json::from_slice(slice).map_err(|e| e.to_string())?;
    Ok(match Value::from(json) {
        Value::Map(record) => record,
        other => {
            let mut record = Record::new();
            record.push("value", other);
            record
        }
    })
}

fn skip_ws(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_whitespace()).count()
}

/// Returns the exclusive end offset of the JSON value starting at `bytes[0]`,
/// or `None` if there are not yet enough bytes to tell (except numbers at
/// `at_eof`, where running off the end of input terminates the number).
fn scan_value_end(bytes: &[u8], at_eof: bool) -> std::result::Result<Option<usize>, String> {
    let Some(&first) = bytes.first() else {
        return Ok(None);
    };
    match first {
        b'"' => Ok(scan_string_end(bytes)),
        b'{' | b'[' => Ok(scan_bracketed_end(bytes)),
        b't' => Ok(scan_literal(bytes, b"true")),
        b'f' => Ok(scan_literal(bytes, b"false")),
        b'n' => Ok(scan_literal(bytes, b"null")),
        b'-' | b'0'..=b'9' => Ok(scan_number_end(bytes, at_eof)),
        other => Err(format!("unexpected byte '{}' at start of value", other as char)),
    }
}

fn scan_literal(bytes: &[u8], literal: &[u8]) -> Option<usize> {
    if bytes.len() < literal.len() {
        return None;
    }
    if bytes.starts_with(literal) {
        Some(literal.len())
    } else {
        None
    }
}

fn scan_string_end(bytes: &[u8]) -> Option<usize> {
    let mut i = 1;
    let mut escape = false;
    while i < bytes.len() {
        let b = bytes[i];
        if escape {
            escape = false;
        } else if b == b'\\' {
            escape = true;
        } else if b == b'"' {
            return Some(i + 1);
        }
        i += 1;
    }
    None
}

fn scan_bracketed_end(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0i32;
    let mut i = 0usize;
    let mut in_string = false;
    let mut escape = false;
    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn scan_number_end(bytes: &[u8], at_eof: bool) -> Option<usize> {
    let mut i = 0usize;
    if bytes.first() == Some(&b'-') {
        i += 1;
    }
    while i < bytes.len()
        && matches!(bytes[i], b'0'..=b'9' | b'.' | b'e' | b'E' | b'+' | b'-')
    {
        i += 1;
    }
    if i < bytes.len() || at_eof {
        Some(i)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(input: &[u8]) -> Vec<Record> {
        let mut parser = JsonArrayParser::new();
        let mut buffer = ByteBuffer::new();
        buffer.append(input);
        let mut records = parser.drain(&mut buffer).unwrap();
        records.extend(parser.eof(&mut buffer).unwrap());
        records
    }

    #[test]
    fn parses_array_of_objects() {
        let records = parse_all(br#"[{"a":1},{"a":2}]"#);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("a"), Some(&Value::Int(1)));
        assert_eq!(records[1].get("a"), Some(&Value::Int(2)));
    }

    #[test]
    fn empty_array_yields_no_records() {
        assert_eq!(parse_all(b"[]").len(), 0);
    }

    #[test]
    fn bare_object_is_accepted_as_single_record() {
        let records = parse_all(br#"{"x":true}"#);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("x"), Some(&Value::Bool(true)));
    }

    #[test]
    fn non_object_elements_are_wrapped_under_value() {
        let records = parse_all(b"[1, \"two\", null]");
        assert_eq!(records[0].get("value"), Some(&Value::Int(1)));
        assert_eq!(records[1].get("value"), Some(&Value::String("two".into())));
        assert_eq!(records[2].get("value"), Some(&Value::Null));
    }

    #[test]
    fn empty_input_is_not_an_error() {
        assert_eq!(parse_all(b"").len(), 0);
        assert_eq!(parse_all(b"   \n  ").len(), 0);
    }

    #[test]
    fn unterminated_array_is_a_parse_error() {
        let mut parser = JsonArrayParser::new();
        let mut buffer = ByteBuffer::new();
        buffer.append(br#"[{"a":1}"#);
        parser.drain(&mut buffer).unwrap();
        assert!(parser.eof(&mut buffer).is_err());
    }

    #[test]
    fn chunk_boundary_inside_string_value_resumes_correctly() {
        let mut parser = JsonArrayParser::new();
        let mut buffer = ByteBuffer::new();
        let mut records = Vec::new();

        buffer.append(br#"[{"name":"A"#);
        records.extend(parser.drain(&mut buffer).unwrap());
        buffer.append(br#"da"}]"#);
        records.extend(parser.drain(&mut buffer).unwrap());
        records.extend(parser.eof(&mut buffer).unwrap());

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("name"), Some(&Value::String("Ada".into())));
    }

    #[test]
    fn large_integer_is_parsed_exactly() {
        let records = parse_all(b"[{\"n\":12345678901234567890}]");
        assert_eq!(
            records[0].get("n"),
            Some(&Value::RawNumber("12345678901234567890".into()))
        );
    }
}
