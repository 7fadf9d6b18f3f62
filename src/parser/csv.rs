//! Streaming CSV tokenizer.
//!
//! States mirror the specification's six-state machine
//! (`start_of_record` doubles as "awaiting the next field", since the
//! distinction between first-field-of-record and any-other-field does not
//! need its own state: `current_record` tracks how many fields have already
//! been collected). Grounded on the teacher's `lexer.rs`/`parser_optimized.rs`
//! char-by-char state machine, generalized from a fixed `FieldStart`/
//! `InField`/`InQuotedField`/`AfterQuote` set to the specification's six
//! named states, and on the reference `csv_parser.rs`'s speculative
//! no-quote fast path.

use memchr::{memchr2, memchr4};

use crate::buffer::ByteBuffer;
use crate::config::CsvConfig;
use crate::error::{ConvertError, Result};
use crate::record::{Record, Value};

use super::RecordParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    StartOfRecord,
    InFieldUnquoted,
    InFieldQuoted,
    QuoteInQuoted,
    EndOfField,
    EndOfRecord,
}

pub struct CsvParser {
    delimiter: u8,
    quote: u8,
    trim_whitespace: bool,
    has_headers: bool,
    state: State,
    headers: Option<Vec<String>>,
    current_field: Vec<u8>,
    current_record: Vec<String>,
    bytes_consumed_total: usize,
}

impl CsvParser {
    pub fn new(config: &CsvConfig) -> Self {
        CsvParser {
            delimiter: config.delimiter,
            quote: config.quote,
            trim_whitespace: config.trim_whitespace,
            has_headers: config.has_headers,
            state: State::StartOfRecord,
            headers: None,
            current_field: Vec::new(),
            current_record: Vec::new(),
            bytes_consumed_total: 0,
        }
    }

    fn finalize_field(&mut self) {
        let bytes = std::mem::take(&mut self.current_field);
        let text = if self.trim_whitespace {
            let s = bytes.as_slice();
            let start = s.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(s.len());
            let end = s.iter().rposition(|b| !b.is_ascii_whitespace()).map(|i| i + 1).unwrap_or(start);
            String::from_utf8_lossy(&s[start..end]).into_owned()
        } else {
            String::from_utf8_lossy(&bytes).into_owned()
        };
        self.current_record.push(text);
    }

    /// Converts the accumulated raw field strings into a [`Record`], padding
    /// short rows and retaining extra columns under synthesized names, per
    /// the specification's "retain extras" decision.
    fn build_record(&mut self) -> Option<Record> {
        let fields = std::mem::take(&mut self.current_record);

        if self.has_headers && self.headers.is_none() {
            self.headers = Some(fields);
            return None;
        }

        let mut record = Record::with_capacity(fields.len());
        match &self.headers {
            Some(headers) => {
                for (i, name) in headers.iter().enumerate() {
                    let value = fields.get(i).cloned().unwrap_or_default();
                    record.push(name.clone(), Value::String(value));
                }
                for (i, value) in fields.iter().enumerate().skip(headers.len()) {
                    record.push(format!("col_{i}"), Value::String(value.clone()));
                }
            }
            None => {
                for (i, value) in fields.iter().enumerate() {
                    record.push(format!("col_{i}"), Value::String(value.clone()));
                }
            }
        }
        Some(record)
    }

    fn finalize_record(&mut self, out: &mut Vec<Record>) {
        if let Some(record) = self.build_record() {
            out.push(record);
        }
    }

    /// Runs the state machine over `pending`, returning the number of bytes
    /// consumed. Bytes consumed are always safe to advance past: any partial
    /// field content has already been copied into `self.current_field`.
    fn run(&mut self, pending: &[u8], at_eof: bool, out: &mut Vec<Record>) -> Result<usize> {
        let mut pos = 0usize;
        let len = pending.len();

        loop {
            match self.state {
                State::StartOfRecord | State::EndOfField | State::EndOfRecord => {
                    if pos >= len {
                        break;
                    }
                    let b = pending[pos];
                    if b == self.quote {
                        pos += 1;
                        self.state = State::InFieldQuoted;
                    } else if b == self.delimiter {
                        pos += 1;
                        self.finalize_field();
                        self.state = State::StartOfRecord;
                    } else if b == b'\n' {
                        pos += 1;
                        self.finalize_field();
                        self.finalize_record(out);
                        self.state = State::StartOfRecord;
                    } else if b == b'\r' {
                        if pos + 1 < len {
                            if pending[pos + 1] == b'\n' {
                                pos += 2;
                            } else {
                                pos += 1;
                            }
                            self.finalize_field();
                            self.finalize_record(out);
                            self.state = State::StartOfRecord;
                        } else if at_eof {
                            pos += 1;
                            self.finalize_field();
                            self.finalize_record(out);
                            self.state = State::StartOfRecord;
                        } else {
                            break;
                        }
                    } else {
                        self.state = State::InFieldUnquoted;
                    }
                }

                State::InFieldUnquoted => {
                    if pos >= len {
                        break;
                    }
                    let window = &pending[pos..];
                    match memchr4(self.delimiter, self.quote, b'\r', b'\n', window) {
                        Some(offset) => {
                            self.current_field.extend_from_slice(&window[..offset]);
                            pos += offset;
                            self.state = State::EndOfField;
                        }
                        None => {
                            self.current_field.extend_from_slice(window);
                            pos = len;
                            break;
                        }
                    }
                }

                State::InFieldQuoted => {
                    if pos >= len {
                        break;
                    }
                    let window = &pending[pos..];
                    match memchr2(self.quote, b'\\', window) {
                        Some(offset) => {
                            self.current_field.extend_from_slice(&window[..offset]);
                            pos += offset;
                            let b = pending[pos];
                            if b == self.quote {
                                pos += 1;
                                self.state = State::QuoteInQuoted;
                            } else {
                                // lone backslash: only a literal-quote escape
                                // if the next byte is the quote character.
                                if pos + 1 < len {
                                    if pending[pos + 1] == self.quote {
                                        self.current_field.push(self.quote);
                                        pos += 2;
                                    } else {
                                        self.current_field.push(b'\\');
                                        pos += 1;
                                    }
                                } else if at_eof {
                                    self.current_field.push(b'\\');
                                    pos += 1;
                                } else {
                                    break;
                                }
                            }
                        }
                        None => {
                            self.current_field.extend_from_slice(window);
                            pos = len;
                            if at_eof {
                                return Err(ConvertError::parse(
                                    self.bytes_consumed_total + pos,
                                    "unclosed quoted field at end of input",
                                ));
                            }
                            break;
                        }
                    }
                }

                State::QuoteInQuoted => {
                    if pos >= len {
                        break;
                    }
                    let b = pending[pos];
                    if b == self.quote {
                        self.current_field.push(self.quote);
                        pos += 1;
                        self.state = State::InFieldQuoted;
                    } else if b == self.delimiter {
                        pos += 1;
                        self.finalize_field();
                        self.state = State::StartOfRecord;
                    } else if b == b'\n' {
                        pos += 1;
                        self.finalize_field();
                        self.finalize_record(out);
                        self.state = State::StartOfRecord;
                    } else if b == b'\r' {
                        if pos + 1 < len {
                            if pending[pos + 1] == b'\n' {
                                pos += 2;
                            } else {
                                pos += 1;
                            }
                            self.finalize_field();
                            self.finalize_record(out);
                            self.state = State::StartOfRecord;
                        } else if at_eof {
                            pos += 1;
                            self.finalize_field();
                            self.finalize_record(out);
                            self.state = State::StartOfRecord;
                        } else {
                            break;
                        }
                    } else {
                        // Malformed per RFC4180 but accepted leniently:
                        // content immediately after a closing quote is
                        // folded back into the same field.
                        self.current_field.push(b);
                        pos += 1;
                        self.state = State::InFieldUnquoted;
                    }
                }
            }
        }

        Ok(pos)
    }
}

impl RecordParser for CsvParser {
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

        match self.state {
            State::InFieldQuoted => {
                return Err(ConvertError::parse(
                    self.bytes_consumed_total,
                    "unclosed quoted field at end of input",
                ));
            }
            State::InFieldUnquoted | State::QuoteInQuoted => {
                self.finalize_field();
                self.finalize_record(&mut out);
            }
            State::StartOfRecord | State::EndOfField | State::EndOfRecord => {
                if !self.current_field.is_empty() || !self.current_record.is_empty() {
                    self.finalize_field();
                    self.finalize_record(&mut out);
                }
            }
        }
        Ok(out)
    }
}
