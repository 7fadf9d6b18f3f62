//! Record-scoped XML parser.
//!
//! Grounded on the reference `xml_parser.rs`, which already wires
//! `quick_xml::Reader`/`Event` to attribute/text accumulation. Unlike that
//! reference's simplified re-parse-whole-buffer-per-push approach, this
//! parser tracks the byte offset it has fully consumed (the reader's own
//! `buffer_position()` after each successfully decoded event) and only
//! advances the shared buffer up to that point, so a tag split across a
//! chunk boundary is retried from the same position rather than reparsed
//! from the top of the document.

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::buffer::ByteBuffer;
use crate::config::XmlConfig;
use crate::error::{ConvertError, Result};
use crate::record::{Record, Value};

use super::RecordParser;

struct Frame {
    name: String,
    text: String,
    fields: Record,
}

pub struct XmlParser {
    config: XmlConfig,
    bytes_consumed_total: usize,
    depth: usize,
    record_element_name: Option<String>,
    record_depth: Option<usize>,
    current_record: Option<Record>,
    element_stack: Vec<Frame>,
}

impl XmlParser {
    pub fn new(config: &XmlConfig) -> Self {
        let configured = if config.record_element.is_empty() {
            None
        } else {
            Some(config.record_element.clone())
        };
        XmlParser {
            config: config.clone(),
            bytes_consumed_total: 0,
            depth: 0,
            record_element_name: configured,
            record_depth: None,
            current_record: None,
            element_stack: Vec::new(),
        }
    }

    fn err(&self, local_offset: usize, message: impl Into<String>) -> ConvertError {
        ConvertError::parse(self.bytes_consumed_total + local_offset, message)
    }

    fn maybe_trim(&self, text: String) -> String {
        if self.config.trim_text {
            text.trim().to_string()
        } else {
            text
        }
    }

    fn start_element(&mut self, name: String, attrs: Vec<(String, String)>) {
        self.depth += 1;

        if self.record_element_name.is_none() && self.depth == 2 {
            self.record_element_name = Some(name.clone());
        }

        if self.record_depth.is_none()
            && self.depth == 2
            && self.record_element_name.as_deref() == Some(name.as_str())
        {
            let mut record = Record::new();
            if self.config.include_attributes {
                for (key, value) in attrs {
                    add_field(&mut record, &format!("@{key}"), Value::String(value));
                }
            }
            self.current_record = Some(record);
            self.record_depth = Some(self.depth);
            self.element_stack.clear();
        } else if self.record_depth.is_some() {
            self.element_stack.push(Frame {
                name,
                text: String::new(),
                fields: Record::new(),
            });
        }
    }

    fn end_element(&mut self, name: &str, out: &mut Vec<Record>) -> Result<()> {
        if self.record_depth == Some(self.depth) {
            if self.record_element_name.as_deref() != Some(name) {
                return Err(self.err(0, format!("mismatched end tag </{name}>")));
            }
            if let Some(record) = self.current_record.take() {
                out.push(record);
            }
            self.record_depth = None;
            self.depth -= 1;
            return Ok(());
        }

        if self.record_depth.is_some() {
            let Some(frame) = self.element_stack.pop() else {
                self.depth -= 1;
                return Ok(());
            };
            if frame.name != name {
                return Err(self.err(0, format!("mismatched end tag </{name}>")));
            }
            let value = if frame.fields.is_empty() {
                Value::String(self.maybe_trim(frame.text))
            } else {
                Value::Map(frame.fields)
            };
            let target = match self.element_stack.last_mut() {
                Some(parent) => &mut parent.fields,
                None => self
                    .current_record
                    .as_mut()
                    .expect("record started before any child frame"),
            };
            add_field(target, &frame.name, value);
        }
        self.depth -= 1;
        Ok(())
    }

    fn text(&mut self, text: String) {
        if self.record_depth.is_none() {
            return;
        }
        if let Some(frame) = self.element_stack.last_mut() {
            frame.text.push_str(&text);
        }
    }

    fn handle_event(&mut self, event: Event<'_>, out: &mut Vec<Record>) -> Result<()> {
        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let attrs = decode_attrs(&e)?;
                self.start_element(name, attrs);
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let attrs = decode_attrs(&e)?;
                self.start_element(name.clone(), attrs);
                self.end_element(&name, out)?;
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                self.end_element(&name, out)?;
            }
            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map_err(|err| self.err(0, format!("xml text decode error: {err}")))?
                    .into_owned();
                self.text(text);
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                self.text(text);
            }
            _ => {}
        }
        Ok(())
    }

    fn run(&mut self, pending: &[u8], at_eof: bool, out: &mut Vec<Record>) -> Result<usize> {
        let mut reader = Reader::from_reader(pending);
        reader.config_mut().trim_text(false);
        reader.config_mut().expand_empty_elements = false;

        let mut buf = Vec::new();
        let mut confirmed_pos = 0usize;

        loop {
            buf.clear();
            match reader.read_event_into(&mut buf) {
                Ok(Event::Eof) => {
                    if at_eof {
                        confirmed_pos = reader.buffer_position() as usize;
                    }
                    break;
                }
                Ok(event) => {
                    self.handle_event(event, out)?;
                    confirmed_pos = reader.buffer_position() as usize;
                }
                Err(err) => {
                    if at_eof {
                        return Err(self.err(confirmed_pos, format!("xml parse error: {err}")));
                    }
                    break;
                }
            }
        }

        Ok(confirmed_pos)
    }
}

fn decode_attrs(e: &quick_xml::events::BytesStart<'_>) -> Result<Vec<(String, String)>> {
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ConvertError::parse(0, format!("xml attribute error: {err}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| ConvertError::parse(0, format!("xml attribute decode error: {err}")))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(attrs)
}

fn add_field(parent: &mut Record, name: &str, value: Value) {
    if let Some(existing) = parent.get(name).cloned() {
        match existing {
            Value::Array(mut items) => {
                items.push(value);
                parent.set(name, Value::Array(items));
            }
            other => parent.set(name, Value::Array(vec![other, value])),
        }
    } else {
        parent.push(name.to_string(), value);
    }
}

impl RecordParser for XmlParser {
    fn drain(&mut self, buffer: &mut ByteBuffer) -> Result<Vec<Record>> {
        let mut out = Vec::new();
        let pending = buffer.pending();
        if pending.is_empty() {
            return Ok(out);
        }
        let pending = pending.to_vec();
        let consumed = self.run(&pending, false, &mut out)?;
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

        if self.record_depth.is_some() || !self.element_stack.is_empty() {
            return Err(self.err(consumed, "unclosed element at end of input"));
        }
        Ok(out)
    }
}
