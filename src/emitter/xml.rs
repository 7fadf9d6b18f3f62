//! XML emitter: declaration + root element, one child element per record.
//!
//! No teacher precedent on the write side; built fresh using
//! `quick_xml::Writer` so escaping stays consistent with the parser's use of
//! `quick_xml` for decoding.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;

use crate::config::XmlConfig;
use crate::error::{ConvertError, Result};
use crate::record::{Record, Value};

use super::RecordEmitter;

const ROOT_ELEMENT: &str = "root";

pub struct XmlEmitter {
    record_element: String,
}

impl XmlEmitter {
    pub fn new(config: &XmlConfig) -> Self {
        let record_element = if config.record_element.is_empty() {
            "record".to_string()
        } else {
            config.record_element.clone()
        };
        XmlEmitter { record_element }
    }
}

fn emit_err(e: quick_xml::Error) -> ConvertError {
    ConvertError::emit(e.to_string())
}

fn write_fields(writer: &mut Writer<Vec<u8>>, record: &Record) -> Result<()> {
    for (name, value) in record.iter() {
        if name.starts_with('@') {
            continue;
        }
        match value {
            Value::Array(items) => {
                for item in items {
                    write_value_element(writer, name, item)?;
                }
            }
            other => write_value_element(writer, name, other)?,
        }
    }
    Ok(())
}

fn write_value_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &Value) -> Result<()> {
    match value {
        Value::Map(inner) => {
            let mut start = BytesStart::new(name);
            for (key, attr_value) in inner.iter() {
                if let Some(attr_name) = key.strip_prefix('@') {
                    start.push_attribute((attr_name, attr_value.to_display_string().as_str()));
                }
            }
            writer.write_event(Event::Start(start)).map_err(emit_err)?;
            write_fields(writer, inner)?;
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(emit_err)?;
        }
        Value::Null => {
            writer
                .write_event(Event::Empty(BytesStart::new(name)))
                .map_err(emit_err)?;
        }
        other => {
            writer
                .write_event(Event::Start(BytesStart::new(name)))
                .map_err(emit_err)?;
            writer
                .write_event(Event::Text(BytesText::new(&other.to_display_string())))
                .map_err(emit_err)?;
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(emit_err)?;
        }
    }
    Ok(())
}

impl RecordEmitter for XmlEmitter {
    fn begin(&mut self) -> Result<Vec<u8>> {
        Ok(format!("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<{ROOT_ELEMENT}>").into_bytes())
    }

    fn write_record(&mut self, record: &Record) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        let mut start = BytesStart::new(self.record_element.as_str());
        for (key, value) in record.iter() {
            if let Some(attr_name) = key.strip_prefix('@') {
                start.push_attribute((attr_name, value.to_display_string().as_str()));
            }
        }
        writer.write_event(Event::Start(start)).map_err(emit_err)?;
        write_fields(&mut writer, record)?;
        writer
            .write_event(Event::End(BytesEnd::new(self.record_element.as_str())))
            .map_err(emit_err)?;
        Ok(writer.into_inner())
    }

    fn end(&mut self) -> Result<Vec<u8>> {
        Ok(format!("</{ROOT_ELEMENT}>").into_bytes())
    }
}
