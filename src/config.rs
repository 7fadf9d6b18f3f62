//! Builder-style configuration, validated eagerly so a bad config fails at
//! construction rather than mid-stream.
//!
//! Grounded on the teacher's `CSVParser::new(options)` + `ReaderBuilder`
//! fluent-setter shape, and on the reference port's
//! `ConverterConfig::new(input, output).with_chunk_size(..).with_stats(..)`
//! chain (`other_examples/*convert-buddy*wasm_roundtrip_tests.rs`).

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};
use crate::transform::TransformConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Format {
    Csv,
    Ndjson,
    Json,
    Xml,
}

impl Format {
    pub fn from_string(s: &str) -> Option<Format> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Some(Format::Csv),
            "ndjson" | "jsonl" => Some(Format::Ndjson),
            "json" => Some(Format::Json),
            "xml" => Some(Format::Xml),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Csv => "csv",
            Format::Ndjson => "ndjson",
            Format::Json => "json",
            Format::Xml => "xml",
        }
    }
}

/// CSV-specific dialect knobs. `None` at the `ConverterConfig` level means
/// "detect/default", matching the reference port's `config.csv_config = None`
/// sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvConfig {
    pub delimiter: u8,
    pub quote: u8,
    pub escape: Option<u8>,
    pub has_headers: bool,
    pub trim_whitespace: bool,
}

impl Default for CsvConfig {
    fn default() -> Self {
        CsvConfig {
            delimiter: b',',
            quote: b'"',
            escape: None,
            has_headers: true,
            trim_whitespace: false,
        }
    }
}

/// XML-specific knobs: which element name marks a record, how text and
/// attributes are folded into the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XmlConfig {
    pub record_element: String,
    pub trim_text: bool,
    pub include_attributes: bool,
    pub expand_entities: bool,
}

impl Default for XmlConfig {
    fn default() -> Self {
        XmlConfig {
            record_element: "record".to_string(),
            trim_text: true,
            include_attributes: true,
            expand_entities: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// `None` is the `auto` sentinel: the converter defers parser
    /// construction until the first `push` supplies enough bytes to run
    /// the full cross-format detector (`detect::detect_format`).
    pub input_format: Option<Format>,
    pub output_format: Format,
    pub chunk_size: usize,
    pub collect_stats: bool,
    pub max_memory_mb: Option<usize>,
    pub csv_config: Option<CsvConfig>,
    pub xml_config: Option<XmlConfig>,
    pub transform: Option<TransformConfig>,
    /// Minimum bytes ingested between progress-callback invocations.
    pub progress_interval_bytes: u64,
    /// Raises the verbosity of the converter's internal `tracing` spans.
    pub debug: bool,
}

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

impl ConverterConfig {
    /// Accepts either a concrete `Format` or an `Option<Format>`; passing
    /// `None` (e.g. `ConverterConfig::new(None::<Format>, out)`, or more
    /// readably `ConverterConfig::auto_detect(out)`) selects the `auto`
    /// sentinel and defers format detection to the first `push`.
    pub fn new(input_format: impl Into<Option<Format>>, output_format: Format) -> Self {
        ConverterConfig {
            input_format: input_format.into(),
            output_format,
            chunk_size: DEFAULT_CHUNK_SIZE,
            collect_stats: true,
            max_memory_mb: None,
            csv_config: None,
            xml_config: None,
            transform: None,
            progress_interval_bytes: 1024 * 1024,
            debug: false,
        }
    }

    /// Convenience constructor for the `auto` sentinel: the input format is
    /// detected from the first push's byte sample rather than declared.
    pub fn auto_detect(output_format: Format) -> Self {
        Self::new(None::<Format>, output_format)
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_stats(mut self, collect_stats: bool) -> Self {
        self.collect_stats = collect_stats;
        self
    }

    pub fn with_max_memory_mb(mut self, max_memory_mb: usize) -> Self {
        self.max_memory_mb = Some(max_memory_mb);
        self
    }

    pub fn with_csv_config(mut self, csv_config: CsvConfig) -> Self {
        self.csv_config = Some(csv_config);
        self
    }

    pub fn with_xml_config(mut self, xml_config: XmlConfig) -> Self {
        self.xml_config = Some(xml_config);
        self
    }

    pub fn with_transform(mut self, transform: TransformConfig) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_progress_interval_bytes(mut self, bytes: u64) -> Self {
        self.progress_interval_bytes = bytes;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Needs a detection pass before a parser can be constructed: either the
    /// format itself is the `auto` sentinel, or it is a format whose dialect
    /// varies by input (delimiter, record element) and so still needs
    /// sniffing even though the format itself is forced.
    pub fn needs_detection(&self) -> bool {
        match self.input_format {
            None => true,
            Some(Format::Csv) | Some(Format::Xml) => true,
            Some(Format::Ndjson) | Some(Format::Json) => false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ConvertError::config("chunk_size must be greater than zero"));
        }
        if let Some(mb) = self.max_memory_mb {
            if mb == 0 {
                return Err(ConvertError::config("max_memory_mb must be greater than zero"));
            }
        }
        if let Some(csv) = &self.csv_config {
            if csv.delimiter == csv.quote {
                return Err(ConvertError::config(
                    "csv delimiter and quote character must differ",
                ));
            }
        }
        if let Some(xml) = &self.xml_config {
            if xml.record_element.is_empty() {
                return Err(ConvertError::config("xml record_element must not be empty"));
            }
        }
        if let Some(transform) = &self.transform {
            transform.validate()?;
        }
        Ok(())
    }
}
