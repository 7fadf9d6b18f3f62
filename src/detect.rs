//! Format and dialect sniffing over a bounded prefix of the input.
//!
//! No teacher precedent for multi-format detection; built fresh in the
//! teacher's "small hand-rolled scanner" idiom (a single pass over a byte
//! slice, no allocation beyond the result), using `memchr` for the same
//! reason the parsers do.

use memchr::memchr;

use crate::config::Format;

/// The sniffed shape of the input, used to construct the matching parser and
/// (for CSV/XML) its dialect config.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedStructure {
    pub format: Format,
    pub delimiter: Option<u8>,
    pub has_headers: Option<bool>,
    pub record_element: Option<String>,
    pub fields: Vec<String>,
}

const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b'\t', b'|', b';'];
const MAX_SAMPLE_LINES: usize = 10;

/// Inspects the first non-whitespace byte (after stripping a UTF-8 BOM) to
/// pick a format. Never errors: ambiguous input falls through to `csv` as
/// the most permissive guess, matching a detector that must always return
/// *something* usable by the caller.
pub fn detect_format(bytes: &[u8]) -> Option<Format> {
    let bytes = strip_bom(bytes);
    let first = bytes.iter().find(|b| !b.is_ascii_whitespace())?;
    Some(match first {
        b'[' => Format::Json,
        b'{' => Format::Ndjson,
        b'<' => Format::Xml,
        _ => Format::Csv,
    })
}

pub fn detect_structure(bytes: &[u8], format_hint: Option<Format>) -> Option<DetectedStructure> {
    let bytes = strip_bom(bytes);
    let format = format_hint.or_else(|| detect_format(bytes))?;
    Some(match format {
        Format::Csv => detect_csv_structure(bytes),
        Format::Ndjson => DetectedStructure {
            format: Format::Ndjson,
            delimiter: None,
            has_headers: None,
            record_element: None,
            fields: Vec::new(),
        },
        Format::Json => DetectedStructure {
            format: Format::Json,
            delimiter: None,
            has_headers: None,
            record_element: None,
            fields: Vec::new(),
        },
        Format::Xml => detect_xml_structure(bytes),
    })
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes)
}

fn sample_lines(bytes: &[u8], max_lines: usize) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut rest = bytes;
    while lines.len() < max_lines && !rest.is_empty() {
        match memchr(b'\n', rest) {
            Some(pos) => {
                let mut line = &rest[..pos];
                if line.ends_with(b"\r") {
                    line = &line[..line.len() - 1];
                }
                if !line.is_empty() {
                    lines.push(line);
                }
                rest = &rest[pos + 1..];
            }
            None => {
                if !rest.is_empty() {
                    lines.push(rest);
                }
                break;
            }
        }
    }
    lines
}

fn count_columns(line: &[u8], delimiter: u8) -> usize {
    let mut count = 1;
    let mut in_quotes = false;
    let mut iter = line.iter().peekable();
    while let Some(&b) = iter.next() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b if b == delimiter && !in_quotes => count += 1,
            _ => {}
        }
    }
    count
}

fn detect_csv_structure(bytes: &[u8]) -> DetectedStructure {
    let lines = sample_lines(bytes, MAX_SAMPLE_LINES);
    let delimiter = pick_delimiter(&lines);
    let has_headers = lines
        .first()
        .map(|first| looks_like_header(first, delimiter, &lines[1..]))
        .unwrap_or(true);

    let fields = match lines.first() {
        Some(first) if has_headers => split_fields(first, delimiter)
            .into_iter()
            .map(|f| String::from_utf8_lossy(f).trim().to_string())
            .collect(),
        Some(first) => (0..count_columns(first, delimiter))
            .map(|i| format!("col_{i}"))
            .collect(),
        None => Vec::new(),
    };

    DetectedStructure {
        format: Format::Csv,
        delimiter: Some(delimiter),
        has_headers: Some(has_headers),
        record_element: None,
        fields,
    }
}

fn pick_delimiter(lines: &[&[u8]]) -> u8 {
    if lines.is_empty() {
        return b',';
    }
    let mut best = CANDIDATE_DELIMITERS[0];
    let mut best_score = -1i64;
    for &candidate in &CANDIDATE_DELIMITERS {
        let counts: Vec<usize> = lines.iter().map(|l| count_columns(l, candidate)).collect();
        let max_cols = *counts.iter().max().unwrap_or(&1);
        if max_cols <= 1 {
            continue;
        }
        let consistent = counts.iter().all(|&c| c == counts[0]);
        let total_occurrences: usize = counts.iter().map(|c| c - 1).sum();
        let score = if consistent {
            1_000_000 + total_occurrences as i64
        } else {
            total_occurrences as i64
        };
        if score > best_score {
            best_score = score;
            best = candidate;
        }
    }
    best
}

fn split_fields(line: &[u8], delimiter: u8) -> Vec<&[u8]> {
    let mut fields = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, &b) in line.iter().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b if b == delimiter && !in_quotes => {
                fields.push(&line[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(&line[start..]);
    fields
}

/// Row 1 looks like a header if most of its cells are non-numeric while the
/// corresponding columns in later rows contain at least one numeric value.
fn looks_like_header(first: &[u8], delimiter: u8, rest: &[&[u8]]) -> bool {
    if rest.is_empty() {
        return !split_fields(first, delimiter)
            .iter()
            .all(|f| is_numeric(f));
    }
    let first_fields = split_fields(first, delimiter);
    let non_numeric_in_first = first_fields.iter().filter(|f| !is_numeric(f)).count();
    let mostly_non_numeric = non_numeric_in_first * 2 >= first_fields.len();

    let mut numeric_seen_later = false;
    for &line in rest {
        let fields = split_fields(line, delimiter);
        for (i, field) in fields.iter().enumerate() {
            if i < first_fields.len() && is_numeric(field) {
                numeric_seen_later = true;
            }
        }
    }

    mostly_non_numeric && (numeric_seen_later || rest.is_empty())
}

fn is_numeric(field: &[u8]) -> bool {
    let s = std::str::from_utf8(field).unwrap_or("").trim();
    !s.is_empty() && s.parse::<f64>().is_ok()
}

fn detect_xml_structure(bytes: &[u8]) -> DetectedStructure {
    use quick_xml::events::Event;
    use quick_xml::reader::Reader;

    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut record_element: Option<String> = None;
    let mut fields: Vec<String> = Vec::new();
    let mut in_record = false;
    let mut record_child_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                depth += 1;
                if depth == 2 && record_element.is_none() {
                    record_element = Some(name.clone());
                }
                if record_element.as_deref() == Some(name.as_str()) && depth == 2 {
                    in_record = true;
                    record_child_depth = depth;
                } else if in_record && depth == record_child_depth + 1 && !fields.contains(&name) {
                    fields.push(name);
                }
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if depth == 1 && record_element.is_none() {
                    record_element = Some(name.clone());
                }
                if in_record && depth + 1 == record_child_depth + 1 && !fields.contains(&name) {
                    fields.push(name);
                }
            }
            Ok(Event::End(_)) => {
                if depth == record_child_depth {
                    in_record = false;
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => break,
        }
        buf.clear();
    }

    DetectedStructure {
        format: Format::Xml,
        delimiter: None,
        has_headers: None,
        record_element,
        fields,
    }
}
