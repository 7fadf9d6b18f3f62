//! The record model shared by every parser and emitter.
//!
//! A [`Record`] is an ordered mapping from field name to [`Value`]. Order is
//! insertion order, not sorted: CSV/XML schemas and NDJSON/JSON key order both
//! depend on it being preserved end to end.

/// A single field value.
///
/// Numbers keep their textual form (`RawNumber`) when the value would not
/// round-trip through `f64` (see the JSON parser's numeric-precision rule).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    RawNumber(String),
    String(String),
    Array(Vec<Value>),
    Map(Record),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::RawNumber(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render the value as a CSV/plain-text cell. This is the only place
    /// values are stringified for a schema-less target; it must match what
    /// the CSV emitter and the detector's numeric heuristics expect.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{f:.0}")
                } else {
                    f.to_string()
                }
            }
            Value::RawNumber(s) => s.clone(),
            Value::String(s) => s.clone(),
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(Value::to_display_string).collect();
                parts.join(";")
            }
            Value::Map(_) => String::new(),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => number_to_value(&n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                let mut record = Record::new();
                for (k, v) in map {
                    record.push(k, Value::from(v));
                }
                Value::Map(record)
            }
        }
    }
}

/// Apply the numeric-precision rule from the JSON parser: values that fit a
/// signed 64-bit range stay integers; anything else becomes a float, unless
/// the textual form would not round-trip, in which case it is preserved.
fn number_to_value(n: &serde_json::Number) -> Value {
    if let Some(i) = n.as_i64() {
        return Value::Int(i);
    }
    let text = n.to_string();
    if let Some(f) = n.as_f64() {
        let significant_digits = text.chars().filter(|c| c.is_ascii_digit()).count();
        if significant_digits > 15 {
            return Value::RawNumber(text);
        }
        return Value::Float(f);
    }
    Value::RawNumber(text)
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::Number(i.into()),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::RawNumber(s) => {
                // Preserve the textual form verbatim using serde_json's raw-number support.
                serde_json::from_str(&s).unwrap_or(serde_json::Value::String(s))
            }
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Map(record) => {
                let mut map = serde_json::Map::new();
                for (k, v) in record.into_iter() {
                    map.insert(k, v.into());
                }
                serde_json::Value::Object(map)
            }
        }
    }
}

/// An ordered field-name -> value mapping. Backed by a small vector rather
/// than a hash map: records are short-lived and typically narrow (a handful
/// of fields), so linear lookup is cheap and insertion order falls out for
/// free.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(Vec<(String, Value)>);

impl Record {
    pub fn new() -> Self {
        Record(Vec::new())
    }

    pub fn with_capacity(cap: usize) -> Self {
        Record(Vec::with_capacity(cap))
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.0.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Set a field's value, overwriting it in place if already present
    /// (preserving its original position) or appending otherwise.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if let Some(entry) = self.0.iter_mut().find(|(k, _)| *k == name) {
            entry.1 = value;
        } else {
            self.0.push((name, value));
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let pos = self.0.iter().position(|(k, _)| k == name)?;
        Some(self.0.remove(pos).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|(k, _)| k == name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.0.iter()
    }

    pub fn into_iter(self) -> impl Iterator<Item = (String, Value)> {
        self.0.into_iter()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Record(iter.into_iter().collect())
    }
}
