//! Typed row schema: per-dataset headers and raw column casting

use crate::error::{AnalyticsError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A single typed cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Bool(b) => Some(*b as i64),
            Value::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            _ => None,
        }
    }

    /// Numeric view used for comparisons and sums (booleans count as 0/1)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// String form of an opaque key cell (pattern hashes, url ids)
    pub fn to_key_string(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_) | Value::Bool(_))
    }

    /// Equality that treats `Int(3)` and `Float(3.0)` as the same value
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            _ => self == other,
        }
    }

    /// Partial ordering between comparable values; `None` when the types do not compare
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (a, b) if a.is_numeric() && b.is_numeric() => a.as_f64()?.partial_cmp(&b.as_f64()?),
            _ => None,
        }
    }

    /// Total ordering used for grouping and sorting: nulls, numbers, strings, lists
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) | Value::Int(_) | Value::Float(_) => 1,
                Value::Str(_) => 2,
                Value::List(_) => 3,
            }
        }

        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.total_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                x.total_cmp(&y)
            }
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }

    /// Int, bool or finite float
    fn is_countable(&self) -> bool {
        match self {
            Value::Float(f) => f.is_finite(),
            other => other.is_numeric(),
        }
    }

    /// Value as a summand on its own, `Null` when it counts as nothing
    fn counted(&self) -> Value {
        match self {
            Value::Bool(b) => Value::Int(*b as i64),
            Value::List(_) => self.clone(),
            v if v.is_countable() => v.clone(),
            _ => Value::Null,
        }
    }

    /// Adds two values for counter aggregation; integers stay integers and
    /// lists are concatenated
    ///
    /// Missing, non numeric and non finite operands add nothing, so one bad
    /// cell never discards the rest of a sum.
    pub fn add(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::List(a), Value::List(b)) => Value::List(a.iter().chain(b).cloned().collect()),
            (Value::List(items), v) | (v, Value::List(items)) if !v.is_countable() => {
                Value::List(items.clone())
            }
            (a, b) if !b.is_countable() => a.counted(),
            (a, b) if !a.is_countable() => b.counted(),
            (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)) => Value::Int(
                self.as_i64()
                    .unwrap_or(0)
                    .saturating_add(other.as_i64().unwrap_or(0)),
            ),
            (a, b) => Value::Float(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Value::List(v.into_iter().map(Value::Int).collect())
    }
}

impl From<&Value> for serde_json::Value {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
        }
    }
}

impl From<&serde_json::Value> for Value {
    /// Objects have no cell representation and become `Null`
    fn from(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null | serde_json::Value::Object(_) => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from).collect()),
        }
    }
}

/// Declared type of a stream column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Float,
    Str,
    Bool,
    /// `;` separated integers
    IntList,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Str => "str",
            FieldType::Bool => "bool",
            FieldType::IntList => "int list",
        }
    }

    pub fn cast(&self, field: &str, raw: &str) -> Result<Value> {
        let fail = || AnalyticsError::Cast {
            field: field.to_string(),
            value: raw.to_string(),
            expected: self.as_str(),
        };

        match self {
            FieldType::Int => raw.trim().parse::<i64>().map(Value::Int).map_err(|_| fail()),
            FieldType::Float => raw.trim().parse::<f64>().map(Value::Float).map_err(|_| fail()),
            FieldType::Str => Ok(Value::Str(raw.to_string())),
            FieldType::Bool => match raw.trim() {
                "1" | "true" | "True" => Ok(Value::Bool(true)),
                "0" | "false" | "False" => Ok(Value::Bool(false)),
                _ => Err(fail()),
            },
            FieldType::IntList => {
                if raw.trim().is_empty() {
                    return Ok(Value::List(Vec::new()));
                }
                raw.split(';')
                    .map(|s| s.trim().parse::<i64>().map(Value::Int).map_err(|_| fail()))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::List)
            }
        }
    }
}

/// An immutable typed row
#[derive(Debug, Clone, PartialEq)]
pub struct Row(Vec<Value>);

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Row(values)
    }

    pub fn get(&self, idx: usize) -> &Value {
        self.0.get(idx).unwrap_or(&Value::Null)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Integer cell, `None` when the column is missing or not numeric
    pub fn int(&self, idx: usize) -> Option<i64> {
        self.get(idx).as_i64()
    }

    pub fn str(&self, idx: usize) -> Option<&str> {
        self.get(idx).as_str()
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row(values)
    }
}

/// Dataset declaration: file prefix plus ordered (name, type) headers
#[derive(Debug, Clone, Copy)]
pub struct StreamDef {
    pub name: &'static str,
    pub file_prefix: &'static str,
    pub headers: &'static [(&'static str, FieldType)],
}

impl StreamDef {
    /// Position of `field` in the headers
    pub fn field_idx(&self, field: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|(name, _)| *name == field)
            .ok_or_else(|| AnalyticsError::UnknownStreamField {
                stream: self.name.to_string(),
                field: field.to_string(),
            })
    }

    pub fn caster(&self) -> Caster {
        Caster { def: *self }
    }

    /// Field name to value view of a row
    pub fn to_map<'r>(&self, row: &'r Row) -> BTreeMap<&'static str, &'r Value> {
        self.headers
            .iter()
            .zip(row.values())
            .map(|((name, _), value)| (*name, value))
            .collect()
    }
}

/// Casts raw text columns into typed rows for one stream definition
#[derive(Debug, Clone, Copy)]
pub struct Caster {
    def: StreamDef,
}

impl Caster {
    pub fn cast(&self, columns: &[&str]) -> Result<Row> {
        if columns.len() < self.def.headers.len() {
            return Err(AnalyticsError::MissingColumn {
                stream: self.def.name.to_string(),
                expected: self.def.headers.len(),
                found: columns.len(),
            });
        }

        self.def
            .headers
            .iter()
            .zip(columns)
            .map(|((name, field_type), raw)| field_type.cast(name, raw))
            .collect::<Result<Vec<_>>>()
            .map(Row::new)
    }

    /// Cast a tab separated line (trailing line terminator ignored)
    pub fn cast_line(&self, line: &str) -> Result<Row> {
        let line = line.trim_end_matches(['\n', '\r']);
        let columns: Vec<&str> = line.split('\t').collect();
        self.cast(&columns)
    }
}

pub const PATTERNS: StreamDef = StreamDef {
    name: "patterns",
    file_prefix: "urlids",
    headers: &[
        ("id", FieldType::Int),
        ("protocol", FieldType::Str),
        ("host", FieldType::Str),
        ("path", FieldType::Str),
        ("query_string", FieldType::Str),
    ],
};

pub const CONTENTS: StreamDef = StreamDef {
    name: "contents",
    file_prefix: "urlcontents",
    headers: &[
        ("id", FieldType::Int),
        ("content_type", FieldType::Int),
        ("hash", FieldType::Int),
        ("txt", FieldType::Str),
    ],
};

pub const OUTLINKS_RAW: StreamDef = StreamDef {
    name: "outlinks_raw",
    file_prefix: "urllinks",
    headers: &[
        ("id", FieldType::Int),
        ("link_type", FieldType::Str),
        ("follow", FieldType::Int),
        ("dst_url_id", FieldType::Int),
        ("external_url", FieldType::Str),
    ],
};

pub const CONTENTS_DUPLICATE: StreamDef = StreamDef {
    name: "contents_duplicate",
    file_prefix: "urlcontentsduplicate",
    headers: &[
        ("id", FieldType::Int),
        ("content_type", FieldType::Int),
        ("filled_nb", FieldType::Int),
        ("duplicates_nb", FieldType::Int),
        ("is_first", FieldType::Bool),
        ("duplicate_urls", FieldType::IntList),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cast_contents_line() {
        let row = CONTENTS.caster().cast_line("5\t1\t-123456\tMy title\n").unwrap();
        assert_eq!(row.int(0), Some(5));
        assert_eq!(row.int(1), Some(1));
        assert_eq!(row.int(2), Some(-123456));
        assert_eq!(row.str(3), Some("My title"));
    }

    #[test]
    fn test_cast_error_names_field() {
        let err = CONTENTS.caster().cast_line("5\ttitle\t1\ttxt").unwrap_err();
        match err {
            AnalyticsError::Cast { field, value, .. } => {
                assert_eq!(field, "content_type");
                assert_eq!(value, "title");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_missing_columns() {
        let err = PATTERNS.caster().cast_line("1\thttp").unwrap_err();
        assert!(matches!(err, AnalyticsError::MissingColumn { expected: 5, found: 2, .. }));
    }

    #[test]
    fn test_int_list_and_bool() {
        let row = CONTENTS_DUPLICATE
            .caster()
            .cast_line("9\t1\t1\t2\t0\t5;12")
            .unwrap();
        assert_eq!(row.get(4), &Value::Bool(false));
        assert_eq!(row.get(5), &Value::from(vec![5i64, 12]));

        let row = CONTENTS_DUPLICATE.caster().cast_line("9\t3\t1\t0\t1\t").unwrap();
        assert_eq!(row.get(5), &Value::List(vec![]));
    }

    #[test]
    fn test_field_idx_and_map() {
        assert_eq!(OUTLINKS_RAW.field_idx("external_url").unwrap(), 4);
        assert!(OUTLINKS_RAW.field_idx("nope").is_err());

        let row = PATTERNS
            .caster()
            .cast_line("1\thttp\twww.site.com\t/\t")
            .unwrap();
        let map = PATTERNS.to_map(&row);
        assert_eq!(map["host"], &Value::from("www.site.com"));
        assert_eq!(map["id"], &Value::Int(1));
    }

    #[test]
    fn test_value_ordering() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Some(Ordering::Less));
        assert_eq!(Value::from("a").compare(&Value::Int(1)), None);
        assert!(Value::Int(3).loose_eq(&Value::Float(3.0)));
        assert_eq!(Value::Null.total_cmp(&Value::Int(0)), Ordering::Less);
        assert_eq!(Value::Int(1).add(&Value::Bool(true)), Value::Int(2));
        assert_eq!(Value::Int(1).add(&Value::Float(0.5)), Value::Float(1.5));
        assert_eq!(
            Value::Null.add(&Value::from(vec![1i64])).add(&Value::from(vec![2i64, 3])),
            Value::from(vec![1i64, 2, 3])
        );
        assert_eq!(Value::from("a").add(&Value::from("b")), Value::Null);
    }

    #[test]
    fn test_add_skips_bad_cells() {
        assert_eq!(Value::from("a").add(&Value::Int(1)), Value::Int(1));
        assert_eq!(Value::Int(10).add(&Value::from("x")).add(&Value::Int(5)), Value::Int(15));
        assert_eq!(
            Value::Int(10).add(&Value::Float(f64::NAN)).add(&Value::Int(5)),
            Value::Int(15)
        );
        assert_eq!(Value::Null.add(&Value::Float(f64::INFINITY)), Value::Null);
        assert_eq!(Value::Null.add(&Value::Bool(true)), Value::Int(1));
    }
}
