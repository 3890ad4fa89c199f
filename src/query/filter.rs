//! Recursive boolean filters over table rows
//!
//! A filter document is parsed once into an immutable [`FilterNode`] tree.
//! Leaves look like `{"field": .., "value": .., "predicate": .., "not": ..}`,
//! boolean nodes like `{"and": [..]}` or `{"or": [..]}`.

use crate::error::{AnalyticsError, Result};
use crate::streams::Value;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::cmp::Ordering;
use std::str::FromStr;

/// Leaf comparison applied between a row value and the filter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Eq,
    Re,
    Starts,
    Ends,
    Gte,
    Lte,
    Gt,
    Lt,
    Contains,
    In,
}

impl FromStr for Predicate {
    type Err = AnalyticsError;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "eq" => Ok(Predicate::Eq),
            "re" => Ok(Predicate::Re),
            "starts" => Ok(Predicate::Starts),
            "ends" => Ok(Predicate::Ends),
            "gte" => Ok(Predicate::Gte),
            "lte" => Ok(Predicate::Lte),
            "gt" => Ok(Predicate::Gt),
            "lt" => Ok(Predicate::Lt),
            "contains" => Ok(Predicate::Contains),
            "in" => Ok(Predicate::In),
            _ => Err(malformed(format!("unknown predicate '{}'", name))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Leaf {
    pub field: String,
    pub predicate: Predicate,
    pub value: Value,
    pub negate: bool,
    /// Compiled pattern of a `re` leaf
    regex: Option<Regex>,
}

#[derive(Debug, Clone)]
pub enum FilterNode {
    Leaf(Leaf),
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
}

fn malformed(msg: impl Into<String>) -> AnalyticsError {
    AnalyticsError::MalformedFilter(msg.into())
}

/// Case-insensitive key lookup in a JSON object
fn get_key<'j>(obj: &'j serde_json::Map<String, Json>, key: &str) -> Option<&'j Json> {
    obj.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

/// Objects carrying both `field` and `value` are leaves, whatever else they hold
fn is_leaf(obj: &serde_json::Map<String, Json>) -> bool {
    get_key(obj, "field").is_some() && get_key(obj, "value").is_some()
}

/// The `and`/`or` operator of a boolean node, with its children
///
/// A boolean node has exactly one key.
fn boolean_node(json: &Json) -> Option<(&'static str, &Json)> {
    let obj = json.as_object()?;
    if obj.len() != 1 || is_leaf(obj) {
        return None;
    }
    let (key, children) = obj.iter().next()?;
    if key.eq_ignore_ascii_case("and") {
        Some(("and", children))
    } else if key.eq_ignore_ascii_case("or") {
        Some(("or", children))
    } else {
        None
    }
}

fn children_list(op: &str, children: &Json) -> Result<Vec<FilterNode>> {
    children
        .as_array()
        .ok_or_else(|| malformed(format!("'{}' expects a list", op)))?
        .iter()
        .map(FilterNode::parse)
        .collect()
}

fn build(op: &str, children: Vec<FilterNode>) -> FilterNode {
    if op == "and" {
        FilterNode::And(children)
    } else {
        FilterNode::Or(children)
    }
}

impl FilterNode {
    /// Parse and validate a filter document
    pub fn parse(json: &Json) -> Result<Self> {
        match json {
            Json::Object(obj) => {
                if let Some((op, children)) = boolean_node(json) {
                    return Ok(build(op, children_list(op, children)?));
                }
                Self::parse_leaf(obj)
            }
            Json::Array(items) => Self::parse_list(items),
            other => Err(malformed(format!("unexpected filter element: {}", other))),
        }
    }

    /// Legacy list form: `[{"and": [a, b]}, c]` is `a AND b AND c`;
    /// a list without a leading operator node is an OR of its elements
    fn parse_list(items: &[Json]) -> Result<Self> {
        let (first, rest) = items
            .split_first()
            .ok_or_else(|| malformed("empty filter list"))?;

        let rest = rest.iter().map(Self::parse).collect::<Result<Vec<_>>>()?;
        match boolean_node(first) {
            Some((op, children)) => {
                let mut nodes = children_list(op, children)?;
                nodes.extend(rest);
                Ok(build(op, nodes))
            }
            None => {
                let mut nodes = vec![Self::parse(first)?];
                nodes.extend(rest);
                Ok(FilterNode::Or(nodes))
            }
        }
    }

    fn parse_leaf(obj: &serde_json::Map<String, Json>) -> Result<Self> {
        let field = get_key(obj, "field")
            .and_then(Json::as_str)
            .ok_or_else(|| malformed("leaf without a 'field' string"))?;
        let raw_value = get_key(obj, "value").ok_or_else(|| malformed("leaf without a 'value'"))?;
        let value = Value::from(raw_value);

        let predicate = match get_key(obj, "predicate") {
            None | Some(Json::Null) if raw_value.is_array() => Predicate::In,
            None | Some(Json::Null) => Predicate::Eq,
            Some(Json::String(name)) => name.parse()?,
            Some(other) => return Err(malformed(format!("predicate must be a string, got {}", other))),
        };

        let negate = match get_key(obj, "not") {
            None | Some(Json::Null) => false,
            Some(Json::Bool(b)) => *b,
            Some(other) => return Err(malformed(format!("'not' must be a boolean, got {}", other))),
        };

        let regex = if predicate == Predicate::Re {
            let pattern = value
                .as_str()
                .ok_or_else(|| malformed("'re' predicate expects a string value"))?;
            Some(Regex::new(pattern).map_err(|e| malformed(format!("invalid regex: {}", e)))?)
        } else {
            None
        };

        Ok(FilterNode::Leaf(Leaf {
            field: field.to_string(),
            predicate,
            value,
            negate,
            regex,
        }))
    }

    /// Fields referenced by every leaf, in tree order
    pub fn fields(&self) -> Vec<&str> {
        match self {
            FilterNode::Leaf(leaf) => vec![leaf.field.as_str()],
            FilterNode::And(children) | FilterNode::Or(children) => {
                children.iter().flat_map(FilterNode::fields).collect()
            }
        }
    }

    /// Evaluate against a row, `lookup` giving the value of a field
    ///
    /// Every child of a boolean node is evaluated.
    pub fn matches<'v, F>(&self, lookup: &F) -> bool
    where
        F: Fn(&str) -> &'v Value,
    {
        match self {
            FilterNode::Leaf(leaf) => leaf.matches(lookup(&leaf.field)),
            FilterNode::And(children) => children
                .iter()
                .map(|child| child.matches(lookup))
                .fold(true, |acc, m| acc & m),
            FilterNode::Or(children) => children
                .iter()
                .map(|child| child.matches(lookup))
                .fold(false, |acc, m| acc | m),
        }
    }
}

/// A validated filter tree together with the document it was parsed from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Json", into = "Json")]
pub struct Filter {
    document: Json,
    root: FilterNode,
}

impl Filter {
    pub fn root(&self) -> &FilterNode {
        &self.root
    }

    pub fn document(&self) -> &Json {
        &self.document
    }
}

impl TryFrom<Json> for Filter {
    type Error = AnalyticsError;

    fn try_from(document: Json) -> Result<Self> {
        let root = FilterNode::parse(&document)?;
        Ok(Self { document, root })
    }
}

impl From<Filter> for Json {
    fn from(filter: Filter) -> Self {
        filter.document
    }
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.document == other.document
    }
}

/// Text view used by string predicates
fn text(value: &Value) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        _ => None,
    }
}

impl Leaf {
    pub fn matches(&self, actual: &Value) -> bool {
        let ordering = || actual.compare(&self.value);

        let result = match self.predicate {
            Predicate::Eq => actual.loose_eq(&self.value),
            Predicate::Re => match (&self.regex, text(actual)) {
                (Some(regex), Some(s)) => regex.is_match(&s),
                _ => false,
            },
            Predicate::Starts => match (text(actual), self.value.as_str()) {
                (Some(s), Some(prefix)) => s.starts_with(prefix),
                _ => false,
            },
            Predicate::Ends => match (text(actual), self.value.as_str()) {
                (Some(s), Some(suffix)) => s.ends_with(suffix),
                _ => false,
            },
            Predicate::Gte => matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)),
            Predicate::Lte => matches!(ordering(), Some(Ordering::Less | Ordering::Equal)),
            Predicate::Gt => ordering() == Some(Ordering::Greater),
            Predicate::Lt => ordering() == Some(Ordering::Less),
            Predicate::Contains => match (actual, &self.value) {
                (Value::List(items), needle) => items.iter().any(|item| item.loose_eq(needle)),
                (Value::Str(s), Value::Str(needle)) => s.contains(needle.as_str()),
                _ => false,
            },
            Predicate::In => match &self.value {
                Value::List(items) => items.iter().any(|item| actual.loose_eq(item)),
                single => actual.loose_eq(single),
            },
        };

        result ^ self.negate
    }
}
