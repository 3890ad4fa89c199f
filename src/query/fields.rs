//! Field catalog, output coercion and dot path nesting

use crate::error::{AnalyticsError, Result};
use crate::streams::Value;
use serde_json::{Map, Value as Json};
use std::collections::HashSet;

/// How unknown field references are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldValidation {
    /// Unknown fields are a `BadRequest`
    #[default]
    Strict,
    /// Unknown fields are logged and the query proceeds
    Advisory,
}

impl FieldValidation {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            FieldValidation::Strict
        } else {
            FieldValidation::Advisory
        }
    }
}

/// Known grouping dimensions and counters of the aggregated tables
#[derive(Debug, Clone, Default)]
pub struct FieldCatalog {
    cross_properties: Vec<String>,
    counters: Vec<String>,
    list_fields: HashSet<String>,
}

impl FieldCatalog {
    pub fn new(cross_properties: &[&str], counters: &[&str]) -> Self {
        Self {
            cross_properties: cross_properties.iter().map(|f| f.to_string()).collect(),
            counters: counters.iter().map(|f| f.to_string()).collect(),
            list_fields: HashSet::new(),
        }
    }

    /// Mark fields whose values are emitted as arrays
    pub fn with_list_fields(mut self, fields: &[&str]) -> Self {
        self.list_fields.extend(fields.iter().map(|f| f.to_string()));
        self
    }

    /// Dimensions and counters of the crawl aggregation tables
    pub fn crawl() -> Self {
        Self::new(
            &[
                "host",
                "resource_type",
                "content_type",
                "depth",
                "http_code",
                "index",
                "follow",
            ],
            &[
                "pages_nb",
                "pages_code_ok",
                "pages_code_ko",
                "delay_lt_500ms",
                "delay_from500ms_to_1s",
                "delay_from_1s_to_2s",
                "delay_gte_2s",
                "inlinks_nb",
                "outlinks_internal_nb",
                "outlinks_external_nb",
                "metadata.title.filled",
                "metadata.title.not_filled",
                "metadata.title.unique",
                "metadata.title.duplicate",
                "metadata.h1.filled",
                "metadata.h1.not_filled",
                "metadata.h1.unique",
                "metadata.h1.duplicate",
                "metadata.description.filled",
                "metadata.description.not_filled",
                "metadata.description.unique",
                "metadata.description.duplicate",
                "metadata.h2.filled",
                "metadata.h3.filled",
                "error_links.3xx.nb",
                "error_links.3xx.urls",
                "error_links.4xx.nb",
                "error_links.4xx.urls",
                "error_links.5xx.nb",
                "error_links.5xx.urls",
            ],
        )
        .with_list_fields(&[
            "error_links.3xx.urls",
            "error_links.4xx.urls",
            "error_links.5xx.urls",
        ])
    }

    pub fn is_cross_property(&self, field: &str) -> bool {
        self.cross_properties.iter().any(|f| f == field)
    }

    pub fn is_list(&self, field: &str) -> bool {
        self.list_fields.contains(field)
    }

    /// Counter leaves under `field.`
    pub fn children(&self, field: &str) -> Vec<String> {
        let prefix = format!("{}.", field);
        self.counters
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .cloned()
            .collect()
    }

    pub fn has_children(&self, field: &str) -> bool {
        !self.children(field).is_empty()
    }

    /// Catalog field or prefix of catalog counters
    pub fn is_known(&self, field: &str) -> bool {
        self.is_cross_property(field)
            || self.counters.iter().any(|c| c == field)
            || self.has_children(field)
    }

    /// Replace fields that have children by their leaves
    pub fn expand<S: AsRef<str>>(&self, fields: &[S]) -> Vec<String> {
        fields
            .iter()
            .flat_map(|f| {
                let f = f.as_ref();
                if self.has_children(f) {
                    self.children(f)
                } else {
                    vec![f.to_string()]
                }
            })
            .collect()
    }

    /// Check referenced fields against the catalog and the table columns
    pub fn validate<'f, I>(&self, fields: I, columns: &[String], mode: FieldValidation) -> Result<()>
    where
        I: IntoIterator<Item = &'f str>,
    {
        for field in fields {
            if self.is_known(field) || columns.iter().any(|c| c == field) {
                continue;
            }
            match mode {
                FieldValidation::Strict => {
                    return Err(AnalyticsError::BadRequest(format!(
                        "Field {} not allowed in query",
                        field
                    )))
                }
                FieldValidation::Advisory => {
                    log::warn!("⚠️  Unknown field '{}' in query, ignoring", field)
                }
            }
        }
        Ok(())
    }

    /// Output form of a counter value
    pub fn coerce(&self, field: &str, value: Option<&Value>) -> Json {
        if self.is_list(field) {
            return match value {
                Some(Value::List(items)) => Json::Array(items.iter().map(Json::from).collect()),
                Some(v) if !v.is_null() => Json::Array(vec![Json::from(v)]),
                _ => Json::Array(Vec::new()),
            };
        }
        Json::from(coerce_number(value))
    }
}

/// Counter coercion: missing, NaN and non numeric values are 0, booleans
/// 0/1, floats truncated
pub fn coerce_number(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Int(i)) => *i,
        Some(Value::Bool(b)) => *b as i64,
        Some(Value::Float(f)) if f.is_finite() => f.trunc() as i64,
        _ => 0,
    }
}

/// Display form of a grouping property: numbers normalized, strings kept
pub fn display_value(value: &Value) -> Json {
    match value {
        Value::Float(_) => Json::from(coerce_number(Some(value))),
        other => Json::from(other),
    }
}

/// Insert `value` at a dot separated path, creating nested objects
pub fn insert_path(target: &mut Map<String, Json>, path: &str, value: Json) {
    match path.split_once('.') {
        None => {
            target.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = target
                .entry(head.to_string())
                .or_insert_with(|| Json::Object(Map::new()));
            if !child.is_object() {
                *child = Json::Object(Map::new());
            }
            if let Json::Object(child) = child {
                insert_path(child, rest, value);
            }
        }
    }
}

/// Nest `(dot path, value)` pairs into one object
pub fn nest<I>(pairs: I) -> Map<String, Json>
where
    I: IntoIterator<Item = (String, Json)>,
{
    let mut out = Map::new();
    for (path, value) in pairs {
        insert_path(&mut out, &path, value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expand_fields_with_children() {
        let catalog = FieldCatalog::crawl();
        let fields = catalog.expand(&["pages_nb", "metadata.title"]);
        assert_eq!(
            fields,
            vec![
                "pages_nb",
                "metadata.title.filled",
                "metadata.title.not_filled",
                "metadata.title.unique",
                "metadata.title.duplicate",
            ]
        );
        assert_eq!(catalog.expand(&["error_links"]).len(), 6);
    }

    #[test]
    fn test_validate_modes() {
        let catalog = FieldCatalog::crawl();
        let columns = vec!["custom_counter".to_string()];

        assert!(catalog
            .validate(["depth", "metadata.h1", "custom_counter"], &columns, FieldValidation::Strict)
            .is_ok());

        let err = catalog
            .validate(["depht"], &columns, FieldValidation::Strict)
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::BadRequest(_)));

        assert!(catalog
            .validate(["depht"], &columns, FieldValidation::Advisory)
            .is_ok());
    }

    #[test]
    fn test_coercion() {
        assert_eq!(coerce_number(None), 0);
        assert_eq!(coerce_number(Some(&Value::Float(f64::NAN))), 0);
        assert_eq!(coerce_number(Some(&Value::Float(3.9))), 3);
        assert_eq!(coerce_number(Some(&Value::Bool(true))), 1);
        assert_eq!(coerce_number(Some(&Value::from("12"))), 0);

        let catalog = FieldCatalog::crawl();
        assert_eq!(
            catalog.coerce("error_links.3xx.urls", Some(&Value::from(vec![1i64, 2]))),
            json!([1, 2])
        );
        assert_eq!(catalog.coerce("error_links.3xx.urls", None), json!([]));
        assert_eq!(catalog.coerce("pages_nb", Some(&Value::Int(4))), json!(4));
    }

    #[test]
    fn test_nest_dot_paths() {
        let nested = nest(vec![
            ("pages_nb".to_string(), json!(10)),
            ("metadata.title.filled".to_string(), json!(3)),
            ("metadata.title.duplicate".to_string(), json!(1)),
            ("metadata.h1.filled".to_string(), json!(2)),
        ]);
        assert_eq!(
            Json::Object(nested),
            json!({
                "pages_nb": 10,
                "metadata": {
                    "title": {"filled": 3, "duplicate": 1},
                    "h1": {"filled": 2}
                }
            })
        );
    }
}
