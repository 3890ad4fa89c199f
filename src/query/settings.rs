//! Query settings documents

use super::filter::Filter;
use crate::error::{AnalyticsError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

pub const DEFAULT_TARGET_FIELD: &str = "pages_nb";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

/// Settings of one query, read from a JSON document
///
/// ```json
/// {
///   "fields": ["pages_nb", "metadata.title"],
///   "filters": {"and": [{"field": "depth", "value": 2, "predicate": "lte"}]},
///   "group_by": ["depth"],
///   "sort": [["pages_nb", "DESC"]]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySettings {
    #[serde(default)]
    pub fields: Option<Vec<String>>,

    /// Filter tree, validated when the settings are read
    #[serde(default)]
    pub filters: Option<Filter>,

    #[serde(default)]
    pub group_by: Option<Vec<String>>,

    #[serde(default)]
    pub sort: Option<Vec<(String, SortOrder)>>,

    /// Counter used to rank pattern results
    #[serde(default = "default_target_field")]
    pub target_field: String,

    #[serde(default = "default_display_children")]
    pub display_children: bool,
}

fn default_target_field() -> String {
    DEFAULT_TARGET_FIELD.to_string()
}

fn default_display_children() -> bool {
    true
}

fn invalid_settings(err: serde_json::Error) -> AnalyticsError {
    AnalyticsError::BadRequest(format!("invalid query settings: {}", err))
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            fields: None,
            filters: None,
            group_by: None,
            sort: None,
            target_field: default_target_field(),
            display_children: true,
        }
    }
}

impl QuerySettings {
    /// Read a settings document; a malformed filter is a `MalformedFilter`
    pub fn from_json(doc: &str) -> Result<Self> {
        let mut doc: Json = serde_json::from_str(doc).map_err(invalid_settings)?;
        let filters = match doc.as_object_mut().and_then(|obj| obj.remove("filters")) {
            None | Some(Json::Null) => None,
            Some(raw) => Some(Filter::try_from(raw)?),
        };

        let mut settings: Self = serde_json::from_value(doc).map_err(invalid_settings)?;
        settings.filters = filters;
        Ok(settings)
    }

    /// Every field named in `fields`, `group_by` and `sort`
    pub fn referenced_fields(&self) -> Vec<&str> {
        let fields = self.fields.iter().flatten().map(String::as_str);
        let group_by = self.group_by.iter().flatten().map(String::as_str);
        let sort = self.sort.iter().flatten().map(|(field, _)| field.as_str());
        fields.chain(group_by).chain(sort).collect()
    }
}
