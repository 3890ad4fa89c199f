//! Aggregation queries over crawl tables
//!
//! [`MetricsQuery`] sums counters of the "full_crawl" table, optionally
//! grouped by cross properties. [`SuggestQuery`] ranks the patterns of the
//! "suggest" table and refines them with the pattern hierarchy.
//!
//! Pipeline: filter, group and sum, post-aggregation hook, sort, then
//! (patterns only) hierarchy reduction, key resolution and truncation.

use super::fields::{coerce_number, display_value, nest, FieldCatalog, FieldValidation};
use super::filter::{Filter, FilterNode};
use super::hierarchy::{HierarchyReducer, PatternResult};
use super::settings::{QuerySettings, SortOrder};
use super::table::{Table, TableStore, FULL_CRAWL_TABLE, SUGGEST_TABLE};
use crate::error::{AnalyticsError, Result};
use crate::resolve::DisplayResolver;
use crate::streams::{Row, Value};
use serde::Serialize;
use serde_json::{Map, Value as Json};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Nested counter object
pub type Counters = Map<String, Json>;

/// Column of the "suggest" table holding the pattern key
pub const PATTERN_KEY_COLUMN: &str = "query";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupResult {
    pub properties: Map<String, Json>,
    pub counters: Counters,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    /// All filtered rows summed into one set of counters
    Aggregate { counters: Counters },
    /// One result per group, in sort order
    Grouped(Vec<GroupResult>),
}

/// Pattern query result with its display string
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternOutput {
    pub query: String,
    pub query_hash_id: Vec<i64>,
    pub counters: Counters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<PatternOutput>>,
}

/// Summed values of one group, aligned with the table columns
#[derive(Debug, Clone)]
pub struct AggregatedGroup<'t> {
    columns: &'t [String],
    values: Vec<Value>,
}

impl AggregatedGroup<'_> {
    /// Value of `field`, `Null` when the table has no such column
    pub fn get(&self, field: &str) -> &Value {
        self.columns
            .iter()
            .position(|c| c == field)
            .and_then(|idx| self.values.get(idx))
            .unwrap_or(&Value::Null)
    }
}

/// Filter applied to groups once they are summed
pub trait AggregateHook {
    fn keep(&self, group: &AggregatedGroup<'_>) -> bool;
}

pub struct KeepAll;

impl AggregateHook for KeepAll {
    fn keep(&self, _group: &AggregatedGroup<'_>) -> bool {
        true
    }
}

/// Keeps groups holding more than `min_pages` pages
pub struct MinPagesHook {
    pub min_pages: i64,
}

impl MinPagesHook {
    /// Threshold at 3% of the crawled urls
    pub fn from_urls_done(urls_done: u64) -> Self {
        Self {
            min_pages: (urls_done as f64 * 0.03) as i64,
        }
    }
}

impl AggregateHook for MinPagesHook {
    fn keep(&self, group: &AggregatedGroup<'_>) -> bool {
        coerce_number(Some(group.get("pages_nb"))) > self.min_pages
    }
}

// =============================================================================
// === Shared pipeline steps
// =============================================================================

fn load_table(store: &dyn TableStore, name: &str) -> Result<Table> {
    store
        .table(name)?
        .ok_or_else(|| AnalyticsError::MissingTable(name.to_string()))
}

fn validate_fields(
    catalog: &FieldCatalog,
    settings: &QuerySettings,
    filter: Option<&FilterNode>,
    table: &Table,
    mode: FieldValidation,
) -> Result<()> {
    let mut fields = settings.referenced_fields();
    if let Some(filter) = filter {
        fields.extend(filter.fields());
    }
    catalog.validate(fields, table.columns(), mode)
}

/// Requested fields, or every table column that is not a cross property
fn output_fields(
    catalog: &FieldCatalog,
    settings: &QuerySettings,
    table: &Table,
    excluded: &[&str],
) -> Vec<String> {
    match &settings.fields {
        Some(fields) => catalog.expand(fields),
        None => {
            let columns: Vec<&str> = table
                .columns()
                .iter()
                .map(String::as_str)
                .filter(|c| !catalog.is_cross_property(c) && !excluded.contains(c))
                .collect();
            catalog.expand(&columns)
        }
    }
}

fn select_rows<'t>(table: &'t Table, filter: Option<&FilterNode>) -> Vec<&'t Row> {
    let rows: Vec<&Row> = match filter {
        None => table.rows().iter().collect(),
        Some(filter) => table
            .rows()
            .iter()
            .filter(|row| filter.matches(&|field: &str| table.value(row, field)))
            .collect(),
    };
    log::debug!("{} of {} rows selected", rows.len(), table.len());
    rows
}

fn sum_values(width: usize, rows: &[&Row]) -> Vec<Value> {
    let mut sums = vec![Value::Null; width];
    for row in rows {
        for (idx, sum) in sums.iter_mut().enumerate() {
            *sum = sum.add(row.get(idx));
        }
    }
    sums
}

/// Cell of a grouping column; a column missing from the table is `Null`
fn key_cell(row: &Row, key: Option<usize>) -> &Value {
    match key {
        Some(idx) => row.get(idx),
        None => &Value::Null,
    }
}

fn cmp_keys(a: &Row, b: &Row, keys: &[Option<usize>]) -> Ordering {
    keys.iter()
        .map(|&key| key_cell(a, key).total_cmp(key_cell(b, key)))
        .find(|ord| *ord != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Group rows on the `keys` columns, groups in ascending key order
///
/// Key columns keep the group's key, every other column is summed.
fn group_rows<'t>(table: &'t Table, mut rows: Vec<&Row>, keys: &[Option<usize>]) -> Vec<AggregatedGroup<'t>> {
    rows.sort_by(|a, b| cmp_keys(a, b, keys));

    let width = table.columns().len();
    let mut groups = Vec::new();
    let mut start = 0;
    while start < rows.len() {
        let mut end = start + 1;
        while end < rows.len() && cmp_keys(rows[start], rows[end], keys) == Ordering::Equal {
            end += 1;
        }

        let mut values = sum_values(width, &rows[start..end]);
        for idx in keys.iter().flatten() {
            values[*idx] = rows[start].get(*idx).clone();
        }
        groups.push(AggregatedGroup {
            columns: table.columns(),
            values,
        });
        start = end;
    }
    groups
}

fn sort_groups(groups: &mut [AggregatedGroup<'_>], sort: &[(String, SortOrder)]) {
    groups.sort_by(|a, b| {
        sort.iter()
            .map(|(field, order)| {
                let ord = a.get(field).total_cmp(b.get(field));
                match order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            })
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

fn counters_of<'f, F>(catalog: &FieldCatalog, fields: &[String], lookup: F) -> Counters
where
    F: Fn(&str) -> Option<&'f Value>,
{
    nest(
        fields
            .iter()
            .map(|field| (field.clone(), catalog.coerce(field, lookup(field)))),
    )
}

// =============================================================================
// === Flat metrics
// =============================================================================

/// Counter queries over the "full_crawl" table
pub struct MetricsQuery<'s> {
    store: &'s dyn TableStore,
    catalog: FieldCatalog,
    validation: FieldValidation,
    hook: Box<dyn AggregateHook>,
}

impl<'s> MetricsQuery<'s> {
    pub fn new(store: &'s dyn TableStore, catalog: FieldCatalog) -> Self {
        Self {
            store,
            catalog,
            validation: FieldValidation::Strict,
            hook: Box::new(KeepAll),
        }
    }

    pub fn with_validation(mut self, validation: FieldValidation) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_hook(mut self, hook: impl AggregateHook + 'static) -> Self {
        self.hook = Box::new(hook);
        self
    }

    pub fn query(&self, settings: &QuerySettings) -> Result<QueryResult> {
        let table = load_table(self.store, FULL_CRAWL_TABLE)?;
        let filter = settings.filters.as_ref().map(Filter::root);
        validate_fields(&self.catalog, settings, filter, &table, self.validation)?;

        let fields = output_fields(&self.catalog, settings, &table, &[]);
        let rows = select_rows(&table, filter);

        let group_by = match &settings.group_by {
            Some(group_by) if !group_by.is_empty() => group_by,
            _ => {
                let group = AggregatedGroup {
                    columns: table.columns(),
                    values: sum_values(table.columns().len(), &rows),
                };
                let counters = counters_of(&self.catalog, &fields, |f| Some(group.get(f)));
                return Ok(QueryResult::Aggregate { counters });
            }
        };

        let keys: Vec<Option<usize>> = group_by.iter().map(|f| table.column_idx(f)).collect();
        let mut groups = group_rows(&table, rows, &keys);
        let total = groups.len();
        groups.retain(|group| self.hook.keep(group));
        if let Some(sort) = &settings.sort {
            sort_groups(&mut groups, sort);
        }
        log::debug!("{} of {} groups kept after aggregation", groups.len(), total);

        let results = groups
            .iter()
            .map(|group| GroupResult {
                properties: group_by
                    .iter()
                    .map(|f| (f.clone(), display_value(group.get(f))))
                    .collect(),
                counters: counters_of(&self.catalog, &fields, |f| Some(group.get(f))),
            })
            .collect();
        Ok(QueryResult::Grouped(results))
    }
}

// =============================================================================
// === Pattern suggestions
// =============================================================================

/// Pattern ranking over the "suggest" table
pub struct SuggestQuery<'s> {
    store: &'s dyn TableStore,
    catalog: FieldCatalog,
    validation: FieldValidation,
    max_results: usize,
    max_children: usize,
}

impl<'s> SuggestQuery<'s> {
    pub fn new(store: &'s dyn TableStore, catalog: FieldCatalog) -> Self {
        Self {
            store,
            catalog,
            validation: FieldValidation::Strict,
            max_results: 30,
            max_children: 10,
        }
    }

    pub fn with_validation(mut self, validation: FieldValidation) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_limits(mut self, max_results: usize, max_children: usize) -> Self {
        self.max_results = max_results;
        self.max_children = max_children;
        self
    }

    /// Ranked patterns before resolution and truncation
    ///
    /// With `relevance`, equivalent parents are removed and children moved
    /// under their parent.
    pub fn patterns(&self, settings: &QuerySettings, relevance: bool) -> Result<(Vec<String>, Vec<PatternResult>)> {
        let table = load_table(self.store, SUGGEST_TABLE)?;
        let filter = settings.filters.as_ref().map(Filter::root);
        validate_fields(&self.catalog, settings, filter, &table, self.validation)?;

        let key_idx = table.column_idx(PATTERN_KEY_COLUMN).ok_or_else(|| {
            AnalyticsError::BadRequest(format!(
                "table '{}' has no '{}' column",
                SUGGEST_TABLE, PATTERN_KEY_COLUMN
            ))
        })?;
        let fields = output_fields(&self.catalog, settings, &table, &[PATTERN_KEY_COLUMN]);
        let target = settings.target_field.as_str();

        let rows = select_rows(&table, filter);
        let mut groups = group_rows(&table, rows, &[Some(key_idx)]);
        groups.sort_by(|a, b| b.get(target).total_cmp(a.get(target)));

        let mut patterns: Vec<PatternResult> = groups
            .iter()
            .filter_map(|group| {
                let key = group.get(PATTERN_KEY_COLUMN).to_key_string()?;
                let counters: BTreeMap<String, Value> = fields
                    .iter()
                    .map(String::as_str)
                    .chain(std::iter::once(target))
                    .map(|f| (f.to_string(), group.get(f).clone()))
                    .collect();
                Some(PatternResult::new(key, counters))
            })
            .collect();

        if relevance {
            if let Some(reducer) = HierarchyReducer::from_store(self.store)? {
                patterns = reducer.reduce(patterns, target);
            }
        }
        Ok((fields, patterns))
    }

    pub fn query<R>(&self, settings: &QuerySettings, resolver: &R, relevance: bool) -> Result<Vec<PatternOutput>>
    where
        R: DisplayResolver<String> + ?Sized,
    {
        let (fields, patterns) = self.patterns(settings, relevance)?;

        let mut keys: Vec<String> = patterns
            .iter()
            .flat_map(|p| std::iter::once(p).chain(p.children()))
            .map(|p| p.key().to_string())
            .collect();
        keys.sort();
        keys.dedup();
        let resolved = resolver.resolve_batch(&keys)?;
        let unresolved = keys.iter().filter(|k| !resolved.contains_key(*k)).count();
        if unresolved > 0 {
            log::warn!("⚠️  {} pattern keys could not be resolved", unresolved);
        }

        let outputs: Vec<PatternOutput> = patterns
            .iter()
            .map(|pattern| {
                let mut output = self.output(pattern, &fields, &resolved);
                if settings.display_children && !pattern.children().is_empty() {
                    output.children = Some(
                        pattern
                            .children()
                            .iter()
                            .take(self.max_children)
                            .map(|child| self.output(child, &fields, &resolved))
                            .collect(),
                    );
                }
                output
            })
            .take(self.max_results)
            .collect();

        log::info!("✅ {} patterns of {} returned", outputs.len(), patterns.len());
        Ok(outputs)
    }

    fn output(&self, pattern: &PatternResult, fields: &[String], resolved: &HashMap<String, String>) -> PatternOutput {
        let key = pattern.key();
        PatternOutput {
            query: resolved.get(key).cloned().unwrap_or_else(|| key.to_string()),
            query_hash_id: key
                .split(';')
                .filter_map(|part| part.trim().parse().ok())
                .collect(),
            counters: counters_of(&self.catalog, fields, |f| pattern.counters().get(f)),
            children: None,
        }
    }
}
