//! Pattern results and their parent/child reduction
//!
//! Grouped pattern results are refined with the `children` relation table
//! (`parent`, `child` pattern keys):
//!
//! 1. a parent with the same target count as one of its children is dropped
//!    in favour of the more specific child;
//! 2. remaining children are moved under their parent.
//!
//! Both passes look at every unordered pair of the list once, in list
//! order. Relations are not followed transitively.

use super::fields::coerce_number;
use super::table::{TableStore, CHILDREN_TABLE};
use crate::error::Result;
use crate::streams::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

/// One pattern with its summed counters
#[derive(Debug, Clone, PartialEq)]
pub struct PatternResult {
    key: String,
    counters: BTreeMap<String, Value>,
    children: Vec<PatternResult>,
}

impl PatternResult {
    pub fn new(key: impl Into<String>, counters: BTreeMap<String, Value>) -> Self {
        Self {
            key: key.into(),
            counters,
            children: Vec::new(),
        }
    }

    /// Opaque pattern key
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn counters(&self) -> &BTreeMap<String, Value> {
        &self.counters
    }

    /// Coerced counter value, 0 when missing
    pub fn counter(&self, field: &str) -> i64 {
        coerce_number(self.counters.get(field))
    }

    pub fn children(&self) -> &[PatternResult] {
        &self.children
    }
}

pub struct HierarchyReducer {
    /// parent key -> child keys
    children_of: HashMap<String, HashSet<String>>,
}

impl HierarchyReducer {
    pub fn new<I>(relations: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut children_of: HashMap<String, HashSet<String>> = HashMap::new();
        for (parent, child) in relations {
            children_of.entry(parent).or_default().insert(child);
        }
        Self { children_of }
    }

    fn is_parent(&self, parent: &str, child: &str) -> bool {
        self.children_of
            .get(parent)
            .is_some_and(|children| children.contains(child))
    }

    /// Reducer over the store's relation table, `None` when the table is absent
    pub fn from_store<S: TableStore + ?Sized>(store: &S) -> Result<Option<Self>> {
        let Some(table) = store.table(CHILDREN_TABLE)? else {
            log::info!("No '{}' table, pattern hierarchy is left as is", CHILDREN_TABLE);
            return Ok(None);
        };
        let (Some(parent_idx), Some(child_idx)) =
            (table.column_idx("parent"), table.column_idx("child"))
        else {
            log::warn!("⚠️  '{}' table lacks parent/child columns", CHILDREN_TABLE);
            return Ok(None);
        };

        let relations = table.rows().iter().filter_map(|row| {
            Some((
                row.get(parent_idx).to_key_string()?,
                row.get(child_idx).to_key_string()?,
            ))
        });
        Ok(Some(Self::new(relations)))
    }

    /// `(parent, child)` positions when `a` and `b` are related either way
    fn relation(&self, results: &[PatternResult], a: usize, b: usize) -> Option<(usize, usize)> {
        let (ka, kb) = (results[a].key(), results[b].key());
        if self.is_parent(ka, kb) {
            Some((a, b))
        } else if self.is_parent(kb, ka) {
            Some((b, a))
        } else {
            None
        }
    }

    fn related_pairs(&self, results: &[PatternResult]) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for i in 0..results.len() {
            for j in (i + 1)..results.len() {
                if let Some(pair) = self.relation(results, i, j) {
                    pairs.push(pair);
                }
            }
        }
        pairs
    }

    /// Drop parents whose target count equals one of their children's
    pub fn remove_equivalent_parents(
        &self,
        results: Vec<PatternResult>,
        target_field: &str,
    ) -> Vec<PatternResult> {
        let removed: HashSet<usize> = self
            .related_pairs(&results)
            .into_iter()
            .filter(|&(parent, child)| {
                results[parent].counter(target_field) == results[child].counter(target_field)
            })
            .map(|(parent, _)| parent)
            .collect();

        log::debug!("Removed {} equivalent parent patterns", removed.len());
        results
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| !removed.contains(idx))
            .map(|(_, result)| result)
            .collect()
    }

    /// Move every child found in the list under its parent
    pub fn hide_less_relevant_children(&self, mut results: Vec<PatternResult>) -> Vec<PatternResult> {
        let mut removed = HashSet::new();
        for (parent, child) in self.related_pairs(&results) {
            removed.insert(child);
            let copy = results[child].clone();
            results[parent].children.push(copy);
        }

        log::debug!("Moved {} child patterns under their parents", removed.len());
        results
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| !removed.contains(idx))
            .map(|(_, result)| result)
            .collect()
    }

    pub fn reduce(&self, results: Vec<PatternResult>, target_field: &str) -> Vec<PatternResult> {
        let results = self.remove_equivalent_parents(results, target_field);
        self.hide_less_relevant_children(results)
    }
}
