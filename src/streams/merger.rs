//! Sorted-stream merger: one linear pass joining a primary stream against
//! named secondary streams sharing the same key order.
//!
//! Every input must be sorted ascending in its key. Sortedness is not
//! checked: an unsorted secondary silently under- or over-matches.

use super::schema::Row;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::iter::Peekable;

/// A primary row with every secondary row sharing its key
#[derive(Debug, Clone, PartialEq)]
pub struct JoinRecord<K, T> {
    pub key: K,
    pub primary: T,
    matches: BTreeMap<String, Vec<T>>,
}

impl<K, T> JoinRecord<K, T> {
    /// Rows of the secondary stream `name` sharing the key (empty if none)
    pub fn matches(&self, name: &str) -> &[T] {
        self.matches.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

struct SecondaryCursor<'a, T, K> {
    name: String,
    rows: Peekable<Box<dyn Iterator<Item = T> + 'a>>,
    key: Box<dyn Fn(&T) -> K + 'a>,
}

impl<T, K: Ord> SecondaryCursor<'_, T, K> {
    /// Pull every row equal to `key`, dropping rows below it.
    /// Never advances past a row whose key is greater.
    fn take_matching(&mut self, key: &K) -> Vec<T> {
        let mut matched = Vec::new();
        while let Some(row) = self.rows.peek() {
            match (self.key)(row).cmp(key) {
                Ordering::Less => {
                    self.rows.next();
                }
                Ordering::Equal => {
                    if let Some(row) = self.rows.next() {
                        matched.push(row);
                    }
                }
                Ordering::Greater => break,
            }
        }
        matched
    }
}

pub struct SortedStreamMerger<'a, T, K> {
    primary: Box<dyn Iterator<Item = T> + 'a>,
    primary_key: Box<dyn Fn(&T) -> K + 'a>,
    secondaries: Vec<SecondaryCursor<'a, T, K>>,
    merged: usize,
}

impl<'a, T: 'a, K: Ord + 'a> SortedStreamMerger<'a, T, K> {
    pub fn new<I, F>(primary: I, key: F) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'a,
        F: Fn(&T) -> K + 'a,
    {
        Self {
            primary: Box::new(primary.into_iter()),
            primary_key: Box::new(key),
            secondaries: Vec::new(),
            merged: 0,
        }
    }

    pub fn with_secondary<I, F>(mut self, name: impl Into<String>, rows: I, key: F) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'a,
        F: Fn(&T) -> K + 'a,
    {
        let rows: Box<dyn Iterator<Item = T> + 'a> = Box::new(rows.into_iter());
        self.secondaries.push(SecondaryCursor {
            name: name.into(),
            rows: rows.peekable(),
            key: Box::new(key),
        });
        self
    }
}

/// Key extractor reading an integer column; non integer cells sort first
pub fn column_key(idx: usize) -> impl Fn(&Row) -> Option<i64> {
    move |row: &Row| row.int(idx)
}

impl<'a> SortedStreamMerger<'a, Row, Option<i64>> {
    /// Merger over rows keyed by an integer column of each stream
    pub fn by_column<I>(primary: I, idx: usize) -> Self
    where
        I: IntoIterator<Item = Row>,
        I::IntoIter: 'a,
    {
        Self::new(primary, column_key(idx))
    }

    pub fn with_secondary_column<I>(self, name: impl Into<String>, rows: I, idx: usize) -> Self
    where
        I: IntoIterator<Item = Row>,
        I::IntoIter: 'a,
    {
        self.with_secondary(name, rows, column_key(idx))
    }
}

impl<T, K: Ord> Iterator for SortedStreamMerger<'_, T, K> {
    type Item = JoinRecord<K, T>;

    fn next(&mut self) -> Option<Self::Item> {
        let Some(primary) = self.primary.next() else {
            log::debug!("Merger exhausted after {} primary rows", self.merged);
            return None;
        };
        let key = (self.primary_key)(&primary);

        let matches = self
            .secondaries
            .iter_mut()
            .map(|cursor| (cursor.name.clone(), cursor.take_matching(&key)))
            .collect();

        self.merged += 1;
        Some(JoinRecord {
            key,
            primary,
            matches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(row: &(i64, &'static str)) -> i64 {
        row.0
    }

    #[test]
    fn test_join_multiple_secondaries() {
        let primary = vec![(1, "p1"), (2, "p2"), (4, "p4")];
        let contents = vec![(1, "c1a"), (1, "c1b"), (4, "c4")];
        let infos = vec![(2, "i2"), (3, "i3"), (4, "i4")];

        let records: Vec<_> = SortedStreamMerger::new(primary, key)
            .with_secondary("contents", contents, key)
            .with_secondary("infos", infos, key)
            .collect();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].matches("contents"), &[(1, "c1a"), (1, "c1b")]);
        assert!(records[0].matches("infos").is_empty());
        assert!(records[1].matches("contents").is_empty());
        assert_eq!(records[1].matches("infos"), &[(2, "i2")]);
        // key 3 has no primary row, its secondary row is skipped
        assert_eq!(records[2].matches("infos"), &[(4, "i4")]);
        assert_eq!(records[2].matches("contents"), &[(4, "c4")]);
    }

    #[test]
    fn test_no_secondary_match_is_empty() {
        let primary = vec![(1, "p1"), (2, "p2")];
        let records: Vec<_> = SortedStreamMerger::new(primary, key)
            .with_secondary("contents", Vec::new(), key)
            .collect();

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.matches("contents").is_empty()));
        assert!(records[0].matches("unknown").is_empty());
    }

    #[test]
    fn test_cursor_waits_for_primary() {
        let primary = vec![(1, "p1"), (5, "p5"), (9, "p9")];
        let secondary = vec![(5, "s5"), (9, "s9")];
        let records: Vec<_> = SortedStreamMerger::new(primary, key)
            .with_secondary("s", secondary, key)
            .collect();

        assert!(records[0].matches("s").is_empty());
        assert_eq!(records[1].matches("s"), &[(5, "s5")]);
        assert_eq!(records[2].matches("s"), &[(9, "s9")]);
    }

    #[test]
    fn test_unsorted_secondary_undermatches_silently() {
        let primary = vec![(1, "p1"), (2, "p2")];
        let secondary = vec![(2, "s2"), (1, "s1")];
        let records: Vec<_> = SortedStreamMerger::new(primary, key)
            .with_secondary("s", secondary, key)
            .collect();

        assert!(records[0].matches("s").is_empty());
        assert_eq!(records[1].matches("s"), &[(2, "s2")]);
    }

    #[test]
    fn test_by_column_rows() {
        let row = |id: i64, v: &str| Row::new(vec![id.into(), v.into()]);
        let records: Vec<_> = SortedStreamMerger::by_column(vec![row(1, "a"), row(2, "b")], 0)
            .with_secondary_column("c", vec![row(2, "x"), row(2, "y")], 0)
            .collect();

        assert_eq!(records[1].key, Some(2));
        assert_eq!(records[1].matches("c").len(), 2);
    }
}
