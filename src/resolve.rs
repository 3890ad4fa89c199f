//! Batched id to display string resolution
//!
//! Opaque pattern keys and sampled url ids are turned into readable values
//! with one [`DisplayResolver::resolve_batch`] call per result set.

use crate::error::{AnalyticsError, Result};
use crate::query::table::{TableStore, REQUESTS_TABLE};
use crate::streams::{Row, RowStream, PATTERNS};
use crate::transducers::UrlId;
use std::collections::{HashMap, HashSet};
use std::hash::{BuildHasher, Hash};
use std::path::PathBuf;

pub trait DisplayResolver<K> {
    /// Display strings of the known `keys`; unknown keys are absent from the map
    fn resolve_batch(&self, keys: &[K]) -> Result<HashMap<K, String>>;
}

impl<K, S> DisplayResolver<K> for HashMap<K, String, S>
where
    K: Eq + Hash + Clone,
    S: BuildHasher,
{
    fn resolve_batch(&self, keys: &[K]) -> Result<HashMap<K, String>> {
        Ok(keys
            .iter()
            .filter_map(|key| Some((key.clone(), self.get(key)?.clone())))
            .collect())
    }
}

/// Pattern keys resolved through the `requests` table (`query` -> `string`)
pub struct RequestsResolver<'s, S: ?Sized> {
    store: &'s S,
}

impl<'s, S: TableStore + ?Sized> RequestsResolver<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }
}

impl<S: TableStore + ?Sized> DisplayResolver<String> for RequestsResolver<'_, S> {
    fn resolve_batch(&self, keys: &[String]) -> Result<HashMap<String, String>> {
        let Some(table) = self.store.table(REQUESTS_TABLE)? else {
            log::warn!("⚠️  No '{}' table, pattern keys stay unresolved", REQUESTS_TABLE);
            return Ok(HashMap::new());
        };
        let (Some(query_idx), Some(string_idx)) =
            (table.column_idx("query"), table.column_idx("string"))
        else {
            return Err(AnalyticsError::BadRequest(format!(
                "table '{}' needs 'query' and 'string' columns",
                REQUESTS_TABLE
            )));
        };

        let wanted: HashSet<&str> = keys.iter().map(String::as_str).collect();
        Ok(table
            .rows()
            .iter()
            .filter_map(|row| {
                let key = row.get(query_idx).to_key_string()?;
                if !wanted.contains(key.as_str()) {
                    return None;
                }
                Some((key, row.get(string_idx).to_key_string()?))
            })
            .collect())
    }
}

/// Full url of a `urlids` row: `protocol://host path [?query_string]`
pub fn pattern_url(row: &Row) -> Option<String> {
    let protocol = row.str(1)?;
    let host = row.str(2)?;
    let path = row.str(3).unwrap_or_default();
    match row.str(4) {
        Some(qs) if !qs.is_empty() => Some(format!("{}://{}{}?{}", protocol, host, path, qs)),
        _ => Some(format!("{}://{}{}", protocol, host, path)),
    }
}

/// Url ids resolved by scanning the `urlids` shards of a crawl directory
pub struct PatternUrlResolver {
    data_dir: PathBuf,
}

impl PatternUrlResolver {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

impl DisplayResolver<UrlId> for PatternUrlResolver {
    fn resolve_batch(&self, keys: &[UrlId]) -> Result<HashMap<UrlId, String>> {
        let wanted: HashSet<UrlId> = keys.iter().copied().collect();
        let stream = RowStream::from_directory(PATTERNS, &self.data_dir)?;
        let status = stream.status();

        let mut resolved = HashMap::new();
        for row in stream {
            let Some(id) = row.int(0) else { continue };
            if wanted.contains(&id) {
                if let Some(url) = pattern_url(&row) {
                    resolved.insert(id, url);
                }
            }
        }
        status.check()?;

        log::debug!("Resolved {} of {} url ids", resolved.len(), wanted.len());
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::table::{MemoryStore, Table};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_hashmap_resolver_skips_unknown() {
        let known: HashMap<i64, String> = HashMap::from([(1, "a".to_string()), (2, "b".to_string())]);
        let resolved = known.resolve_batch(&[1, 3]).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[&1], "a");
    }

    #[test]
    fn test_requests_resolver() {
        let store = MemoryStore::new().with_table(
            REQUESTS_TABLE,
            Table::from_records(
                &["query", "string"],
                vec![
                    vec!["1;2".into(), "host=www.site.com".into()],
                    vec!["3".into(), "depth=2".into()],
                    vec![7.into(), "depth=3".into()],
                ],
            ),
        );
        let resolver = RequestsResolver::new(&store);
        let resolved = resolver
            .resolve_batch(&["1;2".to_string(), "7".to_string(), "9".to_string()])
            .unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved["1;2"], "host=www.site.com");
        assert_eq!(resolved["7"], "depth=3");
    }

    #[test]
    fn test_requests_resolver_without_table() {
        let store = MemoryStore::new();
        let resolved = RequestsResolver::new(&store)
            .resolve_batch(&["1".to_string()])
            .unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_pattern_url_resolver() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("urlids.txt.0"),
            "1\thttp\twww.site.com\t/a\t\n2\thttps\twww.site.com\t/b\tx=1\n",
        )
        .unwrap();
        fs::write(dir.path().join("urlids.txt.1"), "5\thttp\tsite.com\t/\t\n").unwrap();

        let resolver = PatternUrlResolver::new(dir.path());
        let resolved = resolver.resolve_batch(&[2, 5, 8]).unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[&2], "https://www.site.com/b?x=1");
        assert_eq!(resolved[&5], "http://site.com/");
    }
}
