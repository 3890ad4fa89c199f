//! Record sinks for derived duplicate and domain metrics
//!
//! A derivation hands its whole batch to a sink, then flushes it once the
//! input streams were read without error.

pub mod jsonl;
pub mod sqlite;

pub use jsonl::JsonlSink;
pub use sqlite::SqliteSink;

use crate::config::BackendType;
use crate::transducers::{DomainLinkStats, DuplicateRecord};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Failure while writing or committing derived records
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Cannot write record file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot encode record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cannot store records: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Which domain ranking a batch of stats belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainRanking {
    Full,
    SecondLevel,
}

impl DomainRanking {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainRanking::Full => "full_domains",
            DomainRanking::SecondLevel => "second_level_domains",
        }
    }
}

/// One ranked domain as written by the sinks
#[derive(Debug, Serialize)]
pub struct DomainEntry<'a> {
    pub ranking: &'static str,
    /// 1-based position in the ranking
    pub rank: usize,
    #[serde(flatten)]
    pub stats: &'a DomainLinkStats<String>,
}

/// Pair each stats entry with its 1-based rank
pub fn domain_entries<'a>(
    ranking: DomainRanking,
    domains: &'a [(usize, DomainLinkStats<String>)],
) -> impl Iterator<Item = DomainEntry<'a>> {
    domains
        .iter()
        .enumerate()
        .map(move |(idx, (_, stats))| DomainEntry {
            ranking: ranking.as_str(),
            rank: idx + 1,
            stats,
        })
}

/// Backend trait for derived records
pub trait RecordSink {
    fn write_duplicates(&mut self, records: &[DuplicateRecord]) -> Result<(), SinkError>;

    fn write_domains(
        &mut self,
        ranking: DomainRanking,
        domains: &[(usize, DomainLinkStats<String>)],
    ) -> Result<(), SinkError>;

    /// Flush pending writes to storage
    fn flush(&mut self) -> Result<(), SinkError>;

    /// Backend name for logging
    fn backend_type(&self) -> &'static str;
}

/// Sink for the selected backend: a directory of JSONL files or a SQLite
/// database file
pub fn create_sink(backend: BackendType, path: PathBuf) -> Result<Box<dyn RecordSink>, SinkError> {
    match backend {
        BackendType::Jsonl => Ok(Box::new(JsonlSink::new(path)?)),
        BackendType::Sqlite => Ok(Box::new(SqliteSink::new(path)?)),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::transducers::{ContentType, DomainLinkStats, DuplicateRecord, LinkDestination};

    pub fn create_test_duplicate(url_id: i64, content_type: ContentType) -> DuplicateRecord {
        DuplicateRecord {
            url_id,
            content_type,
            filled_nb: 1,
            duplicates_nb: 2,
            is_first: url_id == 1,
            duplicate_urls: vec![if url_id == 1 { 2 } else { 1 }],
        }
    }

    pub fn create_test_domain(domain: &str, follow_links: usize) -> (usize, DomainLinkStats<String>) {
        let stats = DomainLinkStats {
            domain: domain.to_string(),
            follow_links,
            nofollow_links: 1,
            unique_follow_links: follow_links - 1,
            sample_follow_links: vec![LinkDestination::new(
                &format!("http://{}/", domain),
                follow_links - 1,
                vec!["http://www.site.com/a".to_string()],
            )],
            sample_nofollow_links: Vec::new(),
        };
        (stats.unique_follow_links, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::create_test_domain;
    use super::*;

    #[test]
    fn test_domain_entries_ranked_from_one() {
        let domains = vec![create_test_domain("a.com", 5), create_test_domain("b.com", 3)];
        let entries: Vec<DomainEntry> = domain_entries(DomainRanking::SecondLevel, &domains).collect();

        assert_eq!(entries[0].rank, 1);
        assert_eq!(entries[1].rank, 2);
        let json = serde_json::to_value(&entries[1]).unwrap();
        assert_eq!(json["ranking"], "second_level_domains");
        assert_eq!(json["domain"], "b.com");
        assert_eq!(json["unique_follow_links"], 2);
    }

    #[test]
    fn test_sink_errors_convert_into_analytics_errors() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = create_sink(BackendType::Jsonl, file.path().to_path_buf())
            .err()
            .unwrap();
        assert!(matches!(err, SinkError::Io(_)));
        assert!(err.to_string().starts_with("Cannot write record file"));

        let err: crate::AnalyticsError = err.into();
        assert!(matches!(err, crate::AnalyticsError::Sink(SinkError::Io(_))));
    }
}
