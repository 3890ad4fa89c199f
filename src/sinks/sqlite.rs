//! SQLite sink for derived records
//!
//! Records are buffered and committed in one transaction on `flush`.
//! Sample lists are stored as JSON text.

use super::{domain_entries, DomainRanking, RecordSink, SinkError};
use crate::transducers::{DomainLinkStats, DuplicateRecord};
use rusqlite::{params, Connection};
use std::path::Path;

pub struct SqliteSink {
    conn: Connection,
    duplicates: Vec<DuplicateRecord>,
    /// A duplicate batch was handed over since the last flush
    replace_duplicates: bool,
    domains: Vec<(DomainRanking, Vec<(usize, DomainLinkStats<String>)>)>,
}

impl SqliteSink {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, SinkError> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS content_duplicates (
                url_id INTEGER NOT NULL,
                content_type TEXT NOT NULL,
                filled_nb INTEGER NOT NULL,
                duplicates_nb INTEGER NOT NULL,
                is_first INTEGER NOT NULL,
                duplicate_urls TEXT NOT NULL,
                computed_at INTEGER NOT NULL,
                PRIMARY KEY (url_id, content_type)
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS top_domains (
                ranking TEXT NOT NULL,
                rank INTEGER NOT NULL,
                domain TEXT NOT NULL,
                follow_links INTEGER NOT NULL,
                nofollow_links INTEGER NOT NULL,
                unique_follow_links INTEGER NOT NULL,
                sample_follow_links TEXT NOT NULL,
                sample_nofollow_links TEXT NOT NULL,
                computed_at INTEGER NOT NULL,
                PRIMARY KEY (ranking, domain)
            )",
            [],
        )?;

        log::info!("✅ SQLite record sink initialized");
        Ok(Self {
            conn,
            duplicates: Vec::new(),
            replace_duplicates: false,
            domains: Vec::new(),
        })
    }
}

impl RecordSink for SqliteSink {
    fn write_duplicates(&mut self, records: &[DuplicateRecord]) -> Result<(), SinkError> {
        self.duplicates.extend_from_slice(records);
        self.replace_duplicates = true;
        Ok(())
    }

    fn write_domains(
        &mut self,
        ranking: DomainRanking,
        domains: &[(usize, DomainLinkStats<String>)],
    ) -> Result<(), SinkError> {
        self.domains.push((ranking, domains.to_vec()));
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        if !self.replace_duplicates && self.domains.is_empty() {
            return Ok(());
        }
        let computed_at = chrono::Utc::now().timestamp();
        let tx = self.conn.transaction()?;

        if self.replace_duplicates {
            // Rows of a previous crawl's url ids must not survive
            tx.execute("DELETE FROM content_duplicates", [])?;
        }

        for record in &self.duplicates {
            tx.execute(
                "INSERT OR REPLACE INTO content_duplicates
                 (url_id, content_type, filled_nb, duplicates_nb, is_first, duplicate_urls, computed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.url_id,
                    record.content_type.as_str(),
                    record.filled_nb as i64,
                    record.duplicates_nb as i64,
                    record.is_first,
                    serde_json::to_string(&record.duplicate_urls)?,
                    computed_at,
                ],
            )?;
        }

        for (ranking, domains) in &self.domains {
            // A new ranking replaces the previous one entirely
            tx.execute("DELETE FROM top_domains WHERE ranking = ?1", params![ranking.as_str()])?;
            for entry in domain_entries(*ranking, domains) {
                tx.execute(
                    "INSERT INTO top_domains
                     (ranking, rank, domain, follow_links, nofollow_links, unique_follow_links,
                      sample_follow_links, sample_nofollow_links, computed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        entry.ranking,
                        entry.rank as i64,
                        entry.stats.domain,
                        entry.stats.follow_links as i64,
                        entry.stats.nofollow_links as i64,
                        entry.stats.unique_follow_links as i64,
                        serde_json::to_string(&entry.stats.sample_follow_links)?,
                        serde_json::to_string(&entry.stats.sample_nofollow_links)?,
                        computed_at,
                    ],
                )?;
            }
        }

        tx.commit()?;
        log::debug!(
            "✅ Flushed {} duplicate records and {} domain rankings to SQLite",
            self.duplicates.len(),
            self.domains.len()
        );
        self.duplicates.clear();
        self.replace_duplicates = false;
        self.domains.clear();
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::test_support::{create_test_domain, create_test_duplicate};
    use crate::transducers::ContentType;
    use tempfile::tempdir;

    #[test]
    fn test_sqlite_sink_write() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let mut sink = SqliteSink::new(&db_path).unwrap();

        sink.write_duplicates(&[
            create_test_duplicate(1, ContentType::Title),
            create_test_duplicate(2, ContentType::Title),
        ])
        .unwrap();
        sink.write_domains(
            DomainRanking::SecondLevel,
            &[create_test_domain("a.com", 5), create_test_domain("b.com", 3)],
        )
        .unwrap();
        sink.flush().unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let (is_first, duplicate_urls): (bool, String) = conn
            .query_row(
                "SELECT is_first, duplicate_urls FROM content_duplicates WHERE url_id = ?1 AND content_type = 'title'",
                params![2],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert!(!is_first);
        assert_eq!(duplicate_urls, "[1]");

        let (rank, unique): (i64, i64) = conn
            .query_row(
                "SELECT rank, unique_follow_links FROM top_domains WHERE domain = 'b.com'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(rank, 2);
        assert_eq!(unique, 2);
    }

    #[test]
    fn test_nothing_written_before_flush() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let mut sink = SqliteSink::new(&db_path).unwrap();
        sink.write_duplicates(&[create_test_duplicate(1, ContentType::H1)])
            .unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM content_duplicates", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_ranking_rewritten_on_rerun() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let mut sink = SqliteSink::new(&db_path).unwrap();

        sink.write_domains(DomainRanking::Full, &[create_test_domain("www.a.com", 4)])
            .unwrap();
        sink.flush().unwrap();
        sink.write_domains(DomainRanking::Full, &[create_test_domain("www.b.com", 4)])
            .unwrap();
        sink.flush().unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let domains: Vec<String> = conn
            .prepare("SELECT domain FROM top_domains WHERE ranking = 'full_domains'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(domains, vec!["www.b.com"]);
    }

    #[test]
    fn test_duplicates_replaced_on_rerun() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let mut sink = SqliteSink::new(&db_path).unwrap();

        sink.write_duplicates(&[
            create_test_duplicate(1, ContentType::Title),
            create_test_duplicate(2, ContentType::Title),
        ])
        .unwrap();
        sink.flush().unwrap();

        // domains alone leave the duplicates in place
        sink.write_domains(DomainRanking::Full, &[create_test_domain("www.a.com", 4)])
            .unwrap();
        sink.flush().unwrap();

        sink.write_duplicates(&[create_test_duplicate(7, ContentType::H1)])
            .unwrap();
        sink.flush().unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let url_ids: Vec<i64> = conn
            .prepare("SELECT url_id FROM content_duplicates")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(url_ids, vec![7]);
    }
}
