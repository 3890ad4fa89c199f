//! JSONL sink - one file per record kind under the output directory

use super::{domain_entries, DomainRanking, RecordSink, SinkError};
use crate::transducers::{DomainLinkStats, DuplicateRecord};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

pub const DUPLICATES_FILE: &str = "duplicates.jsonl";

pub struct JsonlSink {
    base_path: PathBuf,
    writers: HashMap<&'static str, BufWriter<File>>,
    computed_at: i64,
}

#[derive(Serialize)]
struct Stamped<'a, T: Serialize> {
    #[serde(flatten)]
    record: &'a T,
    computed_at: i64,
}

impl JsonlSink {
    pub fn new(base_path: PathBuf) -> Result<Self, SinkError> {
        std::fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            writers: HashMap::new(),
            computed_at: chrono::Utc::now().timestamp(),
        })
    }

    /// Writer for `filename`, truncated when first opened by this sink
    fn writer(&mut self, filename: &'static str) -> Result<&mut BufWriter<File>, SinkError> {
        match self.writers.entry(filename) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let file_path = self.base_path.join(filename);
                let file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&file_path)?;
                log::info!("📝 Writing records to: {}", file_path.display());
                Ok(entry.insert(BufWriter::new(file)))
            }
        }
    }

    fn write_lines<'r, T, I>(&mut self, filename: &'static str, records: I) -> Result<usize, SinkError>
    where
        T: Serialize + 'r,
        I: IntoIterator<Item = &'r T>,
    {
        let computed_at = self.computed_at;
        let writer = self.writer(filename)?;
        let mut written = 0;
        for record in records {
            let json = serde_json::to_string(&Stamped { record, computed_at })?;
            writeln!(writer, "{}", json)?;
            written += 1;
        }
        Ok(written)
    }
}

impl RecordSink for JsonlSink {
    fn write_duplicates(&mut self, records: &[DuplicateRecord]) -> Result<(), SinkError> {
        let written = self.write_lines(DUPLICATES_FILE, records)?;
        log::debug!("✅ {} duplicate records buffered", written);
        Ok(())
    }

    fn write_domains(
        &mut self,
        ranking: DomainRanking,
        domains: &[(usize, DomainLinkStats<String>)],
    ) -> Result<(), SinkError> {
        let filename = match ranking {
            DomainRanking::Full => "full_domains.jsonl",
            DomainRanking::SecondLevel => "second_level_domains.jsonl",
        };
        let entries: Vec<_> = domain_entries(ranking, domains).collect();
        let written = self.write_lines(filename, &entries)?;
        log::debug!("✅ {} {} entries buffered", written, ranking.as_str());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "JSONL"
    }
}
