//! Shard discovery and typed row streams over tab separated text

use super::schema::{Row, StreamDef};
use crate::error::{AnalyticsError, Result};
use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Shard files of `prefix` in `dir`, ordered by numeric part id
///
/// Files are named `<prefix>.txt.<part_id>`; ordering is numeric so that
/// part 9 comes before part 10.
pub fn shard_files(dir: impl AsRef<Path>, prefix: &str) -> Result<Vec<(u32, PathBuf)>> {
    let stem = format!("{}.txt.", prefix);
    let mut shards: Vec<(u32, PathBuf)> = fs::read_dir(dir.as_ref())?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let part_id = name.strip_prefix(&stem)?.parse::<u32>().ok()?;
            Some((part_id, entry.path()))
        })
        .collect();

    shards.sort_by_key(|(part_id, _)| *part_id);
    Ok(shards)
}

/// First read or cast error hit by a [`RowStream`]
///
/// The stream is usually moved into a merger, so the error is parked here
/// and checked once the consumer is done.
#[derive(Debug, Clone, Default)]
pub struct ReadStatus(Rc<RefCell<Option<AnalyticsError>>>);

impl ReadStatus {
    fn record(&self, err: AnalyticsError) {
        let mut slot = self.0.borrow_mut();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    pub fn check(&self) -> Result<()> {
        match self.0.borrow_mut().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// A logical row stream assembled from one or more shards in part order
pub struct RowStream<'a> {
    def: StreamDef,
    rows: Box<dyn Iterator<Item = Result<Row>> + 'a>,
    status: ReadStatus,
    failed: bool,
}

impl<'a> RowStream<'a> {
    /// Stream over already typed rows
    pub fn from_rows(def: StreamDef, rows: Vec<Row>) -> Self {
        Self::from_results(def, rows.into_iter().map(Ok))
    }

    fn from_results(def: StreamDef, rows: impl Iterator<Item = Result<Row>> + 'a) -> Self {
        Self {
            def,
            rows: Box::new(rows),
            status: ReadStatus::default(),
            failed: false,
        }
    }

    /// Stream casting each non-empty line of `reader`
    pub fn from_reader<R: BufRead + 'a>(def: StreamDef, reader: R) -> Self {
        let caster = def.caster();
        let rows = reader.lines().filter_map(move |line| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(caster.cast_line(&line)),
            Err(e) => Some(Err(AnalyticsError::Io(e))),
        });
        Self::from_results(def, rows)
    }

    /// Concatenate shards in the given order
    pub fn from_shards(def: StreamDef, shards: Vec<RowStream<'a>>) -> Self {
        // Shard rows are pulled through the outer stream, which records errors
        let rows = shards.into_iter().flat_map(|shard| shard.rows);
        Self::from_results(def, rows)
    }

    /// Single shard file `<prefix>.txt.<part_id>`; a missing file is an empty stream
    pub fn from_part(def: StreamDef, dir: impl AsRef<Path>, part_id: u32) -> Result<Self> {
        let path = dir
            .as_ref()
            .join(format!("{}.txt.{}", def.file_prefix, part_id));
        if !path.exists() {
            log::debug!("No shard at {}, using an empty stream", path.display());
            return Ok(Self::from_rows(def, Vec::new()));
        }
        Ok(Self::from_reader(def, BufReader::new(File::open(path)?)))
    }

    /// All shards of the stream found in `dir`, concatenated by part id
    pub fn from_directory(def: StreamDef, dir: impl AsRef<Path>) -> Result<Self> {
        let mut shards = Vec::new();
        for (part_id, path) in shard_files(dir.as_ref(), def.file_prefix)? {
            log::debug!("📖 {} part {}: {}", def.name, part_id, path.display());
            shards.push(Self::from_reader(def, BufReader::new(File::open(path)?)));
        }
        log::info!("📖 {} shards found for stream '{}'", shards.len(), def.name);
        Ok(Self::from_shards(def, shards))
    }

    pub fn def(&self) -> StreamDef {
        self.def
    }

    /// Handle to check for read errors after the stream was consumed
    pub fn status(&self) -> ReadStatus {
        self.status.clone()
    }
}

impl Iterator for RowStream<'_> {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        if self.failed {
            return None;
        }
        match self.rows.next()? {
            Ok(row) => Some(row),
            Err(err) => {
                log::warn!("Stream '{}' stopped: {}", self.def.name, err);
                self.status.record(err);
                self.failed = true;
                None
            }
        }
    }
}
