//! Named tabular data lookup
//!
//! Queries read whole tables by name ("full_crawl", "suggest", "children",
//! "requests") from a [`TableStore`]. Two stores are provided: an
//! in-memory map and a read-only SQLite database.

use crate::error::Result;
use crate::streams::{Row, Value};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;

pub const FULL_CRAWL_TABLE: &str = "full_crawl";
pub const SUGGEST_TABLE: &str = "suggest";
pub const CHILDREN_TABLE: &str = "children";
pub const REQUESTS_TABLE: &str = "requests";

/// Columns plus rows of values, addressable by row and column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Build a table from column names and raw value rows
    pub fn from_records(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows.into_iter().map(Row::new).collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_idx(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_idx(column).is_some()
    }

    /// Cell of `row` under `column`, `Null` when the column does not exist
    pub fn value<'r>(&self, row: &'r Row, column: &str) -> &'r Value {
        match self.column_idx(column) {
            Some(idx) => row.get(idx),
            None => &Value::Null,
        }
    }
}

/// Lookup of tables by name
pub trait TableStore {
    /// `None` when the store has no table of that name
    fn table(&self, name: &str) -> Result<Option<Table>>;
}

/// Tables held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: HashMap<String, Table>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, table: Table) {
        self.tables.insert(name.to_string(), table);
    }

    pub fn with_table(mut self, name: &str, table: Table) -> Self {
        self.insert(name, table);
        self
    }
}

impl TableStore for MemoryStore {
    fn table(&self, name: &str) -> Result<Option<Table>> {
        Ok(self.tables.get(name).cloned())
    }
}

/// Read-only view over the tables of a SQLite database
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())?;

        // Queries never write
        conn.execute_batch("PRAGMA query_only = ON")?;

        log::info!("📥 SQLite table store opened: {}", db_path.as_ref().display());
        Ok(Self { conn })
    }

    fn table_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

/// SQLite cell to value; text holding a JSON array becomes a list
fn to_value(cell: ValueRef<'_>) -> Value {
    match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            if text.starts_with('[') {
                if let Ok(items) = serde_json::from_str::<Vec<Value>>(&text) {
                    return Value::List(items);
                }
            }
            Value::Str(text.into_owned())
        }
    }
}

impl TableStore for SqliteStore {
    fn table(&self, name: &str) -> Result<Option<Table>> {
        if !self.table_exists(name)? {
            return Ok(None);
        }

        let sql = format!("SELECT * FROM \"{}\"", name.replace('"', "\"\""));
        let mut stmt = self.conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|idx| row.get_ref(idx).map(to_value))
                    .collect::<rusqlite::Result<Vec<Value>>>()
                    .map(Row::new)
            })?
            .collect::<rusqlite::Result<Vec<Row>>>()?;

        log::debug!("📥 Loaded table '{}': {} rows", name, rows.len());
        Ok(Some(Table::new(columns, rows)))
    }
}
