//! Filterable, aggregatable queries over crawl metric tables
//!
//! ```text
//! TableStore ("full_crawl" | "suggest")
//!     ↓
//! FilterNode (boolean predicate tree)
//!     ↓
//! group + sum → AggregateHook → sort
//!     ↓
//! MetricsQuery: nested counters    SuggestQuery: HierarchyReducer → DisplayResolver
//! ```

pub mod engine;
pub mod fields;
pub mod filter;
pub mod hierarchy;
pub mod settings;
pub mod table;

pub use engine::{
    AggregateHook, AggregatedGroup, GroupResult, KeepAll, MetricsQuery, MinPagesHook,
    PatternOutput, QueryResult, SuggestQuery,
};
pub use fields::{FieldCatalog, FieldValidation};
pub use filter::{Filter, FilterNode, Leaf, Predicate};
pub use hierarchy::{HierarchyReducer, PatternResult};
pub use settings::{QuerySettings, SortOrder};
pub use table::{MemoryStore, SqliteStore, Table, TableStore};
