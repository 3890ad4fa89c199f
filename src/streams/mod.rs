//! Typed crawl row streams
//!
//! Shards of `<prefix>.txt.<part_id>` files are cast through a [`StreamDef`]
//! into [`Row`]s and correlated by url id with the [`SortedStreamMerger`].

pub mod merger;
pub mod schema;
pub mod source;

pub use merger::{column_key, JoinRecord, SortedStreamMerger};
pub use schema::{
    Caster, FieldType, Row, StreamDef, Value, CONTENTS, CONTENTS_DUPLICATE, OUTLINKS_RAW,
    PATTERNS,
};
pub use source::{shard_files, ReadStatus, RowStream};
