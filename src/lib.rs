//! Crawl statistics: duplicate detection, top domains and metric queries
//! over sharded web-crawl exports.

pub mod config;
pub mod derive;
pub mod error;
pub mod query;
pub mod resolve;
pub mod sinks;
pub mod streams;
pub mod transducers;

pub use config::{parse_backend_from_args, AnalyticsConfig, BackendType};
pub use error::{AnalyticsError, Result};
